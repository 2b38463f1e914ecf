//! Cooldown gate for repeated payloads
//!
//! A code held in front of the camera decodes on every frame. Only the last
//! accepted payload is remembered, so alternating between two codes is never
//! suppressed.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accept,
    Suppress,
}

#[derive(Debug)]
pub struct Deduplicator {
    cooldown: Duration,
    last: Option<(String, Instant)>,
}

impl Deduplicator {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last: None,
        }
    }

    /// Decide on a normalized payload, remembering it when accepted
    pub fn admit(&mut self, payload: &str, now: Instant) -> Admission {
        if let Some((last, at)) = &self.last {
            if last == payload && now.saturating_duration_since(*at) < self.cooldown {
                return Admission::Suppress;
            }
        }
        self.last = Some((payload.to_string(), now));
        Admission::Accept
    }
}
