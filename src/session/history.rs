//! Bounded newest-first history of scan events

use std::collections::VecDeque;

use chrono::{DateTime, Local};
use serde::Serialize;

use super::resolve::{Outcome, Subject};

/// Outcome of one accepted scan. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanEvent {
    pub subject: Option<Subject>,
    /// Normalized payload
    pub payload: String,
    pub timestamp: DateTime<Local>,
    pub outcome: Outcome,
}

#[derive(Debug)]
pub struct EventLog {
    events: VecDeque<ScanEvent>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert at the head, evicting the oldest past capacity
    pub fn append(&mut self, event: ScanEvent) {
        self.events.push_front(event);
        self.events.truncate(self.capacity);
    }

    /// Copy of the log, newest first
    pub fn snapshot(&self) -> Vec<ScanEvent> {
        self.events.iter().cloned().collect()
    }
}
