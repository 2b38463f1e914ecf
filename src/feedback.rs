//! Operator feedback for scan outcomes
//!
//! Audible and haptic cues are dispatched to a worker thread and never
//! awaited. Failures there are logged and swallowed.

use std::io::Write;
use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, TrySendError};
use gstreamer as gst;
use gstreamer::prelude::*;

use crate::registry::Role;
use crate::session::history::ScanEvent;
use crate::session::resolve::Outcome;

/// Receives every accepted scan event
pub trait FeedbackSink {
    fn emit(&self, event: &ScanEvent);
}

/// Side effects the worker knows how to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cue {
    Chime,
    Haptic,
}

/// Longest a chime may hold the worker before it is cut off
const CHIME_TIMEOUT_SECS: u64 = 3;

/// Fire-and-forget cue dispatcher
pub struct FeedbackEmitter {
    tx: Option<Sender<Cue>>,
    worker: Option<JoinHandle<()>>,
    haptics: bool,
}

impl FeedbackEmitter {
    pub fn new(sound: Option<PathBuf>, haptics: bool) -> Self {
        // A couple of queued cues is plenty; anything beyond that is stale
        let (tx, rx) = crossbeam_channel::bounded::<Cue>(4);
        let worker = std::thread::Builder::new()
            .name("feedback".to_string())
            .spawn(move || {
                for cue in rx {
                    match cue {
                        Cue::Chime => play_chime(sound.as_deref()),
                        Cue::Haptic => log::debug!("No haptic device attached, skipping pulse"),
                    }
                }
            });

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(err) => {
                log::warn!("Could not start feedback worker, cues disabled: {}", err);
                None
            }
        };

        Self {
            tx: worker.as_ref().map(|_| tx),
            worker,
            haptics,
        }
    }

    fn dispatch(&self, cue: Cue) {
        let Some(tx) = &self.tx else { return };
        match tx.try_send(cue) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => log::debug!("Feedback queue full, dropping {:?}", cue),
            Err(TrySendError::Disconnected(_)) => log::debug!("Feedback worker gone"),
        }
    }
}

impl FeedbackSink for FeedbackEmitter {
    fn emit(&self, event: &ScanEvent) {
        if event.outcome != Outcome::Valid {
            return;
        }
        self.dispatch(Cue::Chime);
        if self.haptics {
            self.dispatch(Cue::Haptic);
        }
    }
}

impl Drop for FeedbackEmitter {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("Feedback worker panicked");
            }
        }
    }
}

fn play_chime(sound: Option<&std::path::Path>) {
    let result = match sound {
        Some(path) => play_file(path),
        None => ring_bell(),
    };
    if let Err(err) = result {
        log::warn!("Chime failed: {:#}", err);
    }
}

fn ring_bell() -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(b"\x07")?;
    stdout.flush()?;
    Ok(())
}

/// Play a clip to completion on a throwaway playbin
fn play_file(path: &std::path::Path) -> anyhow::Result<()> {
    gst::init()?;

    let uri = gst::glib::filename_to_uri(path, None)?;
    let playbin = gst::ElementFactory::make("playbin")
        .property("uri", uri.as_str())
        .build()?;

    let result = playbin
        .set_state(gst::State::Playing)
        .map_err(anyhow::Error::from)
        .and_then(|_| wait_for_end(&playbin));

    playbin.set_state(gst::State::Null)?;
    result
}

fn wait_for_end(playbin: &gst::Element) -> anyhow::Result<()> {
    let bus = playbin
        .bus()
        .ok_or_else(|| anyhow::anyhow!("playbin has no bus"))?;
    for msg in bus.iter_timed(gst::ClockTime::from_seconds(CHIME_TIMEOUT_SECS)) {
        match msg.view() {
            gst::MessageView::Eos(..) => return Ok(()),
            gst::MessageView::Error(err) => {
                return Err(anyhow::anyhow!(
                    "Playback error: {} ({})",
                    err.error(),
                    err.debug().unwrap_or_default()
                ));
            }
            _ => {}
        }
    }
    log::debug!("Chime still playing after {}s, cutting it off", CHIME_TIMEOUT_SECS);
    Ok(())
}

/// Transient operator-facing status after a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Validated {
        name: String,
        role: Role,
        position: String,
    },
    Denied {
        payload: String,
    },
}

impl Status {
    pub fn for_event(event: &ScanEvent) -> Self {
        match (&event.subject, event.outcome) {
            (Some(subject), Outcome::Valid) => Status::Validated {
                name: subject.name.clone(),
                role: subject.role,
                position: subject.position.clone(),
            },
            _ => Status::Denied {
                payload: event.payload.clone(),
            },
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Validated { name, role, position } if position.is_empty() => {
                write!(f, "VALIDATED {name} ({})", role.label())
            }
            Status::Validated { name, role, position } => {
                write!(f, "VALIDATED {name} ({}, {position})", role.label())
            }
            Status::Denied { payload } => write!(f, "DENIED {payload} not found"),
        }
    }
}

/// Holds the current status until it expires or a newer scan replaces it
#[derive(Debug)]
pub struct StatusBoard {
    lifetime: Duration,
    current: Option<(Status, Instant)>,
}

impl StatusBoard {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            lifetime,
            current: None,
        }
    }

    pub fn show(&mut self, status: Status, now: Instant) {
        self.current = Some((status, now));
    }

    /// Drop the status once its lifetime is over. Returns true if it was cleared.
    pub fn expire(&mut self, now: Instant) -> bool {
        match &self.current {
            Some((_, shown)) if now.saturating_duration_since(*shown) >= self.lifetime => {
                self.current = None;
                true
            }
            _ => false,
        }
    }

    pub fn current(&self, now: Instant) -> Option<&Status> {
        self.current
            .as_ref()
            .filter(|(_, shown)| now.saturating_duration_since(*shown) < self.lifetime)
            .map(|(status, _)| status)
    }
}
