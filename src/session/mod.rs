//! Scan session: the single path every payload takes
//!
//! Camera frames, manual entry and uploaded images all end in
//! [`ScanSession::accept`], which normalizes, gates, resolves, logs and
//! signals feedback in one step. The session owns the registries, the
//! de-duplicator and the log; nothing else mutates them.

pub mod dedup;
pub mod history;
pub mod resolve;

use std::time::Instant;

use chrono::Local;

use self::dedup::{Admission, Deduplicator};
use self::history::{EventLog, ScanEvent};
use self::resolve::{normalize, resolve};
use crate::audit::AuditTrail;
use crate::capture::frame::Frame;
use crate::capture::qr::{CodeReader, QrDecoder, Rqrr};
use crate::config::TerminalConfig;
use crate::feedback::{FeedbackSink, Status, StatusBoard};
use crate::registry::Registry;

/// What became of one scan attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ScanResult {
    /// Nothing decodable, or blank manual input
    NoCode,
    /// Same payload as the last accepted one, still inside the cooldown
    Suppressed,
    Logged(ScanEvent),
}

pub struct ScanSession<R = Rqrr> {
    registry: Registry,
    decoder: QrDecoder<R>,
    dedup: Deduplicator,
    log: EventLog,
    status: StatusBoard,
    sink: Box<dyn FeedbackSink>,
    audit: Option<AuditTrail>,
}

impl<R: CodeReader> ScanSession<R> {
    pub fn new(
        registry: Registry,
        config: &TerminalConfig,
        decoder: QrDecoder<R>,
        sink: Box<dyn FeedbackSink>,
    ) -> Self {
        Self {
            registry,
            decoder,
            dedup: Deduplicator::new(config.cooldown()),
            log: EventLog::new(config.log_capacity),
            status: StatusBoard::new(config.status_lifetime()),
            sink,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: AuditTrail) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Decode one live frame
    pub fn scan_frame(&mut self, frame: &Frame, now: Instant) -> ScanResult {
        match self.decoder.decode(&frame.rgba) {
            Some(text) => self.accept(&text, now),
            None => ScanResult::NoCode,
        }
    }

    /// Decode an uploaded still image with the same fallback as live frames
    pub fn scan_upload(&mut self, image: &Frame, now: Instant) -> ScanResult {
        match self.decoder.decode(&image.rgba) {
            Some(text) => self.accept(&text, now),
            None => {
                log::info!("No code found in uploaded {}x{} image", image.width(), image.height());
                ScanResult::NoCode
            }
        }
    }

    /// Typed identifier, submitted explicitly
    pub fn submit_manual(&mut self, input: &str, now: Instant) -> ScanResult {
        self.accept(input, now)
    }

    /// Normalize, gate, resolve and record a payload
    pub fn accept(&mut self, raw: &str, now: Instant) -> ScanResult {
        let payload = normalize(raw);
        if payload.is_empty() {
            return ScanResult::NoCode;
        }

        if self.dedup.admit(&payload, now) == Admission::Suppress {
            log::trace!("Suppressed repeat of {}", payload);
            return ScanResult::Suppressed;
        }

        let (subject, outcome) = resolve(&self.registry, &payload);
        let event = ScanEvent {
            subject,
            payload,
            timestamp: Local::now(),
            outcome,
        };
        log::debug!("Accepted {} as {:?}", event.payload, event.outcome);

        self.log.append(event.clone());
        self.status.show(Status::for_event(&event), now);
        self.sink.emit(&event);
        if let Some(audit) = self.audit.as_mut() {
            audit.record(&event);
        }

        ScanResult::Logged(event)
    }

    /// Log contents, newest first
    pub fn events(&self) -> Vec<ScanEvent> {
        self.log.snapshot()
    }

    pub fn status(&self, now: Instant) -> Option<&Status> {
        self.status.current(now)
    }

    /// Clear an expired status. Returns true if one was cleared.
    pub fn expire_status(&mut self, now: Instant) -> bool {
        self.status.expire(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{RegistrationRecord, Role, RosterRecord};
    use crate::session::resolve::{Outcome, REGISTERED_MEMBER};
    use image::{GrayImage, RgbaImage};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<ScanEvent>>>);

    impl FeedbackSink for Recorder {
        fn emit(&self, event: &ScanEvent) {
            self.0.borrow_mut().push(event.clone());
        }
    }

    /// Reads the payload only from buffers of one exact size
    struct FakeReader {
        size: (u32, u32),
        payload: String,
    }

    impl CodeReader for FakeReader {
        fn read(&self, gray: &GrayImage) -> Option<String> {
            (gray.dimensions() == self.size).then(|| self.payload.clone())
        }
    }

    fn registry() -> Registry {
        Registry::new(
            vec![RosterRecord {
                id: "21BCE1234".to_string(),
                name: "Sameer Khan".to_string(),
                reg_number: None,
                role: Role::Lead,
                position: "President".to_string(),
                bio: String::new(),
                photo: None,
            }],
            vec![RegistrationRecord {
                id: "r1".to_string(),
                name: "Priya R".to_string(),
                reg_number: "22BIT0099".to_string(),
                created_at: chrono::Utc::now(),
            }],
        )
    }

    fn session_with(
        registry: Registry,
        reader: FakeReader,
    ) -> (ScanSession<FakeReader>, Recorder) {
        let recorder = Recorder::default();
        let config = TerminalConfig::default();
        let session = ScanSession::new(
            registry,
            &config,
            QrDecoder::new(reader, config.crop_ratio),
            Box::new(recorder.clone()),
        );
        (session, recorder)
    }

    fn session() -> (ScanSession<FakeReader>, Recorder) {
        session_with(
            registry(),
            FakeReader {
                size: (0, 0),
                payload: String::new(),
            },
        )
    }

    fn logged(result: ScanResult) -> ScanEvent {
        match result {
            ScanResult::Logged(event) => event,
            other => panic!("expected a logged event, got {other:?}"),
        }
    }

    #[test]
    fn test_manual_entry_lowercase_resolves() {
        let (mut session, recorder) = session();
        let event = logged(session.submit_manual("21bce1234", Instant::now()));
        assert_eq!(event.outcome, Outcome::Valid);
        assert_eq!(event.payload, "21BCE1234");
        assert_eq!(event.subject.unwrap().name, "Sameer Khan");
        assert_eq!(recorder.0.borrow().len(), 1);
    }

    #[test]
    fn test_registration_only_scan() {
        let (mut session, _) = session_with(
            Registry::new(vec![], registry().registrations),
            FakeReader {
                size: (0, 0),
                payload: String::new(),
            },
        );
        let subject = logged(session.accept("22BIT0099", Instant::now()))
            .subject
            .unwrap();
        assert_eq!(subject.position, REGISTERED_MEMBER);
        assert_eq!(subject.name, "Priya R");
    }

    #[test]
    fn test_unknown_payload_is_logged_invalid() {
        let (mut session, recorder) = session();
        let now = Instant::now();
        let event = logged(session.accept("NOPE", now));
        assert_eq!(event.outcome, Outcome::Invalid);
        assert!(event.subject.is_none());
        assert!(matches!(session.status(now), Some(Status::Denied { .. })));
        assert_eq!(recorder.0.borrow().len(), 1);
    }

    #[test]
    fn test_blank_manual_entry_is_ignored() {
        let (mut session, recorder) = session();
        assert_eq!(session.submit_manual("   ", Instant::now()), ScanResult::NoCode);
        assert!(session.events().is_empty());
        assert!(recorder.0.borrow().is_empty());
    }

    #[test]
    fn test_repeat_within_cooldown_adds_nothing() {
        let (mut session, recorder) = session();
        let t0 = Instant::now();
        logged(session.accept("21BCE1234", t0));
        assert_eq!(
            session.accept(" 21bce1234 ", t0 + Duration::from_secs(3)),
            ScanResult::Suppressed
        );
        assert_eq!(session.events().len(), 1);
        assert_eq!(recorder.0.borrow().len(), 1);

        logged(session.accept("21BCE1234", t0 + Duration::from_secs(4)));
        assert_eq!(session.events().len(), 2);
    }

    #[test]
    fn test_alternating_payloads_all_logged() {
        let (mut session, _) = session();
        let t0 = Instant::now();
        for (i, payload) in ["21BCE1234", "22BIT0099", "21BCE1234"].iter().enumerate() {
            logged(session.accept(payload, t0 + Duration::from_millis(100 * i as u64)));
        }
        let payloads: Vec<_> = session.events().into_iter().map(|e| e.payload).collect();
        assert_eq!(payloads, ["21BCE1234", "22BIT0099", "21BCE1234"]);
    }

    #[test]
    fn test_log_keeps_newest_fifteen() {
        let (mut session, _) = session();
        let t0 = Instant::now();
        for i in 0..16 {
            logged(session.accept(&format!("ID{i}"), t0));
        }
        let events = session.events();
        assert_eq!(events.len(), 15);
        assert_eq!(events[0].payload, "ID15");
        assert_eq!(events[14].payload, "ID1");
    }

    #[test]
    fn test_frame_without_code_produces_nothing() {
        let (mut session, recorder) = session();
        let frame = Frame::new(RgbaImage::new(64, 48));
        assert_eq!(session.scan_frame(&frame, Instant::now()), ScanResult::NoCode);
        assert!(session.events().is_empty());
        assert!(recorder.0.borrow().is_empty());
        assert!(session.status(Instant::now()).is_none());
    }

    #[test]
    fn test_crop_result_is_used_for_frame() {
        // 70% of the 720px short side
        let (mut session, _) = session_with(
            registry(),
            FakeReader {
                size: (504, 504),
                payload: "21bce1234".to_string(),
            },
        );
        let frame = Frame::new(RgbaImage::new(1280, 720));
        let event = logged(session.scan_frame(&frame, Instant::now()));
        assert_eq!(event.outcome, Outcome::Valid);
    }

    #[test]
    fn test_upload_uses_same_path() {
        let (mut session, _) = session_with(
            registry(),
            FakeReader {
                size: (200, 200),
                payload: "22BIT0099".to_string(),
            },
        );
        let image = Frame::new(RgbaImage::new(200, 200));
        let t0 = Instant::now();
        logged(session.scan_upload(&image, t0));
        assert_eq!(session.scan_upload(&image, t0), ScanResult::Suppressed);
        assert_eq!(
            session.scan_upload(&Frame::new(RgbaImage::new(10, 10)), t0),
            ScanResult::NoCode
        );
    }

    #[test]
    fn test_status_clears_after_lifetime() {
        let (mut session, _) = session();
        let t0 = Instant::now();
        logged(session.accept("21BCE1234", t0));
        assert!(matches!(session.status(t0), Some(Status::Validated { .. })));
        assert!(session.expire_status(t0 + Duration::from_secs(5)));
        assert!(session.status(t0 + Duration::from_secs(5)).is_none());
    }

    #[test]
    fn test_audit_trail_receives_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scans.jsonl");
        let (session, _) = session();
        let mut session = session.with_audit(AuditTrail::open(&path).unwrap());
        logged(session.accept("21BCE1234", Instant::now()));
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("Sameer Khan"));
    }
}
