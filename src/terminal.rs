//! Main scanning loop
//!
//! One tick per frame interval: drain operator commands, poll the camera for
//! a fresh frame, expire the status line, then sleep for what is left of the
//! interval. Commands run to completion inside the tick, so only one payload
//! is ever being resolved at a time.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::capture::camera::{Camera, CameraSettings};
use crate::capture::frame::Frame;
use crate::config::TerminalConfig;
use crate::error::ScanError;
use crate::feedback::Status;
use crate::session::history::ScanEvent;
use crate::session::{ScanResult, ScanSession};

/// Global flag for graceful shutdown on SIGTERM/SIGINT
static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Image formats offered by the file picker
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "gif"];

/// Operator input from stdin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Typed identifier
    Manual(String),
    /// Decode a still image from disk
    Upload(PathBuf),
    /// Choose an image with the native file picker
    Pick,
    /// Print the event log
    ShowLog,
    Quit,
    /// A `:verb` nobody handles
    Unknown(String),
}

impl Command {
    /// Parse one line of input. Blank lines are not commands.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(rest) = line.strip_prefix(':') else {
            return Some(Command::Manual(line.to_string()));
        };

        let (verb, arg) = rest
            .split_once(char::is_whitespace)
            .map(|(verb, arg)| (verb, arg.trim()))
            .unwrap_or((rest, ""));
        match verb {
            "image" | "upload" if !arg.is_empty() => Some(Command::Upload(PathBuf::from(arg))),
            "image" | "upload" | "pick" => Some(Command::Pick),
            "log" => Some(Command::ShowLog),
            "quit" | "q" => Some(Command::Quit),
            _ => Some(Command::Unknown(verb.to_string())),
        }
    }
}

/// State of the live camera path
pub enum CameraState {
    Disabled,
    Unavailable(String),
    Live(Camera),
}

pub struct Terminal {
    session: ScanSession,
    camera: CameraState,
    interval: Duration,
    commands: mpsc::Receiver<Command>,
}

impl Terminal {
    /// Acquire the camera (if wanted) and start listening on stdin
    pub async fn start(session: ScanSession, config: &TerminalConfig, use_camera: bool) -> Self {
        setup_signal_handler();

        let camera = if use_camera {
            match Camera::acquire(CameraSettings::from(config)).await {
                Ok(camera) => CameraState::Live(camera),
                Err(err) => {
                    log::error!("{}", err);
                    CameraState::Unavailable(err.to_string())
                }
            }
        } else {
            CameraState::Disabled
        };

        let (tx, commands) = mpsc::channel(16);
        spawn_stdin_reader(tx);

        Self {
            session,
            camera,
            interval: config.frame_interval(),
            commands,
        }
    }

    /// Run until :quit, a stop signal, or nothing is left to read from
    pub async fn run(mut self) -> Result<()> {
        match &self.camera {
            CameraState::Live(_) => println!("Scanning. Hold a code up to the camera or type an ID."),
            CameraState::Unavailable(reason) => {
                println!("Camera unavailable ({reason}). Manual entry and :image still work.")
            }
            CameraState::Disabled => println!("Camera disabled. Type an ID or :image <path>."),
        }

        let mut stdin_open = true;
        while !STOP_REQUESTED.load(Ordering::Relaxed) {
            let tick_start = Instant::now();

            while stdin_open {
                match self.commands.try_recv() {
                    Ok(Command::Quit) => {
                        STOP_REQUESTED.store(true, Ordering::Relaxed);
                        break;
                    }
                    Ok(command) => self.handle(command).await,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => stdin_open = false,
                }
            }

            if !stdin_open && !matches!(self.camera, CameraState::Live(_)) {
                log::info!("Input closed and no camera, stopping");
                break;
            }

            if let CameraState::Live(camera) = &self.camera {
                if let Some(frame) = camera.poll() {
                    let now = Instant::now();
                    let result = self.session.scan_frame(&frame, now);
                    log::trace!("Frame handled {:?} after capture", frame.captured_at.elapsed());
                    report(&self.session, &result, now);
                }
            }

            if self.session.expire_status(Instant::now()) {
                println!("Ready");
            }

            let elapsed = tick_start.elapsed();
            if elapsed < self.interval {
                tokio::time::sleep(self.interval - elapsed).await;
            }
        }

        log::info!("Stopping terminal ({} events in log)", self.session.events().len());
        // Dropping the camera sets its pipeline to Null
        self.camera = CameraState::Disabled;
        Ok(())
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Manual(input) => {
                let now = Instant::now();
                let result = self.session.submit_manual(&input, now);
                if result == ScanResult::Suppressed {
                    println!("Already scanned, waiting for cooldown");
                }
                report(&self.session, &result, now);
            }
            Command::Upload(path) => self.upload(path).await,
            Command::Pick => {
                let picked = tokio::task::spawn_blocking(|| {
                    rfd::FileDialog::new()
                        .add_filter("Images", IMAGE_EXTENSIONS)
                        .pick_file()
                })
                .await;
                match picked {
                    Ok(Some(path)) => self.upload(path).await,
                    Ok(None) => log::debug!("File picker cancelled"),
                    Err(err) => log::warn!("File picker failed: {}", err),
                }
            }
            Command::ShowLog => print_log(&self.session.events()),
            Command::Unknown(verb) => {
                println!("Unknown command :{verb} (try :image <path>, :pick, :log, :quit)")
            }
            Command::Quit => {}
        }
    }

    /// Load and decode a still image. Results arriving after teardown are dropped.
    pub async fn upload(&mut self, path: PathBuf) {
        match load_image(path).await {
            Ok(image) => {
                if STOP_REQUESTED.load(Ordering::Relaxed) {
                    log::debug!("Discarding upload finished after stop");
                    return;
                }
                let now = Instant::now();
                let result = self.session.scan_upload(&image, now);
                if result == ScanResult::NoCode {
                    println!("No code found in image");
                }
                report(&self.session, &result, now);
            }
            Err(err) => println!("{err}"),
        }
    }
}

/// Decode a single image without starting the loop
pub async fn scan_image_once(session: ScanSession, path: PathBuf) -> Result<()> {
    let image = load_image(path).await?;
    let mut session = session;
    let now = Instant::now();
    let result = session.scan_upload(&image, now);
    if result == ScanResult::NoCode {
        println!("No code found in image");
    }
    report(&session, &result, now);
    Ok(())
}

async fn load_image(path: PathBuf) -> Result<Frame, ScanError> {
    let display = path.clone();
    tokio::task::spawn_blocking(move || Frame::open(&path))
        .await
        .map_err(|err| ScanError::ImageUnreadable {
            path: display,
            source: image::ImageError::IoError(std::io::Error::other(err.to_string())),
        })?
}

fn report(session: &ScanSession, result: &ScanResult, now: Instant) {
    if let Some(line) = status_line(session, result, now) {
        println!("{line}");
    }
}

/// The status board's current line, stamped with the event that set it
fn status_line(session: &ScanSession, result: &ScanResult, now: Instant) -> Option<String> {
    let ScanResult::Logged(event) = result else {
        return None;
    };
    let status = session.status(now)?;
    Some(format!("[{}] {status}", event.timestamp.format("%H:%M:%S")))
}

/// One line per logged event
pub fn describe(event: &ScanEvent) -> String {
    format!(
        "[{}] {}",
        event.timestamp.format("%H:%M:%S"),
        Status::for_event(event)
    )
}

fn print_log(events: &[ScanEvent]) {
    if events.is_empty() {
        println!("No scans yet");
        return;
    }
    for event in events {
        println!("{}", describe(event));
    }
}

/// Forward stdin lines as commands until EOF or the receiver goes away
fn spawn_stdin_reader(tx: mpsc::Sender<Command>) {
    let spawned = std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lines() {
                let Ok(line) = line else { break };
                if let Some(command) = Command::parse(&line) {
                    if tx.blocking_send(command).is_err() {
                        break;
                    }
                }
            }
        });
    if let Err(err) = spawned {
        log::warn!("Could not read stdin, manual entry disabled: {}", err);
    }
}

/// Set up signal handler for SIGTERM and SIGINT
fn setup_signal_handler() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| unsafe {
        let handler = stop_handler as extern "C" fn(libc::c_int) as libc::sighandler_t;
        libc::signal(libc::SIGTERM, handler);
        libc::signal(libc::SIGINT, handler);
    });
}

extern "C" fn stop_handler(_: libc::c_int) {
    STOP_REQUESTED.store(true, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::qr::QrDecoder;
    use crate::feedback::FeedbackSink;
    use crate::registry::{Registry, Role, RosterRecord};
    use crate::session::resolve::{Origin, Outcome, Subject};
    use chrono::{Local, TimeZone};

    struct Silent;

    impl FeedbackSink for Silent {
        fn emit(&self, _: &ScanEvent) {}
    }

    fn terminal() -> Terminal {
        let config = TerminalConfig::default();
        let registry = Registry::new(
            vec![RosterRecord {
                id: "21BCE1234".to_string(),
                name: "Sameer Khan".to_string(),
                reg_number: None,
                role: Role::Lead,
                position: "President".to_string(),
                bio: String::new(),
                photo: None,
            }],
            vec![],
        );
        let session = ScanSession::new(
            registry,
            &config,
            QrDecoder::with_rqrr(config.crop_ratio),
            Box::new(Silent),
        );
        Terminal {
            session,
            camera: CameraState::Disabled,
            interval: config.frame_interval(),
            commands: mpsc::channel(1).1,
        }
    }

    #[test]
    fn test_status_line_comes_from_board() {
        let mut terminal = terminal();
        let t0 = Instant::now();
        let result = terminal.session.submit_manual("21bce1234", t0);
        let line = status_line(&terminal.session, &result, t0).unwrap();
        assert!(line.ends_with("] VALIDATED Sameer Khan (Lead, President)"));

        let denied = terminal.session.submit_manual("NOPE", t0);
        let line = status_line(&terminal.session, &denied, t0).unwrap();
        assert!(line.ends_with("] DENIED NOPE not found"));

        let repeat = terminal.session.submit_manual("NOPE", t0);
        assert_eq!(status_line(&terminal.session, &repeat, t0), None);
    }

    #[test]
    fn test_unreadable_upload_leaves_session_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("badge.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        assert!(matches!(
            rt.block_on(load_image(path.clone())),
            Err(ScanError::ImageUnreadable { .. })
        ));

        let mut terminal = terminal();
        rt.block_on(terminal.upload(path));
        assert!(terminal.session.events().is_empty());
        assert!(terminal.session.status(Instant::now()).is_none());

        let result = terminal.session.submit_manual("21BCE1234", Instant::now());
        assert!(matches!(result, ScanResult::Logged(_)));
        assert_eq!(terminal.session.events().len(), 1);
    }

    #[test]
    fn test_parse_manual() {
        assert_eq!(
            Command::parse("  21bce1234 "),
            Some(Command::Manual("21bce1234".to_string()))
        );
        assert_eq!(Command::parse("   "), None);
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            Command::parse(":image /tmp/badge one.png"),
            Some(Command::Upload(PathBuf::from("/tmp/badge one.png")))
        );
        assert_eq!(Command::parse(":image"), Some(Command::Pick));
        assert_eq!(Command::parse(":pick"), Some(Command::Pick));
        assert_eq!(Command::parse(":log"), Some(Command::ShowLog));
        assert_eq!(Command::parse(":q"), Some(Command::Quit));
        assert_eq!(
            Command::parse(":frobnicate now"),
            Some(Command::Unknown("frobnicate".to_string()))
        );
    }

    #[test]
    fn test_describe() {
        let timestamp = Local.with_ymd_and_hms(2024, 9, 1, 9, 30, 5).unwrap();
        let mut event = ScanEvent {
            subject: Some(Subject {
                id: "r1".to_string(),
                name: "Priya R".to_string(),
                position: "Registered Member".to_string(),
                role: Role::Member,
                bio: String::new(),
                photo: None,
                origin: Origin::Registration,
            }),
            payload: "22BIT0099".to_string(),
            timestamp,
            outcome: Outcome::Valid,
        };
        assert_eq!(
            describe(&event),
            "[09:30:05] VALIDATED Priya R (Member, Registered Member)"
        );

        event.subject = None;
        event.outcome = Outcome::Invalid;
        assert_eq!(describe(&event), "[09:30:05] DENIED 22BIT0099 not found");
    }
}
