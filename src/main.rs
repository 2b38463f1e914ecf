mod audit;
mod capture;
mod config;
mod error;
mod feedback;
mod registry;
mod session;
mod terminal;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crate::audit::AuditTrail;
use crate::capture::qr::QrDecoder;
use crate::config::TerminalConfig;
use crate::feedback::FeedbackEmitter;
use crate::registry::{JsonStore, Registry};
use crate::session::ScanSession;
use crate::terminal::Terminal;

#[derive(Parser, Debug)]
#[command(name = "gatepass", about = "QR check-in terminal for club events")]
struct Args {
    /// Path to a JSON config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory containing roster.json and registrations.json
    #[arg(short, long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Camera device, e.g. /dev/video0
    #[arg(long)]
    camera: Option<String>,

    /// Sound clip played on a valid scan
    #[arg(long, value_name = "FILE")]
    sound: Option<PathBuf>,

    /// Append every accepted scan to this JSON-lines file
    #[arg(long, value_name = "FILE")]
    audit: Option<PathBuf>,

    /// Skip the camera; manual entry and image uploads only
    #[arg(long)]
    no_camera: bool,

    /// Decode one image, print the result and exit
    #[arg(long, value_name = "FILE")]
    image: Option<PathBuf>,

    /// Write the effective configuration back to the config file
    #[arg(long)]
    save_config: bool,
}

impl Args {
    /// CLI flags override the config file, which overrides defaults
    fn apply(&self, config: &mut TerminalConfig) {
        if let Some(dir) = &self.data_dir {
            config.data_dir = Some(dir.clone());
        }
        if let Some(camera) = &self.camera {
            config.camera_device = Some(camera.clone());
        }
        if let Some(sound) = &self.sound {
            config.sound = Some(sound.clone());
        }
        if let Some(audit) = &self.audit {
            config.audit_log = Some(audit.clone());
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let mut config = TerminalConfig::load(args.config.as_deref());
    args.apply(&mut config);
    if args.save_config {
        config.save(args.config.as_deref());
    }

    let store = JsonStore::new(config.records_dir());
    let registry = Registry::load(&store).context("Failed to load roster and registrations")?;

    let feedback = FeedbackEmitter::new(config.sound.clone(), config.haptics);
    let mut session = ScanSession::new(
        registry,
        &config,
        QrDecoder::with_rqrr(config.crop_ratio),
        Box::new(feedback),
    );
    if let Some(path) = &config.audit_log {
        match AuditTrail::open(path) {
            Ok(trail) => session = session.with_audit(trail),
            Err(err) => log::warn!("Audit trail disabled: {:#}", err),
        }
    }

    if let Some(image) = args.image {
        return terminal::scan_image_once(session, image).await;
    }

    Terminal::start(session, &config, !args.no_camera)
        .await
        .run()
        .await
}
