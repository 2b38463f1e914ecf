//! Configuration persistence for gatepass settings

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Application configuration persisted between sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Camera device path (None = let GStreamer pick a source)
    pub camera_device: Option<String>,
    /// Requested frame width in pixels
    pub frame_width: u32,
    /// Requested frame height in pixels
    pub frame_height: u32,
    /// Scan loop rate in ticks per second
    pub framerate: u32,
    /// Window in which a repeat of the last accepted payload is suppressed
    pub cooldown_secs: f32,
    /// Maximum number of scan events kept in memory
    pub log_capacity: usize,
    /// Lifetime of the validated/denied status line
    pub status_secs: f32,
    /// Side of the centre crop as a fraction of the shorter frame dimension
    pub crop_ratio: f32,
    /// Sound clip played on a valid scan (None = terminal bell)
    pub sound: Option<PathBuf>,
    /// Whether to request a haptic pulse on a valid scan
    pub haptics: bool,
    /// Directory holding roster.json and registrations.json
    pub data_dir: Option<PathBuf>,
    /// JSON-lines file receiving every accepted scan event
    pub audit_log: Option<PathBuf>,
}

impl TerminalConfig {
    /// Directory name used under the platform config and data dirs
    pub const ID: &'static str = "gatepass";

    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(Self::ID).join("config.json"))
    }

    /// Load configuration from disk, or return defaults if unavailable
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path.map(Path::to_path_buf).or_else(Self::default_path) else {
            log::warn!("No config directory available, using defaults");
            return Self::default();
        };

        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Self::default();
        }

        match std::fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|json| serde_json::from_str(&json).map_err(anyhow::Error::from))
        {
            Ok(config) => config,
            Err(err) => {
                log::warn!(
                    "Error loading config from {}, using defaults: {:?}",
                    path.display(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Save configuration to disk
    pub fn save(&self, path: Option<&Path>) {
        let Some(path) = path.map(Path::to_path_buf).or_else(Self::default_path) else {
            log::error!("No config directory available for saving");
            return;
        };

        if let Some(parent) = path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                log::error!("Could not create config dir {}: {:?}", parent.display(), err);
                return;
            }
        }

        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(err) = std::fs::write(&path, json) {
                    log::error!("Failed to save config: {:?}", err);
                }
            }
            Err(err) => log::error!("Failed to serialize config: {:?}", err),
        }
    }

    /// Directory the record store reads from
    pub fn records_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(Self::ID)
        })
    }

    pub fn cooldown(&self) -> Duration {
        seconds("cooldown_secs", self.cooldown_secs, Self::default().cooldown_secs)
    }

    pub fn status_lifetime(&self) -> Duration {
        seconds("status_secs", self.status_secs, Self::default().status_secs)
    }

    /// Time budget for one loop tick
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.framerate.max(1) as f64)
    }
}

/// Negative values clamp to zero; values no `Duration` can hold fall back to the default
fn seconds(field: &str, value: f32, default: f32) -> Duration {
    Duration::try_from_secs_f32(value.max(0.0)).unwrap_or_else(|err| {
        log::warn!("Ignoring {} = {}: {}, using {}", field, value, err, default);
        Duration::from_secs_f32(default)
    })
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            camera_device: None,
            frame_width: 1280,
            frame_height: 720,
            framerate: 30,
            cooldown_secs: 4.0,
            log_capacity: 15,
            status_secs: 5.0,
            crop_ratio: 0.7,
            sound: None,
            haptics: true,
            data_dir: None,
            audit_log: None,
        }
    }
}
