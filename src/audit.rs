//! Append-only JSON-lines audit trail of accepted scans

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::session::history::ScanEvent;

pub struct AuditTrail {
    path: PathBuf,
    file: File,
}

impl AuditTrail {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create audit dir: {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open audit log: {}", path.display()))?;
        log::info!("Recording scans to {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Append one event. Failures are logged, never returned.
    pub fn record(&mut self, event: &ScanEvent) {
        let result = serde_json::to_string(event)
            .map_err(anyhow::Error::from)
            .and_then(|line| Ok(writeln!(self.file, "{line}")?));
        if let Err(err) = result {
            log::warn!("Failed to write audit entry to {}: {}", self.path.display(), err);
        }
    }
}
