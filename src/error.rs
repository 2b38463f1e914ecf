//! Errors surfaced to the operator
//!
//! Decode misses and unmatched payloads are ordinary outcomes and never show up here.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied, missing device or a pipeline that never produced a frame
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),

    /// Upload path only; leaves the log and de-duplicator untouched
    #[error("could not read image {}: {source}", path.display())]
    ImageUnreadable {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("could not load records from {}: {source}", path.display())]
    Records {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}
