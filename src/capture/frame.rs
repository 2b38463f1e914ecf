//! RGBA frame buffers handed to the decoder

use std::path::Path;
use std::time::Instant;

use image::RgbaImage;

use crate::error::ScanError;

/// A single rasterized frame at its native resolution
#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: RgbaImage,
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(rgba: RgbaImage) -> Self {
        Self {
            rgba,
            captured_at: Instant::now(),
        }
    }

    /// Copy a possibly padded RGBA plane into a tight buffer
    ///
    /// Returns None if `data` is too short for the given geometry.
    pub fn from_plane(width: u32, height: u32, stride: usize, data: &[u8]) -> Option<Self> {
        let row = width as usize * 4;
        if stride < row || data.len() < stride * (height as usize).saturating_sub(1) + row {
            return None;
        }

        let pixels = if stride == row {
            data[..row * height as usize].to_vec()
        } else {
            let mut pixels = Vec::with_capacity(row * height as usize);
            for y in 0..height as usize {
                pixels.extend_from_slice(&data[y * stride..y * stride + row]);
            }
            pixels
        };

        RgbaImage::from_raw(width, height, pixels).map(Self::new)
    }

    /// Load a still image from disk
    pub fn open(path: &Path) -> Result<Self, ScanError> {
        let img = image::open(path).map_err(|source| ScanError::ImageUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!(
            "Loaded still image {}: {}x{} pixels",
            path.display(),
            img.width(),
            img.height()
        );
        Ok(Self::new(img.to_rgba8()))
    }

    pub fn width(&self) -> u32 {
        self.rgba.width()
    }

    pub fn height(&self) -> u32 {
        self.rgba.height()
    }
}
