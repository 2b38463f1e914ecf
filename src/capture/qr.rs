//! QR code decoding using rqrr
//!
//! Whole-frame decode first, then a tighter centre crop. Each attempt tries
//! both normal and inverted polarity.

use image::{DynamicImage, GrayImage, RgbaImage};

/// Black-box decoding primitive: grayscale buffer in, text out
pub trait CodeReader: Send {
    fn read(&self, gray: &GrayImage) -> Option<String>;
}

/// rqrr-backed reader returning the first grid that decodes
#[derive(Debug, Clone, Copy, Default)]
pub struct Rqrr;

impl CodeReader for Rqrr {
    fn read(&self, gray: &GrayImage) -> Option<String> {
        let mut prepared = rqrr::PreparedImage::prepare(gray.clone());
        prepared
            .detect_grids()
            .into_iter()
            .find_map(|grid| grid.decode().ok().map(|(_, content)| content))
    }
}

/// Decode adapter with centre-crop fallback
#[derive(Debug, Clone)]
pub struct QrDecoder<R = Rqrr> {
    reader: R,
    crop_ratio: f32,
}

impl QrDecoder<Rqrr> {
    pub fn with_rqrr(crop_ratio: f32) -> Self {
        Self::new(Rqrr, crop_ratio)
    }
}

impl<R: CodeReader> QrDecoder<R> {
    pub fn new(reader: R, crop_ratio: f32) -> Self {
        Self {
            reader,
            crop_ratio: crop_ratio.clamp(0.0, 1.0),
        }
    }

    /// Decode a frame, returning the first payload found
    pub fn decode(&self, img: &RgbaImage) -> Option<String> {
        if img.width() == 0 || img.height() == 0 {
            return None;
        }

        let gray = DynamicImage::ImageRgba8(img.clone()).to_luma8();
        if let Some(text) = self.read_either_polarity(&gray) {
            log::trace!("Decoded from whole {}x{} frame", img.width(), img.height());
            return Some(text);
        }

        let crop = center_crop(&gray, self.crop_ratio)?;
        let text = self.read_either_polarity(&crop)?;
        log::debug!(
            "Decoded from {}x{} centre crop after whole-frame miss",
            crop.width(),
            crop.height()
        );
        Some(text)
    }

    fn read_either_polarity(&self, gray: &GrayImage) -> Option<String> {
        self.reader.read(gray).or_else(|| {
            let mut inverted = gray.clone();
            image::imageops::invert(&mut inverted);
            self.reader.read(&inverted)
        })
    }
}

/// Centred square covering `ratio` of the shorter side
///
/// None when the crop would be empty or identical to the input.
pub fn center_crop(gray: &GrayImage, ratio: f32) -> Option<GrayImage> {
    let (w, h) = gray.dimensions();
    let side = ((w.min(h) as f32) * ratio).round() as u32;
    if side == 0 || (side == w && side == h) {
        return None;
    }
    let x = (w - side) / 2;
    let y = (h - side) / 2;
    Some(image::imageops::crop_imm(gray, x, y, side, side).to_image())
}
