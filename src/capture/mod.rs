//! Frame acquisition and code decoding
//!
//! This module consolidates:
//! - Live camera capture (camera.rs)
//! - RGBA frame buffers for live and still images (frame.rs)
//! - QR decoding with centre-crop fallback (qr.rs)

pub mod camera;
pub mod frame;
pub mod qr;
