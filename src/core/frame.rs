//! # Frames
//!
//! Camera images and the sequence-numbered frames built from them.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub use ppg_encode::PixelFormat;
use ppg_encode::RawImage;

/// One image as delivered by the camera. The payload is immutable once produced.
#[derive(Debug, Clone)]
pub struct FrameImage {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub data: Arc<Vec<u8>>,
}

impl FrameImage {
    pub fn new(format: PixelFormat, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            format,
            width,
            height,
            data: Arc::new(data),
        }
    }

    /// Borrow as an encoder input.
    pub fn as_raw(&self) -> RawImage<'_> {
        RawImage {
            format: self.format,
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

/// A captured frame on its way to the backend.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonically increasing within a session, starting at 1.
    pub sequence: u64,
    /// Capture time, milliseconds since the Unix epoch.
    pub captured_at_ms: u64,
    pub image: FrameImage,
}

/// Milliseconds since the Unix epoch; clocks before 1970 read as 0.
pub fn epoch_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
