// SPDX-License-Identifier: MIT
//! # Frame Encoder
//!
//! [`FrameEncoder`] runs the convert → scale → compress chain for one frame.
//! It keeps its `Resizer` between calls so repeated frames of the same size
//! reuse the resizer's internal buffers.

use fast_image_resize::Resizer;

use crate::convert::{four_channel_to_rgb, nv21_len, nv21_to_rgb};
use crate::jpeg::{DEFAULT_QUALITY, encode_rgb};
use crate::plan::{Size, fit_long_side};
use crate::scale::{ScaleError, scale_rgb_cpu};

/// Layout of the bytes handed over by the camera.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUV420 semi-planar, VU interleaved (Android camera default)
    Nv21,
    /// 8-bit RGB, tightly packed
    Rgb8,
    /// 8-bit RGBA, tightly packed
    Rgba8,
    /// 8-bit BGRA, tightly packed
    Bgra8,
    /// Already-compressed JPEG; passed through untouched
    Jpeg,
}

impl PixelFormat {
    /// Expected byte length for a raw (uncompressed) buffer, `None` for JPEG.
    pub fn expected_len(&self, width: u32, height: u32) -> Option<usize> {
        let px = width as usize * height as usize;
        match self {
            PixelFormat::Nv21 => Some(nv21_len(width, height)),
            PixelFormat::Rgb8 => Some(px * 3),
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => Some(px * 4),
            PixelFormat::Jpeg => None,
        }
    }
}

/// Borrowed view of one raw camera image.
#[derive(Clone, Copy, Debug)]
pub struct RawImage<'a> {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub data: &'a [u8],
}

/// Encoder knobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodeSettings {
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Clamp the longest side before compression
    pub max_long_side: Option<u32>,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_QUALITY,
            max_long_side: None,
        }
    }
}

/// A compressed frame ready for transport.
#[derive(Clone, Debug)]
pub struct EncodedFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug)]
pub enum EncodeError {
    InvalidDimensions { width: u32, height: u32 },
    BufferTooSmall { expected: usize, actual: usize },
    Scale(ScaleError),
    Jpeg(image::ImageError),
}

impl From<ScaleError> for EncodeError {
    fn from(e: ScaleError) -> Self {
        Self::Scale(e)
    }
}

impl From<image::ImageError> for EncodeError {
    fn from(e: image::ImageError) -> Self {
        Self::Jpeg(e)
    }
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeError::InvalidDimensions { width, height } => {
                write!(f, "Invalid frame dimensions {}x{}", width, height)
            }
            EncodeError::BufferTooSmall { expected, actual } => {
                write!(f, "Frame buffer too small: expected {} bytes, got {}", expected, actual)
            }
            EncodeError::Scale(e) => write!(f, "Scaling failed: {}", e),
            EncodeError::Jpeg(e) => write!(f, "JPEG encoding failed: {}", e),
        }
    }
}

impl std::error::Error for EncodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EncodeError::Scale(e) => Some(e),
            EncodeError::Jpeg(e) => Some(e),
            _ => None,
        }
    }
}

/// Stateful encoder; one per uploader worker.
pub struct FrameEncoder {
    settings: EncodeSettings,
    resizer: Resizer,
}

impl FrameEncoder {
    pub fn new(settings: EncodeSettings) -> Self {
        Self {
            settings,
            resizer: Resizer::new(),
        }
    }

    pub fn settings(&self) -> &EncodeSettings {
        &self.settings
    }

    /// Encode one image into JPEG bytes.
    pub fn encode(&mut self, image: RawImage<'_>) -> Result<EncodedFrame, EncodeError> {
        if image.width == 0 || image.height == 0 {
            return Err(EncodeError::InvalidDimensions {
                width: image.width,
                height: image.height,
            });
        }

        let Some(expected) = image.format.expected_len(image.width, image.height) else {
            return Ok(EncodedFrame {
                data: image.data.to_vec(),
                width: image.width,
                height: image.height,
            });
        };
        if image.data.len() < expected {
            return Err(EncodeError::BufferTooSmall {
                expected,
                actual: image.data.len(),
            });
        }

        let src = Size {
            w: image.width,
            h: image.height,
        };
        let rgb = to_rgb(image, src)?;
        let out = fit_long_side(src, self.settings.max_long_side);
        let rgb = scale_rgb_cpu(&mut self.resizer, rgb, src, out)?;
        let data = encode_rgb(&rgb, out.w, out.h, self.settings.jpeg_quality)?;

        Ok(EncodedFrame {
            data,
            width: out.w,
            height: out.h,
        })
    }
}

fn to_rgb(image: RawImage<'_>, size: Size) -> Result<Vec<u8>, EncodeError> {
    let mut rgb = vec![0u8; size.area() * 3];
    let ok = match image.format {
        PixelFormat::Nv21 => nv21_to_rgb(image.data, image.width, image.height, &mut rgb),
        PixelFormat::Rgba8 => four_channel_to_rgb(&image.data[..size.area() * 4], false, &mut rgb),
        PixelFormat::Bgra8 => four_channel_to_rgb(&image.data[..size.area() * 4], true, &mut rgb),
        PixelFormat::Rgb8 => {
            rgb.copy_from_slice(&image.data[..size.area() * 3]);
            true
        }
        PixelFormat::Jpeg => true,
    };
    if ok {
        Ok(rgb)
    } else {
        Err(EncodeError::BufferTooSmall {
            expected: image.format.expected_len(image.width, image.height).unwrap_or(0),
            actual: image.data.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv21_frame_encodes_to_jpeg() {
        let data = vec![128u8; nv21_len(32, 24)];
        let mut enc = FrameEncoder::new(EncodeSettings::default());
        let out = enc
            .encode(RawImage {
                format: PixelFormat::Nv21,
                width: 32,
                height: 24,
                data: &data,
            })
            .unwrap();
        assert_eq!((out.width, out.height), (32, 24));
        assert_eq!(&out.data[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn long_side_limit_shrinks_output() {
        let data = vec![50u8; 64 * 32 * 4];
        let mut enc = FrameEncoder::new(EncodeSettings {
            jpeg_quality: 70,
            max_long_side: Some(16),
        });
        let out = enc
            .encode(RawImage {
                format: PixelFormat::Bgra8,
                width: 64,
                height: 32,
                data: &data,
            })
            .unwrap();
        assert_eq!((out.width, out.height), (16, 8));
    }

    #[test]
    fn jpeg_passes_through() {
        let data = vec![0xFF, 0xD8, 0x00, 0xFF, 0xD9];
        let mut enc = FrameEncoder::new(EncodeSettings::default());
        let out = enc
            .encode(RawImage {
                format: PixelFormat::Jpeg,
                width: 1,
                height: 1,
                data: &data,
            })
            .unwrap();
        assert_eq!(out.data, data);
    }

    #[test]
    fn short_buffer_is_rejected() {
        let data = vec![0u8; 10];
        let mut enc = FrameEncoder::new(EncodeSettings::default());
        let err = enc
            .encode(RawImage {
                format: PixelFormat::Rgb8,
                width: 4,
                height: 4,
                data: &data,
            })
            .unwrap_err();
        assert!(matches!(err, EncodeError::BufferTooSmall { expected: 48, actual: 10 }));
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        let mut enc = FrameEncoder::new(EncodeSettings::default());
        let err = enc
            .encode(RawImage {
                format: PixelFormat::Rgb8,
                width: 0,
                height: 4,
                data: &[],
            })
            .unwrap_err();
        assert!(matches!(err, EncodeError::InvalidDimensions { .. }));
    }
}
