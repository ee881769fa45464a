// SPDX-License-Identifier: MIT
//! # ppg-encode: Frame Compression for PPG Upload
//!
//! This crate turns raw camera frames into compact JPEG payloads suitable for
//! shipping to a remote PPG processor. It never looks at what the pixels mean;
//! it only changes their representation.
//!
//! ## Architecture Overview
//!
//! The encode path is a short, linear chain:
//! 1. **Convert**: NV21 / RGBA / BGRA camera buffers become tightly packed RGB8
//! 2. **Scale** (optional): clamp the longest side with `fast_image_resize`
//! 3. **Compress**: RGB8 becomes a baseline JPEG via the `image` crate
//!
//! ## Key Components
//!
//! - [`convert`]: Pixel format conversion into RGB8
//! - [`plan`]: Output size computation for aspect-preserving downscale
//! - [`scale`]: CPU downscaling of RGB8 buffers
//! - [`jpeg`]: JPEG compression with a clamped quality factor
//! - [`encoder`]: The [`FrameEncoder`] tying the stages together
//!
//! ## Usage Example
//!
//! ```rust
//! use ppg_encode::{EncodeSettings, FrameEncoder, PixelFormat, RawImage};
//!
//! let nv21 = vec![128u8; 4 * 4 * 3 / 2];
//! let mut encoder = FrameEncoder::new(EncodeSettings::default());
//! let encoded = encoder
//!     .encode(RawImage { format: PixelFormat::Nv21, width: 4, height: 4, data: &nv21 })
//!     .unwrap();
//! assert_eq!(&encoded.data[..2], &[0xFF, 0xD8]);
//! ```

pub mod convert;
pub mod encoder;
pub mod jpeg;
pub mod plan;
pub mod scale;

pub use encoder::{EncodeError, EncodeSettings, EncodedFrame, FrameEncoder, PixelFormat, RawImage};
pub use plan::Size;
