// SPDX-License-Identifier: MIT
// RGB8 → baseline JPEG.

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageResult};

/// Default JPEG quality used for frame uploads.
pub const DEFAULT_QUALITY: u8 = 80;

/// Compress a tightly packed RGB8 buffer. Quality is clamped to 1..=100.
pub fn encode_rgb(rgb: &[u8], width: u32, height: u32, quality: u8) -> ImageResult<Vec<u8>> {
    let mut out = Vec::with_capacity(rgb.len() / 8);
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
        encoder.encode(rgb, width, height, ExtendedColorType::Rgb8)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_jpeg_markers() {
        let rgb = vec![90u8; 16 * 16 * 3];
        let jpeg = encode_rgb(&rgb, 16, 16, DEFAULT_QUALITY).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn out_of_range_quality_is_clamped() {
        let rgb = vec![10u8; 8 * 8 * 3];
        assert!(encode_rgb(&rgb, 8, 8, 0).is_ok());
        assert!(encode_rgb(&rgb, 8, 8, 255).is_ok());
    }
}
