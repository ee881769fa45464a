// SPDX-License-Identifier: MIT
// CPU scaler built on fast_image_resize (SIMD-accelerated).
// RGB8 in → RGB8 out.

use fast_image_resize as fir;
use fir::images::Image;
use fir::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};

use crate::plan::Size;

#[derive(Debug)]
pub enum ScaleError {
    Fir(fir::ResizeError),
    ImageBuf(fir::ImageBufferError),
}

impl From<fir::ResizeError> for ScaleError {
    fn from(e: fir::ResizeError) -> Self {
        Self::Fir(e)
    }
}

impl From<fir::ImageBufferError> for ScaleError {
    fn from(e: fir::ImageBufferError) -> Self {
        Self::ImageBuf(e)
    }
}

impl std::fmt::Display for ScaleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScaleError::Fir(e) => write!(f, "Fast image resize error: {}", e),
            ScaleError::ImageBuf(e) => write!(f, "Image buffer error: {}", e),
        }
    }
}

impl std::error::Error for ScaleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScaleError::Fir(e) => Some(e),
            ScaleError::ImageBuf(e) => Some(e),
        }
    }
}

/// Resize a tightly packed RGB8 buffer from `src` to `out`.
///
/// Returns the input untouched when the sizes already match.
pub fn scale_rgb_cpu(
    resizer: &mut Resizer,
    rgb: Vec<u8>,
    src: Size,
    out: Size,
) -> Result<Vec<u8>, ScaleError> {
    if src == out {
        return Ok(rgb);
    }
    let src_image = Image::from_vec_u8(src.w, src.h, rgb, PixelType::U8x3)?;
    let mut dst_image = Image::new(out.w, out.h, PixelType::U8x3);

    // Bilinear is plenty for a fingertip image headed to JPEG.
    let opts = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
    resizer.resize(&src_image, &mut dst_image, &opts)?;

    Ok(dst_image.into_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_size_is_passthrough() {
        let mut resizer = Resizer::new();
        let rgb = vec![7u8; 2 * 2 * 3];
        let s = Size { w: 2, h: 2 };
        let out = scale_rgb_cpu(&mut resizer, rgb.clone(), s, s).unwrap();
        assert_eq!(out, rgb);
    }

    #[test]
    fn downscale_produces_expected_length() {
        let mut resizer = Resizer::new();
        let rgb = vec![200u8; 8 * 6 * 3];
        let out = scale_rgb_cpu(
            &mut resizer,
            rgb,
            Size { w: 8, h: 6 },
            Size { w: 4, h: 3 },
        )
        .unwrap();
        assert_eq!(out.len(), 4 * 3 * 3);
        assert!(out.iter().all(|&c| c == 200));
    }
}
