// SPDX-License-Identifier: MIT
//! # Downscale Planning
//!
//! Computes the output size for an optional "max long side" constraint.
//! The aspect ratio is always preserved and images are never upscaled.

/// Represents a 2D size with width and height in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Size {
    pub w: u32,
    pub h: u32,
}

impl Size {
    /// Number of pixels covered by this size.
    pub fn area(&self) -> usize {
        self.w as usize * self.h as usize
    }
}

/// Compute the output size for `input` when the longest side is clamped to `max_long_side`.
///
/// Returns `input` unchanged when no limit is given or the image already fits.
/// Both output dimensions are at least 1px.
pub fn fit_long_side(input: Size, max_long_side: Option<u32>) -> Size {
    let Some(max_side) = max_long_side else {
        return input;
    };
    let long = input.w.max(input.h);
    if long <= max_side || long == 0 {
        return input;
    }
    let scale = max_side as f64 / long as f64;
    let w = ((input.w as f64 * scale).round() as u32).max(1);
    let h = ((input.h as f64 * scale).round() as u32).max(1);
    Size { w, h }
}
