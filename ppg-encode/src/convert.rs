// SPDX-License-Identifier: MIT
// Pixel format conversion into tightly packed RGB8.
// NV21 uses the fixed-point BT.601 transform phone camera stacks use for
// YUV420SP → RGB.

/// Byte length of an NV21 buffer for the given dimensions (Y plane + interleaved VU at half resolution).
pub fn nv21_len(width: u32, height: u32) -> usize {
    let w = width as usize;
    let h = height as usize;
    w * h + 2 * w.div_ceil(2) * h.div_ceil(2)
}

/// Convert an NV21 buffer to RGB8. `dst` must hold `width * height * 3` bytes.
///
/// Returns `false` (leaving `dst` untouched) when either buffer is too small.
pub fn nv21_to_rgb(src: &[u8], width: u32, height: u32, dst: &mut [u8]) -> bool {
    let w = width as usize;
    let h = height as usize;
    if src.len() < nv21_len(width, height) || dst.len() < w * h * 3 {
        return false;
    }
    let frame_size = w * h;
    let chroma_row = 2 * w.div_ceil(2);

    for j in 0..h {
        let uv_row = frame_size + (j >> 1) * chroma_row;
        let mut u = 0i32;
        let mut v = 0i32;
        for i in 0..w {
            let y = (src[j * w + i] as i32 - 16).max(0);
            if i & 1 == 0 {
                let uvp = uv_row + i;
                v = src[uvp] as i32 - 128;
                u = src[uvp + 1] as i32 - 128;
            }
            let y1192 = 1192 * y;
            let r = (y1192 + 1634 * v).clamp(0, 262_143);
            let g = (y1192 - 833 * v - 400 * u).clamp(0, 262_143);
            let b = (y1192 + 2066 * u).clamp(0, 262_143);

            let d = (j * w + i) * 3;
            dst[d] = (r >> 10) as u8;
            dst[d + 1] = (g >> 10) as u8;
            dst[d + 2] = (b >> 10) as u8;
        }
    }
    true
}

/// Drop the alpha channel of an RGBA (`swap_rb == false`) or BGRA (`swap_rb == true`) buffer.
pub fn four_channel_to_rgb(src: &[u8], swap_rb: bool, dst: &mut [u8]) -> bool {
    let pixels = src.len() / 4;
    if dst.len() < pixels * 3 {
        return false;
    }
    for (px, out) in src.chunks_exact(4).zip(dst.chunks_exact_mut(3)) {
        if swap_rb {
            out.copy_from_slice(&[px[2], px[1], px[0]]);
        } else {
            out.copy_from_slice(&px[..3]);
        }
    }
    true
}
