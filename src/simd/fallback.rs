//! Scalar row kernels, one pixel at a time.

use crate::color::{read_rgb, rgb_to_gray, rgb_to_ycbcr, write_rgb, ycbcr_to_rgb};
use crate::format::PixelFormat;

/// Convert `y.len()` packed pixels to Y, Cb and Cr samples.
#[inline]
pub fn rgb_to_ycc_row(src: &[u8], pf: PixelFormat, y: &mut [u8], cb: &mut [u8], cr: &mut [u8]) {
    let ps = pf.pixel_size();
    for (i, px) in src.chunks_exact(ps).take(y.len()).enumerate() {
        let (r, g, b) = read_rgb(px, pf);
        (y[i], cb[i], cr[i]) = rgb_to_ycbcr(r, g, b);
    }
}

/// Convert `y.len()` packed pixels to luminance samples.
#[inline]
pub fn rgb_to_gray_row(src: &[u8], pf: PixelFormat, y: &mut [u8]) {
    let ps = pf.pixel_size();
    for (out, px) in y.iter_mut().zip(src.chunks_exact(ps)) {
        let (r, g, b) = read_rgb(px, pf);
        *out = rgb_to_gray(r, g, b);
    }
}

/// Convert `y.len()` Y, Cb and Cr samples to packed pixels.
#[inline]
pub fn ycc_to_rgb_row(y: &[u8], cb: &[u8], cr: &[u8], dst: &mut [u8], pf: PixelFormat) {
    let ps = pf.pixel_size();
    for (i, px) in dst.chunks_exact_mut(ps).take(y.len()).enumerate() {
        let (r, g, b) = ycbcr_to_rgb(y[i], cb[i], cr[i]);
        write_rgb(px, pf, r, g, b);
    }
}
