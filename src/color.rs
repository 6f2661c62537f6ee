//! Colorspace conversions.
//!
//! RGB <-> YCbCr uses 16-bit fixed-point BT.601 coefficients so results are
//! bit-exact across kernel families. The CMYK <-> RGB helper is a quick
//! approximation and is not colorimetrically correct.

use crate::format::PixelFormat;

pub(crate) const SCALEBITS: i32 = 16;
pub(crate) const ONE_HALF: i32 = 1 << (SCALEBITS - 1);
pub(crate) const CBCR_OFFSET: i32 = 128 << SCALEBITS;

const fn fix(x: f64) -> i32 {
    (x * (1u32 << SCALEBITS) as f64 + 0.5) as i32
}

pub(crate) const FIX_0_29900: i32 = fix(0.29900);
pub(crate) const FIX_0_58700: i32 = fix(0.58700);
pub(crate) const FIX_0_11400: i32 = fix(0.11400);
pub(crate) const FIX_0_16874: i32 = fix(0.16874);
pub(crate) const FIX_0_33126: i32 = fix(0.33126);
pub(crate) const FIX_0_50000: i32 = fix(0.50000);
pub(crate) const FIX_0_41869: i32 = fix(0.41869);
pub(crate) const FIX_0_08131: i32 = fix(0.08131);
pub(crate) const FIX_1_40200: i32 = fix(1.40200);
pub(crate) const FIX_1_77200: i32 = fix(1.77200);
pub(crate) const FIX_0_71414: i32 = fix(0.71414);
pub(crate) const FIX_0_34414: i32 = fix(0.34414);

/// Convert RGB to YCbCr.
#[inline]
pub fn rgb_to_ycbcr(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let y = (FIX_0_29900 * r + FIX_0_58700 * g + FIX_0_11400 * b + ONE_HALF) >> SCALEBITS;
    let cb = (-FIX_0_16874 * r - FIX_0_33126 * g + FIX_0_50000 * b + CBCR_OFFSET + ONE_HALF - 1)
        >> SCALEBITS;
    let cr = (FIX_0_50000 * r - FIX_0_41869 * g - FIX_0_08131 * b + CBCR_OFFSET + ONE_HALF - 1)
        >> SCALEBITS;
    (y as u8, cb as u8, cr as u8)
}

/// Luminance of an RGB triple.
#[inline]
pub fn rgb_to_gray(r: u8, g: u8, b: u8) -> u8 {
    ((FIX_0_29900 * r as i32 + FIX_0_58700 * g as i32 + FIX_0_11400 * b as i32 + ONE_HALF)
        >> SCALEBITS) as u8
}

/// Convert YCbCr to RGB.
#[inline]
pub fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> (u8, u8, u8) {
    let y = y as i32;
    let cb = cb as i32 - 128;
    let cr = cr as i32 - 128;
    let r = y + ((FIX_1_40200 * cr + ONE_HALF) >> SCALEBITS);
    let g = y + ((-FIX_0_34414 * cb - FIX_0_71414 * cr + ONE_HALF) >> SCALEBITS);
    let b = y + ((FIX_1_77200 * cb + ONE_HALF) >> SCALEBITS);
    (
        r.clamp(0, 255) as u8,
        g.clamp(0, 255) as u8,
        b.clamp(0, 255) as u8,
    )
}

/// Convert CMYK to YCCK: the inverted CMY channels go through the YCbCr
/// transform and K passes through.
#[inline]
pub fn cmyk_to_ycck(c: u8, m: u8, y: u8, k: u8) -> [u8; 4] {
    let (yy, cb, cr) = rgb_to_ycbcr(255 - c, 255 - m, 255 - y);
    [yy, cb, cr, k]
}

/// Inverse of [`cmyk_to_ycck`].
#[inline]
pub fn ycck_to_cmyk(y: u8, cb: u8, cr: u8, k: u8) -> [u8; 4] {
    let (r, g, b) = ycbcr_to_rgb(y, cb, cr);
    [255 - r, 255 - g, 255 - b, k]
}

/// Approximate CMYK to RGB. Not colorimetrically correct.
#[inline]
pub fn cmyk_to_rgb(c: u8, m: u8, y: u8, k: u8) -> (u8, u8, u8) {
    let k_inv = 255 - k as u32;
    let channel = |v: u8| (((255 - v as u32) * k_inv + 127) / 255) as u8;
    (channel(c), channel(m), channel(y))
}

/// Read one pixel of an RGB-family or gray format as an RGB triple.
#[inline]
pub(crate) fn read_rgb(pixel: &[u8], pf: PixelFormat) -> (u8, u8, u8) {
    match (pf.red_offset(), pf.green_offset(), pf.blue_offset()) {
        (Some(r), Some(g), Some(b)) => (pixel[r], pixel[g], pixel[b]),
        _ if pf == PixelFormat::Cmyk => cmyk_to_rgb(pixel[0], pixel[1], pixel[2], pixel[3]),
        _ => (pixel[0], pixel[0], pixel[0]),
    }
}

/// Store an RGB triple into one pixel, filling alpha and padding with 0xFF.
#[inline]
pub(crate) fn write_rgb(pixel: &mut [u8], pf: PixelFormat, r: u8, g: u8, b: u8) {
    match (pf.red_offset(), pf.green_offset(), pf.blue_offset()) {
        (Some(ro), Some(go), Some(bo)) => {
            pixel[ro] = r;
            pixel[go] = g;
            pixel[bo] = b;
            if let Some(a) = pf.alpha_offset().or(pf.pad_offset()) {
                pixel[a] = 0xFF;
            }
        }
        _ if pf == PixelFormat::Cmyk => {
            pixel[0] = 255 - r;
            pixel[1] = 255 - g;
            pixel[2] = 255 - b;
            pixel[3] = 0;
        }
        _ => pixel[0] = rgb_to_gray(r, g, b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_point_constants() {
        assert_eq!(FIX_0_29900 + FIX_0_58700 + FIX_0_11400, 1 << 16);
        assert_eq!(FIX_0_16874 + FIX_0_33126, FIX_0_50000);
    }

    #[test]
    fn test_gray_is_exact() {
        for v in 0..=255u8 {
            assert_eq!(rgb_to_ycbcr(v, v, v), (v, 128, 128));
            assert_eq!(ycbcr_to_rgb(v, 128, 128), (v, v, v));
            assert_eq!(rgb_to_gray(v, v, v), v);
        }
    }

    #[test]
    fn test_primaries() {
        let (y, cb, cr) = rgb_to_ycbcr(255, 0, 0);
        assert_eq!(y, 76);
        assert!(cb < 128);
        assert_eq!(cr, 255);

        let (y, cb, _) = rgb_to_ycbcr(0, 0, 255);
        assert_eq!(y, 29);
        assert_eq!(cb, 255);
    }

    #[test]
    fn test_round_trip_close() {
        for &(r, g, b) in &[(10u8, 200u8, 30u8), (255, 128, 0), (1, 2, 3), (240, 240, 10)] {
            let (y, cb, cr) = rgb_to_ycbcr(r, g, b);
            let (r2, g2, b2) = ycbcr_to_rgb(y, cb, cr);
            assert!((r as i32 - r2 as i32).abs() <= 2);
            assert!((g as i32 - g2 as i32).abs() <= 2);
            assert!((b as i32 - b2 as i32).abs() <= 2);
        }
    }

    #[test]
    fn test_ycck_k_passthrough() {
        let ycck = cmyk_to_ycck(0, 0, 0, 77);
        assert_eq!(ycck, [255, 128, 128, 77]);
        assert_eq!(ycck_to_cmyk(255, 128, 128, 77), [0, 0, 0, 77]);
    }

    #[test]
    fn test_pixel_accessors() {
        let mut px = [0u8; 4];
        write_rgb(&mut px, PixelFormat::Argb, 1, 2, 3);
        assert_eq!(px, [0xFF, 1, 2, 3]);
        assert_eq!(read_rgb(&px, PixelFormat::Argb), (1, 2, 3));

        let mut px = [0u8; 4];
        write_rgb(&mut px, PixelFormat::Bgrx, 1, 2, 3);
        assert_eq!(px, [3, 2, 1, 0xFF]);

        let gray = [90u8];
        assert_eq!(read_rgb(&gray, PixelFormat::Gray), (90, 90, 90));
    }
}
