//! Row kernels that work on fixed groups of lanes so the compiler can keep
//! each stage in vector registers. Results are bit-identical to
//! [`super::fallback`].

use super::fallback;
use crate::color::{
    CBCR_OFFSET, FIX_0_08131, FIX_0_11400, FIX_0_16874, FIX_0_29900, FIX_0_33126, FIX_0_34414,
    FIX_0_41869, FIX_0_50000, FIX_0_58700, FIX_0_71414, FIX_1_40200, FIX_1_77200, ONE_HALF,
    SCALEBITS,
};
use crate::format::PixelFormat;

const LANES: usize = 8;

type Lanes = [i32; LANES];

fn rgb_offsets(pf: PixelFormat) -> Option<(usize, usize, usize)> {
    Some((pf.red_offset()?, pf.green_offset()?, pf.blue_offset()?))
}

#[inline(always)]
fn gather(src: &[u8], ps: usize, (ro, go, bo): (usize, usize, usize)) -> (Lanes, Lanes, Lanes) {
    let mut r = [0i32; LANES];
    let mut g = [0i32; LANES];
    let mut b = [0i32; LANES];
    for (l, px) in src.chunks_exact(ps).take(LANES).enumerate() {
        r[l] = px[ro] as i32;
        g[l] = px[go] as i32;
        b[l] = px[bo] as i32;
    }
    (r, g, b)
}

#[inline(always)]
fn luma(r: &Lanes, g: &Lanes, b: &Lanes) -> Lanes {
    let mut y = [0i32; LANES];
    for l in 0..LANES {
        y[l] = (FIX_0_29900 * r[l] + FIX_0_58700 * g[l] + FIX_0_11400 * b[l] + ONE_HALF)
            >> SCALEBITS;
    }
    y
}

#[inline(always)]
fn store(dst: &mut [u8], v: &Lanes) {
    for (d, s) in dst.iter_mut().zip(v) {
        *d = *s as u8;
    }
}

/// Convert `y.len()` packed pixels to Y, Cb and Cr samples.
pub fn rgb_to_ycc_row(src: &[u8], pf: PixelFormat, y: &mut [u8], cb: &mut [u8], cr: &mut [u8]) {
    let Some(offsets) = rgb_offsets(pf) else {
        return fallback::rgb_to_ycc_row(src, pf, y, cb, cr);
    };
    let ps = pf.pixel_size();
    let full = y.len() / LANES * LANES;
    for base in (0..full).step_by(LANES) {
        let (r, g, b) = gather(&src[base * ps..], ps, offsets);
        let yv = luma(&r, &g, &b);
        let mut u = [0i32; LANES];
        let mut v = [0i32; LANES];
        for l in 0..LANES {
            u[l] = (-FIX_0_16874 * r[l] - FIX_0_33126 * g[l] + FIX_0_50000 * b[l]
                + CBCR_OFFSET
                + ONE_HALF
                - 1)
                >> SCALEBITS;
            v[l] = (FIX_0_50000 * r[l] - FIX_0_41869 * g[l] - FIX_0_08131 * b[l]
                + CBCR_OFFSET
                + ONE_HALF
                - 1)
                >> SCALEBITS;
        }
        store(&mut y[base..base + LANES], &yv);
        store(&mut cb[base..base + LANES], &u);
        store(&mut cr[base..base + LANES], &v);
    }
    fallback::rgb_to_ycc_row(
        &src[full * ps..],
        pf,
        &mut y[full..],
        &mut cb[full..],
        &mut cr[full..],
    );
}

/// Convert `y.len()` packed pixels to luminance samples.
pub fn rgb_to_gray_row(src: &[u8], pf: PixelFormat, y: &mut [u8]) {
    let Some(offsets) = rgb_offsets(pf) else {
        return fallback::rgb_to_gray_row(src, pf, y);
    };
    let ps = pf.pixel_size();
    let full = y.len() / LANES * LANES;
    for base in (0..full).step_by(LANES) {
        let (r, g, b) = gather(&src[base * ps..], ps, offsets);
        store(&mut y[base..base + LANES], &luma(&r, &g, &b));
    }
    fallback::rgb_to_gray_row(&src[full * ps..], pf, &mut y[full..]);
}

/// Convert `y.len()` Y, Cb and Cr samples to packed pixels.
pub fn ycc_to_rgb_row(y: &[u8], cb: &[u8], cr: &[u8], dst: &mut [u8], pf: PixelFormat) {
    let Some((ro, go, bo)) = rgb_offsets(pf) else {
        return fallback::ycc_to_rgb_row(y, cb, cr, dst, pf);
    };
    let fill = pf.alpha_offset().or(pf.pad_offset());
    let ps = pf.pixel_size();
    let full = y.len() / LANES * LANES;
    for base in (0..full).step_by(LANES) {
        let mut r = [0i32; LANES];
        let mut g = [0i32; LANES];
        let mut b = [0i32; LANES];
        for l in 0..LANES {
            let yy = y[base + l] as i32;
            let u = cb[base + l] as i32 - 128;
            let v = cr[base + l] as i32 - 128;
            r[l] = (yy + ((FIX_1_40200 * v + ONE_HALF) >> SCALEBITS)).clamp(0, 255);
            g[l] = (yy + ((-FIX_0_34414 * u - FIX_0_71414 * v + ONE_HALF) >> SCALEBITS))
                .clamp(0, 255);
            b[l] = (yy + ((FIX_1_77200 * u + ONE_HALF) >> SCALEBITS)).clamp(0, 255);
        }
        for (l, px) in dst[base * ps..].chunks_exact_mut(ps).take(LANES).enumerate() {
            px[ro] = r[l] as u8;
            px[go] = g[l] as u8;
            px[bo] = b[l] as u8;
            if let Some(a) = fill {
                px[a] = 0xFF;
            }
        }
    }
    fallback::ycc_to_rgb_row(
        &y[full..],
        &cb[full..],
        &cr[full..],
        &mut dst[full * ps..],
        pf,
    );
}
