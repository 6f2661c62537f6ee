//! Inverse Discrete Cosine Transform (IDCT) for JPEG decoding.
//!
//! The accurate kernel is the integer algorithm of libjpeg's jidctint.c.
//! The fast kernel and every scaled output size use a separable float
//! transform.

use std::sync::LazyLock;

use crate::jpeg::coeff::Block;

/// Fixed-point scale factor (13 bits of fractional precision, like libjpeg)
const CONST_BITS: u32 = 13;
const PASS1_BITS: u32 = 2;

/// Fixed-point constants for the IDCT (scaled by 2^13)
/// These match libjpeg's jidctint.c
const FIX_0_298631336: i64 = 2446; // FIX(0.298631336)
const FIX_0_390180644: i64 = 3196; // FIX(0.390180644)
const FIX_0_541196100: i64 = 4433; // FIX(0.541196100)
const FIX_0_765366865: i64 = 6270; // FIX(0.765366865)
const FIX_0_899976223: i64 = 7373; // FIX(0.899976223)
const FIX_1_175875602: i64 = 9633; // FIX(1.175875602)
const FIX_1_501321110: i64 = 12299; // FIX(1.501321110)
const FIX_1_847759065: i64 = 15137; // FIX(1.847759065)
const FIX_1_961570560: i64 = 16069; // FIX(1.961570560)
const FIX_2_053119869: i64 = 16819; // FIX(2.053119869)
const FIX_2_562915447: i64 = 20995; // FIX(2.562915447)
const FIX_3_072711026: i64 = 25172; // FIX(3.072711026)

/// Which inverse transform to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdctMethod {
    /// Integer jidctint algorithm.
    Accurate,
    /// Float transform.
    Fast,
}

#[inline(always)]
fn descale(x: i64, n: u32) -> i64 {
    (x + (1 << (n - 1))) >> n
}

#[inline(always)]
fn range_limit(x: i64) -> u8 {
    (x + 128).clamp(0, 255) as u8
}

/// One 8-point butterfly of jidctint. Returns outputs 0..8.
#[inline(always)]
fn idct_1d(d: [i64; 8]) -> [i64; 8] {
    // Even part
    let z1 = (d[2] + d[6]) * FIX_0_541196100;
    let tmp2 = z1 - d[6] * FIX_1_847759065;
    let tmp3 = z1 + d[2] * FIX_0_765366865;

    let tmp0 = (d[0] + d[4]) << CONST_BITS;
    let tmp1 = (d[0] - d[4]) << CONST_BITS;

    let tmp10 = tmp0 + tmp3;
    let tmp13 = tmp0 - tmp3;
    let tmp11 = tmp1 + tmp2;
    let tmp12 = tmp1 - tmp2;

    // Odd part
    let (t0, t1, t2, t3) = (d[7], d[5], d[3], d[1]);
    let z1 = t0 + t3;
    let z2 = t1 + t2;
    let z3 = t0 + t2;
    let z4 = t1 + t3;
    let z5 = (z3 + z4) * FIX_1_175875602;

    let t0 = t0 * FIX_0_298631336;
    let t1 = t1 * FIX_2_053119869;
    let t2 = t2 * FIX_3_072711026;
    let t3 = t3 * FIX_1_501321110;
    let z1 = -z1 * FIX_0_899976223;
    let z2 = -z2 * FIX_2_562915447;
    let z3 = -z3 * FIX_1_961570560 + z5;
    let z4 = -z4 * FIX_0_390180644 + z5;

    let t0 = t0 + z1 + z3;
    let t1 = t1 + z2 + z4;
    let t2 = t2 + z2 + z3;
    let t3 = t3 + z1 + z4;

    [
        tmp10 + t3,
        tmp11 + t2,
        tmp12 + t1,
        tmp13 + t0,
        tmp13 - t0,
        tmp12 - t1,
        tmp11 - t2,
        tmp10 - t3,
    ]
}

/// Accurate integer IDCT of dequantized coefficients (natural order) into
/// an 8x8 area of `out` with row stride `stride`.
pub fn idct_islow(coeffs: &[i32; 64], out: &mut [u8], stride: usize) {
    let mut workspace = [0i64; 64];

    // Pass 1: process columns from input, store into workspace
    for col in 0..8 {
        let d: [i64; 8] = std::array::from_fn(|row| coeffs[row * 8 + col] as i64);
        if d[1..].iter().all(|&v| v == 0) {
            // AC terms all zero
            let dc = d[0] << PASS1_BITS;
            for row in 0..8 {
                workspace[row * 8 + col] = dc;
            }
            continue;
        }
        let column = idct_1d(d);
        for row in 0..8 {
            workspace[row * 8 + col] = descale(column[row], CONST_BITS - PASS1_BITS);
        }
    }

    // Pass 2: process rows from workspace, produce output
    for row in 0..8 {
        let d: [i64; 8] = std::array::from_fn(|col| workspace[row * 8 + col]);
        let samples = idct_1d(d);
        let dst = &mut out[row * stride..row * stride + 8];
        for (px, &v) in dst.iter_mut().zip(&samples) {
            *px = range_limit(descale(v, CONST_BITS + PASS1_BITS + 3));
        }
    }
}

/// `BASIS[n - 1][x * 8 + u] = C(u) / 2 * cos((2x + 1) * u * pi / 2n)` for
/// an n-point inverse transform fed by the first `min(n, 8)` coefficients.
static BASIS: LazyLock<Vec<Vec<f32>>> = LazyLock::new(|| {
    (1..=16usize)
        .map(|n| {
            (0..n * 8)
                .map(|i| {
                    let (x, u) = (i / 8, i % 8);
                    if u >= n {
                        return 0.0;
                    }
                    let c = if u == 0 { std::f64::consts::FRAC_1_SQRT_2 } else { 1.0 };
                    let angle = ((2 * x + 1) * u) as f64 * std::f64::consts::PI / (2 * n) as f64;
                    (c / 2.0 * angle.cos()) as f32
                })
                .collect()
        })
        .collect()
});

/// Float IDCT producing an `n` x `n` block (`n` in 1..=16) into `out`.
pub fn idct_float(coeffs: &[i32; 64], n: usize, out: &mut [u8], stride: usize) {
    debug_assert!((1..=16).contains(&n));
    let basis = &BASIS[n - 1];

    // Columns: 8 coefficient rows -> n sample rows.
    let mut workspace = [0.0f32; 16 * 8];
    for col in 0..8 {
        for y in 0..n {
            let b = &basis[y * 8..y * 8 + 8];
            workspace[y * 8 + col] = (0..8).map(|v| b[v] * coeffs[v * 8 + col] as f32).sum();
        }
    }

    // Rows: 8 coefficient columns -> n samples.
    for y in 0..n {
        let w = &workspace[y * 8..y * 8 + 8];
        let dst = &mut out[y * stride..y * stride + n];
        for (x, px) in dst.iter_mut().enumerate() {
            let b = &basis[x * 8..x * 8 + 8];
            let v: f32 = (0..8).map(|u| b[u] * w[u]).sum();
            *px = (v.round() as i64 + 128).clamp(0, 255) as u8;
        }
    }
}

/// Dequantize a natural-order block with a natural-order table.
pub fn dequantize(block: &Block, table: &[u16; 64]) -> [i32; 64] {
    std::array::from_fn(|i| block[i] as i32 * table[i] as i32)
}

/// Reconstruct one block as `size` x `size` samples.
pub fn idct_block(
    block: &Block,
    table: &[u16; 64],
    method: IdctMethod,
    size: usize,
    out: &mut [u8],
    stride: usize,
) {
    let coeffs = dequantize(block, table);
    if size == 8 && method == IdctMethod::Accurate {
        idct_islow(&coeffs, out, stride);
    } else {
        idct_float(&coeffs, size, out, stride);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg::dct::dct_2d;

    fn islow(coeffs: &[i32; 64]) -> [u8; 64] {
        let mut out = [0u8; 64];
        idct_islow(coeffs, &mut out, 8);
        out
    }

    #[test]
    fn test_idct_all_zeros() {
        assert!(islow(&[0; 64]).iter().all(|&p| p == 128));
    }

    #[test]
    fn test_idct_dc_only_is_flat() {
        let mut coeffs = [0i32; 64];
        // DC = 8 * mean level shift
        coeffs[0] = 8 * 40;
        assert!(islow(&coeffs).iter().all(|&p| p == 168));

        coeffs[0] = -8 * 100;
        assert!(islow(&coeffs).iter().all(|&p| p == 28));
    }

    #[test]
    fn test_idct_clamps() {
        let mut coeffs = [0i32; 64];
        coeffs[0] = 8 * 500;
        assert!(islow(&coeffs).iter().all(|&p| p == 255));
        coeffs[0] = -8 * 500;
        assert!(islow(&coeffs).iter().all(|&p| p == 0));
    }

    #[test]
    fn test_idct_inverts_forward_dct() {
        let samples: [f32; 64] = std::array::from_fn(|i| ((i * 37) % 200) as f32 - 100.0);
        let dct = dct_2d(&samples);
        let coeffs: [i32; 64] = std::array::from_fn(|i| dct[i].round() as i32);

        let accurate = islow(&coeffs);
        let mut fast = [0u8; 64];
        idct_float(&coeffs, 8, &mut fast, 8);
        for i in 0..64 {
            let expected = samples[i] + 128.0;
            assert!((accurate[i] as f32 - expected).abs() <= 2.0, "islow {i}");
            assert!((fast[i] as f32 - expected).abs() <= 2.0, "float {i}");
        }
    }

    #[test]
    fn test_scaled_sizes_keep_dc_level() {
        let mut coeffs = [0i32; 64];
        coeffs[0] = 8 * 20;
        for n in 1..=16 {
            let mut out = [0u8; 256];
            idct_float(&coeffs, n, &mut out, 16);
            for y in 0..n {
                assert!(out[y * 16..y * 16 + n].iter().all(|&p| p == 148), "n = {n}");
            }
        }
    }

    #[test]
    fn test_one_point_idct_is_block_mean() {
        let samples: [f32; 64] = std::array::from_fn(|i| (i % 8) as f32 * 4.0);
        let dct = dct_2d(&samples);
        let coeffs: [i32; 64] = std::array::from_fn(|i| dct[i].round() as i32);
        let mut out = [0u8; 1];
        idct_float(&coeffs, 1, &mut out, 1);
        // mean of 0, 4, ..., 28 is 14
        assert_eq!(out[0], 142);
    }

    #[test]
    fn test_dequantize_natural_order() {
        let mut block = [0i16; 64];
        block[0] = -10;
        block[8] = 3;
        let mut table = [2u16; 64];
        table[0] = 16;
        let result = dequantize(&block, &table);
        assert_eq!(result[0], -160);
        assert_eq!(result[8], 6);
        assert_eq!(result[1], 0);
    }
}
