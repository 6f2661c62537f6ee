//! Forward discrete cosine transform.
//!
//! Two kernels: an accurate separable float transform and a fast fixed-point
//! one (AAN butterfly, 8-bit fractional precision). Both produce coefficients
//! on the standard JPEG scale, so quantization does not depend on the kernel.

use std::sync::LazyLock;

/// `COS_TABLE[x][u] = cos((2x + 1) * u * pi / 16)`.
static COS_TABLE: LazyLock<[[f32; 8]; 8]> = LazyLock::new(|| {
    std::array::from_fn(|x| {
        std::array::from_fn(|u| {
            (((2 * x + 1) * u) as f64 * std::f64::consts::PI / 16.0).cos() as f32
        })
    })
});

/// alpha(0) = 1/sqrt(2), alpha(k) = 1 for k > 0
const ALPHA: [f32; 8] = [std::f32::consts::FRAC_1_SQRT_2, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];

/// Accurate 2D DCT of a level-shifted 8x8 block.
pub fn dct_2d(block: &[f32; 64]) -> [f32; 64] {
    let mut temp = [0.0f32; 64];
    let mut result = [0.0f32; 64];

    for row in 0..8 {
        let start = row * 8;
        dct_1d(&block[start..start + 8], &mut temp[start..start + 8]);
    }

    for col in 0..8 {
        let col_in: [f32; 8] = std::array::from_fn(|row| temp[row * 8 + col]);
        let mut col_out = [0.0f32; 8];
        dct_1d(&col_in, &mut col_out);
        for row in 0..8 {
            result[row * 8 + col] = col_out[row];
        }
    }

    result
}

fn dct_1d(input: &[f32], output: &mut [f32]) {
    let cos = &*COS_TABLE;
    for k in 0..8 {
        let sum: f32 = (0..8).map(|n| input[n] * cos[n][k]).sum();
        output[k] = 0.5 * ALPHA[k] * sum;
    }
}

const CONST_BITS: i32 = 8;
/// Extra input precision carried through both passes.
const PASS_BITS: i32 = 2;

const fn fix(x: f64) -> i32 {
    (x * (1 << CONST_BITS) as f64 + 0.5) as i32
}

const FIX_0_382683433: i32 = fix(0.382683433);
const FIX_0_541196100: i32 = fix(0.541196100);
const FIX_0_707106781: i32 = fix(0.707106781);
const FIX_1_306562965: i32 = fix(1.306562965);

#[inline]
fn mul(a: i32, c: i32) -> i32 {
    (a * c) >> CONST_BITS
}

/// AAN output scale: `8 * cos(k*pi/16) * sqrt(2)` for k > 0, 8 for k = 0.
static AAN_SCALE: LazyLock<[f32; 8]> = LazyLock::new(|| {
    std::array::from_fn(|k| {
        if k == 0 {
            8.0
        } else {
            (8.0 * (k as f64 * std::f64::consts::PI / 16.0).cos() * std::f64::consts::SQRT_2)
                as f32
        }
    })
});

fn aan_1d(d: &mut [i32; 64], base: usize, step: usize) {
    let at = |i: usize| base + i * step;
    let tmp0 = d[at(0)] + d[at(7)];
    let tmp7 = d[at(0)] - d[at(7)];
    let tmp1 = d[at(1)] + d[at(6)];
    let tmp6 = d[at(1)] - d[at(6)];
    let tmp2 = d[at(2)] + d[at(5)];
    let tmp5 = d[at(2)] - d[at(5)];
    let tmp3 = d[at(3)] + d[at(4)];
    let tmp4 = d[at(3)] - d[at(4)];

    // Even part
    let tmp10 = tmp0 + tmp3;
    let tmp13 = tmp0 - tmp3;
    let tmp11 = tmp1 + tmp2;
    let tmp12 = tmp1 - tmp2;

    d[at(0)] = tmp10 + tmp11;
    d[at(4)] = tmp10 - tmp11;

    let z1 = mul(tmp12 + tmp13, FIX_0_707106781);
    d[at(2)] = tmp13 + z1;
    d[at(6)] = tmp13 - z1;

    // Odd part
    let tmp10 = tmp4 + tmp5;
    let tmp11 = tmp5 + tmp6;
    let tmp12 = tmp6 + tmp7;

    let z5 = mul(tmp10 - tmp12, FIX_0_382683433);
    let z2 = mul(tmp10, FIX_0_541196100) + z5;
    let z4 = mul(tmp12, FIX_1_306562965) + z5;
    let z3 = mul(tmp11, FIX_0_707106781);

    let z11 = tmp7 + z3;
    let z13 = tmp7 - z3;

    d[at(5)] = z13 + z2;
    d[at(3)] = z13 - z2;
    d[at(1)] = z11 + z4;
    d[at(7)] = z11 - z4;
}

/// Fast fixed-point 2D DCT. Output is rescaled to match [`dct_2d`].
pub fn dct_2d_fast(block: &[f32; 64]) -> [f32; 64] {
    let mut data: [i32; 64] =
        std::array::from_fn(|i| (block[i] * (1 << PASS_BITS) as f32).round() as i32);
    for row in 0..8 {
        aan_1d(&mut data, row * 8, 1);
    }
    for col in 0..8 {
        aan_1d(&mut data, col, 8);
    }
    let scale = &*AAN_SCALE;
    let descale = 8.0 / (1 << PASS_BITS) as f32;
    std::array::from_fn(|i| data[i] as f32 / (scale[i / 8] * scale[i % 8]) * descale)
}
