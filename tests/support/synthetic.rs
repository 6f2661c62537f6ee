//! Synthetic test image generation.
//!
//! Generates deterministic test patterns in any pixel format. All functions
//! produce reproducible output suitable for regression testing.

#![allow(dead_code)]

use rand::{rngs::StdRng, Rng, SeedableRng};
use turbopix::PixelFormat;

/// Pack RGB triples into `pf`. Alpha and padding bytes are 0xFF; gray takes
/// the green channel; CMYK stores the inverted RGB with K = 0.
pub fn pack(rgb: &[u8], pf: PixelFormat) -> Vec<u8> {
    let ps = pf.pixel_size();
    let mut out = vec![0xFFu8; rgb.len() / 3 * ps];
    for (px, src) in out.chunks_exact_mut(ps).zip(rgb.chunks_exact(3)) {
        match pf {
            PixelFormat::Gray => px[0] = src[1],
            PixelFormat::Cmyk => {
                px[0] = 255 - src[0];
                px[1] = 255 - src[1];
                px[2] = 255 - src[2];
                px[3] = 0;
            }
            _ => {
                if let (Some(r), Some(g), Some(b)) = (pf.red_offset(), pf.green_offset(), pf.blue_offset()) {
                    px[r] = src[0];
                    px[g] = src[1];
                    px[b] = src[2];
                }
            }
        }
    }
    out
}

/// Generate a solid color image.
pub fn solid_color(width: u32, height: u32, r: u8, g: u8, b: u8) -> Vec<u8> {
    [r, g, b].repeat((width * height) as usize)
}

/// Generate an RGB gradient (red horizontal, green vertical, blue diagonal).
pub fn gradient_rgb(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            let r = ((x * 255) / width.max(1)) as u8;
            let g = ((y * 255) / height.max(1)) as u8;
            let b = (((x + y) * 127) / (width + height).max(1)) as u8;
            pixels.extend_from_slice(&[r, g, b]);
        }
    }
    pixels
}

/// Generate a checkerboard pattern.
pub fn checkerboard(width: u32, height: u32, cell_size: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    let cell_size = cell_size.max(1);
    for y in 0..height {
        for x in 0..width {
            let v = if ((x / cell_size) + (y / cell_size)) % 2 == 0 { 255 } else { 0 };
            pixels.extend_from_slice(&[v, v, v]);
        }
    }
    pixels
}

/// Image made of flat 8x8 tiles whose value encodes the tile position, so
/// that block moves are visible after decoding.
pub fn tiles(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            let v = (((x / 8) * 37 + (y / 8) * 91) % 200 + 28) as u8;
            pixels.extend_from_slice(&[v, v, v]);
        }
    }
    pixels
}

/// Seeded RGB noise.
pub fn noise(width: u32, height: u32, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..width * height * 3).map(|_| rng.gen()).collect()
}

/// Seeded noise smoothed over 4x4 cells, closer to photographic content.
pub fn smooth_noise(width: u32, height: u32, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let cells_w = width.div_ceil(4) + 1;
    let cells_h = height.div_ceil(4) + 1;
    let cells: Vec<[u8; 3]> = (0..cells_w * cells_h).map(|_| rng.gen()).collect();
    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            let (cx, cy) = (x / 4, y / 4);
            let (fx, fy) = (x % 4, y % 4);
            for ch in 0..3 {
                let at = |i: u32, j: u32| cells[(j * cells_w + i) as usize][ch] as u32;
                let top = at(cx, cy) * (4 - fx) + at(cx + 1, cy) * fx;
                let bottom = at(cx, cy + 1) * (4 - fx) + at(cx + 1, cy + 1) * fx;
                pixels.push(((top * (4 - fy) + bottom * fy) / 16) as u8);
            }
        }
    }
    pixels
}

/// Predefined dimensions for edge case testing.
pub const EDGE_CASE_DIMENSIONS: &[(u32, u32, &str)] = &[
    (1, 1, "minimum"),
    (2, 2, "tiny"),
    (7, 7, "not_power_of_2"),
    (8, 8, "single_block"),
    (9, 9, "just_over_block"),
    (16, 16, "single_mcu"),
    (15, 17, "odd_dimensions"),
    (1, 40, "tall_narrow"),
    (40, 1, "wide_short"),
    (35, 33, "partial_mcus"),
];
