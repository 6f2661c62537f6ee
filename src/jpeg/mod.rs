//! JPEG encoder core.
//!
//! Implements the coefficient-domain half of the codec:
//! - Forward DCT (accurate float or fast fixed-point) and quantization
//! - Baseline (SOF0/SOF1) and progressive (SOF2) serialization
//! - Standard or image-optimized Huffman tables
//! - Restart intervals
//!
//! Pixel handling (color conversion, downsampling) lives in `compress` and
//! `yuv`; both hand this module MCU-padded sample planes.

pub mod coeff;
pub mod dct;
pub mod huffman;
pub mod progressive;
pub mod quantize;
pub mod writer;

use log::debug;

use crate::flags::Flags;
use crate::format::Subsampling;

use coeff::CoefficientImage;
use dct::{dct_2d, dct_2d_fast};
use quantize::quantize_block;

/// Restart marker spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Restart {
    /// No restart markers.
    #[default]
    None,
    /// A marker every n MCUs.
    Mcus(usize),
    /// A marker every n MCU rows.
    Rows(usize),
}

/// JPEG encoding options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Quality level 1-100.
    pub quality: u8,
    /// Chroma subsampling.
    pub subsampling: Subsampling,
    /// Emit a progressive stream.
    pub progressive: bool,
    /// Build image-optimized Huffman tables.
    pub optimize_huffman: bool,
    /// Restart marker spacing.
    pub restart: Restart,
    /// Use the accurate DCT instead of the fast one.
    pub accurate_dct: bool,
}

impl EncodeOptions {
    /// Options implied by call arguments and flags.
    pub fn from_flags(quality: u8, subsampling: Subsampling, flags: Flags) -> Self {
        Self {
            quality,
            subsampling,
            progressive: flags.contains(Flags::PROGRESSIVE),
            optimize_huffman: false,
            restart: Restart::None,
            accurate_dct: !flags.contains(Flags::FASTDCT) || flags.contains(Flags::ACCURATEDCT),
        }
    }

    /// Apply `TJ_OPTIMIZE`, `TJ_PROGRESSIVE` and `TJ_RESTART` from the process
    /// environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`. Unparseable values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if lookup("TJ_OPTIMIZE").as_deref() == Some("1") {
            self.optimize_huffman = true;
        }
        if lookup("TJ_PROGRESSIVE").as_deref() == Some("1") {
            self.progressive = true;
        }
        if let Some(restart) = lookup("TJ_RESTART").as_deref().and_then(parse_restart) {
            self.restart = restart;
        }
        debug!("encode options: {self:?}");
        self
    }
}

/// `"<n>"` means n MCU rows, `"<n>b"` or `"<n>B"` n MCUs.
fn parse_restart(value: &str) -> Option<Restart> {
    let value = value.trim();
    let (digits, blocks) = match value.strip_suffix(|c: char| c == 'b' || c == 'B') {
        Some(digits) => (digits, true),
        None => (value, false),
    };
    let n: usize = digits.parse().ok()?;
    if !(1..=65_535).contains(&n) {
        return None;
    }
    Some(if blocks {
        Restart::Mcus(n)
    } else {
        Restart::Rows(n)
    })
}

/// Component samples padded to the component's full block grid.
#[derive(Debug, Clone)]
pub struct SamplePlane {
    /// Width in samples, a multiple of 8.
    pub width: usize,
    /// Height in samples, a multiple of 8.
    pub height: usize,
    /// Row-major samples.
    pub data: Vec<u8>,
}

impl SamplePlane {
    /// Copy `width` x `height` samples from rows of `src` (row `y` starts at
    /// `row_start(y)`), replicating the last column and row out to
    /// `padded_w` x `padded_h`.
    pub fn from_rows(
        src: &[u8],
        width: usize,
        height: usize,
        padded_w: usize,
        padded_h: usize,
        row_start: impl Fn(usize) -> usize,
    ) -> Self {
        let mut data = vec![0u8; padded_w * padded_h];
        for y in 0..padded_h {
            let start = row_start(y.min(height - 1));
            let row = &src[start..start + width];
            let out = &mut data[y * padded_w..(y + 1) * padded_w];
            out[..width].copy_from_slice(row);
            out[width..].fill(row[width - 1]);
        }
        Self {
            width: padded_w,
            height: padded_h,
            data,
        }
    }

    fn level_shifted_block(&self, bx: usize, by: usize) -> [f32; 64] {
        std::array::from_fn(|i| {
            let (x, y) = (bx * 8 + i % 8, by * 8 + i / 8);
            self.data[y * self.width + x] as f32 - 128.0
        })
    }
}

/// DCT and quantize every block of every component of `img` from `planes`.
pub fn forward_transform(img: &mut CoefficientImage, planes: &[SamplePlane], accurate: bool) {
    #[cfg(feature = "parallel")]
    forward_transform_parallel(img, planes, accurate);
    #[cfg(not(feature = "parallel"))]
    forward_transform_sequential(img, planes, accurate);
}

fn transform_block(
    plane: &SamplePlane,
    bx: usize,
    by: usize,
    table: &[u16; 64],
    accurate: bool,
) -> coeff::Block {
    let samples = plane.level_shifted_block(bx, by);
    let dct = if accurate {
        dct_2d(&samples)
    } else {
        dct_2d_fast(&samples)
    };
    quantize_block(&dct, table)
}

#[cfg(not(feature = "parallel"))]
fn forward_transform_sequential(
    img: &mut CoefficientImage,
    planes: &[SamplePlane],
    accurate: bool,
) {
    let tables = img.quant_tables;
    for (comp, plane) in img.components.iter_mut().zip(planes) {
        let table = tables[comp.quant_index].unwrap_or([1; 64]);
        let blocks_w = comp.blocks_w;
        for (i, block) in comp.blocks.iter_mut().enumerate() {
            *block = transform_block(plane, i % blocks_w, i / blocks_w, &table, accurate);
        }
    }
}

/// Parallel implementation using Rayon: blocks of a component are independent.
#[cfg(feature = "parallel")]
fn forward_transform_parallel(
    img: &mut CoefficientImage,
    planes: &[SamplePlane],
    accurate: bool,
) {
    use rayon::prelude::*;

    let tables = img.quant_tables;
    for (comp, plane) in img.components.iter_mut().zip(planes) {
        let table = tables[comp.quant_index].unwrap_or([1; 64]);
        let blocks_w = comp.blocks_w;
        comp.blocks
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, block)| {
                *block = transform_block(plane, i % blocks_w, i / blocks_w, &table, accurate);
            });
    }
}
