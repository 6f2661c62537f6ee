//! Coefficient-domain image model shared by the encoder, the decoder and the
//! lossless transform engine.

use crate::format::{Colorspace, Subsampling};

/// One 8x8 block of quantized DCT coefficients in natural (row-major) order.
pub type Block = [i16; 64];

/// An APPn or COM segment carried through from a source stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedMarker {
    /// Marker code (0xE0..=0xEF or 0xFE).
    pub marker: u8,
    /// Segment payload without the length field.
    pub data: Vec<u8>,
}

impl SavedMarker {
    /// JFIF APP0 and Adobe APP14 are regenerated by the writer, never copied.
    pub fn is_regenerated(&self) -> bool {
        (self.marker == 0xE0 && self.data.starts_with(b"JFIF\0"))
            || (self.marker == 0xEE && self.data.starts_with(b"Adobe"))
    }
}

/// Per-component block plane.
#[derive(Debug, Clone)]
pub struct ComponentPlane {
    /// Component identifier written to the frame header.
    pub id: u8,
    /// Horizontal sampling factor.
    pub h: usize,
    /// Vertical sampling factor.
    pub v: usize,
    /// Quantization table slot.
    pub quant_index: usize,
    /// Blocks per row, padded to whole MCUs.
    pub blocks_w: usize,
    /// Block rows, padded to whole MCUs.
    pub blocks_h: usize,
    /// `blocks_w * blocks_h` blocks, row-major.
    pub blocks: Vec<Block>,
}

impl ComponentPlane {
    /// Zeroed plane of `blocks_w` x `blocks_h` blocks.
    pub fn new(id: u8, h: usize, v: usize, quant_index: usize, blocks_w: usize, blocks_h: usize) -> Self {
        Self {
            id,
            h,
            v,
            quant_index,
            blocks_w,
            blocks_h,
            blocks: vec![[0; 64]; blocks_w * blocks_h],
        }
    }

    /// Block at (`bx`, `by`).
    #[inline]
    pub fn block(&self, bx: usize, by: usize) -> &Block {
        &self.blocks[by * self.blocks_w + bx]
    }

    /// Mutable block at (`bx`, `by`).
    #[inline]
    pub fn block_mut(&mut self, bx: usize, by: usize) -> &mut Block {
        &mut self.blocks[by * self.blocks_w + bx]
    }
}

/// A whole image in the coefficient domain.
#[derive(Debug, Clone)]
pub struct CoefficientImage {
    /// Image width in pixels.
    pub width: usize,
    /// Image height in pixels.
    pub height: usize,
    /// Colorspace of the coded components.
    pub colorspace: Colorspace,
    /// Components in frame order.
    pub components: Vec<ComponentPlane>,
    /// Quantization tables in natural order, indexed by slot.
    pub quant_tables: [Option<[u16; 64]>; 4],
    /// APPn/COM segments to carry into an output stream.
    pub markers: Vec<SavedMarker>,
}

impl CoefficientImage {
    /// Largest horizontal sampling factor.
    pub fn max_h(&self) -> usize {
        self.components.iter().map(|c| c.h).max().unwrap_or(1)
    }

    /// Largest vertical sampling factor.
    pub fn max_v(&self) -> usize {
        self.components.iter().map(|c| c.v).max().unwrap_or(1)
    }

    /// MCU columns of an interleaved scan.
    pub fn mcus_x(&self) -> usize {
        self.width.div_ceil(8 * self.max_h())
    }

    /// MCU rows of an interleaved scan.
    pub fn mcus_y(&self) -> usize {
        self.height.div_ceil(8 * self.max_v())
    }

    /// Width of component `c` in samples.
    pub fn component_width(&self, c: usize) -> usize {
        (self.width * self.components[c].h).div_ceil(self.max_h())
    }

    /// Height of component `c` in samples.
    pub fn component_height(&self, c: usize) -> usize {
        (self.height * self.components[c].v).div_ceil(self.max_v())
    }

    /// Blocks of component `c` that hold image data, horizontally.
    pub fn width_in_blocks(&self, c: usize) -> usize {
        self.component_width(c).div_ceil(8)
    }

    /// Blocks of component `c` that hold image data, vertically.
    pub fn height_in_blocks(&self, c: usize) -> usize {
        self.component_height(c).div_ceil(8)
    }

    /// Chroma subsampling mode, if the sampling factors map onto one.
    pub fn subsampling(&self) -> Option<Subsampling> {
        match self.components.len() {
            1 => Some(Subsampling::Gray),
            3 | 4 => {
                let luma = &self.components[0];
                let chroma_ok = self.components[1..3].iter().all(|c| c.h == 1 && c.v == 1);
                let k_ok = self
                    .components
                    .get(3)
                    .map_or(true, |k| k.h == luma.h && k.v == luma.v);
                if chroma_ok && k_ok {
                    Subsampling::from_factors(luma.h, luma.v)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Allocate zeroed, MCU-padded planes for the given sampling factors.
    pub fn allocate(
        width: usize,
        height: usize,
        colorspace: Colorspace,
        sampling: &[(usize, usize, usize)],
    ) -> Self {
        let max_h = sampling.iter().map(|s| s.0).max().unwrap_or(1);
        let max_v = sampling.iter().map(|s| s.1).max().unwrap_or(1);
        let mcus_x = width.div_ceil(8 * max_h);
        let mcus_y = height.div_ceil(8 * max_v);
        let components = sampling
            .iter()
            .enumerate()
            .map(|(i, &(h, v, q))| {
                ComponentPlane::new(component_id(colorspace, i), h, v, q, mcus_x * h, mcus_y * v)
            })
            .collect();
        Self {
            width,
            height,
            colorspace,
            components,
            quant_tables: [None; 4],
            markers: Vec::new(),
        }
    }
}

/// Component identifier conventionally used for position `i`.
pub fn component_id(colorspace: Colorspace, i: usize) -> u8 {
    match colorspace {
        Colorspace::Rgb => [b'R', b'G', b'B'][i.min(2)],
        _ => (i + 1) as u8,
    }
}
