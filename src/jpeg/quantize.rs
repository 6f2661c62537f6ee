//! JPEG quantization tables and functions.
//!
//! Tables are kept in natural (row-major) order; the zigzag permutation is
//! applied only when a table or block is serialized.

use super::coeff::Block;

/// Standard JPEG luminance quantization table (Annex K.1).
const STD_LUMINANCE_TABLE: [u8; 64] = [
    16, 11, 10, 16, 24, 40, 51, 61, 12, 12, 14, 19, 26, 58, 60, 55, 14, 13, 16, 24, 40, 57, 69, 56,
    14, 17, 22, 29, 51, 87, 80, 62, 18, 22, 37, 56, 68, 109, 103, 77, 24, 35, 55, 64, 81, 104, 113,
    92, 49, 64, 78, 87, 103, 121, 120, 101, 72, 92, 95, 98, 112, 100, 103, 99,
];

/// Standard JPEG chrominance quantization table (Annex K.1).
const STD_CHROMINANCE_TABLE: [u8; 64] = [
    17, 18, 24, 47, 99, 99, 99, 99, 18, 21, 26, 66, 99, 99, 99, 99, 24, 26, 56, 99, 99, 99, 99, 99,
    47, 66, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99,
];

/// Zigzag scan order: `ZIGZAG[k]` is the natural index of the k-th coefficient.
pub const ZIGZAG: [usize; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27, 20,
    13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58, 59,
    52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

/// Largest magnitude of a quantized AC coefficient in an 8-bit stream.
pub const MAX_AC: i32 = 1023;

/// Largest magnitude of a quantized DC coefficient in an 8-bit stream.
pub const MAX_DC: i32 = 2047;

/// A luminance/chrominance table pair in natural order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantizationTables {
    /// Luminance table.
    pub luminance: [u16; 64],
    /// Chrominance table.
    pub chrominance: [u16; 64],
}

/// libjpeg quality-to-scale mapping.
fn quality_scale(quality: u8) -> u32 {
    let quality = quality.clamp(1, 100) as u32;
    if quality < 50 {
        5000 / quality
    } else {
        200 - 2 * quality
    }
}

fn scale_table(base: &[u8; 64], scale: u32) -> [u16; 64] {
    // Baseline-compatible: every entry fits in 8 bits.
    std::array::from_fn(|i| ((base[i] as u32 * scale + 50) / 100).clamp(1, 255) as u16)
}

impl QuantizationTables {
    /// Tables for `quality` (1-100, clamped).
    pub fn with_quality(quality: u8) -> Self {
        let scale = quality_scale(quality);
        Self {
            luminance: scale_table(&STD_LUMINANCE_TABLE, scale),
            chrominance: scale_table(&STD_CHROMINANCE_TABLE, scale),
        }
    }
}

impl Default for QuantizationTables {
    fn default() -> Self {
        Self::with_quality(75)
    }
}

/// Divide DCT output by the table, rounding to nearest and clamping to the
/// ranges an 8-bit Huffman stream can carry.
pub fn quantize_block(dct: &[f32; 64], table: &[u16; 64]) -> Block {
    std::array::from_fn(|i| {
        let q = (dct[i] / table[i] as f32).round() as i32;
        let limit = if i == 0 { MAX_DC } else { MAX_AC };
        q.clamp(-limit, limit) as i16
    })
}

/// Reorder a natural-order block into zigzag order.
pub fn zigzag_reorder(block: &Block) -> Block {
    std::array::from_fn(|k| block[ZIGZAG[k]])
}

/// Serialize a natural-order table in zigzag order.
pub fn table_zigzag(table: &[u16; 64]) -> [u16; 64] {
    std::array::from_fn(|k| table[ZIGZAG[k]])
}

/// Transpose a natural-order table.
pub fn transpose_table(table: &[u16; 64]) -> [u16; 64] {
    std::array::from_fn(|i| table[(i % 8) * 8 + i / 8])
}
