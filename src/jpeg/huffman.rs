//! JPEG Huffman encoding.
//!
//! Entropy coding is written once against [`SymbolSink`]: the same traversal
//! either counts symbol frequencies (for optimized tables) or emits codes.

use crate::bits::EntropyWriter;
use crate::error::{Error, Result};
use crate::jpeg::coeff::Block;
use crate::jpeg::quantize::ZIGZAG;

/// Standard DC luminance Huffman table (number of codes per bit length).
const DC_LUM_BITS: [u8; 16] = [0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0];

/// Standard DC luminance Huffman values.
const DC_LUM_VALS: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

/// Standard DC chrominance Huffman table.
const DC_CHROM_BITS: [u8; 16] = [0, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0];

/// Standard DC chrominance Huffman values.
const DC_CHROM_VALS: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

/// Standard AC luminance Huffman table.
const AC_LUM_BITS: [u8; 16] = [0, 2, 1, 3, 3, 2, 4, 3, 5, 5, 4, 4, 0, 0, 1, 125];

/// Standard AC luminance Huffman values.
const AC_LUM_VALS: [u8; 162] = [
    0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12, 0x21, 0x31, 0x41, 0x06, 0x13, 0x51, 0x61, 0x07,
    0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xa1, 0x08, 0x23, 0x42, 0xb1, 0xc1, 0x15, 0x52, 0xd1, 0xf0,
    0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0a, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x25, 0x26, 0x27, 0x28,
    0x29, 0x2a, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49,
    0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69,
    0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89,
    0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7,
    0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3, 0xc4, 0xc5,
    0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xe1, 0xe2,
    0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xf1, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

/// Standard AC chrominance Huffman table.
const AC_CHROM_BITS: [u8; 16] = [0, 2, 1, 2, 4, 4, 3, 4, 7, 5, 4, 4, 0, 1, 2, 119];

/// Standard AC chrominance Huffman values.
const AC_CHROM_VALS: [u8; 162] = [
    0x00, 0x01, 0x02, 0x03, 0x11, 0x04, 0x05, 0x21, 0x31, 0x06, 0x12, 0x41, 0x51, 0x07, 0x61, 0x71,
    0x13, 0x22, 0x32, 0x81, 0x08, 0x14, 0x42, 0x91, 0xa1, 0xb1, 0xc1, 0x09, 0x23, 0x33, 0x52, 0xf0,
    0x15, 0x62, 0x72, 0xd1, 0x0a, 0x16, 0x24, 0x34, 0xe1, 0x25, 0xf1, 0x17, 0x18, 0x19, 0x1a, 0x26,
    0x27, 0x28, 0x29, 0x2a, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48,
    0x49, 0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68,
    0x69, 0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87,
    0x88, 0x89, 0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5,
    0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3,
    0xc4, 0xc5, 0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda,
    0xe2, 0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

/// Longest end-of-band run a single EOBn symbol can express.
pub const MAX_EOB_RUN: u32 = 0x7FFF;

/// DHT contents: code counts per length and symbols in code order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuffmanSpec {
    /// Number of codes of each length 1..=16.
    pub bits: [u8; 16],
    /// Symbols ordered by code.
    pub vals: Vec<u8>,
}

impl HuffmanSpec {
    /// Standard table for DC (`ac == false`) or AC, luma or chroma.
    pub fn standard(ac: bool, luma: bool) -> Self {
        let (bits, vals): (&[u8; 16], &[u8]) = match (ac, luma) {
            (false, true) => (&DC_LUM_BITS, &DC_LUM_VALS),
            (false, false) => (&DC_CHROM_BITS, &DC_CHROM_VALS),
            (true, true) => (&AC_LUM_BITS, &AC_LUM_VALS),
            (true, false) => (&AC_CHROM_BITS, &AC_CHROM_VALS),
        };
        Self {
            bits: *bits,
            vals: vals.to_vec(),
        }
    }

    /// Optimal length-limited table for the given symbol frequencies
    /// (Annex K.2). One pseudo-symbol is reserved so no real code is all ones.
    pub fn from_counts(counts: &[u64; 256]) -> Self {
        const MAX_CLEN: usize = 32;

        let mut freq = [0u64; 257];
        freq[..256].copy_from_slice(counts);
        if counts.iter().all(|&c| c == 0) {
            freq[0] = 1;
        }
        freq[256] = 1;

        let codesize = loop {
            let sizes = code_sizes(freq);
            if sizes.iter().all(|&s| s <= MAX_CLEN) {
                break sizes;
            }
            // Tree too deep: flatten the distribution and retry.
            for f in freq[..256].iter_mut().filter(|f| **f > 0) {
                *f = (*f / 2).max(1);
            }
        };

        let mut bits = [0usize; MAX_CLEN + 1];
        for &size in codesize.iter().filter(|&&s| s > 0) {
            bits[size] += 1;
        }

        // Limit code lengths to 16 bits.
        for i in (17..=MAX_CLEN).rev() {
            while bits[i] > 0 {
                let mut j = i - 2;
                while bits[j] == 0 {
                    j -= 1;
                }
                bits[i] -= 2;
                bits[i - 1] += 1;
                bits[j + 1] += 2;
                bits[j] -= 1;
            }
        }

        // Drop the reserved pseudo-symbol from the longest length.
        let mut i = 16;
        while i > 0 && bits[i] == 0 {
            i -= 1;
        }
        bits[i] = bits[i].saturating_sub(1);

        let mut vals = Vec::new();
        for len in 1..=MAX_CLEN {
            for (sym, &size) in codesize[..256].iter().enumerate() {
                if size == len {
                    vals.push(sym as u8);
                }
            }
        }

        Self {
            bits: std::array::from_fn(|i| bits[i + 1] as u8),
            vals,
        }
    }
}

/// Huffman code lengths for `freq`, by repeatedly merging the two least
/// frequent subtrees. Ties go to the larger symbol index.
fn code_sizes(mut freq: [u64; 257]) -> [usize; 257] {
    let mut codesize = [0usize; 257];
    let mut others = [None::<usize>; 257];

    loop {
        let mut c1 = None;
        let mut v = u64::MAX;
        for (i, &f) in freq.iter().enumerate() {
            if f != 0 && f <= v {
                v = f;
                c1 = Some(i);
            }
        }
        let Some(mut c1) = c1 else { break };

        let mut c2 = None;
        let mut v = u64::MAX;
        for (i, &f) in freq.iter().enumerate() {
            if f != 0 && f <= v && i != c1 {
                v = f;
                c2 = Some(i);
            }
        }
        let Some(mut c2) = c2 else { break };

        freq[c1] += freq[c2];
        freq[c2] = 0;

        codesize[c1] += 1;
        while let Some(next) = others[c1] {
            c1 = next;
            codesize[c1] += 1;
        }
        others[c1] = Some(c2);

        codesize[c2] += 1;
        while let Some(next) = others[c2] {
            c2 = next;
            codesize[c2] += 1;
        }
    }
    codesize
}

/// Huffman code: (code, length in bits).
#[derive(Debug, Clone, Copy, Default)]
struct HuffCode {
    code: u16,
    length: u8,
}

/// Symbol-to-code lookup for one table.
#[derive(Debug, Clone)]
pub struct HuffmanEncoder {
    codes: [HuffCode; 256],
}

impl HuffmanEncoder {
    /// Build canonical codes from a DHT specification.
    pub fn new(spec: &HuffmanSpec) -> Result<Self> {
        let mut codes = [HuffCode::default(); 256];
        let mut code: u32 = 0;
        let mut vals = spec.vals.iter();
        for (length, &count) in spec.bits.iter().enumerate() {
            for _ in 0..count {
                let &symbol = vals
                    .next()
                    .ok_or_else(|| Error::corrupt("Huffman table has fewer symbols than codes"))?;
                if code >= 1 << (length + 1) {
                    return Err(Error::corrupt("Huffman table is oversubscribed"));
                }
                codes[symbol as usize] = HuffCode {
                    code: code as u16,
                    length: (length + 1) as u8,
                };
                code += 1;
            }
            code <<= 1;
        }
        Ok(Self { codes })
    }

    #[inline]
    fn code(&self, symbol: u8) -> Result<HuffCode> {
        let code = self.codes[symbol as usize];
        if code.length == 0 {
            return Err(Error::invalid(format!(
                "symbol {symbol:#04x} has no Huffman code"
            )));
        }
        Ok(code)
    }
}

/// Receiver of the entropy-coded symbol stream.
pub trait SymbolSink {
    /// A DC-table symbol for table slot `slot`.
    fn dc_symbol(&mut self, slot: usize, symbol: u8) -> Result<()>;
    /// An AC-table symbol for table slot `slot`.
    fn ac_symbol(&mut self, slot: usize, symbol: u8) -> Result<()>;
    /// Raw appended bits (magnitudes, EOB run lengths).
    fn raw_bits(&mut self, value: u32, count: u8);
    /// Restart marker `RSTn` boundary.
    fn restart(&mut self, _index: u8) {}
}

/// Collects symbol frequencies per table slot.
#[derive(Debug, Clone)]
pub struct SymbolCounter {
    /// DC frequencies by slot.
    pub dc: [[u64; 256]; 4],
    /// AC frequencies by slot.
    pub ac: [[u64; 256]; 4],
}

impl SymbolCounter {
    /// All counts zero.
    pub fn new() -> Self {
        Self {
            dc: [[0; 256]; 4],
            ac: [[0; 256]; 4],
        }
    }
}

impl Default for SymbolCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolSink for SymbolCounter {
    fn dc_symbol(&mut self, slot: usize, symbol: u8) -> Result<()> {
        self.dc[slot][symbol as usize] += 1;
        Ok(())
    }

    fn ac_symbol(&mut self, slot: usize, symbol: u8) -> Result<()> {
        self.ac[slot][symbol as usize] += 1;
        Ok(())
    }

    fn raw_bits(&mut self, _value: u32, _count: u8) {}
}

/// Writes Huffman codes into a bit writer.
#[derive(Debug)]
pub struct SymbolEmitter<'a> {
    writer: &'a mut EntropyWriter,
    dc: [Option<&'a HuffmanEncoder>; 4],
    ac: [Option<&'a HuffmanEncoder>; 4],
}

impl<'a> SymbolEmitter<'a> {
    /// Emit into `writer` using the tables installed in each slot.
    pub fn new(
        writer: &'a mut EntropyWriter,
        dc: [Option<&'a HuffmanEncoder>; 4],
        ac: [Option<&'a HuffmanEncoder>; 4],
    ) -> Self {
        Self { writer, dc, ac }
    }

    fn emit(table: Option<&HuffmanEncoder>, writer: &mut EntropyWriter, symbol: u8) -> Result<()> {
        let table = table.ok_or_else(|| Error::invalid("no Huffman table in slot"))?;
        let code = table.code(symbol)?;
        writer.write_bits(code.code as u32, code.length);
        Ok(())
    }
}

impl SymbolSink for SymbolEmitter<'_> {
    fn dc_symbol(&mut self, slot: usize, symbol: u8) -> Result<()> {
        Self::emit(self.dc[slot], self.writer, symbol)
    }

    fn ac_symbol(&mut self, slot: usize, symbol: u8) -> Result<()> {
        Self::emit(self.ac[slot], self.writer, symbol)
    }

    fn raw_bits(&mut self, value: u32, count: u8) {
        if count > 0 {
            self.writer.write_bits(value, count);
        }
    }

    fn restart(&mut self, index: u8) {
        self.writer.write_restart(index);
    }
}

/// Get the category (number of bits needed) for a value.
#[inline]
pub fn category(value: i32) -> u8 {
    (32 - value.unsigned_abs().leading_zeros()) as u8
}

/// Magnitude bits of a value: negative values use one's complement.
#[inline]
pub fn encode_value(value: i32) -> (u32, u8) {
    let cat = category(value);
    if cat == 0 {
        return (0, 0);
    }
    let bits = if value < 0 { value - 1 } else { value } as u32;
    (bits & ((1u32 << cat) - 1), cat)
}

/// Encode a DC difference.
#[inline]
pub fn encode_dc<S: SymbolSink>(sink: &mut S, slot: usize, diff: i32) -> Result<()> {
    let (bits, cat) = encode_value(diff);
    sink.dc_symbol(slot, cat)?;
    sink.raw_bits(bits, cat);
    Ok(())
}

/// Encode a natural-order block for a sequential scan. `prev_dc` carries the
/// DC predictor of the component.
pub fn encode_block<S: SymbolSink>(
    sink: &mut S,
    block: &Block,
    prev_dc: &mut i32,
    dc_slot: usize,
    ac_slot: usize,
) -> Result<()> {
    let dc = block[0] as i32;
    encode_dc(sink, dc_slot, dc - *prev_dc)?;
    *prev_dc = dc;

    let mut zero_run = 0u8;
    for &pos in &ZIGZAG[1..] {
        let ac = block[pos] as i32;
        if ac == 0 {
            zero_run += 1;
            continue;
        }
        while zero_run >= 16 {
            sink.ac_symbol(ac_slot, 0xF0)?;
            zero_run -= 16;
        }
        let (bits, cat) = encode_value(ac);
        sink.ac_symbol(ac_slot, (zero_run << 4) | cat)?;
        sink.raw_bits(bits, cat);
        zero_run = 0;
    }

    if zero_run > 0 {
        sink.ac_symbol(ac_slot, 0x00)?;
    }
    Ok(())
}
