//! Progressive JPEG encoding support.
//!
//! Output uses spectral selection only: one interleaved DC scan followed by
//! per-component AC bands, every band coded at full precision (Ah = Al = 0).

use crate::error::Result;
use crate::jpeg::coeff::Block;
use crate::jpeg::huffman::{category, encode_dc, encode_value, SymbolSink, MAX_EOB_RUN};
use crate::jpeg::quantize::ZIGZAG;

/// Specification for a single scan in progressive JPEG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSpec {
    /// Component indices in this scan.
    pub components: Vec<usize>,
    /// Start of spectral selection (0-63).
    pub ss: u8,
    /// End of spectral selection (0-63).
    pub se: u8,
    /// Successive approximation high bit position.
    pub ah: u8,
    /// Successive approximation low bit position.
    pub al: u8,
}

impl ScanSpec {
    /// Scan over `components` covering coefficients `ss..=se`.
    pub fn new(components: Vec<usize>, ss: u8, se: u8) -> Self {
        Self {
            components,
            ss,
            se,
            ah: 0,
            al: 0,
        }
    }

    /// True for a DC-only scan.
    pub fn is_dc_scan(&self) -> bool {
        self.ss == 0 && self.se == 0
    }
}

/// Scan script for `num_components` components.
pub fn progressive_script(num_components: usize) -> Vec<ScanSpec> {
    let mut scans = vec![ScanSpec::new((0..num_components).collect(), 0, 0)];
    match num_components {
        1 => {
            scans.push(ScanSpec::new(vec![0], 1, 5));
            scans.push(ScanSpec::new(vec![0], 6, 63));
        }
        3 => {
            scans.push(ScanSpec::new(vec![0], 1, 5));
            scans.push(ScanSpec::new(vec![1], 1, 63));
            scans.push(ScanSpec::new(vec![2], 1, 63));
            scans.push(ScanSpec::new(vec![0], 6, 63));
        }
        n => scans.extend((0..n).map(|c| ScanSpec::new(vec![c], 1, 63))),
    }
    scans
}

/// Encode the DC coefficient of a block in a first DC scan.
pub fn encode_dc_first<S: SymbolSink>(
    sink: &mut S,
    block: &Block,
    prev_dc: &mut i32,
    slot: usize,
    al: u8,
) -> Result<()> {
    let dc = (block[0] as i32) >> al;
    encode_dc(sink, slot, dc - *prev_dc)?;
    *prev_dc = dc;
    Ok(())
}

/// Encode band `ss..=se` of a block in a first AC scan, accumulating
/// all-zero bands into `eob_run`.
pub fn encode_ac_first<S: SymbolSink>(
    sink: &mut S,
    block: &Block,
    ss: u8,
    se: u8,
    al: u8,
    eob_run: &mut u32,
    slot: usize,
) -> Result<()> {
    let (ss, se) = (ss as usize, se as usize);
    // Point transform: magnitude shifted, sign kept.
    let coef = |k: usize| {
        let v = block[ZIGZAG[k]] as i32;
        if v < 0 {
            -((-v) >> al)
        } else {
            v >> al
        }
    };

    let Some(last) = (ss..=se).rev().find(|&k| coef(k) != 0) else {
        *eob_run += 1;
        if *eob_run == MAX_EOB_RUN {
            flush_eob_run(sink, eob_run, slot)?;
        }
        return Ok(());
    };

    flush_eob_run(sink, eob_run, slot)?;

    let mut zero_run = 0u8;
    for k in ss..=last {
        let v = coef(k);
        if v == 0 {
            zero_run += 1;
            continue;
        }
        while zero_run >= 16 {
            sink.ac_symbol(slot, 0xF0)?;
            zero_run -= 16;
        }
        let (bits, cat) = encode_value(v);
        sink.ac_symbol(slot, (zero_run << 4) | cat)?;
        sink.raw_bits(bits, cat);
        zero_run = 0;
    }

    if last < se {
        *eob_run = 1;
    }
    Ok(())
}

/// Emit a pending end-of-band run as an EOBn symbol plus its extra bits.
pub fn flush_eob_run<S: SymbolSink>(sink: &mut S, eob_run: &mut u32, slot: usize) -> Result<()> {
    if *eob_run == 0 {
        return Ok(());
    }
    let nbits = category(*eob_run as i32) - 1;
    sink.ac_symbol(slot, nbits << 4)?;
    if nbits > 0 {
        sink.raw_bits(*eob_run - (1 << nbits), nbits);
    }
    *eob_run = 0;
    Ok(())
}
