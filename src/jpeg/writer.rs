//! JPEG stream serialization from a [`CoefficientImage`].
//!
//! Used by both the pixel encoder and the lossless transformer, so every
//! header is derived from the coefficient image rather than from encoder
//! settings.

use log::trace;

use crate::bits::EntropyWriter;
use crate::error::{Error, Result};
use crate::format::Colorspace;
use crate::jpeg::coeff::CoefficientImage;
use crate::jpeg::huffman::{
    encode_block, HuffmanEncoder, HuffmanSpec, SymbolCounter, SymbolEmitter, SymbolSink,
};
use crate::jpeg::progressive::{
    encode_ac_first, encode_dc_first, flush_eob_run, progressive_script, ScanSpec,
};
use crate::jpeg::quantize::table_zigzag;
use crate::jpeg::Restart;

const SOI: u16 = 0xFFD8; // Start of Image
const EOI: u16 = 0xFFD9; // End of Image
const APP0: u16 = 0xFFE0; // JFIF marker
const APP14: u16 = 0xFFEE; // Adobe marker
const DQT: u16 = 0xFFDB; // Define Quantization Table
const SOF0: u16 = 0xFFC0; // Start of Frame (baseline DCT)
const SOF1: u16 = 0xFFC1; // Start of Frame (extended sequential DCT)
const SOF2: u16 = 0xFFC2; // Start of Frame (progressive DCT)
const DHT: u16 = 0xFFC4; // Define Huffman Table
const DRI: u16 = 0xFFDD; // Define Restart Interval
const SOS: u16 = 0xFFDA; // Start of Scan

/// How a coefficient image is entropy coded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Emit SOF2 with a multi-scan script.
    pub progressive: bool,
    /// Derive Huffman tables from the image instead of using Annex K tables.
    /// Progressive output is always optimized.
    pub optimize_huffman: bool,
    /// Restart marker spacing.
    pub restart: Restart,
    /// Copy the image's saved APPn/COM markers.
    pub copy_markers: bool,
}

/// Huffman table slot for component `c`.
pub fn table_slot(colorspace: Colorspace, c: usize) -> usize {
    match colorspace {
        Colorspace::Rgb | Colorspace::Cmyk => 0,
        Colorspace::Ycck if c == 3 => 0,
        _ if c == 0 => 0,
        _ => 1,
    }
}

/// Serialize `img` as a complete JPEG stream.
pub fn write_jpeg(img: &CoefficientImage, opts: &WriteOptions) -> Result<Vec<u8>> {
    if img.width == 0 || img.height == 0 || img.width > 65_535 || img.height > 65_535 {
        return Err(Error::invalid("image dimensions do not fit a frame header"));
    }
    let blocks: usize = img.components.iter().map(|c| c.blocks.len()).sum();
    let mut output = Vec::with_capacity(blocks * 16 + 1024);

    output.extend_from_slice(&SOI.to_be_bytes());
    match img.colorspace {
        Colorspace::YCbCr | Colorspace::Gray => write_app0(&mut output),
        Colorspace::Rgb | Colorspace::Cmyk => write_app14(&mut output, 0),
        Colorspace::Ycck => write_app14(&mut output, 2),
    }
    if opts.copy_markers {
        for marker in img.markers.iter().filter(|m| !m.is_regenerated()) {
            write_segment(&mut output, 0xFF00 | marker.marker as u16, &marker.data)?;
        }
    }

    let extended = write_dqt(&mut output, img)?;
    let sof = if opts.progressive {
        SOF2
    } else if extended {
        SOF1
    } else {
        SOF0
    };
    write_sof(&mut output, sof, img);

    let scans = if opts.progressive {
        progressive_script(img.components.len())
    } else {
        vec![ScanSpec::new((0..img.components.len()).collect(), 0, 63)]
    };

    let mut last_dri = 0usize;
    for scan in &scans {
        let interval = restart_interval(img, scan, opts.restart);
        if interval != last_dri {
            write_dri(&mut output, interval as u16);
            last_dri = interval;
        }
        let optimize = opts.optimize_huffman || opts.progressive;
        output = write_scan(output, img, scan, interval, optimize)?;
    }

    output.extend_from_slice(&EOI.to_be_bytes());
    trace!(
        "wrote {}x{} {:?} stream: {} bytes, {} scan(s)",
        img.width,
        img.height,
        img.colorspace,
        output.len(),
        scans.len()
    );
    Ok(output)
}

fn scan_mcus(img: &CoefficientImage, scan: &ScanSpec) -> (usize, usize) {
    if let [c] = scan.components[..] {
        (img.width_in_blocks(c), img.height_in_blocks(c))
    } else {
        (img.mcus_x(), img.mcus_y())
    }
}

fn restart_interval(img: &CoefficientImage, scan: &ScanSpec, restart: Restart) -> usize {
    let nominal = match restart {
        Restart::None => 0,
        Restart::Mcus(n) => n,
        Restart::Rows(n) => n * scan_mcus(img, scan).0,
    };
    nominal.min(65_535)
}

/// Walk the MCUs of one scan, feeding every coded block to `sink`.
pub(crate) fn encode_scan<S: SymbolSink>(
    sink: &mut S,
    img: &CoefficientImage,
    scan: &ScanSpec,
    restart_interval: usize,
) -> Result<()> {
    let single = scan.components.len() == 1;
    let (mcus_x, mcus_y) = scan_mcus(img, scan);
    let slots: Vec<usize> = scan
        .components
        .iter()
        .map(|&c| table_slot(img.colorspace, c))
        .collect();
    let sequential = scan.ss == 0 && scan.se == 63;

    let mut prev_dc = vec![0i32; scan.components.len()];
    let mut eob_run = 0u32;
    let mut since_restart = 0usize;
    let mut restart_index = 0u8;

    for my in 0..mcus_y {
        for mx in 0..mcus_x {
            if restart_interval > 0 && since_restart == restart_interval {
                if !scan.is_dc_scan() && !sequential {
                    flush_eob_run(sink, &mut eob_run, slots[0])?;
                }
                sink.restart(restart_index);
                restart_index = (restart_index + 1) & 7;
                prev_dc.fill(0);
                since_restart = 0;
            }
            since_restart += 1;

            for (i, &c) in scan.components.iter().enumerate() {
                let comp = &img.components[c];
                let (bh, bv) = if single { (1, 1) } else { (comp.h, comp.v) };
                for by in 0..bv {
                    for bx in 0..bh {
                        let block = comp.block(mx * bh + bx, my * bv + by);
                        if sequential {
                            encode_block(sink, block, &mut prev_dc[i], slots[i], slots[i])?;
                        } else if scan.is_dc_scan() {
                            encode_dc_first(sink, block, &mut prev_dc[i], slots[i], scan.al)?;
                        } else {
                            encode_ac_first(
                                sink,
                                block,
                                scan.ss,
                                scan.se,
                                scan.al,
                                &mut eob_run,
                                slots[i],
                            )?;
                        }
                    }
                }
            }
        }
    }

    if !scan.is_dc_scan() && !sequential {
        flush_eob_run(sink, &mut eob_run, slots[0])?;
    }
    Ok(())
}

fn write_scan(
    mut output: Vec<u8>,
    img: &CoefficientImage,
    scan: &ScanSpec,
    restart_interval: usize,
    optimize: bool,
) -> Result<Vec<u8>> {
    let needs_dc = scan.ss == 0;
    let needs_ac = scan.se > 0;

    let counts = if optimize {
        let mut counter = SymbolCounter::new();
        encode_scan(&mut counter, img, scan, restart_interval)?;
        Some(counter)
    } else {
        None
    };

    let mut used = [false; 4];
    for &c in &scan.components {
        used[table_slot(img.colorspace, c)] = true;
    }

    let mut dc_specs: [Option<HuffmanSpec>; 4] = Default::default();
    let mut ac_specs: [Option<HuffmanSpec>; 4] = Default::default();
    for slot in (0..4).filter(|&s| used[s]) {
        if needs_dc {
            let spec = match &counts {
                Some(counter) => HuffmanSpec::from_counts(&counter.dc[slot]),
                None => HuffmanSpec::standard(false, slot == 0),
            };
            write_dht(&mut output, slot as u8, &spec);
            dc_specs[slot] = Some(spec);
        }
        if needs_ac {
            let spec = match &counts {
                Some(counter) => HuffmanSpec::from_counts(&counter.ac[slot]),
                None => HuffmanSpec::standard(true, slot == 0),
            };
            write_dht(&mut output, 0x10 | slot as u8, &spec);
            ac_specs[slot] = Some(spec);
        }
    }

    let build = |specs: &[Option<HuffmanSpec>; 4]| -> Result<[Option<HuffmanEncoder>; 4]> {
        let mut encoders: [Option<HuffmanEncoder>; 4] = Default::default();
        for (slot, spec) in specs.iter().enumerate() {
            if let Some(spec) = spec {
                encoders[slot] = Some(HuffmanEncoder::new(spec)?);
            }
        }
        Ok(encoders)
    };
    let dc_encoders = build(&dc_specs)?;
    let ac_encoders = build(&ac_specs)?;

    write_sos(&mut output, img, scan);

    let mut writer = EntropyWriter::from_vec(output);
    {
        let mut emitter = SymbolEmitter::new(
            &mut writer,
            std::array::from_fn(|s| dc_encoders[s].as_ref()),
            std::array::from_fn(|s| ac_encoders[s].as_ref()),
        );
        encode_scan(&mut emitter, img, scan, restart_interval)?;
    }
    Ok(writer.finish())
}

fn write_segment(output: &mut Vec<u8>, marker: u16, payload: &[u8]) -> Result<()> {
    let length = u16::try_from(payload.len() + 2)
        .map_err(|_| Error::invalid("marker segment exceeds 65533 bytes"))?;
    output.extend_from_slice(&marker.to_be_bytes());
    output.extend_from_slice(&length.to_be_bytes());
    output.extend_from_slice(payload);
    Ok(())
}

/// Write APP0 (JFIF 1.01, no units, 1:1 density, no thumbnail).
fn write_app0(output: &mut Vec<u8>) {
    output.extend_from_slice(&APP0.to_be_bytes());
    output.extend_from_slice(&16u16.to_be_bytes());
    output.extend_from_slice(b"JFIF\0");
    output.extend_from_slice(&[1, 1, 0]);
    output.extend_from_slice(&1u16.to_be_bytes());
    output.extend_from_slice(&1u16.to_be_bytes());
    output.extend_from_slice(&[0, 0]);
}

/// Write APP14 (Adobe) with the given color transform code.
fn write_app14(output: &mut Vec<u8>, transform: u8) {
    output.extend_from_slice(&APP14.to_be_bytes());
    output.extend_from_slice(&14u16.to_be_bytes());
    output.extend_from_slice(b"Adobe");
    output.extend_from_slice(&100u16.to_be_bytes()); // version
    output.extend_from_slice(&0u16.to_be_bytes()); // flags0
    output.extend_from_slice(&0u16.to_be_bytes()); // flags1
    output.push(transform);
}

/// Write every referenced quantization table. Returns true if any table
/// needed 16-bit precision.
fn write_dqt(output: &mut Vec<u8>, img: &CoefficientImage) -> Result<bool> {
    let mut referenced = [false; 4];
    for comp in &img.components {
        referenced[comp.quant_index] = true;
    }
    let mut extended = false;
    for slot in (0..4).filter(|&s| referenced[s]) {
        let table = img.quant_tables[slot]
            .ok_or_else(|| Error::invalid(format!("quantization table {slot} is undefined")))?;
        let zz = table_zigzag(&table);
        let wide = zz.iter().any(|&q| q > 255);
        extended |= wide;

        output.extend_from_slice(&DQT.to_be_bytes());
        if wide {
            output.extend_from_slice(&(2 + 1 + 128u16).to_be_bytes());
            output.push(0x10 | slot as u8);
            for q in zz {
                output.extend_from_slice(&q.to_be_bytes());
            }
        } else {
            output.extend_from_slice(&(2 + 1 + 64u16).to_be_bytes());
            output.push(slot as u8);
            output.extend(zz.iter().map(|&q| q as u8));
        }
    }
    Ok(extended)
}

fn write_sof(output: &mut Vec<u8>, marker: u16, img: &CoefficientImage) {
    output.extend_from_slice(&marker.to_be_bytes());
    let length = 8 + 3 * img.components.len();
    output.extend_from_slice(&(length as u16).to_be_bytes());
    output.push(8);
    output.extend_from_slice(&(img.height as u16).to_be_bytes());
    output.extend_from_slice(&(img.width as u16).to_be_bytes());
    output.push(img.components.len() as u8);
    for comp in &img.components {
        output.push(comp.id);
        output.push(((comp.h as u8) << 4) | comp.v as u8);
        output.push(comp.quant_index as u8);
    }
}

fn write_dht(output: &mut Vec<u8>, class_id: u8, spec: &HuffmanSpec) {
    output.extend_from_slice(&DHT.to_be_bytes());
    let length = 2 + 1 + 16 + spec.vals.len();
    output.extend_from_slice(&(length as u16).to_be_bytes());
    output.push(class_id);
    output.extend_from_slice(&spec.bits);
    output.extend_from_slice(&spec.vals);
}

fn write_dri(output: &mut Vec<u8>, interval: u16) {
    output.extend_from_slice(&DRI.to_be_bytes());
    output.extend_from_slice(&4u16.to_be_bytes());
    output.extend_from_slice(&interval.to_be_bytes());
}

fn write_sos(output: &mut Vec<u8>, img: &CoefficientImage, scan: &ScanSpec) {
    output.extend_from_slice(&SOS.to_be_bytes());
    let length = 6 + 2 * scan.components.len();
    output.extend_from_slice(&(length as u16).to_be_bytes());
    output.push(scan.components.len() as u8);
    for &c in &scan.components {
        let slot = table_slot(img.colorspace, c) as u8;
        output.push(img.components[c].id);
        output.push((slot << 4) | slot);
    }
    output.push(scan.ss);
    output.push(scan.se);
    output.push((scan.ah << 4) | scan.al);
}
