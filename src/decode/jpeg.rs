//! JPEG stream parser and entropy decoder.
//!
//! Decodes sequential (SOF0/SOF1) and progressive (SOF2) Huffman-coded
//! streams into a [`CoefficientImage`]. Nothing here runs an inverse DCT:
//! the decompressor and the lossless transformer both start from the
//! coefficients produced by [`decode_coefficients`].

use log::{debug, trace};

use super::bit_reader::MsbBitReader;
use super::Warnings;
use crate::error::{Error, Result};
use crate::flags::MAX_SCANS;
use crate::format::{Colorspace, Subsampling};
use crate::jpeg::coeff::{Block, CoefficientImage, SavedMarker};
use crate::jpeg::quantize::ZIGZAG;

/// JPEG markers
const SOI: u8 = 0xD8; // Start of Image
const EOI: u8 = 0xD9; // End of Image
const SOF0: u8 = 0xC0; // Baseline DCT
const SOF1: u8 = 0xC1; // Extended sequential DCT
const SOF2: u8 = 0xC2; // Progressive DCT
const DHT: u8 = 0xC4; // Define Huffman Table
const DAC: u8 = 0xCC; // Define Arithmetic Conditioning
const DQT: u8 = 0xDB; // Define Quantization Table
const DRI: u8 = 0xDD; // Define Restart Interval
const SOS: u8 = 0xDA; // Start of Scan
const RST0: u8 = 0xD0; // Restart marker 0
const RST7: u8 = 0xD7; // Restart marker 7
const APP0: u8 = 0xE0; // Application segment 0 (JFIF)
const APP14: u8 = 0xEE; // Application segment 14 (Adobe)
const APP15: u8 = 0xEF; // Application segment 15
const COM: u8 = 0xFE; // Comment

/// Huffman decoding table.
#[derive(Debug, Clone)]
pub(crate) struct HuffmanTable {
    /// Fast lookup table (256 entries for 8-bit lookahead).
    lookup: [u16; 256],
    /// Values for each code.
    values: Vec<u8>,
    /// Maximum code for each bit length.
    max_code: [i32; 17],
    /// Value offset for each bit length.
    val_offset: [i32; 17],
}

impl HuffmanTable {
    /// Build a Huffman table from bits and values.
    fn build(bits: &[u8; 16], values: &[u8]) -> Result<Self> {
        let mut table = HuffmanTable {
            lookup: [0; 256],
            values: values.to_vec(),
            max_code: [-1; 17],
            val_offset: [0; 17],
        };

        let mut code = 0u32;
        let mut k = 0usize;
        for len in 1..=16usize {
            let count = bits[len - 1] as usize;
            // Codes of a given length must fit in that many bits.
            if code as usize + count > 1 << len {
                return Err(Error::corrupt("bogus Huffman table definition"));
            }
            if count > 0 {
                table.val_offset[len] = k as i32 - code as i32;
                for _ in 0..count {
                    if len <= 8 {
                        // Pack: value in low 8 bits, length in high 8 bits
                        let fill_bits = 8 - len;
                        let base = (code as usize) << fill_bits;
                        let entry = values[k] as u16 | ((len as u16) << 8);
                        table.lookup[base..base + (1 << fill_bits)].fill(entry);
                    }
                    code += 1;
                    k += 1;
                }
                table.max_code[len] = code as i32 - 1;
            }
            code <<= 1;
        }
        Ok(table)
    }

    /// Decode one symbol, or `None` for a code that is not in the table.
    #[inline]
    fn decode(&self, reader: &mut MsbBitReader) -> Option<u8> {
        let peek = reader.peek_bits(16);
        let entry = self.lookup[(peek >> 8) as usize];
        let len = (entry >> 8) as u8;
        if len > 0 {
            reader.consume(len);
            return Some((entry & 0xFF) as u8);
        }

        // Slow path for longer codes
        for len in 9..=16u8 {
            let code = (peek >> (16 - len)) as i32;
            if code <= self.max_code[len as usize] {
                reader.consume(len);
                let idx = code + self.val_offset[len as usize];
                return self.values.get(idx as usize).copied();
            }
        }
        reader.consume(16);
        None
    }
}

/// Tables that outlive a single stream, for abbreviated image streams.
#[derive(Debug, Clone, Default)]
pub(crate) struct TableCache {
    pub quant: [Option<[u16; 64]>; 4],
    pub dc: [Option<HuffmanTable>; 4],
    pub ac: [Option<HuffmanTable>; 4],
}

/// What [`read_header`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub width: usize,
    pub height: usize,
    pub colorspace: Colorspace,
    /// `None` when the sampling factors match no standard mode.
    pub subsampling: Option<Subsampling>,
    pub progressive: bool,
}

/// Result of a header inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeaderKind {
    /// A frame header was found.
    Image(Header),
    /// The stream carried only tables, which are now cached.
    TablesOnly,
}

/// Frame component as declared in SOF.
#[derive(Debug, Clone, Copy)]
struct FrameComponent {
    id: u8,
    h: usize,
    v: usize,
    quant_index: usize,
}

/// Component of the current scan.
#[derive(Debug, Clone, Copy)]
struct ScanComponent {
    /// Index into the frame's component list.
    index: usize,
    dc_table: usize,
    ac_table: usize,
}

#[derive(Debug, Clone)]
struct ScanHeader {
    components: Vec<ScanComponent>,
    ss: usize,
    se: usize,
    ah: u8,
    al: u8,
}

/// JPEG decoder state.
struct JpegDecoder<'a, 'c> {
    data: &'a [u8],
    pos: usize,
    cache: &'c mut TableCache,
    warnings: Warnings,
    components: Vec<FrameComponent>,
    width: usize,
    height: usize,
    progressive: bool,
    restart_interval: usize,
    jfif: bool,
    adobe_transform: Option<u8>,
    markers: Vec<SavedMarker>,
    image: Option<CoefficientImage>,
    scans: usize,
    limit_scans: bool,
}

impl<'a, 'c> JpegDecoder<'a, 'c> {
    fn new(data: &'a [u8], cache: &'c mut TableCache, warnings: Warnings) -> Result<Self> {
        // Verify SOI marker
        if data.len() < 2 || data[0] != 0xFF || data[1] != SOI {
            return Err(Error::corrupt("not a JPEG file: starts with no SOI marker"));
        }
        Ok(Self {
            data,
            pos: 2,
            cache,
            warnings,
            components: Vec::new(),
            width: 0,
            height: 0,
            progressive: false,
            restart_interval: 0,
            jfif: false,
            adobe_transform: None,
            markers: Vec::new(),
            image: None,
            scans: 0,
            limit_scans: false,
        })
    }

    /// Parse markers up to the first SOS (or EOI for a tables-only stream).
    fn read_header(&mut self) -> Result<HeaderKind> {
        loop {
            let Some((marker, segment)) = self.read_marker()? else {
                return Err(Error::corrupt("premature end of JPEG header"));
            };
            match marker {
                SOS => {
                    if self.components.is_empty() {
                        return Err(Error::corrupt("SOS marker before SOF"));
                    }
                    // Leave pos at the SOS so decoding can resume here.
                    self.pos -= segment.len() + 4;
                    return Ok(HeaderKind::Image(self.header()?));
                }
                EOI if self.components.is_empty() => return Ok(HeaderKind::TablesOnly),
                EOI => return Err(Error::corrupt("image frame has no scans")),
                _ => self.handle_segment(marker, segment)?,
            }
        }
    }

    fn header(&self) -> Result<Header> {
        Ok(Header {
            width: self.width,
            height: self.height,
            colorspace: self.colorspace()?,
            subsampling: self.subsampling(),
            progressive: self.progressive,
        })
    }

    /// Decode every scan into the coefficient image.
    fn decode(mut self) -> Result<(CoefficientImage, Warnings)> {
        if let HeaderKind::TablesOnly = self.read_header()? {
            return Err(Error::corrupt("stream contains tables but no image"));
        }
        loop {
            let Some((marker, segment)) = self.read_marker()? else {
                self.warnings.push("premature end of JPEG file")?;
                break;
            };
            match marker {
                SOS => {
                    let scan = self.parse_sos(segment)?;
                    self.decode_scan(&scan)?;
                }
                EOI => break,
                _ => self.handle_segment(marker, segment)?,
            }
        }
        let mut image = self
            .image
            .take()
            .ok_or_else(|| Error::corrupt("image frame has no scans"))?;
        image.markers = std::mem::take(&mut self.markers);
        debug!(
            "decoded {}x{} {:?} coefficients from {} scan(s)",
            image.width, image.height, image.colorspace, self.scans
        );
        Ok((image, self.warnings))
    }

    /// Next marker and its payload, or `None` at the end of the data.
    fn read_marker(&mut self) -> Result<Option<(u8, &'a [u8])>> {
        let start = self.pos;
        // Find marker
        while self.pos < self.data.len() && self.data[self.pos] != 0xFF {
            self.pos += 1;
        }
        // Skip padding 0xFF bytes
        while self.pos + 1 < self.data.len() && self.data[self.pos + 1] == 0xFF {
            self.pos += 1;
        }
        if self.pos + 1 >= self.data.len() {
            return Ok(None);
        }
        if self.pos > start {
            self.warnings.push(format!(
                "corrupt JPEG data: {} extraneous bytes before marker 0x{:02x}",
                self.pos - start,
                self.data[self.pos + 1]
            ))?;
        }

        let marker = self.data[self.pos + 1];
        self.pos += 2;
        trace!("marker 0x{marker:02x} at offset {}", self.pos - 2);

        // Markers without payload
        match marker {
            SOI | EOI | RST0..=RST7 | 0x01 => return Ok(Some((marker, &[]))),
            _ => {}
        }

        // Read segment length
        if self.pos + 2 > self.data.len() {
            return Ok(None);
        }
        let length = u16::from_be_bytes([self.data[self.pos], self.data[self.pos + 1]]) as usize;
        if length < 2 {
            return Err(Error::corrupt(format!(
                "invalid length {length} for marker 0x{marker:02x}"
            )));
        }
        let end = self.pos + length;
        if end > self.data.len() {
            return Ok(None);
        }
        let segment = &self.data[self.pos + 2..end];
        self.pos = end;
        Ok(Some((marker, segment)))
    }

    fn handle_segment(&mut self, marker: u8, segment: &[u8]) -> Result<()> {
        match marker {
            SOF0 | SOF1 => self.parse_sof(segment, false),
            SOF2 => self.parse_sof(segment, true),
            0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF => Err(Error::unsupported(format!(
                "SOF type 0x{marker:02x} (lossless, hierarchical or arithmetic coding)"
            ))),
            DAC => Err(Error::unsupported("arithmetic coding")),
            DHT => self.parse_dht(segment),
            DQT => self.parse_dqt(segment),
            DRI => self.parse_dri(segment),
            APP0..=APP15 | COM => {
                self.save_marker(marker, segment);
                Ok(())
            }
            SOI => Err(Error::corrupt("invalid JPEG file structure: two SOI markers")),
            RST0..=RST7 => {
                // Stray restart marker between scans.
                self.warnings.push(format!(
                    "corrupt JPEG data: unexpected marker 0x{marker:02x}"
                ))
            }
            _ => Ok(()),
        }
    }

    fn save_marker(&mut self, marker: u8, segment: &[u8]) {
        if marker == APP0 && segment.starts_with(b"JFIF\0") {
            self.jfif = true;
        }
        if marker == APP14 && segment.starts_with(b"Adobe") && segment.len() >= 12 {
            self.adobe_transform = Some(segment[11]);
        }
        self.markers.push(SavedMarker {
            marker,
            data: segment.to_vec(),
        });
    }

    fn parse_sof(&mut self, segment: &[u8], progressive: bool) -> Result<()> {
        if !self.components.is_empty() {
            return Err(Error::corrupt("invalid JPEG file structure: two SOF markers"));
        }
        if segment.len() < 6 {
            return Err(Error::corrupt("invalid SOF length"));
        }

        let precision = segment[0];
        if precision != 8 {
            return Err(Error::unsupported(format!(
                "{precision}-bit sample precision"
            )));
        }

        self.height = u16::from_be_bytes([segment[1], segment[2]]) as usize;
        self.width = u16::from_be_bytes([segment[3], segment[4]]) as usize;
        if self.width == 0 || self.height == 0 {
            return Err(Error::corrupt(format!(
                "empty image ({}x{})",
                self.width, self.height
            )));
        }

        let num_components = segment[5] as usize;
        if !matches!(num_components, 1 | 3 | 4) {
            return Err(Error::unsupported(format!(
                "{num_components} color components"
            )));
        }
        if segment.len() < 6 + num_components * 3 {
            return Err(Error::corrupt("truncated SOF components"));
        }

        for i in 0..num_components {
            let offset = 6 + i * 3;
            let id = segment[offset];
            let h = (segment[offset + 1] >> 4) as usize;
            let v = (segment[offset + 1] & 0x0F) as usize;
            let quant_index = segment[offset + 2] as usize;

            if !(1..=4).contains(&h) || !(1..=4).contains(&v) {
                return Err(Error::corrupt(format!(
                    "invalid sampling factors {h}x{v} for component {id}"
                )));
            }
            if quant_index > 3 {
                return Err(Error::corrupt(format!(
                    "invalid quantization table ID {quant_index} for component {id}"
                )));
            }
            self.components.push(FrameComponent {
                id,
                h,
                v,
                quant_index,
            });
        }
        self.progressive = progressive;
        trace!(
            "SOF{}: {}x{}, {} component(s)",
            if progressive { 2 } else { 0 },
            self.width,
            self.height,
            num_components
        );
        Ok(())
    }

    fn parse_dht(&mut self, segment: &[u8]) -> Result<()> {
        let mut offset = 0;
        while offset < segment.len() {
            let info = segment[offset];
            let table_class = info >> 4; // 0 = DC, 1 = AC
            let table_id = (info & 0x0F) as usize;
            if table_class > 1 || table_id > 3 {
                return Err(Error::corrupt(format!("invalid Huffman table 0x{info:02x}")));
            }

            offset += 1;
            if offset + 16 > segment.len() {
                return Err(Error::corrupt("truncated DHT"));
            }
            let mut bits = [0u8; 16];
            bits.copy_from_slice(&segment[offset..offset + 16]);
            offset += 16;

            let num_values: usize = bits.iter().map(|&b| b as usize).sum();
            if num_values > 256 || offset + num_values > segment.len() {
                return Err(Error::corrupt("truncated DHT values"));
            }
            let values = &segment[offset..offset + num_values];
            offset += num_values;

            let table = HuffmanTable::build(&bits, values)?;
            if table_class == 0 {
                self.cache.dc[table_id] = Some(table);
            } else {
                self.cache.ac[table_id] = Some(table);
            }
        }
        Ok(())
    }

    fn parse_dqt(&mut self, segment: &[u8]) -> Result<()> {
        let mut offset = 0;
        while offset < segment.len() {
            let info = segment[offset];
            let precision = info >> 4;
            let table_id = (info & 0x0F) as usize;
            if table_id > 3 || precision > 1 {
                return Err(Error::corrupt(format!(
                    "invalid quantization table 0x{info:02x}"
                )));
            }
            offset += 1;

            let width = if precision == 0 { 1 } else { 2 };
            if offset + 64 * width > segment.len() {
                return Err(Error::corrupt("truncated DQT"));
            }
            // Stored in zigzag order; kept in natural order.
            let mut table = [0u16; 64];
            for (k, &natural) in ZIGZAG.iter().enumerate() {
                let at = offset + k * width;
                table[natural] = if width == 1 {
                    segment[at] as u16
                } else {
                    u16::from_be_bytes([segment[at], segment[at + 1]])
                };
            }
            offset += 64 * width;
            self.cache.quant[table_id] = Some(table);
        }
        Ok(())
    }

    fn parse_dri(&mut self, segment: &[u8]) -> Result<()> {
        if segment.len() != 2 {
            return Err(Error::corrupt("invalid DRI length"));
        }
        self.restart_interval = u16::from_be_bytes([segment[0], segment[1]]) as usize;
        Ok(())
    }

    fn parse_sos(&mut self, segment: &[u8]) -> Result<ScanHeader> {
        self.scans += 1;
        if self.limit_scans && self.scans > MAX_SCANS {
            return Err(Error::corrupt(format!(
                "progressive JPEG image has more than {MAX_SCANS} scans"
            )));
        }
        if segment.is_empty() {
            return Err(Error::corrupt("empty SOS segment"));
        }

        let count = segment[0] as usize;
        if count == 0 || count > 4 || segment.len() != 1 + count * 2 + 3 {
            return Err(Error::corrupt("invalid SOS length"));
        }

        let mut components = Vec::with_capacity(count);
        for i in 0..count {
            let id = segment[1 + i * 2];
            let tables = segment[2 + i * 2];
            let index = self
                .components
                .iter()
                .position(|c| c.id == id)
                .ok_or_else(|| Error::corrupt(format!("invalid component ID {id} in SOS")))?;
            if components.iter().any(|c: &ScanComponent| c.index == index) {
                return Err(Error::corrupt(format!("duplicate component ID {id} in SOS")));
            }
            let dc_table = (tables >> 4) as usize;
            let ac_table = (tables & 0x0F) as usize;
            if dc_table > 3 || ac_table > 3 {
                return Err(Error::corrupt(format!(
                    "invalid Huffman table IDs 0x{tables:02x} for component {id}"
                )));
            }
            components.push(ScanComponent {
                index,
                dc_table,
                ac_table,
            });
        }

        let tail = &segment[1 + count * 2..];
        let scan = ScanHeader {
            components,
            ss: tail[0] as usize,
            se: tail[1] as usize,
            ah: tail[2] >> 4,
            al: tail[2] & 0x0F,
        };
        if self.progressive {
            let dc = scan.ss == 0;
            let bad = scan.se > 63
                || scan.ss > scan.se
                || (dc && scan.se != 0)
                || (!dc && scan.components.len() != 1)
                || scan.ah > 13
                || scan.al > 13;
            if bad {
                return Err(Error::corrupt(format!(
                    "invalid progressive parameters Ss={} Se={} Ah={} Al={}",
                    scan.ss, scan.se, scan.ah, scan.al
                )));
            }
        }
        trace!(
            "SOS: {} component(s), Ss={} Se={} Ah={} Al={}",
            scan.components.len(),
            scan.ss,
            scan.se,
            scan.ah,
            scan.al
        );
        Ok(scan)
    }

    /// Allocate the coefficient image on the first scan and latch its
    /// quantization tables.
    fn ensure_image(&mut self) -> Result<()> {
        if self.image.is_some() {
            return Ok(());
        }
        let sampling: Vec<_> = self
            .components
            .iter()
            .map(|c| (c.h, c.v, c.quant_index))
            .collect();
        let mut image =
            CoefficientImage::allocate(self.width, self.height, self.colorspace()?, &sampling);
        for (plane, frame) in image.components.iter_mut().zip(&self.components) {
            plane.id = frame.id;
            let table = self.cache.quant[frame.quant_index].ok_or_else(|| {
                Error::corrupt(format!(
                    "quantization table 0x{:02x} was not defined",
                    frame.quant_index
                ))
            })?;
            image.quant_tables[frame.quant_index] = Some(table);
        }
        self.image = Some(image);
        Ok(())
    }

    fn decode_scan(&mut self, scan: &ScanHeader) -> Result<()> {
        self.ensure_image()?;
        let kind = ScanKind::of(self.progressive, scan);

        let mut dc_tables = Vec::with_capacity(scan.components.len());
        let mut ac_tables = Vec::with_capacity(scan.components.len());
        for sc in &scan.components {
            let needs_dc = matches!(kind, ScanKind::Sequential | ScanKind::DcFirst);
            let needs_ac = matches!(
                kind,
                ScanKind::Sequential | ScanKind::AcFirst | ScanKind::AcRefine
            );
            dc_tables.push(self.table(needs_dc, true, sc.dc_table)?);
            ac_tables.push(self.table(needs_ac, false, sc.ac_table)?);
        }

        let Some(image) = self.image.as_mut() else {
            return Err(Error::corrupt("image frame has no scans"));
        };
        let mut state = EntropyState {
            reader: MsbBitReader::new(self.data, self.pos),
            prev_dc: [0; 4],
            eob_run: 0,
            bad_code: false,
        };

        let geometry = ScanGeometry::new(image, scan);
        let mut next_restart = 0u8;
        for mcu in 0..geometry.count() {
            if self.restart_interval > 0 && mcu > 0 && mcu % self.restart_interval == 0 {
                let (skipped, matched) = state.reader.restart(next_restart);
                if skipped > 0 {
                    self.warnings.push(format!(
                        "corrupt JPEG data: {skipped} extraneous bytes before restart marker"
                    ))?;
                }
                if !matched {
                    self.warnings.push(format!(
                        "corrupt JPEG data: missing restart marker RST{next_restart}"
                    ))?;
                }
                next_restart = (next_restart + 1) & 7;
                state.prev_dc = [0; 4];
                state.eob_run = 0;
            }

            let (mx, my) = (mcu % geometry.cols, mcu / geometry.cols);
            for unit in &geometry.layout {
                let block = image.components[unit.component]
                    .block_mut(mx * unit.h + unit.dx, my * unit.v + unit.dy);
                let dc = dc_tables[unit.scan_index].as_ref();
                let ac = ac_tables[unit.scan_index].as_ref();
                match kind {
                    ScanKind::Sequential => state.sequential(block, unit.scan_index, dc, ac),
                    ScanKind::DcFirst => state.dc_first(block, unit.scan_index, dc, scan.al),
                    ScanKind::DcRefine => state.dc_refine(block, scan.al),
                    ScanKind::AcFirst => state.ac_first(block, ac, scan),
                    ScanKind::AcRefine => state.ac_refine(block, ac, scan),
                }
            }
        }

        if state.bad_code {
            self.warnings
                .push("corrupt JPEG data: bad Huffman code")?;
        }
        if state.reader.take_overrun() {
            self.warnings
                .push("corrupt JPEG data: premature end of data segment")?;
        }
        let (next, unused) = state.reader.finish();
        if unused > 0 {
            self.warnings.push(format!(
                "corrupt JPEG data: {unused} extraneous bytes after scan"
            ))?;
        }
        self.pos = next;
        Ok(())
    }

    /// Copy of a Huffman table for one scan component, or `None` when the
    /// scan type does not use it.
    fn table(&self, needed: bool, dc: bool, id: usize) -> Result<Option<HuffmanTable>> {
        if !needed {
            return Ok(None);
        }
        let tables = if dc { &self.cache.dc } else { &self.cache.ac };
        match &tables[id] {
            Some(table) => Ok(Some(table.clone())),
            None => Err(Error::corrupt(format!(
                "Huffman table 0x{:02x} was not defined",
                if dc { id } else { 0x10 | id }
            ))),
        }
    }

    fn colorspace(&self) -> Result<Colorspace> {
        let ids: Vec<u8> = self.components.iter().map(|c| c.id).collect();
        Ok(match ids.len() {
            1 => Colorspace::Gray,
            3 if self.jfif => Colorspace::YCbCr,
            3 => match self.adobe_transform {
                Some(0) => Colorspace::Rgb,
                Some(_) => Colorspace::YCbCr,
                None if ids == [b'R', b'G', b'B'] => Colorspace::Rgb,
                None => Colorspace::YCbCr,
            },
            4 => match self.adobe_transform {
                Some(2) => Colorspace::Ycck,
                _ => Colorspace::Cmyk,
            },
            n => return Err(Error::unsupported(format!("{n} color components"))),
        })
    }

    fn subsampling(&self) -> Option<Subsampling> {
        let image = CoefficientImage::allocate(
            1,
            1,
            Colorspace::Gray,
            &self
                .components
                .iter()
                .map(|c| (c.h, c.v, c.quant_index))
                .collect::<Vec<_>>(),
        );
        image.subsampling()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanKind {
    Sequential,
    DcFirst,
    DcRefine,
    AcFirst,
    AcRefine,
}

impl ScanKind {
    fn of(progressive: bool, scan: &ScanHeader) -> Self {
        match (progressive, scan.ss == 0, scan.ah == 0) {
            (false, _, _) => ScanKind::Sequential,
            (true, true, true) => ScanKind::DcFirst,
            (true, true, false) => ScanKind::DcRefine,
            (true, false, true) => ScanKind::AcFirst,
            (true, false, false) => ScanKind::AcRefine,
        }
    }
}

/// One block position inside an MCU.
#[derive(Debug, Clone, Copy)]
struct BlockUnit {
    scan_index: usize,
    component: usize,
    h: usize,
    v: usize,
    dx: usize,
    dy: usize,
}

/// MCU grid of a scan. A single-component scan is non-interleaved: its
/// MCU is one block and only blocks holding image data are coded.
struct ScanGeometry {
    cols: usize,
    rows: usize,
    layout: Vec<BlockUnit>,
}

impl ScanGeometry {
    fn new(image: &CoefficientImage, scan: &ScanHeader) -> Self {
        if let [sc] = scan.components[..] {
            return Self {
                cols: image.width_in_blocks(sc.index),
                rows: image.height_in_blocks(sc.index),
                layout: vec![BlockUnit {
                    scan_index: 0,
                    component: sc.index,
                    h: 1,
                    v: 1,
                    dx: 0,
                    dy: 0,
                }],
            };
        }
        let mut layout = Vec::new();
        for (scan_index, sc) in scan.components.iter().enumerate() {
            let comp = &image.components[sc.index];
            for dy in 0..comp.v {
                for dx in 0..comp.h {
                    layout.push(BlockUnit {
                        scan_index,
                        component: sc.index,
                        h: comp.h,
                        v: comp.v,
                        dx,
                        dy,
                    });
                }
            }
        }
        Self {
            cols: image.mcus_x(),
            rows: image.mcus_y(),
            layout,
        }
    }

    fn count(&self) -> usize {
        self.cols * self.rows
    }
}

/// Bit reader plus the predictors that restart markers reset.
struct EntropyState<'a> {
    reader: MsbBitReader<'a>,
    prev_dc: [i32; 4],
    eob_run: u32,
    bad_code: bool,
}

impl EntropyState<'_> {
    #[inline]
    fn symbol(&mut self, table: Option<&HuffmanTable>) -> u8 {
        match table.and_then(|t| t.decode(&mut self.reader)) {
            Some(symbol) => symbol,
            None => {
                self.bad_code = true;
                0
            }
        }
    }

    #[inline]
    fn dc_diff(&mut self, table: Option<&HuffmanTable>) -> i32 {
        let size = self.symbol(table).min(15);
        self.reader.receive_extend(size)
    }

    fn sequential(
        &mut self,
        block: &mut Block,
        k: usize,
        dc: Option<&HuffmanTable>,
        ac: Option<&HuffmanTable>,
    ) {
        *block = [0; 64];
        self.prev_dc[k] = self.prev_dc[k].wrapping_add(self.dc_diff(dc));
        block[0] = self.prev_dc[k] as i16;

        let mut i = 1;
        while i < 64 {
            let rs = self.symbol(ac);
            let (run, size) = ((rs >> 4) as usize, rs & 0x0F);
            if size != 0 {
                i += run;
                if i > 63 {
                    break;
                }
                block[ZIGZAG[i]] = self.reader.receive_extend(size) as i16;
                i += 1;
            } else if run == 15 {
                // ZRL - skip 16 zeros
                i += 16;
            } else {
                // EOB
                break;
            }
        }
    }

    fn dc_first(&mut self, block: &mut Block, k: usize, dc: Option<&HuffmanTable>, al: u8) {
        self.prev_dc[k] = self.prev_dc[k].wrapping_add(self.dc_diff(dc));
        block[0] = (self.prev_dc[k] << al) as i16;
    }

    fn dc_refine(&mut self, block: &mut Block, al: u8) {
        if self.reader.read_bit() {
            block[0] |= 1 << al;
        }
    }

    fn ac_first(&mut self, block: &mut Block, ac: Option<&HuffmanTable>, scan: &ScanHeader) {
        if self.eob_run > 0 {
            self.eob_run -= 1;
            return;
        }
        let mut k = scan.ss;
        while k <= scan.se {
            let rs = self.symbol(ac);
            let (run, size) = ((rs >> 4) as usize, rs & 0x0F);
            if size != 0 {
                k += run;
                if k > scan.se {
                    break;
                }
                let value = self.reader.receive_extend(size);
                block[ZIGZAG[k]] = (value << scan.al) as i16;
            } else if run == 15 {
                k += 15;
            } else {
                // EOBr: this band plus 2^r - 1 + extra following bands are empty.
                self.eob_run = 1 << run;
                if run > 0 {
                    self.eob_run += self.reader.read_bits(run as u8);
                }
                self.eob_run -= 1;
                break;
            }
            k += 1;
        }
    }

    fn ac_refine(&mut self, block: &mut Block, ac: Option<&HuffmanTable>, scan: &ScanHeader) {
        let p1 = 1i16 << scan.al;
        let m1 = -p1;
        let mut k = scan.ss;

        if self.eob_run == 0 {
            while k <= scan.se {
                let rs = self.symbol(ac);
                let mut run = (rs >> 4) as i32;
                let size = rs & 0x0F;
                let mut value = 0i16;
                if size != 0 {
                    // Newly nonzero coefficients are always magnitude 1.
                    value = if self.reader.read_bit() { p1 } else { m1 };
                } else if run != 15 {
                    self.eob_run = 1 << run;
                    if run > 0 {
                        self.eob_run += self.reader.read_bits(run as u8);
                    }
                    break;
                }

                // Skip `run` zero coefficients, refining nonzero ones on the way.
                while k <= scan.se {
                    let coef = &mut block[ZIGZAG[k]];
                    if *coef != 0 {
                        self.refine(coef, p1, m1);
                    } else {
                        run -= 1;
                        if run < 0 {
                            break;
                        }
                    }
                    k += 1;
                }
                if value != 0 && k <= scan.se {
                    block[ZIGZAG[k]] = value;
                }
                k += 1;
            }
        }

        if self.eob_run > 0 {
            // Remaining band only carries correction bits.
            while k <= scan.se {
                let coef = &mut block[ZIGZAG[k]];
                if *coef != 0 {
                    self.refine(coef, p1, m1);
                }
                k += 1;
            }
            self.eob_run -= 1;
        }
    }

    #[inline]
    fn refine(&mut self, coef: &mut i16, p1: i16, m1: i16) {
        if self.reader.read_bit() && (*coef & p1) == 0 {
            *coef = coef.wrapping_add(if *coef >= 0 { p1 } else { m1 });
        }
    }
}

/// Inspect a stream's header, caching any tables it defines.
pub(crate) fn read_header(data: &[u8], cache: &mut TableCache) -> Result<HeaderKind> {
    JpegDecoder::new(data, cache, Warnings::new(false))?.read_header()
}

/// Entropy-decode a complete stream into quantized coefficients.
///
/// Tables missing from an abbreviated stream are taken from `cache`;
/// tables the stream defines replace the cached ones.
pub(crate) fn decode_coefficients(
    data: &[u8],
    cache: &mut TableCache,
    warnings: Warnings,
    limit_scans: bool,
) -> Result<(CoefficientImage, Warnings)> {
    let mut decoder = JpegDecoder::new(data, cache, warnings)?;
    decoder.limit_scans = limit_scans;
    decoder.decode()
}
