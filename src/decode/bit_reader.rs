//! Bit-level reader for JPEG entropy-coded segments.
//!
//! Reading stops at the first marker. Past that point the reader supplies
//! zero bits and remembers that it did, so a truncated scan decodes to
//! zero-filled coefficients plus a warning instead of failing.

/// Bit reader for MSB-first JPEG scan data with byte-stuffing removal.
#[derive(Debug)]
pub struct MsbBitReader<'a> {
    data: &'a [u8],
    pos: usize,
    bit_buf: u64,
    bits_in_buf: u8,
    /// Fake zero bits at the tail of `bit_buf`.
    padding: u8,
    /// Marker code that stopped reading; `pos` points at its 0xFF.
    marker: Option<u8>,
    overrun: bool,
}

impl<'a> MsbBitReader<'a> {
    /// Start reading `data` at byte offset `pos`.
    pub fn new(data: &'a [u8], pos: usize) -> Self {
        Self {
            data,
            pos,
            bit_buf: 0,
            bits_in_buf: 0,
            padding: 0,
            marker: None,
            overrun: false,
        }
    }

    /// Next data byte, or `None` at a marker or the end of input.
    fn next_byte(&mut self) -> Option<u8> {
        if self.marker.is_some() {
            return None;
        }
        let byte = *self.data.get(self.pos)?;
        if byte != 0xFF {
            self.pos += 1;
            return Some(byte);
        }
        // Skip fill bytes, then look at what follows.
        let mut next = self.pos + 1;
        while self.data.get(next) == Some(&0xFF) {
            next += 1;
        }
        match self.data.get(next) {
            Some(0x00) => {
                self.pos = next + 1;
                Some(0xFF)
            }
            Some(&code) => {
                self.pos = next - 1;
                self.marker = Some(code);
                None
            }
            None => {
                self.pos = self.data.len();
                None
            }
        }
    }

    /// Ensure at least `n` bits are buffered, padding with zeros past the
    /// end of the segment.
    #[inline]
    fn ensure(&mut self, n: u8) {
        while self.bits_in_buf < n {
            let byte = match self.next_byte() {
                Some(b) => b,
                None => {
                    self.padding += 8;
                    0
                }
            };
            self.bit_buf = (self.bit_buf << 8) | byte as u64;
            self.bits_in_buf += 8;
        }
    }

    /// Peek at the next `n` (at most 32) bits without consuming them.
    #[inline]
    pub fn peek_bits(&mut self, n: u8) -> u32 {
        debug_assert!(n <= 32);
        self.ensure(n);
        ((self.bit_buf >> (self.bits_in_buf - n)) & ((1u64 << n) - 1)) as u32
    }

    /// Consume `n` buffered bits.
    #[inline]
    pub fn consume(&mut self, n: u8) {
        debug_assert!(n <= self.bits_in_buf);
        self.bits_in_buf -= n;
        self.bit_buf &= (1u64 << self.bits_in_buf) - 1;
        if self.bits_in_buf < self.padding {
            self.overrun = true;
            self.padding = self.bits_in_buf;
        }
    }

    /// Read `n` bits MSB-first.
    #[inline]
    pub fn read_bits(&mut self, n: u8) -> u32 {
        if n == 0 {
            return 0;
        }
        let val = self.peek_bits(n);
        self.consume(n);
        val
    }

    /// Read one bit.
    #[inline]
    pub fn read_bit(&mut self) -> bool {
        self.read_bits(1) != 0
    }

    /// Read `n` magnitude bits and sign-extend them (JPEG EXTEND).
    #[inline]
    pub fn receive_extend(&mut self, n: u8) -> i32 {
        if n == 0 {
            return 0;
        }
        let v = self.read_bits(n) as i32;
        if v < (1 << (n - 1)) {
            v - (1 << n) + 1
        } else {
            v
        }
    }

    /// True (once) if zero padding was consumed since the last call.
    pub fn take_overrun(&mut self) -> bool {
        std::mem::take(&mut self.overrun)
    }

    fn drop_buffer(&mut self) {
        self.bit_buf = 0;
        self.bits_in_buf = 0;
        self.padding = 0;
    }

    /// Skip to and consume restart marker `RSTn` where `n = expected & 7`.
    ///
    /// Returns the number of garbage bytes skipped and whether the marker
    /// found was the expected one. A non-RST marker is left in place.
    pub fn restart(&mut self, expected: u8) -> (usize, bool) {
        self.drop_buffer();
        let start = self.pos;
        while self.marker.is_none() && self.pos < self.data.len() {
            if self.next_byte().is_none() {
                break;
            }
        }
        let skipped = self.pos - start;
        match self.marker {
            Some(code @ 0xD0..=0xD7) => {
                self.skip_marker();
                (skipped, code == 0xD0 | (expected & 7))
            }
            _ => (skipped, false),
        }
    }

    fn skip_marker(&mut self) {
        // pos is at the last fill 0xFF; the code byte follows.
        self.pos += 2;
        self.marker = None;
    }

    /// End the scan: returns the offset of the next marker's 0xFF and the
    /// number of data bytes that were never consumed.
    pub fn finish(mut self) -> (usize, usize) {
        let unused = (self.bits_in_buf.saturating_sub(self.padding) / 8) as usize;
        self.drop_buffer();
        let start = self.pos;
        while self.marker.is_none() && self.pos < self.data.len() {
            if self.next_byte().is_none() {
                break;
            }
        }
        (self.pos, unused + (self.pos - start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msb_reader_basic() {
        let mut reader = MsbBitReader::new(&[0b1010_0101, 0b1100_0011], 0);
        assert_eq!(reader.read_bits(4), 0b1010);
        assert_eq!(reader.read_bits(8), 0b0101_1100);
        assert_eq!(reader.read_bits(4), 0b0011);
        assert!(!reader.take_overrun());
    }

    #[test]
    fn test_msb_reader_byte_stuffing() {
        let mut reader = MsbBitReader::new(&[0xFF, 0x00, 0x12], 0);
        assert_eq!(reader.read_bits(8), 0xFF);
        assert_eq!(reader.read_bits(8), 0x12);
    }

    #[test]
    fn test_marker_stops_reading_and_zero_fills() {
        let data = [0xAB, 0xFF, 0xD9];
        let mut reader = MsbBitReader::new(&data, 0);
        assert_eq!(reader.read_bits(8), 0xAB);
        assert!(!reader.take_overrun());
        assert_eq!(reader.read_bits(8), 0);
        assert!(reader.take_overrun());
        let (next, _) = reader.finish();
        assert_eq!(next, 1);
    }

    #[test]
    fn test_peek_past_end_is_not_overrun() {
        let data = [0b1100_0000, 0xFF, 0xD9];
        let mut reader = MsbBitReader::new(&data, 0);
        assert_eq!(reader.peek_bits(16), 0b1100_0000_0000_0000);
        reader.consume(2);
        assert!(!reader.take_overrun());
    }

    #[test]
    fn test_receive_extend() {
        // 3 bits 010 = 2 -> -5; 3 bits 110 = 6 -> 6
        let mut reader = MsbBitReader::new(&[0b0101_1000], 0);
        assert_eq!(reader.receive_extend(3), -5);
        assert_eq!(reader.receive_extend(3), 6);
        assert_eq!(reader.receive_extend(0), 0);
    }

    #[test]
    fn test_restart_consumes_expected_marker() {
        let data = [0x80, 0xFF, 0xD3, 0x40, 0xFF, 0xD9];
        let mut reader = MsbBitReader::new(&data, 0);
        assert_eq!(reader.read_bits(1), 1);
        assert_eq!(reader.restart(3), (0, true));
        assert_eq!(reader.read_bits(2), 0b01);
        let (next, _) = reader.finish();
        assert_eq!(next, 4);
    }

    #[test]
    fn test_restart_reports_garbage_and_wrong_index() {
        let data = [0x80, 0x11, 0x22, 0xFF, 0xD5, 0x40];
        let mut reader = MsbBitReader::new(&data, 0);
        reader.read_bits(1);
        let (skipped, matched) = reader.restart(2);
        assert!(!matched);
        // The partially consumed first byte was already buffered.
        assert_eq!(skipped, 2);
    }

    #[test]
    fn test_fill_bytes_before_marker() {
        let data = [0x12, 0xFF, 0xFF, 0xFF, 0xD9];
        let mut reader = MsbBitReader::new(&data, 0);
        assert_eq!(reader.read_bits(8), 0x12);
        reader.read_bits(8);
        let (next, _) = reader.finish();
        assert_eq!(next, 3);
        assert_eq!(data[next + 1], 0xD9);
    }
}
