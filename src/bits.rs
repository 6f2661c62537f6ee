//! Bit-level output for JPEG entropy-coded segments.

/// Packs Huffman codes and magnitude bits MSB first into an entropy-coded
/// segment, inserting a stuffed zero after every 0xFF data byte.
#[derive(Debug, Default)]
pub struct EntropyWriter {
    out: Vec<u8>,
    /// Pending bits, right-aligned.
    acc: u64,
    /// Number of pending bits in `acc` (always < 8 between calls).
    pending: u32,
}

impl EntropyWriter {
    /// Writer with an empty output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue after the marker segments already in `out`.
    pub fn from_vec(out: Vec<u8>) -> Self {
        Self {
            out,
            acc: 0,
            pending: 0,
        }
    }

    /// Append the low `count` bits of `value`.
    #[inline]
    pub fn write_bits(&mut self, value: u32, count: u8) {
        debug_assert!(count <= 32);
        if count == 0 {
            return;
        }
        let count = count as u32;
        let mask = (1u64 << count) - 1;
        self.acc = (self.acc << count) | (value as u64 & mask);
        self.pending += count;
        while self.pending >= 8 {
            self.pending -= 8;
            let byte = (self.acc >> self.pending) as u8;
            self.push_stuffed(byte);
        }
        self.acc &= (1u64 << self.pending) - 1;
    }

    #[inline]
    fn push_stuffed(&mut self, byte: u8) {
        self.out.push(byte);
        if byte == 0xFF {
            self.out.push(0x00);
        }
    }

    /// Complete the last byte with 1-bits.
    pub fn align(&mut self) {
        if self.pending > 0 {
            let fill = 8 - self.pending;
            self.write_bits((1 << fill) - 1, fill as u8);
        }
    }

    /// Align and emit restart marker `RSTn` (n taken mod 8).
    pub fn write_restart(&mut self, n: u8) {
        self.align();
        self.out.extend_from_slice(&[0xFF, 0xD0 | (n & 7)]);
    }

    /// Align and return the segment bytes.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        self.align();
        self.out
    }
}
