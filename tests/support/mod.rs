//! Shared helpers for the integration tests.

#![allow(dead_code)]

pub mod synthetic;

use turbopix::{Flags, Handle, OutputBuffer, PixelFormat, Role, Subsampling};

/// Route the engine's log output through the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Compress with a fresh compressor, panicking on failure.
pub fn compress(
    pixels: &[u8],
    width: u32,
    height: u32,
    pf: PixelFormat,
    subsampling: Subsampling,
    quality: u8,
    flags: Flags,
) -> Vec<u8> {
    init_logging();
    let mut handle = Handle::new(Role::Compressor);
    let mut out = OutputBuffer::new();
    handle
        .compress(pixels, width, 0, height, pf, subsampling, quality, &mut out, flags)
        .expect("compress");
    out.into_vec()
}

/// Decompress at full size with a fresh decompressor.
pub fn decompress(jpeg: &[u8], width: u32, height: u32, pf: PixelFormat, flags: Flags) -> Vec<u8> {
    init_logging();
    let mut handle = Handle::new(Role::Decompressor);
    let mut out = vec![0u8; (width * height) as usize * pf.pixel_size()];
    handle
        .decompress(jpeg, &mut out, 0, 0, 0, pf, flags)
        .expect("decompress");
    out
}

/// Largest absolute difference between two byte slices.
pub fn max_diff(a: &[u8], b: &[u8]) -> u8 {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x.abs_diff(*y)).max().unwrap_or(0)
}

/// Mean absolute difference between two byte slices.
pub fn mean_diff(a: &[u8], b: &[u8]) -> f64 {
    assert_eq!(a.len(), b.len());
    let total: u64 = a.iter().zip(b).map(|(x, y)| x.abs_diff(*y) as u64).sum();
    total as f64 / a.len().max(1) as f64
}
