//! # turbopix
//!
//! A JPEG codec engine built around processing instances.
//!
//! A [`Handle`] is created as a compressor, decompressor or transformer and
//! then used for any number of sequential operations:
//!
//! - **Compression** of packed pixels (12 pixel formats) or planar YUV into
//!   baseline, optimized or progressive JPEG.
//! - **Decompression** into packed pixels or YUV planes, with optional
//!   scaling by one of 16 rational factors.
//! - **YUV conversion** of packed pixels to and from planar YUV without
//!   entropy coding.
//! - **Lossless transforms** (flips, rotations, transposition, crop,
//!   grayscale) performed on the coefficients, with a per-component filter
//!   hook.
//!
//! Compressed output goes to an [`OutputBuffer`], which the engine sizes
//! from [`buf_size`] when empty and may grow unless [`Flags::NOREALLOC`] is
//! set.
//!
//! ## Example
//!
//! ```rust
//! use turbopix::{Flags, Handle, OutputBuffer, PixelFormat, Role, Subsampling};
//!
//! let pixels = vec![200u8; 16 * 16 * 3];
//! let mut jpeg = OutputBuffer::new();
//! let mut compressor = Handle::new(Role::Compressor);
//! compressor
//!     .compress(&pixels, 16, 0, 16, PixelFormat::Rgb, Subsampling::S420, 85, &mut jpeg, Flags::EMPTY)
//!     .unwrap();
//!
//! let mut decompressor = Handle::new(Role::Decompressor);
//! let mut decoded = vec![0u8; 16 * 16 * 3];
//! decompressor
//!     .decompress(jpeg.as_slice(), &mut decoded, 0, 0, 0, PixelFormat::Rgb, Flags::EMPTY)
//!     .unwrap();
//! assert_eq!(decompressor.error_message(), "No error");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bits;
pub mod buffer;
pub mod color;
pub(crate) mod compress;
pub mod decode;
pub(crate) mod decompress;
pub mod error;
pub mod flags;
pub mod format;
pub mod handle;
pub mod jpeg;
pub mod simd;
pub mod transform;
pub(crate) mod yuv;

pub use buffer::{alloc, free, BufferView, OutputBuffer};
pub use decompress::{HeaderInfo, ImageInfo};
pub use error::{last_error, Error, Result, Severity};
pub use flags::{Flags, TransformOptions, MAX_SCANS};
pub use format::{
    buf_size, buf_size_yuv, plane_height, plane_size_yuv, plane_width, scaling_factors, Colorspace,
    PixelFormat, Region, ScalingFactor, Subsampling,
};
pub use handle::{Handle, Role};
pub use transform::{FilterContext, FilterResult, Transform, TransformOp, TransformParams};
