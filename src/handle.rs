//! Processing instances.
//!
//! A [`Handle`] is created for one [`Role`] and used for any number of
//! sequential operations. Each operation resets the instance's error state
//! and leaves behind either "No error", the first warning it met, or the
//! message of the error that stopped it.

use crate::buffer::OutputBuffer;
use crate::compress::{self, check_dimensions, check_quality, encode_planes};
use crate::decode::jpeg::TableCache;
use crate::decode::Warnings;
use crate::decompress::{self, HeaderInfo};
use crate::error::{Error, Result, Severity};
use crate::flags::Flags;
use crate::format::{buf_size, Colorspace, PixelFormat, Subsampling};
use crate::jpeg::coeff::CoefficientImage;
use crate::jpeg::SamplePlane;
use crate::transform::{self, Transform};
use crate::yuv::{
    self, interleaved_layouts, plane_layouts, read_plane, split_planes, split_planes_mut, PlaneLayout,
};

const NO_ERROR: &str = "No error";

/// What an instance was created to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Pixels or YUV planes to JPEG, and pixels to YUV planes.
    Compressor,
    /// JPEG to pixels or YUV planes, and YUV planes to pixels.
    Decompressor,
    /// Lossless transforms. A transformer may also compress and decompress.
    Transformer,
}

/// Role-specific state.
#[derive(Debug)]
enum State {
    Compressor,
    /// Tables primed by abbreviated streams.
    Decompressor(TableCache),
    Transformer(TableCache),
}

/// A compressor, decompressor or transformer instance.
///
/// Not for concurrent use; distinct handles are independent.
#[derive(Debug)]
pub struct Handle {
    state: State,
    message: String,
    severity: Severity,
}

impl Handle {
    /// Create an instance for `role`.
    pub fn new(role: Role) -> Self {
        let state = match role {
            Role::Compressor => State::Compressor,
            Role::Decompressor => State::Decompressor(TableCache::default()),
            Role::Transformer => State::Transformer(TableCache::default()),
        };
        Handle {
            state,
            message: String::from(NO_ERROR),
            severity: Severity::Warning,
        }
    }

    /// Role fixed at creation.
    pub fn role(&self) -> Role {
        match self.state {
            State::Compressor => Role::Compressor,
            State::Decompressor(_) => Role::Decompressor,
            State::Transformer(_) => Role::Transformer,
        }
    }

    /// Message left by the last operation.
    pub fn error_message(&self) -> &str {
        &self.message
    }

    /// Severity of [`error_message`](Self::error_message).
    pub fn error_severity(&self) -> Severity {
        self.severity
    }

    /// Run one operation, recording its outcome in the error state.
    fn run<T>(&mut self, op: impl FnOnce(&mut State) -> Result<(T, Warnings)>) -> Result<T> {
        self.message = String::from(NO_ERROR);
        self.severity = Severity::Warning;
        match op(&mut self.state) {
            Ok((value, warnings)) => {
                if let Some(first) = warnings.first() {
                    self.message = first.to_string();
                }
                Ok(value)
            }
            Err(err) => {
                self.message = err.to_string();
                self.severity = err.severity();
                Err(err)
            }
        }
    }

    fn require_compressor(state: &State, operation: &'static str) -> Result<()> {
        match state {
            State::Compressor | State::Transformer(_) => Ok(()),
            State::Decompressor(_) => Err(Error::WrongRole {
                operation,
                actual: Role::Decompressor,
            }),
        }
    }

    fn decompressor_tables<'a>(state: &'a mut State, operation: &'static str) -> Result<&'a mut TableCache> {
        match state {
            State::Decompressor(tables) | State::Transformer(tables) => Ok(tables),
            State::Compressor => Err(Error::WrongRole {
                operation,
                actual: Role::Compressor,
            }),
        }
    }

    /// Compress packed pixels into `out`.
    ///
    /// `pitch` is the distance between rows in bytes (0 = tightly packed).
    #[allow(clippy::too_many_arguments)]
    pub fn compress(
        &mut self,
        src: &[u8],
        width: u32,
        pitch: usize,
        height: u32,
        pf: PixelFormat,
        subsampling: Subsampling,
        quality: u8,
        out: &mut OutputBuffer,
        flags: Flags,
    ) -> Result<()> {
        self.run(|state| {
            Self::require_compressor(state, "compression")?;
            let jpeg = compress::compress(src, width, pitch, height, pf, subsampling, quality, flags)?;
            let worst_case = buf_size(width, height, subsampling)?;
            out.deliver(&jpeg, worst_case, flags.contains(Flags::NOREALLOC))?;
            Ok(((), Warnings::default()))
        })
    }

    /// Compress an interleaved YUV image whose plane rows are padded to
    /// `align`.
    #[allow(clippy::too_many_arguments)]
    pub fn compress_from_yuv(
        &mut self,
        src: &[u8],
        width: u32,
        align: usize,
        height: u32,
        subsampling: Subsampling,
        quality: u8,
        out: &mut OutputBuffer,
        flags: Flags,
    ) -> Result<()> {
        self.run(|state| {
            Self::require_compressor(state, "compression")?;
            let offsets = interleaved_layouts(width, align, height, subsampling)?;
            let planes = split_planes(src, &offsets)?;
            let layouts: Vec<PlaneLayout> = offsets.iter().map(|(_, layout)| *layout).collect();
            compress_planes(&planes, &layouts, width, height, subsampling, quality, out, flags)?;
            Ok(((), Warnings::default()))
        })
    }

    /// Compress separate YUV planes. A missing `strides` array, or a zero
    /// stride, means each plane's own width; a negative stride means the
    /// plane's rows are stored bottom-up.
    #[allow(clippy::too_many_arguments)]
    pub fn compress_from_yuv_planes(
        &mut self,
        planes: &[&[u8]],
        width: u32,
        strides: Option<&[i32]>,
        height: u32,
        subsampling: Subsampling,
        quality: u8,
        out: &mut OutputBuffer,
        flags: Flags,
    ) -> Result<()> {
        self.run(|state| {
            Self::require_compressor(state, "compression")?;
            let layouts = plane_layouts(width, height, subsampling, strides)?;
            compress_planes(planes, &layouts, width, height, subsampling, quality, out, flags)?;
            Ok(((), Warnings::default()))
        })
    }

    /// Read a stream's header. A tables-only stream primes this instance for
    /// later abbreviated image streams.
    pub fn decompress_header(&mut self, jpeg: &[u8]) -> Result<HeaderInfo> {
        self.run(|state| {
            let tables = Self::decompressor_tables(state, "decompression")?;
            Ok((decompress::decompress_header(jpeg, tables)?, Warnings::default()))
        })
    }

    /// Decompress into packed pixels, scaled down (or up) to the largest
    /// supported size that fits `width` x `height`. Zero leaves an axis
    /// unconstrained; both zero decodes at full size.
    #[allow(clippy::too_many_arguments)]
    pub fn decompress(
        &mut self,
        jpeg: &[u8],
        dst: &mut [u8],
        width: u32,
        pitch: usize,
        height: u32,
        pf: PixelFormat,
        flags: Flags,
    ) -> Result<()> {
        self.run(|state| {
            let tables = Self::decompressor_tables(state, "decompression")?;
            let warnings = decompress::decompress(jpeg, tables, dst, width, pitch, height, pf, flags)?;
            Ok(((), warnings))
        })
    }

    /// Decompress into an interleaved YUV buffer with plane rows padded to
    /// `align`, without color conversion.
    pub fn decompress_to_yuv(
        &mut self,
        jpeg: &[u8],
        dst: &mut [u8],
        width: u32,
        align: usize,
        height: u32,
        flags: Flags,
    ) -> Result<()> {
        self.run(|state| {
            let tables = Self::decompressor_tables(state, "decompression")?;
            let (subsampling, w, h) = decompress::yuv_geometry(jpeg, tables, width, height)?;
            let offsets = interleaved_layouts(w, align, h, subsampling)?;
            let mut planes = split_planes_mut(dst, &offsets)?;
            let layouts: Vec<PlaneLayout> = offsets.iter().map(|(_, layout)| *layout).collect();
            let warnings =
                decompress::decompress_to_planes(jpeg, tables, &mut planes, &layouts, width, height, flags)?;
            Ok(((), warnings))
        })
    }

    /// Decompress into separate YUV planes, without color conversion.
    #[allow(clippy::too_many_arguments)]
    pub fn decompress_to_yuv_planes(
        &mut self,
        jpeg: &[u8],
        planes: &mut [&mut [u8]],
        width: u32,
        strides: Option<&[i32]>,
        height: u32,
        flags: Flags,
    ) -> Result<()> {
        self.run(|state| {
            let tables = Self::decompressor_tables(state, "decompression")?;
            let layouts = decompress::yuv_plane_layouts(jpeg, tables, width, height, strides)?;
            let warnings =
                decompress::decompress_to_planes(jpeg, tables, planes, &layouts, width, height, flags)?;
            Ok(((), warnings))
        })
    }

    /// Color convert and downsample packed pixels into an interleaved YUV
    /// buffer with plane rows padded to `align`.
    #[allow(clippy::too_many_arguments)]
    pub fn encode_yuv(
        &mut self,
        src: &[u8],
        width: u32,
        pitch: usize,
        height: u32,
        pf: PixelFormat,
        dst: &mut [u8],
        align: usize,
        subsampling: Subsampling,
        flags: Flags,
    ) -> Result<()> {
        self.run(|state| {
            Self::require_compressor(state, "YUV encoding")?;
            let offsets = interleaved_layouts(width, align, height, subsampling)?;
            let mut planes = split_planes_mut(dst, &offsets)?;
            let layouts: Vec<PlaneLayout> = offsets.iter().map(|(_, layout)| *layout).collect();
            yuv::encode(src, width, pitch, height, pf, &mut planes, &layouts, subsampling, flags)?;
            Ok(((), Warnings::default()))
        })
    }

    /// Color convert and downsample packed pixels into separate YUV planes.
    #[allow(clippy::too_many_arguments)]
    pub fn encode_yuv_planes(
        &mut self,
        src: &[u8],
        width: u32,
        pitch: usize,
        height: u32,
        pf: PixelFormat,
        planes: &mut [&mut [u8]],
        strides: Option<&[i32]>,
        subsampling: Subsampling,
        flags: Flags,
    ) -> Result<()> {
        self.run(|state| {
            Self::require_compressor(state, "YUV encoding")?;
            let layouts = plane_layouts(width, height, subsampling, strides)?;
            yuv::encode(src, width, pitch, height, pf, planes, &layouts, subsampling, flags)?;
            Ok(((), Warnings::default()))
        })
    }

    /// Upsample and color convert an interleaved YUV buffer into packed
    /// pixels.
    #[allow(clippy::too_many_arguments)]
    pub fn decode_yuv(
        &mut self,
        src: &[u8],
        align: usize,
        subsampling: Subsampling,
        dst: &mut [u8],
        width: u32,
        pitch: usize,
        height: u32,
        pf: PixelFormat,
        flags: Flags,
    ) -> Result<()> {
        self.run(|state| {
            Self::decompressor_tables(state, "YUV decoding")?;
            let offsets = interleaved_layouts(width, align, height, subsampling)?;
            let planes = split_planes(src, &offsets)?;
            let layouts: Vec<PlaneLayout> = offsets.iter().map(|(_, layout)| *layout).collect();
            yuv::decode(&planes, &layouts, subsampling, dst, width, pitch, height, pf, flags)?;
            Ok(((), Warnings::default()))
        })
    }

    /// Upsample and color convert separate YUV planes into packed pixels.
    #[allow(clippy::too_many_arguments)]
    pub fn decode_yuv_planes(
        &mut self,
        planes: &[&[u8]],
        strides: Option<&[i32]>,
        subsampling: Subsampling,
        dst: &mut [u8],
        width: u32,
        pitch: usize,
        height: u32,
        pf: PixelFormat,
        flags: Flags,
    ) -> Result<()> {
        self.run(|state| {
            Self::decompressor_tables(state, "YUV decoding")?;
            let layouts = plane_layouts(width, height, subsampling, strides)?;
            yuv::decode(planes, &layouts, subsampling, dst, width, pitch, height, pf, flags)?;
            Ok(((), Warnings::default()))
        })
    }

    /// Apply each of `transforms` to `jpeg`, writing transform `i` into
    /// `outputs[i]`. Every transform is validated before any output is
    /// produced. A failing filter abandons only its own transform; the
    /// failures are reported together once the others have run.
    pub fn transform(
        &mut self,
        jpeg: &[u8],
        transforms: &mut [Transform],
        outputs: &mut [OutputBuffer],
        flags: Flags,
    ) -> Result<()> {
        self.run(|state| {
            let wrong_role = |actual| Error::WrongRole {
                operation: "transformation",
                actual,
            };
            let tables = match state {
                State::Transformer(tables) => tables,
                State::Compressor => return Err(wrong_role(Role::Compressor)),
                State::Decompressor(_) => return Err(wrong_role(Role::Decompressor)),
            };
            Ok(((), transform::transform(jpeg, tables, transforms, outputs, flags)?))
        })
    }
}

/// Encode YUV planes described by `layouts`.
#[allow(clippy::too_many_arguments)]
fn compress_planes<T: AsRef<[u8]>>(
    planes: &[T],
    layouts: &[PlaneLayout],
    width: u32,
    height: u32,
    subsampling: Subsampling,
    quality: u8,
    out: &mut OutputBuffer,
    flags: Flags,
) -> Result<()> {
    check_dimensions(width, height)?;
    check_quality(quality)?;
    yuv::check_planes(planes, layouts)?;

    let colorspace = if subsampling == Subsampling::Gray {
        Colorspace::Gray
    } else {
        Colorspace::YCbCr
    };
    let sampling = compress::component_sampling(colorspace, subsampling);
    let geometry = CoefficientImage::allocate(width as usize, height as usize, colorspace, &sampling);
    let padded: Vec<SamplePlane> = planes
        .iter()
        .zip(layouts)
        .zip(&geometry.components)
        .map(|((src, layout), comp)| read_plane(src.as_ref(), layout, comp.blocks_w * 8, comp.blocks_h * 8))
        .collect();

    let jpeg = encode_planes(&padded, width, height, colorspace, subsampling, quality, flags)?;
    out.deliver(&jpeg, buf_size(width, height, subsampling)?, flags.contains(Flags::NOREALLOC))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_instance_has_no_error() {
        for role in [Role::Compressor, Role::Decompressor, Role::Transformer] {
            let handle = Handle::new(role);
            assert_eq!(handle.role(), role);
            assert_eq!(handle.error_message(), "No error");
        }
    }

    #[test]
    fn test_wrong_role_is_recorded() {
        let mut handle = Handle::new(Role::Decompressor);
        let mut out = OutputBuffer::new();
        let err = handle
            .compress(&[0; 3], 1, 0, 1, PixelFormat::Rgb, Subsampling::S444, 90, &mut out, Flags::EMPTY)
            .unwrap_err();
        assert!(matches!(err, Error::WrongRole { actual: Role::Decompressor, .. }));
        assert!(handle.error_message().contains("compression"));
        assert_eq!(handle.error_severity(), Severity::Fatal);
        assert!(out.is_null());

        let mut compressor = Handle::new(Role::Compressor);
        assert!(compressor.transform(&[], &mut [], &mut [], Flags::EMPTY).is_err());
        assert!(compressor.decompress_header(&[0xFF, 0xD8]).is_err());
    }

    #[test]
    fn test_error_state_resets_on_success() {
        let mut handle = Handle::new(Role::Compressor);
        let mut out = OutputBuffer::new();
        assert!(handle
            .compress(&[0; 3], 1, 0, 1, PixelFormat::Rgb, Subsampling::S444, 0, &mut out, Flags::EMPTY)
            .is_err());
        assert_ne!(handle.error_message(), "No error");

        handle
            .compress(&[0; 3], 1, 0, 1, PixelFormat::Rgb, Subsampling::S444, 90, &mut out, Flags::EMPTY)
            .unwrap();
        assert_eq!(handle.error_message(), "No error");
        assert!(out.capacity() >= buf_size(1, 1, Subsampling::S444).unwrap());
    }

    #[test]
    fn test_transformer_can_compress_and_decompress() {
        let mut handle = Handle::new(Role::Transformer);
        let mut out = OutputBuffer::new();
        let src = vec![128u8; 16 * 16 * 3];
        handle
            .compress(&src, 16, 0, 16, PixelFormat::Rgb, Subsampling::S420, 90, &mut out, Flags::EMPTY)
            .unwrap();
        let mut pixels = vec![0u8; src.len()];
        handle
            .decompress(out.as_slice(), &mut pixels, 0, 0, 0, PixelFormat::Rgb, Flags::EMPTY)
            .unwrap();
        assert!(pixels.iter().all(|&p| p.abs_diff(128) <= 2));
    }

    #[test]
    fn test_truncated_stream_leaves_warning() {
        let mut compressor = Handle::new(Role::Compressor);
        let mut out = OutputBuffer::new();
        let src: Vec<u8> = (0..32 * 32 * 3).map(|i| (i * 13 % 251) as u8).collect();
        compressor
            .compress(&src, 32, 0, 32, PixelFormat::Rgb, Subsampling::S444, 90, &mut out, Flags::EMPTY)
            .unwrap();
        let jpeg = out.as_slice();
        let truncated = &jpeg[..jpeg.len() * 3 / 4];

        let mut handle = Handle::new(Role::Decompressor);
        let mut pixels = vec![0u8; src.len()];
        handle
            .decompress(truncated, &mut pixels, 0, 0, 0, PixelFormat::Rgb, Flags::EMPTY)
            .unwrap();
        assert_ne!(handle.error_message(), "No error");
        assert_eq!(handle.error_severity(), Severity::Warning);

        let err = handle
            .decompress(truncated, &mut pixels, 0, 0, 0, PixelFormat::Rgb, Flags::STOPONWARNING)
            .unwrap_err();
        assert!(matches!(err, Error::StoppedOnWarning(_)));
        assert_eq!(handle.error_severity(), Severity::Fatal);
    }
}
