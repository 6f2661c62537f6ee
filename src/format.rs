//! Pixel formats, chroma subsampling modes, colorspaces and the size queries
//! derived from them.
//!
//! Every table here is fixed; ids follow the order used on the wire by
//! callers that address formats numerically (`from_id`/`id`).

use crate::error::{global, Error, Result};

/// Largest width or height a JPEG frame header can describe.
pub const MAX_DIMENSION: u32 = 65_500;

/// Packed pixel layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 3 bytes: R, G, B.
    Rgb,
    /// 3 bytes: B, G, R.
    Bgr,
    /// 4 bytes: R, G, B, unused.
    Rgbx,
    /// 4 bytes: B, G, R, unused.
    Bgrx,
    /// 4 bytes: unused, B, G, R.
    Xbgr,
    /// 4 bytes: unused, R, G, B.
    Xrgb,
    /// 1 byte: luminance.
    Gray,
    /// 4 bytes: R, G, B, A.
    Rgba,
    /// 4 bytes: B, G, R, A.
    Bgra,
    /// 4 bytes: A, B, G, R.
    Abgr,
    /// 4 bytes: A, R, G, B.
    Argb,
    /// 4 bytes: C, M, Y, K.
    Cmyk,
}

const RED_OFFSET: [i8; 12] = [0, 2, 0, 2, 3, 1, -1, 0, 2, 3, 1, -1];
const GREEN_OFFSET: [i8; 12] = [1, 1, 1, 1, 2, 2, -1, 1, 1, 2, 2, -1];
const BLUE_OFFSET: [i8; 12] = [2, 0, 2, 0, 1, 3, -1, 2, 0, 1, 3, -1];
const ALPHA_OFFSET: [i8; 12] = [-1, -1, -1, -1, -1, -1, -1, 3, 3, 0, 0, -1];
const PIXEL_SIZE: [usize; 12] = [3, 3, 4, 4, 4, 4, 1, 4, 4, 4, 4, 4];

fn offset(table: &[i8; 12], pf: PixelFormat) -> Option<usize> {
    usize::try_from(table[pf as usize]).ok()
}

impl PixelFormat {
    /// All formats in id order.
    pub const ALL: [PixelFormat; 12] = [
        PixelFormat::Rgb,
        PixelFormat::Bgr,
        PixelFormat::Rgbx,
        PixelFormat::Bgrx,
        PixelFormat::Xbgr,
        PixelFormat::Xrgb,
        PixelFormat::Gray,
        PixelFormat::Rgba,
        PixelFormat::Bgra,
        PixelFormat::Abgr,
        PixelFormat::Argb,
        PixelFormat::Cmyk,
    ];

    /// Look up a format by numeric id.
    pub fn from_id(id: i32) -> Result<Self> {
        global(
            usize::try_from(id)
                .ok()
                .and_then(|i| Self::ALL.get(i).copied())
                .ok_or_else(|| Error::invalid(format!("invalid pixel format id {id}"))),
        )
    }

    /// Numeric id of this format.
    pub fn id(self) -> i32 {
        self as i32
    }

    /// Bytes per pixel.
    pub fn pixel_size(self) -> usize {
        PIXEL_SIZE[self as usize]
    }

    /// Byte offset of the red channel, if present.
    pub fn red_offset(self) -> Option<usize> {
        offset(&RED_OFFSET, self)
    }

    /// Byte offset of the green channel, if present.
    pub fn green_offset(self) -> Option<usize> {
        offset(&GREEN_OFFSET, self)
    }

    /// Byte offset of the blue channel, if present.
    pub fn blue_offset(self) -> Option<usize> {
        offset(&BLUE_OFFSET, self)
    }

    /// Byte offset of the alpha channel, if present.
    pub fn alpha_offset(self) -> Option<usize> {
        offset(&ALPHA_OFFSET, self)
    }

    /// Byte offset of the unused padding byte of the X formats.
    pub(crate) fn pad_offset(self) -> Option<usize> {
        match self {
            PixelFormat::Rgbx | PixelFormat::Bgrx => Some(3),
            PixelFormat::Xbgr | PixelFormat::Xrgb => Some(0),
            _ => None,
        }
    }
}

/// Chroma subsampling modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsampling {
    /// No chroma subsampling.
    S444,
    /// Chroma halved horizontally.
    S422,
    /// Chroma halved in both directions.
    S420,
    /// Luminance only.
    Gray,
    /// Chroma halved vertically.
    S440,
    /// Chroma quartered horizontally.
    S411,
}

const MCU_WIDTH: [usize; 6] = [8, 16, 16, 8, 8, 32];
const MCU_HEIGHT: [usize; 6] = [8, 8, 16, 8, 16, 8];

impl Subsampling {
    /// All modes in id order.
    pub const ALL: [Subsampling; 6] = [
        Subsampling::S444,
        Subsampling::S422,
        Subsampling::S420,
        Subsampling::Gray,
        Subsampling::S440,
        Subsampling::S411,
    ];

    /// Look up a mode by numeric id.
    pub fn from_id(id: i32) -> Result<Self> {
        global(
            usize::try_from(id)
                .ok()
                .and_then(|i| Self::ALL.get(i).copied())
                .ok_or_else(|| Error::invalid(format!("invalid subsampling id {id}"))),
        )
    }

    /// Numeric id of this mode.
    pub fn id(self) -> i32 {
        self as i32
    }

    /// iMCU width in pixels.
    pub fn mcu_width(self) -> usize {
        MCU_WIDTH[self as usize]
    }

    /// iMCU height in pixels.
    pub fn mcu_height(self) -> usize {
        MCU_HEIGHT[self as usize]
    }

    /// Horizontal luma sampling factor (chroma divisor).
    pub fn h_factor(self) -> usize {
        self.mcu_width() / 8
    }

    /// Vertical luma sampling factor (chroma divisor).
    pub fn v_factor(self) -> usize {
        self.mcu_height() / 8
    }

    /// Number of planes a YUV image in this mode has.
    pub fn num_planes(self) -> usize {
        if self == Subsampling::Gray {
            1
        } else {
            3
        }
    }

    /// Map luma sampling factors (chroma at 1x1) back to a mode.
    pub(crate) fn from_factors(h: usize, v: usize) -> Option<Self> {
        Self::ALL
            .into_iter()
            .filter(|s| *s != Subsampling::Gray)
            .find(|s| s.h_factor() == h && s.v_factor() == v)
    }
}

/// JPEG colorspaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Colorspace {
    /// Red, green, blue stored without transform.
    Rgb,
    /// Luma plus two color-difference channels.
    YCbCr,
    /// Luma only.
    Gray,
    /// Cyan, magenta, yellow, black.
    Cmyk,
    /// YCbCr-transformed CMY plus black.
    Ycck,
}

impl Colorspace {
    /// Number of components a frame in this colorspace carries.
    pub fn num_components(self) -> usize {
        match self {
            Colorspace::Gray => 1,
            Colorspace::Rgb | Colorspace::YCbCr => 3,
            Colorspace::Cmyk | Colorspace::Ycck => 4,
        }
    }
}

/// Rational scaling factor applied during decompression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScalingFactor {
    /// Numerator.
    pub num: u32,
    /// Denominator.
    pub denom: u32,
}

impl ScalingFactor {
    /// Scale a dimension, rounding up.
    pub fn scale(self, dim: u32) -> u32 {
        ((u64::from(dim) * u64::from(self.num) + u64::from(self.denom) - 1) / u64::from(self.denom))
            as u32
    }

    /// Side of the square block an 8x8 coefficient block decodes into.
    pub(crate) fn block_size(self) -> usize {
        (8 * self.num / self.denom) as usize
    }
}

const fn sf(num: u32, denom: u32) -> ScalingFactor {
    ScalingFactor { num, denom }
}

static SCALING_FACTORS: [ScalingFactor; 16] = [
    sf(2, 1),
    sf(15, 8),
    sf(7, 4),
    sf(13, 8),
    sf(3, 2),
    sf(11, 8),
    sf(5, 4),
    sf(9, 8),
    sf(1, 1),
    sf(7, 8),
    sf(3, 4),
    sf(5, 8),
    sf(1, 2),
    sf(3, 8),
    sf(1, 4),
    sf(1, 8),
];

/// Scaling factors the decompressor supports, largest first.
pub fn scaling_factors() -> &'static [ScalingFactor] {
    &SCALING_FACTORS
}

/// Rectangle in pixels. Zero width or height means "to the edge".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Region {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width.
    pub w: u32,
    /// Height.
    pub h: u32,
}

impl Region {
    /// Construct a region.
    pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Region { x, y, w, h }
    }
}

#[inline]
pub(crate) fn pad(value: usize, multiple: usize) -> usize {
    value.div_ceil(multiple) * multiple
}

fn check_dims(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidDimensions { width, height });
    }
    Ok(())
}

fn checked_size(size: u64) -> Result<usize> {
    usize::try_from(size)
        .ok()
        .filter(|s| *s <= isize::MAX as usize)
        .ok_or_else(|| Error::invalid("image is too large"))
}

/// Worst-case compressed size of a `width` x `height` image.
pub fn buf_size(width: u32, height: u32, subsampling: Subsampling) -> Result<usize> {
    global(buf_size_inner(width, height, subsampling))
}

fn buf_size_inner(width: u32, height: u32, subsampling: Subsampling) -> Result<usize> {
    check_dims(width, height)?;
    let mcuw = subsampling.mcu_width() as u64;
    let mcuh = subsampling.mcu_height() as u64;
    let chromasf = if subsampling == Subsampling::Gray {
        0
    } else {
        4 * 64 / (mcuw * mcuh)
    };
    let w = pad(width as usize, mcuw as usize) as u64;
    let h = pad(height as usize, mcuh as usize) as u64;
    checked_size(w * h * (2 + chromasf) + 2048)
}

fn plane_dim(component: usize, dim: u32, factor: usize) -> Result<usize> {
    let padded = pad(dim as usize, factor);
    match component {
        0 => Ok(padded),
        _ => Ok(padded / factor),
    }
}

fn check_component(component: usize, subsampling: Subsampling) -> Result<()> {
    if component >= subsampling.num_planes() {
        return Err(Error::invalid(format!(
            "invalid component {component} for {subsampling:?}"
        )));
    }
    Ok(())
}

/// Width of YUV plane `component` (0 = Y, 1 = Cb, 2 = Cr).
pub fn plane_width(component: usize, width: u32, subsampling: Subsampling) -> Result<usize> {
    global((|| {
        check_component(component, subsampling)?;
        check_dims(width, 1)?;
        plane_dim(component, width, subsampling.h_factor())
    })())
}

/// Height of YUV plane `component` (0 = Y, 1 = Cb, 2 = Cr).
pub fn plane_height(component: usize, height: u32, subsampling: Subsampling) -> Result<usize> {
    global((|| {
        check_component(component, subsampling)?;
        check_dims(1, height)?;
        plane_dim(component, height, subsampling.v_factor())
    })())
}

/// Bytes needed for YUV plane `component` with row `stride` (0 = plane width,
/// negative = bottom-up rows).
pub fn plane_size_yuv(
    component: usize,
    width: u32,
    stride: i32,
    height: u32,
    subsampling: Subsampling,
) -> Result<usize> {
    let pw = plane_width(component, width, subsampling)?;
    let ph = plane_height(component, height, subsampling)?;
    let stride = if stride == 0 {
        pw
    } else {
        stride.unsigned_abs() as usize
    };
    global(checked_size(stride as u64 * (ph as u64 - 1) + pw as u64))
}

/// Bytes needed for an interleaved YUV image whose plane rows are padded to
/// `align` (a power of two). Planes follow each other at `stride * height`.
pub fn buf_size_yuv(width: u32, align: usize, height: u32, subsampling: Subsampling) -> Result<usize> {
    if align == 0 || !align.is_power_of_two() {
        return global(Err(Error::invalid(format!(
            "row alignment {align} is not a power of two"
        ))));
    }
    let mut total = 0usize;
    for component in 0..subsampling.num_planes() {
        let stride = pad(plane_width(component, width, subsampling)?, align);
        let ph = plane_height(component, height, subsampling)?;
        total = stride
            .checked_mul(ph)
            .and_then(|size| total.checked_add(size))
            .ok_or_else(|| crate::error::record_global(Error::invalid("image is too large")))?;
    }
    Ok(total)
}
