//! Decompression pipeline: header inspection, scaling selection, and
//! reconstruction into packed pixels or YUV planes.

use log::debug;

use crate::compress::{check_pixel_len, resolve_pitch};
use crate::decode::idct::IdctMethod;
use crate::decode::jpeg::{decode_coefficients, read_header, Header, HeaderKind, TableCache};
use crate::decode::{check_conversion, crop_plane, reconstruct_component, upsample, write_pixels, Warnings};
use crate::error::{Error, Result};
use crate::flags::Flags;
use crate::format::{scaling_factors, Colorspace, PixelFormat, ScalingFactor, Subsampling};
use crate::jpeg::coeff::CoefficientImage;
use crate::jpeg::SamplePlane;
use crate::yuv::{check_planes, plane_layouts, write_plane, PlaneLayout};

/// Frame properties reported by a header inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Chroma subsampling, or `None` if the sampling factors match no
    /// standard mode.
    pub subsampling: Option<Subsampling>,
    /// Colorspace of the coded components.
    pub colorspace: Colorspace,
    /// True for a progressive stream.
    pub progressive: bool,
}

/// What [`Handle::decompress_header`](crate::Handle::decompress_header)
/// found in a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderInfo {
    /// A complete image header.
    Image(ImageInfo),
    /// An abbreviated stream carrying only tables. They are now cached on
    /// the instance for later abbreviated image streams.
    TablesOnly,
}

impl From<Header> for ImageInfo {
    fn from(header: Header) -> Self {
        ImageInfo {
            width: header.width as u32,
            height: header.height as u32,
            subsampling: header.subsampling,
            colorspace: header.colorspace,
            progressive: header.progressive,
        }
    }
}

/// Inspect a stream, caching any tables it defines.
pub(crate) fn decompress_header(jpeg: &[u8], tables: &mut TableCache) -> Result<HeaderInfo> {
    Ok(match read_header(jpeg, tables)? {
        HeaderKind::Image(header) => HeaderInfo::Image(header.into()),
        HeaderKind::TablesOnly => HeaderInfo::TablesOnly,
    })
}

/// Largest supported factor whose scaled dimensions fit in
/// `target_w` x `target_h`. A zero target leaves that axis unconstrained;
/// when both are zero the image is decoded at full size.
pub(crate) fn select_scaling(width: u32, height: u32, target_w: u32, target_h: u32) -> Result<ScalingFactor> {
    if target_w == 0 && target_h == 0 {
        return Ok(ScalingFactor { num: 1, denom: 1 });
    }
    scaling_factors()
        .iter()
        .copied()
        .find(|sf| {
            (target_w == 0 || sf.scale(width) <= target_w)
                && (target_h == 0 || sf.scale(height) <= target_h)
        })
        .ok_or_else(|| {
            Error::invalid(format!(
                "could not scale {width}x{height} down to {target_w}x{target_h}"
            ))
        })
}

fn idct_method(flags: Flags) -> IdctMethod {
    if flags.contains(Flags::FASTDCT) && !flags.contains(Flags::ACCURATEDCT) {
        IdctMethod::Fast
    } else {
        IdctMethod::Accurate
    }
}

/// Image header plus the scaling factor a request resolves to. Inspects a
/// copy of the table cache so a failed request leaves the instance alone.
fn plan(jpeg: &[u8], tables: &TableCache, width: u32, height: u32) -> Result<(Header, ScalingFactor)> {
    let header = match read_header(jpeg, &mut tables.clone())? {
        HeaderKind::Image(header) => header,
        HeaderKind::TablesOnly => {
            return Err(Error::invalid("stream holds tables but no image"));
        }
    };
    let sf = select_scaling(header.width as u32, header.height as u32, width, height)?;
    debug!(
        "decoding {}x{} at scale {}/{}",
        header.width, header.height, sf.num, sf.denom
    );
    Ok((header, sf))
}

fn decode_image(jpeg: &[u8], tables: &mut TableCache, flags: Flags) -> Result<(CoefficientImage, Warnings)> {
    decode_coefficients(
        jpeg,
        tables,
        Warnings::new(flags.contains(Flags::STOPONWARNING)),
        flags.contains(Flags::LIMITSCANS),
    )
}

/// Reconstruct every component at the block size of `sf`, cropped to the
/// component's scaled extent.
fn component_planes(img: &CoefficientImage, sf: ScalingFactor, flags: Flags) -> Vec<(usize, SamplePlane)> {
    let size = sf.block_size();
    let method = idct_method(flags);
    (0..img.components.len())
        .map(|c| {
            let plane = reconstruct_component(img, c, size, method);
            let w = (img.component_width(c) * size).div_ceil(8);
            let h = (img.component_height(c) * size).div_ceil(8);
            (c, crop_plane(&plane, w.max(1), h.max(1)))
        })
        .collect()
}

/// Decompress into packed pixels, scaled to fit `width` x `height`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn decompress(
    jpeg: &[u8],
    tables: &mut TableCache,
    dst: &mut [u8],
    width: u32,
    pitch: usize,
    height: u32,
    pf: PixelFormat,
    flags: Flags,
) -> Result<Warnings> {
    let (header, sf) = plan(jpeg, tables, width, height)?;
    check_conversion(header.colorspace, pf)?;
    let (out_w, out_h) = (sf.scale(header.width as u32), sf.scale(header.height as u32));
    let pitch = resolve_pitch(pitch, out_w, pf)?;
    check_pixel_len(dst.len(), out_w, pitch, out_h, pf)?;

    let (img, warnings) = decode_image(jpeg, tables, flags)?;
    let fancy = !flags.contains(Flags::FASTUPSAMPLE);
    let (max_h, max_v) = (img.max_h(), img.max_v());
    let full: Vec<SamplePlane> = component_planes(&img, sf, flags)
        .into_iter()
        .map(|(c, plane)| {
            let comp = &img.components[c];
            upsample(
                &plane,
                max_h / comp.h,
                max_v / comp.v,
                out_w as usize,
                out_h as usize,
                fancy,
            )
        })
        .collect();
    write_pixels(&full, img.colorspace, pf, dst, pitch, flags.contains(Flags::BOTTOMUP))?;
    Ok(warnings)
}

/// Geometry of the YUV image a request decodes into.
pub(crate) fn yuv_geometry(
    jpeg: &[u8],
    tables: &TableCache,
    width: u32,
    height: u32,
) -> Result<(Subsampling, u32, u32)> {
    let (header, sf) = plan(jpeg, tables, width, height)?;
    let subsampling = match (header.colorspace, header.subsampling) {
        (Colorspace::YCbCr | Colorspace::Gray, Some(s)) => s,
        (Colorspace::YCbCr | Colorspace::Gray, None) => {
            return Err(Error::unsupported(
                "YUV output of an image with non-standard sampling factors",
            ))
        }
        (cs, _) => {
            return Err(Error::unsupported(format!("YUV output of a {cs:?} image")));
        }
    };
    Ok((
        subsampling,
        sf.scale(header.width as u32),
        sf.scale(header.height as u32),
    ))
}

/// Decompress into YUV planes without color conversion. `layouts` come
/// from [`yuv_geometry`].
pub(crate) fn decompress_to_planes(
    jpeg: &[u8],
    tables: &mut TableCache,
    planes: &mut [&mut [u8]],
    layouts: &[PlaneLayout],
    width: u32,
    height: u32,
    flags: Flags,
) -> Result<Warnings> {
    check_planes(planes, layouts)?;
    let (_, sf) = plan(jpeg, tables, width, height)?;
    let (img, warnings) = decode_image(jpeg, tables, flags)?;
    let size = sf.block_size();
    let method = idct_method(flags);
    for ((layout, dst), c) in layouts.iter().zip(planes.iter_mut()).zip(0..) {
        let plane = reconstruct_component(&img, c, size, method);
        write_plane(&plane, dst, layout);
    }
    Ok(warnings)
}

/// Plane layouts for decoding `jpeg` at the scale `width` x `height`
/// selects, with explicit strides.
pub(crate) fn yuv_plane_layouts(
    jpeg: &[u8],
    tables: &TableCache,
    width: u32,
    height: u32,
    strides: Option<&[i32]>,
) -> Result<Vec<PlaneLayout>> {
    let (subsampling, w, h) = yuv_geometry(jpeg, tables, width, height)?;
    plane_layouts(w, h, subsampling, strides)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::compress;

    fn gradient(width: u32, height: u32) -> Vec<u8> {
        (0..width * height)
            .flat_map(|i| {
                let (x, y) = (i % width, i / width);
                [(x * 255 / width) as u8, (y * 255 / height) as u8, 96]
            })
            .collect()
    }

    #[test]
    fn test_scaling_selection() {
        let sf = select_scaling(100, 100, 60, 0).unwrap();
        assert_eq!(sf, ScalingFactor { num: 1, denom: 2 });
        assert_eq!(sf.scale(100), 50);

        assert_eq!(select_scaling(100, 100, 0, 0).unwrap(), ScalingFactor { num: 1, denom: 1 });
        assert_eq!(select_scaling(100, 100, 200, 200).unwrap(), ScalingFactor { num: 2, denom: 1 });
        assert_eq!(select_scaling(100, 100, 100, 80).unwrap(), ScalingFactor { num: 3, denom: 4 });
        assert!(select_scaling(100, 100, 10, 10).is_err());
    }

    #[test]
    fn test_header_reports_frame() {
        let jpeg = compress(&gradient(33, 21), 33, 0, 21, PixelFormat::Rgb, Subsampling::S422, 90, Flags::EMPTY)
            .unwrap();
        let mut tables = TableCache::default();
        let info = decompress_header(&jpeg, &mut tables).unwrap();
        assert_eq!(
            info,
            HeaderInfo::Image(ImageInfo {
                width: 33,
                height: 21,
                subsampling: Some(Subsampling::S422),
                colorspace: Colorspace::YCbCr,
                progressive: false,
            })
        );
    }

    #[test]
    fn test_decompress_close_to_source() {
        let (w, h) = (40u32, 24u32);
        let src = gradient(w, h);
        let jpeg = compress(&src, w, 0, h, PixelFormat::Rgb, Subsampling::S444, 95, Flags::EMPTY).unwrap();
        let mut out = vec![0u8; src.len()];
        let mut tables = TableCache::default();
        let warnings = decompress(&jpeg, &mut tables, &mut out, 0, 0, 0, PixelFormat::Rgb, Flags::EMPTY).unwrap();
        assert!(warnings.is_empty());
        let max_diff = src.iter().zip(&out).map(|(a, b)| a.abs_diff(*b)).max().unwrap();
        assert!(max_diff <= 12, "max diff {max_diff}");
    }

    #[test]
    fn test_scaled_decompress_dimensions() {
        let (w, h) = (64u32, 48u32);
        let jpeg = compress(&gradient(w, h), w, 0, h, PixelFormat::Rgb, Subsampling::S420, 80, Flags::EMPTY).unwrap();
        let mut tables = TableCache::default();
        // 1/4 scale: 16x12 RGBA
        let mut out = vec![0u8; 16 * 12 * 4];
        decompress(&jpeg, &mut tables, &mut out, 20, 0, 12, PixelFormat::Rgba, Flags::EMPTY).unwrap();
        assert!(out.chunks(4).all(|px| px[3] == 0xFF));

        let mut short = vec![0u8; 16 * 12 * 4 - 1];
        let err = decompress(&jpeg, &mut tables, &mut short, 20, 0, 12, PixelFormat::Rgba, Flags::EMPTY);
        assert!(matches!(err, Err(Error::InvalidDataLength { .. })));
    }

    #[test]
    fn test_cmyk_output_needs_cmyk_source() {
        let jpeg = compress(&gradient(8, 8), 8, 0, 8, PixelFormat::Rgb, Subsampling::S444, 80, Flags::EMPTY).unwrap();
        let mut out = vec![0u8; 256];
        let err = decompress(&jpeg, &mut TableCache::default(), &mut out, 0, 0, 0, PixelFormat::Cmyk, Flags::EMPTY);
        assert!(matches!(err, Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_yuv_planes_of_gray_image() {
        let src: Vec<u8> = (0..16 * 16).map(|i| (i % 16 * 16) as u8).collect();
        let jpeg = compress(&src, 16, 0, 16, PixelFormat::Gray, Subsampling::Gray, 100, Flags::EMPTY).unwrap();
        let tables = TableCache::default();
        let layouts = yuv_plane_layouts(&jpeg, &tables, 0, 0, None).unwrap();
        assert_eq!(layouts.len(), 1);
        let mut y = vec![0u8; layouts[0].size()];
        decompress_to_planes(&jpeg, &mut tables.clone(), &mut [&mut y], &layouts, 0, 0, Flags::EMPTY).unwrap();
        let max_diff = src.iter().zip(&y).map(|(a, b)| a.abs_diff(*b)).max().unwrap();
        assert!(max_diff <= 3, "max diff {max_diff}");
    }
}
