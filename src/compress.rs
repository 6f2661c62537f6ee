//! Compression pipeline: packed pixels or YUV planes to a JPEG stream.
//!
//! Pixels are color converted at full resolution, edge-padded to whole
//! MCUs, box-filtered down to each component's sampling, and handed to the
//! coefficient encoder in [`crate::jpeg`].

use log::debug;

use crate::color::cmyk_to_ycck;
use crate::error::{Error, Result};
use crate::flags::Flags;
use crate::format::{pad, Colorspace, PixelFormat, Subsampling, MAX_DIMENSION};
use crate::jpeg::coeff::CoefficientImage;
use crate::jpeg::quantize::QuantizationTables;
use crate::jpeg::writer::{table_slot, write_jpeg, WriteOptions};
use crate::jpeg::{forward_transform, EncodeOptions, SamplePlane};
use crate::simd;

/// Validate image dimensions against what a frame header can carry.
pub(crate) fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidDimensions { width, height });
    }
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(Error::ImageTooLarge {
            width,
            height,
            max: MAX_DIMENSION,
        });
    }
    Ok(())
}

/// Row pitch of packed pixels, `0` meaning tightly packed.
pub(crate) fn resolve_pitch(pitch: usize, width: u32, pf: PixelFormat) -> Result<usize> {
    let row = width as usize * pf.pixel_size();
    match pitch {
        0 => Ok(row),
        p if p < row => Err(Error::invalid(format!(
            "pitch {p} is smaller than a row of {row} bytes"
        ))),
        p => Ok(p),
    }
}

/// Check that a packed-pixel buffer covers `height` rows.
pub(crate) fn check_pixel_len(len: usize, width: u32, pitch: usize, height: u32, pf: PixelFormat) -> Result<()> {
    let expected = pitch * (height as usize - 1) + width as usize * pf.pixel_size();
    if len < expected {
        return Err(Error::InvalidDataLength {
            expected,
            actual: len,
        });
    }
    Ok(())
}

/// Colorspace a packed-pixel image is coded in.
pub(crate) fn jpeg_colorspace(pf: PixelFormat, subsampling: Subsampling) -> Colorspace {
    if subsampling == Subsampling::Gray {
        Colorspace::Gray
    } else if pf == PixelFormat::Cmyk {
        Colorspace::Ycck
    } else {
        Colorspace::YCbCr
    }
}

/// Sampling factors and quantization slots of each component.
pub(crate) fn component_sampling(
    colorspace: Colorspace,
    subsampling: Subsampling,
) -> Vec<(usize, usize, usize)> {
    let (h, v) = (subsampling.h_factor(), subsampling.v_factor());
    (0..colorspace.num_components())
        .map(|c| {
            let luma_like = c == 0 || c == 3;
            let (ch, cv) = if luma_like { (h, v) } else { (1, 1) };
            (ch, cv, table_slot(colorspace, c))
        })
        .collect()
}

/// Convert packed pixels to component planes at full resolution.
fn convert_pixels(
    src: &[u8],
    width: usize,
    pitch: usize,
    height: usize,
    pf: PixelFormat,
    colorspace: Colorspace,
    bottom_up: bool,
) -> Vec<Vec<u8>> {
    let n = colorspace.num_components();
    let mut planes = vec![vec![0u8; width * height]; n];
    let ps = pf.pixel_size();
    for y in 0..height {
        let src_y = if bottom_up { height - 1 - y } else { y };
        let row = &src[src_y * pitch..src_y * pitch + width * ps];
        let range = y * width..(y + 1) * width;
        match colorspace {
            Colorspace::Gray => simd::rgb_to_gray_row(row, pf, &mut planes[0][range]),
            Colorspace::YCbCr if pf == PixelFormat::Gray => {
                planes[0][range.clone()].copy_from_slice(row);
                planes[1][range.clone()].fill(128);
                planes[2][range].fill(128);
            }
            Colorspace::YCbCr => {
                if let [y_plane, cb, cr] = &mut planes[..] {
                    simd::rgb_to_ycc_row(
                        row,
                        pf,
                        &mut y_plane[range.clone()],
                        &mut cb[range.clone()],
                        &mut cr[range],
                    );
                }
            }
            _ => {
                for (x, px) in row.chunks_exact(ps).enumerate() {
                    let ycck = cmyk_to_ycck(px[0], px[1], px[2], px[3]);
                    for (plane, value) in planes.iter_mut().zip(ycck) {
                        plane[y * width + x] = value;
                    }
                }
            }
        }
    }
    planes
}

/// Average `h` x `v` boxes of `plane`, whose dimensions are multiples of
/// the box size.
pub(crate) fn downsample(plane: &SamplePlane, h: usize, v: usize) -> SamplePlane {
    if h == 1 && v == 1 {
        return plane.clone();
    }
    let (width, height) = (plane.width / h, plane.height / v);
    let area = (h * v) as u32;
    let mut data = vec![0u8; width * height];
    for (oy, out) in data.chunks_mut(width).enumerate() {
        for (ox, px) in out.iter_mut().enumerate() {
            let mut sum = 0u32;
            for dy in 0..v {
                let row = (oy * v + dy) * plane.width + ox * h;
                sum += plane.data[row..row + h].iter().map(|&s| s as u32).sum::<u32>();
            }
            *px = ((sum + area / 2) / area) as u8;
        }
    }
    SamplePlane {
        width,
        height,
        data,
    }
}

/// Convert packed pixels into MCU-padded, downsampled component planes.
pub(crate) fn pixels_to_planes(
    src: &[u8],
    width: u32,
    pitch: usize,
    height: u32,
    pf: PixelFormat,
    subsampling: Subsampling,
    bottom_up: bool,
) -> (Colorspace, Vec<SamplePlane>) {
    let colorspace = jpeg_colorspace(pf, subsampling);
    let (w, h) = (width as usize, height as usize);
    let sampling = component_sampling(colorspace, subsampling);
    let (max_h, max_v) = (subsampling.h_factor(), subsampling.v_factor());
    let padded_w = pad(w, 8 * max_h);
    let padded_h = pad(h, 8 * max_v);

    let full = convert_pixels(src, w, pitch, h, pf, colorspace, bottom_up);
    let planes = full
        .iter()
        .zip(&sampling)
        .map(|(samples, &(ch, cv, _))| {
            let padded = SamplePlane::from_rows(samples, w, h, padded_w, padded_h, |y| y * w);
            downsample(&padded, max_h / ch, max_v / cv)
        })
        .collect();
    (colorspace, planes)
}

/// DCT, quantize and entropy code component planes laid out on the block
/// grid of `sampling`.
pub(crate) fn encode_planes(
    planes: &[SamplePlane],
    width: u32,
    height: u32,
    colorspace: Colorspace,
    subsampling: Subsampling,
    quality: u8,
    flags: Flags,
) -> Result<Vec<u8>> {
    let opts = EncodeOptions::from_flags(quality, subsampling, flags).with_env_overrides();
    let sampling = component_sampling(colorspace, subsampling);
    let mut img = CoefficientImage::allocate(width as usize, height as usize, colorspace, &sampling);
    let tables = QuantizationTables::with_quality(quality);
    for &(_, _, slot) in &sampling {
        img.quant_tables[slot] = Some(if slot == 0 {
            tables.luminance
        } else {
            tables.chrominance
        });
    }

    forward_transform(&mut img, planes, opts.accurate_dct);
    debug!(
        "encoding {width}x{height} {colorspace:?} at quality {quality}, {subsampling:?}, progressive={}",
        opts.progressive
    );
    write_jpeg(
        &img,
        &WriteOptions {
            progressive: opts.progressive,
            optimize_huffman: opts.optimize_huffman,
            restart: opts.restart,
            copy_markers: false,
        },
    )
}

/// Check the arguments shared by every compress entry point.
pub(crate) fn check_quality(quality: u8) -> Result<()> {
    if !(1..=100).contains(&quality) {
        return Err(Error::InvalidQuality(quality));
    }
    Ok(())
}

/// Compress packed pixels.
#[allow(clippy::too_many_arguments)]
pub(crate) fn compress(
    src: &[u8],
    width: u32,
    pitch: usize,
    height: u32,
    pf: PixelFormat,
    subsampling: Subsampling,
    quality: u8,
    flags: Flags,
) -> Result<Vec<u8>> {
    check_dimensions(width, height)?;
    check_quality(quality)?;
    let pitch = resolve_pitch(pitch, width, pf)?;
    check_pixel_len(src.len(), width, pitch, height, pf)?;

    let bottom_up = flags.contains(Flags::BOTTOMUP);
    let (colorspace, planes) =
        pixels_to_planes(src, width, pitch, height, pf, subsampling, bottom_up);
    encode_planes(&planes, width, height, colorspace, subsampling, quality, flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_sampling() {
        assert_eq!(
            component_sampling(Colorspace::YCbCr, Subsampling::S420),
            vec![(2, 2, 0), (1, 1, 1), (1, 1, 1)]
        );
        assert_eq!(
            component_sampling(Colorspace::Ycck, Subsampling::S422),
            vec![(2, 1, 0), (1, 1, 1), (1, 1, 1), (2, 1, 0)]
        );
        assert_eq!(
            component_sampling(Colorspace::Gray, Subsampling::Gray),
            vec![(1, 1, 0)]
        );
    }

    #[test]
    fn test_colorspace_choice() {
        assert_eq!(jpeg_colorspace(PixelFormat::Rgb, Subsampling::Gray), Colorspace::Gray);
        assert_eq!(jpeg_colorspace(PixelFormat::Cmyk, Subsampling::S444), Colorspace::Ycck);
        assert_eq!(jpeg_colorspace(PixelFormat::Gray, Subsampling::S420), Colorspace::YCbCr);
    }

    #[test]
    fn test_downsample_rounds_box_average() {
        let plane = SamplePlane {
            width: 4,
            height: 2,
            data: vec![0, 1, 10, 10, 1, 1, 20, 21],
        };
        let out = downsample(&plane, 2, 2);
        assert_eq!((out.width, out.height), (2, 1));
        assert_eq!(out.data, vec![1, 15]);
    }

    #[test]
    fn test_planes_are_padded_to_mcus() {
        let src = vec![200u8; 10 * 3 * 3];
        let (cs, planes) = pixels_to_planes(&src, 10, 30, 3, PixelFormat::Rgb, Subsampling::S420, false);
        assert_eq!(cs, Colorspace::YCbCr);
        assert_eq!((planes[0].width, planes[0].height), (16, 16));
        assert_eq!((planes[1].width, planes[1].height), (8, 8));
        assert!(planes[0].data.iter().all(|&y| y == 200));
        assert!(planes[1].data.iter().all(|&c| c == 128));
    }

    #[test]
    fn test_gray_pixels_with_color_subsampling() {
        let src: Vec<u8> = (0..64).collect();
        let (cs, planes) = pixels_to_planes(&src, 8, 8, 8, PixelFormat::Gray, Subsampling::S444, true);
        assert_eq!(cs, Colorspace::YCbCr);
        // Bottom-up: the last source row comes first.
        assert_eq!(&planes[0].data[..8], &src[56..64]);
        assert!(planes[2].data.iter().all(|&c| c == 128));
    }

    #[test]
    fn test_argument_checks() {
        let src = [0u8; 12];
        let err = compress(&src, 0, 0, 1, PixelFormat::Rgb, Subsampling::S444, 90, Flags::EMPTY);
        assert!(matches!(err, Err(Error::InvalidDimensions { .. })));
        let err = compress(&src, 2, 0, 2, PixelFormat::Rgb, Subsampling::S444, 0, Flags::EMPTY);
        assert!(matches!(err, Err(Error::InvalidQuality(0))));
        let err = compress(&src, 2, 5, 2, PixelFormat::Rgb, Subsampling::S444, 90, Flags::EMPTY);
        assert!(matches!(err, Err(Error::InvalidArgument(_))));
        let err = compress(&src, 3, 0, 2, PixelFormat::Rgb, Subsampling::S444, 90, Flags::EMPTY);
        assert!(matches!(err, Err(Error::InvalidDataLength { expected: 18, actual: 12 })));
    }

    #[test]
    fn test_compress_produces_a_jpeg() {
        let src = vec![90u8; 17 * 9 * 4];
        let jpeg = compress(&src, 17, 0, 9, PixelFormat::Rgbx, Subsampling::S420, 80, Flags::EMPTY).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
    }
}
