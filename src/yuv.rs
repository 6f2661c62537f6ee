//! Planar YUV images: plane geometry and the color-convert-only codec.
//!
//! A YUV image is one luma plane plus, unless grayscale, two chroma planes
//! downsampled by the subsampling mode. Planes are addressed either through
//! one interleaved buffer (planes back to back, rows padded to a power-of-two
//! alignment) or through a slice per plane with independent strides.

use crate::compress::{check_dimensions, check_pixel_len, pixels_to_planes, resolve_pitch};
use crate::decode::{upsample, write_pixels};
use crate::error::{Error, Result};
use crate::flags::Flags;
use crate::format::{pad, plane_height, plane_width, Colorspace, PixelFormat, Subsampling};
use crate::jpeg::SamplePlane;

/// Where the rows of one plane live in a caller slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PlaneLayout {
    pub width: usize,
    pub height: usize,
    pub stride: usize,
    /// Rows are stored last row first (negative stride).
    pub bottom_up: bool,
}

impl PlaneLayout {
    /// Offset of row `y`.
    pub fn row_start(&self, y: usize) -> usize {
        if self.bottom_up {
            (self.height - 1 - y) * self.stride
        } else {
            y * self.stride
        }
    }

    /// Bytes the plane spans.
    pub fn size(&self) -> usize {
        self.stride * (self.height - 1) + self.width
    }
}

/// Layouts of the planes of a `width` x `height` image with explicit
/// strides. A missing stride array or a zero stride means the plane width.
pub(crate) fn plane_layouts(
    width: u32,
    height: u32,
    subsampling: Subsampling,
    strides: Option<&[i32]>,
) -> Result<Vec<PlaneLayout>> {
    check_dimensions(width, height)?;
    let n = subsampling.num_planes();
    if let Some(strides) = strides {
        if strides.len() < n {
            return Err(Error::invalid(format!(
                "{n} plane strides required, {} given",
                strides.len()
            )));
        }
    }
    (0..n)
        .map(|c| {
            let pw = plane_width(c, width, subsampling)?;
            let ph = plane_height(c, height, subsampling)?;
            let stride = strides.map_or(0, |s| s[c]);
            let abs = stride.unsigned_abs() as usize;
            if stride != 0 && abs < pw {
                return Err(Error::invalid(format!(
                    "stride {stride} of plane {c} is smaller than its width {pw}"
                )));
            }
            Ok(PlaneLayout {
                width: pw,
                height: ph,
                stride: if stride == 0 { pw } else { abs },
                bottom_up: stride < 0,
            })
        })
        .collect()
}

/// Layouts of the planes of an interleaved buffer, with each plane's rows
/// padded to `align`, plus each plane's byte offset.
pub(crate) fn interleaved_layouts(
    width: u32,
    align: usize,
    height: u32,
    subsampling: Subsampling,
) -> Result<Vec<(usize, PlaneLayout)>> {
    if align == 0 || !align.is_power_of_two() {
        return Err(Error::invalid(format!(
            "row alignment {align} is not a power of two"
        )));
    }
    let mut offset = 0;
    let mut layouts = plane_layouts(width, height, subsampling, None)?;
    for layout in &mut layouts {
        layout.stride = pad(layout.width, align);
    }
    Ok(layouts
        .into_iter()
        .map(|layout| {
            let start = offset;
            offset += layout.stride * layout.height;
            (start, layout)
        })
        .collect())
}

/// Bytes an interleaved buffer with these layouts needs.
fn interleaved_size(layouts: &[(usize, PlaneLayout)]) -> usize {
    layouts
        .last()
        .map_or(0, |(offset, layout)| offset + layout.stride * layout.height)
}

/// Borrow the planes of an interleaved source buffer.
pub(crate) fn split_planes<'a>(
    buf: &'a [u8],
    layouts: &[(usize, PlaneLayout)],
) -> Result<Vec<&'a [u8]>> {
    let needed = interleaved_size(layouts);
    if buf.len() < needed {
        return Err(Error::InvalidDataLength {
            expected: needed,
            actual: buf.len(),
        });
    }
    Ok(layouts
        .iter()
        .map(|(offset, layout)| &buf[*offset..*offset + layout.size()])
        .collect())
}

/// Mutably borrow the planes of an interleaved destination buffer.
pub(crate) fn split_planes_mut<'a>(
    buf: &'a mut [u8],
    layouts: &[(usize, PlaneLayout)],
) -> Result<Vec<&'a mut [u8]>> {
    let needed = interleaved_size(layouts);
    if buf.len() < needed {
        return Err(Error::InvalidDataLength {
            expected: needed,
            actual: buf.len(),
        });
    }
    let mut planes = Vec::with_capacity(layouts.len());
    let mut rest = buf;
    let mut consumed = 0;
    for (offset, layout) in layouts {
        let (_, tail) = std::mem::take(&mut rest).split_at_mut(offset - consumed);
        let (plane, tail) = tail.split_at_mut(layout.size());
        planes.push(plane);
        consumed = offset + layout.size();
        rest = tail;
    }
    Ok(planes)
}

/// Check that each plane slice covers its layout.
pub(crate) fn check_planes<T: AsRef<[u8]>>(planes: &[T], layouts: &[PlaneLayout]) -> Result<()> {
    if planes.len() < layouts.len() {
        return Err(Error::invalid(format!(
            "{} planes required, {} given",
            layouts.len(),
            planes.len()
        )));
    }
    for (plane, layout) in planes.iter().zip(layouts) {
        let actual = plane.as_ref().len();
        if actual < layout.size() {
            return Err(Error::InvalidDataLength {
                expected: layout.size(),
                actual,
            });
        }
    }
    Ok(())
}

/// Copy a plane out of a caller slice, replicating its edges out to
/// `padded_w` x `padded_h`.
pub(crate) fn read_plane(src: &[u8], layout: &PlaneLayout, padded_w: usize, padded_h: usize) -> SamplePlane {
    SamplePlane::from_rows(src, layout.width, layout.height, padded_w, padded_h, |y| {
        layout.row_start(y)
    })
}

/// Copy the top-left `layout.width` x `layout.height` samples of `plane`
/// into a caller slice.
pub(crate) fn write_plane(plane: &SamplePlane, dst: &mut [u8], layout: &PlaneLayout) {
    for y in 0..layout.height {
        let src = &plane.data[y * plane.width..][..layout.width];
        let start = layout.row_start(y);
        dst[start..start + layout.width].copy_from_slice(src);
    }
}

/// Color convert and downsample packed pixels into YUV planes.
#[allow(clippy::too_many_arguments)]
pub(crate) fn encode(
    src: &[u8],
    width: u32,
    pitch: usize,
    height: u32,
    pf: PixelFormat,
    planes: &mut [&mut [u8]],
    layouts: &[PlaneLayout],
    subsampling: Subsampling,
    flags: Flags,
) -> Result<()> {
    if pf == PixelFormat::Cmyk {
        return Err(Error::unsupported("YUV encoding of CMYK pixels"));
    }
    let pitch = resolve_pitch(pitch, width, pf)?;
    check_pixel_len(src.len(), width, pitch, height, pf)?;
    check_planes(planes, layouts)?;

    let bottom_up = flags.contains(Flags::BOTTOMUP);
    let (_, converted) = pixels_to_planes(src, width, pitch, height, pf, subsampling, bottom_up);
    for ((plane, dst), layout) in converted.iter().zip(planes.iter_mut()).zip(layouts) {
        write_plane(plane, dst, layout);
    }
    Ok(())
}

/// Upsample and color convert YUV planes into packed pixels.
#[allow(clippy::too_many_arguments)]
pub(crate) fn decode(
    planes: &[&[u8]],
    layouts: &[PlaneLayout],
    subsampling: Subsampling,
    dst: &mut [u8],
    width: u32,
    pitch: usize,
    height: u32,
    pf: PixelFormat,
    flags: Flags,
) -> Result<()> {
    let colorspace = if subsampling == Subsampling::Gray {
        Colorspace::Gray
    } else {
        Colorspace::YCbCr
    };
    crate::decode::check_conversion(colorspace, pf)?;
    let pitch = resolve_pitch(pitch, width, pf)?;
    check_pixel_len(dst.len(), width, pitch, height, pf)?;
    check_planes(planes, layouts)?;

    let (w, h) = (width as usize, height as usize);
    let fancy = !flags.contains(Flags::FASTUPSAMPLE);
    let full: Vec<SamplePlane> = planes
        .iter()
        .zip(layouts)
        .enumerate()
        .map(|(c, (src, layout))| {
            let plane = read_plane(src, layout, layout.width, layout.height);
            let (hf, vf) = if c == 0 {
                (1, 1)
            } else {
                (subsampling.h_factor(), subsampling.v_factor())
            };
            upsample(&plane, hf, vf, w, h, fancy)
        })
        .collect();
    write_pixels(&full, colorspace, pf, dst, pitch, flags.contains(Flags::BOTTOMUP))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layouts_default_and_negative_strides() {
        let layouts = plane_layouts(35, 17, Subsampling::S420, Some(&[0, -40, 20])).unwrap();
        assert_eq!(layouts[0], PlaneLayout { width: 36, height: 18, stride: 36, bottom_up: false });
        assert_eq!(layouts[1], PlaneLayout { width: 18, height: 9, stride: 40, bottom_up: true });
        assert_eq!(layouts[2].stride, 20);
        assert_eq!(layouts[1].row_start(0), 8 * 40);

        assert!(plane_layouts(35, 17, Subsampling::S420, Some(&[0, 10, 0])).is_err());
        assert!(plane_layouts(35, 17, Subsampling::S420, Some(&[0, 0])).is_err());
        assert_eq!(plane_layouts(8, 8, Subsampling::Gray, None).unwrap().len(), 1);
    }

    #[test]
    fn test_interleaved_offsets_match_buffer_size() {
        let layouts = interleaved_layouts(35, 4, 17, Subsampling::S420).unwrap();
        assert_eq!(layouts[0].0, 0);
        assert_eq!(layouts[1].0, 36 * 18);
        assert_eq!(layouts[2].0, 36 * 18 + 20 * 9);
        assert_eq!(
            interleaved_size(&layouts),
            crate::format::buf_size_yuv(35, 4, 17, Subsampling::S420).unwrap()
        );
        assert!(interleaved_layouts(35, 3, 17, Subsampling::S420).is_err());
    }

    #[test]
    fn test_split_planes_mut_is_disjoint() {
        let layouts = interleaved_layouts(4, 1, 2, Subsampling::S422).unwrap();
        let mut buf = vec![0u8; 16];
        let mut planes = split_planes_mut(&mut buf, &layouts).unwrap();
        assert_eq!(planes.iter().map(|p| p.len()).collect::<Vec<_>>(), vec![8, 4, 4]);
        planes[1].fill(1);
        planes[2].fill(2);
        assert_eq!(&buf[8..], &[1, 1, 1, 1, 2, 2, 2, 2]);
        assert!(split_planes(&buf[..15], &layouts).is_err());
    }

    #[test]
    fn test_gray_pixels_round_trip_exactly() {
        let (w, h) = (13u32, 7u32);
        let src: Vec<u8> = (0..w * h).map(|i| (i * 7 % 256) as u8).collect();
        let layouts = plane_layouts(w, h, Subsampling::Gray, None).unwrap();
        let mut y = vec![0u8; layouts[0].size()];
        encode(&src, w, 0, h, PixelFormat::Gray, &mut [&mut y], &layouts, Subsampling::Gray, Flags::EMPTY)
            .unwrap();
        assert_eq!(y, src);

        let mut out = vec![0u8; src.len()];
        decode(&[&y], &layouts, Subsampling::Gray, &mut out, w, 0, h, PixelFormat::Gray, Flags::EMPTY)
            .unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn test_bottom_up_plane_rows() {
        let layouts = plane_layouts(2, 2, Subsampling::Gray, Some(&[-2])).unwrap();
        let src = [10u8, 20, 30, 40];
        let mut y = vec![0u8; 4];
        encode(&src, 2, 0, 2, PixelFormat::Gray, &mut [&mut y], &layouts, Subsampling::Gray, Flags::EMPTY)
            .unwrap();
        assert_eq!(y, vec![30, 40, 10, 20]);
    }

    #[test]
    fn test_cmyk_is_rejected() {
        let layouts = plane_layouts(8, 8, Subsampling::S444, None).unwrap();
        let mut out = vec![0u8; 256];
        let planes = vec![vec![128u8; 64]; 3];
        let refs: Vec<&[u8]> = planes.iter().map(Vec::as_slice).collect();
        let err = decode(&refs, &layouts, Subsampling::S444, &mut out, 8, 0, 8, PixelFormat::Cmyk, Flags::EMPTY);
        assert!(matches!(err, Err(Error::Unsupported(_))));
    }
}
