//! JPEG decoding: entropy decoding, inverse DCT, chroma upsampling and
//! color conversion into packed pixels.

pub mod bit_reader;
pub mod idct;
pub mod jpeg;

use log::warn;

use crate::color::{cmyk_to_rgb, rgb_to_gray, write_rgb, ycck_to_cmyk};
use crate::error::{Error, Result};
use crate::format::{Colorspace, PixelFormat};
use crate::jpeg::coeff::CoefficientImage;
use crate::jpeg::SamplePlane;
use crate::simd;

use idct::{idct_block, IdctMethod};

/// Non-fatal problems met while decoding one stream.
#[derive(Debug, Default)]
pub struct Warnings {
    stop: bool,
    messages: Vec<String>,
}

impl Warnings {
    /// Collector that turns the first warning into an error when `stop` is set.
    pub fn new(stop: bool) -> Self {
        Self {
            stop,
            messages: Vec::new(),
        }
    }

    /// Record a warning.
    pub fn push(&mut self, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        warn!("{message}");
        if self.stop {
            return Err(Error::StoppedOnWarning(message));
        }
        self.messages.push(message);
        Ok(())
    }

    /// First recorded warning.
    pub fn first(&self) -> Option<&str> {
        self.messages.first().map(String::as_str)
    }

    /// True if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Inverse-DCT every block of component `c` into a plane of `size`
/// samples per block edge, covering the component's padded block grid.
pub fn reconstruct_component(
    img: &CoefficientImage,
    c: usize,
    size: usize,
    method: IdctMethod,
) -> SamplePlane {
    let comp = &img.components[c];
    let table = img.quant_tables[comp.quant_index].unwrap_or([1; 64]);
    let width = comp.blocks_w * size;
    let mut data = vec![0u8; width * comp.blocks_h * size];

    let band = width * size;
    let reconstruct_row = |(by, rows): (usize, &mut [u8])| {
        for bx in 0..comp.blocks_w {
            idct_block(
                comp.block(bx, by),
                &table,
                method,
                size,
                &mut rows[bx * size..],
                width,
            );
        }
    };

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        data.par_chunks_mut(band).enumerate().for_each(reconstruct_row);
    }
    #[cfg(not(feature = "parallel"))]
    data.chunks_mut(band).enumerate().for_each(reconstruct_row);

    SamplePlane {
        width,
        height: comp.blocks_h * size,
        data,
    }
}

/// The top-left `width` x `height` samples of `plane`.
pub fn crop_plane(plane: &SamplePlane, width: usize, height: usize) -> SamplePlane {
    if plane.width == width && plane.height == height {
        return plane.clone();
    }
    let mut data = Vec::with_capacity(width * height);
    for row in plane.data.chunks(plane.width).take(height) {
        data.extend_from_slice(&row[..width]);
    }
    SamplePlane {
        width,
        height,
        data,
    }
}

/// Upsample `plane` by integral factors `h` x `v` and crop to
/// `out_w` x `out_h`.
///
/// With `fancy`, 2x horizontal and/or 2x vertical expansion uses triangle
/// interpolation (libjpeg's "fancy" upsampling); everything else replicates.
pub fn upsample(
    plane: &SamplePlane,
    h: usize,
    v: usize,
    out_w: usize,
    out_h: usize,
    fancy: bool,
) -> SamplePlane {
    let full = match (h, v) {
        (1, 1) => plane.clone(),
        (2, 1) if fancy => h2v1_fancy(plane),
        (1, 2) if fancy => h1v2_fancy(plane),
        (2, 2) if fancy => h2v2_fancy(plane),
        _ => replicate(plane, h, v),
    };
    if full.width < out_w || full.height < out_h {
        // Source plane narrower than the image implies; replicate edges.
        return pad_plane(&full, out_w, out_h);
    }
    crop_plane(&full, out_w, out_h)
}

fn pad_plane(plane: &SamplePlane, width: usize, height: usize) -> SamplePlane {
    let mut data = vec![0u8; width * height];
    for (y, out) in data.chunks_mut(width).enumerate() {
        let row = &plane.data[y.min(plane.height - 1) * plane.width..][..plane.width];
        for (x, px) in out.iter_mut().enumerate() {
            *px = row[x.min(plane.width - 1)];
        }
    }
    SamplePlane {
        width,
        height,
        data,
    }
}

fn replicate(plane: &SamplePlane, h: usize, v: usize) -> SamplePlane {
    let width = plane.width * h;
    let mut data = Vec::with_capacity(width * plane.height * v);
    for row in plane.data.chunks(plane.width) {
        let start = data.len();
        for &s in row {
            data.extend(std::iter::repeat(s).take(h));
        }
        for _ in 1..v {
            data.extend_from_within(start..start + width);
        }
    }
    SamplePlane {
        width,
        height: plane.height * v,
        data,
    }
}

fn h2v1_row(input: &[u8], out: &mut [u8]) {
    let n = input.len();
    if n == 1 {
        out[0] = input[0];
        out[1] = input[0];
        return;
    }
    out[0] = input[0];
    out[1] = ((input[0] as u32 * 3 + input[1] as u32 + 2) >> 2) as u8;
    for i in 1..n - 1 {
        let this = input[i] as u32 * 3;
        out[2 * i] = ((this + input[i - 1] as u32 + 1) >> 2) as u8;
        out[2 * i + 1] = ((this + input[i + 1] as u32 + 2) >> 2) as u8;
    }
    out[2 * n - 2] = ((input[n - 1] as u32 * 3 + input[n - 2] as u32 + 1) >> 2) as u8;
    out[2 * n - 1] = input[n - 1];
}

fn h2v1_fancy(plane: &SamplePlane) -> SamplePlane {
    let width = plane.width * 2;
    let mut data = vec![0u8; width * plane.height];
    for (input, out) in plane.data.chunks(plane.width).zip(data.chunks_mut(width)) {
        h2v1_row(input, out);
    }
    SamplePlane {
        width,
        height: plane.height,
        data,
    }
}

/// Row `y` of `plane` with its nearer vertical neighbor for output row
/// `2y + odd`, edges clamped.
fn row_pair(plane: &SamplePlane, y: usize, odd: bool) -> (&[u8], &[u8]) {
    let near = y;
    let far = if odd {
        (y + 1).min(plane.height - 1)
    } else {
        y.saturating_sub(1)
    };
    let row = |r: usize| &plane.data[r * plane.width..(r + 1) * plane.width];
    (row(near), row(far))
}

fn h1v2_fancy(plane: &SamplePlane) -> SamplePlane {
    let width = plane.width;
    let mut data = vec![0u8; width * plane.height * 2];
    for (oy, out) in data.chunks_mut(width).enumerate() {
        let odd = oy % 2 == 1;
        let (near, far) = row_pair(plane, oy / 2, odd);
        let bias = if odd { 2 } else { 1 };
        for ((o, &a), &b) in out.iter_mut().zip(near).zip(far) {
            *o = ((a as u32 * 3 + b as u32 + bias) >> 2) as u8;
        }
    }
    SamplePlane {
        width,
        height: plane.height * 2,
        data,
    }
}

fn h2v2_fancy(plane: &SamplePlane) -> SamplePlane {
    let width = plane.width * 2;
    let n = plane.width;
    let mut data = vec![0u8; width * plane.height * 2];
    let mut colsum = vec![0u32; n];
    for (oy, out) in data.chunks_mut(width).enumerate() {
        let (near, far) = row_pair(plane, oy / 2, oy % 2 == 1);
        for ((s, &a), &b) in colsum.iter_mut().zip(near).zip(far) {
            *s = a as u32 * 3 + b as u32;
        }
        if n == 1 {
            out[0] = ((colsum[0] * 4 + 8) >> 4) as u8;
            out[1] = ((colsum[0] * 4 + 7) >> 4) as u8;
            continue;
        }
        out[0] = ((colsum[0] * 4 + 8) >> 4) as u8;
        out[1] = ((colsum[0] * 3 + colsum[1] + 7) >> 4) as u8;
        for i in 1..n - 1 {
            out[2 * i] = ((colsum[i] * 3 + colsum[i - 1] + 8) >> 4) as u8;
            out[2 * i + 1] = ((colsum[i] * 3 + colsum[i + 1] + 7) >> 4) as u8;
        }
        out[2 * n - 2] = ((colsum[n - 1] * 3 + colsum[n - 2] + 8) >> 4) as u8;
        out[2 * n - 1] = ((colsum[n - 1] * 4 + 7) >> 4) as u8;
    }
    SamplePlane {
        width,
        height: plane.height * 2,
        data,
    }
}

/// Check that `colorspace` can be converted to `pf`.
pub fn check_conversion(colorspace: Colorspace, pf: PixelFormat) -> Result<()> {
    let cmyk_source = matches!(colorspace, Colorspace::Cmyk | Colorspace::Ycck);
    if pf == PixelFormat::Cmyk && !cmyk_source {
        return Err(Error::unsupported(format!(
            "color conversion from {colorspace:?} to CMYK"
        )));
    }
    Ok(())
}

/// Where output row `y` of `height` starts in a destination with `pitch`.
#[inline]
pub fn row_offset(y: usize, height: usize, pitch: usize, bottom_up: bool) -> usize {
    if bottom_up {
        (height - 1 - y) * pitch
    } else {
        y * pitch
    }
}

/// Color convert full-resolution component planes into packed pixels.
///
/// `planes` hold `width` x `height` samples each, in `colorspace` order.
pub fn write_pixels(
    planes: &[SamplePlane],
    colorspace: Colorspace,
    pf: PixelFormat,
    dst: &mut [u8],
    pitch: usize,
    bottom_up: bool,
) -> Result<()> {
    check_conversion(colorspace, pf)?;
    let (width, height) = (planes[0].width, planes[0].height);
    let ps = pf.pixel_size();
    for y in 0..height {
        let start = row_offset(y, height, pitch, bottom_up);
        let out = &mut dst[start..start + width * ps];
        let row = |c: usize| &planes[c].data[y * width..(y + 1) * width];
        match colorspace {
            Colorspace::YCbCr if pf == PixelFormat::Gray => out.copy_from_slice(row(0)),
            Colorspace::YCbCr => simd::ycc_to_rgb_row(row(0), row(1), row(2), out, pf),
            Colorspace::Gray if pf == PixelFormat::Gray => out.copy_from_slice(row(0)),
            Colorspace::Gray => {
                for (px, &g) in out.chunks_exact_mut(ps).zip(row(0)) {
                    write_rgb(px, pf, g, g, g);
                }
            }
            Colorspace::Rgb => {
                let (r, g, b) = (row(0), row(1), row(2));
                for (x, px) in out.chunks_exact_mut(ps).enumerate() {
                    write_rgb(px, pf, r[x], g[x], b[x]);
                }
            }
            Colorspace::Cmyk | Colorspace::Ycck => {
                let (c0, c1, c2, c3) = (row(0), row(1), row(2), row(3));
                for (x, px) in out.chunks_exact_mut(ps).enumerate() {
                    let cmyk = if colorspace == Colorspace::Ycck {
                        ycck_to_cmyk(c0[x], c1[x], c2[x], c3[x])
                    } else {
                        [c0[x], c1[x], c2[x], c3[x]]
                    };
                    if pf == PixelFormat::Cmyk {
                        px.copy_from_slice(&cmyk);
                        continue;
                    }
                    let (r, g, b) = cmyk_to_rgb(cmyk[0], cmyk[1], cmyk[2], cmyk[3]);
                    if pf == PixelFormat::Gray {
                        px[0] = rgb_to_gray(r, g, b);
                    } else {
                        write_rgb(px, pf, r, g, b);
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane(width: usize, height: usize, data: Vec<u8>) -> SamplePlane {
        SamplePlane {
            width,
            height,
            data,
        }
    }

    #[test]
    fn test_warnings_collect_or_stop() {
        let mut warnings = Warnings::new(false);
        assert!(warnings.is_empty());
        warnings.push("first").unwrap();
        warnings.push("second").unwrap();
        assert_eq!(warnings.first(), Some("first"));

        let mut strict = Warnings::new(true);
        assert!(matches!(strict.push("bad"), Err(Error::StoppedOnWarning(m)) if m == "bad"));
    }

    #[test]
    fn test_fancy_h2v1_matches_triangle_filter() {
        let src = plane(3, 1, vec![0, 100, 200]);
        let out = upsample(&src, 2, 1, 6, 1, true);
        assert_eq!(out.data, vec![0, 25, 75, 125, 175, 200]);
    }

    #[test]
    fn test_replicate_when_not_fancy() {
        let src = plane(2, 2, vec![1, 2, 3, 4]);
        let out = upsample(&src, 2, 2, 3, 3, false);
        assert_eq!(out.data, vec![1, 1, 2, 1, 1, 2, 3, 3, 4]);
    }

    #[test]
    fn test_fancy_preserves_flat_planes() {
        let src = plane(5, 3, vec![77; 15]);
        for (h, v) in [(2, 1), (1, 2), (2, 2)] {
            let out = upsample(&src, h, v, 5 * h, 3 * v, true);
            assert!(out.data.iter().all(|&s| s == 77), "{h}x{v}");
        }
    }

    #[test]
    fn test_h2v2_single_column() {
        let src = plane(1, 1, vec![40]);
        let out = upsample(&src, 2, 2, 2, 2, true);
        assert_eq!(out.data, vec![40; 4]);
    }

    #[test]
    fn test_upsample_pads_short_planes() {
        let src = plane(1, 1, vec![9]);
        let out = upsample(&src, 1, 1, 2, 2, true);
        assert_eq!(out.data, vec![9; 4]);
    }

    #[test]
    fn test_reconstruct_flat_component() {
        let mut img = CoefficientImage::allocate(16, 8, Colorspace::Gray, &[(1, 1, 0)]);
        img.quant_tables[0] = Some([2; 64]);
        for block in &mut img.components[0].blocks {
            block[0] = 4 * 10; // 8 * 10 after dequantization
        }
        for size in [1, 4, 8, 16] {
            let out = reconstruct_component(&img, 0, size, IdctMethod::Accurate);
            assert_eq!((out.width, out.height), (2 * size, size));
            assert!(out.data.iter().all(|&s| s == 138), "size {size}");
        }
    }

    #[test]
    fn test_write_pixels_bottom_up_gray_to_rgba() {
        let planes = [plane(2, 2, vec![10, 20, 30, 40])];
        let mut dst = vec![0u8; 16];
        write_pixels(&planes, Colorspace::Gray, PixelFormat::Rgba, &mut dst, 8, true).unwrap();
        assert_eq!(&dst[..8], &[30, 30, 30, 255, 40, 40, 40, 255]);
        assert_eq!(&dst[8..], &[10, 10, 10, 255, 20, 20, 20, 255]);
    }

    #[test]
    fn test_cmyk_output_requires_cmyk_source() {
        let planes = [plane(1, 1, vec![1]), plane(1, 1, vec![2]), plane(1, 1, vec![3])];
        let mut dst = [0u8; 4];
        let result = write_pixels(&planes, Colorspace::YCbCr, PixelFormat::Cmyk, &mut dst, 4, false);
        assert!(matches!(result, Err(Error::Unsupported(_))));
    }
}
