//! Lossless transforms in the coefficient domain.
//!
//! A source stream is entropy decoded once. Every requested [`Transform`]
//! then rearranges whole blocks of that coefficient set (mirroring inside a
//! block is sign flips of odd frequencies, transposing is a transpose of
//! the coefficient matrix), optionally hands each component to a filter,
//! and re-encodes the result into its own output buffer.
//!
//! Only whole iMCUs can be mirrored. Blocks of a partial iMCU on an edge
//! that an operation mirrors stay where they are unless they are trimmed.

use std::fmt;

use log::debug;

use crate::buffer::OutputBuffer;
use crate::decode::jpeg::{decode_coefficients, TableCache};
use crate::decode::Warnings;
use crate::error::{Error, Result};
use crate::flags::{Flags, TransformOptions};
use crate::format::{buf_size, Colorspace, Region, Subsampling};
use crate::jpeg::coeff::{Block, CoefficientImage};
use crate::jpeg::quantize::transpose_table;
use crate::jpeg::writer::{write_jpeg, WriteOptions};
use crate::jpeg::Restart;

/// Geometric operation applied by a [`Transform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransformOp {
    /// Leave the image as is.
    #[default]
    None,
    /// Mirror left to right.
    HFlip,
    /// Mirror top to bottom.
    VFlip,
    /// Reflect across the top-left to bottom-right diagonal.
    Transpose,
    /// Reflect across the top-right to bottom-left diagonal.
    Transverse,
    /// Rotate 90 degrees clockwise.
    Rot90,
    /// Rotate 180 degrees.
    Rot180,
    /// Rotate 270 degrees clockwise.
    Rot270,
}

impl TransformOp {
    /// All operations.
    pub const ALL: [TransformOp; 8] = [
        TransformOp::None,
        TransformOp::HFlip,
        TransformOp::VFlip,
        TransformOp::Transpose,
        TransformOp::Transverse,
        TransformOp::Rot90,
        TransformOp::Rot180,
        TransformOp::Rot270,
    ];

    /// True if the operation swaps width and height.
    pub fn transposes(self) -> bool {
        matches!(
            self,
            TransformOp::Transpose | TransformOp::Transverse | TransformOp::Rot90 | TransformOp::Rot270
        )
    }

    /// True if the operation mirrors source columns.
    fn mirrors_x(self) -> bool {
        matches!(
            self,
            TransformOp::HFlip | TransformOp::Rot270 | TransformOp::Transverse | TransformOp::Rot180
        )
    }

    /// True if the operation mirrors source rows.
    fn mirrors_y(self) -> bool {
        matches!(
            self,
            TransformOp::VFlip | TransformOp::Rot90 | TransformOp::Transverse | TransformOp::Rot180
        )
    }
}

/// Parameters of one transform, as seen by its filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransformParams {
    /// Crop region in destination coordinates, used with
    /// [`TransformOptions::CROP`].
    pub region: Region,
    /// Geometric operation.
    pub op: TransformOp,
    /// Option bits.
    pub options: TransformOptions,
}

/// Where a filter call sits in the transformed image.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    /// Region covered by the coefficient array, in samples of the component.
    pub array_region: Region,
    /// The whole component plane, in samples.
    pub plane_region: Region,
    /// Component index (0 = luma).
    pub component: usize,
    /// Position of the transform in the request list.
    pub transform_index: usize,
    /// The transform being applied.
    pub transform: &'a TransformParams,
}

/// Result of a filter call. An error abandons that transform's output.
pub type FilterResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

type Filter = Box<dyn FnMut(&mut [Block], &FilterContext<'_>) -> FilterResult>;

/// One requested lossless transform.
///
/// ```
/// use turbopix::{Region, Transform, TransformOp, TransformOptions};
///
/// let t = Transform::new(TransformOp::Rot90)
///     .with_options(TransformOptions::CROP | TransformOptions::TRIM)
///     .with_region(Region::new(0, 0, 64, 0));
/// assert_eq!(t.params().op, TransformOp::Rot90);
/// ```
#[derive(Default)]
pub struct Transform {
    params: TransformParams,
    filter: Option<Filter>,
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform")
            .field("params", &self.params)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

impl Transform {
    /// Transform applying `op` with no options.
    pub fn new(op: TransformOp) -> Self {
        Transform {
            params: TransformParams {
                op,
                ..TransformParams::default()
            },
            filter: None,
        }
    }

    /// Set the crop region.
    pub fn with_region(mut self, region: Region) -> Self {
        self.params.region = region;
        self
    }

    /// Set the option bits.
    pub fn with_options(mut self, options: TransformOptions) -> Self {
        self.params.options = options;
        self
    }

    /// Install a filter. It is called once per component with that
    /// component's destination blocks in natural coefficient order, rows of
    /// `plane_region.w / 8` blocks, before the image is re-encoded.
    pub fn with_filter(
        mut self,
        filter: impl FnMut(&mut [Block], &FilterContext<'_>) -> FilterResult + 'static,
    ) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Parameters of this transform.
    pub fn params(&self) -> &TransformParams {
        &self.params
    }
}

/// Validated geometry of one transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Plan {
    op: TransformOp,
    gray: bool,
    /// Source extent after trimming.
    src_w: usize,
    src_h: usize,
    /// Source iMCU size in pixels.
    imcu_w: usize,
    imcu_h: usize,
    /// Crop offset and final size, destination pixels.
    crop: Region,
}

/// Check one transform against the source and resolve its geometry.
fn plan(img: &CoefficientImage, index: usize, params: &TransformParams) -> Result<Plan> {
    let op = params.op;
    let options = params.options;
    let gray = options.contains(TransformOptions::GRAY) || img.colorspace == Colorspace::Gray;
    if gray && !matches!(img.colorspace, Colorspace::YCbCr | Colorspace::Gray) {
        return Err(Error::unsupported(format!(
            "grayscale conversion of a {:?} image",
            img.colorspace
        )));
    }
    if op.transposes() && !gray && img.subsampling() == Some(Subsampling::S411) {
        return Err(Error::unsupported("transposing a 4:1:1 image"));
    }

    let (imcu_w, imcu_h) = if gray {
        (8, 8)
    } else {
        (8 * img.max_h(), 8 * img.max_v())
    };
    let (mut src_w, mut src_h) = (img.width, img.height);

    if options.contains(TransformOptions::PERFECT) {
        if op.mirrors_x() && src_w % imcu_w != 0 {
            return Err(Error::ImperfectTransform {
                index,
                reason: format!("width {src_w} is not a multiple of {imcu_w}"),
            });
        }
        if op.mirrors_y() && src_h % imcu_h != 0 {
            return Err(Error::ImperfectTransform {
                index,
                reason: format!("height {src_h} is not a multiple of {imcu_h}"),
            });
        }
    }
    if options.contains(TransformOptions::TRIM) {
        if op.mirrors_x() && src_w >= imcu_w {
            src_w -= src_w % imcu_w;
        }
        if op.mirrors_y() && src_h >= imcu_h {
            src_h -= src_h % imcu_h;
        }
    }

    let (dst_w, dst_h) = if op.transposes() {
        (src_h, src_w)
    } else {
        (src_w, src_h)
    };
    let crop = if options.contains(TransformOptions::CROP) {
        let (dst_imcu_w, dst_imcu_h) = if op.transposes() {
            (imcu_h, imcu_w)
        } else {
            (imcu_w, imcu_h)
        };
        crop_region(params.region, dst_w, dst_h, dst_imcu_w, dst_imcu_h)?
    } else {
        Region::new(0, 0, dst_w as u32, dst_h as u32)
    };

    Ok(Plan {
        op,
        gray,
        src_w,
        src_h,
        imcu_w,
        imcu_h,
        crop,
    })
}

/// Resolve a crop region against a `width` x `height` destination.
fn crop_region(region: Region, width: usize, height: usize, imcu_w: usize, imcu_h: usize) -> Result<Region> {
    let (x, y) = (region.x as usize, region.y as usize);
    if x % imcu_w != 0 || y % imcu_h != 0 {
        return Err(Error::invalid(format!(
            "crop origin ({x}, {y}) is not a multiple of the {imcu_w}x{imcu_h} iMCU"
        )));
    }
    if x >= width || y >= height {
        return Err(Error::invalid(format!(
            "crop origin ({x}, {y}) is outside the {width}x{height} image"
        )));
    }
    let w = if region.w == 0 { width - x } else { region.w as usize };
    let h = if region.h == 0 { height - y } else { region.h as usize };
    if x + w > width || y + h > height {
        return Err(Error::invalid(format!(
            "crop region {w}x{h}+{x}+{y} exceeds the {width}x{height} image"
        )));
    }
    Ok(Region::new(x as u32, y as u32, w as u32, h as u32))
}

/// How a destination block is derived from its source block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct BlockOp {
    transpose: bool,
    /// Negate odd horizontal frequencies of the (transposed) block.
    flip_u: bool,
    /// Negate odd vertical frequencies of the (transposed) block.
    flip_v: bool,
}

/// Source block for destination block (`x`, `y`) of one component, where
/// `mw` x `mh` source blocks form the whole-iMCU area that gets mirrored.
fn source_block(op: TransformOp, x: usize, y: usize, mw: usize, mh: usize) -> (usize, usize, BlockOp) {
    let mirror = |i: usize, m: usize| if i < m { (m - 1 - i, true) } else { (i, false) };
    let none = BlockOp::default();
    match op {
        TransformOp::None => (x, y, none),
        TransformOp::HFlip => {
            let (sx, flip_u) = mirror(x, mw);
            (sx, y, BlockOp { flip_u, ..none })
        }
        TransformOp::VFlip => {
            let (sy, flip_v) = mirror(y, mh);
            (x, sy, BlockOp { flip_v, ..none })
        }
        TransformOp::Transpose => (y, x, BlockOp { transpose: true, ..none }),
        TransformOp::Transverse => {
            let (sx, flip_v) = mirror(y, mw);
            let (sy, flip_u) = mirror(x, mh);
            (sx, sy, BlockOp { transpose: true, flip_u, flip_v })
        }
        TransformOp::Rot90 => {
            let (sy, flip_u) = mirror(x, mh);
            (y, sy, BlockOp { transpose: true, flip_u, ..none })
        }
        TransformOp::Rot180 => {
            let (sx, flip_u) = mirror(x, mw);
            let (sy, flip_v) = mirror(y, mh);
            (sx, sy, BlockOp { flip_u, flip_v, ..none })
        }
        TransformOp::Rot270 => {
            let (sx, flip_v) = mirror(y, mw);
            (sx, x, BlockOp { transpose: true, flip_v, ..none })
        }
    }
}

fn apply_block_op(src: &Block, op: BlockOp) -> Block {
    std::array::from_fn(|i| {
        let (v, u) = (i / 8, i % 8);
        let coef = if op.transpose { src[u * 8 + v] } else { src[i] };
        let negate = (op.flip_u && u % 2 == 1) ^ (op.flip_v && v % 2 == 1);
        if negate {
            coef.wrapping_neg()
        } else {
            coef
        }
    })
}

/// Build the destination coefficient image of one plan.
fn transform_image(img: &CoefficientImage, plan: &Plan) -> CoefficientImage {
    let op = plan.op;
    let ncomp = if plan.gray { 1 } else { img.components.len() };
    let colorspace = if plan.gray { Colorspace::Gray } else { img.colorspace };
    let sampling: Vec<(usize, usize, usize)> = img.components[..ncomp]
        .iter()
        .map(|c| {
            let (h, v) = if plan.gray { (1, 1) } else { (c.h, c.v) };
            if op.transposes() {
                (v, h, c.quant_index)
            } else {
                (h, v, c.quant_index)
            }
        })
        .collect();

    let mut out = CoefficientImage::allocate(
        plan.crop.w as usize,
        plan.crop.h as usize,
        colorspace,
        &sampling,
    );
    out.quant_tables = if op.transposes() {
        img.quant_tables.map(|t| t.map(|t| transpose_table(&t)))
    } else {
        img.quant_tables
    };
    out.markers = img.markers.clone();

    let (out_max_h, out_max_v) = (out.max_h(), out.max_v());
    for (c, dst) in out.components.iter_mut().enumerate() {
        let src = &img.components[c];
        dst.id = src.id;
        let (ch, cv) = if plan.gray { (1, 1) } else { (src.h, src.v) };
        let mw = plan.src_w / plan.imcu_w * ch;
        let mh = plan.src_h / plan.imcu_h * cv;
        // Crop offset in this component's destination blocks.
        let ox = plan.crop.x as usize / (8 * out_max_h) * dst.h;
        let oy = plan.crop.y as usize / (8 * out_max_v) * dst.v;

        for y in 0..dst.blocks_h {
            for x in 0..dst.blocks_w {
                let (sx, sy, block_op) = source_block(op, x + ox, y + oy, mw, mh);
                if sx < src.blocks_w && sy < src.blocks_h {
                    *dst.block_mut(x, y) = apply_block_op(src.block(sx, sy), block_op);
                }
            }
        }
    }
    out
}

/// Run the filter of transform `index` over every component of `img`.
fn run_filter(transform: &mut Transform, index: usize, img: &mut CoefficientImage) -> FilterResult {
    let Transform { params, filter } = transform;
    let Some(filter) = filter.as_mut() else {
        return Ok(());
    };
    for (c, comp) in img.components.iter_mut().enumerate() {
        let plane = Region::new(0, 0, (comp.blocks_w * 8) as u32, (comp.blocks_h * 8) as u32);
        let ctx = FilterContext {
            array_region: plane,
            plane_region: plane,
            component: c,
            transform_index: index,
            transform: params,
        };
        filter(&mut comp.blocks, &ctx)?;
    }
    Ok(())
}

/// Apply every transform in `transforms` to `jpeg`, writing transform `i`
/// into `outputs[i]`.
pub(crate) fn transform(
    jpeg: &[u8],
    tables: &mut TableCache,
    transforms: &mut [Transform],
    outputs: &mut [OutputBuffer],
    flags: Flags,
) -> Result<Warnings> {
    if transforms.is_empty() {
        return Err(Error::invalid("no transforms requested"));
    }
    if outputs.len() < transforms.len() {
        return Err(Error::invalid(format!(
            "{} transforms need as many output buffers, {} given",
            transforms.len(),
            outputs.len()
        )));
    }

    let (img, warnings) = decode_coefficients(
        jpeg,
        tables,
        Warnings::new(flags.contains(Flags::STOPONWARNING)),
        flags.contains(Flags::LIMITSCANS),
    )?;
    let plans = transforms
        .iter()
        .enumerate()
        .map(|(i, t)| plan(&img, i, &t.params))
        .collect::<Result<Vec<_>>>()?;

    let mut failed = Vec::new();
    let mut first_failure = None;
    for (i, ((t, plan), out)) in transforms.iter_mut().zip(&plans).zip(outputs.iter_mut()).enumerate() {
        debug!(
            "transform {i}: {:?} of {}x{} -> {}x{} at ({}, {})",
            plan.op, img.width, img.height, plan.crop.w, plan.crop.h, plan.crop.x, plan.crop.y
        );
        let mut dst = transform_image(&img, plan);
        if let Err(err) = run_filter(t, i, &mut dst) {
            failed.push(i);
            first_failure.get_or_insert_with(|| err.to_string());
            continue;
        }

        let options = t.params.options;
        if options.contains(TransformOptions::NOOUTPUT) {
            out.clear();
            continue;
        }
        let bytes = write_jpeg(
            &dst,
            &WriteOptions {
                progressive: options.contains(TransformOptions::PROGRESSIVE)
                    || flags.contains(Flags::PROGRESSIVE),
                optimize_huffman: true,
                restart: Restart::None,
                copy_markers: !options.contains(TransformOptions::COPYNONE),
            },
        )?;
        let markers: usize = dst.markers.iter().map(|m| m.data.len() + 4).sum();
        let worst_case = buf_size(
            plan.crop.w,
            plan.crop.h,
            dst.subsampling().unwrap_or(Subsampling::S444),
        )? + markers;
        out.deliver(&bytes, worst_case, flags.contains(Flags::NOREALLOC))?;
    }

    match first_failure {
        Some(message) => Err(Error::TransformFilter {
            indices: failed,
            message,
        }),
        None => Ok(warnings),
    }
}
