//! Lossless transform conformance tests.
//!
//! Sources are built from flat 8x8 tiles, so a block that moves decodes to
//! exactly the same samples at its new position.

use std::cell::RefCell;
use std::rc::Rc;

use image::GenericImageView;
use turbopix::{
    Colorspace, Error, Flags, Handle, HeaderInfo, ImageInfo, OutputBuffer, PixelFormat, Region, Role,
    Severity, Subsampling, Transform, TransformOp, TransformOptions,
};

mod support;
use support::synthetic::{smooth_noise, tiles};
use support::{compress, decompress};

fn info(jpeg: &[u8]) -> ImageInfo {
    match Handle::new(Role::Decompressor).decompress_header(jpeg).unwrap() {
        HeaderInfo::Image(info) => info,
        HeaderInfo::TablesOnly => panic!("expected an image header"),
    }
}

fn run(jpeg: &[u8], transforms: &mut [Transform], flags: Flags) -> (Handle, Vec<OutputBuffer>, turbopix::Result<()>) {
    let mut handle = Handle::new(Role::Transformer);
    let mut outputs: Vec<OutputBuffer> = (0..transforms.len()).map(|_| OutputBuffer::new()).collect();
    let result = handle.transform(jpeg, transforms, &mut outputs, flags);
    (handle, outputs, result)
}

fn transform_one(jpeg: &[u8], transform: Transform) -> Vec<u8> {
    let (_, outputs, result) = run(jpeg, &mut [transform], Flags::EMPTY);
    result.unwrap();
    outputs.into_iter().next().unwrap().into_vec()
}

fn pixel(img: &[u8], width: u32, x: u32, y: u32) -> &[u8] {
    let at = ((y * width + x) * 3) as usize;
    &img[at..at + 3]
}

#[test]
fn test_identity_keeps_image() {
    let (w, h) = (35, 21);
    for s in Subsampling::ALL {
        let jpeg = compress(&smooth_noise(w, h, 4), w, h, PixelFormat::Rgb, s, 90, Flags::EMPTY);
        let out = transform_one(&jpeg, Transform::new(TransformOp::None));
        let (before, after) = (info(&jpeg), info(&out));
        assert_eq!((after.width, after.height), (w, h), "{s:?}");
        assert_eq!(after.subsampling, before.subsampling, "{s:?}");
        assert_eq!(after.colorspace, before.colorspace, "{s:?}");
        assert_eq!(
            decompress(&jpeg, w, h, PixelFormat::Rgb, Flags::EMPTY),
            decompress(&out, w, h, PixelFormat::Rgb, Flags::EMPTY),
            "{s:?}"
        );
    }
}

#[test]
fn test_hflip_mirrors_columns() {
    let (w, h) = (32, 16);
    let jpeg = compress(&tiles(w, h), w, h, PixelFormat::Rgb, Subsampling::S444, 90, Flags::EMPTY);
    let out = transform_one(&jpeg, Transform::new(TransformOp::HFlip));
    let src = decompress(&jpeg, w, h, PixelFormat::Rgb, Flags::EMPTY);
    let dst = decompress(&out, w, h, PixelFormat::Rgb, Flags::EMPTY);
    for y in 0..h {
        for x in 0..w {
            assert_eq!(pixel(&dst, w, x, y), pixel(&src, w, w - 1 - x, y), "({x}, {y})");
        }
    }
}

#[test]
fn test_rot90_swaps_dimensions() {
    let (w, h) = (48, 32);
    let jpeg = compress(&tiles(w, h), w, h, PixelFormat::Rgb, Subsampling::S444, 90, Flags::EMPTY);
    let out = transform_one(&jpeg, Transform::new(TransformOp::Rot90));
    let rotated = info(&out);
    assert_eq!((rotated.width, rotated.height), (h, w));

    let src = decompress(&jpeg, w, h, PixelFormat::Rgb, Flags::EMPTY);
    let dst = decompress(&out, h, w, PixelFormat::Rgb, Flags::EMPTY);
    for y in 0..w {
        for x in 0..h {
            assert_eq!(pixel(&dst, h, x, y), pixel(&src, w, y, h - 1 - x), "({x}, {y})");
        }
    }

    // Transposing swaps the sampling factors.
    let jpeg = compress(&tiles(32, 16), 32, 16, PixelFormat::Rgb, Subsampling::S422, 90, Flags::EMPTY);
    let out = transform_one(&jpeg, Transform::new(TransformOp::Rot90));
    let rotated = info(&out);
    assert_eq!((rotated.width, rotated.height), (16, 32));
    assert_eq!(rotated.subsampling, Some(Subsampling::S440));
}

#[test]
fn test_every_op_decodes() {
    let (w, h) = (37, 29);
    let jpeg = compress(&smooth_noise(w, h, 9), w, h, PixelFormat::Rgb, Subsampling::S420, 85, Flags::EMPTY);
    for op in TransformOp::ALL {
        let out = transform_one(&jpeg, Transform::new(op));
        let (ew, eh) = if op.transposes() { (h, w) } else { (w, h) };
        let img = image::load_from_memory(&out).unwrap_or_else(|e| panic!("{op:?}: {e}"));
        assert_eq!(img.dimensions(), (ew, eh), "{op:?}");
    }
}

#[test]
fn test_perfect_failure_produces_no_output() {
    let (w, h) = (20, 16);
    let jpeg = compress(&tiles(w, h), w, h, PixelFormat::Rgb, Subsampling::S444, 90, Flags::EMPTY);
    let mut transforms = [
        Transform::new(TransformOp::None),
        Transform::new(TransformOp::HFlip).with_options(TransformOptions::PERFECT),
    ];
    let (handle, outputs, result) = run(&jpeg, &mut transforms, Flags::EMPTY);
    assert!(matches!(result, Err(Error::ImperfectTransform { index: 1, .. })));
    assert_eq!(handle.error_severity(), Severity::Fatal);
    assert!(outputs.iter().all(OutputBuffer::is_null));

    // VFlip only touches rows, and 16 is a whole number of iMCUs.
    let ok = transform_one(
        &jpeg,
        Transform::new(TransformOp::VFlip).with_options(TransformOptions::PERFECT),
    );
    assert_eq!(info(&ok).width, w);
}

#[test]
fn test_trim_drops_partial_imcus() {
    let (w, h) = (20, 16);
    let jpeg = compress(&tiles(w, h), w, h, PixelFormat::Rgb, Subsampling::S444, 90, Flags::EMPTY);
    let trimmed = transform_one(
        &jpeg,
        Transform::new(TransformOp::HFlip).with_options(TransformOptions::TRIM),
    );
    let trimmed = info(&trimmed);
    assert_eq!((trimmed.width, trimmed.height), (16, 16));

    let untrimmed = info(&transform_one(&jpeg, Transform::new(TransformOp::HFlip)));
    assert_eq!((untrimmed.width, untrimmed.height), (20, 16));
}

#[test]
fn test_crop_selects_region() {
    let (w, h) = (64, 48);
    let jpeg = compress(&smooth_noise(w, h, 12), w, h, PixelFormat::Rgb, Subsampling::S444, 90, Flags::EMPTY);
    let out = transform_one(
        &jpeg,
        Transform::new(TransformOp::None)
            .with_options(TransformOptions::CROP)
            .with_region(Region::new(16, 8, 24, 16)),
    );
    let cropped = info(&out);
    assert_eq!((cropped.width, cropped.height), (24, 16));

    let src = decompress(&jpeg, w, h, PixelFormat::Rgb, Flags::EMPTY);
    let dst = decompress(&out, 24, 16, PixelFormat::Rgb, Flags::EMPTY);
    for y in 0..16 {
        for x in 0..24 {
            assert_eq!(pixel(&dst, 24, x, y), pixel(&src, w, x + 16, y + 8));
        }
    }

    // A zero extent runs to the edge of the image.
    let rest = transform_one(
        &jpeg,
        Transform::new(TransformOp::None)
            .with_options(TransformOptions::CROP)
            .with_region(Region::new(32, 16, 0, 0)),
    );
    let rest = info(&rest);
    assert_eq!((rest.width, rest.height), (32, 32));
}

#[test]
fn test_crop_must_start_on_imcu() {
    let (w, h) = (64, 48);
    let jpeg = compress(&tiles(w, h), w, h, PixelFormat::Rgb, Subsampling::S420, 90, Flags::EMPTY);
    let mut transforms = [Transform::new(TransformOp::None)
        .with_options(TransformOptions::CROP)
        .with_region(Region::new(8, 0, 16, 16))];
    let (_, _, result) = run(&jpeg, &mut transforms, Flags::EMPTY);
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
}

#[test]
fn test_gray_option_drops_chroma() {
    let (w, h) = (24, 24);
    let jpeg = compress(&smooth_noise(w, h, 5), w, h, PixelFormat::Rgb, Subsampling::S420, 90, Flags::EMPTY);
    let out = transform_one(&jpeg, Transform::new(TransformOp::None).with_options(TransformOptions::GRAY));
    let gray = info(&out);
    assert_eq!(gray.colorspace, Colorspace::Gray);
    assert_eq!(gray.subsampling, Some(Subsampling::Gray));
    assert_eq!(image::load_from_memory(&out).unwrap().color(), image::ColorType::L8);
}

#[test]
fn test_progressive_output() {
    let (w, h) = (32, 32);
    let jpeg = compress(&smooth_noise(w, h, 6), w, h, PixelFormat::Rgb, Subsampling::S420, 90, Flags::EMPTY);
    let by_option = transform_one(
        &jpeg,
        Transform::new(TransformOp::Rot180).with_options(TransformOptions::PROGRESSIVE),
    );
    assert!(info(&by_option).progressive);

    let (_, outputs, result) = run(&jpeg, &mut [Transform::new(TransformOp::Rot180)], Flags::PROGRESSIVE);
    result.unwrap();
    assert!(info(outputs[0].as_slice()).progressive);
    assert_eq!(
        decompress(&by_option, w, h, PixelFormat::Rgb, Flags::EMPTY),
        decompress(outputs[0].as_slice(), w, h, PixelFormat::Rgb, Flags::EMPTY)
    );
    assert!(!info(&transform_one(&jpeg, Transform::new(TransformOp::Rot180))).progressive);
}

fn with_comment(jpeg: &[u8], text: &[u8]) -> Vec<u8> {
    let len = (text.len() + 2) as u16;
    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&[0xFF, 0xFE]);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(text);
    out.extend_from_slice(&jpeg[2..]);
    out
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[test]
fn test_markers_copied_unless_copynone() {
    let (w, h) = (16, 16);
    let jpeg = compress(&tiles(w, h), w, h, PixelFormat::Rgb, Subsampling::S444, 90, Flags::EMPTY);
    let jpeg = with_comment(&jpeg, b"kept by transforms");

    let copied = transform_one(&jpeg, Transform::new(TransformOp::HFlip));
    assert!(contains(&copied, b"kept by transforms"));

    let stripped = transform_one(
        &jpeg,
        Transform::new(TransformOp::HFlip).with_options(TransformOptions::COPYNONE),
    );
    assert!(!contains(&stripped, b"kept by transforms"));
    assert!(contains(&stripped, b"JFIF\0"));
}

#[test]
fn test_filter_sees_every_component() {
    let (w, h) = (32, 16);
    let jpeg = compress(&smooth_noise(w, h, 8), w, h, PixelFormat::Rgb, Subsampling::S420, 90, Flags::EMPTY);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    let transform = Transform::new(TransformOp::Rot90)
        .with_options(TransformOptions::NOOUTPUT)
        .with_filter(move |blocks, ctx| {
            let plane = ctx.plane_region;
            assert_eq!(blocks.len() as u32, plane.w / 8 * (plane.h / 8));
            assert_eq!(ctx.transform.op, TransformOp::Rot90);
            log.borrow_mut().push((ctx.component, plane.w, plane.h));
            Ok(())
        });
    let (handle, outputs, result) = run(&jpeg, &mut [transform], Flags::EMPTY);
    result.unwrap();
    assert_eq!(handle.error_message(), "No error");
    assert!(outputs[0].is_empty());
    // Rotated 16x32 at 4:2:0: luma is 16x32, chroma 8x16.
    assert_eq!(*seen.borrow(), vec![(0, 16, 32), (1, 8, 16), (2, 8, 16)]);
}

#[test]
fn test_filter_changes_reach_output() {
    let (w, h) = (16, 16);
    let jpeg = compress(&tiles(w, h), w, h, PixelFormat::Rgb, Subsampling::Gray, 90, Flags::EMPTY);
    let out = transform_one(
        &jpeg,
        Transform::new(TransformOp::None).with_filter(|blocks, _| {
            for block in blocks.iter_mut() {
                block.fill(0);
            }
            Ok(())
        }),
    );
    let pixels = decompress(&out, w, h, PixelFormat::Gray, Flags::EMPTY);
    assert!(pixels.iter().all(|&p| p.abs_diff(128) <= 1));
}

#[test]
fn test_filter_failures_are_aggregated() {
    let (w, h) = (16, 16);
    let jpeg = compress(&tiles(w, h), w, h, PixelFormat::Rgb, Subsampling::S444, 90, Flags::EMPTY);
    let failing = |op| {
        Transform::new(op).with_filter(|_, ctx| Err(format!("rejected component {}", ctx.component).into()))
    };
    let mut transforms = [
        failing(TransformOp::HFlip),
        Transform::new(TransformOp::VFlip),
        failing(TransformOp::Rot180),
    ];
    let (handle, outputs, result) = run(&jpeg, &mut transforms, Flags::EMPTY);
    match result {
        Err(Error::TransformFilter { indices, message }) => {
            assert_eq!(indices, vec![0, 2]);
            assert!(message.contains("rejected component 0"));
        }
        other => panic!("expected a filter failure, got {other:?}"),
    }
    assert_eq!(handle.error_severity(), Severity::Fatal);
    assert!(outputs[0].is_null());
    assert!(!outputs[1].is_empty());
    assert!(outputs[2].is_null());
}

#[test]
fn test_argument_checks() {
    let (w, h) = (16, 16);
    let jpeg = compress(&tiles(w, h), w, h, PixelFormat::Rgb, Subsampling::S411, 90, Flags::EMPTY);
    let mut handle = Handle::new(Role::Transformer);

    let err = handle.transform(&jpeg, &mut [], &mut [], Flags::EMPTY).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    let mut two = [Transform::new(TransformOp::None), Transform::new(TransformOp::HFlip)];
    let err = handle
        .transform(&jpeg, &mut two, &mut [OutputBuffer::new()], Flags::EMPTY)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    let mut outputs = [OutputBuffer::new()];
    let err = handle
        .transform(&jpeg, &mut [Transform::new(TransformOp::Transpose)], &mut outputs, Flags::EMPTY)
        .unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));

    // Dropping chroma lifts the 4:1:1 restriction.
    handle
        .transform(
            &jpeg,
            &mut [Transform::new(TransformOp::Transpose).with_options(TransformOptions::GRAY)],
            &mut outputs,
            Flags::EMPTY,
        )
        .unwrap();
    assert_eq!(info(outputs[0].as_slice()).colorspace, Colorspace::Gray);
}
