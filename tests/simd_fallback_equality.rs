//! Wide vs fallback equality tests.
//!
//! The lane-grouped row kernels must produce exactly the output of their
//! scalar fallback counterparts for every pixel format and row length.

#![cfg(feature = "simd")]

use proptest::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};

use turbopix::simd::{self, cpuinfo, fallback, wide, Capabilities};
use turbopix::PixelFormat;

fn random_row(rng: &mut StdRng, len: usize) -> Vec<u8> {
    (0..len).map(|_| rng.gen()).collect()
}

/// Row lengths around the lane width, including empty and odd tails.
const LENGTHS: [usize; 10] = [0, 1, 7, 8, 9, 15, 16, 17, 63, 257];

#[test]
fn test_rgb_to_ycc_wide_vs_fallback() {
    let mut rng = StdRng::seed_from_u64(12345);
    for pf in PixelFormat::ALL {
        for n in LENGTHS {
            let src = random_row(&mut rng, n * pf.pixel_size());
            let (mut y0, mut cb0, mut cr0) = (vec![0u8; n], vec![0u8; n], vec![0u8; n]);
            let (mut y1, mut cb1, mut cr1) = (vec![0u8; n], vec![0u8; n], vec![0u8; n]);
            fallback::rgb_to_ycc_row(&src, pf, &mut y0, &mut cb0, &mut cr0);
            wide::rgb_to_ycc_row(&src, pf, &mut y1, &mut cb1, &mut cr1);
            assert_eq!((y0, cb0, cr0), (y1, cb1, cr1), "{pf:?} x {n}");
        }
    }
}

#[test]
fn test_rgb_to_gray_wide_vs_fallback() {
    let mut rng = StdRng::seed_from_u64(777);
    for pf in PixelFormat::ALL {
        for n in LENGTHS {
            let src = random_row(&mut rng, n * pf.pixel_size());
            let mut expected = vec![0u8; n];
            let mut actual = vec![0u8; n];
            fallback::rgb_to_gray_row(&src, pf, &mut expected);
            wide::rgb_to_gray_row(&src, pf, &mut actual);
            assert_eq!(expected, actual, "{pf:?} x {n}");
        }
    }
}

#[test]
fn test_extreme_chroma_clamps_identically() {
    // Saturated corners of the YCbCr cube exercise the clamping paths.
    let corners = [0u8, 1, 127, 128, 254, 255];
    let mut y = Vec::new();
    let mut cb = Vec::new();
    let mut cr = Vec::new();
    for &a in &corners {
        for &b in &corners {
            for &c in &corners {
                y.push(a);
                cb.push(b);
                cr.push(c);
            }
        }
    }
    for pf in PixelFormat::ALL {
        let mut expected = vec![0u8; y.len() * pf.pixel_size()];
        let mut actual = expected.clone();
        fallback::ycc_to_rgb_row(&y, &cb, &cr, &mut expected, pf);
        wide::ycc_to_rgb_row(&y, &cb, &cr, &mut actual, pf);
        assert_eq!(expected, actual, "{pf:?}");
    }
}

#[test]
fn test_dispatch_matches_fallback() {
    let mut rng = StdRng::seed_from_u64(99);
    let n = 100;
    let src = random_row(&mut rng, n * 4);
    let mut expected = vec![0u8; n];
    let mut actual = vec![0u8; n];
    fallback::rgb_to_gray_row(&src, PixelFormat::Bgrx, &mut expected);
    simd::rgb_to_gray_row(&src, PixelFormat::Bgrx, &mut actual);
    assert_eq!(expected, actual, "{:?} kernels", simd::kernel_family());
}

#[test]
fn test_probe_ignores_prefixed_feature_names() {
    let probe = cpuinfo::Probe {
        key: "ASEs implemented",
        feature: "loongson-mmi",
        capability: Capabilities::MMI,
    };
    let text = "system type\t\t: generic-loongson-machine\n\
                ASEs implemented\t: loongson-mmix loongson-mmi\n";
    assert_eq!(cpuinfo::probe_text(text, probe), Capabilities::MMI);
    let text = "ASEs implemented\t: loongson-mmix\n";
    assert_eq!(cpuinfo::probe_text(text, probe), Capabilities::EMPTY);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_ycc_to_rgb_wide_vs_fallback(
        samples in prop::collection::vec(any::<(u8, u8, u8)>(), 0..80),
        pf in prop::sample::select(PixelFormat::ALL.to_vec()),
    ) {
        let y: Vec<u8> = samples.iter().map(|s| s.0).collect();
        let cb: Vec<u8> = samples.iter().map(|s| s.1).collect();
        let cr: Vec<u8> = samples.iter().map(|s| s.2).collect();
        let mut expected = vec![0u8; samples.len() * pf.pixel_size()];
        let mut actual = expected.clone();
        fallback::ycc_to_rgb_row(&y, &cb, &cr, &mut expected, pf);
        wide::ycc_to_rgb_row(&y, &cb, &cr, &mut actual, pf);
        prop_assert_eq!(expected, actual);
    }

    #[test]
    fn prop_rgb_to_ycc_wide_vs_fallback(
        src in prop::collection::vec(any::<u8>(), 0..400),
        pf in prop::sample::select(PixelFormat::ALL.to_vec()),
    ) {
        let n = src.len() / pf.pixel_size();
        let (mut y0, mut cb0, mut cr0) = (vec![0u8; n], vec![0u8; n], vec![0u8; n]);
        let (mut y1, mut cb1, mut cr1) = (vec![0u8; n], vec![0u8; n], vec![0u8; n]);
        fallback::rgb_to_ycc_row(&src, pf, &mut y0, &mut cb0, &mut cr0);
        wide::rgb_to_ycc_row(&src, pf, &mut y1, &mut cb1, &mut cr1);
        prop_assert_eq!((y0, cb0, cr0), (y1, cb1, cr1));
    }
}
