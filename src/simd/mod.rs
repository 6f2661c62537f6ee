//! CPU capability detection and kernel-family dispatch.
//!
//! The capability mask is probed once per process and cached. It only picks
//! which implementation of the per-row color kernels runs; every family
//! produces identical output, so under-reporting costs speed, never
//! correctness.

use std::sync::LazyLock;

use crate::flags::bitset;
use crate::format::PixelFormat;

pub mod cpuinfo;
pub mod fallback;
pub mod wide;

bitset! {
    /// SIMD extensions reported by the capability probe.
    Capabilities {
        /// x86 SSE2.
        SSE2 = 1,
        /// x86 AVX2.
        AVX2 = 2,
        /// Arm NEON.
        NEON = 4,
        /// Loongson multimedia instructions.
        MMI = 8,
        /// PowerPC AltiVec.
        ALTIVEC = 16,
    }
}

/// Environment variable that forces the scalar kernels.
pub const FORCE_SCALAR_ENV: &str = "TURBOPIX_FORCE_SCALAR";

/// Which implementation of the row kernels is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelFamily {
    /// One pixel at a time.
    Scalar,
    /// Fixed-width lanes laid out for auto-vectorization.
    Wide,
}

/// Probe the execution environment for SIMD capability.
fn detect() -> Capabilities {
    #[cfg(target_arch = "x86_64")]
    {
        let mut caps = Capabilities::SSE2;
        if is_x86_feature_detected!("avx2") {
            caps |= Capabilities::AVX2;
        }
        caps
    }

    #[cfg(target_arch = "aarch64")]
    {
        // NEON is always available on aarch64
        Capabilities::NEON
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        match cpuinfo::native_probe() {
            Some(probe) if cfg!(target_os = "linux") => {
                cpuinfo::probe_file(cpuinfo::CPUINFO_PATH, probe)
            }
            _ => Capabilities::EMPTY,
        }
    }
}

static CAPABILITIES: LazyLock<Capabilities> = LazyLock::new(|| {
    let caps = detect();
    log::debug!("detected SIMD capabilities: {caps:?}");
    caps
});

static KERNEL_FAMILY: LazyLock<KernelFamily> = LazyLock::new(|| {
    let forced = std::env::var(FORCE_SCALAR_ENV).is_ok_and(|v| v == "1");
    let family = select_family(*CAPABILITIES, forced);
    log::debug!("using {family:?} kernels");
    family
});

/// Capability mask of this process, computed on first use.
pub fn capabilities() -> Capabilities {
    *CAPABILITIES
}

/// Kernel family selected for this process.
pub fn kernel_family() -> KernelFamily {
    *KERNEL_FAMILY
}

fn select_family(caps: Capabilities, forced_scalar: bool) -> KernelFamily {
    if forced_scalar || !cfg!(feature = "simd") || caps.is_empty() {
        KernelFamily::Scalar
    } else {
        KernelFamily::Wide
    }
}

/// Convert a row of packed pixels to Y, Cb and Cr samples.
#[inline]
pub fn rgb_to_ycc_row(src: &[u8], pf: PixelFormat, y: &mut [u8], cb: &mut [u8], cr: &mut [u8]) {
    match kernel_family() {
        KernelFamily::Wide => wide::rgb_to_ycc_row(src, pf, y, cb, cr),
        KernelFamily::Scalar => fallback::rgb_to_ycc_row(src, pf, y, cb, cr),
    }
}

/// Convert a row of packed pixels to luminance samples.
#[inline]
pub fn rgb_to_gray_row(src: &[u8], pf: PixelFormat, y: &mut [u8]) {
    match kernel_family() {
        KernelFamily::Wide => wide::rgb_to_gray_row(src, pf, y),
        KernelFamily::Scalar => fallback::rgb_to_gray_row(src, pf, y),
    }
}

/// Convert a row of Y, Cb and Cr samples to packed pixels.
#[inline]
pub fn ycc_to_rgb_row(y: &[u8], cb: &[u8], cr: &[u8], dst: &mut [u8], pf: PixelFormat) {
    match kernel_family() {
        KernelFamily::Wide => wide::ycc_to_rgb_row(y, cb, cr, dst, pf),
        KernelFamily::Scalar => fallback::ycc_to_rgb_row(y, cb, cr, dst, pf),
    }
}
