//! Capability probe for Linux targets whose SIMD extensions are not fixed at
//! build time. Reads the textual CPU description exposed by the kernel.

use super::Capabilities;

/// Location of the kernel's CPU description.
pub const CPUINFO_PATH: &str = "/proc/cpuinfo";

const INITIAL_LINE_BUFFER: usize = 1024;
const MAX_LINE_BUFFER: usize = 1024 * 1024;

/// One key/feature pair to look for, and the capability it grants.
#[derive(Debug, Clone, Copy)]
pub struct Probe {
    /// Prefix a line must start with.
    pub key: &'static str,
    /// Whole-word token to find after the prefix.
    pub feature: &'static str,
    /// Capability reported when the token is present.
    pub capability: Capabilities,
}

/// Probe for the running architecture, if it needs one.
pub fn native_probe() -> Option<Probe> {
    if cfg!(target_arch = "mips64") {
        Some(Probe {
            key: "ASEs implemented",
            feature: "loongson-mmi",
            capability: Capabilities::MMI,
        })
    } else if cfg!(target_arch = "arm") {
        Some(Probe {
            key: "Features",
            feature: "neon",
            capability: Capabilities::NEON,
        })
    } else if cfg!(any(target_arch = "powerpc", target_arch = "powerpc64")) {
        Some(Probe {
            key: "cpu",
            feature: "altivec",
            capability: Capabilities::ALTIVEC,
        })
    } else {
        None
    }
}

/// Read the CPU description and evaluate `probe` against it.
///
/// An unreadable file yields no capability.
pub fn probe_file(path: &str, probe: Probe) -> Capabilities {
    match std::fs::read(path) {
        Ok(bytes) => probe_text(&String::from_utf8_lossy(&bytes), probe),
        Err(err) => {
            log::debug!("cannot read {path}: {err}; assuming no SIMD capability");
            Capabilities::EMPTY
        }
    }
}

/// Evaluate `probe` against CPU description text, growing the line buffer
/// until every line fits or the ceiling is reached.
pub fn probe_text(text: &str, probe: Probe) -> Capabilities {
    let mut bufsize = INITIAL_LINE_BUFFER;
    while bufsize <= MAX_LINE_BUFFER {
        match scan_lines(text, bufsize, probe.key, probe.feature) {
            Some(true) => return probe.capability,
            Some(false) => return Capabilities::EMPTY,
            None => bufsize *= 2,
        }
    }
    log::debug!("cpu description has a line longer than {MAX_LINE_BUFFER} bytes");
    Capabilities::EMPTY
}

/// Scan every line as a reader with a `bufsize`-byte line buffer would.
///
/// Returns `None` if some line does not fit (the caller retries with a bigger
/// buffer), otherwise whether the feature was found.
fn scan_lines(text: &str, bufsize: usize, key: &str, feature: &str) -> Option<bool> {
    let mut found = false;
    for line in text.split_inclusive('\n') {
        let content = line.strip_suffix('\n').unwrap_or(line);
        // A buffer of n bytes holds n - 1 characters plus the terminator.
        if content.len() >= bufsize - 1 {
            return None;
        }
        if check_feature(content, key, feature) {
            found = true;
        }
    }
    Some(found)
}

/// True if `line` starts with `key` and contains `feature` as a whole word
/// after it.
fn check_feature(line: &str, key: &str, feature: &str) -> bool {
    let Some(rest) = line.strip_prefix(key) else {
        return false;
    };
    let rest = rest.trim_start();
    let bytes = rest.as_bytes();
    let mut from = 0;
    while let Some(idx) = rest[from..].find(feature) {
        let start = from + idx;
        let end = start + feature.len();
        let before_ok = start == 0 || bytes[start - 1].is_ascii_whitespace();
        let after_ok = end == bytes.len() || bytes[end].is_ascii_whitespace();
        if before_ok && after_ok {
            return true;
        }
        from = start + 1;
    }
    false
}
