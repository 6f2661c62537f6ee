//! Bit-flag sets for operation flags and transform options.

macro_rules! bitset {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$fmeta:meta])* $flag:ident = $value:expr, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(u32);

        impl $name {
            /// No bits set.
            pub const EMPTY: Self = $name(0);
            $( $(#[$fmeta])* pub const $flag: Self = $name($value); )*

            const ALL_BITS: u32 = 0 $( | $value )*;

            /// Raw bit value.
            pub const fn bits(self) -> u32 {
                self.0
            }

            /// Build from raw bits, dropping any undefined bit.
            pub const fn from_bits_truncate(bits: u32) -> Self {
                $name(bits & Self::ALL_BITS)
            }

            /// True if every bit of `other` is set in `self`.
            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            /// True if no bit is set.
            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }

            /// Set the bits of `other`.
            pub fn insert(&mut self, other: Self) {
                self.0 |= other.0;
            }

            /// Clear the bits of `other`.
            pub fn remove(&mut self, other: Self) {
                self.0 &= !other.0;
            }
        }

        impl ::std::ops::BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                $name(self.0 | rhs.0)
            }
        }

        impl ::std::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                let mut set = f.debug_set();
                $( if self.contains(Self::$flag) { set.entry(&stringify!($flag)); } )*
                set.finish()
            }
        }
    };
}

pub(crate) use bitset;

bitset! {
    /// Flags accepted by compress, decompress and YUV operations.
    Flags {
        /// Rows of the packed-pixel image are stored bottom row first.
        BOTTOMUP = 2,
        /// Replicate chroma samples instead of triangle-filtering them.
        FASTUPSAMPLE = 256,
        /// Never grow the output buffer; overflow is fatal.
        NOREALLOC = 1024,
        /// Prefer the fast (less accurate) DCT kernels.
        FASTDCT = 2048,
        /// Prefer the accurate DCT kernels (the default).
        ACCURATEDCT = 4096,
        /// Abort on the first warning instead of finishing the operation.
        STOPONWARNING = 8192,
        /// Emit progressive instead of baseline output.
        PROGRESSIVE = 16384,
        /// Reject streams with more than 500 scans.
        LIMITSCANS = 32768,
    }
}

bitset! {
    /// Options of a single lossless transform.
    TransformOptions {
        /// Fail the whole call if partial edge iMCUs cannot be relocated.
        PERFECT = 1,
        /// Silently drop partial edge iMCUs that cannot be relocated.
        TRIM = 2,
        /// Apply the transform's crop region.
        CROP = 4,
        /// Drop the chroma components.
        GRAY = 8,
        /// Run the filter but produce no output stream.
        NOOUTPUT = 16,
        /// Emit progressive output.
        PROGRESSIVE = 32,
        /// Do not copy APPn/COM markers from the source.
        COPYNONE = 64,
    }
}

/// Maximum number of scans accepted when [`Flags::LIMITSCANS`] is set.
pub const MAX_SCANS: usize = 500;
