//! Error types for the turbopix library.
//!
//! Every failure carries a [`Severity`]. Instance-bound operations store the
//! message and severity on their [`Handle`](crate::Handle); operations that
//! have no instance (size queries, buffer allocation) write the thread-local
//! global slot read back through [`last_error`].

use std::cell::RefCell;

use thiserror::Error;

use crate::handle::Role;

/// Result type alias for turbopix operations.
pub type Result<T> = std::result::Result<T, Error>;

/// How bad a reported condition is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// The operation completed, but the output may be partially corrupt.
    Warning,
    /// The operation aborted and produced no usable output.
    Fatal,
}

/// Errors that can occur while compressing, decompressing or transforming.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller-supplied argument is out of range or inconsistent.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid image dimensions (zero width or height).
    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Image width.
        width: u32,
        /// Image height.
        height: u32,
    },

    /// Input or output slice is shorter than the geometry requires.
    #[error("Invalid data length: expected at least {expected} bytes, got {actual}")]
    InvalidDataLength {
        /// Minimum number of bytes required.
        expected: usize,
        /// Actual number of bytes provided.
        actual: usize,
    },

    /// Invalid quality parameter (must be 1-100).
    #[error("Invalid quality {0}: must be 1-100")]
    InvalidQuality(u8),

    /// Image dimensions exceed what the compressed format can describe.
    #[error("Image {width}x{height} exceeds maximum dimension {max}")]
    ImageTooLarge {
        /// Image width.
        width: u32,
        /// Image height.
        height: u32,
        /// Maximum supported dimension.
        max: u32,
    },

    /// The instance was created for a different role.
    #[error("Instance has not been initialized for {operation} (role is {actual:?})")]
    WrongRole {
        /// Operation that was attempted.
        operation: &'static str,
        /// Role the instance was created with.
        actual: Role,
    },

    /// Output exceeded a fixed-capacity buffer with reallocation disabled.
    #[error("Output buffer too small: need {needed} bytes, capacity is {capacity}")]
    BufferTooSmall {
        /// Bytes the operation produced.
        needed: usize,
        /// Capacity of the caller buffer.
        capacity: usize,
    },

    /// Memory allocation failed.
    #[error("Memory allocation failure ({0} bytes)")]
    Allocation(usize),

    /// The compressed stream is malformed beyond recovery.
    #[error("Corrupt JPEG data: {0}")]
    Corrupt(String),

    /// The compressed stream uses a feature this engine does not implement.
    #[error("Unsupported JPEG feature: {0}")]
    Unsupported(String),

    /// A transform with the perfect option would leave partial iMCUs behind.
    #[error("Transform {index} is not perfect: {reason}")]
    ImperfectTransform {
        /// Position of the transform in the request list.
        index: usize,
        /// Which edge could not be relocated.
        reason: String,
    },

    /// A warning promoted to a fatal abort by the stop-on-warning flag.
    #[error("{0}")]
    StoppedOnWarning(String),

    /// One or more transform filters reported failure.
    #[error("Custom filter failed for transform(s) {indices:?}: {message}")]
    TransformFilter {
        /// Positions of the transforms whose output was abandoned.
        indices: Vec<usize>,
        /// Message of the first failure.
        message: String,
    },
}

impl Error {
    /// Severity of this error.
    ///
    /// Every returned error aborts its operation; warnings that do not abort
    /// are never surfaced as `Error` values.
    pub fn severity(&self) -> Severity {
        Severity::Fatal
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Error::Corrupt(msg.into())
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }
}

thread_local! {
    static GLOBAL_ERROR: RefCell<String> = RefCell::new(String::from("No error"));
}

/// Message of the most recent failure of an instance-independent operation
/// on the calling thread.
pub fn last_error() -> String {
    GLOBAL_ERROR.with(|slot| slot.borrow().clone())
}

/// Record `err` in the global slot and hand it back for propagation.
pub(crate) fn record_global(err: Error) -> Error {
    GLOBAL_ERROR.with(|slot| *slot.borrow_mut() = err.to_string());
    err
}

/// Run an instance-independent operation, mirroring failures into the global slot.
pub(crate) fn global<T>(result: Result<T>) -> Result<T> {
    result.map_err(record_global)
}
