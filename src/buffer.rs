//! Output buffer ownership.
//!
//! An [`OutputBuffer`] is either empty ("null"), in which case the engine
//! allocates it at the operation's worst-case size, or holds an allocation
//! whose capacity bounds the output. With [`Flags::NOREALLOC`] that
//! capacity is a hard limit; otherwise an output that does not fit replaces
//! the allocation, and [`OutputBuffer::view`] reports the new address.
//!
//! [`Flags::NOREALLOC`]: crate::Flags::NOREALLOC

use log::debug;

use crate::error::{global, Error, Result};

/// Address and capacity of a buffer's allocation, for callers that track
/// raw memory. Re-read after every call that writes the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferView {
    /// Start of the allocation (null when nothing is allocated).
    pub ptr: *const u8,
    /// Bytes available without reallocation.
    pub capacity: usize,
}

/// Growable destination for compressed or transformed output.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    data: Vec<u8>,
}

impl OutputBuffer {
    /// Empty buffer; the engine allocates on first use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt an existing vector. Its capacity is the buffer capacity and
    /// its contents are discarded on the next write.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Bytes written by the last operation.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Number of bytes written by the last operation.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes available without reallocation.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// True if no memory is allocated.
    pub fn is_null(&self) -> bool {
        self.data.capacity() == 0
    }

    /// Current address and capacity.
    pub fn view(&self) -> BufferView {
        BufferView {
            ptr: if self.is_null() {
                std::ptr::null()
            } else {
                self.data.as_ptr()
            },
            capacity: self.capacity(),
        }
    }

    /// Take the written bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Drop the contents, keeping the allocation.
    pub(crate) fn clear(&mut self) {
        self.data.clear();
    }

    /// Store an operation's output.
    ///
    /// `worst_case` is the size the engine allocates for a null buffer.
    pub(crate) fn deliver(&mut self, bytes: &[u8], worst_case: usize, no_realloc: bool) -> Result<()> {
        if no_realloc {
            if self.is_null() {
                return Err(Error::invalid(
                    "destination buffer is empty and reallocation is disabled",
                ));
            }
            if bytes.len() > self.capacity() {
                return Err(Error::BufferTooSmall {
                    needed: bytes.len(),
                    capacity: self.capacity(),
                });
            }
        } else if self.is_null() {
            self.data = allocate(worst_case.max(bytes.len()))?;
        } else if bytes.len() > self.capacity() {
            debug!(
                "output of {} bytes exceeds buffer capacity {}, reallocating",
                bytes.len(),
                self.capacity()
            );
            self.data = allocate(bytes.len())?;
        }
        self.data.clear();
        self.data.extend_from_slice(bytes);
        Ok(())
    }
}

fn allocate(size: usize) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    data.try_reserve_exact(size)
        .map_err(|_| Error::Allocation(size))?;
    Ok(data)
}

/// Allocate a buffer with `size` bytes of capacity.
pub fn alloc(size: usize) -> Result<OutputBuffer> {
    global(allocate(size).map(OutputBuffer::from_vec))
}

/// Release a buffer allocated by [`alloc`] or by the engine.
pub fn free(buffer: OutputBuffer) {
    drop(buffer);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_buffer_gets_worst_case_allocation() {
        let mut buf = OutputBuffer::new();
        assert!(buf.is_null());
        assert!(buf.view().ptr.is_null());
        buf.deliver(&[1, 2, 3], 100, false).unwrap();
        assert_eq!(buf.as_slice(), &[1, 2, 3]);
        assert!(buf.capacity() >= 100);
    }

    #[test]
    fn test_fitting_output_keeps_address() {
        let mut buf = alloc(64).unwrap();
        let before = buf.view();
        buf.deliver(&[7; 64], 1000, false).unwrap();
        assert_eq!(buf.view(), before);

        buf.deliver(&[8; 10], 1000, true).unwrap();
        assert_eq!(buf.view(), before);
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn test_growth_reports_new_capacity() {
        let mut buf = alloc(4).unwrap();
        buf.deliver(&[5; 40], 10, false).unwrap();
        assert!(buf.view().capacity >= 40);
        assert_eq!(buf.len(), 40);
    }

    #[test]
    fn test_no_realloc_overflow_is_fatal_and_untouched() {
        let mut buf = OutputBuffer::from_vec(vec![9; 4]);
        let err = buf.deliver(&[1; 8], 8, true).unwrap_err();
        assert!(matches!(
            err,
            Error::BufferTooSmall {
                needed: 8,
                capacity: 4
            }
        ));
        assert_eq!(buf.as_slice(), &[9; 4]);

        let mut null = OutputBuffer::new();
        assert!(null.deliver(&[1], 8, true).is_err());
    }

    #[test]
    fn test_alloc_failure_reports_globally() {
        assert!(matches!(alloc(usize::MAX), Err(Error::Allocation(_))));
        assert!(crate::error::last_error().contains("allocation"));
    }
}
