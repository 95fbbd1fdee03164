//! Read-only memory mapping of physical capture buffers.
//!
//! The dump controllers write frames and pages into physical memory;
//! sessions map those ranges out of the kernel memory device to read
//! them. A [`MappedRegion`] unmaps itself when dropped, so a capture
//! that ends — normally or on error — always releases its mappings.

use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::ptr;
use std::slice;

use crate::error::StreamError;

/// A read-only shared mapping of a physical memory range.
pub struct MappedRegion {
    ptr: *mut libc::c_void,
    len: usize,
}

// Safety: the mapping is read-only and private to its owner; the
// pointer is valid for `len` bytes until drop.
unsafe impl Send for MappedRegion {}
unsafe impl Sync for MappedRegion {}

impl MappedRegion {
    /// Map `len` bytes of `device` starting at physical `address`.
    ///
    /// `what` names the region in the error ("video dump registers A",
    /// "dump buffer", ...).
    pub fn map(
        device: &File,
        what: &'static str,
        address: u64,
        len: usize,
    ) -> Result<Self, StreamError> {
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ,
                libc::MAP_SHARED,
                device.as_raw_fd(),
                address as libc::off_t,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(StreamError::Map {
                what,
                address,
                size: len,
                source: std::io::Error::last_os_error(),
            });
        }
        Ok(Self { ptr, len })
    }

    /// Mapped length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Base of the mapping.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr as *const u8
    }

    /// The whole mapping as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        // Safety: the pointer is valid for `len` readable bytes until
        // drop; the mapping is never written through this type.
        unsafe { slice::from_raw_parts(self.ptr as *const u8, self.len) }
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // Safety: ptr/len are exactly what mmap returned.
        unsafe {
            libc::munmap(self.ptr, self.len);
        }
    }
}

impl std::fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedRegion")
            .field("len", &self.len)
            .finish()
    }
}

/// Round `size` up to a multiple of the system page size.
///
/// Video frames are laid out page-aligned in the dump ring, so slot
/// strides come from this, not from the raw `w × h × 3`.
pub fn page_aligned_size(size: usize) -> usize {
    let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
    match size % page {
        0 => size,
        rem => size + page - rem,
    }
}

// ── Tests ────────────────────────────────────────────────────────
