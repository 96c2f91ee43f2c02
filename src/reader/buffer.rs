//! Destination buffers whose address honours an [`Alignment`].

use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use super::sample::Alignment;
use crate::error::{Error, Result};

/// A zeroed heap buffer starting on an alignment boundary.
///
/// The global allocator only guarantees small alignments for `Vec<u8>`, so
/// buffers handed to an aligned scheduler are allocated here with an
/// explicit layout and freed with the same one.
pub struct AlignedBuf {
    data: NonNull<u8>,
    len: usize,
    layout: Layout,
}

// The buffer owns its allocation exclusively, like a `Box<[u8]>`.
unsafe impl Send for AlignedBuf {}
unsafe impl Sync for AlignedBuf {}

impl AlignedBuf {
    /// Allocates `len` zeroed bytes aligned to `alignment`.
    pub fn new(len: usize, alignment: Alignment) -> Result<Self> {
        // Zero-sized layouts cannot be allocated; keep one byte behind an
        // empty buffer so its address is still aligned.
        let layout = Layout::from_size_align(len.max(1), alignment.get())
            .map_err(|e| Error::InvalidArgument(format!("buffer of {len} bytes: {e}")))?;
        let data = NonNull::new(unsafe { alloc_zeroed(layout) }).ok_or(Error::OutOfMemory(len))?;

        Ok(Self { data, len, layout })
    }

    /// Copies `bytes` into a new buffer with no alignment requirement.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let mut buf = Self::new(bytes.len(), Alignment::BYTE)?;
        buf.copy_from_slice(bytes);
        Ok(buf)
    }

    pub fn alignment(&self) -> usize {
        self.layout.align()
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        unsafe { dealloc(self.data.as_ptr(), self.layout) }
    }
}

impl Deref for AlignedBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.data.as_ptr(), self.len) }
    }
}

impl DerefMut for AlignedBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.data.as_ptr(), self.len) }
    }
}

impl fmt::Debug for AlignedBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlignedBuf")
            .field("len", &self.len)
            .field("alignment", &self.layout.align())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_aligned_allocation() {
        let align = Alignment::new(4096).unwrap();
        for len in [4096, 8192, 12288] {
            let buf = AlignedBuf::new(len, align).unwrap();
            assert_eq!(buf.len(), len);
            assert_eq!(buf.as_ptr() as usize % 4096, 0);
            assert!(buf.iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn empty_buffer_is_still_aligned() {
        let buf = AlignedBuf::new(0, Alignment::new(512).unwrap()).unwrap();
        assert!(buf.is_empty());
        assert_eq!(buf.as_ptr() as usize % 512, 0);
    }

    #[test]
    fn writes_go_through_deref() {
        let mut buf = AlignedBuf::new(16, Alignment::new(64).unwrap()).unwrap();
        buf[3] = 42;
        buf[15] = 99;
        assert_eq!((buf[3], buf[15]), (42, 99));

        let copy = AlignedBuf::from_slice(b"abc").unwrap();
        assert_eq!(&copy[..], b"abc");
        assert_eq!(copy.alignment(), 1);
    }
}
