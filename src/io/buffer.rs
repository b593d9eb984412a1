// Page-aligned read buffer for Direct I/O

use crate::{ScanError, ScanResult};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

/// Alignment requirements for Direct I/O
pub const PAGE_SIZE: usize = 4096;

/// Aligned buffer for O_DIRECT reads
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
    size: usize,
}

impl AlignedBuffer {
    /// Allocate `size` bytes (rounded up to `alignment`) aligned to `alignment`
    pub fn new(size: usize, alignment: usize) -> ScanResult<Self> {
        // Ensure alignment is power of 2
        if !alignment.is_power_of_two() {
            return Err(ScanError::InvalidConfig(format!(
                "buffer alignment {} is not a power of 2",
                alignment
            )));
        }
        if size == 0 {
            return Err(ScanError::InvalidConfig(
                "buffer size must be greater than zero".to_string(),
            ));
        }

        let aligned_size = (size + alignment - 1) & !(alignment - 1);
        let layout = Layout::from_size_align(aligned_size, alignment)
            .map_err(|e| ScanError::InvalidConfig(e.to_string()))?;

        // SAFETY: layout has a non-zero size
        let raw_ptr = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw_ptr).ok_or_else(|| {
            ScanError::Io(std::io::Error::new(
                std::io::ErrorKind::OutOfMemory,
                format!("failed to allocate {} bytes", aligned_size),
            ))
        })?;

        Ok(Self {
            ptr,
            layout,
            size: aligned_size,
        })
    }

    /// Page-aligned buffer
    pub fn page_aligned(size: usize) -> ScanResult<Self> {
        Self::new(size, PAGE_SIZE)
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: ptr is valid for `size` initialized bytes and uniquely borrowed
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size) }
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is valid for `size` initialized bytes
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn alignment(&self) -> usize {
        self.layout.align()
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with this exact layout
        unsafe {
            dealloc(self.ptr.as_ptr(), self.layout);
        }
    }
}

// The buffer owns its allocation exclusively
unsafe impl Send for AlignedBuffer {}
