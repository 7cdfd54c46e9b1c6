//! Zeroed host memory blocks.
//!
//! This module provides the raw storage behind emulated RAM. On Unix the
//! storage is an anonymous `mmap`, so the host only commits pages that are
//! actually touched; elsewhere a zeroed `Vec` is used. Buffers are shared via
//! `Arc` between a RAM device and the bus, which publishes them to the
//! translation cache as direct-access buffers.

/// Bytes copied out per step when scanning a whole buffer.
const SCAN_CHUNK: usize = 4096;

/// A fixed-size, zero-initialised host buffer.
///
/// Allocation failure is fatal: the constructor panics, matching the
/// immediate termination the emulator applies to host out-of-memory.
///
/// The buffer is written through `&self`, so it never lends out slices of
/// its storage. It is not synchronised: whoever shares it must keep every
/// access on one thread at a time.
pub struct DramBuffer {
    ptr: *mut u8,
    size: usize,
    is_mmap: bool,
}

// SAFETY: the buffer owns its allocation and exposes it only through bounds
// checked copies in and out. Accesses are not synchronised: callers sharing a
// buffer through `Arc` drive it from one thread at a time.
unsafe impl Send for DramBuffer {}
// SAFETY: see above.
unsafe impl Sync for DramBuffer {}

impl std::fmt::Debug for DramBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DramBuffer")
            .field("size", &self.size)
            .field("is_mmap", &self.is_mmap)
            .finish()
    }
}

impl DramBuffer {
    /// Allocates a zeroed buffer of `size` bytes.
    ///
    /// # Panics
    ///
    /// Panics if the host cannot provide the memory.
    pub fn new(size: usize) -> Self {
        #[cfg(unix)]
        {
            use std::ptr;
            // SAFETY: anonymous private mapping with no fixed address; the
            // result is checked against MAP_FAILED before use.
            let ptr = unsafe {
                libc::mmap(
                    ptr::null_mut(),
                    size.max(1),
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                )
            };

            assert!(
                ptr != libc::MAP_FAILED,
                "out of memory: cannot map {size} bytes of emulated RAM"
            );

            Self {
                ptr: ptr as *mut u8,
                size,
                is_mmap: true,
            }
        }

        #[cfg(not(unix))]
        {
            let mut vec = vec![0u8; size];
            let ptr = vec.as_mut_ptr();
            std::mem::forget(vec);
            Self {
                ptr,
                size,
                is_mmap: false,
            }
        }
    }

    /// Returns the size of the buffer in bytes.
    pub const fn len(&self) -> usize {
        self.size
    }

    /// Returns `true` for a zero-sized buffer.
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Returns a mutable raw pointer to the first byte.
    pub const fn as_mut_ptr(&self) -> *mut u8 {
        self.ptr
    }

    /// Copies `dst.len()` bytes starting at `offset` into `dst`.
    ///
    /// Contents only ever leave the buffer by copy. A borrowed slice would
    /// alias storage that [`DramBuffer::write_slice`] mutates through `&self`.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds.
    pub fn read_into(&self, offset: usize, dst: &mut [u8]) {
        assert!(
            offset
                .checked_add(dst.len())
                .is_some_and(|end| end <= self.size),
            "host buffer read out of bounds"
        );
        // SAFETY: the source range was checked above and `dst` is a unique
        // borrow, so it cannot overlap the mapping.
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr.add(offset), dst.as_mut_ptr(), dst.len());
        }
    }

    /// Copies `len` bytes starting at `offset` into a new vector.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds.
    pub fn to_vec(&self, offset: usize, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        self.read_into(offset, &mut out);
        out
    }

    /// Copies `data` into the buffer at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds.
    pub fn write_slice(&self, offset: usize, data: &[u8]) {
        assert!(
            offset
                .checked_add(data.len())
                .is_some_and(|end| end <= self.size),
            "host buffer write out of bounds"
        );
        // SAFETY: the destination range was checked above and `data` cannot
        // alias the mapping, which is never lent out.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.add(offset), data.len());
        }
    }

    /// Returns `true` if every byte is zero.
    pub fn is_zeroed(&self) -> bool {
        let mut chunk = [0u8; SCAN_CHUNK];
        (0..self.size).step_by(SCAN_CHUNK).all(|start| {
            let n = SCAN_CHUNK.min(self.size - start);
            self.read_into(start, &mut chunk[..n]);
            chunk[..n].iter().all(|&b| b == 0)
        })
    }

    /// Feeds the whole buffer to `sink`, a piece at a time.
    pub fn for_each_chunk(&self, mut sink: impl FnMut(&[u8])) {
        let mut chunk = [0u8; SCAN_CHUNK];
        for start in (0..self.size).step_by(SCAN_CHUNK) {
            let n = SCAN_CHUNK.min(self.size - start);
            self.read_into(start, &mut chunk[..n]);
            sink(&chunk[..n]);
        }
    }
}

impl Drop for DramBuffer {
    fn drop(&mut self) {
        if self.is_mmap {
            #[cfg(unix)]
            // SAFETY: `ptr` came from `mmap` with this length (rounded up to
            // at least one byte) and is unmapped exactly once.
            unsafe {
                let _ = libc::munmap(self.ptr as *mut _, self.size.max(1));
            }
        } else {
            #[cfg(not(unix))]
            // SAFETY: reconstructs the Vec forgotten in `new` with the same
            // pointer, length and capacity.
            unsafe {
                let _ = Vec::from_raw_parts(self.ptr, self.size, self.size);
            }
        }
    }
}
