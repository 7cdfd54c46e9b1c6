//! Physical RAM backing for the address space.
//!
//! Emulated machines declare a physical address limit far larger than the
//! memory a guest actually touches (a 32-bit MIPS image linked at
//! `0x8000_0000` is common). RAM is therefore sparse. This module provides:
//! 1. **Buffer:** Zeroed host blocks (`DramBuffer`), mmap-backed on Unix.
//! 2. **Ram:** A block table that allocates a block on first write and reads
//!    untouched memory as zero.
//! 3. **Checksum:** A content hash over the allocated, non-zero blocks.

/// Zeroed host memory blocks.
pub mod buffer;

use std::collections::BTreeMap;

use xxhash_rust::xxh3::Xxh3;

use self::buffer::DramBuffer;

/// Log2 of the RAM block size (1 MiB blocks).
pub const BLOCK_SHIFT: u32 = 20;

/// Size of one RAM block in bytes.
pub const BLOCK_SIZE: u64 = 1 << BLOCK_SHIFT;

/// Sparse, zero-initialised physical memory.
///
/// Addresses are absolute physical addresses; range checking against the
/// machine's limit is done by the address space before calling in.
#[derive(Debug, Default)]
pub struct Ram {
    blocks: BTreeMap<u64, DramBuffer>,
}

impl Ram {
    /// Creates RAM with no blocks allocated.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of host blocks allocated so far.
    pub fn allocated_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Copies `buf.len()` bytes starting at `addr` into `buf`.
    ///
    /// Untouched memory reads as zero and is not allocated by the read.
    pub fn read(&self, addr: u64, buf: &mut [u8]) {
        let mut done = 0;
        while done < buf.len() {
            let (block, offset, n) = Self::split(addr + done as u64, buf.len() - done);
            let dst = &mut buf[done..done + n];
            match self.blocks.get(&block) {
                Some(mem) => mem.read_into(offset, dst),
                None => dst.fill(0),
            }
            done += n;
        }
    }

    /// Copies `data` into memory starting at `addr`, allocating blocks as needed.
    pub fn write(&mut self, addr: u64, data: &[u8]) {
        let mut done = 0;
        while done < data.len() {
            let (block, offset, n) = Self::split(addr + done as u64, data.len() - done);
            self.blocks
                .entry(block)
                .or_insert_with(|| DramBuffer::new(BLOCK_SIZE as usize))
                .write_slice(offset, &data[done..done + n]);
            done += n;
        }
    }

    /// Deterministic hash of RAM contents.
    ///
    /// Blocks that are unallocated or entirely zero do not contribute, so two
    /// memories with equal contents hash equally whatever their history.
    pub fn checksum(&self) -> u64 {
        let mut hasher = Xxh3::new();
        for (index, mem) in &self.blocks {
            if mem.is_zeroed() {
                continue;
            }
            hasher.update(&index.to_le_bytes());
            mem.for_each_chunk(|chunk| hasher.update(chunk));
        }
        hasher.digest()
    }

    /// Splits an access into (block number, offset in block, bytes in block).
    const fn split(addr: u64, remaining: usize) -> (u64, usize, usize) {
        let block = addr >> BLOCK_SHIFT;
        let offset = (addr & (BLOCK_SIZE - 1)) as usize;
        let room = BLOCK_SIZE as usize - offset;
        let n = if remaining < room { remaining } else { room };
        (block, offset, n)
    }
}
