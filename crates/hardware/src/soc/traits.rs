//! Device capability trait and region flags.
//!
//! This module defines the contract between the address space and every
//! memory-mapped device. It provides:
//! 1. **Identification:** `name` for diagnostics.
//! 2. **Access:** `read` / `write` at region-relative offsets, one call per transfer.
//! 3. **Flags:** `RegionFlags`, the per-region hints the translation cache consults.
//!
//! A device owns its own state; the bus owns the device once it is
//! registered. Implementations must service the whole transfer in one call
//! and must not assume the host byte order: use
//! [`read_max64`](crate::common::endian::read_max64) and
//! [`write_max64`](crate::common::endian::write_max64) to marshal register
//! values.

use bitflags::bitflags;

use crate::common::DeviceFault;

/// A memory-mapped device attached to the address space.
pub trait Device: Send {
    /// Short name of the device kind (e.g. `"zero"`, `"ram"`).
    fn name(&self) -> &str;

    /// Fills `data` from the device, starting at region-relative `offset`.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceFault`] only for genuinely exceptional conditions.
    fn read(&mut self, offset: u64, data: &mut [u8]) -> Result<(), DeviceFault>;

    /// Stores `data` into the device, starting at region-relative `offset`.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceFault`] only for genuinely exceptional conditions.
    fn write(&mut self, offset: u64, data: &[u8]) -> Result<(), DeviceFault>;
}

bitflags! {
    /// Hints attached to a device region.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct RegionFlags: u32 {
        /// Translated code may read the region's host buffer directly.
        const DYNTRANS_OK = 1 << 0;
        /// Writes are tracked in the region's dirty range.
        const DYNTRANS_WRITE_OK = 1 << 1;
        /// Reads never change device state.
        const READS_HAVE_NO_SIDE_EFFECTS = 1 << 2;
        /// The region is plain emulated RAM (e.g. video memory).
        const EMULATED_RAM = 1 << 3;
    }
}
