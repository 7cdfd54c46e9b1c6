//! Zero device.
//!
//! A memory-mapped hole: every read returns zeros and every write is
//! discarded. Machines map it over address ranges the guest touches but the
//! emulator does not model, so those accesses neither fault nor reach RAM.

use crate::common::DeviceFault;
use crate::soc::traits::Device;

/// Reads as zero, ignores writes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZeroDevice;

impl ZeroDevice {
    /// Creates a zero device.
    pub const fn new() -> Self {
        Self
    }
}

impl Device for ZeroDevice {
    fn name(&self) -> &str {
        "zero"
    }

    fn read(&mut self, _offset: u64, data: &mut [u8]) -> Result<(), DeviceFault> {
        data.fill(0);
        Ok(())
    }

    fn write(&mut self, _offset: u64, _data: &[u8]) -> Result<(), DeviceFault> {
        Ok(())
    }
}
