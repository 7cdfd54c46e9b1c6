//! Emulated RAM region.
//!
//! Plain memory mapped as a device region, typically video or other
//! dedicated memory outside main RAM. The backing buffer is shared with the
//! bus, which publishes it to translated code as a direct-access buffer.

use std::sync::Arc;

use crate::common::DeviceFault;
use crate::soc::memory::buffer::DramBuffer;
use crate::soc::traits::Device;

/// A RAM-backed device.
#[derive(Debug)]
pub struct RamDevice {
    buffer: Arc<DramBuffer>,
}

impl RamDevice {
    /// Creates a device over `buffer`.
    ///
    /// # Arguments
    ///
    /// * `buffer` - Shared zeroed storage; its length bounds every access.
    pub const fn new(buffer: Arc<DramBuffer>) -> Self {
        Self { buffer }
    }

    /// Allocates a fresh zeroed buffer of `len` bytes.
    pub fn with_len(len: usize) -> Self {
        Self::new(Arc::new(DramBuffer::new(len)))
    }

    /// The shared backing buffer.
    pub const fn buffer(&self) -> &Arc<DramBuffer> {
        &self.buffer
    }

    fn span(&self, offset: u64, len: usize) -> Result<usize, DeviceFault> {
        let start = usize::try_from(offset)
            .map_err(|_| DeviceFault(format!("offset {offset:#x} out of range")))?;
        match start.checked_add(len) {
            Some(end) if end <= self.buffer.len() => Ok(start),
            _ => Err(DeviceFault(format!(
                "access of {len} bytes at {offset:#x} exceeds {:#x}",
                self.buffer.len()
            ))),
        }
    }
}

impl Device for RamDevice {
    fn name(&self) -> &str {
        "ram"
    }

    fn read(&mut self, offset: u64, data: &mut [u8]) -> Result<(), DeviceFault> {
        let start = self.span(offset, data.len())?;
        self.buffer.read_into(start, data);
        Ok(())
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> Result<(), DeviceFault> {
        let start = self.span(offset, data.len())?;
        self.buffer.write_slice(start, data);
        Ok(())
    }
}
