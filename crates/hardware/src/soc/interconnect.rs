//! Emulated physical address space (memory bus).
//!
//! This module implements the bus that routes physical accesses to RAM or to
//! a registered device region. It provides:
//! 1. **Region registration:** Devices claim non-overlapping ranges; regions are kept sorted by base.
//! 2. **Access routing:** Last-region hint, then an aggregate bound check, then a scan; RAM otherwise.
//! 3. **Dirty tracking:** Writes into translation-tracked regions widen the region's dirty range.
//! 4. **Checksum:** A whole-RAM content hash for regression comparison.
//!
//! Every address below the physical limit resolves to exactly one backing:
//! the region that contains it, or RAM.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::common::endian::{ByteOrder, read_max64, write_max64};
use crate::common::BusError;
use crate::soc::memory::Ram;
use crate::soc::memory::buffer::DramBuffer;
use crate::soc::traits::{Device, RegionFlags};

/// Handle for a registered region. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(u32);

impl RegionId {
    /// Raw numeric value, for diagnostics.
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Inclusive range of region-relative offsets written since the last reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyRange {
    /// Lowest written offset.
    pub low: u64,
    /// Highest written offset.
    pub high: u64,
}

impl DirtyRange {
    fn cover(range: Option<Self>, low: u64, high: u64) -> Self {
        match range {
            Some(r) => Self {
                low: r.low.min(low),
                high: r.high.max(high),
            },
            None => Self { low, high },
        }
    }
}

/// A device mapped at `[base, base + length)`.
pub struct DeviceRegion {
    id: Option<RegionId>,
    name: String,
    base: u64,
    length: u64,
    flags: RegionFlags,
    device: Box<dyn Device>,
    dyntrans: Option<Arc<DramBuffer>>,
    dirty: Option<DirtyRange>,
}

impl DeviceRegion {
    /// Describes a region; it gets an id when registered with an [`AddressSpace`].
    pub fn new(name: impl Into<String>, base: u64, length: u64, device: Box<dyn Device>) -> Self {
        Self {
            id: None,
            name: name.into(),
            base,
            length,
            flags: RegionFlags::empty(),
            device,
            dyntrans: None,
            dirty: None,
        }
    }

    /// Sets the region flags.
    #[must_use]
    pub const fn with_flags(mut self, flags: RegionFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Publishes `buffer` as the host memory behind this region, for
    /// translated code that accesses it directly.
    #[must_use]
    pub fn with_dyntrans_buffer(mut self, buffer: Arc<DramBuffer>) -> Self {
        self.dyntrans = Some(buffer);
        self
    }

    /// Id assigned at registration.
    pub const fn id(&self) -> Option<RegionId> {
        self.id
    }

    /// Region name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// First address of the region.
    pub const fn base(&self) -> u64 {
        self.base
    }

    /// Length in bytes.
    pub const fn length(&self) -> u64 {
        self.length
    }

    /// Address one past the last byte.
    pub const fn end(&self) -> u64 {
        self.base.saturating_add(self.length)
    }

    /// Region flags.
    pub const fn flags(&self) -> RegionFlags {
        self.flags
    }

    /// Dirty range accumulated since the last reset.
    pub const fn dirty_range(&self) -> Option<DirtyRange> {
        self.dirty
    }

    /// Returns `true` if `addr` lies inside the region.
    pub const fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr < self.end()
    }

    /// The device serving this region.
    pub fn device_mut(&mut self) -> &mut dyn Device {
        self.device.as_mut()
    }
}

impl fmt::Debug for DeviceRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRegion")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("base", &format_args!("{:#x}", self.base))
            .field("length", &format_args!("{:#x}", self.length))
            .field("flags", &self.flags)
            .field("device", &self.device.name())
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

/// Where an access lands.
#[derive(Clone, Copy)]
enum Target {
    Ram,
    Region(usize),
}

/// The physical address space of one emulated machine.
pub struct AddressSpace {
    physical_max: u64,
    ram: Ram,
    regions: Vec<DeviceRegion>,
    last_accessed: Option<usize>,
    dev_min: u64,
    dev_max: u64,
    next_id: u32,
}

impl fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressSpace")
            .field("physical_max", &format_args!("{:#x}", self.physical_max))
            .field("ram_blocks", &self.ram.allocated_blocks())
            .field("regions", &self.regions)
            .finish_non_exhaustive()
    }
}

impl AddressSpace {
    /// Creates an address space covering `[0, physical_max)`, all RAM.
    pub fn new(physical_max: u64) -> Self {
        Self {
            physical_max,
            ram: Ram::new(),
            regions: Vec::new(),
            last_accessed: None,
            dev_min: u64::MAX,
            dev_max: 0,
            next_id: 1,
        }
    }

    /// Upper bound (exclusive) of valid physical addresses.
    pub const fn physical_max(&self) -> u64 {
        self.physical_max
    }

    /// RAM backing, for inspection.
    pub const fn ram(&self) -> &Ram {
        &self.ram
    }

    /// Registered regions, sorted by base address.
    pub fn regions(&self) -> &[DeviceRegion] {
        &self.regions
    }

    /// Looks up a region by id.
    pub fn region(&self, id: RegionId) -> Option<&DeviceRegion> {
        self.regions.iter().find(|r| r.id == Some(id))
    }

    /// Returns the region containing `addr`, if any.
    pub fn region_at(&self, addr: u64) -> Option<&DeviceRegion> {
        self.regions.iter().find(|r| r.contains(addr))
    }

    /// Maps a device region.
    ///
    /// # Errors
    ///
    /// Rejects zero-length regions, ranges whose end overflows or exceeds the
    /// physical limit, and any overlap with an already registered region.
    pub fn register(&mut self, mut region: DeviceRegion) -> Result<RegionId, BusError> {
        if region.length == 0 {
            return Err(BusError::EmptyRegion {
                name: region.name,
                base: region.base,
            });
        }
        let Some(end) = region.base.checked_add(region.length) else {
            return Err(BusError::AddressOverflow {
                name: region.name,
                base: region.base,
                length: region.length,
            });
        };
        if end > self.physical_max {
            return Err(BusError::OutOfRange {
                addr: region.base,
                len: region.length,
                limit: self.physical_max,
            });
        }
        if let Some(existing) = self
            .regions
            .iter()
            .find(|r| region.base < r.end() && r.base < end)
        {
            return Err(BusError::Overlap {
                name: region.name,
                base: region.base,
                end,
                existing: existing.name.clone(),
                existing_base: existing.base,
                existing_end: existing.end(),
            });
        }

        let id = RegionId(self.next_id);
        self.next_id += 1;
        region.id = Some(id);

        debug!(
            "bus: registered '{}' {} at [{:#x}, {:#x}) flags {:?}",
            region.name, id, region.base, end, region.flags
        );

        let pos = self.regions.partition_point(|r| r.base < region.base);
        self.regions.insert(pos, region);
        self.refresh_bounds();
        Ok(id)
    }

    /// Unmaps a region and hands it back.
    ///
    /// Any translation cache entries derived from the region must be
    /// invalidated by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NoSuchRegion`] if `id` is not registered.
    pub fn remove(&mut self, id: RegionId) -> Result<DeviceRegion, BusError> {
        let pos = self
            .regions
            .iter()
            .position(|r| r.id == Some(id))
            .ok_or(BusError::NoSuchRegion(id.0))?;
        let region = self.regions.remove(pos);
        debug!("bus: removed '{}' {}", region.name, id);
        self.refresh_bounds();
        Ok(region)
    }

    /// Reads `buf.len()` bytes starting at `addr`.
    ///
    /// # Errors
    ///
    /// Fails if the access leaves the physical range, straddles a region
    /// boundary, or the device faults.
    pub fn read(&mut self, addr: u64, buf: &mut [u8]) -> Result<(), BusError> {
        if buf.is_empty() {
            return Ok(());
        }
        match self.resolve(addr, buf.len() as u64)? {
            Target::Ram => {
                self.ram.read(addr, buf);
                Ok(())
            }
            Target::Region(i) => {
                let region = &mut self.regions[i];
                let offset = addr - region.base;
                region
                    .device
                    .read(offset, buf)
                    .map_err(|fault| BusError::DeviceFault {
                        region: region.name.clone(),
                        offset,
                        fault,
                    })
            }
        }
    }

    /// Writes `data` starting at `addr`.
    ///
    /// A write into a region flagged [`RegionFlags::DYNTRANS_WRITE_OK`]
    /// widens that region's dirty range to cover the written bytes.
    ///
    /// # Errors
    ///
    /// Fails if the access leaves the physical range, straddles a region
    /// boundary, or the device faults.
    pub fn write(&mut self, addr: u64, data: &[u8]) -> Result<(), BusError> {
        if data.is_empty() {
            return Ok(());
        }
        match self.resolve(addr, data.len() as u64)? {
            Target::Ram => {
                self.ram.write(addr, data);
                Ok(())
            }
            Target::Region(i) => {
                let region = &mut self.regions[i];
                let offset = addr - region.base;
                region
                    .device
                    .write(offset, data)
                    .map_err(|fault| BusError::DeviceFault {
                        region: region.name.clone(),
                        offset,
                        fault,
                    })?;
                if region.flags.contains(RegionFlags::DYNTRANS_WRITE_OK) {
                    let high = offset + data.len() as u64 - 1;
                    region.dirty = Some(DirtyRange::cover(region.dirty, offset, high));
                }
                Ok(())
            }
        }
    }

    /// Reads a `len`-byte (1..=8) value at `addr` stored in `order`.
    ///
    /// # Errors
    ///
    /// As for [`AddressSpace::read`].
    pub fn read_word(&mut self, addr: u64, len: usize, order: ByteOrder) -> Result<u64, BusError> {
        let mut raw = [0u8; 8];
        let len = len.clamp(1, 8);
        self.read(addr, &mut raw[..len])?;
        Ok(read_max64(&raw[..len], order))
    }

    /// Writes the low `len` bytes (1..=8) of `value` at `addr` in `order`.
    ///
    /// # Errors
    ///
    /// As for [`AddressSpace::write`].
    pub fn write_word(
        &mut self,
        addr: u64,
        len: usize,
        value: u64,
        order: ByteOrder,
    ) -> Result<(), BusError> {
        let mut raw = [0u8; 8];
        let len = len.clamp(1, 8);
        write_max64(&mut raw[..len], order, value);
        self.write(addr, &raw[..len])
    }

    /// Reads a NUL-terminated string at `addr`, stopping after `max` bytes.
    ///
    /// Bytes are fetched one at a time, so the string may cross region
    /// boundaries. Invalid UTF-8 is replaced.
    ///
    /// # Errors
    ///
    /// As for [`AddressSpace::read`]; the first failing byte ends the read.
    pub fn read_string(&mut self, addr: u64, max: usize) -> Result<String, BusError> {
        let mut bytes = Vec::new();
        let mut cursor = addr;
        while bytes.len() < max {
            let mut byte = [0u8; 1];
            self.read(cursor, &mut byte)?;
            if byte[0] == 0 {
                break;
            }
            bytes.push(byte[0]);
            cursor = cursor.wrapping_add(1);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Peeks at a region's dirty range.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NoSuchRegion`] if `id` is not registered.
    pub fn dirty_range(&self, id: RegionId) -> Result<Option<DirtyRange>, BusError> {
        self.region(id)
            .map(DeviceRegion::dirty_range)
            .ok_or(BusError::NoSuchRegion(id.0))
    }

    /// Returns a region's dirty range and resets it, for a translation cache
    /// that has just invalidated the covered code.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NoSuchRegion`] if `id` is not registered.
    pub fn take_dirty_range(&mut self, id: RegionId) -> Result<Option<DirtyRange>, BusError> {
        self.regions
            .iter_mut()
            .find(|r| r.id == Some(id))
            .map(|r| r.dirty.take())
            .ok_or(BusError::NoSuchRegion(id.0))
    }

    /// Attaches a host buffer to a registered region, or detaches it with
    /// `None`.
    ///
    /// Translated code only sees the buffer through
    /// [`AddressSpace::dyntrans_buffer`] while the region also carries
    /// [`RegionFlags::DYNTRANS_OK`].
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NoSuchRegion`] if `id` is not registered.
    pub fn set_dyntrans_buffer(
        &mut self,
        id: RegionId,
        buffer: Option<Arc<DramBuffer>>,
    ) -> Result<(), BusError> {
        let region = self
            .regions
            .iter_mut()
            .find(|r| r.id == Some(id))
            .ok_or(BusError::NoSuchRegion(id.0))?;
        debug!(
            "bus: '{}' {id} direct-access buffer {}",
            region.name,
            if buffer.is_some() { "attached" } else { "detached" }
        );
        region.dyntrans = buffer;
        Ok(())
    }

    /// Host buffer and offset backing `addr`, when its region allows direct
    /// access by translated code.
    ///
    /// The buffer aliases the device's storage. Slices borrowed from it must
    /// not be held across a call that can write the region, and the bus is
    /// driven from one thread at a time.
    pub fn dyntrans_buffer(&self, addr: u64) -> Option<(Arc<DramBuffer>, u64)> {
        let region = self.region_at(addr)?;
        if !region.flags.contains(RegionFlags::DYNTRANS_OK) {
            return None;
        }
        let buffer = region.dyntrans.as_ref()?;
        Some((Arc::clone(buffer), addr - region.base))
    }

    /// Deterministic hash of RAM contents.
    pub fn checksum(&self) -> u64 {
        self.ram.checksum()
    }

    fn resolve(&mut self, addr: u64, len: u64) -> Result<Target, BusError> {
        let end = match addr.checked_add(len) {
            Some(end) if end <= self.physical_max => end,
            _ => {
                return Err(BusError::OutOfRange {
                    addr,
                    len,
                    limit: self.physical_max,
                });
            }
        };

        let hint = self
            .last_accessed
            .filter(|&i| self.regions.get(i).is_some_and(|r| r.contains(addr)));
        if let Some(i) = hint {
            return Self::within(&self.regions[i], addr, len, end).map(|()| Target::Region(i));
        }

        if end <= self.dev_min || addr >= self.dev_max {
            return Ok(Target::Ram);
        }

        for (i, region) in self.regions.iter().enumerate() {
            if region.contains(addr) {
                self.last_accessed = Some(i);
                return Self::within(region, addr, len, end).map(|()| Target::Region(i));
            }
            if region.base > addr && region.base < end {
                return Err(BusError::Straddle {
                    addr,
                    len,
                    region: region.name.clone(),
                });
            }
        }
        Ok(Target::Ram)
    }

    fn within(region: &DeviceRegion, addr: u64, len: u64, end: u64) -> Result<(), BusError> {
        if end > region.end() {
            return Err(BusError::Straddle {
                addr,
                len,
                region: region.name.clone(),
            });
        }
        Ok(())
    }

    fn refresh_bounds(&mut self) {
        self.last_accessed = None;
        self.dev_min = self.regions.first().map_or(u64::MAX, |r| r.base);
        self.dev_max = self.regions.iter().map(DeviceRegion::end).max().unwrap_or(0);
    }
}
