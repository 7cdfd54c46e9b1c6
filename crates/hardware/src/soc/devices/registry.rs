//! Device registry.
//!
//! Machines are described with textual device lines such as
//! `zero addr=0x1f000000 len=0x1000 name=hole`. The registry maps each device
//! kind to the function that builds its region, and attaches the result to an
//! address space.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::common::{DeviceError, parse_int_literal};
use crate::soc::devices::{RamDevice, ZeroDevice};
use crate::soc::interconnect::{AddressSpace, DeviceRegion, RegionId};
use crate::soc::traits::RegionFlags;

/// Parameters for instantiating one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInit {
    /// Registered device kind.
    pub kind: String,
    /// Region name; defaults to the kind.
    pub name: String,
    /// Base physical address.
    pub addr: u64,
    /// Region length in bytes.
    pub len: u64,
}

/// Builds the region for a device kind.
pub type DeviceInitFn = fn(&DeviceInit) -> Result<DeviceRegion, DeviceError>;

/// Known device kinds, keyed by name.
#[derive(Debug, Default, Clone)]
pub struct DeviceRegistry {
    kinds: BTreeMap<String, DeviceInitFn>,
}

impl DeviceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in `zero` and `ram` kinds.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.kinds.extend([
            ("zero".to_owned(), init_zero as DeviceInitFn),
            ("ram".to_owned(), init_ram as DeviceInitFn),
        ]);
        registry
    }

    /// Adds a device kind.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Duplicate`] if `name` is already registered.
    pub fn register(&mut self, name: &str, init: DeviceInitFn) -> Result<(), DeviceError> {
        if self.kinds.contains_key(name) {
            return Err(DeviceError::Duplicate(name.to_owned()));
        }
        let _ = self.kinds.insert(name.to_owned(), init);
        Ok(())
    }

    /// Removes a device kind.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Unknown`] if `name` is not registered.
    pub fn unregister(&mut self, name: &str) -> Result<(), DeviceError> {
        self.kinds
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| DeviceError::Unknown(name.to_owned()))
    }

    /// Returns the init function for `name`.
    pub fn lookup(&self, name: &str) -> Option<DeviceInitFn> {
        self.kinds.get(name).copied()
    }

    /// Registered kind names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.kinds.keys().map(String::as_str).collect()
    }

    /// Instantiates `init` and maps it into `bus`.
    ///
    /// # Errors
    ///
    /// Fails if the kind is unknown, the init function rejects the
    /// parameters, or the bus refuses the region.
    pub fn add(&self, bus: &mut AddressSpace, init: &DeviceInit) -> Result<RegionId, DeviceError> {
        let build = self
            .lookup(&init.kind)
            .ok_or_else(|| DeviceError::Unknown(init.kind.clone()))?;
        let region = build(init)?;
        let id = bus.register(region)?;
        debug!(
            "device: added {} '{}' at {:#x} len {:#x}",
            init.kind, init.name, init.addr, init.len
        );
        Ok(id)
    }

    /// Parses a device line: `<kind> addr=<n> len=<n> [name=<s>]`.
    ///
    /// Numbers are C-style literals. The kind must be registered.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::BadSpec`] for malformed lines and
    /// [`DeviceError::Unknown`] for unregistered kinds.
    pub fn parse_spec(&self, spec: &str) -> Result<DeviceInit, DeviceError> {
        let bad = |reason: &str| DeviceError::BadSpec {
            spec: spec.to_owned(),
            reason: reason.to_owned(),
        };

        let mut words = spec.split_whitespace();
        let kind = words.next().ok_or_else(|| bad("empty description"))?;
        if self.lookup(kind).is_none() {
            return Err(DeviceError::Unknown(kind.to_owned()));
        }

        let (mut addr, mut len, mut name) = (None, None, None);
        for word in words {
            let (key, value) = word
                .split_once('=')
                .ok_or_else(|| bad(&format!("expected key=value, got '{word}'")))?;
            match key {
                "addr" => {
                    addr = Some(
                        parse_int_literal(value).ok_or_else(|| bad("addr is not a number"))?,
                    );
                }
                "len" => {
                    len = Some(parse_int_literal(value).ok_or_else(|| bad("len is not a number"))?);
                }
                "name" if !value.is_empty() => name = Some(value.to_owned()),
                _ => return Err(bad(&format!("unknown parameter '{key}'"))),
            }
        }

        Ok(DeviceInit {
            kind: kind.to_owned(),
            name: name.unwrap_or_else(|| kind.to_owned()),
            addr: addr.ok_or_else(|| bad("missing addr"))?,
            len: len.ok_or_else(|| bad("missing len"))?,
        })
    }
}

#[allow(clippy::unnecessary_wraps)]
fn init_zero(init: &DeviceInit) -> Result<DeviceRegion, DeviceError> {
    Ok(
        DeviceRegion::new(init.name.as_str(), init.addr, init.len, Box::new(ZeroDevice::new()))
            .with_flags(RegionFlags::READS_HAVE_NO_SIDE_EFFECTS),
    )
}

fn init_ram(init: &DeviceInit) -> Result<DeviceRegion, DeviceError> {
    let len = usize::try_from(init.len).map_err(|_| DeviceError::BadSpec {
        spec: init.name.clone(),
        reason: format!("length {:#x} does not fit in host memory", init.len),
    })?;
    let device = RamDevice::with_len(len);
    let buffer = Arc::clone(device.buffer());
    Ok(
        DeviceRegion::new(init.name.as_str(), init.addr, init.len, Box::new(device))
            .with_flags(RegionFlags::all())
            .with_dyntrans_buffer(buffer),
    )
}
