//! Machine construction and the top-level `Machine` type.
//!
//! This module assembles an emulated machine from configuration. It performs:
//! 1. **Bus setup:** Creates the address space with the configured physical limit.
//! 2. **Device registration:** Instantiates each configured device through the registry.
//! 3. **Image loading:** Loads executables into the bus and records their symbols.

use tracing::{debug, info};

use crate::common::{DeviceError, LoadError};
use crate::config::Config;
use crate::sim::loader::{self, LoadResult};
use crate::sim::symbols::SymbolTable;
use crate::soc::devices::DeviceRegistry;
use crate::soc::interconnect::AddressSpace;

/// An emulated machine: its address space, its symbols and its loader state.
#[derive(Debug)]
pub struct Machine {
    /// Physical address space; routes accesses to RAM and devices.
    pub bus: AddressSpace,
    /// Symbols collected from every loaded image.
    pub symbols: SymbolTable,
    /// Name of the most recently loaded image.
    last_loaded: Option<String>,
    /// Chunk cap handed to binary decoders.
    max_chunk: usize,
}

impl Machine {
    /// Builds a machine from configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Machine description (memory limit, loader settings, devices).
    /// * `registry` - Device kinds available to the configuration.
    ///
    /// # Errors
    ///
    /// Fails if a configured device kind is unknown or its region is refused
    /// by the bus.
    pub fn new(config: &Config, registry: &DeviceRegistry) -> Result<Self, DeviceError> {
        let mut bus = AddressSpace::new(config.memory.physical_max);
        for device in &config.devices {
            let init = device.to_init();
            let id = registry.add(&mut bus, &init)?;
            debug!("machine: device '{}' is region {id}", init.name);
        }
        info!(
            "machine: physical limit {:#x}, {} device region(s)",
            config.memory.physical_max,
            bus.regions().len()
        );

        Ok(Self {
            bus,
            symbols: SymbolTable::new(),
            last_loaded: None,
            max_chunk: config.loader.max_chunk,
        })
    }

    /// Loads an executable image (or `address:path` raw binary).
    ///
    /// The name is recorded as the last loaded image before decoding starts,
    /// so it is kept even when loading fails.
    ///
    /// # Errors
    ///
    /// See [`loader::load_image`].
    pub fn load_image(&mut self, name: &str) -> Result<LoadResult, LoadError> {
        self.last_loaded = Some(name.to_owned());
        loader::load_image(&mut self.bus, &mut self.symbols, name, self.max_chunk)
    }

    /// Name of the most recently loaded image.
    pub fn last_loaded(&self) -> Option<&str> {
        self.last_loaded.as_deref()
    }
}
