//! System-on-Chip (SoC) Components.
//!
//! This module organizes the components that make up the emulated machine:
//! the physical address space, RAM, devices, and the builder that assembles
//! them from configuration.

/// Machine builder.
pub mod builder;

/// Built-in devices and the device registry.
pub mod devices;

/// Physical address space and region routing.
pub mod interconnect;

/// Sparse RAM backing.
pub mod memory;

/// Device trait and region flags.
pub mod traits;

pub use builder::Machine;
pub use interconnect::{AddressSpace, DeviceRegion, DirtyRange, RegionId};
