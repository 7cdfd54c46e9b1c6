//! Memory-mapped devices.
//!
//! This module contains the built-in devices and the registry that builds
//! them from textual descriptions:
//! 1. **Zero:** A hole that reads as zero and swallows writes.
//! 2. **RAM:** Dedicated memory mapped as a region, directly accessible to translated code.
//! 3. **Registry:** Kind name to init function, plus device line parsing.

/// RAM-backed device region.
pub mod ram;

/// Device kind registry and device line parser.
pub mod registry;

/// Zero-filled hole device.
pub mod zero;

pub use ram::RamDevice;
pub use registry::{DeviceInit, DeviceInitFn, DeviceRegistry};
pub use zero::ZeroDevice;

pub use crate::soc::traits::Device;
