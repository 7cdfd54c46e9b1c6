//! Emulated machine memory bus and executable image loader.
//!
//! This crate implements the parts of a multi-architecture machine emulator
//! that sit between the CPU and the host:
//! 1. **Address space:** Sparse RAM plus non-overlapping memory-mapped device regions.
//! 2. **Devices:** The `Device` trait, built-in devices, and a registry that builds them from text.
//! 3. **Loader:** ELF32/64, ECOFF, a.out, S-record, raw and symbol-text images.
//! 4. **Symbols:** The table loaders fill, with address and name lookup.
//! 5. **Configuration:** JSON machine descriptions.

/// Shared types (byte-order codec, errors, integer literals).
pub mod common;
/// Machine configuration (defaults and JSON structures).
pub mod config;
/// Image loader and symbol table.
pub mod sim;
/// Address space, RAM, devices and the machine builder.
pub mod soc;

/// Root configuration type; use `Config::default()` or parse JSON.
pub use crate::config::Config;
/// Result of loading one image.
pub use crate::sim::loader::LoadResult;
/// Top-level machine (bus and symbols); construct with `Machine::new`.
pub use crate::soc::Machine;
