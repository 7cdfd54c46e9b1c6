//! Shared building blocks.
//!
//! This module holds the pieces every other part of the core leans on:
//! 1. **Endian codec:** Fixed-width field decoding for declared byte orders.
//! 2. **Errors:** The `thiserror` enums for the bus, registry, loader and config.
//! 3. **Literals:** C-style integer parsing for addresses given as text.

/// Byte-order codec and header field reader.
pub mod endian;
/// Error types.
pub mod error;
/// C-style integer literal parsing.
pub mod literal;

pub use endian::{ByteOrder, FieldReader};
pub use error::{BusError, ConfigError, DeviceError, DeviceFault, LoadError};
pub use literal::parse_int_literal;
