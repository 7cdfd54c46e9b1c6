//! Error types for the address space, device registry and image loader.
//!
//! This module defines every failure the core can report. It provides:
//! 1. **Bus errors:** Region registration conflicts and access faults (`BusError`).
//! 2. **Device errors:** Registry lookups and device description parsing (`DeviceError`).
//! 3. **Load errors:** Configuration, format and unsupported-variant failures (`LoadError`).
//! 4. **Config errors:** Machine description read and parse failures (`ConfigError`).
//!
//! Nothing in the library terminates the process. Soft conditions (missing
//! S-record entry point, stray lines, repeated string tables) are logged with
//! `tracing::warn!` and never surface here.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by the address space.
#[derive(Debug, Error)]
pub enum BusError {
    /// `base + length` does not fit in 64 bits.
    #[error("region '{name}' at {base:#x} with length {length:#x} overflows the address space")]
    AddressOverflow {
        /// Region name.
        name: String,
        /// Requested base address.
        base: u64,
        /// Requested length.
        length: u64,
    },

    /// A region of length zero was requested.
    #[error("region '{name}' at {base:#x} has zero length")]
    EmptyRegion {
        /// Region name.
        name: String,
        /// Requested base address.
        base: u64,
    },

    /// An access or region lies at or beyond the physical address limit.
    #[error("address {addr:#x} (length {len:#x}) is beyond the physical limit {limit:#x}")]
    OutOfRange {
        /// First address of the access.
        addr: u64,
        /// Length of the access.
        len: u64,
        /// The address space's upper bound.
        limit: u64,
    },

    /// A new region intersects one that is already registered.
    #[error(
        "region '{name}' [{base:#x}, {end:#x}) overlaps '{existing}' [{existing_base:#x}, {existing_end:#x})"
    )]
    Overlap {
        /// Name of the region being registered.
        name: String,
        /// Its base address.
        base: u64,
        /// Its end address (exclusive).
        end: u64,
        /// Name of the region already present.
        existing: String,
        /// Base of the existing region.
        existing_base: u64,
        /// End of the existing region (exclusive).
        existing_end: u64,
    },

    /// A transfer crosses the boundary of a device region.
    #[error("transfer of {len:#x} bytes at {addr:#x} crosses the boundary of region '{region}'")]
    Straddle {
        /// First address of the transfer.
        addr: u64,
        /// Length of the transfer.
        len: u64,
        /// Name of the region whose boundary is crossed.
        region: String,
    },

    /// The region id is not (or no longer) registered.
    #[error("no region with id {0}")]
    NoSuchRegion(u32),

    /// The device serving the region reported a fault.
    #[error("device '{region}' faulted at offset {offset:#x}: {fault}")]
    DeviceFault {
        /// Name of the faulting region.
        region: String,
        /// Region-relative offset of the access.
        offset: u64,
        /// The fault the device reported.
        fault: DeviceFault,
    },
}

/// A device's refusal to service an access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DeviceFault(pub String);

/// Failures from the device registry.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// No device kind with this name is registered.
    #[error("unknown device '{0}'")]
    Unknown(String),

    /// A device kind with this name is already registered.
    #[error("device '{0}' is already registered")]
    Duplicate(String),

    /// A textual device description could not be parsed.
    #[error("bad device description '{spec}': {reason}")]
    BadSpec {
        /// The description as given.
        spec: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The bus refused the device's region.
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Failures while loading an executable image.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The name could neither be opened nor parsed as `address:path`.
    #[error("cannot load '{name}': {reason}")]
    Config {
        /// Name as supplied by the caller.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The image is structurally invalid.
    #[error("{}: {reason}", .path.display())]
    Format {
        /// Image path.
        path: PathBuf,
        /// Description of the violation.
        reason: String,
    },

    /// The image is well formed but describes something the loader refuses.
    #[error("{}: unsupported: {reason}", .path.display())]
    Unsupported {
        /// Image path.
        path: PathBuf,
        /// Description of the unsupported variant.
        reason: String,
    },

    /// Reading an opened image failed.
    #[error("{}: read error: {source}", .path.display())]
    Io {
        /// Image path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The address space rejected a segment transfer.
    #[error(transparent)]
    Bus(#[from] BusError),
}

impl LoadError {
    /// Builds a [`LoadError::Format`] for `path`.
    pub fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Builds a [`LoadError::Unsupported`] for `path`.
    pub fn unsupported(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Unsupported {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Maps an I/O error on `path`; unexpected EOF becomes a format violation.
    pub fn io(path: impl Into<PathBuf>, source: io::Error, what: &str) -> Self {
        if source.kind() == io::ErrorKind::UnexpectedEof {
            Self::format(path, format!("truncated {what}"))
        } else {
            Self::Io {
                path: path.into(),
                source,
            }
        }
    }
}

/// Failures while reading a machine description.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config '{}': {source}", .path.display())]
    Io {
        /// Config path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The JSON did not describe a valid machine.
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}
