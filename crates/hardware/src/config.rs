//! Machine configuration.
//!
//! This module defines the machine description the emulator is built from.
//! It provides:
//! 1. **Defaults:** Baseline limits (physical address space, loader chunk cap).
//! 2. **Structures:** Memory, loader and device sections.
//! 3. **Loading:** JSON parsing from a string or a file.
//!
//! Every field is optional in JSON; missing fields take the defaults below,
//! so `{}` describes a machine with 4 GiB of sparse RAM and no devices.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::common::ConfigError;
use crate::soc::devices::DeviceInit;

/// Default configuration constants.
mod defaults {
    /// Upper bound of the physical address space (4 GiB).
    ///
    /// RAM backs every address below this limit that no device claims;
    /// accesses at or above it fail.
    pub const PHYSICAL_MAX: u64 = 1 << 32;

    /// Largest chunk a binary decoder copies in one bus write (4 KiB).
    pub const MAX_CHUNK: usize = 4096;
}

/// Root machine description.
///
/// # Examples
///
/// ```
/// use retrovm_core::config::Config;
///
/// let json = r#"{
///     "memory": { "physical_max": 536870912 },
///     "devices": [
///         { "kind": "zero", "base": 520093696, "length": 4096 }
///     ]
/// }"#;
///
/// let config = Config::from_json_str(json).unwrap();
/// assert_eq!(config.memory.physical_max, 0x2000_0000);
/// assert_eq!(config.loader.max_chunk, 4096);
/// assert_eq!(config.devices[0].to_init().name, "zero");
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Physical memory layout
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Image loader settings
    #[serde(default)]
    pub loader: LoaderConfig,
    /// Devices mapped at startup, in order
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

impl Config {
    /// Parses a JSON machine description.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON or mistyped fields.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON machine description from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Parse`] if its contents are invalid.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }
}

/// Physical memory layout.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// Exclusive upper bound of physical addresses
    #[serde(default = "MemoryConfig::default_physical_max")]
    pub physical_max: u64,
}

impl MemoryConfig {
    fn default_physical_max() -> u64 {
        defaults::PHYSICAL_MAX
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            physical_max: defaults::PHYSICAL_MAX,
        }
    }
}

/// Image loader settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LoaderConfig {
    /// Cap on the per-write chunk size used by binary decoders
    #[serde(default = "LoaderConfig::default_max_chunk")]
    pub max_chunk: usize,
}

impl LoaderConfig {
    fn default_max_chunk() -> usize {
        defaults::MAX_CHUNK
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_chunk: defaults::MAX_CHUNK,
        }
    }
}

/// One device to map at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceConfig {
    /// Registered device kind (`"zero"`, `"ram"`, ...)
    pub kind: String,
    /// Region name; the kind is used when absent
    #[serde(default)]
    pub name: Option<String>,
    /// Base physical address
    pub base: u64,
    /// Region length in bytes
    pub length: u64,
}

impl DeviceConfig {
    /// Converts the entry into registry init parameters.
    pub fn to_init(&self) -> DeviceInit {
        DeviceInit {
            kind: self.kind.clone(),
            name: self.name.clone().unwrap_or_else(|| self.kind.clone()),
            addr: self.base,
            len: self.length,
        }
    }
}
