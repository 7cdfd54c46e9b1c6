//! Raw binary loader.
//!
//! Used when an image name does not open as a file: the name is read as
//! `address:path` and the file's bytes are copied verbatim to `address`,
//! which also becomes the entry point.

use tracing::debug;

use super::{Format, ImageFile, LoadResult, LoadTarget};
use crate::common::{LoadError, parse_int_literal};

/// Raw images are copied in buffers of this size.
const BUFFER_SIZE: usize = 4096;

/// Splits `address:path` at the first colon.
///
/// # Errors
///
/// Returns [`LoadError::Config`] if there is no colon or the address is not
/// a valid integer literal.
pub fn parse_name(name: &str) -> Result<(u64, &str), LoadError> {
    let config_error = |reason: &str| LoadError::Config {
        name: name.to_owned(),
        reason: reason.to_owned(),
    };
    let (addr, path) = name
        .split_once(':')
        .ok_or_else(|| config_error("no such file, and not of the form address:path"))?;
    let addr = parse_int_literal(addr)
        .ok_or_else(|| config_error(&format!("invalid load address '{addr}'")))?;
    Ok((addr, path))
}

/// Loads `address:path` as a raw binary.
///
/// # Errors
///
/// Returns [`LoadError::Config`] for a malformed name or an unopenable path.
pub fn load(name: &str, target: &mut LoadTarget<'_>) -> Result<LoadResult, LoadError> {
    let (addr, path) = parse_name(name)?;
    let mut image = ImageFile::open(path).map_err(|err| LoadError::Config {
        name: name.to_owned(),
        reason: format!("cannot open '{path}': {err}"),
    })?;

    let len = image.len();
    image.stream_to(target.bus, 0, len, addr, BUFFER_SIZE, "raw image")?;
    debug!("'{path}': {len:#x} bytes loaded at {addr:#010x}");

    let mut result = LoadResult::new(Format::Raw);
    result.entry = Some(addr);
    result.end_addr = Some(addr.wrapping_add(len));
    Ok(result)
}
