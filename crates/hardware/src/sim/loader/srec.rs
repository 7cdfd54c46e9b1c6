//! Motorola S-record decoder.
//!
//! Each line is `S<type><count><address><data><checksum>` in hex, where
//! `count` covers the address, data and checksum bytes. Data records (1, 2, 3)
//! carry 2, 3 or 4 address bytes; termination records (7, 8, 9) carry a 4, 3
//! or 2 byte entry point.

use tracing::{debug, warn};

use super::{Format, ImageFile, LoadResult, LoadTarget};
use crate::common::LoadError;

/// Shortest line that can hold a record.
const MIN_RECORD_LEN: usize = 10;

/// Decodes an S-record file.
///
/// Stray lines, short records and unknown record types are logged and
/// skipped. Checksum mismatches are logged and the record is still used. A
/// byte count running past the end of the line is logged, and every byte
/// present is taken as address and data with no checksum. A file without a
/// termination record loads with no entry point.
///
/// # Errors
///
/// Returns [`LoadError::Format`] for non-hex characters, an odd number of
/// digits, an empty record, or a record too short for its address field.
pub fn load(image: &mut ImageFile, target: &mut LoadTarget<'_>) -> Result<LoadResult, LoadError> {
    let contents = image.read_rest(0)?;
    let path = image.path().display().to_string();

    let mut entry = None;
    let mut warned_stray = false;
    let mut warned_short = false;
    let mut total_bytes_loaded = 0usize;

    for (index, raw_line) in contents.split(|&b| b == b'\n').enumerate() {
        let line_no = index + 1;
        let line = raw_line.strip_suffix(b"\r").unwrap_or(raw_line);
        if line.is_empty() {
            continue;
        }

        if line[0] != b'S' {
            if !warned_stray {
                warn!("'{path}': non-S-record found at line {line_no}");
                warned_stray = true;
            }
            continue;
        }

        if line.len() < MIN_RECORD_LEN {
            if !warned_short {
                warn!("'{path}': invalid S-record found at line {line_no}");
                warned_short = true;
            }
            continue;
        }

        let record_type = hex_digit(line[1])
            .ok_or_else(|| invalid_char(image, line[1], line_no))?;
        let bytes = decode_hex(&line[2..]).map_err(|bad| match bad {
            Some(ch) => invalid_char(image, ch, line_no),
            None => image.format_error(format!("odd number of hex digits at line {line_no}")),
        })?;

        let count = usize::from(bytes[0]);
        let available = bytes.len() - 1;
        let payload = if count > available {
            // A short line carries no checksum; every byte present is address and data.
            warn!(
                "'{path}': byte count {count} exceeds the {available} bytes at line {line_no}; using what is there"
            );
            &bytes[1..]
        } else {
            let record = &bytes[1..=count];
            let Some((&checksum, payload)) = record.split_last() else {
                return Err(image.format_error(format!("empty record at line {line_no}")));
            };
            let sum = bytes[..record.len()]
                .iter()
                .fold(0u8, |acc, &b| acc.wrapping_add(b));
            if !sum != checksum {
                warn!(
                    "'{path}': checksum mismatch at line {line_no} (computed {:#04x}, found {checksum:#04x})",
                    !sum
                );
            }
            payload
        };

        match record_type {
            0 => {
                let text: String = payload
                    .get(2..)
                    .unwrap_or_default()
                    .iter()
                    .map(|&b| if (0x20..0x7f).contains(&b) { char::from(b) } else { '?' })
                    .collect();
                debug!("'{path}': SREC \"{text}\"");
            }
            1..=3 => {
                let addr_len = usize::from(record_type) + 1;
                let (addr, data) = split_address(image, payload, addr_len, line_no)?;
                target.bus.write(addr, data)?;
                total_bytes_loaded += data.len();
            }
            7..=9 => {
                let addr_len = 11 - usize::from(record_type);
                let (addr, _) = split_address(image, payload, addr_len, line_no)?;
                debug!("'{path}': entry point {addr:#010x}");
                entry = Some(addr);
            }
            other => debug!("'{path}': unimplemented S-record type {other}"),
        }
    }

    debug!("'{path}': {total_bytes_loaded:#x} bytes loaded");
    if entry.is_none() {
        warn!("'{path}': no entrypoint found");
    }

    let mut result = LoadResult::new(Format::Srec);
    result.entry = entry;
    Ok(result)
}

fn split_address<'a>(
    image: &ImageFile,
    payload: &'a [u8],
    addr_len: usize,
    line_no: usize,
) -> Result<(u64, &'a [u8]), LoadError> {
    if payload.len() < addr_len {
        return Err(image.format_error(format!(
            "record too short for a {addr_len}-byte address at line {line_no}"
        )));
    }
    let (addr, data) = payload.split_at(addr_len);
    let addr = addr.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
    Ok((addr, data))
}

/// Decodes hex digit pairs. `Err(Some(c))` names an invalid character,
/// `Err(None)` reports a dangling digit.
fn decode_hex(text: &[u8]) -> Result<Vec<u8>, Option<u8>> {
    if let Some(&bad) = text.iter().find(|&&c| hex_digit(c).is_none()) {
        return Err(Some(bad));
    }
    let pairs = text.chunks_exact(2);
    if !pairs.remainder().is_empty() {
        return Err(None);
    }
    Ok(pairs
        .map(|pair| (hex_digit(pair[0]).unwrap_or(0) << 4) | hex_digit(pair[1]).unwrap_or(0))
        .collect())
}

fn hex_digit(c: u8) -> Option<u8> {
    char::from(c).to_digit(16).map(|d| d as u8)
}

fn invalid_char(image: &ImageFile, ch: u8, line_no: usize) -> LoadError {
    image.format_error(format!(
        "invalid character {:?} in S-record at line {line_no}",
        char::from(ch)
    ))
}
