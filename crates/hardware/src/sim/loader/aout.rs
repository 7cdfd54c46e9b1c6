//! Legacy a.out executable decoder.
//!
//! A 32-byte little-endian header is followed by text and data, which load
//! contiguously at the entry point. An optional symbol table follows the data;
//! every byte after it is the string pool.

use tracing::debug;

use super::{Format, ImageFile, LoadResult, LoadTarget, pool_string};
use crate::common::{ByteOrder, FieldReader, LoadError};

const HEADER_SIZE: u64 = 32;

/// Text and data are copied in buffers of this size.
const BUFFER_SIZE: usize = 1024;

/// (string index, type, address) triples.
const SYMBOL_SIZE: u64 = 12;

/// Decodes an a.out executable.
///
/// # Errors
///
/// Returns [`LoadError::Format`] for a truncated header, text, data or
/// symbol table.
pub fn load(image: &mut ImageFile, target: &mut LoadTarget<'_>) -> Result<LoadResult, LoadError> {
    let raw = image.read_array::<32>(0, "a.out image")?;
    let r = FieldReader::new(&raw, ByteOrder::Little);
    let text = u64::from(r.u32(4));
    let data = u64::from(r.u32(8));
    let bss = u64::from(r.u32(12));
    let syms = u64::from(r.u32(16));
    let entry = u64::from(r.u32(20));

    debug!("'{}': a.out, entry point {entry:#010x}", image.path().display());
    debug!("'{}': text+data = {text}+{data} bytes", image.path().display());

    image.stream_to(target.bus, HEADER_SIZE, text + data, entry, BUFFER_SIZE, "text/data")?;

    if syms > 0 {
        let sym_offset = HEADER_SIZE + text + data;
        debug!(
            "'{}': symbols = {syms} bytes @ {sym_offset:#x}",
            image.path().display()
        );
        let table = image.read_at(sym_offset, syms, "symbol table")?;
        let strings = image.read_rest(sym_offset + syms)?;
        debug!(
            "'{}': strings = {} bytes @ {:#x}",
            image.path().display(),
            strings.len(),
            sym_offset + syms
        );

        for entry in table.chunks_exact(SYMBOL_SIZE as usize) {
            let s = FieldReader::new(entry, ByteOrder::Little);
            let str_index = u64::from(s.u32(0));
            let kind = s.u32(4);
            let addr = u64::from(s.u32(8));
            if kind == 0 || addr == 0 {
                continue;
            }
            if let Some(name) = pool_string(&strings, str_index) {
                target.symbols.add(addr, 0, name);
            }
        }
    }

    let mut result = LoadResult::new(Format::AOut);
    result.entry = Some(entry);
    result.byte_order = Some(ByteOrder::Little);
    result.end_addr = Some(entry + text + data + bss);
    Ok(result)
}
