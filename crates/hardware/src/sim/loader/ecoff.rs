//! ECOFF executable decoder (MIPS).
//!
//! The file header and the a.out optional header give the entry point and
//! the initial global pointer; section headers follow the optional header.
//! External symbols are read from the symbolic header when one is present.

use tracing::{debug, warn};

use super::{Arch, EcoffVariant, Format, ImageFile, LoadResult, LoadTarget, pool_string};
use crate::common::{ByteOrder, FieldReader, LoadError};

/// File header plus the standard optional header.
const EXEC_HEADER_SIZE: u64 = 76;

/// File header alone; section headers start `f_opthdr` bytes after it.
const FILE_HEADER_SIZE: u64 = 20;

/// `f_opthdr` of the standard a.out optional header.
const STANDARD_OPTHDR: u64 = EXEC_HEADER_SIZE - FILE_HEADER_SIZE;

const SECTION_HEADER_SIZE: u64 = 40;

const SYMBOLIC_HEADER_SIZE: u64 = 96;

const EXTSYM_SIZE: u64 = 16;

/// Section flag: the section occupies no file space (bss-like).
const STYP_NOLOAD: u32 = 0x02;

const MAGIC_MIPSEB: u16 = 0x0160;
const MAGIC_MIPSEB_SWAPPED: u16 = 0x6001;
const MAGIC_MIPSEL: u16 = 0x0162;
const MAGIC_MIPSEL3: u16 = 0x0142;

/// Identifies the ECOFF flavour from the file header magic.
///
/// The magic is read little-endian; a big-endian MIPS image matches either
/// the canonical or the byte-swapped big-endian value.
pub const fn variant_for_magic(magic: u16) -> Option<EcoffVariant> {
    match magic {
        MAGIC_MIPSEB | MAGIC_MIPSEB_SWAPPED => Some(EcoffVariant::Mips1Be),
        MAGIC_MIPSEL => Some(EcoffVariant::Mips1Le),
        MAGIC_MIPSEL3 => Some(EcoffVariant::Mips3Le),
        _ => None,
    }
}

/// Decodes an ECOFF executable.
///
/// `sniffed` is the variant the format sniffer guessed; the header magic is
/// authoritative.
///
/// # Errors
///
/// * [`LoadError::Format`] - truncated headers or section data, or an
///   unrecognised magic.
/// * [`LoadError::Unsupported`] - a section carries relocations.
pub fn load(
    image: &mut ImageFile,
    sniffed: EcoffVariant,
    target: &mut LoadTarget<'_>,
) -> Result<LoadResult, LoadError> {
    let exec = image.read_at(0, EXEC_HEADER_SIZE, "ecoff image")?;

    let magic = FieldReader::new(&exec, ByteOrder::Little).u16(0);
    let Some(variant) = variant_for_magic(magic) else {
        return Err(image.format_error(format!("unknown ecoff format (magic {magic:#06x})")));
    };
    if variant != sniffed {
        debug!("'{}': header magic says {variant}, not {sniffed}", image.path().display());
    }

    let order = variant.byte_order();
    let r = FieldReader::new(&exec, order);
    let nscns = u64::from(r.u16(2));
    let symptr = u64::from(r.u32(8));
    let nsyms = r.u32(12);
    let opthdr = u64::from(r.u16(16));
    if opthdr != STANDARD_OPTHDR {
        debug!(
            "'{}': optional header is {opthdr} bytes, expected {STANDARD_OPTHDR}",
            image.path().display()
        );
    }
    debug!(
        "'{}': ecoff, {variant}, {nscns} sections, {nsyms} symbols @ {symptr:#x}",
        image.path().display()
    );

    debug!(
        "'{}': magic {:#06x}, tsize {:#x}, dsize {:#x}, bsize {:#x}",
        image.path().display(),
        r.u16(20),
        r.u32(24),
        r.u32(28),
        r.u32(32)
    );
    debug!(
        "'{}': text @ {:#010x}, data @ {:#010x}, bss @ {:#010x}",
        image.path().display(),
        r.u32(40),
        r.u32(44),
        r.u32(48)
    );

    let entry = u64::from(r.u32(36));
    let gp = u64::from(r.u32(72));
    debug!("'{}': entrypoint {entry:#010x}, gp = {gp:#010x}", image.path().display());

    let mut end_addr = None;
    for secn in 0..nscns {
        let at = FILE_HEADER_SIZE + opthdr + secn * SECTION_HEADER_SIZE;
        let raw = image.read_at(at, SECTION_HEADER_SIZE, "section header")?;
        let s = FieldReader::new(&raw, order);

        let name: String = raw[..8]
            .iter()
            .take_while(|b| (32..127).contains(*b))
            .map(|&b| char::from(b))
            .collect();
        let vaddr = u64::from(s.u32(12));
        let size = u64::from(s.u32(16));
        let scnptr = u64::from(s.u32(20));
        let relptr = s.u32(24);
        let flags = s.u32(36);

        debug!(
            "'{}': section \"{name}\", {size:#x} bytes @ {vaddr:#010x} (file offset {scnptr:#x}, flags {flags:#x})",
            image.path().display()
        );

        end_addr = Some(vaddr + size);

        if relptr != 0 {
            return Err(image.unsupported(format!(
                "relocatable code/data in section nr {secn}"
            )));
        }

        if scnptr != 0 && size != 0 && flags & STYP_NOLOAD == 0 {
            let chunk = target.chunk_for(vaddr);
            image.stream_to(target.bus, scnptr, size, vaddr, chunk, "section data")?;
        }
    }

    if symptr != 0 && nsyms != 0 {
        load_external_symbols(image, target, symptr, order)?;
    }

    let mut result = LoadResult::new(Format::Ecoff(variant));
    result.entry = Some(entry);
    result.gp = Some(gp);
    result.end_addr = end_addr;
    result.byte_order = Some(order);
    result.arch = Some(Arch::Mips);
    Ok(result)
}

fn load_external_symbols(
    image: &mut ImageFile,
    target: &mut LoadTarget<'_>,
    symptr: u64,
    order: ByteOrder,
) -> Result<(), LoadError> {
    let raw = image.read_at(symptr, SYMBOLIC_HEADER_SIZE, "symbolic header")?;
    let h = FieldReader::new(&raw, order);
    let sym_magic = h.u16(0);
    let iss_ext_max = u64::from(h.u32(64));
    let cb_ss_ext_offset = u64::from(h.u32(68));
    let iext_max = u64::from(h.u32(88));
    let cb_ext_offset = u64::from(h.u32(92));

    debug!("'{}': symbol header: magic = {sym_magic:#x}", image.path().display());
    debug!(
        "'{}': {iext_max} symbols @ {cb_ext_offset:#010x} (strings @ {cb_ss_ext_offset:#010x})",
        image.path().display()
    );

    let strings = image.read_at(cb_ss_ext_offset, iss_ext_max, "external string pool")?;
    let extsyms = image.read_at(cb_ext_offset, iext_max * EXTSYM_SIZE, "external symbols")?;

    for entry in extsyms.chunks_exact(EXTSYM_SIZE as usize) {
        let e = FieldReader::new(entry, order);
        let strindex = u64::from(e.u32(4));
        let value = u64::from(e.u32(8));
        match pool_string(&strings, strindex) {
            Some(name) => target.symbols.add(value, 0, name),
            None => warn!(
                "'{}': external symbol string index {strindex:#x} outside the pool",
                image.path().display()
            ),
        }
    }
    Ok(())
}
