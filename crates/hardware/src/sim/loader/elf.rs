//! ELF32 / ELF64 executable decoder.
//!
//! Loads every loadable program segment at its virtual address and collects
//! symbols from the section headers. It performs:
//! 1. **Validation:** Magic, class, encoding, entry sizes, type and machine.
//! 2. **Segments:** `PT_LOAD` plus the MIPS `REGINFO` / `OPTIONS` types, streamed
//!    in address-aligned chunks. The zero-filled tail (`memsz - filesz`) is
//!    left to RAM, which starts zeroed.
//! 3. **Symbols:** The last symbol table and the last string table win; each
//!    symbol with a nonzero value is recorded, and `_gp` seeds the global pointer.

use object::elf::{
    ELFCLASS32, ELFCLASS64, ELFDATA2LSB, ELFDATA2MSB, ELFMAG, EM_ALPHA,
    EM_ARM, EM_MIPS, EM_MIPS_RS3_LE, EM_PARISC, EM_PPC, EM_PPC64, EM_SH, ET_EXEC, PT_LOAD,
    PT_MIPS_OPTIONS, PT_MIPS_REGINFO, SHT_STRTAB, SHT_SYMTAB,
};
use tracing::{debug, warn};

use super::{Arch, Format, ImageFile, LoadResult, LoadTarget, pool_string};
use crate::common::{ByteOrder, FieldReader, LoadError};

/// `e_ident` index of the class byte.
const EI_CLASS: usize = 4;

/// `e_ident` index of the data encoding byte.
const EI_DATA: usize = 5;

/// `e_flags` top byte that marks a MIPS16 image.
const MIPS16_FLAGS: u32 = 0x24;

/// Symbol whose value seeds the global pointer register.
const GP_SYMBOL: &str = "_gp";

/// Byte offsets of the fields the decoder needs, per class.
struct Layout {
    ehdr_size: u64,
    phdr_size: u64,
    shdr_size: u64,
    sym_size: u64,
}

const LAYOUT32: Layout = Layout {
    ehdr_size: 52,
    phdr_size: 32,
    shdr_size: 40,
    sym_size: 16,
};

const LAYOUT64: Layout = Layout {
    ehdr_size: 64,
    phdr_size: 56,
    shdr_size: 64,
    sym_size: 24,
};

struct Header {
    is64: bool,
    e_type: u16,
    machine: u16,
    entry: u64,
    phoff: u64,
    shoff: u64,
    flags: u32,
    phentsize: u64,
    phnum: u64,
    shentsize: u64,
    shnum: u64,
}

impl Header {
    fn parse(buf: &[u8], order: ByteOrder, is64: bool) -> Self {
        let r = FieldReader::new(buf, order);
        if is64 {
            Self {
                is64,
                e_type: r.u16(16),
                machine: r.u16(18),
                entry: r.u64(24),
                phoff: r.u64(32),
                shoff: r.u64(40),
                flags: r.u32(48),
                phentsize: r.u16(54).into(),
                phnum: r.u16(56).into(),
                shentsize: r.u16(58).into(),
                shnum: r.u16(60).into(),
            }
        } else {
            Self {
                is64,
                e_type: r.u16(16),
                machine: r.u16(18),
                entry: r.u32(24).into(),
                phoff: r.u32(28).into(),
                shoff: r.u32(32).into(),
                flags: r.u32(36),
                phentsize: r.u16(42).into(),
                phnum: r.u16(44).into(),
                shentsize: r.u16(46).into(),
                shnum: r.u16(48).into(),
            }
        }
    }

    const fn layout(&self) -> &'static Layout {
        if self.is64 { &LAYOUT64 } else { &LAYOUT32 }
    }
}

struct ProgramHeader {
    p_type: u32,
    offset: u64,
    vaddr: u64,
    paddr: u64,
    filesz: u64,
    memsz: u64,
}

impl ProgramHeader {
    fn parse(buf: &[u8], order: ByteOrder, is64: bool) -> Self {
        let r = FieldReader::new(buf, order);
        if is64 {
            Self {
                p_type: r.u32(0),
                offset: r.u64(8),
                vaddr: r.u64(16),
                paddr: r.u64(24),
                filesz: r.u64(32),
                memsz: r.u64(40),
            }
        } else {
            Self {
                p_type: r.u32(0),
                offset: r.u32(4).into(),
                vaddr: r.u32(8).into(),
                paddr: r.u32(12).into(),
                filesz: r.u32(16).into(),
                memsz: r.u32(20).into(),
            }
        }
    }

    const fn is_loadable(&self) -> bool {
        matches!(self.p_type, PT_LOAD | PT_MIPS_REGINFO | PT_MIPS_OPTIONS)
    }
}

struct SectionHeader {
    sh_type: u32,
    offset: u64,
    size: u64,
}

impl SectionHeader {
    fn parse(buf: &[u8], order: ByteOrder, is64: bool) -> Self {
        let r = FieldReader::new(buf, order);
        if is64 {
            Self {
                sh_type: r.u32(4),
                offset: r.u64(24),
                size: r.u64(32),
            }
        } else {
            Self {
                sh_type: r.u32(4),
                offset: r.u32(16).into(),
                size: r.u32(20).into(),
            }
        }
    }
}

/// Maps an ELF machine number to a supported architecture.
pub const fn arch_for_machine(machine: u16) -> Option<Arch> {
    match machine {
        EM_MIPS | EM_MIPS_RS3_LE => Some(Arch::Mips),
        EM_PPC => Some(Arch::PowerPc),
        EM_PPC64 => Some(Arch::PowerPc64),
        EM_PARISC => Some(Arch::Hppa),
        EM_ARM => Some(Arch::Arm),
        EM_SH => Some(Arch::SuperH),
        EM_ALPHA => Some(Arch::Alpha),
        _ => None,
    }
}

/// Decodes an ELF executable.
///
/// # Errors
///
/// * [`LoadError::Format`] - bad magic, truncated headers or data, wrong entry
///   sizes, `vaddr != paddr` or `memsz < filesz` in a loadable segment.
/// * [`LoadError::Unsupported`] - unknown class or encoding, non-executable
///   type, or an unsupported machine.
pub fn load(image: &mut ImageFile, target: &mut LoadTarget<'_>) -> Result<LoadResult, LoadError> {
    let ident = image.read_array::<16>(0, "ELF header")?;
    if ident[..4] != ELFMAG {
        return Err(image.format_error("not an ELF file image"));
    }

    let is64 = match ident[EI_CLASS] {
        ELFCLASS32 => false,
        ELFCLASS64 => true,
        class => return Err(image.unsupported(format!("unknown ELF class {class}"))),
    };
    let order = match ident[EI_DATA] {
        ELFDATA2LSB => ByteOrder::Little,
        ELFDATA2MSB => ByteOrder::Big,
        data => return Err(image.unsupported(format!("unknown data encoding {data}"))),
    };

    let layout = if is64 { &LAYOUT64 } else { &LAYOUT32 };
    let raw = image.read_at(0, layout.ehdr_size, "ELF header")?;
    let hdr = Header::parse(&raw, order, is64);

    if hdr.phnum > 0 && hdr.phentsize != layout.phdr_size {
        return Err(image.format_error(format!(
            "incorrect phentsize {}, should be {}",
            hdr.phentsize, layout.phdr_size
        )));
    }
    if hdr.shnum > 0 && hdr.shentsize != layout.shdr_size {
        return Err(image.format_error(format!(
            "incorrect shentsize {}, should be {}",
            hdr.shentsize, layout.shdr_size
        )));
    }
    if hdr.e_type != ET_EXEC {
        return Err(image.unsupported(format!(
            "not an ELF executable file, type = {}",
            hdr.e_type
        )));
    }
    let Some(arch) = arch_for_machine(hdr.machine) else {
        return Err(image.unsupported(format!("unknown machine type {}", hdr.machine)));
    };

    let format = if is64 { Format::Elf64 } else { Format::Elf32 };
    debug!(
        "'{}': {format} {arch} {order}, entry point {:#018x}",
        image.path().display(),
        hdr.entry
    );

    let mut result = LoadResult::new(format);
    result.entry = Some(hdr.entry);
    result.byte_order = Some(order);
    result.arch = Some(arch);

    if (hdr.flags >> 24) & 0xff == MIPS16_FLAGS {
        debug!("'{}': MIPS16 encoding (e_flags = {:#010x})", image.path().display(), hdr.flags);
        result.compressed_isa = true;
    } else if hdr.entry & 0x3 != 0 {
        debug!("'{}': MIPS16 encoding (entry not 32-bit aligned)", image.path().display());
        result.compressed_isa = true;
    }

    result.end_addr = load_segments(image, target, &hdr, order)?;

    if let Some(gp) = load_symbols(image, target, &hdr, order)? {
        result.gp = Some(gp);
    }

    Ok(result)
}

/// Streams the loadable segments; returns the highest `vaddr + memsz`.
fn load_segments(
    image: &mut ImageFile,
    target: &mut LoadTarget<'_>,
    hdr: &Header,
    order: ByteOrder,
) -> Result<Option<u64>, LoadError> {
    let layout = hdr.layout();
    let mut end_addr = None;

    for i in 0..hdr.phnum {
        let at = hdr.phoff.saturating_add(i * hdr.phentsize);
        let raw = image.read_at(at, layout.phdr_size, "program header")?;
        let phdr = ProgramHeader::parse(&raw, order, hdr.is64);
        if !phdr.is_loadable() {
            continue;
        }

        if phdr.p_type == PT_LOAD {
            debug!(
                "'{}': loadable chunk {i} @ {:#010x}, vaddr {:#018x} len={:#x}",
                image.path().display(),
                phdr.offset,
                phdr.vaddr,
                phdr.memsz
            );
        } else {
            debug!(
                "'{}': type {:#010x} chunk {i} @ {:#010x}, vaddr {:#018x} len={:#x}",
                image.path().display(),
                phdr.p_type,
                phdr.offset,
                phdr.vaddr,
                phdr.memsz
            );
        }

        if phdr.vaddr != phdr.paddr {
            return Err(image.format_error(format!(
                "vaddr != paddr in segment {i}: vaddr={:#018x} paddr={:#018x}",
                phdr.vaddr, phdr.paddr
            )));
        }
        if phdr.memsz < phdr.filesz {
            return Err(image.format_error(format!(
                "memsz < filesz in segment {i}: memsz={:#x} filesz={:#x}",
                phdr.memsz, phdr.filesz
            )));
        }

        let chunk = target.chunk_for(phdr.vaddr);
        image.stream_to(
            target.bus,
            phdr.offset,
            phdr.filesz,
            phdr.vaddr,
            chunk,
            "segment data",
        )?;

        let end = phdr.vaddr.wrapping_add(phdr.memsz);
        end_addr = Some(end_addr.map_or(end, |e: u64| e.max(end)));
    }

    Ok(end_addr)
}

/// Records symbols; returns the value of `_gp` if present.
fn load_symbols(
    image: &mut ImageFile,
    target: &mut LoadTarget<'_>,
    hdr: &Header,
    order: ByteOrder,
) -> Result<Option<u64>, LoadError> {
    let layout = hdr.layout();
    let mut symtab: Option<Vec<u8>> = None;
    let mut strtab: Option<Vec<u8>> = None;
    let mut strtab_count = 0usize;

    for i in 0..hdr.shnum {
        let at = hdr.shoff.saturating_add(i * hdr.shentsize);
        let raw = image.read_at(at, layout.shdr_size, "section header")?;
        let shdr = SectionHeader::parse(&raw, order, hdr.is64);

        match shdr.sh_type {
            SHT_SYMTAB => {
                let n_entries = shdr.size / layout.sym_size;
                let bytes = image.read_at(shdr.offset, n_entries * layout.sym_size, "symbol table")?;
                debug!(
                    "'{}': {n_entries} symbol entries at {:#010x}",
                    image.path().display(),
                    shdr.offset
                );
                symtab = Some(bytes);
            }
            SHT_STRTAB => {
                let bytes = image.read_at(shdr.offset, shdr.size, "string table")?;
                debug!(
                    "'{}': {} bytes of symbol strings at {:#010x}",
                    image.path().display(),
                    shdr.size,
                    shdr.offset
                );
                strtab = Some(bytes);
                strtab_count += 1;
            }
            _ => {}
        }
    }

    if strtab_count > 1 {
        warn!(
            "'{}': {strtab_count} string tables; symbol names are taken from the last one",
            image.path().display()
        );
    }

    let (Some(symtab), Some(strtab)) = (symtab, strtab) else {
        return Ok(None);
    };

    let mut gp = None;
    for entry in symtab.chunks_exact(layout.sym_size as usize) {
        let r = FieldReader::new(entry, order);
        let (name_off, value, size) = if hdr.is64 {
            (u64::from(r.u32(0)), r.u64(8), r.u64(16))
        } else {
            (u64::from(r.u32(0)), u64::from(r.u32(4)), u64::from(r.u32(8)))
        };

        let Some(name) = pool_string(&strtab, name_off) else {
            warn!(
                "'{}': symbol name offset {name_off:#x} outside the string table",
                image.path().display()
            );
            continue;
        };

        if name == GP_SYMBOL {
            debug!("'{}': found _gp address: {value:#018x}", image.path().display());
            gp = Some(value);
        }
        if value != 0 {
            target.symbols.add(value, size, name);
        }
    }

    Ok(gp)
}
