//! Executable image loader.
//!
//! This module places an executable image into the emulated address space and
//! reports where execution should start. It performs:
//! 1. **Sniffing:** The first four bytes select ELF, ECOFF, a.out, S-record or symbol text.
//! 2. **Raw fallback:** A name that cannot be opened is retried as `address:path`.
//! 3. **Decoding:** One decoder per format streams segments into the bus and
//!    appends symbols to the symbol table.
//! 4. **Chunking:** Binary decoders write in chunks no larger than the
//!    alignment of the segment's load address, capped at a configurable size.
//!
//! Decoders never terminate the process: structural problems come back as
//! [`LoadError`], soft problems are logged with `tracing::warn!`.

/// Legacy a.out decoder.
pub mod aout;
/// ECOFF decoder.
pub mod ecoff;
/// ELF32 / ELF64 decoder.
pub mod elf;
/// Raw `address:path` loader.
pub mod raw;
/// Motorola S-record decoder.
pub mod srec;

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::common::{ByteOrder, LoadError};
use crate::sim::symbols::SymbolTable;
use crate::soc::interconnect::AddressSpace;

/// Default cap on the chunk size used by binary decoders.
pub const DEFAULT_MAX_CHUNK: usize = 4096;

/// ECOFF flavours, told apart by the file header magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EcoffVariant {
    /// MIPS-I, big-endian.
    Mips1Be,
    /// MIPS-I, little-endian.
    Mips1Le,
    /// MIPS-III, little-endian.
    Mips3Le,
}

impl EcoffVariant {
    /// Byte order of every multi-byte field in the image.
    pub const fn byte_order(self) -> ByteOrder {
        match self {
            Self::Mips1Be => ByteOrder::Big,
            Self::Mips1Le | Self::Mips3Le => ByteOrder::Little,
        }
    }
}

impl fmt::Display for EcoffVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mips1Be => write!(f, "MIPS1 MSB"),
            Self::Mips1Le => write!(f, "MIPS1 LSB"),
            Self::Mips3Le => write!(f, "MIPS3 LSB"),
        }
    }
}

/// Format classification from the first four bytes of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// `?ELF`; the class byte decides 32 or 64 bit later.
    Elf,
    /// ECOFF with a recognised magic.
    Ecoff(EcoffVariant),
    /// Legacy a.out (`00 8b 01 07`).
    AOut,
    /// S-record text (`S` followed by a digit).
    Srec,
    /// Anything else: `nm` style symbol text.
    Symbols,
}

impl ImageKind {
    /// Classifies a file by its first four bytes.
    pub fn sniff(prefix: [u8; 4]) -> Self {
        match prefix {
            [_, b'E', b'L', b'F'] => Self::Elf,
            [0x00, 0x8b, 0x01, 0x07] => Self::AOut,
            [0x42, 0x01, ..] => Self::Ecoff(EcoffVariant::Mips3Le),
            [0x60, 0x01, ..] => Self::Ecoff(EcoffVariant::Mips1Be),
            [0x62, 0x01, ..] => Self::Ecoff(EcoffVariant::Mips1Le),
            [b'S', digit, ..] if digit.is_ascii_digit() => Self::Srec,
            _ => Self::Symbols,
        }
    }
}

/// Format an image was decoded as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// 32-bit ELF.
    Elf32,
    /// 64-bit ELF.
    Elf64,
    /// ECOFF.
    Ecoff(EcoffVariant),
    /// Legacy a.out.
    AOut,
    /// Motorola S-records.
    Srec,
    /// Raw bytes at a given address.
    Raw,
    /// Symbol definitions only; memory untouched.
    Symbols,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Elf32 => write!(f, "ELF32"),
            Self::Elf64 => write!(f, "ELF64"),
            Self::Ecoff(variant) => write!(f, "ECOFF ({variant})"),
            Self::AOut => write!(f, "a.out"),
            Self::Srec => write!(f, "SREC"),
            Self::Raw => write!(f, "raw"),
            Self::Symbols => write!(f, "symbols"),
        }
    }
}

/// Guest architecture named by the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    /// MIPS.
    Mips,
    /// 32-bit PowerPC.
    PowerPc,
    /// 64-bit PowerPC.
    PowerPc64,
    /// HP PA-RISC.
    Hppa,
    /// ARM.
    Arm,
    /// Hitachi SuperH.
    SuperH,
    /// DEC Alpha.
    Alpha,
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mips => "MIPS",
            Self::PowerPc => "PowerPC",
            Self::PowerPc64 => "PowerPC64",
            Self::Hppa => "HPPA",
            Self::Arm => "ARM",
            Self::SuperH => "SuperH",
            Self::Alpha => "Alpha",
        };
        f.write_str(name)
    }
}

/// What loading an image produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadResult {
    /// Detected format.
    pub format: Format,
    /// Entry point; `None` keeps the CPU's current PC.
    pub entry: Option<u64>,
    /// Declared byte order, for formats that declare one.
    pub byte_order: Option<ByteOrder>,
    /// Initial global pointer.
    pub gp: Option<u64>,
    /// End of the loaded image.
    pub end_addr: Option<u64>,
    /// The image likely uses a compressed instruction encoding (MIPS16).
    pub compressed_isa: bool,
    /// Architecture the image was built for.
    pub arch: Option<Arch>,
}

impl LoadResult {
    /// A result of `format` with nothing else known yet.
    pub const fn new(format: Format) -> Self {
        Self {
            format,
            entry: None,
            byte_order: None,
            gp: None,
            end_addr: None,
            compressed_isa: false,
            arch: None,
        }
    }
}

impl fmt::Display for LoadResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format)?;
        if let Some(arch) = self.arch {
            write!(f, " {arch}")?;
        }
        if let Some(order) = self.byte_order {
            write!(f, ", {order}")?;
        }
        match self.entry {
            Some(entry) => write!(f, ", entry {entry:#x}")?,
            None => write!(f, ", no entry point")?,
        }
        if let Some(gp) = self.gp {
            write!(f, ", gp {gp:#x}")?;
        }
        if let Some(end) = self.end_addr {
            write!(f, ", end {end:#x}")?;
        }
        if self.compressed_isa {
            write!(f, ", MIPS16")?;
        }
        Ok(())
    }
}

/// Where decoders put what they find.
#[derive(Debug)]
pub struct LoadTarget<'a> {
    /// Address space receiving segment data.
    pub bus: &'a mut AddressSpace,
    /// Table receiving symbols.
    pub symbols: &'a mut SymbolTable,
    /// Cap on the chunk size for segment writes.
    pub max_chunk: usize,
}

impl<'a> LoadTarget<'a> {
    /// Bundles a bus and symbol table with the given chunk cap.
    pub const fn new(bus: &'a mut AddressSpace, symbols: &'a mut SymbolTable, max_chunk: usize) -> Self {
        Self {
            bus,
            symbols,
            max_chunk,
        }
    }

    /// Chunk size for a segment loaded at `vaddr`.
    pub fn chunk_for(&self, vaddr: u64) -> usize {
        chunk_size(vaddr, self.max_chunk)
    }
}

/// Largest power-of-two divisor of `vaddr`, capped at `max_chunk`.
///
/// Address zero is divisible by everything and gets the cap.
///
/// # Examples
///
/// ```
/// use retrovm_core::sim::loader::chunk_size;
///
/// assert_eq!(chunk_size(0x8000_0000, 4096), 4096);
/// assert_eq!(chunk_size(0x8000_0010, 4096), 16);
/// assert_eq!(chunk_size(0x8000_0003, 4096), 1);
/// ```
pub fn chunk_size(vaddr: u64, max_chunk: usize) -> usize {
    let cap = max_chunk.max(1);
    if vaddr == 0 {
        return cap;
    }
    let align = 1u64 << vaddr.trailing_zeros();
    usize::try_from(align).map_or(cap, |align| align.min(cap))
}

/// Writes `data` at `vaddr` in chunks sized by [`chunk_size`].
///
/// # Errors
///
/// Propagates the first bus error; earlier chunks stay written.
pub fn write_chunked(
    bus: &mut AddressSpace,
    vaddr: u64,
    data: &[u8],
    max_chunk: usize,
) -> Result<(), LoadError> {
    let chunk = chunk_size(vaddr, max_chunk);
    let mut addr = vaddr;
    for piece in data.chunks(chunk) {
        bus.write(addr, piece)?;
        addr = addr.wrapping_add(piece.len() as u64);
    }
    Ok(())
}

/// An opened image file.
#[derive(Debug)]
pub struct ImageFile {
    file: File,
    path: PathBuf,
    len: u64,
}

impl ImageFile {
    /// Opens `path` for reading.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = File::open(&path)?;
        let len = file.metadata()?.len();
        Ok(Self { file, path, len })
    }

    /// Path the image was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File size in bytes.
    pub const fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` for an empty file.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// A [`LoadError::Format`] for this image.
    pub fn format_error(&self, reason: impl Into<String>) -> LoadError {
        LoadError::format(&self.path, reason)
    }

    /// A [`LoadError::Unsupported`] for this image.
    pub fn unsupported(&self, reason: impl Into<String>) -> LoadError {
        LoadError::unsupported(&self.path, reason)
    }

    /// Reads a fixed-size header at `offset`.
    ///
    /// # Errors
    ///
    /// A short file is a format error named after `what`.
    pub fn read_array<const N: usize>(
        &mut self,
        offset: u64,
        what: &str,
    ) -> Result<[u8; N], LoadError> {
        let mut buf = [0u8; N];
        self.seek(offset)?;
        self.file
            .read_exact(&mut buf)
            .map_err(|e| LoadError::io(&self.path, e, what))?;
        Ok(buf)
    }

    /// Reads `len` bytes at `offset`.
    ///
    /// # Errors
    ///
    /// A range reaching past the end of the file is a format error named
    /// after `what`; it is rejected before anything is allocated.
    pub fn read_at(&mut self, offset: u64, len: u64, what: &str) -> Result<Vec<u8>, LoadError> {
        self.check_span(offset, len, what)?;
        let mut buf = vec![0u8; len as usize];
        self.seek(offset)?;
        self.file
            .read_exact(&mut buf)
            .map_err(|e| LoadError::io(&self.path, e, what))?;
        Ok(buf)
    }

    /// Reads from `offset` to the end of the file.
    ///
    /// # Errors
    ///
    /// Returns I/O failures.
    pub fn read_rest(&mut self, offset: u64) -> Result<Vec<u8>, LoadError> {
        let mut buf = Vec::new();
        self.seek(offset)?;
        let _ = self
            .file
            .read_to_end(&mut buf)
            .map_err(|e| LoadError::io(&self.path, e, "image"))?;
        Ok(buf)
    }

    /// Copies `len` file bytes at `offset` to `vaddr`.
    ///
    /// The file is read `chunk` bytes at a time and each piece goes through
    /// [`write_chunked`], so no bus write exceeds the alignment of its
    /// address.
    ///
    /// # Errors
    ///
    /// A short file is a format error named after `what`; bus rejections
    /// are propagated.
    pub fn stream_to(
        &mut self,
        bus: &mut AddressSpace,
        offset: u64,
        len: u64,
        vaddr: u64,
        chunk: usize,
        what: &str,
    ) -> Result<(), LoadError> {
        self.check_span(offset, len, what)?;
        self.seek(offset)?;
        let mut buf = vec![0u8; chunk.max(1)];
        let mut done = 0u64;
        while done < len {
            let n = (len - done).min(buf.len() as u64) as usize;
            self.file
                .read_exact(&mut buf[..n])
                .map_err(|e| LoadError::io(&self.path, e, what))?;
            write_chunked(bus, vaddr.wrapping_add(done), &buf[..n], chunk)?;
            done += n as u64;
        }
        Ok(())
    }

    fn seek(&mut self, offset: u64) -> Result<(), LoadError> {
        let _ = self
            .file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| LoadError::io(&self.path, e, "image"))?;
        Ok(())
    }

    fn check_span(&self, offset: u64, len: u64, what: &str) -> Result<(), LoadError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(self.format_error(format!("truncated {what}"))),
        }
    }
}

/// Reads the NUL-terminated string at `offset` in a string pool.
///
/// A string running to the end of the pool is accepted; an offset outside
/// the pool yields `None`.
pub(crate) fn pool_string(pool: &[u8], offset: u64) -> Option<String> {
    let start = usize::try_from(offset).ok()?;
    let tail = pool.get(start..)?;
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    Some(String::from_utf8_lossy(&tail[..end]).into_owned())
}

/// Loads `name` into `bus`, appending any symbols to `symbols`.
///
/// `name` is a file path; if it cannot be opened it is treated as
/// `address:path` and loaded raw.
///
/// # Errors
///
/// See [`LoadError`]: an unopenable name that is not `address:path` is a
/// configuration error, a file shorter than four bytes or a malformed image
/// is a format error, and refused variants are unsupported.
pub fn load_image(
    bus: &mut AddressSpace,
    symbols: &mut SymbolTable,
    name: &str,
    max_chunk: usize,
) -> Result<LoadResult, LoadError> {
    let mut target = LoadTarget::new(bus, symbols, max_chunk);

    let mut image = match ImageFile::open(name) {
        Ok(image) => image,
        Err(err) => {
            debug!("loader: cannot open '{name}' ({err}), trying address:path");
            return raw::load(name, &mut target);
        }
    };

    let prefix = image.read_array::<4>(0, "file header")?;
    let kind = ImageKind::sniff(prefix);
    debug!("loader: '{name}' sniffed as {kind:?}");

    let result = match kind {
        ImageKind::Elf => elf::load(&mut image, &mut target)?,
        ImageKind::Ecoff(variant) => ecoff::load(&mut image, variant, &mut target)?,
        ImageKind::AOut => aout::load(&mut image, &mut target)?,
        ImageKind::Srec => srec::load(&mut image, &mut target)?,
        ImageKind::Symbols => load_symbols(&mut image, &mut target)?,
    };

    info!("loader: '{name}': {result}");
    Ok(result)
}

/// Imports `nm` style symbol text; the address space is not touched.
fn load_symbols(
    image: &mut ImageFile,
    target: &mut LoadTarget<'_>,
) -> Result<LoadResult, LoadError> {
    let bytes = image.read_rest(0)?;
    let text = String::from_utf8_lossy(&bytes);
    let added = target.symbols.add_from_nm_text(&text);
    debug!(
        "loader: '{}': {added} symbols from text",
        image.path().display()
    );
    Ok(LoadResult::new(Format::Symbols))
}
