//! Symbol store.
//!
//! Decoders append every symbol an image carries; the emulator's debugger and
//! trace output resolve addresses back to names through this table. It
//! provides:
//! 1. **Storage:** Insertion-ordered entries; duplicates are allowed.
//! 2. **Lookup:** By address (most recent covering entry wins) and by name.
//! 3. **Text import:** `nm` / `nm -S` output, for images that carry no symbols.

use std::fmt;

use tracing::debug;

/// One named address range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolEntry {
    /// Start address.
    pub address: u64,
    /// Size in bytes; never zero.
    pub size: u64,
    /// Symbol name.
    pub name: String,
}

impl SymbolEntry {
    /// Returns `true` if `addr` lies in `[address, address + size)`.
    pub const fn contains(&self, addr: u64) -> bool {
        addr >= self.address && addr - self.address < self.size
    }
}

impl fmt::Display for SymbolEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x} {:8x} {}", self.address, self.size, self.name)
    }
}

/// Symbols collected from loaded images.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    entries: Vec<SymbolEntry>,
}

impl SymbolTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a symbol. A size of zero is stored as one byte.
    pub fn add(&mut self, address: u64, size: u64, name: impl Into<String>) {
        self.entries.push(SymbolEntry {
            address,
            size: size.max(1),
            name: name.into(),
        });
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no symbol was added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &SymbolEntry> {
        self.entries.iter()
    }

    /// Finds the most recently added symbol covering `addr`, with the
    /// offset of `addr` into it.
    pub fn lookup(&self, addr: u64) -> Option<(&SymbolEntry, u64)> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.contains(addr))
            .map(|e| (e, addr - e.address))
    }

    /// Finds the most recently added symbol called `name`.
    pub fn find_by_name(&self, name: &str) -> Option<&SymbolEntry> {
        self.entries.iter().rev().find(|e| e.name == name)
    }

    /// Formats `addr` as `name` or `name+0xoff`.
    pub fn describe(&self, addr: u64) -> Option<String> {
        self.lookup(addr).map(|(entry, offset)| {
            if offset == 0 {
                entry.name.clone()
            } else {
                format!("{}+{offset:#x}", entry.name)
            }
        })
    }

    /// Imports `nm` output.
    ///
    /// Accepts `addr type name` and `addr size type name` lines with
    /// hexadecimal numbers; anything else is skipped. Returns the number of
    /// symbols added.
    pub fn add_from_nm_text(&mut self, text: &str) -> usize {
        let before = self.len();
        for line in text.lines() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let parsed = match fields.as_slice() {
                [addr, kind, name] if is_type_code(kind) => {
                    parse_hex(addr).map(|a| (a, 0, *name))
                }
                [addr, size, kind, name] if is_type_code(kind) => parse_hex(addr)
                    .zip(parse_hex(size))
                    .map(|(a, s)| (a, s, *name)),
                _ => None,
            };
            match parsed {
                Some((addr, size, name)) => self.add(addr, size, name),
                None if !line.trim().is_empty() => debug!("symbols: skipping '{line}'"),
                None => {}
            }
        }
        self.len() - before
    }
}

impl<'a> IntoIterator for &'a SymbolTable {
    type Item = &'a SymbolEntry;
    type IntoIter = std::slice::Iter<'a, SymbolEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn parse_hex(text: &str) -> Option<u64> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u64::from_str_radix(digits, 16).ok()
}

fn is_type_code(text: &str) -> bool {
    let mut chars = text.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_ascii_alphabetic() || c == '?')
}
