//! Image loading and symbol bookkeeping.
//!
//! Provides the executable image loader, which fills the address space from
//! a file, and the symbol table the loader fills alongside.

/// Executable image loader (ELF, ECOFF, a.out, S-record, raw, symbol text).
pub mod loader;
/// Symbol table.
pub mod symbols;

pub use loader::{LoadResult, load_image};
pub use symbols::{SymbolEntry, SymbolTable};
