/// Error formatting and I/O mapping.
pub mod error;
