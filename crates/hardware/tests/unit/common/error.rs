//! Error type tests.
//!
//! Verifies user-facing messages and the mapping of I/O failures.

use std::io;

use retrovm_core::common::{BusError, LoadError};

#[test]
fn unexpected_eof_becomes_format_error() {
    let err = LoadError::io("kernel", io::Error::from(io::ErrorKind::UnexpectedEof), "ELF header");
    match err {
        LoadError::Format { reason, .. } => assert_eq!(reason, "truncated ELF header"),
        other => panic!("expected Format, got {other:?}"),
    }
}

#[test]
fn other_io_errors_stay_io() {
    let err = LoadError::io("kernel", io::Error::from(io::ErrorKind::PermissionDenied), "image");
    assert!(matches!(err, LoadError::Io { .. }));
}

#[test]
fn format_error_names_the_path() {
    let err = LoadError::format("/tmp/vmunix", "not an ELF file image");
    assert_eq!(err.to_string(), "/tmp/vmunix: not an ELF file image");
}

#[test]
fn overlap_message_names_both_regions() {
    let err = BusError::Overlap {
        name: "b".into(),
        base: 0x1800,
        end: 0x2800,
        existing: "a".into(),
        existing_base: 0x1000,
        existing_end: 0x2000,
    };
    let text = err.to_string();
    assert!(text.contains("'b'"), "{text}");
    assert!(text.contains("'a'"), "{text}");
    assert!(text.contains("0x1800"), "{text}");
}

#[test]
fn bus_errors_convert_into_load_errors() {
    let err: LoadError = BusError::NoSuchRegion(3).into();
    assert!(matches!(err, LoadError::Bus(BusError::NoSuchRegion(3))));
}
