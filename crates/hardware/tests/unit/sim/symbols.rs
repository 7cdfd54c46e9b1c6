//! Symbol table tests.

use pretty_assertions::assert_eq;
use retrovm_core::sim::SymbolTable;

#[test]
fn zero_size_is_stored_as_one_byte() {
    let mut table = SymbolTable::new();
    table.add(0x8000_0000, 0, "start");
    let (entry, offset) = table.lookup(0x8000_0000).unwrap();
    assert_eq!(entry.size, 1);
    assert_eq!(offset, 0);
    assert!(table.lookup(0x8000_0001).is_none());
}

#[test]
fn most_recent_covering_entry_wins() {
    let mut table = SymbolTable::new();
    table.add(0x1000, 0x100, "outer");
    table.add(0x1040, 0x10, "inner");
    table.add(0x1040, 0x10, "inner_again");

    assert_eq!(table.lookup(0x1044).unwrap().0.name, "inner_again");
    assert_eq!(table.lookup(0x1080).unwrap().0.name, "outer");
    assert_eq!(table.len(), 3);
}

#[test]
fn describe_formats_offsets() {
    let mut table = SymbolTable::new();
    table.add(0x8002_0000, 0x40, "main");
    assert_eq!(table.describe(0x8002_0000).as_deref(), Some("main"));
    assert_eq!(table.describe(0x8002_0010).as_deref(), Some("main+0x10"));
    assert_eq!(table.describe(0x8002_0040), None);
}

#[test]
fn find_by_name_returns_latest() {
    let mut table = SymbolTable::new();
    table.add(0x10, 4, "dup");
    table.add(0x20, 4, "dup");
    assert_eq!(table.find_by_name("dup").unwrap().address, 0x20);
    assert!(table.find_by_name("missing").is_none());
}

#[test]
fn nm_text_is_imported() {
    let text = "\
80020000 T __start
80020040 00000020 t helper
0x80030000 D _data
not a symbol line

80020080 TT bad_type
zzzz T bad_addr
";
    let mut table = SymbolTable::new();
    assert_eq!(table.add_from_nm_text(text), 3);

    let names: Vec<&str> = table.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["__start", "helper", "_data"]);
    assert_eq!(table.find_by_name("helper").unwrap().size, 0x20);
    assert_eq!(table.describe(0x8002_0050).as_deref(), Some("helper+0x10"));
}

#[test]
fn entries_display_as_address_size_name() {
    let mut table = SymbolTable::new();
    table.add(0x8000_0000, 0x10, "main");
    let line = table.iter().next().unwrap().to_string();
    assert_eq!(line, "0000000080000000       10 main");
}
