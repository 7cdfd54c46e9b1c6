//! Address space unit tests.
//!
//! Verifies region registration rules, access routing to RAM and devices,
//! boundary handling, dirty range tracking and the RAM checksum.

use std::sync::Arc;

use mockall::predicate::eq;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use retrovm_core::common::{BusError, ByteOrder, DeviceFault};
use retrovm_core::soc::devices::{RamDevice, ZeroDevice};
use retrovm_core::soc::interconnect::{AddressSpace, DeviceRegion, DirtyRange};
use retrovm_core::soc::traits::RegionFlags;

use crate::common::mocks::{MockDeviceModel, MockedDevice};
use crate::common::{empty_bus, read_bytes};

fn zero_region(name: &str, base: u64, length: u64) -> DeviceRegion {
    DeviceRegion::new(name, base, length, Box::new(ZeroDevice::new()))
}

fn ram_region(name: &str, base: u64, length: u64) -> DeviceRegion {
    let device = RamDevice::with_len(usize::try_from(length).unwrap());
    let buffer = Arc::clone(device.buffer());
    DeviceRegion::new(name, base, length, Box::new(device))
        .with_flags(RegionFlags::all())
        .with_dyntrans_buffer(buffer)
}

// ══════════════════════════════════════════════════════════
// 1. Registration
// ══════════════════════════════════════════════════════════

#[test]
fn register_rejects_overlap() {
    let mut bus = empty_bus();
    let _ = bus.register(zero_region("a", 0x1000, 0x1000)).unwrap();
    let err = bus.register(zero_region("b", 0x1800, 0x1000)).unwrap_err();
    assert!(matches!(err, BusError::Overlap { ref existing, .. } if existing == "a"));
}

#[test]
fn register_accepts_adjacent_regions() {
    let mut bus = empty_bus();
    let _ = bus.register(zero_region("a", 0x1000, 0x1000)).unwrap();
    let _ = bus.register(zero_region("b", 0x2000, 0x1000)).unwrap();
    let _ = bus.register(zero_region("c", 0x0800, 0x0800)).unwrap();
    let names: Vec<&str> = bus.regions().iter().map(DeviceRegion::name).collect();
    assert_eq!(names, ["c", "a", "b"]);
}

#[test]
fn register_rejects_zero_length() {
    let mut bus = empty_bus();
    let err = bus.register(zero_region("empty", 0x1000, 0)).unwrap_err();
    assert!(matches!(err, BusError::EmptyRegion { .. }));
}

#[test]
fn register_rejects_wrapping_range() {
    let mut bus = AddressSpace::new(u64::MAX);
    let err = bus.register(zero_region("wrap", u64::MAX - 0xf, 0x20)).unwrap_err();
    assert!(matches!(err, BusError::AddressOverflow { .. }));
}

#[test]
fn register_rejects_range_beyond_physical_limit() {
    let mut bus = AddressSpace::new(0x10_0000);
    let err = bus.register(zero_region("high", 0x0f_f000, 0x2000)).unwrap_err();
    assert!(matches!(err, BusError::OutOfRange { .. }));
}

#[test]
fn ids_are_not_reused_after_removal() {
    let mut bus = empty_bus();
    let first = bus.register(zero_region("a", 0x1000, 0x100)).unwrap();
    let removed = bus.remove(first).unwrap();
    assert_eq!(removed.name(), "a");
    let second = bus.register(zero_region("a", 0x1000, 0x100)).unwrap();
    assert_ne!(first, second);
    assert!(matches!(bus.remove(first), Err(BusError::NoSuchRegion(_))));
}

// ══════════════════════════════════════════════════════════
// 2. Routing
// ══════════════════════════════════════════════════════════

#[test]
fn unclaimed_addresses_hit_ram() {
    let mut bus = empty_bus();
    bus.write(0x8000_0000, &[1, 2, 3, 4]).unwrap();
    assert_eq!(read_bytes(&mut bus, 0x8000_0000, 4), [1, 2, 3, 4]);
    assert_eq!(read_bytes(&mut bus, 0x9000_0000, 4), [0, 0, 0, 0]);
}

#[test]
fn device_receives_relative_offsets() {
    let mut model = MockDeviceModel::new();
    let _ = model
        .expect_write()
        .with(eq(0x10), eq(vec![0xde, 0xad, 0xbe, 0xef]))
        .times(1)
        .returning(|_, _| Ok(()));
    let _ = model
        .expect_read()
        .with(eq(0x20), eq(2))
        .times(1)
        .returning(|_, _| Ok(vec![0x12, 0x34]));

    let mut bus = empty_bus();
    let id = bus
        .register(DeviceRegion::new(
            "mock",
            0x1f00_0000,
            0x100,
            Box::new(MockedDevice::new(model, "mock")),
        ))
        .unwrap();

    bus.write(0x1f00_0010, &[0xde, 0xad, 0xbe, 0xef]).unwrap();
    assert_eq!(
        bus.read_word(0x1f00_0020, 2, ByteOrder::Big).unwrap(),
        0x1234
    );
    // RAM underneath the device was never touched.
    assert_eq!(bus.ram().allocated_blocks(), 0);

    drop(bus.remove(id).unwrap());
}

#[test]
fn device_faults_surface_as_bus_errors() {
    let mut model = MockDeviceModel::new();
    let _ = model
        .expect_read()
        .returning(|_, _| Err(DeviceFault("bus timeout".into())));

    let mut bus = empty_bus();
    let _ = bus
        .register(DeviceRegion::new(
            "flaky",
            0x2000,
            0x10,
            Box::new(MockedDevice::new(model, "flaky")),
        ))
        .unwrap();

    let mut buf = [0u8; 4];
    let err = bus.read(0x2004, &mut buf).unwrap_err();
    match err {
        BusError::DeviceFault { region, offset, fault } => {
            assert_eq!(region, "flaky");
            assert_eq!(offset, 4);
            assert_eq!(fault, DeviceFault("bus timeout".into()));
        }
        other => panic!("expected DeviceFault, got {other:?}"),
    }
}

#[test]
fn zero_device_masks_ram() {
    let mut bus = empty_bus();
    bus.write(0x1000, &[0xff; 16]).unwrap();
    let _ = bus.register(zero_region("hole", 0x1000, 0x10)).unwrap();
    assert_eq!(read_bytes(&mut bus, 0x1000, 16), [0u8; 16]);
    bus.write(0x1000, &[0xaa; 16]).unwrap();
    assert_eq!(read_bytes(&mut bus, 0x1000, 16), [0u8; 16]);
}

#[test]
fn region_at_and_removal_restore_ram_routing() {
    let mut bus = empty_bus();
    bus.write(0x4000, &[7]).unwrap();
    let id = bus.register(zero_region("hole", 0x4000, 0x1000)).unwrap();
    assert_eq!(bus.region_at(0x4fff).map(DeviceRegion::name), Some("hole"));
    assert!(bus.region_at(0x5000).is_none());
    assert_eq!(read_bytes(&mut bus, 0x4000, 1), [0]);

    let _ = bus.remove(id).unwrap();
    assert_eq!(read_bytes(&mut bus, 0x4000, 1), [7]);
}

#[test]
fn access_at_physical_limit_is_out_of_range() {
    let mut bus = AddressSpace::new(0x1_0000);
    assert!(bus.write(0xfffc, &[1, 2, 3, 4]).is_ok());
    let err = bus.write(0xfffe, &[1, 2, 3, 4]).unwrap_err();
    assert!(matches!(err, BusError::OutOfRange { addr: 0xfffe, len: 4, limit: 0x1_0000 }));
    let mut buf = [0u8; 1];
    assert!(matches!(bus.read(0x1_0000, &mut buf), Err(BusError::OutOfRange { .. })));
}

#[test]
fn transfers_straddling_a_region_are_rejected() {
    let mut bus = empty_bus();
    let _ = bus.register(zero_region("dev", 0x1000, 0x100)).unwrap();

    // Starts in RAM, ends inside the device.
    let err = bus.write(0x0ffe, &[0; 4]).unwrap_err();
    assert!(matches!(err, BusError::Straddle { ref region, .. } if region == "dev"));

    // Starts inside the device, ends in RAM.
    let mut buf = [0u8; 4];
    let err = bus.read(0x10fe, &mut buf).unwrap_err();
    assert!(matches!(err, BusError::Straddle { .. }));

    // Same access again goes through the last-region hint.
    let err = bus.read(0x10fe, &mut buf).unwrap_err();
    assert!(matches!(err, BusError::Straddle { .. }));
}

#[test]
fn empty_transfers_are_no_ops() {
    let mut bus = AddressSpace::new(0x100);
    bus.write(0x1000, &[]).unwrap();
    bus.read(0x1000, &mut []).unwrap();
}

#[test]
fn sized_accesses_honour_byte_order() {
    let mut bus = empty_bus();
    bus.write_word(0x100, 4, 0x1122_3344, ByteOrder::Big).unwrap();
    assert_eq!(read_bytes(&mut bus, 0x100, 4), [0x11, 0x22, 0x33, 0x44]);
    assert_eq!(bus.read_word(0x100, 4, ByteOrder::Little).unwrap(), 0x4433_2211);
    assert_eq!(bus.read_word(0x100, 2, ByteOrder::Big).unwrap(), 0x1122);
}

// ══════════════════════════════════════════════════════════
// 3. Dirty tracking and direct-access buffers
// ══════════════════════════════════════════════════════════

#[test]
fn writes_widen_the_dirty_range() {
    let mut bus = empty_bus();
    let id = bus.register(ram_region("vram", 0x1000_0000, 0x1000)).unwrap();
    assert_eq!(bus.dirty_range(id).unwrap(), None);

    bus.write(0x1000_0100, &[1; 4]).unwrap();
    bus.write(0x1000_0040, &[2; 2]).unwrap();
    bus.write(0x1000_0080, &[3; 8]).unwrap();
    assert_eq!(
        bus.dirty_range(id).unwrap(),
        Some(DirtyRange { low: 0x40, high: 0x103 })
    );

    assert_eq!(
        bus.take_dirty_range(id).unwrap(),
        Some(DirtyRange { low: 0x40, high: 0x103 })
    );
    assert_eq!(bus.dirty_range(id).unwrap(), None);

    bus.write(0x1000_0ffc, &[4; 4]).unwrap();
    assert_eq!(
        bus.take_dirty_range(id).unwrap(),
        Some(DirtyRange { low: 0xffc, high: 0xfff })
    );
}

#[test]
fn reads_do_not_dirty() {
    let mut bus = empty_bus();
    let id = bus.register(ram_region("vram", 0x1000_0000, 0x1000)).unwrap();
    let _ = read_bytes(&mut bus, 0x1000_0000, 16);
    assert_eq!(bus.dirty_range(id).unwrap(), None);
}

#[test]
fn untracked_regions_stay_clean() {
    let mut bus = empty_bus();
    let id = bus.register(zero_region("hole", 0x1000, 0x100)).unwrap();
    bus.write(0x1000, &[1]).unwrap();
    assert_eq!(bus.dirty_range(id).unwrap(), None);
}

#[test]
fn dyntrans_buffer_exposes_region_memory() {
    let mut bus = empty_bus();
    let _ = bus.register(ram_region("vram", 0x1000_0000, 0x1000)).unwrap();
    bus.write(0x1000_0010, &[0xab, 0xcd]).unwrap();

    let (buffer, offset) = bus.dyntrans_buffer(0x1000_0010).unwrap();
    assert_eq!(offset, 0x10);
    assert_eq!(buffer.to_vec(0x10, 2), [0xab, 0xcd]);

    assert!(bus.dyntrans_buffer(0x2000_0000).is_none());
}

#[test]
fn dyntrans_buffer_requires_the_flag() {
    let mut bus = empty_bus();
    let device = RamDevice::with_len(0x100);
    let buffer = Arc::clone(device.buffer());
    let region =
        DeviceRegion::new("plain", 0x3000, 0x100, Box::new(device)).with_dyntrans_buffer(buffer);
    let _ = bus.register(region).unwrap();
    assert!(bus.dyntrans_buffer(0x3000).is_none());
}

#[test]
fn set_dyntrans_buffer_attaches_and_detaches() {
    let mut bus = empty_bus();
    let device = RamDevice::with_len(0x100);
    let buffer = Arc::clone(device.buffer());
    let region = DeviceRegion::new("late", 0x4000, 0x100, Box::new(device))
        .with_flags(RegionFlags::DYNTRANS_OK);
    let id = bus.register(region).unwrap();
    assert!(bus.dyntrans_buffer(0x4000).is_none());

    bus.set_dyntrans_buffer(id, Some(buffer)).unwrap();
    bus.write(0x4020, &[0x77]).unwrap();
    let (shared, offset) = bus.dyntrans_buffer(0x4020).unwrap();
    assert_eq!(offset, 0x20);
    assert_eq!(shared.to_vec(0x20, 1), [0x77]);

    bus.set_dyntrans_buffer(id, None).unwrap();
    assert!(bus.dyntrans_buffer(0x4020).is_none());
}

#[test]
fn set_dyntrans_buffer_on_a_removed_region_fails() {
    let mut bus = empty_bus();
    let id = bus.register(zero_region("gone", 0x5000, 0x100)).unwrap();
    let _ = bus.remove(id).unwrap();
    let err = bus.set_dyntrans_buffer(id, None).unwrap_err();
    assert!(matches!(err, BusError::NoSuchRegion(_)));
}

// ══════════════════════════════════════════════════════════
// 4. Strings
// ══════════════════════════════════════════════════════════

#[test]
fn read_string_stops_at_nul() {
    let mut bus = empty_bus();
    bus.write(0x8000, b"netbsd\0junk").unwrap();
    assert_eq!(bus.read_string(0x8000, 64).unwrap(), "netbsd");
}

#[test]
fn read_string_stops_at_the_limit() {
    let mut bus = empty_bus();
    bus.write(0x8000, b"bootloader").unwrap();
    assert_eq!(bus.read_string(0x8000, 4).unwrap(), "boot");
    assert_eq!(bus.read_string(0x8000, 0).unwrap(), "");
}

#[test]
fn read_string_crosses_into_a_device() {
    let mut bus = empty_bus();
    let _ = bus.register(zero_region("hole", 0x9004, 0x10)).unwrap();
    bus.write(0x9000, b"abcd").unwrap();
    assert_eq!(bus.read_string(0x9000, 64).unwrap(), "abcd");
}

#[test]
fn read_string_reports_bus_errors() {
    let mut bus = AddressSpace::new(0x1000);
    bus.write(0x0ffe, b"ok").unwrap();
    let err = bus.read_string(0x0ffe, 8).unwrap_err();
    assert!(matches!(err, BusError::OutOfRange { addr: 0x1000, .. }));
}

// ══════════════════════════════════════════════════════════
// 5. Checksum
// ══════════════════════════════════════════════════════════

#[test]
fn checksum_depends_on_contents_only() {
    let mut a = empty_bus();
    a.write(0x8000_0000, &[1, 2, 3]).unwrap();

    let mut b = empty_bus();
    b.write(0x1234_5678, &[9; 64]).unwrap();
    b.write(0x1234_5678, &[0; 64]).unwrap();
    b.write(0x8000_0000, &[1, 2, 3]).unwrap();

    assert_eq!(a.checksum(), b.checksum());
}

#[test]
fn checksum_sees_placement() {
    let mut a = empty_bus();
    a.write(0x8000_0000, &[1]).unwrap();
    let mut b = empty_bus();
    b.write(0x8010_0000, &[1]).unwrap();
    assert_ne!(a.checksum(), b.checksum());
}

// ══════════════════════════════════════════════════════════
// 6. Properties
// ══════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn registered_regions_never_overlap(
        ranges in proptest::collection::vec((0u64..0x1_0000, 1u64..0x2000), 1..16)
    ) {
        let mut bus = empty_bus();
        for (i, (base, len)) in ranges.into_iter().enumerate() {
            let _ = bus.register(zero_region(&format!("r{i}"), base, len));
        }
        let regions = bus.regions();
        for pair in regions.windows(2) {
            prop_assert!(pair[0].end() <= pair[1].base());
        }
    }

    #[test]
    fn every_address_resolves_to_at_most_one_region(
        ranges in proptest::collection::vec((0u64..0x1_0000, 1u64..0x2000), 1..16),
        addr in 0u64..0x1_2000,
    ) {
        let mut bus = empty_bus();
        for (i, (base, len)) in ranges.into_iter().enumerate() {
            let _ = bus.register(zero_region(&format!("r{i}"), base, len));
        }
        let hits = bus.regions().iter().filter(|r| r.contains(addr)).count();
        prop_assert!(hits <= 1);
        prop_assert_eq!(hits == 1, bus.region_at(addr).is_some());
    }

    #[test]
    fn region_claims_exactly_its_range(
        base in 0x4000u64..0x10_0000,
        len in 1u64..0x2000,
        delta in -0x2000i64..0x4000,
    ) {
        let device = RamDevice::with_len(usize::try_from(len).unwrap());
        let buffer = Arc::clone(device.buffer());
        let mut bus = empty_bus();
        let _ = bus.register(DeviceRegion::new("window", base, len, Box::new(device))).unwrap();

        let addr = base.wrapping_add_signed(delta);
        bus.write(addr, &[0xa5]).unwrap();

        if (base..base + len).contains(&addr) {
            let offset = usize::try_from(addr - base).unwrap();
            prop_assert_eq!(buffer.to_vec(offset, 1), vec![0xa5]);
            prop_assert_eq!(bus.ram().allocated_blocks(), 0);
        } else {
            prop_assert!(buffer.is_zeroed());
            let mut byte = [0u8; 1];
            bus.ram().read(addr, &mut byte);
            prop_assert_eq!(byte, [0xa5]);
        }
    }
}
