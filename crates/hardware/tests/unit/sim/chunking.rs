//! Chunk sizing tests.

use proptest::prelude::*;
use retrovm_core::common::ByteOrder;
use retrovm_core::sim::SymbolTable;
use retrovm_core::sim::loader::{DEFAULT_MAX_CHUNK, chunk_size, load_image, write_chunked};
use retrovm_core::soc::interconnect::DeviceRegion;
use rstest::rstest;

use crate::common::images::{ElfImage, ElfSegment};
use crate::common::mocks::{MockDeviceModel, MockedDevice};
use crate::common::{create_temp_image, empty_bus, path_of, read_bytes};

#[rstest]
#[case::zero_address(0, 4096, 4096)]
#[case::page_aligned(0x8000_0000, 4096, 4096)]
#[case::sixteen_aligned(0x8000_0010, 4096, 16)]
#[case::odd(0x8000_0003, 4096, 1)]
#[case::cap_below_alignment(0x1000, 512, 512)]
#[case::zero_cap(0x1000, 0, 1)]
#[case::top_bit(1 << 63, 4096, 4096)]
fn chunk_is_alignment_capped(#[case] vaddr: u64, #[case] max: usize, #[case] expected: usize) {
    assert_eq!(chunk_size(vaddr, max), expected);
}

proptest! {
    #[test]
    fn chunk_divides_the_address(vaddr in 1u64..u64::MAX, max in 1usize..0x1_0000) {
        let chunk = chunk_size(vaddr, max);
        prop_assert!(chunk <= max);
        prop_assert!(chunk.is_power_of_two());
        prop_assert_eq!(vaddr % chunk as u64, 0);
    }

    #[test]
    fn chunked_write_matches_a_single_write(
        vaddr in 0u64..0x20_0000,
        data in proptest::collection::vec(any::<u8>(), 0..600),
        max in 1usize..128,
    ) {
        let mut chunked = empty_bus();
        write_chunked(&mut chunked, vaddr, &data, max).unwrap();

        let mut direct = empty_bus();
        direct.write(vaddr, &data).unwrap();

        prop_assert_eq!(read_bytes(&mut chunked, vaddr, data.len()), data);
        prop_assert_eq!(chunked.checksum(), direct.checksum());
    }
}

#[test]
fn loader_writes_segments_in_aligned_chunks() {
    let image = ElfImage::new(false, ByteOrder::Big)
        .entry(0x1_0004)
        .segment(ElfSegment::load(0x1_0004, &[0x5a; 12]))
        .build();
    let file = create_temp_image(&image);

    let mut model = MockDeviceModel::new();
    let _ = model
        .expect_write()
        .withf(|offset, data| data.len() == 4 && offset % 4 == 0 && data.iter().all(|&b| b == 0x5a))
        .times(3)
        .returning(|_, _| Ok(()));
    let mut bus = empty_bus();
    let _ = bus
        .register(DeviceRegion::new(
            "sink",
            0x1_0000,
            0x100,
            Box::new(MockedDevice::new(model, "sink")),
        ))
        .unwrap();

    let mut symbols = SymbolTable::new();
    let result = load_image(&mut bus, &mut symbols, path_of(&file), DEFAULT_MAX_CHUNK).unwrap();
    assert_eq!(result.entry, Some(0x1_0004));
}
