//! `.debug_ranges` walking with base-address selectors.

mod common;

use common::Enc;
use fallible_iterator::FallibleIterator;

use unravel_common::{ElfClass, Endian, SectionKind, SliceProvider};
use unravel_dwarf::constants::*;
use unravel_dwarf::{Dwarf, DwarfErrorKind};

fn build_sections() -> (Vec<u8>, Vec<u8>, Vec<u8>) {
    let mut abbrev = Enc::new();
    abbrev.uleb(1).uleb(DW_TAG_compile_unit.into()).u8(0);
    abbrev.uleb(DW_AT_name.into()).uleb(DW_FORM_string.into());
    abbrev.uleb(DW_AT_ranges.into()).uleb(DW_FORM_sec_offset.into());
    abbrev.uleb(0).uleb(0);
    abbrev.uleb(0);

    let mut info = Enc::new();
    let len_at = info.reserve_u32();
    info.u16(4);
    info.u32(0);
    info.u8(8);
    info.uleb(1);
    info.cstr("scattered.c");
    info.u32(0); // DW_AT_ranges at offset 0
    let end = info.pos() as u32;
    info.patch_u32(len_at, end - 4);

    // A base-address selector, two entries biased by it, a terminator.
    let mut ranges = Enc::new();
    ranges.u64(u64::MAX).u64(0x40_0000);
    ranges.u64(0x10).u64(0x20);
    ranges.u64(0x40).u64(0x48);
    ranges.u64(0).u64(0);

    (info.buf, abbrev.buf, ranges.buf)
}

#[test]
fn base_selector_biases_following_entries() {
    let (info, abbrev, ranges) = build_sections();
    let mut provider = SliceProvider::new(Endian::Little, ElfClass::Class64);
    provider.insert(SectionKind::DebugInfo, &info);
    provider.insert(SectionKind::DebugAbbrev, &abbrev);
    provider.insert(SectionKind::DebugRanges, &ranges);
    let dwarf = Dwarf::new(&provider);
    let unit = dwarf.unit_at(0).unwrap();
    let root = unit.root(&dwarf);

    let got: Vec<(u64, u64)> = root.ranges().unwrap().collect().unwrap();
    assert_eq!(
        got,
        vec![(0x40_0010, 0x40_0020), (0x40_0040, 0x40_0048)]
    );

    // The unit has no base address of its own; the walker notes that in the
    // error slot but still serves the data.
    assert_eq!(dwarf.last_error(), Some(DwarfErrorKind::NotPresent));

    assert!(root.has_pc(0x40_0015).unwrap());
    assert!(root.has_pc(0x40_0040).unwrap());
    assert!(!root.has_pc(0x40_0020).unwrap());
    assert!(!root.has_pc(0x40_0030).unwrap());
    assert!(!root.has_pc(0x40_0048).unwrap());
}

#[test]
fn truncated_range_list_is_invalid() {
    let (info, abbrev, _) = build_sections();
    let mut ranges = Enc::new();
    ranges.u64(0x10); // half a pair

    let mut provider = SliceProvider::new(Endian::Little, ElfClass::Class64);
    provider.insert(SectionKind::DebugInfo, &info);
    provider.insert(SectionKind::DebugAbbrev, &abbrev);
    provider.insert(SectionKind::DebugRanges, &ranges.buf);
    let dwarf = Dwarf::new(&provider);
    let root = dwarf.unit_at(0).unwrap().root(&dwarf);

    let err = root.ranges().unwrap().collect::<Vec<_>>().unwrap_err();
    assert_eq!(err.kind(), DwarfErrorKind::InvalidFormat);
}
