//! `.debug_aranges` decoding and PC-to-unit lookup.

mod common;

use common::Enc;

use unravel_common::{ElfClass, Endian, SectionKind, SliceProvider};
use unravel_dwarf::constants::*;
use unravel_dwarf::{Dwarf, DwarfErrorKind};

/// Three minimal units and one aranges set per unit.
fn build_sections() -> (Vec<u8>, Vec<u8>, Vec<u8>) {
    let mut abbrev = Enc::new();
    abbrev.uleb(1).uleb(DW_TAG_compile_unit.into()).u8(0);
    abbrev.uleb(DW_AT_name.into()).uleb(DW_FORM_string.into());
    abbrev.uleb(0).uleb(0);
    abbrev.uleb(0);

    let mut info = Enc::new();
    let mut cu_offsets = Vec::new();
    for name in ["a.c", "b.c", "c.c"] {
        cu_offsets.push(info.pos() as u32);
        let len_at = info.reserve_u32();
        info.u16(4);
        info.u32(0);
        info.u8(8);
        info.uleb(1);
        info.cstr(name);
        let end = info.pos() as u32;
        info.patch_u32(len_at, end - cu_offsets.last().unwrap() - 4);
    }

    let mut aranges = Enc::new();
    let sets = [
        (cu_offsets[0], 0x40_0400u64, 0x20u64),
        (cu_offsets[1], 0x40_0420, 0x10),
        (cu_offsets[2], 0x40_0430, 0x08),
    ];
    for (cu_offset, addr, length) in sets {
        let set_start = aranges.pos();
        let len_at = aranges.reserve_u32();
        aranges.u16(2); // version
        aranges.u32(cu_offset);
        aranges.u8(8); // address size
        aranges.u8(0); // segment size
        while (aranges.pos() - set_start) % 16 != 0 {
            aranges.u8(0);
        }
        aranges.u64(addr).u64(length);
        aranges.u64(0).u64(0);
        let end = aranges.pos();
        aranges.patch_u32(len_at, (end - set_start - 4) as u32);
    }

    (info.buf, abbrev.buf, aranges.buf)
}

#[test]
fn pc_to_unit_lookup() {
    let (info, abbrev, aranges) = build_sections();
    let mut provider = SliceProvider::new(Endian::Little, ElfClass::Class64);
    provider.insert(SectionKind::DebugInfo, &info);
    provider.insert(SectionKind::DebugAbbrev, &abbrev);
    provider.insert(SectionKind::DebugAranges, &aranges);
    let dwarf = Dwarf::new(&provider);

    let name_for_pc = |pc: u64| {
        let unit = dwarf.unit_for_pc(pc)?;
        Ok::<_, unravel_dwarf::DwarfError>(
            unit.root(&dwarf).name()?.unwrap().into_owned(),
        )
    };

    assert_eq!(name_for_pc(0x40_0400).unwrap(), "a.c");
    assert_eq!(name_for_pc(0x40_041f).unwrap(), "a.c");
    assert_eq!(name_for_pc(0x40_0420).unwrap(), "b.c");
    assert_eq!(name_for_pc(0x40_042f).unwrap(), "b.c");
    assert_eq!(name_for_pc(0x40_0430).unwrap(), "c.c");

    let err = name_for_pc(0x40_0438).unwrap_err();
    assert_eq!(err.kind(), DwarfErrorKind::NoMatch);
    assert_eq!(dwarf.last_error(), Some(DwarfErrorKind::NoMatch));

    // Entries come out sorted by address and with positive lengths.
    let entries = dwarf.aranges().unwrap().entries();
    assert_eq!(entries.len(), 3);
    assert!(entries.windows(2).all(|w| w[0].addr <= w[1].addr));
    assert!(entries.iter().all(|a| a.length > 0));
}

#[test]
fn segmented_aranges_are_declined() {
    let mut aranges = Enc::new();
    let len_at = aranges.reserve_u32();
    aranges.u16(2);
    aranges.u32(0);
    aranges.u8(8);
    aranges.u8(4); // non-zero segment size
    let end = aranges.pos();
    aranges.patch_u32(len_at, (end - 4) as u32);

    let mut provider = SliceProvider::new(Endian::Little, ElfClass::Class64);
    provider.insert(SectionKind::DebugAranges, &aranges.buf);
    let dwarf = Dwarf::new(&provider);

    let err = dwarf.aranges().unwrap_err();
    assert_eq!(err.kind(), DwarfErrorKind::InvalidFormat);
}

#[test]
fn missing_aranges_section() {
    let provider = SliceProvider::new(Endian::Little, ElfClass::Class64);
    let dwarf = Dwarf::new(&provider);
    let err = dwarf.unit_for_pc(0x1000).unwrap_err();
    assert_eq!(
        err.kind(),
        DwarfErrorKind::NoDebugInfo(SectionKind::DebugAranges)
    );
}
