//! Cross-unit references: imported units in the scope walk and type units
//! resolved by signature.

mod common;

use common::Enc;

use unravel_common::{ElfClass, Endian, SectionKind, SliceProvider};
use unravel_dwarf::constants::*;
use unravel_dwarf::Dwarf;

const TYPE_SIGNATURE: u64 = 0xdead_beef_1234_5678;

fn build_abbrev() -> Vec<u8> {
    let mut abbrev = Enc::new();
    // 1: compile_unit with children.
    abbrev.uleb(1).uleb(DW_TAG_compile_unit.into()).u8(1);
    abbrev.uleb(DW_AT_name.into()).uleb(DW_FORM_string.into());
    abbrev.uleb(0).uleb(0);
    // 2: imported_unit.
    abbrev.uleb(2).uleb(DW_TAG_imported_unit.into()).u8(0);
    abbrev.uleb(DW_AT_import.into()).uleb(DW_FORM_ref_addr.into());
    abbrev.uleb(0).uleb(0);
    // 3: subprogram with a contiguous range.
    abbrev.uleb(3).uleb(DW_TAG_subprogram.into()).u8(0);
    abbrev.uleb(DW_AT_name.into()).uleb(DW_FORM_string.into());
    abbrev.uleb(DW_AT_low_pc.into()).uleb(DW_FORM_addr.into());
    abbrev.uleb(DW_AT_high_pc.into()).uleb(DW_FORM_data8.into());
    abbrev.uleb(0).uleb(0);
    // 4: variable typed by signature.
    abbrev.uleb(4).uleb(DW_TAG_variable.into()).u8(0);
    abbrev.uleb(DW_AT_name.into()).uleb(DW_FORM_string.into());
    abbrev.uleb(DW_AT_type.into()).uleb(DW_FORM_ref_sig8.into());
    abbrev.uleb(0).uleb(0);
    // 5: type_unit root.
    abbrev.uleb(5).uleb(DW_TAG_type_unit.into()).u8(1);
    abbrev.uleb(0).uleb(0);
    // 6: structure_type with a size.
    abbrev.uleb(6).uleb(DW_TAG_structure_type.into()).u8(0);
    abbrev.uleb(DW_AT_name.into()).uleb(DW_FORM_string.into());
    abbrev.uleb(DW_AT_byte_size.into()).uleb(DW_FORM_data1.into());
    abbrev.uleb(0).uleb(0);
    abbrev.uleb(0);
    abbrev.buf
}

/// CU A imports CU B; the code lives in B.
fn build_info() -> Vec<u8> {
    let mut info = Enc::new();

    // CU A.
    let a_len_at = info.reserve_u32();
    info.u16(4);
    info.u32(0);
    info.u8(8);
    info.uleb(1);
    info.cstr("a.c");
    info.uleb(2);
    let import_at = info.reserve_u32();
    info.uleb(4);
    info.cstr("v");
    info.u64(TYPE_SIGNATURE);
    info.uleb(0); // end of A's children
    let a_end = info.pos() as u32;
    info.patch_u32(a_len_at, a_end - 4);

    // CU B.
    let b_start = info.pos() as u32;
    let b_len_at = info.reserve_u32();
    info.u16(4);
    info.u32(0);
    info.u8(8);
    let b_root = info.pos() as u32;
    info.uleb(1);
    info.cstr("b.c");
    info.uleb(3);
    info.cstr("in_b");
    info.u64(0x50_0000);
    info.u64(0x10);
    info.uleb(0); // end of B's children
    let b_end = info.pos() as u32;
    info.patch_u32(b_len_at, b_end - b_start - 4);

    info.patch_u32(import_at, b_root);
    info.buf
}

fn build_types() -> Vec<u8> {
    let mut types = Enc::new();
    let len_at = types.reserve_u32();
    types.u16(4);
    types.u32(0); // abbrev offset
    types.u8(8);
    types.u64(TYPE_SIGNATURE);
    let type_offset_at = types.reserve_u32();

    types.uleb(5); // type_unit root
    let struct_at = types.pos() as u32;
    types.uleb(6);
    types.cstr("widget");
    types.u8(12);
    types.uleb(0); // end of type_unit children

    let end = types.pos() as u32;
    types.patch_u32(len_at, end - 4);
    types.patch_u32(type_offset_at, struct_at);
    types.buf
}

#[test]
fn scopes_cross_imported_units_transparently() {
    let abbrev = build_abbrev();
    let info = build_info();
    let mut provider = SliceProvider::new(Endian::Little, ElfClass::Class64);
    provider.insert(SectionKind::DebugInfo, &info);
    provider.insert(SectionKind::DebugAbbrev, &abbrev);
    let dwarf = Dwarf::new(&provider);

    let unit_a = dwarf.unit_at(0).unwrap();
    assert_eq!(unit_a.root(&dwarf).name().unwrap().unwrap(), "a.c");

    // The PC lives in B, reached only through A's imported_unit. The chain
    // has no entry for the import itself.
    let scopes = unit_a.scopes_for_pc(&dwarf, 0x50_0005).unwrap();
    let tags: Vec<u16> = scopes.iter().map(|die| die.tag().unwrap()).collect();
    assert_eq!(tags, vec![DW_TAG_subprogram, DW_TAG_compile_unit]);
    assert_eq!(scopes[0].name().unwrap().unwrap(), "in_b");
    assert_eq!(scopes[1].name().unwrap().unwrap(), "a.c");
}

#[test]
fn type_units_resolve_by_signature() {
    let abbrev = build_abbrev();
    let info = build_info();
    let types = build_types();
    let mut provider = SliceProvider::new(Endian::Little, ElfClass::Class64);
    provider.insert(SectionKind::DebugInfo, &info);
    provider.insert(SectionKind::DebugAbbrev, &abbrev);
    provider.insert(SectionKind::DebugTypes, &types);
    let dwarf = Dwarf::new(&provider);

    let tu = dwarf.type_unit_by_signature(TYPE_SIGNATURE).unwrap();
    assert_eq!(tu.type_signature(), Some(TYPE_SIGNATURE));
    let widget = tu.type_die(&dwarf).unwrap();
    assert_eq!(widget.tag().unwrap(), DW_TAG_structure_type);
    assert_eq!(widget.aggregate_size().unwrap(), 12);

    // DW_FORM_ref_sig8 resolves through the type-unit index.
    let unit_a = dwarf.unit_at(0).unwrap();
    let root = unit_a.root(&dwarf);
    let import = root.child().unwrap().unwrap();
    let var = import.sibling().unwrap().unwrap();
    assert_eq!(var.tag().unwrap(), DW_TAG_variable);
    let typ = var.type_die().unwrap().unwrap();
    assert_eq!(typ, widget);
    assert_eq!(typ.name().unwrap().unwrap(), "widget");
}
