//! Aggregate size computation over array and typedef DIEs.

mod common;

use common::Enc;

use unravel_common::{ElfClass, Endian, SectionKind, SliceProvider};
use unravel_dwarf::constants::*;
use unravel_dwarf::Dwarf;

fn build_sections() -> (Vec<u8>, Vec<u8>) {
    let mut abbrev = Enc::new();
    // 1: compile_unit with children, language set for the default lower bound.
    abbrev.uleb(1).uleb(DW_TAG_compile_unit.into()).u8(1);
    abbrev.uleb(DW_AT_name.into()).uleb(DW_FORM_string.into());
    abbrev.uleb(DW_AT_language.into()).uleb(DW_FORM_data1.into());
    abbrev.uleb(0).uleb(0);
    // 2: base_type with a direct size.
    abbrev.uleb(2).uleb(DW_TAG_base_type.into()).u8(0);
    abbrev.uleb(DW_AT_byte_size.into()).uleb(DW_FORM_data1.into());
    abbrev.uleb(0).uleb(0);
    // 3: array_type.
    abbrev.uleb(3).uleb(DW_TAG_array_type.into()).u8(1);
    abbrev.uleb(DW_AT_type.into()).uleb(DW_FORM_ref4.into());
    abbrev.uleb(0).uleb(0);
    // 4: subrange with an upper bound.
    abbrev.uleb(4).uleb(DW_TAG_subrange_type.into()).u8(0);
    abbrev.uleb(DW_AT_upper_bound.into()).uleb(DW_FORM_data1.into());
    abbrev.uleb(0).uleb(0);
    // 5: typedef.
    abbrev.uleb(5).uleb(DW_TAG_typedef.into()).u8(0);
    abbrev.uleb(DW_AT_type.into()).uleb(DW_FORM_ref4.into());
    abbrev.uleb(0).uleb(0);
    // 6: subrange with explicit count and byte stride.
    abbrev.uleb(6).uleb(DW_TAG_subrange_type.into()).u8(0);
    abbrev.uleb(DW_AT_count.into()).uleb(DW_FORM_data1.into());
    abbrev.uleb(DW_AT_byte_stride.into()).uleb(DW_FORM_data1.into());
    abbrev.uleb(0).uleb(0);
    abbrev.uleb(0);

    let mut info = Enc::new();
    let len_at = info.reserve_u32();
    info.u16(4);
    info.u32(0);
    info.u8(8);

    info.uleb(1);
    info.cstr("types.c");
    info.u8(DW_LANG_C as u8);

    let int_at = info.pos() as u32;
    info.uleb(2).u8(4);

    // int[10] via an upper bound and the C default lower bound of zero.
    let arr1_at = info.pos() as u32;
    info.uleb(3).u32(int_at);
    info.uleb(4).u8(9);
    info.uleb(0);

    // A typedef of the array delegates to it.
    info.uleb(5).u32(arr1_at);

    // Five elements with an explicit 8-byte stride.
    info.uleb(3).u32(int_at);
    info.uleb(6).u8(5).u8(8);
    info.uleb(0);

    info.uleb(0); // end of root children

    let end = info.pos() as u32;
    info.patch_u32(len_at, end - 4);

    (info.buf, abbrev.buf)
}

#[test]
fn sizes_of_scalars_arrays_and_typedefs() {
    let (info, abbrev) = build_sections();
    let mut provider = SliceProvider::new(Endian::Little, ElfClass::Class64);
    provider.insert(SectionKind::DebugInfo, &info);
    provider.insert(SectionKind::DebugAbbrev, &abbrev);
    let dwarf = Dwarf::new(&provider);
    let unit = dwarf.unit_at(0).unwrap();

    let int = unit.root(&dwarf).child().unwrap().unwrap();
    assert_eq!(int.tag().unwrap(), DW_TAG_base_type);
    assert_eq!(int.aggregate_size().unwrap(), 4);

    let arr1 = int.sibling().unwrap().unwrap();
    assert_eq!(arr1.tag().unwrap(), DW_TAG_array_type);
    assert_eq!(arr1.aggregate_size().unwrap(), 40);

    let typedef = arr1.sibling().unwrap().unwrap();
    assert_eq!(typedef.tag().unwrap(), DW_TAG_typedef);
    assert_eq!(typedef.aggregate_size().unwrap(), 40);

    let arr2 = typedef.sibling().unwrap().unwrap();
    assert_eq!(arr2.tag().unwrap(), DW_TAG_array_type);
    assert_eq!(arr2.aggregate_size().unwrap(), 40);
}
