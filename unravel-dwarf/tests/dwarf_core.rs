//! End-to-end tests over a hand-assembled compilation unit: DIE navigation,
//! attribute integration, line program execution, scope walking and
//! expression interning.

mod common;

use common::Enc;
use fallible_iterator::FallibleIterator;
use similar_asserts::assert_eq;

use unravel_common::{
    Architecture, ElfClass, Endian, SectionKind, SimpleRelocType, SliceProvider,
};
use unravel_dwarf::constants::*;
use unravel_dwarf::{Die, Dwarf, DwarfErrorKind};

struct Fixture {
    info: Vec<u8>,
    abbrev: Vec<u8>,
    line: Vec<u8>,
}

fn build_fixture() -> Fixture {
    let mut abbrev = Enc::new();
    // 1: compile_unit, with children.
    abbrev.uleb(1).uleb(DW_TAG_compile_unit.into()).u8(1);
    abbrev.uleb(DW_AT_name.into()).uleb(DW_FORM_string.into());
    abbrev.uleb(DW_AT_comp_dir.into()).uleb(DW_FORM_string.into());
    abbrev.uleb(DW_AT_language.into()).uleb(DW_FORM_data1.into());
    abbrev.uleb(DW_AT_low_pc.into()).uleb(DW_FORM_addr.into());
    abbrev.uleb(DW_AT_high_pc.into()).uleb(DW_FORM_data8.into());
    abbrev.uleb(DW_AT_stmt_list.into()).uleb(DW_FORM_sec_offset.into());
    abbrev.uleb(0).uleb(0);
    // 2: subprogram with children and a sibling shortcut.
    abbrev.uleb(2).uleb(DW_TAG_subprogram.into()).u8(1);
    abbrev.uleb(DW_AT_name.into()).uleb(DW_FORM_string.into());
    abbrev.uleb(DW_AT_low_pc.into()).uleb(DW_FORM_addr.into());
    abbrev.uleb(DW_AT_high_pc.into()).uleb(DW_FORM_data8.into());
    abbrev.uleb(DW_AT_sibling.into()).uleb(DW_FORM_ref4.into());
    abbrev.uleb(0).uleb(0);
    // 3: lexical_block with children.
    abbrev.uleb(3).uleb(DW_TAG_lexical_block.into()).u8(1);
    abbrev.uleb(DW_AT_low_pc.into()).uleb(DW_FORM_addr.into());
    abbrev.uleb(DW_AT_high_pc.into()).uleb(DW_FORM_data8.into());
    abbrev.uleb(0).uleb(0);
    // 4: variable.
    abbrev.uleb(4).uleb(DW_TAG_variable.into()).u8(0);
    abbrev.uleb(DW_AT_name.into()).uleb(DW_FORM_string.into());
    abbrev.uleb(DW_AT_location.into()).uleb(DW_FORM_exprloc.into());
    abbrev.uleb(0).uleb(0);
    // 5: subprogram declaration.
    abbrev.uleb(5).uleb(DW_TAG_subprogram.into()).u8(0);
    abbrev.uleb(DW_AT_name.into()).uleb(DW_FORM_string.into());
    abbrev
        .uleb(DW_AT_declaration.into())
        .uleb(DW_FORM_flag_present.into());
    abbrev.uleb(0).uleb(0);
    // 6: subprogram definition referring to its declaration.
    abbrev.uleb(6).uleb(DW_TAG_subprogram.into()).u8(0);
    abbrev
        .uleb(DW_AT_specification.into())
        .uleb(DW_FORM_ref4.into());
    abbrev.uleb(DW_AT_low_pc.into()).uleb(DW_FORM_addr.into());
    abbrev.uleb(DW_AT_high_pc.into()).uleb(DW_FORM_data8.into());
    abbrev.uleb(0).uleb(0);
    abbrev.uleb(0);

    let mut info = Enc::new();
    let len_at = info.reserve_u32();
    info.u16(4); // version
    info.u32(0); // abbrev offset
    info.u8(8); // address size

    // Root DIE.
    info.uleb(1);
    info.cstr("test.c");
    info.cstr("/src");
    info.u8(DW_LANG_C as u8);
    info.u64(0x40_0000);
    info.u64(0x100);
    info.u32(0); // stmt_list

    // main
    info.uleb(2);
    info.cstr("main");
    info.u64(0x40_0010);
    info.u64(0x40);
    let sibling_at = info.reserve_u32();

    // A lexical block inside main.
    info.uleb(3);
    info.u64(0x40_0020);
    info.u64(0x10);

    // A variable inside the block: fbreg -4.
    info.uleb(4);
    info.cstr("x");
    info.uleb(2).u8(DW_OP_fbreg).u8(0x7c);

    info.uleb(0); // end of block children
    info.uleb(0); // end of main children

    let helper_decl_at = info.pos() as u32;
    info.patch_u32(sibling_at, helper_decl_at);
    info.uleb(5);
    info.cstr("helper");

    info.uleb(6);
    info.u32(helper_decl_at);
    info.u64(0x40_0060);
    info.u64(0x20);

    info.uleb(0); // end of root children

    let total = info.pos() as u32;
    info.patch_u32(len_at, total - 4);

    Fixture {
        info: info.buf,
        abbrev: abbrev.buf,
        line: build_line_program(),
    }
}

fn build_line_program() -> Vec<u8> {
    let mut line = Enc::new();
    let len_at = line.reserve_u32();
    line.u16(2); // version
    let header_len_at = line.reserve_u32();
    let header_start = line.pos();
    line.u8(1); // minimum_instruction_length
    line.u8(1); // default_is_stmt
    line.u8(0xff); // line_base = -1
    line.u8(4); // line_range
    line.u8(13); // opcode_base
    line.bytes(&[0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1]);
    // Directories: one entry beyond the compilation directory.
    line.cstr("inc");
    line.u8(0);
    // Files.
    line.cstr("test.c");
    line.uleb(0).uleb(0).uleb(0);
    line.cstr("util.h");
    line.uleb(1).uleb(0).uleb(0);
    line.u8(0);
    let header_len = (line.pos() - header_start) as u32;
    line.patch_u32(header_len_at, header_len);

    // DW_LNE_set_address 0x401000
    line.u8(0).uleb(9).u8(DW_LNE_set_address).u64(0x40_1000);
    // Special opcode 13 + 2: line += -1 + 2 % 4 = +1, pc += 1 * (2 / 4) = 0.
    line.u8(0x0f);
    // DW_LNE_define_file "z.c" in the compilation directory.
    line.u8(0).uleb(8).u8(DW_LNE_define_file);
    line.cstr("z.c").uleb(0).uleb(0).uleb(0);
    // Advance and copy a second row, then end without DW_LNE_end_sequence.
    line.u8(DW_LNS_advance_pc).uleb(0x10);
    line.u8(DW_LNS_copy);

    let total = line.pos() as u32;
    line.patch_u32(len_at, total - 4);
    line.buf
}

fn provider(fixture: &Fixture) -> SliceProvider<'_> {
    let mut provider = SliceProvider::new(Endian::Little, ElfClass::Class64);
    provider.insert(SectionKind::DebugInfo, &fixture.info);
    provider.insert(SectionKind::DebugAbbrev, &fixture.abbrev);
    provider.insert(SectionKind::DebugLine, &fixture.line);
    provider
}

#[test]
fn unit_header_and_bounds() {
    let fixture = build_fixture();
    let provider = provider(&fixture);
    let dwarf = Dwarf::new(&provider);

    let units: Vec<_> = dwarf.units().collect().unwrap();
    assert_eq!(units.len(), 1);

    let unit = units[0];
    assert_eq!(unit.version(), 4);
    assert_eq!(unit.address_size(), 8);
    assert_eq!(unit.offset_size(), 4);
    assert!(unit.offset() < unit.first_die_offset());
    assert!(unit.first_die_offset() <= unit.end_offset());
    assert_eq!(unit.end_offset(), fixture.info.len() as u64);

    assert!(dwarf.next_unit(unit).unwrap().is_none());
}

#[test]
fn die_navigation_and_sibling_shortcut() {
    let fixture = build_fixture();
    let provider = provider(&fixture);
    let dwarf = Dwarf::new(&provider);
    let unit = dwarf.unit_at(0).unwrap();

    let root = unit.root(&dwarf);
    assert_eq!(root.tag().unwrap(), DW_TAG_compile_unit);
    assert_eq!(root.name().unwrap().unwrap(), "test.c");
    assert!(root.has_children().unwrap());

    let main = root.child().unwrap().unwrap();
    assert_eq!(main.tag().unwrap(), DW_TAG_subprogram);
    assert_eq!(main.name().unwrap().unwrap(), "main");
    assert_eq!(main.low_pc().unwrap(), Some(0x40_0010));
    assert_eq!(main.high_pc().unwrap(), Some(0x40_0050));

    let block = main.child().unwrap().unwrap();
    assert_eq!(block.tag().unwrap(), DW_TAG_lexical_block);
    let var = block.child().unwrap().unwrap();
    assert_eq!(var.tag().unwrap(), DW_TAG_variable);
    assert!(var.sibling().unwrap().is_none());

    // DW_AT_sibling jumps straight over the subtree.
    let helper_decl = main.sibling().unwrap().unwrap();
    assert_eq!(helper_decl.name().unwrap().unwrap(), "helper");
    let helper_def = helper_decl.sibling().unwrap().unwrap();
    assert_eq!(helper_def.tag().unwrap(), DW_TAG_subprogram);
    assert!(helper_def.sibling().unwrap().is_none());

    // The plain lookup misses, the integrated one follows the
    // specification reference.
    assert!(helper_def.attr(DW_AT_name).unwrap().is_none());
    assert_eq!(helper_def.name().unwrap().unwrap(), "helper");
}

#[test]
fn pc_containment() {
    let fixture = build_fixture();
    let provider = provider(&fixture);
    let dwarf = Dwarf::new(&provider);
    let unit = dwarf.unit_at(0).unwrap();
    let main = unit.root(&dwarf).child().unwrap().unwrap();

    assert!(main.has_pc(0x40_0010).unwrap());
    assert!(main.has_pc(0x40_004f).unwrap());
    assert!(!main.has_pc(0x40_0050).unwrap());
    assert!(!main.has_pc(0x40_000f).unwrap());
}

#[test]
fn scope_chain_is_innermost_first() {
    let fixture = build_fixture();
    let provider = provider(&fixture);
    let dwarf = Dwarf::new(&provider);
    let unit = dwarf.unit_at(0).unwrap();

    let scopes = unit.scopes_for_pc(&dwarf, 0x40_0025).unwrap();
    let tags: Vec<u16> = scopes.iter().map(|die| die.tag().unwrap()).collect();
    assert_eq!(
        tags,
        vec![DW_TAG_lexical_block, DW_TAG_subprogram, DW_TAG_compile_unit]
    );

    // Outside the block, the chain starts at the function.
    let scopes = unit.scopes_for_pc(&dwarf, 0x40_0012).unwrap();
    let tags: Vec<u16> = scopes.iter().map(|die| die.tag().unwrap()).collect();
    assert_eq!(tags, vec![DW_TAG_subprogram, DW_TAG_compile_unit]);

    let err = unit.scopes_for_pc(&dwarf, 0x50_0000).unwrap_err();
    assert_eq!(err.kind(), DwarfErrorKind::NoMatch);
}

#[test]
fn function_visitation_skips_declarations() {
    let fixture = build_fixture();
    let provider = provider(&fixture);
    let dwarf = Dwarf::new(&provider);
    let unit = dwarf.unit_at(0).unwrap();

    let mut names = Vec::new();
    unit.for_each_function(&dwarf, |die: Die| {
        names.push(die.name().unwrap().unwrap().into_owned());
        Ok(true)
    })
    .unwrap();
    assert_eq!(names, vec!["main".to_string(), "helper".to_string()]);

    // Early abort after the first hit.
    let mut count = 0;
    unit.for_each_function(&dwarf, |_| {
        count += 1;
        Ok(false)
    })
    .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn line_program_rows_and_files() {
    let fixture = build_fixture();
    let provider = provider(&fixture);
    let dwarf = Dwarf::new(&provider);
    let unit = dwarf.unit_at(0).unwrap();

    let table = unit.line_table(&dwarf).unwrap();

    // Special opcode 0x0f: one row, line bumped from 1 to 2, pc unchanged.
    let rows = table.rows();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].address, 0x40_1000);
    assert_eq!(rows[0].line, 2);
    assert!(rows[0].is_stmt);
    assert!(!rows[0].end_sequence);

    // The producer forgot DW_LNE_end_sequence; the final row is forced.
    assert_eq!(rows[1].address, 0x40_1010);
    assert!(rows[1].end_sequence);

    // File names are joined with their directories; DW_LNE_define_file
    // appends to the table mid-program.
    let names: Vec<&str> = table.files().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["???", "/src/test.c", "inc/util.h", "/src/z.c"]);

    // The table is cached per offset: repeated lookups are pointer-equal.
    assert!(std::ptr::eq(table, unit.line_table(&dwarf).unwrap()));

    let row = table.row_for_pc(0x40_1008).unwrap();
    assert_eq!(row.address, 0x40_1000);
    assert!(table.row_for_pc(0x40_1010).is_none());
    assert!(table.row_for_pc(0x40_0fff).is_none());
}

#[test]
fn location_expressions_intern_pointer_equal() {
    let fixture = build_fixture();
    let provider = provider(&fixture);
    let dwarf = Dwarf::new(&provider);
    let unit = dwarf.unit_at(0).unwrap();

    let var = unit
        .root(&dwarf)
        .child()
        .unwrap()
        .unwrap()
        .child()
        .unwrap()
        .unwrap()
        .child()
        .unwrap()
        .unwrap();

    let attr = var.attr(DW_AT_location).unwrap().unwrap();
    let expr = attr.location().unwrap();
    assert_eq!(expr.ops().len(), 1);
    assert_eq!(expr.ops()[0].op, DW_OP_fbreg);
    assert_eq!(expr.ops()[0].num1, (-4i64) as u64);

    let again = attr.location().unwrap();
    assert!(std::ptr::eq(expr, again));
}

/// A stand-in x86-64 backend.
struct TestArch;

impl Architecture for TestArch {
    fn default_address_size(&self) -> u8 {
        8
    }

    fn register_name(&self, regno: u16) -> Option<&'static str> {
        match regno {
            6 => Some("rbp"),
            7 => Some("rsp"),
            16 => Some("rip"),
            _ => None,
        }
    }

    fn reloc_simple_type(&self, reloc_type: u32) -> Option<SimpleRelocType> {
        // R_X86_64_64 and R_X86_64_32.
        match reloc_type {
            1 => Some(SimpleRelocType::Xword),
            10 => Some(SimpleRelocType::Word),
            _ => None,
        }
    }
}

#[test]
fn architecture_backend_names_registers() {
    let fixture = build_fixture();
    let provider = provider(&fixture);
    let arch = TestArch;
    let dwarf = Dwarf::with_architecture(&provider, &arch);

    assert_eq!(dwarf.register_name(7), Some("rsp"));
    assert_eq!(dwarf.register_name(99), None);
    assert_eq!(arch.reloc_simple_type(1), Some(SimpleRelocType::Xword));
    assert_eq!(arch.reloc_simple_type(42), None);
}

#[test]
fn lookup_errors_populate_the_error_slot() {
    let fixture = build_fixture();
    let provider = provider(&fixture);
    let dwarf = Dwarf::new(&provider);

    assert!(dwarf.last_error().is_none());
    let err = dwarf.unit_at(0x10_0000).unwrap_err();
    assert_eq!(err.kind(), DwarfErrorKind::NotPresent);
    assert_eq!(dwarf.last_error(), Some(DwarfErrorKind::NotPresent));
}
