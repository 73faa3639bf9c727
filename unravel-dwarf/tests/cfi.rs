//! CIE/FDE decoding, encoded pointers and unwind-rule interpretation for
//! both `.eh_frame` and `.debug_frame`.

mod common;

use common::Enc;
use fallible_iterator::FallibleIterator;

use unravel_common::{ElfClass, Endian, SectionKind, SliceProvider};
use unravel_dwarf::cfi::{CallFrameInfo, CfaRule, CfiEntry, RegisterRule, SearchTable};
use unravel_dwarf::constants::*;
use unravel_dwarf::{Dwarf, DwarfErrorKind};

const EH_VADDR: u64 = 0x1_0000;
const FDE_START: u64 = 0x1_0100;

/// One CIE with augmentation "zR" (pcrel|sdata4 addresses) and one FDE
/// covering [0x10100, 0x10130) with three CFA rows.
fn build_eh_frame() -> Vec<u8> {
    let mut eh = Enc::new();

    // CIE.
    let cie_len_at = eh.reserve_u32();
    eh.u32(0); // a zero CIE pointer announces a CIE in .eh_frame
    eh.u8(1); // version
    eh.cstr("zR");
    eh.uleb(1); // code alignment
    eh.sleb(-8); // data alignment
    eh.u8(16); // return address register (version 1: one byte)
    eh.uleb(1); // augmentation data size
    eh.u8(DW_EH_PE_pcrel | DW_EH_PE_sdata4);
    // Initial instructions: CFA = r7 + 8, r16 saved at CFA - 8.
    eh.u8(DW_CFA_def_cfa).uleb(7).uleb(8);
    eh.u8(DW_CFA_offset | 16).uleb(1);
    let cie_end = eh.pos();
    eh.patch_u32(cie_len_at, (cie_end - 4) as u32);

    // FDE.
    let fde_start = eh.pos();
    let fde_len_at = eh.reserve_u32();
    let cie_pointer_at = eh.pos();
    eh.u32(cie_pointer_at as u32); // distance back to the CIE at offset 0
    let loc_field_at = eh.pos() as u64;
    eh.i32((FDE_START - (EH_VADDR + loc_field_at)) as i32);
    eh.i32(0x30); // address range, read without the pcrel bias
    eh.uleb(0); // augmentation data length
    eh.u8(DW_CFA_advance_loc | 4);
    eh.u8(DW_CFA_def_cfa_offset).uleb(16);
    eh.u8(DW_CFA_advance_loc | 4);
    // CFA by expression: breg7 + 8.
    eh.u8(DW_CFA_def_cfa_expression).uleb(2).u8(DW_OP_breg0 + 7).u8(8);
    eh.u8(DW_CFA_nop).u8(DW_CFA_nop);
    let fde_end = eh.pos();
    eh.patch_u32(fde_len_at, (fde_end - fde_start - 4) as u32);

    // Section terminator.
    eh.u32(0);
    eh.buf
}

fn eh_provider(eh_frame: &[u8]) -> SliceProvider<'_> {
    let mut provider = SliceProvider::new(Endian::Little, ElfClass::Class64);
    provider.insert_at(SectionKind::EhFrame, EH_VADDR, eh_frame);
    provider
}

#[test]
fn entry_iteration_groks_the_cie() {
    let eh_frame = build_eh_frame();
    let provider = eh_provider(&eh_frame);
    let cfi = CallFrameInfo::new(&provider, SectionKind::EhFrame).unwrap();

    let mut entries = cfi.entries();
    match entries.next().unwrap().unwrap() {
        CfiEntry::Cie(cie) => {
            assert_eq!(cie.version(), 1);
            assert_eq!(cie.code_alignment_factor(), 1);
            assert_eq!(cie.data_alignment_factor(), -8);
            assert_eq!(cie.return_address_register(), 16);
            assert_eq!(cie.fde_encoding(), DW_EH_PE_pcrel | DW_EH_PE_sdata4);
            assert_eq!(cie.lsda_encoding(), DW_EH_PE_omit);
            assert!(!cie.is_signal_frame());
        }
        other => panic!("expected a CIE, got {other:?}"),
    }
    assert!(matches!(
        entries.next().unwrap().unwrap(),
        CfiEntry::Fde(_)
    ));
    assert!(entries.next().unwrap().is_none());
}

#[test]
fn fde_lookup_and_unwind_rows() {
    let eh_frame = build_eh_frame();
    let provider = eh_provider(&eh_frame);
    let cfi = CallFrameInfo::new(&provider, SectionKind::EhFrame).unwrap();

    let fde = cfi.fde_for(0x1_0110).unwrap();
    assert_eq!(fde.start_pc(), FDE_START);
    assert_eq!(fde.end_pc(), FDE_START + 0x30);

    // The interned FDE is reused on the next lookup.
    assert!(std::ptr::eq(fde, cfi.fde_for(0x1_0101).unwrap()));

    // Row 0: the CIE's initial state.
    let row = cfi.row_for(fde, FDE_START).unwrap();
    assert_eq!(
        row.cfa(),
        CfaRule::RegisterOffset {
            register: 7,
            offset: 8
        }
    );
    assert_eq!(row.register(16), RegisterRule::Offset(-8));
    assert_eq!(row.register(3), RegisterRule::Undefined);
    assert_eq!(row.return_address_register(), 16);

    // Row 1: the offset was redefined.
    let row = cfi.row_for(fde, FDE_START + 5).unwrap();
    assert_eq!(
        row.cfa(),
        CfaRule::RegisterOffset {
            register: 7,
            offset: 16
        }
    );

    // Row 2: the CFA comes from an expression; a push-CFA operation is
    // synthesized in front and reinterning is pointer-equal.
    let rule = cfi.cfa_for(fde, FDE_START + 8).unwrap();
    let expr = cfi.cfa_expression(&rule).unwrap();
    assert_eq!(expr.ops()[0].op, DW_OP_call_frame_cfa);
    assert_eq!(expr.ops()[1].op, DW_OP_breg0 + 7);
    assert_eq!(expr.ops()[1].num1, 8);
    assert!(std::ptr::eq(expr, cfi.cfa_expression(&rule).unwrap()));

    // Out of range.
    let err = cfi.row_for(fde, FDE_START + 0x30).unwrap_err();
    assert_eq!(err.kind(), DwarfErrorKind::NoMatch);
    let err = cfi.fde_for(0x1_0000).unwrap_err();
    assert_eq!(err.kind(), DwarfErrorKind::NoMatch);
}

#[test]
fn search_table_lookup() {
    let eh_frame = build_eh_frame();

    // One (initial_pc, fde_pointer) pair in absolute udata8 encoding. The
    // FDE entry starts right after the 22-byte CIE.
    let mut table = Enc::new();
    table.u64(FDE_START);
    table.u64(EH_VADDR + 22);

    let provider = eh_provider(&eh_frame);
    let cfi = CallFrameInfo::with_search_table(
        &provider,
        SectionKind::EhFrame,
        SearchTable {
            encoding: DW_EH_PE_udata8,
            vaddr: 0x2_0000,
            entries: 1,
            data: &table.buf,
        },
    )
    .unwrap();

    let fde = cfi.fde_for(0x1_0120).unwrap();
    assert_eq!(fde.start_pc(), FDE_START);

    let err = cfi.fde_for(0x1_00ff).unwrap_err();
    assert_eq!(err.kind(), DwarfErrorKind::NoMatch);
}

#[test]
fn search_table_pointing_at_a_cie_is_corrupt() {
    let eh_frame = build_eh_frame();

    let mut table = Enc::new();
    table.u64(FDE_START);
    table.u64(EH_VADDR); // offset 0 is the CIE, not an FDE

    let provider = eh_provider(&eh_frame);
    let cfi = CallFrameInfo::with_search_table(
        &provider,
        SectionKind::EhFrame,
        SearchTable {
            encoding: DW_EH_PE_udata8,
            vaddr: 0x2_0000,
            entries: 1,
            data: &table.buf,
        },
    )
    .unwrap();

    let err = cfi.fde_for(0x1_0120).unwrap_err();
    assert_eq!(err.kind(), DwarfErrorKind::InvalidFormat);
}

/// `.debug_frame` differences: the 0xffffffff discriminator, a direct CIE
/// offset in FDEs, and class-sized absolute addresses.
#[test]
fn debug_frame_with_absptr_addresses() {
    let mut df = Enc::new();

    let cie_len_at = df.reserve_u32();
    df.u32(0xffff_ffff); // CIE discriminator in .debug_frame
    df.u8(1);
    df.cstr(""); // no augmentation
    df.uleb(1);
    df.sleb(-4);
    df.u8(8); // return address register
    df.u8(DW_CFA_def_cfa).uleb(7).uleb(8);
    let cie_end = df.pos();
    df.patch_u32(cie_len_at, (cie_end - 4) as u32);

    let fde_start = df.pos();
    let fde_len_at = df.reserve_u32();
    df.u32(0); // CIE offset in .debug_frame
    df.u64(0x40_0000); // initial location, canonicalized to udata8
    df.u64(0x100); // range
    df.u8(DW_CFA_offset | 8).uleb(2);
    df.u8(DW_CFA_nop);
    let fde_end = df.pos();
    df.patch_u32(fde_len_at, (fde_end - fde_start - 4) as u32);

    let mut provider = SliceProvider::new(Endian::Little, ElfClass::Class64);
    provider.insert(SectionKind::DebugFrame, &df.buf);
    let dwarf = Dwarf::new(&provider);

    let cfi = dwarf.call_frame_info().unwrap();
    let fde = cfi.fde_for(0x40_0080).unwrap();
    assert_eq!(fde.start_pc(), 0x40_0000);
    assert_eq!(fde.end_pc(), 0x40_0100);

    let cie = cfi.cie_at(fde.cie_offset()).unwrap();
    assert_eq!(cie.fde_encoding(), DW_EH_PE_udata8);

    let row = cfi.row_for(fde, 0x40_0080).unwrap();
    assert_eq!(
        row.cfa(),
        CfaRule::RegisterOffset {
            register: 7,
            offset: 8
        }
    );
    assert_eq!(row.register(8), RegisterRule::Offset(-8));
    assert_eq!(row.return_address_register(), 8);
}
