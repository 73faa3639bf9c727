//! Numeric constants from the DWARF 2/3/4 specifications and the GNU
//! exception-handling ABI.
//!
//! Only the constants this crate decodes are listed. Names follow the
//! spelling of the standard so they can be grepped against it.

#![allow(missing_docs)]
#![allow(non_upper_case_globals)]

// DIE tags.
pub const DW_TAG_array_type: u16 = 0x01;
pub const DW_TAG_class_type: u16 = 0x02;
pub const DW_TAG_entry_point: u16 = 0x03;
pub const DW_TAG_enumeration_type: u16 = 0x04;
pub const DW_TAG_lexical_block: u16 = 0x0b;
pub const DW_TAG_member: u16 = 0x0d;
pub const DW_TAG_pointer_type: u16 = 0x0f;
pub const DW_TAG_compile_unit: u16 = 0x11;
pub const DW_TAG_structure_type: u16 = 0x13;
pub const DW_TAG_subroutine_type: u16 = 0x15;
pub const DW_TAG_typedef: u16 = 0x16;
pub const DW_TAG_union_type: u16 = 0x17;
pub const DW_TAG_variant: u16 = 0x19;
pub const DW_TAG_inheritance: u16 = 0x1c;
pub const DW_TAG_module: u16 = 0x1e;
pub const DW_TAG_subrange_type: u16 = 0x21;
pub const DW_TAG_with_stmt: u16 = 0x22;
pub const DW_TAG_base_type: u16 = 0x24;
pub const DW_TAG_catch_block: u16 = 0x25;
pub const DW_TAG_const_type: u16 = 0x26;
pub const DW_TAG_enumerator: u16 = 0x28;
pub const DW_TAG_subprogram: u16 = 0x2e;
pub const DW_TAG_try_block: u16 = 0x32;
pub const DW_TAG_variant_part: u16 = 0x33;
pub const DW_TAG_variable: u16 = 0x34;
pub const DW_TAG_formal_parameter: u16 = 0x05;
pub const DW_TAG_imported_declaration: u16 = 0x08;
pub const DW_TAG_label: u16 = 0x0a;
pub const DW_TAG_reference_type: u16 = 0x10;
pub const DW_TAG_string_type: u16 = 0x12;
pub const DW_TAG_inlined_subroutine: u16 = 0x1d;
pub const DW_TAG_namespace: u16 = 0x39;
pub const DW_TAG_imported_unit: u16 = 0x3d;
pub const DW_TAG_partial_unit: u16 = 0x3c;
pub const DW_TAG_unspecified_type: u16 = 0x3b;
pub const DW_TAG_type_unit: u16 = 0x41;

// Child determination byte in abbreviation declarations.
pub const DW_CHILDREN_no: u8 = 0x00;
pub const DW_CHILDREN_yes: u8 = 0x01;

// Attribute names.
pub const DW_AT_sibling: u32 = 0x01;
pub const DW_AT_location: u32 = 0x02;
pub const DW_AT_name: u32 = 0x03;
pub const DW_AT_byte_size: u32 = 0x0b;
pub const DW_AT_bit_offset: u32 = 0x0c;
pub const DW_AT_bit_size: u32 = 0x0d;
pub const DW_AT_stmt_list: u32 = 0x10;
pub const DW_AT_low_pc: u32 = 0x11;
pub const DW_AT_high_pc: u32 = 0x12;
pub const DW_AT_language: u32 = 0x13;
pub const DW_AT_comp_dir: u32 = 0x1b;
pub const DW_AT_const_value: u32 = 0x1c;
pub const DW_AT_upper_bound: u32 = 0x2f;
pub const DW_AT_producer: u32 = 0x25;
pub const DW_AT_prototyped: u32 = 0x27;
pub const DW_AT_count: u32 = 0x37;
pub const DW_AT_data_member_location: u32 = 0x38;
pub const DW_AT_decl_file: u32 = 0x3a;
pub const DW_AT_decl_line: u32 = 0x3b;
pub const DW_AT_declaration: u32 = 0x3c;
pub const DW_AT_encoding: u32 = 0x3e;
pub const DW_AT_external: u32 = 0x3f;
pub const DW_AT_frame_base: u32 = 0x40;
pub const DW_AT_import: u32 = 0x18;
pub const DW_AT_lower_bound: u32 = 0x22;
pub const DW_AT_abstract_origin: u32 = 0x31;
pub const DW_AT_specification: u32 = 0x47;
pub const DW_AT_static_link: u32 = 0x48;
pub const DW_AT_type: u32 = 0x49;
pub const DW_AT_use_location: u32 = 0x4a;
pub const DW_AT_vtable_elem_location: u32 = 0x4d;
pub const DW_AT_ranges: u32 = 0x55;
pub const DW_AT_return_addr: u32 = 0x2a;
pub const DW_AT_string_length: u32 = 0x19;
pub const DW_AT_entry_pc: u32 = 0x52;
pub const DW_AT_call_file: u32 = 0x58;
pub const DW_AT_call_line: u32 = 0x59;
pub const DW_AT_byte_stride: u32 = 0x51;
pub const DW_AT_bit_stride: u32 = 0x2e;
pub const DW_AT_linkage_name: u32 = 0x6e;
pub const DW_AT_MIPS_linkage_name: u32 = 0x2007;

// Attribute forms.
pub const DW_FORM_addr: u16 = 0x01;
pub const DW_FORM_block2: u16 = 0x03;
pub const DW_FORM_block4: u16 = 0x04;
pub const DW_FORM_data2: u16 = 0x05;
pub const DW_FORM_data4: u16 = 0x06;
pub const DW_FORM_data8: u16 = 0x07;
pub const DW_FORM_string: u16 = 0x08;
pub const DW_FORM_block: u16 = 0x09;
pub const DW_FORM_block1: u16 = 0x0a;
pub const DW_FORM_data1: u16 = 0x0b;
pub const DW_FORM_flag: u16 = 0x0c;
pub const DW_FORM_sdata: u16 = 0x0d;
pub const DW_FORM_strp: u16 = 0x0e;
pub const DW_FORM_udata: u16 = 0x0f;
pub const DW_FORM_ref_addr: u16 = 0x10;
pub const DW_FORM_ref1: u16 = 0x11;
pub const DW_FORM_ref2: u16 = 0x12;
pub const DW_FORM_ref4: u16 = 0x13;
pub const DW_FORM_ref8: u16 = 0x14;
pub const DW_FORM_ref_udata: u16 = 0x15;
pub const DW_FORM_indirect: u16 = 0x16;
pub const DW_FORM_sec_offset: u16 = 0x17;
pub const DW_FORM_exprloc: u16 = 0x18;
pub const DW_FORM_flag_present: u16 = 0x19;
pub const DW_FORM_ref_sig8: u16 = 0x20;

// Source languages.
pub const DW_LANG_C89: u32 = 0x01;
pub const DW_LANG_C: u32 = 0x02;
pub const DW_LANG_Ada83: u32 = 0x03;
pub const DW_LANG_C_plus_plus: u32 = 0x04;
pub const DW_LANG_Cobol74: u32 = 0x05;
pub const DW_LANG_Cobol85: u32 = 0x06;
pub const DW_LANG_Fortran77: u32 = 0x07;
pub const DW_LANG_Fortran90: u32 = 0x08;
pub const DW_LANG_Pascal83: u32 = 0x09;
pub const DW_LANG_Modula2: u32 = 0x0a;
pub const DW_LANG_Java: u32 = 0x0b;
pub const DW_LANG_C99: u32 = 0x0c;
pub const DW_LANG_Ada95: u32 = 0x0d;
pub const DW_LANG_Fortran95: u32 = 0x0e;
pub const DW_LANG_PL1: u32 = 0x0f;
pub const DW_LANG_ObjC: u32 = 0x10;
pub const DW_LANG_ObjC_plus_plus: u32 = 0x11;
pub const DW_LANG_UPC: u32 = 0x12;
pub const DW_LANG_D: u32 = 0x13;

// Line number program: standard opcodes.
pub const DW_LNS_copy: u8 = 0x01;
pub const DW_LNS_advance_pc: u8 = 0x02;
pub const DW_LNS_advance_line: u8 = 0x03;
pub const DW_LNS_set_file: u8 = 0x04;
pub const DW_LNS_set_column: u8 = 0x05;
pub const DW_LNS_negate_stmt: u8 = 0x06;
pub const DW_LNS_set_basic_block: u8 = 0x07;
pub const DW_LNS_const_add_pc: u8 = 0x08;
pub const DW_LNS_fixed_advance_pc: u8 = 0x09;
pub const DW_LNS_set_prologue_end: u8 = 0x0a;
pub const DW_LNS_set_epilogue_begin: u8 = 0x0b;
pub const DW_LNS_set_isa: u8 = 0x0c;

// Line number program: extended opcodes.
pub const DW_LNE_end_sequence: u8 = 0x01;
pub const DW_LNE_set_address: u8 = 0x02;
pub const DW_LNE_define_file: u8 = 0x03;
pub const DW_LNE_set_discriminator: u8 = 0x04;

// Location expression operations.
pub const DW_OP_addr: u8 = 0x03;
pub const DW_OP_deref: u8 = 0x06;
pub const DW_OP_const1u: u8 = 0x08;
pub const DW_OP_const1s: u8 = 0x09;
pub const DW_OP_const2u: u8 = 0x0a;
pub const DW_OP_const2s: u8 = 0x0b;
pub const DW_OP_const4u: u8 = 0x0c;
pub const DW_OP_const4s: u8 = 0x0d;
pub const DW_OP_const8u: u8 = 0x0e;
pub const DW_OP_const8s: u8 = 0x0f;
pub const DW_OP_constu: u8 = 0x10;
pub const DW_OP_consts: u8 = 0x11;
pub const DW_OP_dup: u8 = 0x12;
pub const DW_OP_drop: u8 = 0x13;
pub const DW_OP_over: u8 = 0x14;
pub const DW_OP_pick: u8 = 0x15;
pub const DW_OP_swap: u8 = 0x16;
pub const DW_OP_rot: u8 = 0x17;
pub const DW_OP_xderef: u8 = 0x18;
pub const DW_OP_abs: u8 = 0x19;
pub const DW_OP_and: u8 = 0x1a;
pub const DW_OP_div: u8 = 0x1b;
pub const DW_OP_minus: u8 = 0x1c;
pub const DW_OP_mod: u8 = 0x1d;
pub const DW_OP_mul: u8 = 0x1e;
pub const DW_OP_neg: u8 = 0x1f;
pub const DW_OP_not: u8 = 0x20;
pub const DW_OP_or: u8 = 0x21;
pub const DW_OP_plus: u8 = 0x22;
pub const DW_OP_plus_uconst: u8 = 0x23;
pub const DW_OP_shl: u8 = 0x24;
pub const DW_OP_shr: u8 = 0x25;
pub const DW_OP_shra: u8 = 0x26;
pub const DW_OP_xor: u8 = 0x27;
pub const DW_OP_bra: u8 = 0x28;
pub const DW_OP_eq: u8 = 0x29;
pub const DW_OP_ge: u8 = 0x2a;
pub const DW_OP_gt: u8 = 0x2b;
pub const DW_OP_le: u8 = 0x2c;
pub const DW_OP_lt: u8 = 0x2d;
pub const DW_OP_ne: u8 = 0x2e;
pub const DW_OP_skip: u8 = 0x2f;
pub const DW_OP_lit0: u8 = 0x30;
pub const DW_OP_lit31: u8 = 0x4f;
pub const DW_OP_reg0: u8 = 0x50;
pub const DW_OP_reg31: u8 = 0x6f;
pub const DW_OP_breg0: u8 = 0x70;
pub const DW_OP_breg31: u8 = 0x8f;
pub const DW_OP_regx: u8 = 0x90;
pub const DW_OP_fbreg: u8 = 0x91;
pub const DW_OP_bregx: u8 = 0x92;
pub const DW_OP_piece: u8 = 0x93;
pub const DW_OP_deref_size: u8 = 0x94;
pub const DW_OP_xderef_size: u8 = 0x95;
pub const DW_OP_nop: u8 = 0x96;
pub const DW_OP_push_object_address: u8 = 0x97;
pub const DW_OP_call2: u8 = 0x98;
pub const DW_OP_call4: u8 = 0x99;
pub const DW_OP_call_ref: u8 = 0x9a;
pub const DW_OP_form_tls_address: u8 = 0x9b;
pub const DW_OP_call_frame_cfa: u8 = 0x9c;
pub const DW_OP_bit_piece: u8 = 0x9d;
pub const DW_OP_implicit_value: u8 = 0x9e;
pub const DW_OP_stack_value: u8 = 0x9f;
pub const DW_OP_GNU_push_tls_address: u8 = 0xe0;
pub const DW_OP_GNU_implicit_pointer: u8 = 0xf2;

// Call-frame instructions. The high two bits select the primary opcodes;
// everything else lives in the low six bits.
pub const DW_CFA_advance_loc: u8 = 0x40;
pub const DW_CFA_offset: u8 = 0x80;
pub const DW_CFA_restore: u8 = 0xc0;
pub const DW_CFA_nop: u8 = 0x00;
pub const DW_CFA_set_loc: u8 = 0x01;
pub const DW_CFA_advance_loc1: u8 = 0x02;
pub const DW_CFA_advance_loc2: u8 = 0x03;
pub const DW_CFA_advance_loc4: u8 = 0x04;
pub const DW_CFA_offset_extended: u8 = 0x05;
pub const DW_CFA_restore_extended: u8 = 0x06;
pub const DW_CFA_undefined: u8 = 0x07;
pub const DW_CFA_same_value: u8 = 0x08;
pub const DW_CFA_register: u8 = 0x09;
pub const DW_CFA_remember_state: u8 = 0x0a;
pub const DW_CFA_restore_state: u8 = 0x0b;
pub const DW_CFA_def_cfa: u8 = 0x0c;
pub const DW_CFA_def_cfa_register: u8 = 0x0d;
pub const DW_CFA_def_cfa_offset: u8 = 0x0e;
pub const DW_CFA_def_cfa_expression: u8 = 0x0f;
pub const DW_CFA_expression: u8 = 0x10;
pub const DW_CFA_offset_extended_sf: u8 = 0x11;
pub const DW_CFA_def_cfa_sf: u8 = 0x12;
pub const DW_CFA_def_cfa_offset_sf: u8 = 0x13;
pub const DW_CFA_val_offset: u8 = 0x14;
pub const DW_CFA_val_offset_sf: u8 = 0x15;
pub const DW_CFA_val_expression: u8 = 0x16;
pub const DW_CFA_GNU_args_size: u8 = 0x2e;
pub const DW_CFA_GNU_negative_offset_extended: u8 = 0x2f;

// Encoded-pointer encodings for .eh_frame. The low nibble selects the
// numeric representation, the high nibble the relative bias.
pub const DW_EH_PE_absptr: u8 = 0x00;
pub const DW_EH_PE_uleb128: u8 = 0x01;
pub const DW_EH_PE_udata2: u8 = 0x02;
pub const DW_EH_PE_udata4: u8 = 0x03;
pub const DW_EH_PE_udata8: u8 = 0x04;
pub const DW_EH_PE_sleb128: u8 = 0x09;
pub const DW_EH_PE_sdata2: u8 = 0x0a;
pub const DW_EH_PE_sdata4: u8 = 0x0b;
pub const DW_EH_PE_sdata8: u8 = 0x0c;
pub const DW_EH_PE_pcrel: u8 = 0x10;
pub const DW_EH_PE_textrel: u8 = 0x20;
pub const DW_EH_PE_datarel: u8 = 0x30;
pub const DW_EH_PE_funcrel: u8 = 0x40;
pub const DW_EH_PE_aligned: u8 = 0x50;
pub const DW_EH_PE_indirect: u8 = 0x80;
pub const DW_EH_PE_omit: u8 = 0xff;

/// The canonical CIE discriminator after both 32- and 64-bit forms have been
/// normalized.
pub const CIE_ID: u64 = u64::MAX;
/// The 32-bit CIE discriminator in `.debug_frame`.
pub const CIE_ID_32: u64 = 0xffff_ffff;
