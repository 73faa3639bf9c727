//! Attribute form decoding.
//!
//! Every supported form either has a fixed size, a size derived from the
//! unit's address/offset sizes, or a ULEB-prefixed variable length. Values
//! can be decoded into [`AttributeValue`] or skipped without materializing.

use unravel_common::{Cursor, SectionKind};

use crate::constants::*;
use crate::error::{DwarfErrorKind, Result};
use crate::reader::Dwarf;
use crate::unit::Unit;

/// A decoded attribute value.
///
/// String and block forms borrow from the owning reader's section data.
/// References are resolved to absolute section offsets; `UnitRef` stays
/// within the attribute's unit while `InfoRef` may cross units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeValue<'data> {
    /// A target address (`DW_FORM_addr`), after relocation.
    Address(u64),
    /// An uninterpreted byte block (`DW_FORM_block*`, `DW_FORM_exprloc`).
    Block(&'data [u8]),
    /// An unsigned constant (`DW_FORM_data*`, `DW_FORM_udata`).
    Udata(u64),
    /// A signed constant (`DW_FORM_sdata`).
    Sdata(i64),
    /// A boolean flag (`DW_FORM_flag`, `DW_FORM_flag_present`).
    Flag(bool),
    /// A string (`DW_FORM_string` inline, `DW_FORM_strp` via `.debug_str`).
    String(&'data [u8]),
    /// An offset into another debug section (`DW_FORM_sec_offset`).
    SecOffset(u64),
    /// A reference within the same unit, as an absolute section offset.
    UnitRef(u64),
    /// A reference anywhere in `.debug_info` (`DW_FORM_ref_addr`).
    InfoRef(u64),
    /// A type-unit signature (`DW_FORM_ref_sig8`).
    TypeSignature(u64),
}

/// Resolves `DW_FORM_indirect` chains: the actual form is a ULEB value read
/// inline before the attribute value.
pub(crate) fn resolve_indirect(cursor: &mut Cursor<'_>, mut form: u16) -> Result<u16> {
    while form == DW_FORM_indirect {
        form = cursor.read_uleb128()? as u16;
    }
    Ok(form)
}

/// Reads an attribute value of the given (already indirect-resolved) form.
pub(crate) fn read_value<'data>(
    cursor: &mut Cursor<'data>,
    dwarf: &Dwarf<'data>,
    unit: &Unit<'data>,
    form: u16,
) -> Result<AttributeValue<'data>> {
    match form {
        DW_FORM_addr => {
            let value_offset = cursor.pos() as u64;
            let mut value = cursor.read_address(unit.address_size())?;
            dwarf
                .provider()
                .relocate_address(unit.section().kind(), value_offset, &mut value);
            Ok(AttributeValue::Address(value))
        }

        DW_FORM_data1 => Ok(AttributeValue::Udata(cursor.read_u8()?.into())),
        DW_FORM_data2 => Ok(AttributeValue::Udata(cursor.read_u16()?.into())),
        DW_FORM_data4 => Ok(AttributeValue::Udata(cursor.read_u32()?.into())),
        DW_FORM_data8 => Ok(AttributeValue::Udata(cursor.read_u64()?)),
        DW_FORM_udata => Ok(AttributeValue::Udata(cursor.read_uleb128()?)),
        DW_FORM_sdata => Ok(AttributeValue::Sdata(cursor.read_sleb128()?)),

        DW_FORM_flag => Ok(AttributeValue::Flag(cursor.read_u8()? != 0)),
        DW_FORM_flag_present => Ok(AttributeValue::Flag(true)),

        DW_FORM_string => Ok(AttributeValue::String(cursor.read_cstr()?)),
        DW_FORM_strp => {
            let offset = cursor.read_offset(unit.offset_size())?;
            let mut strings = dwarf.cursor_at(SectionKind::DebugStr, offset)?;
            Ok(AttributeValue::String(strings.read_cstr()?))
        }

        DW_FORM_block1 => {
            let len = cursor.read_u8()? as usize;
            Ok(AttributeValue::Block(cursor.read_slice(len)?))
        }
        DW_FORM_block2 => {
            let len = cursor.read_u16()? as usize;
            Ok(AttributeValue::Block(cursor.read_slice(len)?))
        }
        DW_FORM_block4 => {
            let len = cursor.read_u32()? as usize;
            Ok(AttributeValue::Block(cursor.read_slice(len)?))
        }
        DW_FORM_block | DW_FORM_exprloc => {
            let len = cursor.read_uleb128()? as usize;
            Ok(AttributeValue::Block(cursor.read_slice(len)?))
        }

        DW_FORM_sec_offset => Ok(AttributeValue::SecOffset(
            cursor.read_offset(unit.offset_size())?,
        )),

        DW_FORM_ref1 => unit_ref(unit, cursor.read_u8()?.into()),
        DW_FORM_ref2 => unit_ref(unit, cursor.read_u16()?.into()),
        DW_FORM_ref4 => unit_ref(unit, cursor.read_u32()?.into()),
        DW_FORM_ref8 => unit_ref(unit, cursor.read_u64()?),
        DW_FORM_ref_udata => unit_ref(unit, cursor.read_uleb128()?),

        DW_FORM_ref_addr => Ok(AttributeValue::InfoRef(
            cursor.read_offset(unit.ref_size())?,
        )),
        DW_FORM_ref_sig8 => Ok(AttributeValue::TypeSignature(cursor.read_u64()?)),

        other => Err(DwarfErrorKind::UnsupportedForm(other).into()),
    }
}

fn unit_ref<'data>(unit: &Unit<'data>, offset: u64) -> Result<AttributeValue<'data>> {
    let absolute = unit.offset() + offset;
    if absolute < unit.first_die_offset() || absolute >= unit.end_offset() {
        return Err(DwarfErrorKind::InvalidFormat.into());
    }
    Ok(AttributeValue::UnitRef(absolute))
}

/// Advances past an attribute value of the given (already indirect-resolved)
/// form without decoding it.
pub(crate) fn skip_value(cursor: &mut Cursor<'_>, unit: &Unit<'_>, form: u16) -> Result<()> {
    let fixed = match form {
        DW_FORM_addr => unit.address_size() as usize,
        DW_FORM_data1 | DW_FORM_ref1 | DW_FORM_flag => 1,
        DW_FORM_data2 | DW_FORM_ref2 => 2,
        DW_FORM_data4 | DW_FORM_ref4 => 4,
        DW_FORM_data8 | DW_FORM_ref8 | DW_FORM_ref_sig8 => 8,
        DW_FORM_strp | DW_FORM_sec_offset => unit.offset_size() as usize,
        DW_FORM_ref_addr => unit.ref_size() as usize,
        DW_FORM_flag_present => 0,

        DW_FORM_udata | DW_FORM_ref_udata => {
            cursor.read_uleb128()?;
            return Ok(());
        }
        DW_FORM_sdata => {
            cursor.read_sleb128()?;
            return Ok(());
        }
        DW_FORM_string => {
            cursor.read_cstr()?;
            return Ok(());
        }
        DW_FORM_block1 => {
            let len = cursor.read_u8()? as usize;
            return cursor.skip(len).map_err(Into::into);
        }
        DW_FORM_block2 => {
            let len = cursor.read_u16()? as usize;
            return cursor.skip(len).map_err(Into::into);
        }
        DW_FORM_block4 => {
            let len = cursor.read_u32()? as usize;
            return cursor.skip(len).map_err(Into::into);
        }
        DW_FORM_block | DW_FORM_exprloc => {
            let len = cursor.read_uleb128()? as usize;
            return cursor.skip(len).map_err(Into::into);
        }

        other => return Err(DwarfErrorKind::UnsupportedForm(other).into()),
    };
    cursor.skip(fixed).map_err(Into::into)
}
