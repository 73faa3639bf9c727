//! Interning of DWARF location expressions.
//!
//! Expressions are not evaluated here. A block of expression bytes is decoded
//! once into a normalized operation vector, cached by the block's position in
//! its section, and handed out by reference: repeated lookups for the same
//! block return the same interned value.

use elsa::FrozenMap;
use unravel_common::{Cursor, Endian, SectionKind, SectionProvider};

use crate::constants::*;
use crate::die::Attribute;
use crate::error::{DwarfErrorKind, Result};
use crate::unit::{expr_key, ExprKey};

/// One normalized expression operation.
///
/// The operand meaning depends on `op`; signed operands are stored
/// sign-extended in `num1`/`num2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Operation {
    /// The opcode (`DW_OP_*`).
    pub op: u8,
    /// First operand, if any.
    pub num1: u64,
    /// Second operand, if any.
    pub num2: u64,
    /// Byte offset of the opcode within its block. Synthesized operations
    /// use `u64::MAX`.
    pub offset: u64,
}

/// An interned expression: the operation vector plus the raw blocks of any
/// `DW_OP_implicit_value` operations.
#[derive(Debug)]
pub struct Expression<'data> {
    ops: Vec<Operation>,
    implicit: Vec<(usize, &'data [u8])>,
}

impl<'data> Expression<'data> {
    /// The operations in source order.
    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    /// The raw value block of the `DW_OP_implicit_value` at operation index
    /// `index`, if that operation is one.
    pub fn implicit_value(&self, index: usize) -> Option<&'data [u8]> {
        self.implicit
            .iter()
            .find(|&&(op_index, _)| op_index == index)
            .map(|&(_, block)| block)
    }
}

/// The operand shape of an opcode. Decoding dispatches on the shape so each
/// group is read by one small piece of code.
enum Shape {
    NoOperand,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    Uleb,
    Sleb,
    UlebUleb,
    UlebSleb,
    Addr,
    Ref,
    RefUleb,
    Block,
}

fn shape(op: u8) -> Option<Shape> {
    Some(match op {
        DW_OP_addr => Shape::Addr,
        DW_OP_call_ref => Shape::Ref,
        DW_OP_GNU_implicit_pointer => Shape::RefUleb,

        DW_OP_deref
        | DW_OP_dup
        | DW_OP_drop
        | DW_OP_over
        | DW_OP_swap
        | DW_OP_rot
        | DW_OP_xderef
        | DW_OP_abs
        | DW_OP_and
        | DW_OP_div
        | DW_OP_minus
        | DW_OP_mod
        | DW_OP_mul
        | DW_OP_neg
        | DW_OP_not
        | DW_OP_or
        | DW_OP_plus
        | DW_OP_shl
        | DW_OP_shr
        | DW_OP_shra
        | DW_OP_xor
        | DW_OP_eq
        | DW_OP_ge
        | DW_OP_gt
        | DW_OP_le
        | DW_OP_lt
        | DW_OP_ne
        | DW_OP_lit0..=DW_OP_lit31
        | DW_OP_reg0..=DW_OP_reg31
        | DW_OP_nop
        | DW_OP_push_object_address
        | DW_OP_call_frame_cfa
        | DW_OP_form_tls_address
        | DW_OP_GNU_push_tls_address
        | DW_OP_stack_value => Shape::NoOperand,

        DW_OP_const1u | DW_OP_pick | DW_OP_deref_size | DW_OP_xderef_size => Shape::U8,
        DW_OP_const1s => Shape::I8,
        DW_OP_const2u => Shape::U16,
        DW_OP_const2s | DW_OP_skip | DW_OP_bra | DW_OP_call2 => Shape::I16,
        DW_OP_const4u => Shape::U32,
        DW_OP_const4s | DW_OP_call4 => Shape::I32,
        DW_OP_const8u => Shape::U64,
        DW_OP_const8s => Shape::I64,

        DW_OP_constu | DW_OP_plus_uconst | DW_OP_regx | DW_OP_piece => Shape::Uleb,
        DW_OP_consts | DW_OP_breg0..=DW_OP_breg31 | DW_OP_fbreg => Shape::Sleb,
        DW_OP_bregx => Shape::UlebSleb,
        DW_OP_bit_piece => Shape::UlebUleb,
        DW_OP_implicit_value => Shape::Block,

        _ => return None,
    })
}

/// Decodes and interns one expression block.
///
/// `block_offset` is the block's byte offset within `section`; together they
/// key the cache so that re-interning the same block returns the same
/// reference. With `for_cfi`, a synthetic push-CFA operation is prepended
/// and `DW_OP_implicit_value` is rejected; with `value`, a synthetic
/// `DW_OP_stack_value` is appended.
#[allow(clippy::too_many_arguments)]
pub(crate) fn intern_expression<'data, 'a>(
    endian: Endian,
    provider: &dyn SectionProvider<'data>,
    cache: &'a FrozenMap<ExprKey, Box<Expression<'data>>>,
    block: &'data [u8],
    section: SectionKind,
    block_offset: u64,
    address_size: u8,
    ref_size: u8,
    for_cfi: bool,
    value: bool,
) -> Result<&'a Expression<'data>> {
    let key = expr_key(section, block_offset);
    if let Some(existing) = cache.get(&key) {
        if value {
            debug_assert_eq!(existing.ops.last().map(|op| op.op), Some(DW_OP_stack_value));
        }
        return Ok(existing);
    }

    let mut cursor = Cursor::new(block, endian);
    let mut ops = Vec::new();
    let mut implicit = Vec::new();

    if for_cfi {
        // The CFA is on the stack before a CFI expression runs.
        ops.push(Operation {
            op: DW_OP_call_frame_cfa,
            num1: 0,
            num2: 0,
            offset: u64::MAX,
        });
    }

    while !cursor.is_empty() {
        let offset = cursor.pos() as u64;
        let op = cursor.read_u8()?;
        let mut num1 = 0u64;
        let mut num2 = 0u64;

        match shape(op).ok_or(DwarfErrorKind::InvalidFormat)? {
            Shape::NoOperand => {}
            Shape::U8 => num1 = cursor.read_u8()?.into(),
            Shape::I8 => num1 = cursor.read_u8()? as i8 as i64 as u64,
            Shape::U16 => num1 = cursor.read_u16()?.into(),
            Shape::I16 => num1 = cursor.read_i16()? as i64 as u64,
            Shape::U32 => num1 = cursor.read_u32()?.into(),
            Shape::I32 => num1 = cursor.read_i32()? as i64 as u64,
            Shape::U64 => num1 = cursor.read_u64()?,
            Shape::I64 => num1 = cursor.read_i64()? as u64,
            Shape::Uleb => num1 = cursor.read_uleb128()?,
            Shape::Sleb => num1 = cursor.read_sleb128()? as u64,
            Shape::UlebUleb => {
                num1 = cursor.read_uleb128()?;
                num2 = cursor.read_uleb128()?;
            }
            Shape::UlebSleb => {
                num1 = cursor.read_uleb128()?;
                num2 = cursor.read_sleb128()? as u64;
            }
            Shape::Addr => {
                // May participate in relocation at its section position.
                let value_offset = block_offset + cursor.pos() as u64;
                num1 = cursor.read_address(address_size)?;
                provider.relocate_address(section, value_offset, &mut num1);
            }
            Shape::Ref => num1 = cursor.read_offset(ref_size)?,
            Shape::RefUleb => {
                num1 = cursor.read_offset(ref_size)?;
                num2 = cursor.read_uleb128()?;
            }
            Shape::Block => {
                if for_cfi {
                    // Implicit values cannot appear in a CFA expression.
                    return Err(DwarfErrorKind::InvalidFormat.into());
                }
                num1 = cursor.read_uleb128()?;
                num2 = cursor.pos() as u64;
                let data = cursor.read_slice(num1 as usize)?;
                implicit.push((ops.len(), data));
            }
        }

        ops.push(Operation {
            op,
            num1,
            num2,
            offset,
        });
    }

    if ops.is_empty() {
        // Only a CFI CFA expression may be empty.
        return Err(DwarfErrorKind::InvalidFormat.into());
    }

    if value {
        ops.push(Operation {
            op: DW_OP_stack_value,
            num1: 0,
            num2: 0,
            offset: block.len() as u64,
        });
    }

    Ok(cache.insert(key, Box::new(Expression { ops, implicit })))
}

/// The attributes whose values are location expressions or location lists.
fn is_location_attr(code: u32) -> bool {
    matches!(
        code,
        DW_AT_location
            | DW_AT_data_member_location
            | DW_AT_vtable_elem_location
            | DW_AT_string_length
            | DW_AT_use_location
            | DW_AT_frame_base
            | DW_AT_return_addr
            | DW_AT_static_link
    )
}

impl<'data, 'a> Attribute<'data, 'a> {
    /// Interns the single location expression of this attribute.
    ///
    /// `DW_AT_data_member_location` constants are normalized to a one-op
    /// `DW_OP_plus_uconst` expression. For attributes holding a location
    /// *list*, use [`locations_at`](Self::locations_at).
    pub fn location(&self) -> Result<&'a Expression<'data>> {
        let dwarf = self.die().dwarf();
        let unit = self.die().unit();

        if !is_location_attr(self.code()) {
            return Err(dwarf.record(DwarfErrorKind::NotPresent));
        }

        if let Some(expr) = self.constant_offset_location()? {
            return Ok(expr);
        }

        let (block_offset, block) = self.block_in_section()?;
        intern_expression(
            dwarf.endian(),
            dwarf.provider(),
            &unit.exprs,
            block,
            unit.section().kind(),
            block_offset,
            unit.address_size(),
            unit.ref_size(),
            false,
            false,
        )
        .map_err(|e| dwarf.record(e))
    }

    /// The block value of this attribute together with its absolute byte
    /// offset in the unit's section.
    fn block_in_section(&self) -> Result<(u64, &'data [u8])> {
        let dwarf = self.die().dwarf();
        let mut cursor = dwarf.cursor_at(self.die().unit().section().kind(), self.value_offset())?;
        let length = match self.form() {
            DW_FORM_block1 => cursor.read_u8()? as usize,
            DW_FORM_block2 => cursor.read_u16()? as usize,
            DW_FORM_block4 => cursor.read_u32()? as usize,
            DW_FORM_block | DW_FORM_exprloc => cursor.read_uleb128()? as usize,
            _ => return Err(dwarf.record(DwarfErrorKind::InvalidFormat)),
        };
        let offset = cursor.pos() as u64;
        Ok((offset, cursor.read_slice(length)?))
    }

    /// Interns the location expressions covering `pc`.
    ///
    /// For a block-form attribute this is the single expression regardless
    /// of `pc`; for a list-form attribute the `.debug_loc` list is walked
    /// with base-address selectors applied.
    pub fn locations_at(&self, pc: u64) -> Result<Vec<&'a Expression<'data>>> {
        let dwarf = self.die().dwarf();
        let unit = self.die().unit();

        if !is_location_attr(self.code()) {
            return Err(dwarf.record(DwarfErrorKind::NotPresent));
        }

        if let Some(expr) = self.constant_offset_location()? {
            return Ok(vec![expr]);
        }

        if let crate::forms::AttributeValue::Block(_) = self.value()? {
            return Ok(vec![self.location()?]);
        }

        // A location list in .debug_loc.
        let list_offset = self.sec_offset()?;
        let mut cursor = dwarf.cursor_at(SectionKind::DebugLoc, list_offset)?;
        let width = unit.address_size();
        let mut base: Option<u64> = None;
        let mut found = Vec::new();

        loop {
            if cursor.remaining() < 2 * width as usize {
                return Err(dwarf.record(DwarfErrorKind::InvalidFormat));
            }
            let (begin, begin_rel) =
                crate::ranges::read_relocatable(dwarf, &mut cursor, SectionKind::DebugLoc, width)?;
            let (end, end_rel) =
                crate::ranges::read_relocatable(dwarf, &mut cursor, SectionKind::DebugLoc, width)?;

            let escape = if width == 8 {
                u64::MAX
            } else {
                u64::from(u32::MAX)
            };
            if begin == escape && !begin_rel {
                base = Some(end);
                continue;
            }
            if begin == 0 && end == 0 && !begin_rel && !end_rel {
                break;
            }

            let length = cursor.read_u16()?;
            let block_offset = cursor.pos() as u64;
            let block = cursor.read_slice(length as usize)?;

            let base = match base {
                Some(base) => base,
                None => {
                    // Buggy producers use absolute addresses with no base.
                    let fetched = unit.base_address(dwarf).unwrap_or(0);
                    base = Some(fetched);
                    fetched
                }
            };

            if pc >= base.wrapping_add(begin) && pc < base.wrapping_add(end) {
                let expr = intern_expression(
                    dwarf.endian(),
                    dwarf.provider(),
                    &unit.exprs,
                    block,
                    SectionKind::DebugLoc,
                    block_offset,
                    unit.address_size(),
                    unit.ref_size(),
                    false,
                    false,
                )
                .map_err(|e| dwarf.record(e))?;
                found.push(expr);
            }
        }

        Ok(found)
    }

    /// `DW_AT_data_member_location` constants become a synthesized
    /// `DW_OP_plus_uconst`, cached by the attribute's own position.
    fn constant_offset_location(&self) -> Result<Option<&'a Expression<'data>>> {
        if self.code() != DW_AT_data_member_location {
            return Ok(None);
        }
        match self.form() {
            DW_FORM_data1 | DW_FORM_data2 | DW_FORM_data4 | DW_FORM_data8 | DW_FORM_sdata
            | DW_FORM_udata => {}
            _ => return Ok(None),
        }

        let dwarf = self.die().dwarf();
        let unit = self.die().unit();
        let key = expr_key(unit.section().kind(), self.value_offset());
        if let Some(existing) = unit.exprs.get(&key) {
            return Ok(Some(existing));
        }

        let offset = self.udata()?;
        let expr = Expression {
            ops: vec![Operation {
                op: DW_OP_plus_uconst,
                num1: offset,
                num2: 0,
                offset: 0,
            }],
            implicit: Vec::new(),
        };
        Ok(Some(unit.exprs.insert(key, Box::new(expr))))
    }
}
