//! Interpretation of call-frame instructions into unwind rules.
//!
//! Running a CIE's initial instructions followed by an FDE's instructions up
//! to a PC yields one row of the conceptual unwind table: the CFA rule in
//! force plus the recovery rule for every mentioned register.

use std::collections::BTreeMap;

use unravel_common::Cursor;

use super::encoding::read_encoded;
use super::{CallFrameInfo, Cie, Fde};
use crate::constants::*;
use crate::error::{DwarfErrorKind, Result};

/// How the Canonical Frame Address is computed at a location.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CfaRule<'data> {
    /// No CFA rule has been established.
    Undefined,
    /// CFA = value of `register` + `offset`.
    RegisterOffset {
        /// DWARF register number.
        register: u64,
        /// Signed byte offset added to the register value.
        offset: i64,
    },
    /// CFA = result of evaluating a DWARF expression.
    Expression {
        /// The raw expression block.
        block: &'data [u8],
        /// The block's byte offset in the frame section, for interning.
        offset: u64,
    },
}

/// How a register of the previous frame is recovered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterRule<'data> {
    /// Not recoverable; by convention not preserved by the callee.
    Undefined,
    /// The register was not modified.
    SameValue,
    /// Saved at address CFA + offset.
    Offset(i64),
    /// The previous value is CFA + offset itself.
    ValOffset(i64),
    /// The previous value lives in another register.
    Register(u64),
    /// Saved at the address computed by a DWARF expression.
    Expression {
        /// The raw expression block.
        block: &'data [u8],
        /// The block's byte offset in the frame section.
        offset: u64,
    },
    /// The previous value is the result of a DWARF expression.
    ValExpression {
        /// The raw expression block.
        block: &'data [u8],
        /// The block's byte offset in the frame section.
        offset: u64,
    },
}

/// One row of the unwind table: the rules in force for one PC.
#[derive(Clone, Debug)]
pub struct FrameRow<'data> {
    cfa: CfaRule<'data>,
    registers: BTreeMap<u64, RegisterRule<'data>>,
    ra_register: u64,
    signal_frame: bool,
}

impl<'data> FrameRow<'data> {
    /// The CFA rule in force.
    pub fn cfa(&self) -> CfaRule<'data> {
        self.cfa
    }

    /// The recovery rule for `register`. Registers the instructions never
    /// mentioned are undefined.
    pub fn register(&self, register: u64) -> RegisterRule<'data> {
        self.registers
            .get(&register)
            .copied()
            .unwrap_or(RegisterRule::Undefined)
    }

    /// All registers with an explicit rule, in register order.
    pub fn registers(&self) -> impl Iterator<Item = (u64, RegisterRule<'data>)> + '_ {
        self.registers.iter().map(|(&reg, &rule)| (reg, rule))
    }

    /// The column holding the return address.
    pub fn return_address_register(&self) -> u64 {
        self.ra_register
    }

    /// Whether the frame is a signal handler frame.
    pub fn is_signal_frame(&self) -> bool {
        self.signal_frame
    }
}

#[derive(Clone)]
struct RowState<'data> {
    cfa: CfaRule<'data>,
    registers: BTreeMap<u64, RegisterRule<'data>>,
}

impl<'data> CallFrameInfo<'data> {
    /// Computes the unwind rules in force at `pc` within `fde`.
    pub fn row_for(&self, fde: &Fde<'data>, pc: u64) -> Result<FrameRow<'data>> {
        if !fde.contains(pc) {
            return Err(DwarfErrorKind::NoMatch.into());
        }
        let cie = self.cie_at(fde.cie_offset)?;

        let mut state = RowState {
            cfa: CfaRule::Undefined,
            registers: BTreeMap::new(),
        };
        let mut stack = Vec::new();
        let mut loc = fde.start_pc();

        self.execute(
            cie,
            cie.initial_instructions,
            cie.initial_instructions_offset,
            &mut state,
            None,
            &mut loc,
            pc,
            &mut stack,
        )?;
        let initial = state.registers.clone();
        self.execute(
            cie,
            fde.instructions(),
            fde.instructions_offset,
            &mut state,
            Some(&initial),
            &mut loc,
            pc,
            &mut stack,
        )?;

        Ok(FrameRow {
            cfa: state.cfa,
            registers: state.registers,
            ra_register: cie.return_address_register,
            signal_frame: cie.signal_frame,
        })
    }

    /// The CFA rule in force at `pc` within `fde`.
    pub fn cfa_for(&self, fde: &Fde<'data>, pc: u64) -> Result<CfaRule<'data>> {
        Ok(self.row_for(fde, pc)?.cfa)
    }

    #[allow(clippy::too_many_arguments)]
    fn execute(
        &self,
        cie: &Cie<'data>,
        instructions: &'data [u8],
        instructions_offset: u64,
        state: &mut RowState<'data>,
        initial: Option<&BTreeMap<u64, RegisterRule<'data>>>,
        loc: &mut u64,
        pc: u64,
        stack: &mut Vec<RowState<'data>>,
    ) -> Result<()> {
        // Read through a section-positioned cursor so pc-relative encoded
        // pointers in DW_CFA_set_loc resolve correctly.
        let mut cursor =
            Cursor::with_pos(self.section.data, self.endian, instructions_offset as usize);
        let end = instructions_offset as usize + instructions.len();

        let code_align = cie.code_alignment_factor;
        let data_align = cie.data_alignment_factor;

        let restore = |state: &mut RowState<'data>, register: u64| {
            match initial.and_then(|rules| rules.get(&register)) {
                Some(&rule) => state.registers.insert(register, rule),
                None => state.registers.remove(&register),
            };
        };

        macro_rules! advance {
            ($delta:expr) => {{
                let next = loc.wrapping_add($delta);
                if next > pc {
                    return Ok(());
                }
                *loc = next;
            }};
        }

        macro_rules! block {
            () => {{
                let length = cursor.read_uleb128()? as usize;
                let offset = cursor.pos() as u64;
                let block = cursor.read_slice(length)?;
                if cursor.pos() > end {
                    return Err(DwarfErrorKind::InvalidFormat.into());
                }
                (block, offset)
            }};
        }

        while cursor.pos() < end {
            let opcode = cursor.read_u8()?;

            match opcode & 0xc0 {
                DW_CFA_advance_loc => {
                    advance!(u64::from(opcode & 0x3f).wrapping_mul(code_align));
                    continue;
                }
                DW_CFA_offset => {
                    let register = u64::from(opcode & 0x3f);
                    let factored = cursor.read_uleb128()?;
                    state
                        .registers
                        .insert(register, RegisterRule::Offset(factored as i64 * data_align));
                    continue;
                }
                DW_CFA_restore => {
                    restore(state, u64::from(opcode & 0x3f));
                    continue;
                }
                _ => {}
            }

            match opcode {
                DW_CFA_nop => {}
                DW_CFA_set_loc => {
                    let ctx = self.pointer_context();
                    let next = read_encoded(&ctx, cie.fde_encoding, &mut cursor)?;
                    if next > pc {
                        return Ok(());
                    }
                    *loc = next;
                }
                DW_CFA_advance_loc1 => {
                    let delta = u64::from(cursor.read_u8()?);
                    advance!(delta.wrapping_mul(code_align));
                }
                DW_CFA_advance_loc2 => {
                    let delta = u64::from(cursor.read_u16()?);
                    advance!(delta.wrapping_mul(code_align));
                }
                DW_CFA_advance_loc4 => {
                    let delta = u64::from(cursor.read_u32()?);
                    advance!(delta.wrapping_mul(code_align));
                }
                DW_CFA_offset_extended => {
                    let register = cursor.read_uleb128()?;
                    let factored = cursor.read_uleb128()?;
                    state
                        .registers
                        .insert(register, RegisterRule::Offset(factored as i64 * data_align));
                }
                DW_CFA_offset_extended_sf => {
                    let register = cursor.read_uleb128()?;
                    let factored = cursor.read_sleb128()?;
                    state
                        .registers
                        .insert(register, RegisterRule::Offset(factored * data_align));
                }
                DW_CFA_GNU_negative_offset_extended => {
                    let register = cursor.read_uleb128()?;
                    let factored = cursor.read_uleb128()?;
                    state.registers.insert(
                        register,
                        RegisterRule::Offset(-(factored as i64 * data_align)),
                    );
                }
                DW_CFA_val_offset => {
                    let register = cursor.read_uleb128()?;
                    let factored = cursor.read_uleb128()?;
                    state.registers.insert(
                        register,
                        RegisterRule::ValOffset(factored as i64 * data_align),
                    );
                }
                DW_CFA_val_offset_sf => {
                    let register = cursor.read_uleb128()?;
                    let factored = cursor.read_sleb128()?;
                    state
                        .registers
                        .insert(register, RegisterRule::ValOffset(factored * data_align));
                }
                DW_CFA_restore_extended => {
                    let register = cursor.read_uleb128()?;
                    restore(state, register);
                }
                DW_CFA_undefined => {
                    let register = cursor.read_uleb128()?;
                    state.registers.insert(register, RegisterRule::Undefined);
                }
                DW_CFA_same_value => {
                    let register = cursor.read_uleb128()?;
                    state.registers.insert(register, RegisterRule::SameValue);
                }
                DW_CFA_register => {
                    let target = cursor.read_uleb128()?;
                    let source = cursor.read_uleb128()?;
                    state
                        .registers
                        .insert(target, RegisterRule::Register(source));
                }
                DW_CFA_expression => {
                    let register = cursor.read_uleb128()?;
                    let (block, offset) = block!();
                    state
                        .registers
                        .insert(register, RegisterRule::Expression { block, offset });
                }
                DW_CFA_val_expression => {
                    let register = cursor.read_uleb128()?;
                    let (block, offset) = block!();
                    state
                        .registers
                        .insert(register, RegisterRule::ValExpression { block, offset });
                }
                DW_CFA_remember_state => {
                    stack.push(state.clone());
                }
                DW_CFA_restore_state => {
                    *state = stack.pop().ok_or(DwarfErrorKind::InvalidFormat)?;
                }
                DW_CFA_def_cfa => {
                    let register = cursor.read_uleb128()?;
                    let offset = cursor.read_uleb128()? as i64;
                    state.cfa = CfaRule::RegisterOffset { register, offset };
                }
                DW_CFA_def_cfa_sf => {
                    let register = cursor.read_uleb128()?;
                    let factored = cursor.read_sleb128()?;
                    state.cfa = CfaRule::RegisterOffset {
                        register,
                        offset: factored * data_align,
                    };
                }
                DW_CFA_def_cfa_register => {
                    let register = cursor.read_uleb128()?;
                    match state.cfa {
                        CfaRule::RegisterOffset { offset, .. } => {
                            state.cfa = CfaRule::RegisterOffset { register, offset };
                        }
                        _ => return Err(DwarfErrorKind::InvalidFormat.into()),
                    }
                }
                DW_CFA_def_cfa_offset => {
                    let offset = cursor.read_uleb128()? as i64;
                    match state.cfa {
                        CfaRule::RegisterOffset { register, .. } => {
                            state.cfa = CfaRule::RegisterOffset { register, offset };
                        }
                        _ => return Err(DwarfErrorKind::InvalidFormat.into()),
                    }
                }
                DW_CFA_def_cfa_offset_sf => {
                    let factored = cursor.read_sleb128()?;
                    match state.cfa {
                        CfaRule::RegisterOffset { register, .. } => {
                            state.cfa = CfaRule::RegisterOffset {
                                register,
                                offset: factored * data_align,
                            };
                        }
                        _ => return Err(DwarfErrorKind::InvalidFormat.into()),
                    }
                }
                DW_CFA_def_cfa_expression => {
                    let (block, offset) = block!();
                    state.cfa = CfaRule::Expression { block, offset };
                }
                DW_CFA_GNU_args_size => {
                    // Call-site argument size; irrelevant for unwinding here.
                    cursor.read_uleb128()?;
                }
                _ => return Err(DwarfErrorKind::InvalidFormat.into()),
            }
        }

        Ok(())
    }
}
