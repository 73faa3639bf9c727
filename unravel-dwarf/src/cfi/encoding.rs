//! `DW_EH_PE_*` encoded pointers.
//!
//! An encoded pointer carries two nibbles: the low one selects the numeric
//! representation, the high one the relative bias applied after reading.

use unravel_common::{Cursor, ElfClass, SectionKind, SectionProvider};

use crate::constants::*;
use crate::error::{DwarfErrorKind, Result};

/// Everything needed to decode an encoded pointer: the data being read, where
/// it is mapped, and who answers relocation and segment-base questions.
pub(crate) struct PointerContext<'data, 'a> {
    pub data: &'data [u8],
    /// Virtual address the data is mapped at; the `pcrel` base.
    pub vaddr: u64,
    /// The `datarel` base. For frame sections this is the data segment; for
    /// `.eh_frame_hdr`-style search tables it is the table's own address.
    pub datarel: u64,
    pub kind: SectionKind,
    pub provider: &'a dyn SectionProvider<'data>,
    pub class: ElfClass,
}

/// The storage size of an encoding, or `None` for the LEB128 forms which
/// have no fixed size.
pub(crate) fn encoded_size(encoding: u8, class: ElfClass) -> Option<u8> {
    if encoding == DW_EH_PE_omit {
        return Some(0);
    }
    match encoding & 0x07 {
        0x00 => Some(class.address_size()),
        0x02 => Some(2),
        0x03 => Some(4),
        0x04 => Some(8),
        _ => None,
    }
}

fn read_with_relocation(
    ctx: &PointerContext<'_, '_>,
    cursor: &mut Cursor<'_>,
    width: u8,
) -> Result<u64> {
    let offset = cursor.pos() as u64;
    let mut value = cursor.read_address(width)?;
    ctx.provider.relocate_address(ctx.kind, offset, &mut value);
    Ok(value)
}

/// Reads one encoded pointer and applies its relative bias.
pub(crate) fn read_encoded(
    ctx: &PointerContext<'_, '_>,
    encoding: u8,
    cursor: &mut Cursor<'_>,
) -> Result<u64> {
    let mut result: u64 = match encoding & 0x70 {
        DW_EH_PE_absptr => 0,
        DW_EH_PE_pcrel => ctx.vaddr.wrapping_add(cursor.pos() as u64),
        DW_EH_PE_textrel => ctx.provider.text_base(),
        DW_EH_PE_datarel => ctx.datarel,
        DW_EH_PE_aligned => {
            let size = encoded_size(encoding, ctx.class)
                .filter(|&size| size > 0)
                .ok_or(DwarfErrorKind::InvalidFormat)?;
            let misalign =
                (ctx.vaddr.wrapping_add(cursor.pos() as u64)) & (u64::from(size) - 1);
            if misalign != 0 {
                cursor.skip((u64::from(size) - misalign) as usize)?;
            }
            0
        }
        _ => return Err(DwarfErrorKind::InvalidFormat.into()),
    };

    let value = match encoding & 0x0f {
        DW_EH_PE_udata2 => u64::from(cursor.read_u16()?),
        DW_EH_PE_sdata2 => cursor.read_i16()? as i64 as u64,
        DW_EH_PE_udata4 => read_with_relocation(ctx, cursor, 4)?,
        DW_EH_PE_sdata4 => read_with_relocation(ctx, cursor, 4)? as u32 as i32 as i64 as u64,
        DW_EH_PE_udata8 | DW_EH_PE_sdata8 => read_with_relocation(ctx, cursor, 8)?,
        DW_EH_PE_absptr => read_with_relocation(ctx, cursor, ctx.class.address_size())?,
        DW_EH_PE_uleb128 => cursor.read_uleb128()?,
        DW_EH_PE_sleb128 => cursor.read_sleb128()? as u64,
        _ => return Err(DwarfErrorKind::InvalidFormat.into()),
    };

    result = result.wrapping_add(value);

    if encoding & DW_EH_PE_indirect != 0 {
        // The decoded value is an address in the loaded image; read through
        // it within the mapped section.
        if result < ctx.vaddr {
            return Err(DwarfErrorKind::InvalidFormat.into());
        }
        let offset = result - ctx.vaddr;
        let width = ctx.class.address_size();
        if ctx.data.len() < width as usize
            || offset > (ctx.data.len() - width as usize) as u64
        {
            return Err(DwarfErrorKind::InvalidFormat.into());
        }
        let mut indirect = Cursor::with_pos(ctx.data, cursor.endian(), offset as usize);
        result = read_with_relocation(ctx, &mut indirect, width)?;
    }

    Ok(result)
}
