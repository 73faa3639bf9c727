//! The `.debug_aranges` address-to-unit index.

use unravel_common::SectionKind;

use crate::error::{DwarfErrorKind, Result};
use crate::reader::Dwarf;

/// One address range pointing back at the compilation unit describing it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Arange {
    /// First address covered.
    pub addr: u64,
    /// Number of bytes covered.
    pub length: u64,
    /// Header offset of the owning compilation unit in `.debug_info`.
    pub cu_offset: u64,
}

/// The decoded `.debug_aranges` index, sorted by address.
#[derive(Clone, Debug, Default)]
pub struct ArangeIndex {
    entries: Vec<Arange>,
}

impl ArangeIndex {
    pub(crate) fn parse(dwarf: &Dwarf<'_>) -> Result<ArangeIndex> {
        let section = dwarf.require_section(SectionKind::DebugAranges)?;
        let mut cursor = dwarf.cursor_at(SectionKind::DebugAranges, 0)?;
        let section_len = section.data.len();

        let mut entries = Vec::new();

        while cursor.pos() < section_len {
            let set_start = cursor.pos();

            let (_, length_bytes) = cursor.read_initial_length()?;

            let version = cursor.read_u16()?;
            if version != 2 {
                return Err(DwarfErrorKind::InvalidFormat.into());
            }

            let cu_offset = cursor.read_offset(length_bytes)?;

            let address_size = cursor.read_u8()?;
            if address_size != 4 && address_size != 8 {
                return Err(DwarfErrorKind::InvalidFormat.into());
            }

            // Segmented addressing is declined.
            let segment_size = cursor.read_u8()?;
            if segment_size != 0 {
                return Err(DwarfErrorKind::InvalidFormat.into());
            }

            // Pairs are aligned to twice the address size, relative to the
            // start of the set header.
            let tuple = 2 * address_size as usize;
            let misalign = (cursor.pos() - set_start) % tuple;
            if misalign != 0 {
                cursor.skip(tuple - misalign)?;
            }

            loop {
                let addr = cursor.read_address(address_size)?;
                let length = cursor.read_address(address_size)?;
                if addr == 0 && length == 0 {
                    break;
                }
                // Zero-length entries cover nothing and would only confuse
                // the binary search.
                if length > 0 {
                    entries.push(Arange {
                        addr,
                        length,
                        cu_offset,
                    });
                }
            }
        }

        let mut sortable: Vec<(usize, Arange)> = entries.into_iter().enumerate().collect();
        dmsort::sort_by_key(&mut sortable, |&(index, ref arange)| (arange.addr, index));
        let entries = sortable.into_iter().map(|(_, arange)| arange).collect();

        Ok(ArangeIndex { entries })
    }

    /// The decoded entries, sorted by address.
    pub fn entries(&self) -> &[Arange] {
        &self.entries
    }

    /// Finds the unit header offset whose range covers `pc`.
    pub fn lookup(&self, pc: u64) -> Option<u64> {
        let idx = self.entries.partition_point(|arange| arange.addr <= pc);
        if idx == 0 {
            return None;
        }
        let arange = &self.entries[idx - 1];
        (pc < arange.addr + arange.length).then_some(arange.cu_offset)
    }
}
