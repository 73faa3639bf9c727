//! PC range enumeration for DIEs, contiguous or via `.debug_ranges`.

use fallible_iterator::FallibleIterator;
use tracing::warn;
use unravel_common::{Cursor, SectionKind};

use crate::constants::*;
use crate::die::Die;
use crate::error::{DwarfError, DwarfErrorKind, Result};
use crate::reader::Dwarf;

/// Reads an address-sized value and reports whether a relocation was applied
/// to it.
pub(crate) fn read_relocatable(
    dwarf: &Dwarf<'_>,
    cursor: &mut Cursor<'_>,
    kind: SectionKind,
    width: u8,
) -> Result<(u64, bool)> {
    let offset = cursor.pos() as u64;
    let mut value = cursor.read_address(width)?;
    let relocated = dwarf.provider().relocate_address(kind, offset, &mut value);
    Ok((value, relocated))
}

/// Outcome of reading one `(begin, end)` pair from a range or location list.
pub(crate) enum Pair {
    /// A normal entry, already biased by the current base address.
    Range(u64, u64),
    /// A base-address selector; the base has been updated.
    Base,
    /// The end-of-list terminator.
    End,
}

/// Reads one list entry, updating `base` for selector entries.
///
/// The all-ones escape selects a new base address when the begin word is
/// unrelocated, even if the relocator is silent about the whole object; a
/// pair of unrelocated zeros terminates the list. Relocated values that
/// merely collide with those bit patterns are served as ordinary ranges.
pub(crate) fn read_begin_end_pair(
    dwarf: &Dwarf<'_>,
    cursor: &mut Cursor<'_>,
    kind: SectionKind,
    width: u8,
    base: &mut u64,
) -> Result<Pair> {
    let escape = if width == 8 {
        u64::MAX
    } else {
        u64::from(u32::MAX)
    };

    if cursor.remaining() < 2 * width as usize {
        return Err(DwarfErrorKind::InvalidFormat.into());
    }

    let (begin, begin_relocated) = read_relocatable(dwarf, cursor, kind, width)?;
    let (end, end_relocated) = read_relocatable(dwarf, cursor, kind, width)?;

    if begin == escape && !begin_relocated {
        if end == escape {
            return Err(DwarfErrorKind::InvalidFormat.into());
        }
        *base = end;
        return Ok(Pair::Base);
    }

    if begin == 0 && end == 0 && !begin_relocated && !end_relocated {
        return Ok(Pair::End);
    }

    // Serve the entry even if only one side was relocated; the data may be
    // buggy but it is the caller's to judge.
    Ok(Pair::Range(base.wrapping_add(begin), base.wrapping_add(end)))
}

enum RangesState<'data> {
    /// A single contiguous `[low, high)` range from the DIE itself.
    Contiguous(Option<(u64, u64)>),
    /// Walking a `.debug_ranges` list.
    List { cursor: Cursor<'data>, base: u64 },
    /// Nothing (left) to yield.
    Done,
}

/// An iterator over the half-open PC ranges of one DIE.
pub struct RangesIter<'data, 'a> {
    dwarf: &'a Dwarf<'data>,
    width: u8,
    state: RangesState<'data>,
}

impl<'data, 'a> FallibleIterator for RangesIter<'data, 'a> {
    type Item = (u64, u64);
    type Error = DwarfError;

    fn next(&mut self) -> Result<Option<(u64, u64)>> {
        match &mut self.state {
            RangesState::Contiguous(range) => {
                let range = range.take();
                self.state = RangesState::Done;
                Ok(range)
            }
            RangesState::List { cursor, base } => loop {
                match read_begin_end_pair(
                    self.dwarf,
                    cursor,
                    SectionKind::DebugRanges,
                    self.width,
                    base,
                )
                .map_err(|e| self.dwarf.record(e))?
                {
                    Pair::Range(begin, end) => return Ok(Some((begin, end))),
                    Pair::Base => continue,
                    Pair::End => {
                        self.state = RangesState::Done;
                        return Ok(None);
                    }
                }
            },
            RangesState::Done => Ok(None),
        }
    }
}

impl<'data, 'a> Die<'data, 'a> {
    /// Iterates the PC ranges of this DIE.
    ///
    /// A DIE with `DW_AT_low_pc`/`DW_AT_high_pc` yields that single range;
    /// a `DW_AT_ranges` list is walked with base-address selectors applied.
    /// A DIE without address attributes yields nothing.
    pub fn ranges(&self) -> Result<RangesIter<'data, 'a>> {
        let dwarf = self.dwarf();
        let unit = self.unit();

        // Usually there is a single contiguous range.
        if let (Some(low), Some(high)) = (self.low_pc()?, self.high_pc()?) {
            return Ok(RangesIter {
                dwarf,
                width: unit.address_size(),
                state: RangesState::Contiguous(Some((low, high))),
            });
        }

        let attr = match self.attr(DW_AT_ranges)? {
            Some(attr) => attr,
            None => {
                return Ok(RangesIter {
                    dwarf,
                    width: unit.address_size(),
                    state: RangesState::Done,
                })
            }
        };
        let offset = attr.sec_offset()?;
        let cursor = dwarf.cursor_at(SectionKind::DebugRanges, offset)?;

        let base = match unit.base_address(dwarf) {
            Ok(base) => base,
            Err(_) => {
                // Buggy producers omit the base when the list uses absolute
                // addresses. Serve the data anyway, but leave a trace.
                warn!(
                    unit = unit.offset(),
                    "range list without a unit base address"
                );
                dwarf.note(DwarfErrorKind::NotPresent);
                0
            }
        };

        Ok(RangesIter {
            dwarf,
            width: unit.address_size(),
            state: RangesState::List { cursor, base },
        })
    }

    /// Whether any PC range of this DIE contains `pc`.
    pub fn has_pc(&self, pc: u64) -> Result<bool> {
        self.ranges()?.any(|(begin, end)| Ok(pc >= begin && pc < end))
    }
}
