//! The per-unit abbreviation cache.
//!
//! Abbreviation tables are decoded incrementally: a lookup that misses the
//! unit's hash scans `.debug_abbrev` forward from the last position, interning
//! every declaration it passes so later lookups are O(1). A declaration with
//! code zero terminates the table.

use unravel_common::Cursor;

use crate::constants;
use crate::error::{DwarfErrorKind, Result};
use crate::reader::Dwarf;
use crate::unit::Unit;

/// One `(attribute, form)` pair of an abbreviation declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttrSpec {
    /// The attribute name code (`DW_AT_*`).
    pub attr: u32,
    /// The attribute form code (`DW_FORM_*`).
    pub form: u16,
}

/// One abbreviation declaration, keyed uniquely by code within its unit.
#[derive(Clone, Debug)]
pub struct Abbrev {
    code: u64,
    tag: u16,
    has_children: bool,
    attrs: Vec<AttrSpec>,
    offset: u64,
}

impl Abbrev {
    /// The abbreviation code DIEs reference this declaration by.
    pub fn code(&self) -> u64 {
        self.code
    }

    /// The DIE tag (`DW_TAG_*`).
    pub fn tag(&self) -> u16 {
        self.tag
    }

    /// Whether DIEs using this abbreviation own a child list.
    pub fn has_children(&self) -> bool {
        self.has_children
    }

    /// The attribute plan, in the order values appear in the DIE stream.
    pub fn attributes(&self) -> &[AttrSpec] {
        &self.attrs
    }

    /// The declaration's byte offset in `.debug_abbrev`.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

/// Resolves `code` within `unit`, scanning further declarations on a miss.
///
/// Returns `Ok(None)` when the table ends before the code appears; that is
/// the caller's `NotPresent`, distinct from structural errors.
pub(crate) fn lookup<'a>(
    dwarf: &Dwarf<'_>,
    unit: &'a Unit<'_>,
    code: u64,
) -> Result<Option<&'a Abbrev>> {
    if let Some(abbrev) = unit.abbrevs.get(&code) {
        return Ok(Some(abbrev));
    }
    if unit.abbrevs_complete.get() {
        return Ok(None);
    }

    let section = dwarf.require_section(unravel_common::SectionKind::DebugAbbrev)?;
    let mut cursor = Cursor::with_pos(
        section.data,
        dwarf.endian(),
        unit.next_abbrev_offset.get() as usize,
    );

    loop {
        if cursor.pos() >= section.data.len() {
            return Err(dwarf.record(DwarfErrorKind::InvalidFormat));
        }

        let decl_offset = cursor.pos() as u64;
        let decl_code = cursor.read_uleb128().map_err(|e| dwarf.record(e))?;
        if decl_code == 0 {
            // Past the last declaration of this unit's table.
            unit.abbrevs_complete.set(true);
            unit.next_abbrev_offset.set(cursor.pos() as u64);
            return Ok(None);
        }

        let tag = cursor.read_uleb128().map_err(|e| dwarf.record(e))? as u16;
        let has_children = cursor.read_u8().map_err(|e| dwarf.record(e))? == constants::DW_CHILDREN_yes;

        let mut attrs = Vec::new();
        loop {
            let attr = cursor.read_uleb128().map_err(|e| dwarf.record(e))?;
            let form = cursor.read_uleb128().map_err(|e| dwarf.record(e))?;
            if attr == 0 && form == 0 {
                break;
            }
            attrs.push(AttrSpec {
                attr: attr as u32,
                form: form as u16,
            });
        }

        unit.next_abbrev_offset.set(cursor.pos() as u64);

        let abbrev = match unit.abbrevs.get(&decl_code) {
            // A duplicate code within one table; keep the first declaration.
            Some(existing) => existing,
            None => unit.abbrevs.insert(
                decl_code,
                Box::new(Abbrev {
                    code: decl_code,
                    tag,
                    has_children,
                    attrs,
                    offset: decl_offset,
                }),
            ),
        };

        if decl_code == code {
            return Ok(Some(abbrev));
        }
    }
}
