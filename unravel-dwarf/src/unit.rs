//! Compilation units and type units.

use std::cell::Cell;

use elsa::FrozenMap;

use unravel_common::{Cursor, Section, SectionKind};

use crate::abbrev::Abbrev;
use crate::constants;
use crate::die::Die;
use crate::error::{DwarfErrorKind, Result};
use crate::line::LineTable;
use crate::location::Expression;
use crate::reader::Dwarf;

/// Which section a unit was read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitSection {
    /// A compilation or partial unit in `.debug_info`.
    Info,
    /// A type unit in `.debug_types`.
    Types,
}

impl UnitSection {
    /// The section kind unit data is read from.
    pub fn kind(self) -> SectionKind {
        match self {
            UnitSection::Info => SectionKind::DebugInfo,
            UnitSection::Types => SectionKind::DebugTypes,
        }
    }
}

/// Cache key for interned expressions: the section the block lives in and
/// the block's byte offset there.
pub(crate) type ExprKey = (u8, u64);

pub(crate) fn expr_key(kind: SectionKind, offset: u64) -> ExprKey {
    let disc = match kind {
        SectionKind::DebugInfo => 0,
        SectionKind::DebugTypes => 1,
        SectionKind::DebugLoc => 2,
        SectionKind::DebugFrame => 3,
        SectionKind::EhFrame => 4,
        _ => 5,
    };
    (disc, offset)
}

/// One compilation unit (or type unit), covering the half-open byte range
/// `[offset, end)` of its section.
///
/// The unit owns its lazily-filled caches: the abbreviation table and the
/// interned location expressions. Both are monotone; entries are never
/// evicted or replaced.
pub struct Unit<'data> {
    section: UnitSection,
    slot: usize,
    offset: u64,
    end: u64,
    first_die: u64,
    version: u16,
    address_size: u8,
    offset_size: u8,
    abbrev_offset: u64,
    type_signature: Option<u64>,
    type_offset: Option<u64>,

    pub(crate) abbrevs: FrozenMap<u64, Box<Abbrev>>,
    pub(crate) next_abbrev_offset: Cell<u64>,
    pub(crate) abbrevs_complete: Cell<bool>,
    pub(crate) exprs: FrozenMap<ExprKey, Box<Expression<'data>>>,
}

impl<'data> Unit<'data> {
    /// Parses one unit header starting at `offset` of `data`.
    pub(crate) fn parse(
        dwarf: &Dwarf<'data>,
        data: Section<'data>,
        section: UnitSection,
        offset: u64,
        slot: usize,
    ) -> Result<Self> {
        let mut cursor = Cursor::with_pos(data.data, dwarf.endian(), offset as usize);

        let (length, offset_size) = cursor.read_initial_length()?;
        let body_start = cursor.pos() as u64;
        let end = body_start
            .checked_add(length)
            .filter(|&end| end <= data.data.len() as u64)
            .ok_or(DwarfErrorKind::InvalidFormat)?;

        let version = cursor.read_u16()?;
        if !(2..=4).contains(&version) {
            return Err(DwarfErrorKind::InvalidFormat.into());
        }

        let abbrev_offset = cursor.read_offset(offset_size)?;
        let address_size = cursor.read_u8()?;
        if address_size != 4 && address_size != 8 {
            return Err(DwarfErrorKind::InvalidFormat.into());
        }

        let (type_signature, type_offset) = if section == UnitSection::Types {
            let signature = cursor.read_u64()?;
            let type_offset = cursor.read_offset(offset_size)?;
            (Some(signature), Some(offset + type_offset))
        } else {
            (None, None)
        };

        let first_die = cursor.pos() as u64;
        if first_die > end {
            return Err(DwarfErrorKind::InvalidFormat.into());
        }

        Ok(Unit {
            section,
            slot,
            offset,
            end,
            first_die,
            version,
            address_size,
            offset_size,
            abbrev_offset,
            type_signature,
            type_offset,
            abbrevs: FrozenMap::new(),
            next_abbrev_offset: Cell::new(abbrev_offset),
            abbrevs_complete: Cell::new(false),
            exprs: FrozenMap::new(),
        })
    }

    /// The section this unit was read from.
    pub fn section(&self) -> UnitSection {
        self.section
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot
    }

    /// The byte offset of this unit's header in its section.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// One past the last byte of this unit.
    pub fn end_offset(&self) -> u64 {
        self.end
    }

    /// The byte offset of the first DIE, immediately after the unit header.
    pub fn first_die_offset(&self) -> u64 {
        self.first_die
    }

    /// The DWARF version of this unit.
    pub fn version(&self) -> u16 {
        self.version
    }

    /// The size in bytes of a target address in this unit.
    pub fn address_size(&self) -> u8 {
        self.address_size
    }

    /// The size in bytes of section offsets in this unit (4 or 8).
    pub fn offset_size(&self) -> u8 {
        self.offset_size
    }

    /// The offset of this unit's abbreviation table in `.debug_abbrev`.
    pub fn abbrev_offset(&self) -> u64 {
        self.abbrev_offset
    }

    /// The type signature, for units read from `.debug_types`.
    pub fn type_signature(&self) -> Option<u64> {
        self.type_signature
    }

    /// The size of references in expressions: DWARF 2 used address-sized
    /// references, later versions offset-sized ones.
    pub(crate) fn ref_size(&self) -> u8 {
        if self.version == 2 {
            self.address_size
        } else {
            self.offset_size
        }
    }

    /// The root DIE of this unit.
    pub fn root<'a>(&'a self, dwarf: &'a Dwarf<'data>) -> Die<'data, 'a> {
        Die::new(dwarf, self, self.first_die)
    }

    /// The DIE described by this type unit's signature.
    pub fn type_die<'a>(&'a self, dwarf: &'a Dwarf<'data>) -> Result<Die<'data, 'a>> {
        let offset = self
            .type_offset
            .ok_or_else(|| dwarf.record(DwarfErrorKind::NotPresent))?;
        Ok(Die::new(dwarf, self, offset))
    }

    /// The compilation directory recorded on the unit DIE.
    pub fn comp_dir<'a>(&'a self, dwarf: &'a Dwarf<'data>) -> Result<Option<&'data [u8]>> {
        match self.root(dwarf).attr(constants::DW_AT_comp_dir)? {
            Some(attr) => Ok(Some(attr.string_bytes()?)),
            None => Ok(None),
        }
    }

    /// The source language code recorded on the unit DIE.
    pub fn language<'a>(&'a self, dwarf: &'a Dwarf<'data>) -> Result<Option<u32>> {
        match self.root(dwarf).attr(constants::DW_AT_language)? {
            Some(attr) => Ok(Some(attr.udata()? as u32)),
            None => Ok(None),
        }
    }

    /// The base address used to bias range-list and location-list entries:
    /// `DW_AT_low_pc`, or `DW_AT_entry_pc` when the former is absent.
    pub fn base_address<'a>(&'a self, dwarf: &'a Dwarf<'data>) -> Result<u64> {
        let root = self.root(dwarf);
        if let Some(attr) = root.attr(constants::DW_AT_low_pc)? {
            return attr.address();
        }
        match root.attr(constants::DW_AT_entry_pc)? {
            Some(attr) => attr.address(),
            None => Err(dwarf.record(DwarfErrorKind::NotPresent)),
        }
    }

    /// The line table of this unit, decoded on first use from the offset in
    /// `DW_AT_stmt_list`.
    pub fn line_table<'a>(&'a self, dwarf: &'a Dwarf<'data>) -> Result<&'a LineTable> {
        let root = self.root(dwarf);
        let stmt_list = root
            .attr(constants::DW_AT_stmt_list)?
            .ok_or_else(|| dwarf.record(DwarfErrorKind::NoDebugInfo(SectionKind::DebugLine)))?;
        let offset = stmt_list.sec_offset()?;
        let comp_dir = self.comp_dir(dwarf)?;
        dwarf.line_table_at(offset, comp_dir, self.address_size)
    }
}

impl std::fmt::Debug for Unit<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unit")
            .field("offset", &format_args!("{:#x}", self.offset))
            .field("end", &format_args!("{:#x}", self.end))
            .field("version", &self.version)
            .field("address_size", &self.address_size)
            .field("offset_size", &self.offset_size)
            .finish()
    }
}
