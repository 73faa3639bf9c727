//! The root reader object owning all derived caches.

use std::cell::Cell;

use elsa::{FrozenMap, FrozenVec};
use once_cell::unsync::OnceCell;

use unravel_common::{
    Architecture, Cursor, ElfClass, Endian, Section, SectionKind, SectionProvider,
};

use crate::aranges::ArangeIndex;
use crate::cfi::CallFrameInfo;
use crate::error::{DwarfError, DwarfErrorKind, Result};
use crate::line::LineTable;
use crate::unit::{Unit, UnitSection};

/// All sections the reader may consult, loaded once from the provider.
pub(crate) struct Sections<'data> {
    debug_info: Option<Section<'data>>,
    debug_abbrev: Option<Section<'data>>,
    debug_line: Option<Section<'data>>,
    debug_str: Option<Section<'data>>,
    debug_loc: Option<Section<'data>>,
    debug_ranges: Option<Section<'data>>,
    debug_aranges: Option<Section<'data>>,
    debug_pubnames: Option<Section<'data>>,
    debug_macinfo: Option<Section<'data>>,
    debug_frame: Option<Section<'data>>,
    eh_frame: Option<Section<'data>>,
    debug_types: Option<Section<'data>>,
}

impl<'data> Sections<'data> {
    fn load(provider: &dyn SectionProvider<'data>) -> Self {
        Sections {
            debug_info: provider.section(SectionKind::DebugInfo),
            debug_abbrev: provider.section(SectionKind::DebugAbbrev),
            debug_line: provider.section(SectionKind::DebugLine),
            debug_str: provider.section(SectionKind::DebugStr),
            debug_loc: provider.section(SectionKind::DebugLoc),
            debug_ranges: provider.section(SectionKind::DebugRanges),
            debug_aranges: provider.section(SectionKind::DebugAranges),
            debug_pubnames: provider.section(SectionKind::DebugPubnames),
            debug_macinfo: provider.section(SectionKind::DebugMacinfo),
            debug_frame: provider.section(SectionKind::DebugFrame),
            eh_frame: provider.section(SectionKind::EhFrame),
            debug_types: provider.section(SectionKind::DebugTypes),
        }
    }

    fn get(&self, kind: SectionKind) -> Option<Section<'data>> {
        match kind {
            SectionKind::DebugInfo => self.debug_info,
            SectionKind::DebugAbbrev => self.debug_abbrev,
            SectionKind::DebugLine => self.debug_line,
            SectionKind::DebugStr => self.debug_str,
            SectionKind::DebugLoc => self.debug_loc,
            SectionKind::DebugRanges => self.debug_ranges,
            SectionKind::DebugAranges => self.debug_aranges,
            SectionKind::DebugPubnames => self.debug_pubnames,
            SectionKind::DebugMacinfo => self.debug_macinfo,
            SectionKind::DebugFrame => self.debug_frame,
            SectionKind::EhFrame => self.eh_frame,
            SectionKind::DebugTypes => self.debug_types,
            _ => unreachable!(),
        }
    }
}

/// A set of lazily materialized compilation units over one section.
pub(crate) struct UnitIndex<'data> {
    units: FrozenVec<Box<Unit<'data>>>,
    next_offset: Cell<u64>,
    complete: Cell<bool>,
}

impl<'data> UnitIndex<'data> {
    fn new() -> Self {
        UnitIndex {
            units: FrozenVec::new(),
            next_offset: Cell::new(0),
            complete: Cell::new(false),
        }
    }
}

/// The root of ownership for DWARF reading.
///
/// A `Dwarf` is created once per object from a [`SectionProvider`] and owns
/// every derived cache: the compilation-unit index, per-unit abbreviation
/// tables, decoded line tables, interned expressions and call-frame entries.
/// All caches are monotone; a reference handed out stays valid for the
/// lifetime of the reader and repeated lookups return the same entry.
///
/// A `Dwarf` is meant to be used from one thread. Independent readers over
/// disjoint objects may run in parallel.
pub struct Dwarf<'data> {
    provider: &'data dyn SectionProvider<'data>,
    arch: Option<&'data dyn Architecture>,
    endian: Endian,
    class: ElfClass,
    sections: Sections<'data>,
    info_units: UnitIndex<'data>,
    type_units: UnitIndex<'data>,
    aranges: OnceCell<ArangeIndex>,
    line_tables: FrozenMap<u64, Box<LineTable>>,
    debug_frame: OnceCell<CallFrameInfo<'data>>,
    eh_frame: OnceCell<CallFrameInfo<'data>>,
    last_error: Cell<Option<DwarfErrorKind>>,
}

impl<'data> Dwarf<'data> {
    /// Creates a reader over the sections of `provider`.
    pub fn new(provider: &'data dyn SectionProvider<'data>) -> Self {
        Dwarf {
            provider,
            arch: None,
            endian: provider.endianness(),
            class: provider.elf_class(),
            sections: Sections::load(provider),
            info_units: UnitIndex::new(),
            type_units: UnitIndex::new(),
            aranges: OnceCell::new(),
            line_tables: FrozenMap::new(),
            debug_frame: OnceCell::new(),
            eh_frame: OnceCell::new(),
            last_error: Cell::new(None),
        }
    }

    /// Creates a reader that can additionally consult architecture knowledge,
    /// such as conventional register names.
    pub fn with_architecture(
        provider: &'data dyn SectionProvider<'data>,
        arch: &'data dyn Architecture,
    ) -> Self {
        let mut dwarf = Self::new(provider);
        dwarf.arch = Some(arch);
        dwarf
    }

    /// The byte order of the object.
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// The ELF class of the object.
    pub fn elf_class(&self) -> ElfClass {
        self.class
    }

    /// The section provider this reader was created over.
    pub fn provider(&self) -> &'data dyn SectionProvider<'data> {
        self.provider
    }

    /// The conventional name of a DWARF register number, if an architecture
    /// was supplied and knows it.
    pub fn register_name(&self, regno: u16) -> Option<&'static str> {
        self.arch.and_then(|arch| arch.register_name(regno))
    }

    /// The kind of the most recent failure, if any.
    ///
    /// Every failing operation records its kind here in addition to
    /// returning it, matching callers that prefer polling a status slot over
    /// threading results.
    pub fn last_error(&self) -> Option<DwarfErrorKind> {
        self.last_error.get()
    }

    /// Records `error` in the error slot and passes it back.
    pub(crate) fn record<E>(&self, error: E) -> DwarfError
    where
        E: Into<DwarfError>,
    {
        let error = error.into();
        self.last_error.set(Some(error.kind()));
        error
    }

    /// Records a warning-level kind without failing the current operation.
    pub(crate) fn note(&self, kind: DwarfErrorKind) {
        self.last_error.set(Some(kind));
    }

    /// Returns a section if the object has it.
    pub fn section(&self, kind: SectionKind) -> Option<Section<'data>> {
        self.sections.get(kind)
    }

    /// Returns a section, failing with `NoDebugInfo` if it is absent.
    pub(crate) fn require_section(&self, kind: SectionKind) -> Result<Section<'data>> {
        self.section(kind)
            .ok_or_else(|| self.record(DwarfErrorKind::NoDebugInfo(kind)))
    }

    /// A cursor over `kind` positioned at `offset`.
    pub(crate) fn cursor_at(&self, kind: SectionKind, offset: u64) -> Result<Cursor<'data>> {
        let section = self.require_section(kind)?;
        if offset > section.data.len() as u64 {
            return Err(self.record(DwarfErrorKind::InvalidFormat));
        }
        Ok(Cursor::with_pos(section.data, self.endian, offset as usize))
    }

    fn index_for(&self, section: UnitSection) -> &UnitIndex<'data> {
        match section {
            UnitSection::Info => &self.info_units,
            UnitSection::Types => &self.type_units,
        }
    }

    /// Reads the next not-yet-materialized unit of `section`, if any.
    fn read_next_unit(&self, section: UnitSection) -> Result<Option<&Unit<'data>>> {
        let index = self.index_for(section);
        if index.complete.get() {
            return Ok(None);
        }

        let data = self.require_section(section.kind())?;
        let offset = index.next_offset.get();
        if offset >= data.data.len() as u64 {
            index.complete.set(true);
            return Ok(None);
        }

        let slot = index.units.len();
        let unit = Unit::parse(self, data, section, offset, slot).map_err(|e| self.record(e))?;
        index.next_offset.set(unit.end_offset());
        index.units.push(Box::new(unit));
        Ok(index.units.get(slot))
    }

    /// Looks up the materialized unit covering `offset`, if any.
    fn lookup_unit(&self, section: UnitSection, offset: u64) -> Option<&Unit<'data>> {
        let index = self.index_for(section);
        let mut lo = 0usize;
        let mut hi = index.units.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            let unit = index.units.get(mid)?;
            if offset < unit.offset() {
                hi = mid;
            } else if offset >= unit.end_offset() {
                lo = mid + 1;
            } else {
                return Some(unit);
            }
        }
        None
    }

    pub(crate) fn unit_covering(
        &self,
        section: UnitSection,
        offset: u64,
    ) -> Result<&Unit<'data>> {
        if let Some(unit) = self.lookup_unit(section, offset) {
            return Ok(unit);
        }

        // A miss inside the already-scanned prefix means the offset points
        // between units.
        if offset < self.index_for(section).next_offset.get() {
            return Err(self.record(DwarfErrorKind::InvalidFormat));
        }

        while let Some(unit) = self.read_next_unit(section)? {
            if offset < unit.end_offset() {
                if offset >= unit.offset() {
                    return Ok(unit);
                }
                return Err(self.record(DwarfErrorKind::InvalidFormat));
            }
        }

        Err(self.record(DwarfErrorKind::NotPresent))
    }

    /// Returns the compilation unit whose byte range covers `offset` in
    /// `.debug_info`, reading further unit headers as needed.
    pub fn unit_at(&self, offset: u64) -> Result<&Unit<'data>> {
        self.unit_covering(UnitSection::Info, offset)
    }

    /// Returns the unit immediately following `unit` in section order.
    pub fn next_unit(&self, unit: &Unit<'data>) -> Result<Option<&Unit<'data>>> {
        let index = self.index_for(unit.section());
        if let Some(next) = index.units.get(unit.slot() + 1) {
            return Ok(Some(next));
        }
        self.read_next_unit(unit.section())
    }

    /// Iterates over all compilation units in `.debug_info`.
    pub fn units<'a>(&'a self) -> UnitsIter<'data, 'a> {
        UnitsIter {
            dwarf: self,
            section: UnitSection::Info,
            next_slot: 0,
        }
    }

    /// Iterates over all type units in `.debug_types`.
    pub fn type_units<'a>(&'a self) -> UnitsIter<'data, 'a> {
        UnitsIter {
            dwarf: self,
            section: UnitSection::Types,
            next_slot: 0,
        }
    }

    /// Finds the type unit with the given 64-bit signature.
    pub fn type_unit_by_signature(&self, signature: u64) -> Result<&Unit<'data>> {
        let index = &self.type_units;
        let mut slot = 0;
        loop {
            let unit = match index.units.get(slot) {
                Some(unit) => unit,
                None => match self.read_next_unit(UnitSection::Types)? {
                    Some(unit) => unit,
                    None => return Err(self.record(DwarfErrorKind::NotPresent)),
                },
            };
            if unit.type_signature() == Some(signature) {
                return Ok(unit);
            }
            slot += 1;
        }
    }

    /// The `.debug_aranges` index, decoded on first use.
    pub fn aranges(&self) -> Result<&ArangeIndex> {
        self.aranges
            .get_or_try_init(|| ArangeIndex::parse(self))
            .map_err(|e| self.record(e))
    }

    /// Returns the compilation unit covering `pc`, as answered by the
    /// `.debug_aranges` index.
    pub fn unit_for_pc(&self, pc: u64) -> Result<&Unit<'data>> {
        let cu_offset = self.aranges()?.lookup(pc).ok_or_else(|| {
            self.record(DwarfErrorKind::NoMatch)
        })?;
        self.unit_at(cu_offset)
    }

    /// Returns the decoded line table at `offset` in `.debug_line`, decoding
    /// it on first use.
    pub(crate) fn line_table_at(
        &self,
        offset: u64,
        comp_dir: Option<&'data [u8]>,
        address_size: u8,
    ) -> Result<&LineTable> {
        if let Some(table) = self.line_tables.get(&offset) {
            return Ok(table);
        }
        let table = LineTable::parse(self, offset, comp_dir, address_size)
            .map_err(|e| self.record(e))?;
        Ok(self.line_tables.insert(offset, Box::new(table)))
    }

    /// Call-frame information from `.debug_frame`.
    pub fn call_frame_info(&self) -> Result<&CallFrameInfo<'data>> {
        self.debug_frame
            .get_or_try_init(|| CallFrameInfo::new(self.provider, SectionKind::DebugFrame))
            .map_err(|e| self.record(e))
    }

    /// Call-frame information from `.eh_frame`.
    pub fn eh_frame_info(&self) -> Result<&CallFrameInfo<'data>> {
        self.eh_frame
            .get_or_try_init(|| CallFrameInfo::new(self.provider, SectionKind::EhFrame))
            .map_err(|e| self.record(e))
    }
}

impl std::fmt::Debug for Dwarf<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dwarf")
            .field("endian", &self.endian)
            .field("class", &self.class)
            .field("units", &self.info_units.units.len())
            .field("type_units", &self.type_units.units.len())
            .finish()
    }
}

/// An iterator over the units of one section, extending the unit index as it
/// goes.
pub struct UnitsIter<'data, 'a> {
    dwarf: &'a Dwarf<'data>,
    section: UnitSection,
    next_slot: usize,
}

impl<'data, 'a> fallible_iterator::FallibleIterator for UnitsIter<'data, 'a> {
    type Item = &'a Unit<'data>;
    type Error = DwarfError;

    fn next(&mut self) -> Result<Option<Self::Item>> {
        let index = self.dwarf.index_for(self.section);
        let unit = match index.units.get(self.next_slot) {
            Some(unit) => Some(unit),
            None => {
                // Absent section means there is nothing to iterate.
                if self.dwarf.section(self.section.kind()).is_none() {
                    return Ok(None);
                }
                self.dwarf.read_next_unit(self.section)?
            }
        };
        if unit.is_some() {
            self.next_slot += 1;
        }
        Ok(unit)
    }
}
