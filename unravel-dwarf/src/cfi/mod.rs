//! Call-frame information from `.debug_frame` and `.eh_frame`.
//!
//! The two sections share one entry format with diverging details: the CIE
//! discriminator value, the meaning of the CIE pointer in FDEs, and the use
//! of encoded pointers driven by the CIE augmentation string. Entries are
//! interned on first sight; FDEs land in a search tree keyed by their start
//! address and CIEs in a map keyed by section offset.

mod encoding;
mod rules;

pub use rules::{CfaRule, FrameRow, RegisterRule};

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use elsa::{FrozenMap, FrozenVec};
use tracing::debug;

use unravel_common::{Cursor, ElfClass, Endian, Section, SectionKind, SectionProvider};

use crate::constants::*;
use crate::error::{DwarfError, DwarfErrorKind, Result};
use crate::location::Expression;
use crate::unit::ExprKey;

use encoding::{encoded_size, read_encoded, PointerContext};

/// One interned Common Information Entry.
#[derive(Clone, Debug)]
pub struct Cie<'data> {
    offset: u64,
    version: u8,
    address_size: u8,
    code_alignment_factor: u64,
    data_alignment_factor: i64,
    return_address_register: u64,
    fde_encoding: u8,
    lsda_encoding: u8,
    sized_augmentation: bool,
    signal_frame: bool,
    fde_augmentation_data_size: u64,
    initial_instructions: &'data [u8],
    initial_instructions_offset: u64,
}

impl<'data> Cie<'data> {
    /// The CIE's byte offset in its section.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The CIE version (1, 3 or 4).
    pub fn version(&self) -> u8 {
        self.version
    }

    /// The address size, implicit in the ELF class except for version 4
    /// CIEs which carry it explicitly.
    pub fn address_size(&self) -> u8 {
        self.address_size
    }

    /// The factor code-advance operands are scaled by.
    pub fn code_alignment_factor(&self) -> u64 {
        self.code_alignment_factor
    }

    /// The factor data-offset operands are scaled by.
    pub fn data_alignment_factor(&self) -> i64 {
        self.data_alignment_factor
    }

    /// The column holding the return address.
    pub fn return_address_register(&self) -> u64 {
        self.return_address_register
    }

    /// The encoding of FDE address fields, canonicalized to a sized form.
    pub fn fde_encoding(&self) -> u8 {
        self.fde_encoding
    }

    /// The encoding of the LSDA pointer, or `DW_EH_PE_omit`.
    pub fn lsda_encoding(&self) -> u8 {
        self.lsda_encoding
    }

    /// Whether this CIE describes a signal handler frame.
    pub fn is_signal_frame(&self) -> bool {
        self.signal_frame
    }

    /// The instructions establishing the initial unwind state.
    pub fn initial_instructions(&self) -> &'data [u8] {
        self.initial_instructions
    }
}

/// An FDE whose PC bounds have not been decoded yet.
#[derive(Clone, Copy, Debug)]
pub struct RawFde<'data> {
    cie_offset: u64,
    data: &'data [u8],
    data_offset: u64,
}

/// One interned Frame Description Entry.
#[derive(Clone, Debug)]
pub struct Fde<'data> {
    cie_offset: u64,
    start: u64,
    end: u64,
    instructions: &'data [u8],
    instructions_offset: u64,
}

impl<'data> Fde<'data> {
    /// First PC covered by this FDE.
    pub fn start_pc(&self) -> u64 {
        self.start
    }

    /// One past the last PC covered by this FDE.
    pub fn end_pc(&self) -> u64 {
        self.end
    }

    /// The section offset of the CIE this FDE refers to.
    pub fn cie_offset(&self) -> u64 {
        self.cie_offset
    }

    /// Whether `pc` falls into this FDE's range.
    pub fn contains(&self, pc: u64) -> bool {
        pc >= self.start && pc < self.end
    }

    /// The call-frame instruction stream of this FDE.
    pub fn instructions(&self) -> &'data [u8] {
        self.instructions
    }
}

/// One entry yielded by [`CallFrameInfo::entries`].
#[derive(Debug)]
pub enum CfiEntry<'data> {
    /// A Common Information Entry, already fully groked.
    Cie(Cie<'data>),
    /// A Frame Description Entry, not yet bound to its CIE.
    Fde(RawFde<'data>),
}

/// An `.eh_frame_hdr`-style binary search table over `(initial_pc,
/// fde_pointer)` pairs.
#[derive(Clone, Copy, Debug)]
pub struct SearchTable<'data> {
    /// The encoding of both values of each pair.
    pub encoding: u8,
    /// Virtual address the table data is mapped at.
    pub vaddr: u64,
    /// Number of pairs.
    pub entries: usize,
    /// The raw pair data.
    pub data: &'data [u8],
}

/// The decoder and cache for one call-frame section.
pub struct CallFrameInfo<'data> {
    provider: &'data dyn SectionProvider<'data>,
    kind: SectionKind,
    section: Section<'data>,
    endian: Endian,
    class: ElfClass,
    is_eh: bool,
    cies: FrozenMap<u64, Box<Cie<'data>>>,
    fdes: FrozenVec<Box<Fde<'data>>>,
    fde_index: RefCell<BTreeMap<u64, usize>>,
    next_offset: Cell<u64>,
    search_table: Option<SearchTable<'data>>,
    exprs: FrozenMap<ExprKey, Box<Expression<'data>>>,
}

impl<'data> CallFrameInfo<'data> {
    /// Creates a decoder over `kind`, which must be `.debug_frame` or
    /// `.eh_frame`.
    pub fn new(
        provider: &'data dyn SectionProvider<'data>,
        kind: SectionKind,
    ) -> Result<Self> {
        let is_eh = match kind {
            SectionKind::DebugFrame => false,
            SectionKind::EhFrame => true,
            _ => return Err(DwarfErrorKind::InvalidFormat.into()),
        };
        let section = provider
            .section(kind)
            .ok_or(DwarfErrorKind::NoDebugInfo(kind))?;
        Ok(CallFrameInfo {
            provider,
            kind,
            section,
            endian: provider.endianness(),
            class: provider.elf_class(),
            is_eh,
            cies: FrozenMap::new(),
            fdes: FrozenVec::new(),
            fde_index: RefCell::new(BTreeMap::new()),
            next_offset: Cell::new(0),
            search_table: None,
            exprs: FrozenMap::new(),
        })
    }

    /// Like [`new`](Self::new), with a binary search table consulted before
    /// falling back to a linear scan of the section.
    pub fn with_search_table(
        provider: &'data dyn SectionProvider<'data>,
        kind: SectionKind,
        table: SearchTable<'data>,
    ) -> Result<Self> {
        let mut cfi = Self::new(provider, kind)?;
        cfi.search_table = Some(table);
        Ok(cfi)
    }

    /// The section this decoder reads.
    pub fn section_kind(&self) -> SectionKind {
        self.kind
    }

    fn pointer_context(&self) -> PointerContext<'data, '_> {
        PointerContext {
            data: self.section.data,
            vaddr: self.section.address,
            datarel: self.provider.data_base(),
            kind: self.kind,
            provider: self.provider,
            class: self.class,
        }
    }

    /// Reads the entry at `offset`.
    ///
    /// `Ok(None)` means the section is exhausted. The outer result fails when
    /// not even the entry length is readable; a malformed entry body is
    /// reported in the inner result so the caller can still skip to the next
    /// entry.
    #[allow(clippy::type_complexity)]
    fn parse_entry(
        &self,
        offset: u64,
    ) -> Result<Option<(u64, Result<CfiEntry<'data>>)>> {
        let data = self.section.data;
        if offset == u64::MAX || offset + 4 >= data.len() as u64 {
            return Ok(None);
        }

        let mut cursor = Cursor::with_pos(data, self.endian, offset as usize);
        let (length, offset_size) = cursor.read_initial_length()?;

        let body_start = cursor.pos() as u64;
        if length > data.len() as u64 - body_start || length < u64::from(offset_size) + 1 {
            return Err(DwarfErrorKind::InvalidFormat.into());
        }
        let limit = (body_start + length) as usize;
        let next_offset = offset + u64::from(2 * offset_size - 4) + length;

        let body = self.parse_entry_body(cursor, offset, offset_size, limit);
        Ok(Some((next_offset, body)))
    }

    fn parse_entry_body(
        &self,
        mut cursor: Cursor<'data>,
        offset: u64,
        offset_size: u8,
        limit: usize,
    ) -> Result<CfiEntry<'data>> {
        let data = self.section.data;
        let cie_pointer_start = cursor.pos() as u64;
        let mut id = cursor.read_offset(offset_size)?;

        if !self.is_eh && offset_size == 4 && id == CIE_ID_32 {
            id = CIE_ID;
        }
        if self.is_eh {
            if id == 0 {
                // A zero CIE pointer in .eh_frame announces a CIE, not a
                // reference to section offset zero.
                id = CIE_ID;
            } else {
                // The CIE pointer counts back from its own field.
                if id > cie_pointer_start || cie_pointer_start <= u64::from(offset_size) {
                    return Err(DwarfErrorKind::InvalidFormat.into());
                }
                id = cie_pointer_start - id;
            }
        }

        if id != CIE_ID {
            return Ok(CfiEntry::Fde(RawFde {
                cie_offset: id,
                data: &data[cursor.pos()..limit],
                data_offset: cursor.pos() as u64,
            }));
        }

        // A CIE.
        let version = cursor.read_u8()?;
        if version != 1 && !(3..=4).contains(&version) {
            return Err(DwarfErrorKind::InvalidFormat.into());
        }

        let augmentation = cursor.read_cstr()?;

        // The address size for CFI is implicit in the ELF class.
        let mut address_size = self.class.address_size();
        if version >= 4 {
            let cie_address_size = cursor.read_u8()?;
            if cie_address_size != address_size {
                return Err(DwarfErrorKind::InvalidFormat.into());
            }
            address_size = cie_address_size;
            let segment_size = cursor.read_u8()?;
            if segment_size != 0 {
                return Err(DwarfErrorKind::InvalidFormat.into());
            }
        }

        // g++ v2 "eh" places a raw pointer right after the augmentation
        // string; it carries no information we need.
        let mut augmentation = augmentation;
        if augmentation.starts_with(b"eh") {
            debug!(offset, "skipping g++ v2 \"eh\" augmentation pointer");
            augmentation = &augmentation[2..];
            cursor.skip(address_size as usize)?;
        }

        let code_alignment_factor = cursor.read_uleb128()?;
        let data_alignment_factor = cursor.read_sleb128()?;
        let return_address_register = if version >= 3 {
            cursor.read_uleb128()?
        } else {
            u64::from(cursor.read_u8()?)
        };

        let mut fde_encoding = DW_EH_PE_absptr;
        let mut lsda_encoding = DW_EH_PE_omit;
        let mut signal_frame = false;
        let mut fde_augmentation_data_size: u64 = 0;
        let sized_augmentation = augmentation.first() == Some(&b'z');

        if sized_augmentation {
            let augmentation_data_size = cursor.read_uleb128()?;
            if cursor.pos() > limit
                || augmentation_data_size > (limit - cursor.pos()) as u64
            {
                return Err(DwarfErrorKind::InvalidFormat.into());
            }
            let mut aug = Cursor::new(
                cursor.read_slice(augmentation_data_size as usize)?,
                self.endian,
            );
            for &ch in augmentation {
                match ch {
                    b'z' => {}
                    b'S' => signal_frame = true,
                    b'L' => lsda_encoding = aug.read_u8()?,
                    b'R' => fde_encoding = aug.read_u8()?,
                    b'P' => {
                        let encoding = aug.read_u8()?;
                        match encoded_size(encoding, self.class) {
                            Some(size) => aug.skip(size as usize)?,
                            None => {
                                aug.read_uleb128()?;
                            }
                        }
                    }
                    // Unknown augmentations are covered by the size field.
                    _ => {}
                }
            }
        } else {
            for &ch in augmentation {
                match ch {
                    b'S' => signal_frame = true,
                    b'L' => {
                        lsda_encoding = cursor.read_u8()?;
                        let size = encoded_size(lsda_encoding, self.class)
                            .ok_or(DwarfErrorKind::InvalidFormat)?;
                        fde_augmentation_data_size += u64::from(size);
                    }
                    b'R' => fde_encoding = cursor.read_u8()?,
                    b'P' => {
                        let encoding = cursor.read_u8()?;
                        match encoded_size(encoding, self.class) {
                            Some(size) => cursor.skip(size as usize)?,
                            None => {
                                cursor.read_uleb128()?;
                            }
                        }
                    }
                    // Unknown augmentation without the 'z' framing: bail out
                    // with the defaults; what follows may already be
                    // instruction bytes.
                    _ => break,
                }
            }
        }

        // Canonicalize an unsized FDE encoding to the class word size.
        if fde_encoding & 0x0f == DW_EH_PE_absptr {
            fde_encoding |= match self.class {
                ElfClass::Class32 => DW_EH_PE_udata4,
                ElfClass::Class64 => DW_EH_PE_udata8,
            };
        }

        if cursor.pos() > limit {
            return Err(DwarfErrorKind::InvalidFormat.into());
        }

        Ok(CfiEntry::Cie(Cie {
            offset,
            version,
            address_size,
            code_alignment_factor,
            data_alignment_factor,
            return_address_register,
            fde_encoding,
            lsda_encoding,
            sized_augmentation,
            signal_frame,
            fde_augmentation_data_size,
            initial_instructions: &data[cursor.pos()..limit],
            initial_instructions_offset: cursor.pos() as u64,
        }))
    }

    /// The CIE at `offset`, interning it on first access.
    pub fn cie_at(&self, offset: u64) -> Result<&Cie<'data>> {
        if let Some(cie) = self.cies.get(&offset) {
            return Ok(cie);
        }

        let (next_offset, body) = self
            .parse_entry(offset)?
            .ok_or(DwarfErrorKind::InvalidFormat)?;
        let cie = match body? {
            CfiEntry::Cie(cie) => cie,
            CfiEntry::Fde(_) => return Err(DwarfErrorKind::InvalidFormat.into()),
        };

        // If this happened to be what we would have read next, notice it.
        if self.next_offset.get() == offset {
            self.next_offset.set(next_offset);
        }

        Ok(self.cies.insert(offset, Box::new(cie)))
    }

    fn intern_cie(&self, offset: u64, cie: Cie<'data>) {
        if self.cies.get(&offset).is_none() {
            self.cies.insert(offset, Box::new(cie));
        }
    }

    /// Decodes a raw FDE's bounds through its CIE and interns it.
    pub fn intern_fde(&self, raw: RawFde<'data>) -> Result<&Fde<'data>> {
        let cie = self.cie_at(raw.cie_offset)?.clone();

        let ctx = self.pointer_context();
        let mut cursor =
            Cursor::with_pos(self.section.data, self.endian, raw.data_offset as usize);
        let entry_end = raw.data_offset as usize + raw.data.len();

        let start = read_encoded(&ctx, cie.fde_encoding, &mut cursor)?;
        // The range is a plain size: no relative bias.
        let range = read_encoded(&ctx, cie.fde_encoding & 0x0f, &mut cursor)?;
        let end = start.wrapping_add(range);
        if end <= start || cursor.pos() > entry_end {
            return Err(DwarfErrorKind::InvalidFormat.into());
        }

        if cie.sized_augmentation {
            // The FDE carries a sized block before its instructions.
            let size = cursor.read_uleb128()?;
            if cursor.pos() > entry_end || size > (entry_end - cursor.pos()) as u64 {
                return Err(DwarfErrorKind::InvalidFormat.into());
            }
            cursor.skip(size as usize)?;
        } else {
            cursor.skip(cie.fde_augmentation_data_size as usize)?;
        }

        if cursor.pos() > entry_end {
            return Err(DwarfErrorKind::InvalidFormat.into());
        }

        let fde = Fde {
            cie_offset: raw.cie_offset,
            start,
            end,
            instructions: &self.section.data[cursor.pos()..entry_end],
            instructions_offset: cursor.pos() as u64,
        };

        let mut index = self.fde_index.borrow_mut();

        // Overlapping entries collapse onto whatever was interned first.
        if let Some((_, &slot)) = index.range(..=fde.start).next_back() {
            let prev = self.fdes.get(slot).unwrap();
            if prev.end > fde.start {
                drop(index);
                return Ok(self.fdes.get(slot).unwrap());
            }
        }
        if let Some((&next_start, &slot)) = index.range(fde.start..).next() {
            if next_start < fde.end {
                drop(index);
                return Ok(self.fdes.get(slot).unwrap());
            }
        }

        let slot = self.fdes.len();
        index.insert(fde.start, slot);
        drop(index);
        self.fdes.push(Box::new(fde));
        Ok(self.fdes.get(slot).unwrap())
    }

    /// Looks up a cached FDE covering `pc` without reading new entries.
    fn cached_fde(&self, pc: u64) -> Option<&Fde<'data>> {
        let index = self.fde_index.borrow();
        let (_, &slot) = index.range(..=pc).next_back()?;
        drop(index);
        let fde = self.fdes.get(slot)?;
        fde.contains(pc).then_some(fde)
    }

    /// Reads the FDE at `offset`, interning its CIE on the way.
    pub fn fde_at(&self, offset: u64) -> Result<&Fde<'data>> {
        let (next_offset, body) = self
            .parse_entry(offset)?
            .ok_or(DwarfErrorKind::InvalidFormat)?;
        let raw = match body? {
            CfiEntry::Fde(raw) => raw,
            CfiEntry::Cie(_) => return Err(DwarfErrorKind::InvalidFormat.into()),
        };

        if self.next_offset.get() == offset {
            self.next_offset.set(next_offset);
        }

        self.intern_fde(raw)
    }

    /// Binary search over the search table; yields a section offset.
    fn search_table_lookup(&self, table: &SearchTable<'data>, pc: u64) -> Option<u64> {
        let pair_size = 2 * u64::from(encoded_size(table.encoding, self.class)?);
        if pair_size == 0 {
            return None;
        }

        let ctx = PointerContext {
            data: table.data,
            vaddr: table.vaddr,
            datarel: table.vaddr,
            kind: self.kind,
            provider: self.provider,
            class: self.class,
        };

        let mut lo = 0u64;
        let mut hi = table.entries as u64;
        while lo < hi {
            let idx = (lo + hi) / 2;
            let mut cursor =
                Cursor::with_pos(table.data, self.endian, (idx * pair_size) as usize);
            let start = read_encoded(&ctx, table.encoding, &mut cursor).ok()?;
            if pc < start {
                hi = idx;
            } else {
                let fde_vaddr = read_encoded(&ctx, table.encoding, &mut cursor).ok()?;
                lo = idx + 1;

                // The last entry's upper bound is taken to be the end of the
                // module; anywhere else, the following entry bounds it.
                if lo < table.entries as u64 {
                    let next_start = read_encoded(&ctx, table.encoding, &mut cursor).ok()?;
                    if pc >= next_start {
                        continue;
                    }
                }

                return Some(fde_vaddr.wrapping_sub(self.section.address));
            }
        }
        None
    }

    /// Finds the FDE covering `pc`.
    ///
    /// Checks the cache, then the binary search table if one was provided,
    /// then reads further entries from the section, interning CIEs eagerly
    /// and FDEs as they appear. A malformed entry is skipped once; failing to
    /// make progress ends the scan.
    pub fn fde_for(&self, pc: u64) -> Result<&Fde<'data>> {
        if let Some(fde) = self.cached_fde(pc) {
            return Ok(fde);
        }

        if let Some(table) = self.search_table {
            let offset = self
                .search_table_lookup(&table, pc)
                .ok_or(DwarfErrorKind::NoMatch)?;
            let fde = self.fde_at(offset)?;
            if !fde.contains(pc) {
                // A search table pointing at the wrong FDE is corrupt.
                return Err(DwarfErrorKind::InvalidFormat.into());
            }
            return Ok(fde);
        }

        loop {
            let last_offset = self.next_offset.get();
            let (next_offset, body) = match self.parse_entry(last_offset) {
                Ok(Some(entry)) => entry,
                // End of section, or an entry so damaged we cannot step over
                // it: the scan cannot continue.
                Ok(None) | Err(_) => break,
            };
            self.next_offset.set(next_offset);

            match body {
                Err(error) => {
                    // Skip the loser and look at the next entry.
                    debug!(offset = last_offset, %error, "skipping malformed CFI entry");
                    continue;
                }
                Ok(CfiEntry::Cie(cie)) => {
                    // Intern eagerly: the next FDE will usually refer to it.
                    self.intern_cie(last_offset, cie);
                }
                Ok(CfiEntry::Fde(raw)) => {
                    let fde = match self.intern_fde(raw) {
                        Ok(fde) => fde,
                        // A bogus FDE does not end the search.
                        Err(_) => continue,
                    };
                    if fde.contains(pc) {
                        return Ok(fde);
                    }
                }
            }
        }

        Err(DwarfErrorKind::NoMatch.into())
    }

    /// Iterates all entries of the section in file order.
    pub fn entries<'a>(&'a self) -> CfiEntriesIter<'data, 'a> {
        CfiEntriesIter {
            cfi: self,
            offset: 0,
            done: false,
        }
    }

    /// Interns the CFA expression of [`CfaRule::Expression`].
    ///
    /// A synthetic push-CFA operation is prepended, and CFA expressions may
    /// be empty. Repeated calls for the same rule return the same reference.
    pub fn cfa_expression(&self, rule: &CfaRule<'data>) -> Result<&Expression<'data>> {
        match rule {
            CfaRule::Expression { block, offset } => crate::location::intern_expression(
                self.endian,
                self.provider,
                &self.exprs,
                block,
                self.kind,
                *offset,
                self.class.address_size(),
                self.class.address_size(),
                true,
                false,
            ),
            _ => Err(DwarfErrorKind::InvalidFormat.into()),
        }
    }

    /// Interns the expression of [`RegisterRule::Expression`] or
    /// [`RegisterRule::ValExpression`].
    pub fn register_expression(
        &self,
        rule: &RegisterRule<'data>,
    ) -> Result<&Expression<'data>> {
        match rule {
            RegisterRule::Expression { block, offset }
            | RegisterRule::ValExpression { block, offset } => {
                crate::location::intern_expression(
                    self.endian,
                    self.provider,
                    &self.exprs,
                    block,
                    self.kind,
                    *offset,
                    self.class.address_size(),
                    self.class.address_size(),
                    true,
                    false,
                )
            }
            _ => Err(DwarfErrorKind::InvalidFormat.into()),
        }
    }
}

/// An iterator over the raw entries of a call-frame section.
pub struct CfiEntriesIter<'data, 'a> {
    cfi: &'a CallFrameInfo<'data>,
    offset: u64,
    done: bool,
}

impl<'data, 'a> fallible_iterator::FallibleIterator for CfiEntriesIter<'data, 'a> {
    type Item = CfiEntry<'data>;
    type Error = DwarfError;

    fn next(&mut self) -> Result<Option<CfiEntry<'data>>> {
        if self.done {
            return Ok(None);
        }
        match self.cfi.parse_entry(self.offset)? {
            None => {
                self.done = true;
                Ok(None)
            }
            Some((next_offset, body)) => {
                self.offset = next_offset;
                body.map(Some)
            }
        }
    }
}
