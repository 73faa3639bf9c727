//! DIE cursors: navigation and attribute lookup.

use std::borrow::Cow;

use unravel_common::Cursor;

use crate::abbrev::{self, Abbrev};
use crate::constants::*;
use crate::error::{DwarfErrorKind, Result};
use crate::forms::{self, AttributeValue};
use crate::reader::Dwarf;
use crate::unit::Unit;

/// A cursor to one debugging information entry.
///
/// Cursors are cheap values; two cursors are equal iff they address the same
/// `(unit, offset)`. All lookups borrow from the owning [`Dwarf`].
#[derive(Clone, Copy)]
pub struct Die<'data, 'a> {
    dwarf: &'a Dwarf<'data>,
    unit: &'a Unit<'data>,
    offset: u64,
}

/// Result of scanning a DIE's attribute plan.
struct AttrScan<'data, 'a> {
    found: Option<Attribute<'data, 'a>>,
    /// Offset just past the last attribute value; the first child or the
    /// next sibling starts here. Only valid when `found` is `None`.
    end: u64,
}

impl<'data, 'a> Die<'data, 'a> {
    pub(crate) fn new(dwarf: &'a Dwarf<'data>, unit: &'a Unit<'data>, offset: u64) -> Self {
        Die {
            dwarf,
            unit,
            offset,
        }
    }

    /// The unit this DIE belongs to.
    pub fn unit(&self) -> &'a Unit<'data> {
        self.unit
    }

    /// The reader this DIE was resolved from.
    pub fn dwarf(&self) -> &'a Dwarf<'data> {
        self.dwarf
    }

    /// The absolute byte offset of this DIE in its section.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn cursor(&self) -> Result<Cursor<'data>> {
        if self.offset < self.unit.first_die_offset() || self.offset >= self.unit.end_offset() {
            return Err(self.dwarf.record(DwarfErrorKind::InvalidFormat));
        }
        self.dwarf
            .cursor_at(self.unit.section().kind(), self.offset)
    }

    /// Resolves this DIE's abbreviation.
    pub fn abbrev(&self) -> Result<&'a Abbrev> {
        let mut cursor = self.cursor()?;
        let code = cursor.read_uleb128().map_err(|e| self.dwarf.record(e))?;
        if code == 0 {
            // A child-list terminator is not a DIE.
            return Err(self.dwarf.record(DwarfErrorKind::InvalidFormat));
        }
        abbrev::lookup(self.dwarf, self.unit, code)?
            .ok_or_else(|| self.dwarf.record(DwarfErrorKind::InvalidFormat))
    }

    /// The tag of this DIE (`DW_TAG_*`).
    pub fn tag(&self) -> Result<u16> {
        Ok(self.abbrev()?.tag())
    }

    /// Whether this DIE owns a child list.
    pub fn has_children(&self) -> Result<bool> {
        Ok(self.abbrev()?.has_children())
    }

    /// Scans the attribute plan, stopping early if `search` matches.
    fn scan_attrs(&self, search: Option<u32>) -> Result<AttrScan<'data, 'a>> {
        let mut cursor = self.cursor()?;
        cursor.read_uleb128().map_err(|e| self.dwarf.record(e))?;
        let abbrev = self.abbrev()?;

        for spec in abbrev.attributes() {
            let form =
                forms::resolve_indirect(&mut cursor, spec.form).map_err(|e| self.dwarf.record(e))?;
            if search == Some(spec.attr) {
                return Ok(AttrScan {
                    found: Some(Attribute {
                        die: *self,
                        code: spec.attr,
                        form,
                        value_offset: cursor.pos() as u64,
                    }),
                    end: 0,
                });
            }
            forms::skip_value(&mut cursor, self.unit, form).map_err(|e| self.dwarf.record(e))?;
        }

        Ok(AttrScan {
            found: None,
            end: cursor.pos() as u64,
        })
    }

    /// Looks up an attribute on this DIE alone.
    pub fn attr(&self, code: u32) -> Result<Option<Attribute<'data, 'a>>> {
        Ok(self.scan_attrs(Some(code))?.found)
    }

    /// Looks up an attribute, following `DW_AT_abstract_origin` and
    /// `DW_AT_specification` references when this DIE does not carry it
    /// itself.
    pub fn attr_integrate(&self, code: u32) -> Result<Option<Attribute<'data, 'a>>> {
        let mut die = *self;
        // A reference cycle in malformed input must not hang us.
        for _ in 0..16 {
            if let Some(attr) = die.attr(code)? {
                return Ok(Some(attr));
            }
            let origin = match die.attr(DW_AT_abstract_origin)? {
                Some(attr) => attr,
                None => match die.attr(DW_AT_specification)? {
                    Some(attr) => attr,
                    None => return Ok(None),
                },
            };
            die = origin.reference()?;
        }
        Ok(None)
    }

    /// Iterates the attributes of this DIE in plan order.
    pub fn attrs(&self) -> Result<AttrsIter<'data, 'a>> {
        let mut cursor = self.cursor()?;
        cursor.read_uleb128().map_err(|e| self.dwarf.record(e))?;
        Ok(AttrsIter {
            die: *self,
            abbrev: self.abbrev()?,
            index: 0,
            cursor,
        })
    }

    /// The offset immediately after this DIE's attribute values.
    pub(crate) fn after_attrs(&self) -> Result<u64> {
        Ok(self.scan_attrs(None)?.end)
    }

    /// The first child of this DIE, if it has children.
    pub fn child(&self) -> Result<Option<Die<'data, 'a>>> {
        if !self.has_children()? {
            return Ok(None);
        }
        let offset = self.after_attrs()?;
        if offset >= self.unit.end_offset() {
            return Ok(None);
        }
        let section = self.dwarf.require_section(self.unit.section().kind())?;
        if section.data[offset as usize] == 0 {
            // An empty child list despite the children flag.
            return Ok(None);
        }
        Ok(Some(Die::new(self.dwarf, self.unit, offset)))
    }

    /// The next sibling of this DIE.
    ///
    /// Uses `DW_AT_sibling` when present; otherwise walks forward over the
    /// subtree, tracking the open-child depth until it returns to this DIE's
    /// level or the unit ends.
    pub fn sibling(&self) -> Result<Option<Die<'data, 'a>>> {
        let section = self.dwarf.require_section(self.unit.section().kind())?;
        let end = self.unit.end_offset();
        let mut level = 0usize;
        let mut this = *self;

        loop {
            let mut offset = match this.attr(DW_AT_sibling)? {
                Some(attr) => attr.reference_offset()?,
                None => {
                    let after = this.after_attrs()?;
                    if this.has_children()? {
                        level += 1;
                    }
                    after
                }
            };

            // Pop levels over child-list terminators. Some producers skip
            // the trailing NUL bytes, so check bounds first.
            loop {
                if offset >= end {
                    return Ok(None);
                }
                if section.data[offset as usize] != 0 {
                    break;
                }
                if level == 0 {
                    return Ok(None);
                }
                level -= 1;
                offset += 1;
            }

            this = Die::new(self.dwarf, self.unit, offset);
            if level == 0 {
                break;
            }
        }

        if this.offset >= end {
            return Ok(None);
        }
        Ok(Some(this))
    }

    /// The `DW_AT_low_pc` of this DIE.
    pub fn low_pc(&self) -> Result<Option<u64>> {
        match self.attr(DW_AT_low_pc)? {
            Some(attr) => Ok(Some(attr.address()?)),
            None => Ok(None),
        }
    }

    /// The `DW_AT_high_pc` of this DIE, resolved to an absolute address.
    ///
    /// Producers encode this either as an address or as an unsigned offset
    /// from `DW_AT_low_pc`.
    pub fn high_pc(&self) -> Result<Option<u64>> {
        let attr = match self.attr(DW_AT_high_pc)? {
            Some(attr) => attr,
            None => return Ok(None),
        };
        match attr.value()? {
            AttributeValue::Address(addr) => Ok(Some(addr)),
            AttributeValue::Udata(rel) => {
                let low = self
                    .low_pc()?
                    .ok_or_else(|| self.dwarf.record(DwarfErrorKind::InvalidFormat))?;
                Ok(Some(low.wrapping_add(rel)))
            }
            _ => Err(self.dwarf.record(DwarfErrorKind::InvalidFormat)),
        }
    }

    /// The entry address of this DIE: `DW_AT_entry_pc`, or `DW_AT_low_pc`
    /// when absent.
    pub fn entry_pc(&self) -> Result<Option<u64>> {
        match self.attr(DW_AT_entry_pc)? {
            Some(attr) => Ok(Some(attr.address()?)),
            None => self.low_pc(),
        }
    }

    /// The name of this DIE, following origin and specification references.
    pub fn name(&self) -> Result<Option<Cow<'data, str>>> {
        match self.attr_integrate(DW_AT_name)? {
            Some(attr) => Ok(Some(String::from_utf8_lossy(attr.string_bytes()?))),
            None => Ok(None),
        }
    }
}

impl PartialEq for Die<'_, '_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.unit, other.unit) && self.offset == other.offset
    }
}

impl Eq for Die<'_, '_> {}

impl std::fmt::Debug for Die<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Die")
            .field("unit", &format_args!("{:#x}", self.unit.offset()))
            .field("offset", &format_args!("{:#x}", self.offset))
            .finish()
    }
}

/// An iterator over a DIE's attributes.
pub struct AttrsIter<'data, 'a> {
    die: Die<'data, 'a>,
    abbrev: &'a Abbrev,
    index: usize,
    cursor: Cursor<'data>,
}

impl<'data, 'a> fallible_iterator::FallibleIterator for AttrsIter<'data, 'a> {
    type Item = Attribute<'data, 'a>;
    type Error = crate::error::DwarfError;

    fn next(&mut self) -> Result<Option<Self::Item>> {
        let spec = match self.abbrev.attributes().get(self.index) {
            Some(spec) => *spec,
            None => return Ok(None),
        };
        self.index += 1;

        let form = forms::resolve_indirect(&mut self.cursor, spec.form)?;
        let attr = Attribute {
            die: self.die,
            code: spec.attr,
            form,
            value_offset: self.cursor.pos() as u64,
        };
        forms::skip_value(&mut self.cursor, self.die.unit, form)?;
        Ok(Some(attr))
    }
}

/// One attribute of a DIE: its code, resolved form, and the position of its
/// value bytes.
#[derive(Clone, Copy, Debug)]
pub struct Attribute<'data, 'a> {
    die: Die<'data, 'a>,
    code: u32,
    form: u16,
    value_offset: u64,
}

impl<'data, 'a> Attribute<'data, 'a> {
    /// The attribute name code (`DW_AT_*`).
    pub fn code(&self) -> u32 {
        self.code
    }

    /// The attribute form, after `DW_FORM_indirect` resolution.
    pub fn form(&self) -> u16 {
        self.form
    }

    /// The DIE this attribute was found on.
    pub fn die(&self) -> Die<'data, 'a> {
        self.die
    }

    /// The absolute offset of the value bytes in the unit's section.
    pub fn value_offset(&self) -> u64 {
        self.value_offset
    }

    /// Decodes the value according to its form.
    pub fn value(&self) -> Result<AttributeValue<'data>> {
        let dwarf = self.die.dwarf;
        let mut cursor = dwarf.cursor_at(self.die.unit.section().kind(), self.value_offset)?;
        forms::read_value(&mut cursor, dwarf, self.die.unit, self.form)
            .map_err(|e| dwarf.record(e))
    }

    /// The value as an unsigned constant.
    pub fn udata(&self) -> Result<u64> {
        match self.value()? {
            AttributeValue::Udata(value) => Ok(value),
            AttributeValue::Sdata(value) => Ok(value as u64),
            AttributeValue::SecOffset(value) => Ok(value),
            _ => Err(self.die.dwarf.record(DwarfErrorKind::InvalidFormat)),
        }
    }

    /// The value as a signed constant.
    pub fn sdata(&self) -> Result<i64> {
        match self.value()? {
            AttributeValue::Sdata(value) => Ok(value),
            AttributeValue::Udata(value) => Ok(value as i64),
            _ => Err(self.die.dwarf.record(DwarfErrorKind::InvalidFormat)),
        }
    }

    /// The value as a target address.
    pub fn address(&self) -> Result<u64> {
        match self.value()? {
            AttributeValue::Address(value) => Ok(value),
            _ => Err(self.die.dwarf.record(DwarfErrorKind::InvalidFormat)),
        }
    }

    /// The value as a boolean flag.
    pub fn flag(&self) -> Result<bool> {
        match self.value()? {
            AttributeValue::Flag(value) => Ok(value),
            _ => Err(self.die.dwarf.record(DwarfErrorKind::InvalidFormat)),
        }
    }

    /// The raw string bytes of the value.
    pub fn string_bytes(&self) -> Result<&'data [u8]> {
        match self.value()? {
            AttributeValue::String(value) => Ok(value),
            _ => Err(self.die.dwarf.record(DwarfErrorKind::InvalidFormat)),
        }
    }

    /// The raw block bytes of the value.
    pub fn block(&self) -> Result<&'data [u8]> {
        match self.value()? {
            AttributeValue::Block(value) => Ok(value),
            _ => Err(self.die.dwarf.record(DwarfErrorKind::InvalidFormat)),
        }
    }

    /// A section offset; DWARF before version 4 encodes these as `data4`
    /// or `data8` constants.
    pub fn sec_offset(&self) -> Result<u64> {
        match self.value()? {
            AttributeValue::SecOffset(value) | AttributeValue::Udata(value) => Ok(value),
            _ => Err(self.die.dwarf.record(DwarfErrorKind::InvalidFormat)),
        }
    }

    /// The absolute `.debug_info` offset a reference form points at.
    pub(crate) fn reference_offset(&self) -> Result<u64> {
        match self.value()? {
            AttributeValue::UnitRef(offset) | AttributeValue::InfoRef(offset) => Ok(offset),
            _ => Err(self.die.dwarf.record(DwarfErrorKind::InvalidFormat)),
        }
    }

    /// Resolves a reference-form value to the DIE it names.
    ///
    /// Same-unit references stay in this unit, `DW_FORM_ref_addr` may cross
    /// into any unit of `.debug_info`, and `DW_FORM_ref_sig8` resolves
    /// through the type-unit index.
    pub fn reference(&self) -> Result<Die<'data, 'a>> {
        let dwarf = self.die.dwarf;
        match self.value()? {
            AttributeValue::UnitRef(offset) => Ok(Die::new(dwarf, self.die.unit, offset)),
            AttributeValue::InfoRef(offset) => {
                let unit = dwarf.unit_at(offset)?;
                if offset < unit.first_die_offset() {
                    return Err(dwarf.record(DwarfErrorKind::InvalidFormat));
                }
                Ok(Die::new(dwarf, unit, offset))
            }
            AttributeValue::TypeSignature(signature) => {
                let unit = dwarf.type_unit_by_signature(signature)?;
                unit.type_die(dwarf)
            }
            _ => Err(dwarf.record(DwarfErrorKind::InvalidFormat)),
        }
    }
}
