//! Size computation for aggregate types.

use crate::constants::*;
use crate::die::Die;
use crate::error::{DwarfErrorKind, Result};

// Typedef and subrange chains in malformed input could loop forever.
const MAX_TYPE_DEPTH: usize = 16;

impl<'data, 'a> Die<'data, 'a> {
    /// The DIE of this DIE's `DW_AT_type`, following origin references.
    pub fn type_die(&self) -> Result<Option<Die<'data, 'a>>> {
        match self.attr_integrate(DW_AT_type)? {
            Some(attr) => Ok(Some(attr.reference()?)),
            None => Ok(None),
        }
    }

    /// Computes the size in bytes of the type this DIE describes.
    ///
    /// Most types carry `DW_AT_byte_size` directly. Typedefs and subranges
    /// delegate to their underlying type; arrays sum `stride x count` over
    /// their subrange (or enumeration) dimensions, where the default lower
    /// bound depends on the unit's source language.
    pub fn aggregate_size(&self) -> Result<u64> {
        self.aggregate_size_bounded(0)
    }

    fn aggregate_size_bounded(&self, depth: usize) -> Result<u64> {
        if depth >= MAX_TYPE_DEPTH {
            return Err(self.dwarf().record(DwarfErrorKind::InvalidFormat));
        }

        if let Some(attr) = self.attr_integrate(DW_AT_byte_size)? {
            return attr.udata();
        }

        match self.tag()? {
            DW_TAG_typedef | DW_TAG_subrange_type => self
                .type_die()?
                .ok_or_else(|| self.dwarf().record(DwarfErrorKind::NotPresent))?
                .aggregate_size_bounded(depth + 1),
            DW_TAG_array_type => self.array_size(depth),
            // Most types must give their size directly.
            _ => Err(self.dwarf().record(DwarfErrorKind::NotPresent)),
        }
    }

    fn array_size(&self, depth: usize) -> Result<u64> {
        let element_size = self
            .type_die()?
            .ok_or_else(|| self.dwarf().record(DwarfErrorKind::NotPresent))?
            .aggregate_size_bounded(depth + 1)?;

        // Each DW_TAG_subrange_type or DW_TAG_enumeration_type child gives
        // the extent of one array dimension.
        let mut total: u64 = 0;
        let mut any = false;

        let mut child = self.child()?;
        while let Some(dim) = child {
            let count = match dim.tag()? {
                DW_TAG_subrange_type => self.subrange_count(&dim)?,
                DW_TAG_enumeration_type => {
                    // The dimension is the highest enumerator value plus one.
                    let mut count: u64 = 0;
                    let mut enumerator = dim.child()?;
                    while let Some(e) = enumerator {
                        if e.tag()? == DW_TAG_enumerator {
                            let value = e
                                .attr_integrate(DW_AT_const_value)?
                                .ok_or_else(|| {
                                    self.dwarf().record(DwarfErrorKind::InvalidFormat)
                                })?
                                .udata()?;
                            if value >= count {
                                count = value + 1;
                            }
                        }
                        enumerator = e.sibling()?;
                    }
                    count
                }
                _ => {
                    child = dim.sibling()?;
                    continue;
                }
            };

            let stride = if let Some(attr) = dim.attr_integrate(DW_AT_byte_stride)? {
                attr.udata()?
            } else if let Some(attr) = dim.attr_integrate(DW_AT_bit_stride)? {
                let bits = attr.udata()?;
                if bits % 8 != 0 {
                    return Err(self.dwarf().record(DwarfErrorKind::InvalidFormat));
                }
                bits / 8
            } else {
                element_size
            };

            any = true;
            total = total.wrapping_add(stride.wrapping_mul(count));
            child = dim.sibling()?;
        }

        if !any {
            return Err(self.dwarf().record(DwarfErrorKind::InvalidFormat));
        }
        Ok(total)
    }

    /// The element count of one `DW_TAG_subrange_type` dimension.
    fn subrange_count(&self, dim: &Die<'data, 'a>) -> Result<u64> {
        if let Some(attr) = dim.attr_integrate(DW_AT_count)? {
            return attr.udata();
        }

        let upper = dim
            .attr_integrate(DW_AT_upper_bound)?
            .ok_or_else(|| self.dwarf().record(DwarfErrorKind::NotPresent))?
            .sdata()?;

        let lower = match dim.attr_integrate(DW_AT_lower_bound)? {
            Some(attr) => attr.sdata()?,
            // Per "Subrange Type Entries", the default depends on the
            // source language.
            None => match self.unit().language(self.dwarf())? {
                Some(
                    DW_LANG_C | DW_LANG_C89 | DW_LANG_C99 | DW_LANG_C_plus_plus | DW_LANG_ObjC
                    | DW_LANG_ObjC_plus_plus | DW_LANG_Java | DW_LANG_D | DW_LANG_UPC,
                ) => 0,
                Some(
                    DW_LANG_Ada83 | DW_LANG_Ada95 | DW_LANG_Cobol74 | DW_LANG_Cobol85
                    | DW_LANG_Fortran77 | DW_LANG_Fortran90 | DW_LANG_Fortran95
                    | DW_LANG_Pascal83 | DW_LANG_Modula2 | DW_LANG_PL1,
                ) => 1,
                _ => return Err(self.dwarf().record(DwarfErrorKind::InvalidFormat)),
            },
        };

        if lower > upper {
            return Err(self.dwarf().record(DwarfErrorKind::InvalidFormat));
        }
        Ok((upper - lower + 1) as u64)
    }
}
