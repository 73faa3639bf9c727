//! A reader for DWARF 2/3/4 debugging information.
//!
//! This crate decodes the compact DWARF encoding on behalf of debuggers,
//! profilers, unwinders and symbolizers. It never parses object containers
//! itself: sections arrive through the
//! [`SectionProvider`](unravel_common::SectionProvider) trait from
//! [`unravel-common`](unravel_common), typically backed by an ELF parser or
//! a memory-mapped core image.
//!
//! The entry point is [`Dwarf`], created once per object. From it hang the
//! lazily built structures:
//!
//!  - [`Unit`]: compilation units and type units, found by section offset,
//!    iteration, or PC (through the `.debug_aranges` index).
//!  - [`Die`]: cheap cursors over the DIE tree with attribute lookup,
//!    including `DW_AT_abstract_origin`/`DW_AT_specification` integration
//!    and cross-unit references.
//!  - [`LineTable`]: the executed line-number program, sorted by address.
//!  - [`Expression`]: location expressions interned per block so repeated
//!    lookups return the same reference.
//!  - [`CallFrameInfo`]: CIE/FDE decoding for `.debug_frame` and
//!    `.eh_frame`, including encoded pointers and per-PC unwind rules.
//!
//! All caches are monotone and owned by the [`Dwarf`]; handles borrow from
//! it and stay valid for its lifetime. A reader is single-threaded by
//! design; run independent readers in parallel instead.
//!
//! # Example
//!
//! ```no_run
//! use unravel_common::{ElfClass, Endian, SectionKind, SliceProvider};
//! use unravel_dwarf::Dwarf;
//!
//! # fn main() -> Result<(), unravel_dwarf::DwarfError> {
//! # let info: &[u8] = &[]; let abbrev: &[u8] = &[];
//! let mut provider = SliceProvider::new(Endian::Little, ElfClass::Class64);
//! provider.insert(SectionKind::DebugInfo, info);
//! provider.insert(SectionKind::DebugAbbrev, abbrev);
//!
//! let dwarf = Dwarf::new(&provider);
//! let unit = dwarf.unit_for_pc(0x4006a0)?;
//! for scope in unit.scopes_for_pc(&dwarf, 0x4006a0)? {
//!     println!("{:?} {:?}", scope.tag()?, scope.name()?);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod abbrev;
mod aggregate;
mod aranges;
mod die;
mod error;
mod forms;
mod line;
mod location;
mod ranges;
mod reader;
mod scopes;
mod unit;

pub mod cfi;
pub mod constants;

pub use crate::abbrev::{Abbrev, AttrSpec};
pub use crate::aranges::{Arange, ArangeIndex};
pub use crate::cfi::CallFrameInfo;
pub use crate::die::{Attribute, AttrsIter, Die};
pub use crate::error::{DwarfError, DwarfErrorKind, Result};
pub use crate::forms::AttributeValue;
pub use crate::line::{FileEntry, LineRow, LineTable};
pub use crate::location::{Expression, Operation};
pub use crate::ranges::RangesIter;
pub use crate::reader::{Dwarf, UnitsIter};
pub use crate::scopes::{classify, DieClass};
pub use crate::unit::{Unit, UnitSection};
