//! Common types and collaborator traits for `unravel`, a library to read
//! DWARF debugging information on behalf of debuggers, profilers, unwinders
//! and symbolizers.
//!
//! This crate carries the pieces that are independent of any one DWARF
//! section:
//!
//!  - [`Endian`], [`ElfClass`], [`SectionKind`] and [`Section`]: how bytes
//!    are ordered, classified and handed around.
//!  - [`Cursor`]: the endian-aware byte cursor every decoder reads through,
//!    including LEB128 and the DWARF initial-length format.
//!  - [`SectionProvider`] and [`Architecture`]: the narrow contracts through
//!    which the readers consume their collaborators. Object-container
//!    parsing lives entirely behind [`SectionProvider`].

#![warn(missing_docs)]

mod cursor;
mod provider;
mod types;

pub use crate::cursor::{Cursor, ReadError};
pub use crate::provider::{Architecture, SectionProvider, SimpleRelocType, SliceProvider};
pub use crate::types::{ElfClass, Endian, Section, SectionKind};
