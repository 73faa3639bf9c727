//! The error type shared by all DWARF decoders.

use std::error::Error;
use std::fmt;

use thiserror::Error;
use unravel_common::{ReadError, SectionKind};

/// The error kind for [`DwarfError`].
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DwarfErrorKind {
    /// An allocation for a cache entry failed.
    OutOfMemory,

    /// The debug data violates the DWARF encoding: a truncated section, a bad
    /// length field, an invalid version, an opcode that cannot be skipped, a
    /// malformed CIE or FDE, or similar structural damage.
    InvalidFormat,

    /// A section required to answer the request is not present in the object.
    NoDebugInfo(SectionKind),

    /// The queried attribute, DIE, abbreviation or range does not exist.
    /// This is distinct from [`InvalidFormat`](Self::InvalidFormat): the data
    /// is well-formed, it just does not contain the requested entity.
    NotPresent,

    /// No compilation unit, FDE or range covers the requested address.
    NoMatch,

    /// An attribute form this implementation does not decode.
    UnsupportedForm(u16),
}

impl fmt::Display for DwarfErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::InvalidFormat => write!(f, "invalid DWARF data"),
            Self::NoDebugInfo(section) => write!(f, "{section} section missing"),
            Self::NotPresent => write!(f, "no such entry"),
            Self::NoMatch => write!(f, "no matching address range"),
            Self::UnsupportedForm(form) => write!(f, "unsupported attribute form {form:#x}"),
        }
    }
}

/// An error reading DWARF debugging information.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct DwarfError {
    kind: DwarfErrorKind,
    #[source]
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl DwarfError {
    /// Creates a new error from a known kind of error as well as an arbitrary
    /// error payload.
    pub(crate) fn new<E>(kind: DwarfErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let source = Some(source.into());
        Self { kind, source }
    }

    /// Returns the corresponding [`DwarfErrorKind`] for this error.
    pub fn kind(&self) -> DwarfErrorKind {
        self.kind
    }
}

impl From<DwarfErrorKind> for DwarfError {
    fn from(kind: DwarfErrorKind) -> Self {
        Self { kind, source: None }
    }
}

impl From<ReadError> for DwarfError {
    fn from(e: ReadError) -> Self {
        Self::new(DwarfErrorKind::InvalidFormat, e)
    }
}

/// The result type used throughout this crate.
pub type Result<T, E = DwarfError> = std::result::Result<T, E>;
