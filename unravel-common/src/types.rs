//! Basic types shared by all decoders.

use std::fmt;

/// Byte order of the object file being read, selected at run time.
///
/// The byte order always comes from the object's headers (via the
/// [`SectionProvider`](crate::SectionProvider)), never from the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endian {
    /// Little-endian data representation.
    Little,
    /// Big-endian data representation.
    Big,
}

impl Endian {
    /// Returns true if this is big-endian (most significant bytes first).
    pub fn is_big(self) -> bool {
        self == Endian::Big
    }
}

impl Default for Endian {
    #[cfg(target_endian = "little")]
    fn default() -> Self {
        Endian::Little
    }

    #[cfg(target_endian = "big")]
    fn default() -> Self {
        Endian::Big
    }
}

/// The ELF class of the object providing the sections.
///
/// DWARF call-frame data leaves the address size implicit in the ELF class,
/// so decoders derive a *default* address size from it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElfClass {
    /// `ELFCLASS32`: 4-byte addresses.
    Class32,
    /// `ELFCLASS64`: 8-byte addresses.
    Class64,
}

impl ElfClass {
    /// The size in bytes of an address on the target.
    pub fn address_size(self) -> u8 {
        match self {
            ElfClass::Class32 => 4,
            ElfClass::Class64 => 8,
        }
    }
}

/// The fixed set of sections a [`SectionProvider`](crate::SectionProvider)
/// can be asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SectionKind {
    /// `.debug_info`: the DIE tree of every compilation unit.
    DebugInfo,
    /// `.debug_abbrev`: abbreviation tables.
    DebugAbbrev,
    /// `.debug_line`: line number programs.
    DebugLine,
    /// `.debug_str`: string table referenced by `DW_FORM_strp`.
    DebugStr,
    /// `.debug_loc`: location lists.
    DebugLoc,
    /// `.debug_ranges`: non-contiguous address ranges.
    DebugRanges,
    /// `.debug_aranges`: the address-to-unit index.
    DebugAranges,
    /// `.debug_pubnames`: the global-name index.
    DebugPubnames,
    /// `.debug_macinfo`: macro information.
    DebugMacinfo,
    /// `.debug_frame`: DWARF call-frame information.
    DebugFrame,
    /// `.eh_frame`: GCC exception-handling call-frame information.
    EhFrame,
    /// `.debug_types`: type units keyed by signature.
    DebugTypes,
}

impl SectionKind {
    /// The ELF section name, with leading dot.
    pub fn name(self) -> &'static str {
        match self {
            SectionKind::DebugInfo => ".debug_info",
            SectionKind::DebugAbbrev => ".debug_abbrev",
            SectionKind::DebugLine => ".debug_line",
            SectionKind::DebugStr => ".debug_str",
            SectionKind::DebugLoc => ".debug_loc",
            SectionKind::DebugRanges => ".debug_ranges",
            SectionKind::DebugAranges => ".debug_aranges",
            SectionKind::DebugPubnames => ".debug_pubnames",
            SectionKind::DebugMacinfo => ".debug_macinfo",
            SectionKind::DebugFrame => ".debug_frame",
            SectionKind::EhFrame => ".eh_frame",
            SectionKind::DebugTypes => ".debug_types",
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An immutable byte slice for one section, together with its mapped
/// virtual address.
///
/// All structures decoded from a section borrow from its data for the
/// lifetime of the owning reader.
#[derive(Clone, Copy)]
pub struct Section<'data> {
    /// Virtual address of this section in the loaded image.
    pub address: u64,

    /// Raw data of this section.
    pub data: &'data [u8],
}

impl fmt::Debug for Section<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Section")
            .field("address", &format_args!("{:#x}", self.address))
            .field("len()", &self.data.len())
            .finish()
    }
}
