//! Collaborator traits that the readers consume.
//!
//! The DWARF core never parses object containers itself. Whatever owns the
//! file (an ELF parser, a memory-mapped core image, a test fixture) implements
//! [`SectionProvider`] and hands out borrowed byte slices; an optional
//! [`Architecture`] supplies target-specific naming and relocation knowledge.

use std::collections::HashMap;

use crate::types::{ElfClass, Endian, Section, SectionKind};

/// Gives the readers access to section data and relocation state.
///
/// When implementing this trait, return borrowed slices wherever possible;
/// every derived structure borrows from the returned data for the lifetime of
/// the reader. Decompression, if the container supports it, happens behind
/// this trait and is invisible to the readers.
pub trait SectionProvider<'data> {
    /// Returns the data of a section, or `None` if the object does not have
    /// it.
    fn section(&self, kind: SectionKind) -> Option<Section<'data>>;

    /// Returns whether the file was compiled for a big-endian or
    /// little-endian machine.
    fn endianness(&self) -> Endian;

    /// Returns the ELF class of the object, from which the default address
    /// size is derived.
    fn elf_class(&self) -> ElfClass;

    /// Applies any pending relocation at `(section, offset)` to `value`.
    ///
    /// Returns `true` if a relocation was applied. If the target is
    /// unrelocated, `value` is left unchanged and the result is `false`.
    /// Call-frame decoding relies on this to tell an unrelocated escape
    /// sentinel apart from a relocated value that happens to collide with it.
    fn relocate_address(&self, kind: SectionKind, offset: u64, value: &mut u64) -> bool {
        let _ = (kind, offset, value);
        false
    }

    /// The runtime address of the text segment, used by `DW_EH_PE_textrel`
    /// encoded pointers.
    fn text_base(&self) -> u64 {
        0
    }

    /// The runtime address of the data segment, used by `DW_EH_PE_datarel`
    /// encoded pointers.
    fn data_base(&self) -> u64 {
        0
    }
}

/// The coarse value category a relocation type resolves to.
///
/// This mirrors the simple ELF data types relocations produce; anything more
/// elaborate is not a "simple" relocation and is reported as unsupported by
/// the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimpleRelocType {
    /// An unsigned 16-bit value.
    Half,
    /// An unsigned 32-bit value.
    Word,
    /// A signed 32-bit value.
    Sword,
    /// An unsigned 64-bit value.
    Xword,
    /// A signed 64-bit value.
    Sxword,
}

/// Target-architecture knowledge the readers can consult.
pub trait Architecture {
    /// The default size in bytes of a target address.
    fn default_address_size(&self) -> u8;

    /// The conventional name of a DWARF register number, if known.
    fn register_name(&self, regno: u16) -> Option<&'static str>;

    /// Classifies a relocation type as one of the simple value categories,
    /// or `None` if it is not a simple relocation.
    fn reloc_simple_type(&self, reloc_type: u32) -> Option<SimpleRelocType> {
        let _ = reloc_type;
        None
    }
}

/// A [`SectionProvider`] over caller-supplied byte slices.
///
/// Useful for tests and for callers that memory-map their objects and locate
/// sections themselves.
#[derive(Debug)]
pub struct SliceProvider<'data> {
    sections: HashMap<SectionKind, Section<'data>>,
    endian: Endian,
    class: ElfClass,
}

impl<'data> SliceProvider<'data> {
    /// Creates an empty provider with the given byte order and ELF class.
    pub fn new(endian: Endian, class: ElfClass) -> Self {
        SliceProvider {
            sections: HashMap::new(),
            endian,
            class,
        }
    }

    /// Registers section data at virtual address 0.
    pub fn insert(&mut self, kind: SectionKind, data: &'data [u8]) -> &mut Self {
        self.insert_at(kind, 0, data)
    }

    /// Registers section data mapped at the given virtual address.
    pub fn insert_at(&mut self, kind: SectionKind, address: u64, data: &'data [u8]) -> &mut Self {
        self.sections.insert(kind, Section { address, data });
        self
    }
}

impl<'data> SectionProvider<'data> for SliceProvider<'data> {
    fn section(&self, kind: SectionKind) -> Option<Section<'data>> {
        self.sections.get(&kind).copied()
    }

    fn endianness(&self) -> Endian {
        self.endian
    }

    fn elf_class(&self) -> ElfClass {
        self.class
    }
}
