//! The DWARF line-number program.
//!
//! The program is executed once per `.debug_line` offset into a sorted row
//! table; the decoded table is cached on the reader and shared by every unit
//! pointing at the same offset.

use unravel_common::SectionKind;

use crate::constants::*;
use crate::error::{DwarfErrorKind, Result};
use crate::reader::Dwarf;

/// One source file referenced by a line table.
///
/// Relative names are joined with their directory entry at decode time, so
/// `name` is as close to a usable path as the producer allowed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    /// The file name, joined with its directory when relative.
    pub name: String,
    /// Modification time, or 0 if unavailable.
    pub mtime: u64,
    /// File size in bytes, or 0 if unavailable.
    pub length: u64,
}

/// One row of the decoded line table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineRow {
    /// The program-counter value of a machine instruction.
    pub address: u64,
    /// VLIW operation index within the instruction at `address`.
    pub op_index: u32,
    /// Index into the file table.
    pub file: u64,
    /// Source line number; 0 means "no line".
    pub line: u64,
    /// Source column number; 0 means "no column".
    pub column: u64,
    /// Whether this is a recommended breakpoint location.
    pub is_stmt: bool,
    /// Whether this address begins a basic block.
    pub basic_block: bool,
    /// Whether this row ends a sequence; its address is one past the last
    /// instruction.
    pub end_sequence: bool,
    /// Whether this address is where a function prologue ends.
    pub prologue_end: bool,
    /// Whether this address is where a function epilogue begins.
    pub epilogue_begin: bool,
    /// Instruction-set architecture selector.
    pub isa: u32,
    /// Compiler discriminator for multiple blocks on one line.
    pub discriminator: u64,
}

/// The decoded line table for one line-number program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineTable {
    dirs: Vec<String>,
    files: Vec<FileEntry>,
    rows: Vec<LineRow>,
}

/// The expected operand counts of the standard opcodes. A header whose
/// opcode-length table disagrees for one of these is rejected.
const STANDARD_LENGTHS: [u8; 12] = [0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1];

fn join_file_name(dirs: &[String], dir_index: u64, name: &[u8]) -> Result<String> {
    let name = String::from_utf8_lossy(name);
    if name.starts_with('/') {
        return Ok(name.into_owned());
    }
    let dir = dirs
        .get(dir_index as usize)
        .ok_or(DwarfErrorKind::InvalidFormat)?;
    Ok(format!("{dir}/{name}"))
}

impl LineTable {
    /// Executes the line-number program at `offset` in `.debug_line`.
    pub(crate) fn parse(
        dwarf: &Dwarf<'_>,
        offset: u64,
        comp_dir: Option<&[u8]>,
        address_size: u8,
    ) -> Result<LineTable> {
        let section = dwarf.require_section(SectionKind::DebugLine)?;
        let mut cursor = dwarf.cursor_at(SectionKind::DebugLine, offset)?;

        let (unit_length, offset_size) = cursor.read_initial_length()?;
        let end = cursor.pos() as u64 + unit_length;
        if end > section.data.len() as u64 || unit_length < 2 + offset_size as u64 + 5 {
            return Err(DwarfErrorKind::InvalidFormat.into());
        }
        let end = end as usize;

        let version = cursor.read_u16()?;
        if !(2..=4).contains(&version) {
            return Err(DwarfErrorKind::InvalidFormat.into());
        }

        let header_length = cursor.read_offset(offset_size)?;
        let header_start = cursor.pos() as u64;

        let minimum_instruction_length = cursor.read_u8()?;
        let max_ops_per_instruction = if version >= 4 {
            let max_ops = cursor.read_u8()?;
            if max_ops == 0 {
                return Err(DwarfErrorKind::InvalidFormat.into());
            }
            max_ops
        } else {
            1
        };
        let default_is_stmt = cursor.read_u8()? != 0;
        let line_base = cursor.read_u8()? as i8;
        let line_range = cursor.read_u8()?;
        let opcode_base = cursor.read_u8()?;

        let opcode_lengths = cursor.read_slice(opcode_base.saturating_sub(1) as usize)?;

        // The directory table; the compilation directory is entry zero.
        let mut dirs = vec![comp_dir.map_or_else(String::new, |d| {
            String::from_utf8_lossy(d).into_owned()
        })];
        loop {
            if cursor.pos() >= end {
                return Err(DwarfErrorKind::InvalidFormat.into());
            }
            let name = cursor.read_cstr()?;
            if name.is_empty() {
                break;
            }
            dirs.push(String::from_utf8_lossy(name).into_owned());
        }

        // The file table; index zero is reserved and never named.
        let mut files = vec![FileEntry {
            name: "???".into(),
            mtime: 0,
            length: 0,
        }];
        loop {
            if cursor.pos() >= end {
                return Err(DwarfErrorKind::InvalidFormat.into());
            }
            let name = cursor.read_cstr()?;
            if name.is_empty() {
                break;
            }
            let dir_index = cursor.read_uleb128()?;
            let mtime = cursor.read_uleb128()?;
            let length = cursor.read_uleb128()?;
            files.push(FileEntry {
                name: join_file_name(&dirs, dir_index, name)?,
                mtime,
                length,
            });
        }

        if cursor.pos() as u64 != header_start + header_length {
            return Err(DwarfErrorKind::InvalidFormat.into());
        }

        // State machine registers, per the header-defined initial values.
        let mut address: u64 = 0;
        let mut op_index: u32 = 0;
        let mut file: u64 = 1;
        let mut line: i64 = 1;
        let mut column: u64 = 0;
        let mut is_stmt = default_is_stmt;
        let mut basic_block = false;
        let mut prologue_end = false;
        let mut epilogue_begin = false;
        let mut isa: u32 = 0;
        let mut discriminator: u64 = 0;

        let mut rows: Vec<LineRow> = Vec::new();

        macro_rules! emit {
            ($end_sequence:expr) => {{
                if line < 0 {
                    return Err(DwarfErrorKind::InvalidFormat.into());
                }
                rows.push(LineRow {
                    address,
                    op_index,
                    file,
                    line: line as u64,
                    column,
                    is_stmt,
                    basic_block,
                    end_sequence: $end_sequence,
                    prologue_end,
                    epilogue_begin,
                    isa,
                    discriminator,
                });
            }};
        }

        macro_rules! advance_pc {
            ($advance:expr) => {{
                let advance: u64 = $advance;
                let ops = u64::from(op_index) + advance;
                address += u64::from(minimum_instruction_length)
                    * (ops / u64::from(max_ops_per_instruction));
                op_index = (ops % u64::from(max_ops_per_instruction)) as u32;
            }};
        }

        while cursor.pos() < end {
            let opcode = cursor.read_u8()?;

            if opcode >= opcode_base {
                // Special opcode: line and address advance in one byte.
                if line_range == 0 {
                    return Err(DwarfErrorKind::InvalidFormat.into());
                }
                let adjusted = u64::from(opcode - opcode_base);
                line += i64::from(line_base) + (adjusted % u64::from(line_range)) as i64;
                advance_pc!(adjusted / u64::from(line_range));
                emit!(false);
                basic_block = false;
                prologue_end = false;
                epilogue_begin = false;
                discriminator = 0;
            } else if opcode == 0 {
                // Extended opcode, length-prefixed.
                let length = cursor.read_uleb128()?;
                let operand_start = cursor.pos();
                if length == 0 || cursor.remaining() < length as usize {
                    return Err(DwarfErrorKind::InvalidFormat.into());
                }
                let sub_opcode = cursor.read_u8()?;

                match sub_opcode {
                    DW_LNE_end_sequence => {
                        emit!(true);
                        address = 0;
                        op_index = 0;
                        file = 1;
                        line = 1;
                        column = 0;
                        is_stmt = default_is_stmt;
                        basic_block = false;
                        prologue_end = false;
                        epilogue_begin = false;
                        isa = 0;
                        discriminator = 0;
                    }
                    DW_LNE_set_address => {
                        op_index = 0;
                        let value_offset = cursor.pos() as u64;
                        address = cursor.read_address(address_size)?;
                        dwarf.provider().relocate_address(
                            SectionKind::DebugLine,
                            value_offset,
                            &mut address,
                        );
                    }
                    DW_LNE_define_file => {
                        let name = cursor.read_cstr()?;
                        let dir_index = cursor.read_uleb128()?;
                        let mtime = cursor.read_uleb128()?;
                        let file_length = cursor.read_uleb128()?;
                        files.push(FileEntry {
                            name: join_file_name(&dirs, dir_index, name)?,
                            mtime,
                            length: file_length,
                        });
                    }
                    DW_LNE_set_discriminator => {
                        discriminator = cursor.read_uleb128()?;
                    }
                    _ => {
                        // Unknown extension; the length lets us skip it.
                        cursor.set_pos(operand_start + length as usize);
                    }
                }
            } else if opcode <= DW_LNS_set_isa {
                // A standard opcode we know. The header's operand count must
                // agree with the specification.
                if opcode_lengths.get(opcode as usize - 1).copied()
                    != Some(STANDARD_LENGTHS[opcode as usize - 1])
                {
                    return Err(DwarfErrorKind::InvalidFormat.into());
                }

                match opcode {
                    DW_LNS_copy => {
                        emit!(false);
                        basic_block = false;
                        prologue_end = false;
                        epilogue_begin = false;
                        discriminator = 0;
                    }
                    DW_LNS_advance_pc => {
                        let advance = cursor.read_uleb128()?;
                        advance_pc!(advance);
                    }
                    DW_LNS_advance_line => {
                        line += cursor.read_sleb128()?;
                    }
                    DW_LNS_set_file => {
                        file = cursor.read_uleb128()?;
                    }
                    DW_LNS_set_column => {
                        column = cursor.read_uleb128()?;
                    }
                    DW_LNS_negate_stmt => {
                        is_stmt = !is_stmt;
                    }
                    DW_LNS_set_basic_block => {
                        basic_block = true;
                    }
                    DW_LNS_const_add_pc => {
                        if line_range == 0 {
                            return Err(DwarfErrorKind::InvalidFormat.into());
                        }
                        advance_pc!(u64::from(255 - opcode_base) / u64::from(line_range));
                    }
                    DW_LNS_fixed_advance_pc => {
                        address += u64::from(cursor.read_u16()?);
                        op_index = 0;
                    }
                    DW_LNS_set_prologue_end => {
                        prologue_end = true;
                    }
                    DW_LNS_set_epilogue_begin => {
                        epilogue_begin = true;
                    }
                    DW_LNS_set_isa => {
                        isa = cursor.read_uleb128()? as u32;
                    }
                    _ => unreachable!(),
                }
            } else {
                // A vendor opcode below opcode_base: read and discard the
                // operand count the header declares for it.
                let count = opcode_lengths
                    .get(opcode as usize - 1)
                    .copied()
                    .ok_or(DwarfErrorKind::InvalidFormat)?;
                for _ in 0..count {
                    cursor.read_uleb128()?;
                }
            }
        }

        // Rows are sorted by address, end_sequence markers first, with the
        // emission order breaking remaining ties deterministically.
        let mut sortable: Vec<(usize, LineRow)> = rows.into_iter().enumerate().collect();
        dmsort::sort_by_key(&mut sortable, |&(index, ref row)| {
            (row.address, !row.end_sequence, index)
        });
        let mut rows: Vec<LineRow> = sortable.into_iter().map(|(_, row)| row).collect();

        // The highest address must be marked as a sequence end even when the
        // producer forgot the closing DW_LNE_end_sequence.
        if let Some(last) = rows.last_mut() {
            last.end_sequence = true;
        }

        Ok(LineTable { dirs, files, rows })
    }

    /// The decoded rows, sorted by `(address, !end_sequence)`.
    pub fn rows(&self) -> &[LineRow] {
        &self.rows
    }

    /// The file table. Index 0 is a placeholder; real files start at 1.
    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    /// The directory table. Index 0 is the compilation directory.
    pub fn dirs(&self) -> &[String] {
        &self.dirs
    }

    /// Looks up a file entry by the index stored in a row.
    pub fn file(&self, index: u64) -> Option<&FileEntry> {
        self.files.get(index as usize)
    }

    /// Finds the row covering `pc`, if any.
    pub fn row_for_pc(&self, pc: u64) -> Option<&LineRow> {
        let idx = self.rows.partition_point(|row| row.address <= pc);
        if idx == 0 {
            return None;
        }
        let row = &self.rows[idx - 1];
        // A sequence-end marker means pc is past the covered range.
        (!row.end_sequence).then_some(row)
    }
}
