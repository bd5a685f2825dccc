//! First pass: compute the byte offset of every node before anything is written.
//!
//! The pass walks the schema tree in the same order the emitter will, keeping a running byte
//! counter. Node widths are fixed per scalar kind; streams count their declared length. When the
//! walk reaches one of the [`PATCH_POINTS`], the current offset is recorded as the value of a
//! forward reference elsewhere in the tree.
//!
//! Offsets inside the resource directory are relative to the start of the section's raw data
//! (the top-level directory), not to the start of the file.

use log::{debug, trace};

use crate::err::LayoutError;
use crate::schema::{CoffObject, SUBDIRECTORY_FLAG, field};
use crate::walk::Segment::{Field, Index};
use crate::walk::{Node, NodePath, SchemaVisitor, Segment, ToNode, Walk, walk};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatchPoint {
    /// `/Dir`: section raw-data pointer, and the base for every section-relative offset.
    ResourceRoot,
    /// `/Dir/Dirs[0]`: the type directory's entry.
    NameDirectory,
    /// `/Dir/Dirs[0]/Dirs[0]`: the id directory's entry.
    LanguageDirectory,
    /// `/DataEntries[0]`: the language directory's entry.
    DataEntry,
    /// `/DataEntries[0]/OffsetToData`: the relocation target.
    DataEntryOffsetField,
    /// `/Data[0]`: the data entry's own `OffsetToData`.
    ResourceData,
    /// `/Relocations`: section relocation pointer and raw-data size.
    RelocationTable,
    /// `/Symbols`: file header symbol-table pointer.
    SymbolTable,
}

/// Every forward reference in the object, keyed by the path at which its value becomes known.
pub const PATCH_POINTS: [(&[Segment], PatchPoint); 8] = [
    (&[Field(field::DIR)], PatchPoint::ResourceRoot),
    (
        &[Field(field::DIR), Field(field::DIRS), Index(0)],
        PatchPoint::NameDirectory,
    ),
    (
        &[
            Field(field::DIR),
            Field(field::DIRS),
            Index(0),
            Field(field::DIRS),
            Index(0),
        ],
        PatchPoint::LanguageDirectory,
    ),
    (&[Field(field::DATA_ENTRIES), Index(0)], PatchPoint::DataEntry),
    (
        &[
            Field(field::DATA_ENTRIES),
            Index(0),
            Field(field::OFFSET_TO_DATA),
        ],
        PatchPoint::DataEntryOffsetField,
    ),
    (&[Field(field::DATA), Index(0)], PatchPoint::ResourceData),
    (&[Field(field::RELOCATIONS)], PatchPoint::RelocationTable),
    (&[Field(field::SYMBOLS)], PatchPoint::SymbolTable),
];

/// Resolved offsets of a schema tree.
///
/// File pointers are absolute; everything else is relative to `section_base`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub total_len: u64,
    pub section_base: u32,
    pub pointer_to_raw_data: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_relocations: u32,
    pub pointer_to_symbol_table: u32,
    /// `OffsetToData` of the type directory's entry (subdirectory flag set).
    pub type_entry: u32,
    /// `OffsetToData` of the id directory's entry (subdirectory flag set).
    pub name_entry: u32,
    /// `OffsetToData` of the language directory's entry, addressing the data entry.
    pub language_entry: u32,
    pub relocation_rva: u32,
    pub data_offset: u32,
}

impl Layout {
    pub fn compute(coff: &CoffObject) -> Result<Layout, LayoutError> {
        Layout::compute_node(&coff.to_node())
    }

    pub fn compute_node(root: &Node) -> Result<Layout, LayoutError> {
        let mut pass = LayoutPass::default();
        walk(root, &mut pass)?;

        let layout = pass.finish()?;
        debug!(
            "layout: {} bytes total, section base {}, {} bytes of raw data",
            layout.total_len, layout.section_base, layout.size_of_raw_data
        );

        Ok(layout)
    }

    pub fn total_len(&self) -> u64 {
        self.total_len
    }
}

#[derive(Debug, Default)]
struct LayoutPass {
    offset: u64,
    section_base: Option<u32>,
    pointer_to_raw_data: Option<u32>,
    size_of_raw_data: Option<u32>,
    pointer_to_relocations: Option<u32>,
    pointer_to_symbol_table: Option<u32>,
    type_entry: Option<u32>,
    name_entry: Option<u32>,
    language_entry: Option<u32>,
    relocation_rva: Option<u32>,
    data_offset: Option<u32>,
}

impl LayoutPass {
    fn relative(&self, patch: PatchPoint, path: &NodePath, offset: u32) -> Result<u32, LayoutError> {
        let base = self
            .section_base
            .ok_or_else(|| LayoutError::MissingSectionBase {
                patch,
                path: path.to_string(),
            })?;

        offset
            .checked_sub(base)
            .ok_or_else(|| LayoutError::MissingSectionBase {
                patch,
                path: path.to_string(),
            })
    }

    fn subdirectory(&self, patch: PatchPoint, path: &NodePath, offset: u32) -> Result<u32, LayoutError> {
        let relative = self.relative(patch, path, offset)?;
        if relative & SUBDIRECTORY_FLAG != 0 {
            return Err(LayoutError::OffsetOverflow {
                path: path.to_string(),
            });
        }

        Ok(SUBDIRECTORY_FLAG | relative)
    }

    fn patch(&mut self, patch: PatchPoint, path: &NodePath) -> Result<(), LayoutError> {
        let offset = u32::try_from(self.offset).map_err(|_| LayoutError::OffsetOverflow {
            path: path.to_string(),
        })?;

        match patch {
            PatchPoint::ResourceRoot => {
                self.section_base = Some(offset);
                self.pointer_to_raw_data = Some(offset);
            }
            PatchPoint::NameDirectory => {
                self.type_entry = Some(self.subdirectory(patch, path, offset)?);
            }
            PatchPoint::LanguageDirectory => {
                self.name_entry = Some(self.subdirectory(patch, path, offset)?);
            }
            PatchPoint::DataEntry => {
                self.language_entry = Some(self.relative(patch, path, offset)?);
            }
            PatchPoint::DataEntryOffsetField => {
                self.relocation_rva = Some(self.relative(patch, path, offset)?);
            }
            PatchPoint::ResourceData => {
                self.data_offset = Some(self.relative(patch, path, offset)?);
            }
            PatchPoint::RelocationTable => {
                self.pointer_to_relocations = Some(offset);
                self.size_of_raw_data = Some(self.relative(patch, path, offset)?);
            }
            PatchPoint::SymbolTable => {
                self.pointer_to_symbol_table = Some(offset);
            }
        }

        trace!("{:?} reached at `{}` (offset {})", patch, path, offset);
        Ok(())
    }

    fn finish(self) -> Result<Layout, LayoutError> {
        let missing = |patch| LayoutError::UnresolvedPatchPoint { patch };

        Ok(Layout {
            total_len: self.offset,
            section_base: self.section_base.ok_or(missing(PatchPoint::ResourceRoot))?,
            pointer_to_raw_data: self
                .pointer_to_raw_data
                .ok_or(missing(PatchPoint::ResourceRoot))?,
            type_entry: self.type_entry.ok_or(missing(PatchPoint::NameDirectory))?,
            name_entry: self.name_entry.ok_or(missing(PatchPoint::LanguageDirectory))?,
            language_entry: self.language_entry.ok_or(missing(PatchPoint::DataEntry))?,
            relocation_rva: self
                .relocation_rva
                .ok_or(missing(PatchPoint::DataEntryOffsetField))?,
            data_offset: self.data_offset.ok_or(missing(PatchPoint::ResourceData))?,
            size_of_raw_data: self
                .size_of_raw_data
                .ok_or(missing(PatchPoint::RelocationTable))?,
            pointer_to_relocations: self
                .pointer_to_relocations
                .ok_or(missing(PatchPoint::RelocationTable))?,
            pointer_to_symbol_table: self
                .pointer_to_symbol_table
                .ok_or(missing(PatchPoint::SymbolTable))?,
        })
    }
}

impl SchemaVisitor for LayoutPass {
    type Error = LayoutError;

    fn visit(&mut self, path: &NodePath, node: &Node) -> Result<Walk, LayoutError> {
        for (pattern, patch) in PATCH_POINTS.iter() {
            if path.is(pattern) {
                self.patch(*patch, path)?;
            }
        }

        match node {
            Node::Scalar(scalar) => {
                self.offset = self.offset.saturating_add(u64::from(scalar.width()));
                Ok(Walk::Descend)
            }
            Node::Stream { len, .. } => {
                self.offset = self.offset.saturating_add(*len);
                Ok(Walk::Skip)
            }
            Node::Composite(_) | Node::Sequence(_) => Ok(Walk::Descend),
        }
    }
}
