//! The object file as a typed tree.
//!
//! A manifest `.syso` is a COFF object with a single `.rsrc` section, laid out as:
//!
//! ```text
//! IMAGE_FILE_HEADER                       20 bytes
//! IMAGE_SECTION_HEADER (.rsrc)            40 bytes
//! ---- section raw data ----------------- offsets below are relative to here
//! IMAGE_RESOURCE_DIRECTORY (type)         16 bytes + 8 per entry
//!   IMAGE_RESOURCE_DIRECTORY (id)         16 bytes + 8 per entry
//!     IMAGE_RESOURCE_DIRECTORY (language) 16 bytes + 8 per entry
//! IMAGE_RESOURCE_DATA_ENTRY               16 bytes
//! manifest bytes                          N bytes
//! ---- end of section raw data ----------
//! IMAGE_RELOCATION                        10 bytes
//! IMAGE_SYMBOL                            18 bytes
//! string table length                      4 bytes
//! ```
//!
//! The tree is built with zeroed offsets; [`crate::layout::Layout`] computes them and
//! [`CoffObject::resolve`] produces the tree that gets emitted.

use bitflags::bitflags;

use crate::err::{LayoutError, Result, RsrcError};
use crate::layout::{Layout, PatchPoint};
use crate::settings::RsrcSettings;
use crate::walk::{Node, Scalar, ToNode};

pub const RT_MANIFEST: u32 = 24;
pub const MANIFEST_RESOURCE_ID: u32 = 1;

/// Set in `IMAGE_RESOURCE_DIRECTORY_ENTRY.OffsetToData` when the entry addresses a directory.
pub const SUBDIRECTORY_FLAG: u32 = 1 << 31;
/// Set in `IMAGE_RESOURCE_DIRECTORY_ENTRY.NameOrId` when the entry is keyed by name.
pub const NAME_IS_STRING_FLAG: u32 = 1 << 31;

pub const SECTION_NAME: [u8; 8] = *b".rsrc\0\0\0";

pub const IMAGE_SYM_CLASS_STATIC: u8 = 3;

/// Encoded size of the string table when it holds no strings.
pub const STRINGS_HEADER_SIZE: u32 = 4;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileCharacteristics: u16 {
        const LINE_NUMS_STRIPPED = 0x0004;
        const MACHINE_32BIT = 0x0100;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionCharacteristics: u32 {
        const CNT_INITIALIZED_DATA = 0x0000_0040;
        const MEM_READ = 0x4000_0000;
    }
}

/// Names of the structural fields, shared by the node views and the layout patch table.
pub mod field {
    pub const FILE_HEADER: &str = "FileHeader";
    pub const SECTION_HEADER: &str = "SectionHeader";
    pub const DIR: &str = "Dir";
    pub const DIR_ENTRIES: &str = "DirEntries";
    pub const DIRS: &str = "Dirs";
    pub const DATA_ENTRIES: &str = "DataEntries";
    pub const OFFSET_TO_DATA: &str = "OffsetToData";
    pub const DATA: &str = "Data";
    pub const RELOCATIONS: &str = "Relocations";
    pub const SYMBOLS: &str = "Symbols";
    pub const STRINGS_HEADER: &str = "StringsHeader";
}

fn u8_node(v: u8) -> Node {
    Node::Scalar(Scalar::U8(v))
}

fn u16_node(v: u16) -> Node {
    Node::Scalar(Scalar::U16(v))
}

fn u32_node(v: u32) -> Node {
    Node::Scalar(Scalar::U32(v))
}

/// `IMAGE_FILE_HEADER`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub machine: u16,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub pointer_to_symbol_table: u32,
    pub number_of_symbols: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

impl ToNode for FileHeader {
    fn to_node(&self) -> Node {
        Node::Composite(vec![
            ("Machine", u16_node(self.machine)),
            ("NumberOfSections", u16_node(self.number_of_sections)),
            ("TimeDateStamp", u32_node(self.time_date_stamp)),
            ("PointerToSymbolTable", u32_node(self.pointer_to_symbol_table)),
            ("NumberOfSymbols", u32_node(self.number_of_symbols)),
            ("SizeOfOptionalHeader", u16_node(self.size_of_optional_header)),
            ("Characteristics", u16_node(self.characteristics)),
        ])
    }
}

/// `IMAGE_SECTION_HEADER`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub pointer_to_relocations: u32,
    pub pointer_to_line_numbers: u32,
    pub number_of_relocations: u16,
    pub number_of_line_numbers: u16,
    pub characteristics: u32,
}

impl ToNode for SectionHeader {
    fn to_node(&self) -> Node {
        Node::Composite(vec![
            ("Name", Node::Scalar(Scalar::Name(self.name))),
            ("VirtualSize", u32_node(self.virtual_size)),
            ("VirtualAddress", u32_node(self.virtual_address)),
            ("SizeOfRawData", u32_node(self.size_of_raw_data)),
            ("PointerToRawData", u32_node(self.pointer_to_raw_data)),
            ("PointerToRelocations", u32_node(self.pointer_to_relocations)),
            ("PointerToLineNumbers", u32_node(self.pointer_to_line_numbers)),
            ("NumberOfRelocations", u16_node(self.number_of_relocations)),
            ("NumberOfLineNumbers", u16_node(self.number_of_line_numbers)),
            ("Characteristics", u32_node(self.characteristics)),
        ])
    }
}

/// `IMAGE_RESOURCE_DIRECTORY`, followed by its entries and then its subdirectories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub number_of_named_entries: u16,
    pub number_of_id_entries: u16,
    pub entries: Vec<DirEntry>,
    pub dirs: Vec<Directory>,
}

impl Directory {
    /// Builds a directory whose named/id entry counts are derived from `entries`.
    pub fn new(entries: Vec<DirEntry>, dirs: Vec<Directory>) -> Result<Self> {
        let named = entries.iter().filter(|e| e.is_named()).count();
        let ids = entries.len() - named;

        let count = |n: usize| {
            u16::try_from(n).map_err(|_| RsrcError::TooManyDirectoryEntries { count: n })
        };

        Ok(Directory {
            characteristics: 0,
            time_date_stamp: 0,
            major_version: 0,
            minor_version: 0,
            number_of_named_entries: count(named)?,
            number_of_id_entries: count(ids)?,
            entries,
            dirs,
        })
    }

    fn first_entry_mut(&mut self, patch: PatchPoint) -> std::result::Result<&mut DirEntry, LayoutError> {
        self.entries
            .first_mut()
            .ok_or(LayoutError::UnresolvedPatchPoint { patch })
    }

    fn first_dir_mut(&mut self, patch: PatchPoint) -> std::result::Result<&mut Directory, LayoutError> {
        self.dirs
            .first_mut()
            .ok_or(LayoutError::UnresolvedPatchPoint { patch })
    }
}

impl ToNode for Directory {
    fn to_node(&self) -> Node {
        Node::Composite(vec![
            ("Characteristics", u32_node(self.characteristics)),
            ("TimeDateStamp", u32_node(self.time_date_stamp)),
            ("MajorVersion", u16_node(self.major_version)),
            ("MinorVersion", u16_node(self.minor_version)),
            ("NumberOfNamedEntries", u16_node(self.number_of_named_entries)),
            ("NumberOfIdEntries", u16_node(self.number_of_id_entries)),
            (field::DIR_ENTRIES, self.entries.to_node()),
            (field::DIRS, self.dirs.to_node()),
        ])
    }
}

/// `IMAGE_RESOURCE_DIRECTORY_ENTRY`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name_or_id: u32,
    pub offset_to_data: u32,
}

impl DirEntry {
    pub fn id(id: u32) -> Self {
        DirEntry {
            name_or_id: id,
            offset_to_data: 0,
        }
    }

    pub fn is_named(&self) -> bool {
        self.name_or_id & NAME_IS_STRING_FLAG != 0
    }

    pub fn addresses_directory(&self) -> bool {
        self.offset_to_data & SUBDIRECTORY_FLAG != 0
    }
}

impl ToNode for DirEntry {
    fn to_node(&self) -> Node {
        Node::Composite(vec![
            ("NameOrId", u32_node(self.name_or_id)),
            (field::OFFSET_TO_DATA, u32_node(self.offset_to_data)),
        ])
    }
}

/// `IMAGE_RESOURCE_DATA_ENTRY`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataEntry {
    /// Section-relative here; the relocation turns it into an RVA at link time.
    pub offset_to_data: u32,
    pub size: u32,
    pub code_page: u32,
    pub reserved: u32,
}

impl ToNode for DataEntry {
    fn to_node(&self) -> Node {
        Node::Composite(vec![
            (field::OFFSET_TO_DATA, u32_node(self.offset_to_data)),
            ("Size", u32_node(self.size)),
            ("CodePage", u32_node(self.code_page)),
            ("Reserved", u32_node(self.reserved)),
        ])
    }
}

/// Raw resource bytes, supplied to the emitter as stream `stream`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceData {
    pub stream: usize,
    pub len: u64,
}

impl ToNode for ResourceData {
    fn to_node(&self) -> Node {
        Node::Stream {
            id: self.stream,
            len: self.len,
        }
    }
}

/// `IMAGE_RELOCATION`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocationEntry {
    /// Section-relative offset of the 32-bit value to relocate.
    pub rva: u32,
    pub symbol_index: u32,
    pub kind: u16,
}

impl ToNode for RelocationEntry {
    fn to_node(&self) -> Node {
        Node::Composite(vec![
            ("RVA", u32_node(self.rva)),
            ("SymbolIndex", u32_node(self.symbol_index)),
            ("Type", u16_node(self.kind)),
        ])
    }
}

/// `IMAGE_SYMBOL`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: [u8; 8],
    pub value: u32,
    pub section_number: u16,
    pub kind: u16,
    pub storage_class: u8,
    pub auxiliary_count: u8,
}

impl ToNode for Symbol {
    fn to_node(&self) -> Node {
        Node::Composite(vec![
            ("Name", Node::Scalar(Scalar::Name(self.name))),
            ("Value", u32_node(self.value)),
            ("SectionNumber", u16_node(self.section_number)),
            ("Type", u16_node(self.kind)),
            ("StorageClass", u8_node(self.storage_class)),
            ("AuxiliaryCount", u8_node(self.auxiliary_count)),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringsHeader {
    pub length: u32,
}

impl ToNode for StringsHeader {
    fn to_node(&self) -> Node {
        Node::Composite(vec![("Length", u32_node(self.length))])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoffObject {
    pub file_header: FileHeader,
    pub section_header: SectionHeader,
    pub dir: Directory,
    pub data_entries: Vec<DataEntry>,
    pub data: Vec<ResourceData>,
    pub relocations: Vec<RelocationEntry>,
    pub symbols: Vec<Symbol>,
    pub strings_header: StringsHeader,
}

impl CoffObject {
    /// Builds the fixed-shape tree embedding a manifest of `manifest_len` bytes as stream `0`.
    ///
    /// All offsets are left at zero.
    pub fn manifest(manifest_len: u64, settings: &RsrcSettings) -> Result<CoffObject> {
        let size = u32::try_from(manifest_len)
            .map_err(|_| RsrcError::ManifestTooLarge { len: manifest_len })?;

        let arch = settings.get_arch();
        let mut characteristics = FileCharacteristics::LINE_NUMS_STRIPPED;
        if arch.is_32bit() {
            characteristics |= FileCharacteristics::MACHINE_32BIT;
        }

        // type -> id -> language
        let language_dir = Directory::new(
            vec![DirEntry::id(u32::from(settings.get_language_id()))],
            vec![],
        )?;
        let name_dir =
            Directory::new(vec![DirEntry::id(MANIFEST_RESOURCE_ID)], vec![language_dir])?;
        let type_dir = Directory::new(vec![DirEntry::id(RT_MANIFEST)], vec![name_dir])?;

        Ok(CoffObject {
            file_header: FileHeader {
                machine: arch.machine(),
                number_of_sections: 1,
                time_date_stamp: 0,
                pointer_to_symbol_table: 0,
                number_of_symbols: 1,
                size_of_optional_header: 0,
                characteristics: characteristics.bits(),
            },
            section_header: SectionHeader {
                name: SECTION_NAME,
                virtual_size: 0,
                virtual_address: 0,
                size_of_raw_data: 0,
                pointer_to_raw_data: 0,
                pointer_to_relocations: 0,
                pointer_to_line_numbers: 0,
                number_of_relocations: 1,
                number_of_line_numbers: 0,
                characteristics: (SectionCharacteristics::CNT_INITIALIZED_DATA
                    | SectionCharacteristics::MEM_READ)
                    .bits(),
            },
            dir: type_dir,
            data_entries: vec![DataEntry {
                offset_to_data: 0,
                size,
                code_page: 0,
                reserved: 0,
            }],
            data: vec![ResourceData {
                stream: 0,
                len: manifest_len,
            }],
            relocations: vec![RelocationEntry {
                rva: 0,
                symbol_index: 0,
                kind: arch.addr32nb_relocation(),
            }],
            symbols: vec![Symbol {
                name: SECTION_NAME,
                value: 0,
                section_number: 1,
                kind: 0,
                storage_class: IMAGE_SYM_CLASS_STATIC,
                auxiliary_count: 0,
            }],
            strings_header: StringsHeader {
                length: STRINGS_HEADER_SIZE,
            },
        })
    }

    /// Returns a copy of the tree with every offset computed by `layout` filled in.
    pub fn resolve(mut self, layout: &Layout) -> std::result::Result<CoffObject, LayoutError> {
        self.file_header.pointer_to_symbol_table = layout.pointer_to_symbol_table;

        self.section_header.pointer_to_raw_data = layout.pointer_to_raw_data;
        self.section_header.size_of_raw_data = layout.size_of_raw_data;
        self.section_header.pointer_to_relocations = layout.pointer_to_relocations;

        let type_dir = &mut self.dir;
        type_dir.first_entry_mut(PatchPoint::NameDirectory)?.offset_to_data = layout.type_entry;

        let name_dir = type_dir.first_dir_mut(PatchPoint::NameDirectory)?;
        name_dir.first_entry_mut(PatchPoint::LanguageDirectory)?.offset_to_data = layout.name_entry;

        let language_dir = name_dir.first_dir_mut(PatchPoint::LanguageDirectory)?;
        language_dir.first_entry_mut(PatchPoint::DataEntry)?.offset_to_data =
            layout.language_entry;

        self.data_entries
            .first_mut()
            .ok_or(LayoutError::UnresolvedPatchPoint {
                patch: PatchPoint::ResourceData,
            })?
            .offset_to_data = layout.data_offset;

        self.relocations
            .first_mut()
            .ok_or(LayoutError::UnresolvedPatchPoint {
                patch: PatchPoint::DataEntryOffsetField,
            })?
            .rva = layout.relocation_rva;

        Ok(self)
    }
}

impl ToNode for CoffObject {
    fn to_node(&self) -> Node {
        Node::Composite(vec![
            (field::FILE_HEADER, self.file_header.to_node()),
            (field::SECTION_HEADER, self.section_header.to_node()),
            (field::DIR, self.dir.to_node()),
            (field::DATA_ENTRIES, self.data_entries.to_node()),
            (field::DATA, self.data.to_node()),
            (field::RELOCATIONS, self.relocations.to_node()),
            (field::SYMBOLS, self.symbols.to_node()),
            (field::STRINGS_HEADER, self.strings_header.to_node()),
        ])
    }
}
