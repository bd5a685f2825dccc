//! Decoding of emitted resource objects.
//!
//! The COFF side (file header, section table, relocations, symbols, string table) is decoded by
//! `goblin`, so nothing here shares layout knowledge with the writer. Only the resource directory
//! inside `.rsrc` is walked by hand, using `goblin`'s resource records.
//!
//! Only the shape this crate emits is accepted: type directory -> id directory -> language
//! directory -> data entry. A subdirectory flag on the wrong level is an error.

use byteorder::{ByteOrder, LittleEndian};
use goblin::pe::Coff;
use goblin::pe::header::CoffHeader;
use goblin::pe::relocation::Relocation;
use goblin::pe::resource::{ImageResourceDirectory, ResourceDataEntry, ResourceEntry};
use goblin::pe::section_table::SectionTable;
use goblin::pe::symbol::Symbol;

use crate::err::DecodeError;

const RSRC_SECTION: &str = ".rsrc";
const IMAGE_RESOURCE_DIRECTORY_HEADER_SIZE: usize = 16;
const RESOURCE_DATA_ENTRY_SIZE: usize = 16;

/// One resource, found at the end of a type/id/language path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLeaf {
    pub type_id: u32,
    pub name_id: u32,
    pub lang_id: u32,
    /// Section-relative offset of the `IMAGE_RESOURCE_DATA_ENTRY`.
    pub data_entry_offset: u32,
    pub code_page: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct CoffSymbol {
    pub name: String,
    pub symbol: Symbol,
}

#[derive(Debug, Clone)]
pub struct CoffResourceObject {
    pub header: CoffHeader,
    pub section: SectionTable,
    pub relocations: Vec<Relocation>,
    pub symbols: Vec<CoffSymbol>,
    /// Bytes of string data following the table's length field, if there is a symbol table.
    pub string_table_len: Option<usize>,
    pub resources: Vec<ResourceLeaf>,
}

impl CoffResourceObject {
    pub fn parse(buf: &[u8]) -> Result<CoffResourceObject, DecodeError> {
        let coff = Coff::parse(buf)?;

        let section = coff
            .sections
            .iter()
            .find(|s| matches!(s.name(), Ok(RSRC_SECTION)))
            .cloned()
            .ok_or(DecodeError::MalformedObject {
                message: "object has no .rsrc section",
            })?;

        let relocations = section.relocations(buf)?.collect::<Vec<_>>();

        let mut symbols = vec![];
        if let Some(table) = &coff.symbols {
            for (_, inline, symbol) in table.iter() {
                let name = match (inline, &coff.strings) {
                    (Some(name), _) => name.to_string(),
                    (None, Some(strings)) => symbol.name(strings)?.to_string(),
                    (None, None) => {
                        return Err(DecodeError::MalformedObject {
                            message: "symbol name refers to a missing string table",
                        });
                    }
                };
                symbols.push(CoffSymbol { name, symbol });
            }
        }

        let rsrc = slice(
            buf,
            section.pointer_to_raw_data as usize,
            section.size_of_raw_data as usize,
            ".rsrc raw data",
        )?;
        let resources = parse_resource_tree(rsrc)?;

        Ok(CoffResourceObject {
            header: coff.header,
            section,
            relocations,
            symbols,
            string_table_len: coff.strings.as_ref().map(|s| s.len()),
            resources,
        })
    }

    /// The first `RT_MANIFEST` resource, if any.
    pub fn manifest(&self) -> Option<&ResourceLeaf> {
        const RT_MANIFEST: u32 = 24;
        self.resources.iter().find(|r| r.type_id == RT_MANIFEST)
    }
}

fn slice<'a>(
    buf: &'a [u8],
    offset: usize,
    len: usize,
    what: &'static str,
) -> Result<&'a [u8], DecodeError> {
    offset
        .checked_add(len)
        .and_then(|end| buf.get(offset..end))
        .ok_or(DecodeError::Truncated {
            what,
            offset: offset as u64,
            need: len,
            have: buf.len().saturating_sub(offset),
        })
}

fn directory_entries(rsrc: &[u8], dir_offset: usize) -> Result<Vec<ResourceEntry>, DecodeError> {
    let raw = slice(
        rsrc,
        dir_offset,
        IMAGE_RESOURCE_DIRECTORY_HEADER_SIZE,
        "resource directory",
    )?;
    let dir = ImageResourceDirectory {
        characteristics: LittleEndian::read_u32(&raw[0..4]),
        time_date_stamp: LittleEndian::read_u32(&raw[4..8]),
        major_version: LittleEndian::read_u16(&raw[8..10]),
        minor_version: LittleEndian::read_u16(&raw[10..12]),
        number_of_named_entries: LittleEndian::read_u16(&raw[12..14]),
        number_of_id_entries: LittleEndian::read_u16(&raw[14..16]),
    };

    let it = dir
        .next_iter(dir_offset + IMAGE_RESOURCE_DIRECTORY_HEADER_SIZE, rsrc)
        .map_err(|_| DecodeError::MalformedResource {
            message: "resource directory entries out of bounds",
        })?;

    it.collect::<Result<Vec<_>, _>>()
        .map_err(|_| DecodeError::MalformedResource {
            message: "failed to parse resource directory entries",
        })
}

fn entry_id(entry: &ResourceEntry) -> Result<u32, DecodeError> {
    if entry.name_is_string() {
        return Err(DecodeError::MalformedResource {
            message: "named resource entries are not expected",
        });
    }

    Ok(entry.name_offset())
}

fn subdirectory(entry: &ResourceEntry, level: &'static str) -> Result<usize, DecodeError> {
    if !entry.data_is_directory() {
        return Err(DecodeError::MalformedResource { message: level });
    }

    Ok(entry.offset_to_directory() as usize)
}

fn parse_resource_data_entry(
    rsrc: &[u8],
    offset: usize,
) -> Result<ResourceDataEntry, DecodeError> {
    let raw = slice(rsrc, offset, RESOURCE_DATA_ENTRY_SIZE, "resource data entry")?;

    Ok(ResourceDataEntry {
        offset_to_data: LittleEndian::read_u32(&raw[0..4]),
        size: LittleEndian::read_u32(&raw[4..8]),
        code_page: LittleEndian::read_u32(&raw[8..12]),
        reserved: LittleEndian::read_u32(&raw[12..16]),
    })
}

fn parse_resource_tree(rsrc: &[u8]) -> Result<Vec<ResourceLeaf>, DecodeError> {
    let mut out = Vec::new();

    for type_entry in directory_entries(rsrc, 0)? {
        let type_id = entry_id(&type_entry)?;
        let name_dir = subdirectory(&type_entry, "type entry does not address a directory")?;

        for name_entry in directory_entries(rsrc, name_dir)? {
            let name_id = entry_id(&name_entry)?;
            let lang_dir = subdirectory(&name_entry, "id entry does not address a directory")?;

            for lang_entry in directory_entries(rsrc, lang_dir)? {
                let lang_id = entry_id(&lang_entry)?;

                let Some(data_entry_offset) = lang_entry.offset_to_data() else {
                    return Err(DecodeError::MalformedResource {
                        message: "language entry addresses a directory",
                    });
                };

                let data_entry = parse_resource_data_entry(rsrc, data_entry_offset as usize)?;
                let data = slice(
                    rsrc,
                    data_entry.offset_to_data as usize,
                    data_entry.size as usize,
                    "resource data",
                )?
                .to_vec();

                out.push(ResourceLeaf {
                    type_id,
                    name_id,
                    lang_id,
                    data_entry_offset,
                    code_page: data_entry.code_page,
                    data,
                });
            }
        }
    }

    Ok(out)
}
