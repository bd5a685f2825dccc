//! ICO header validation.
//!
//! Icons are not embedded yet; an icon passed on the command line is only checked for a
//! well-formed `ICONDIR` and its `ICONDIRENTRY` records.

use byteorder::{LittleEndian, ReadBytesExt};

use std::io::Read;

use crate::err::IconError;

const ICO_TYPE_ICON: u16 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconDir {
    pub entries: Vec<IconDirEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconDirEntry {
    /// 0 means 256 pixels.
    pub width: u8,
    pub height: u8,
    pub color_count: u8,
    pub reserved: u8,
    pub planes: u16,
    pub bit_count: u16,
    pub bytes_in_res: u32,
    pub image_offset: u32,
}

impl IconDirEntry {
    fn from_reader<R: Read>(input: &mut R) -> Result<IconDirEntry, IconError> {
        Ok(IconDirEntry {
            width: input.read_u8()?,
            height: input.read_u8()?,
            color_count: input.read_u8()?,
            reserved: input.read_u8()?,
            planes: input.read_u16::<LittleEndian>()?,
            bit_count: input.read_u16::<LittleEndian>()?,
            bytes_in_res: input.read_u32::<LittleEndian>()?,
            image_offset: input.read_u32::<LittleEndian>()?,
        })
    }
}

/// Reads and validates the directory at the start of an `.ico` file.
pub fn decode_headers<R: Read>(input: &mut R) -> Result<IconDir, IconError> {
    let reserved = input.read_u16::<LittleEndian>()?;
    if reserved != 0 {
        return Err(IconError::InvalidReserved { value: reserved });
    }

    let kind = input.read_u16::<LittleEndian>()?;
    if kind != ICO_TYPE_ICON {
        return Err(IconError::NotAnIcon { kind });
    }

    let count = input.read_u16::<LittleEndian>()?;
    if count == 0 {
        return Err(IconError::NoImages);
    }

    let mut entries = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        entries.push(IconDirEntry::from_reader(input)?);
    }

    Ok(IconDir { entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn icon_header(reserved: u16, kind: u16, entries: &[[u8; 16]]) -> Vec<u8> {
        let mut buf = vec![];
        buf.extend_from_slice(&reserved.to_le_bytes());
        buf.extend_from_slice(&kind.to_le_bytes());
        buf.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        for e in entries {
            buf.extend_from_slice(e);
        }
        buf
    }

    fn entry_32x32() -> [u8; 16] {
        let mut e = [0_u8; 16];
        e[0] = 32;
        e[1] = 32;
        e[4..6].copy_from_slice(&1_u16.to_le_bytes());
        e[6..8].copy_from_slice(&32_u16.to_le_bytes());
        e[8..12].copy_from_slice(&4264_u32.to_le_bytes());
        e[12..16].copy_from_slice(&22_u32.to_le_bytes());
        e
    }

    #[test]
    fn test_decodes_single_image_directory() {
        let data = icon_header(0, 1, &[entry_32x32()]);
        let dir = decode_headers(&mut Cursor::new(data)).unwrap();

        assert_eq!(
            dir.entries,
            vec![IconDirEntry {
                width: 32,
                height: 32,
                color_count: 0,
                reserved: 0,
                planes: 1,
                bit_count: 32,
                bytes_in_res: 4264,
                image_offset: 22,
            }]
        );
    }

    #[test]
    fn test_rejects_cursor_files() {
        let data = icon_header(0, 2, &[entry_32x32()]);
        assert!(matches!(
            decode_headers(&mut Cursor::new(data)),
            Err(IconError::NotAnIcon { kind: 2 })
        ));
    }

    #[test]
    fn test_rejects_nonzero_reserved() {
        let data = icon_header(7, 1, &[entry_32x32()]);
        assert!(matches!(
            decode_headers(&mut Cursor::new(data)),
            Err(IconError::InvalidReserved { value: 7 })
        ));
    }

    #[test]
    fn test_rejects_empty_directory() {
        let data = icon_header(0, 1, &[]);
        assert!(matches!(
            decode_headers(&mut Cursor::new(data)),
            Err(IconError::NoImages)
        ));
    }

    #[test]
    fn test_rejects_truncated_entries() {
        let mut data = icon_header(0, 1, &[entry_32x32()]);
        data.truncate(6 + 9);

        assert!(matches!(
            decode_headers(&mut Cursor::new(data)),
            Err(IconError::Truncated(_))
        ));
    }
}
