//! # TIFF directory reader
//!
//! Reads the first image file directory of a classic TIFF or BigTIFF file and
//! keeps every entry's raw payload. Pixel data is never touched; vendors hide
//! their metadata in private tags, which is all the decoders need.
//!
//! All offsets are checked against the stream length and payload sizes are
//! capped, so arbitrary input yields an error rather than a huge allocation.

mod error;

#[cfg(test)]
mod tests;

pub use error::TiffError;

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

/// Tag numbers used by the decoders
pub mod tags {
    /// ImageWidth
    pub const IMAGE_WIDTH: u16 = 256;
    /// ImageLength
    pub const IMAGE_LENGTH: u16 = 257;
    /// Make
    pub const MAKE: u16 = 271;
    /// Model
    pub const MODEL: u16 = 272;
    /// Software
    pub const SOFTWARE: u16 = 305;
    /// DateTime (`YYYY:MM:DD HH:MM:SS`)
    pub const DATE_TIME: u16 = 306;
    /// Artist
    pub const ARTIST: u16 = 315;
    /// FEI/Thermo INI metadata
    pub const FEI_METADATA: u16 = 34682;
    /// FEI/Thermo supplementary XML
    pub const FEI_XML: u16 = 34683;
    /// Tescan INI metadata
    pub const TESCAN_METADATA: u16 = 50431;
    /// Fibics XML
    pub const FIBICS_XML: u16 = 51023;
    /// Zeiss Orion XML
    pub const ZEISS_XML: u16 = 65000;
}

/// Entries beyond this count are rejected.
const MAX_ENTRIES: u64 = 4096;

/// Single payloads larger than this are skipped.
const MAX_PAYLOAD: u64 = 64 * 1024 * 1024;

/// Byte order declared in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    /// `II`
    Little,
    /// `MM`
    Big,
}

impl Endian {
    fn read_u16<R: Read>(self, r: &mut R) -> std::io::Result<u16> {
        match self {
            Endian::Little => r.read_u16::<LittleEndian>(),
            Endian::Big => r.read_u16::<BigEndian>(),
        }
    }

    fn read_u32<R: Read>(self, r: &mut R) -> std::io::Result<u32> {
        match self {
            Endian::Little => r.read_u32::<LittleEndian>(),
            Endian::Big => r.read_u32::<BigEndian>(),
        }
    }

    fn read_u64<R: Read>(self, r: &mut R) -> std::io::Result<u64> {
        match self {
            Endian::Little => r.read_u64::<LittleEndian>(),
            Endian::Big => r.read_u64::<BigEndian>(),
        }
    }

    fn u16_at(self, buf: &[u8]) -> u16 {
        match self {
            Endian::Little => LittleEndian::read_u16(buf),
            Endian::Big => BigEndian::read_u16(buf),
        }
    }

    fn u32_at(self, buf: &[u8]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(buf),
            Endian::Big => BigEndian::read_u32(buf),
        }
    }

    fn u64_at(self, buf: &[u8]) -> u64 {
        match self {
            Endian::Little => LittleEndian::read_u64(buf),
            Endian::Big => BigEndian::read_u64(buf),
        }
    }
}

/// Size in bytes of one value of a TIFF field type; `None` for unknown types.
fn type_size(field_type: u16) -> Option<u64> {
    match field_type {
        1 | 2 | 6 | 7 => Some(1),
        3 | 8 => Some(2),
        4 | 9 | 11 | 13 => Some(4),
        5 | 10 | 12 | 16 | 17 | 18 => Some(8),
        _ => None,
    }
}

/// One directory entry with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TiffEntry {
    /// Tag number
    pub tag: u16,
    /// TIFF field type
    pub field_type: u16,
    /// Number of values
    pub count: u64,
    /// Raw payload in file byte order
    pub data: Vec<u8>,
}

/// First image file directory of a TIFF file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TiffDirectory {
    endian: Endian,
    big_tiff: bool,
    entries: Vec<TiffEntry>,
}

impl TiffDirectory {
    /// Read the first directory from a seekable stream.
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<TiffDirectory, TiffError> {
        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        let mut mark = [0u8; 2];
        reader.read_exact(&mut mark)?;
        let endian = match &mark {
            b"II" => Endian::Little,
            b"MM" => Endian::Big,
            _ => return Err(TiffError::BadByteOrder(mark)),
        };
        let big_tiff = match endian.read_u16(reader)? {
            42 => false,
            43 => true,
            other => return Err(TiffError::BadVersion(other)),
        };
        let ifd_offset = if big_tiff {
            let _offset_size = endian.read_u16(reader)?;
            let _reserved = endian.read_u16(reader)?;
            endian.read_u64(reader)?
        } else {
            u64::from(endian.read_u32(reader)?)
        };
        check_bounds(ifd_offset, len)?;
        reader.seek(SeekFrom::Start(ifd_offset))?;

        let count = if big_tiff {
            endian.read_u64(reader)?
        } else {
            u64::from(endian.read_u16(reader)?)
        };
        if count > MAX_ENTRIES {
            return Err(TiffError::TooManyEntries(count));
        }

        let inline_size: usize = if big_tiff { 8 } else { 4 };
        let mut headers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let tag = endian.read_u16(reader)?;
            let field_type = endian.read_u16(reader)?;
            let value_count = if big_tiff {
                endian.read_u64(reader)?
            } else {
                u64::from(endian.read_u32(reader)?)
            };
            let mut value = vec![0u8; inline_size];
            reader.read_exact(&mut value)?;
            headers.push((tag, field_type, value_count, value));
        }

        let mut entries = Vec::with_capacity(headers.len());
        for (tag, field_type, value_count, value) in headers {
            let Some(size) = type_size(field_type).and_then(|s| s.checked_mul(value_count)) else {
                log::debug!("skipping TIFF tag {tag} with unknown type {field_type}");
                continue;
            };
            if size > MAX_PAYLOAD {
                log::debug!("skipping TIFF tag {tag}: {size} byte payload");
                continue;
            }
            let data = if size <= inline_size as u64 {
                value[..size as usize].to_vec()
            } else {
                let offset = if big_tiff {
                    endian.u64_at(&value)
                } else {
                    u64::from(endian.u32_at(&value))
                };
                let end = offset.checked_add(size).ok_or(TiffError::OffsetOutOfBounds { offset, len })?;
                if end > len {
                    log::debug!("skipping TIFF tag {tag}: payload past end of file");
                    continue;
                }
                reader.seek(SeekFrom::Start(offset))?;
                let mut data = vec![0u8; size as usize];
                reader.read_exact(&mut data)?;
                data
            };
            entries.push(TiffEntry {
                tag,
                field_type,
                count: value_count,
                data,
            });
        }

        Ok(TiffDirectory {
            endian,
            big_tiff,
            entries,
        })
    }

    /// Read the first directory of the file at `path`.
    pub fn from_path(path: &Path) -> Result<TiffDirectory, TiffError> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::read(&mut reader)
    }

    /// Read the first directory from an in-memory buffer.
    pub fn from_bytes(bytes: &[u8]) -> Result<TiffDirectory, TiffError> {
        Self::read(&mut Cursor::new(bytes))
    }

    /// Declared byte order
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Whether the file is BigTIFF
    pub fn is_big_tiff(&self) -> bool {
        self.big_tiff
    }

    /// All entries in directory order
    pub fn entries(&self) -> &[TiffEntry] {
        &self.entries
    }

    /// Entry for `tag`
    pub fn entry(&self, tag: u16) -> Option<&TiffEntry> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    /// Whether `tag` is present
    pub fn has(&self, tag: u16) -> bool {
        self.entry(tag).is_some()
    }

    /// Raw payload of `tag`
    pub fn bytes(&self, tag: u16) -> Option<&[u8]> {
        self.entry(tag).map(|e| e.data.as_slice())
    }

    /// Payload of `tag` as text with trailing NULs and whitespace removed
    pub fn ascii(&self, tag: u16) -> Option<String> {
        let data = self.bytes(tag)?;
        let text = String::from_utf8_lossy(data);
        let text = text.trim_end_matches(['\0', ' ', '\n', '\r']);
        (!text.is_empty()).then(|| text.to_string())
    }

    /// First value of an integer-typed `tag`
    pub fn unsigned(&self, tag: u16) -> Option<u64> {
        let entry = self.entry(tag)?;
        let data = entry.data.as_slice();
        match entry.field_type {
            1 | 7 => data.first().map(|b| u64::from(*b)),
            3 if data.len() >= 2 => Some(u64::from(self.endian.u16_at(data))),
            4 | 13 if data.len() >= 4 => Some(u64::from(self.endian.u32_at(data))),
            16 | 18 if data.len() >= 8 => Some(self.endian.u64_at(data)),
            _ => None,
        }
    }
}

fn check_bounds(offset: u64, len: u64) -> Result<(), TiffError> {
    if offset >= len {
        return Err(TiffError::OffsetOutOfBounds { offset, len });
    }
    Ok(())
}
