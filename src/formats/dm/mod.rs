//! # DigitalMicrograph tag trees
//!
//! Reader for Gatan DM3 and DM4 files. Only the tag tree is decoded; the
//! image payload (`Data` arrays) and any other large arrays are skipped by
//! seeking past them, so metadata does not depend on pixel content.
//!
//! ## Layout
//!
//! ```text
//! header   version:u32  root_len:u32|u64  byte_order:u32     (big-endian)
//! group    sorted:u8  open:u8  ntags:u32|u64
//! tag      kind:u8 (20 group, 21 data)  label_len:u16  label  [DM4: size:u64]
//! data     "%%%%"  ninfo:u32|u64  info[ninfo]  value bytes (file byte order)
//! ```

mod error;


pub use error::DmError;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use crate::metadata::{MetaValue, MetadataMap};

const MAX_DEPTH: usize = 64;
const MAX_INFO: u64 = 1024;
const MAX_TAGS: u64 = 1 << 20;
const MAX_TEXT_CHARS: u64 = 1024;
const MAX_LIST: u64 = 256;

const TAG_GROUP: u8 = 20;
const TAG_DATA: u8 = 21;

const TYPE_SHORT: u64 = 2;
const TYPE_LONG: u64 = 3;
const TYPE_USHORT: u64 = 4;
const TYPE_ULONG: u64 = 5;
const TYPE_FLOAT: u64 = 6;
const TYPE_DOUBLE: u64 = 7;
const TYPE_BOOL: u64 = 8;
const TYPE_CHAR: u64 = 9;
const TYPE_OCTET: u64 = 10;
const TYPE_INT64: u64 = 11;
const TYPE_UINT64: u64 = 12;
const TYPE_STRUCT: u64 = 15;
const TYPE_STRING: u64 = 18;
const TYPE_ARRAY: u64 = 20;

fn simple_size(data_type: u64) -> Option<u64> {
    match data_type {
        TYPE_BOOL | TYPE_CHAR | TYPE_OCTET => Some(1),
        TYPE_SHORT | TYPE_USHORT => Some(2),
        TYPE_LONG | TYPE_ULONG | TYPE_FLOAT => Some(4),
        TYPE_DOUBLE | TYPE_INT64 | TYPE_UINT64 => Some(8),
        _ => None,
    }
}

/// File format generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmVersion {
    /// DM3: 32-bit counts
    Dm3,
    /// DM4: 64-bit counts and per-tag sizes
    Dm4,
}

/// A labelled entry in a tag group
#[derive(Debug, Clone, PartialEq)]
pub struct DmTag {
    /// Label; empty for list-style groups
    pub label: String,
    /// Value
    pub value: DmValue,
}

/// Decoded tag value
#[derive(Debug, Clone, PartialEq)]
pub enum DmValue {
    /// Nested tag group
    Group(Vec<DmTag>),
    /// Boolean
    Bool(bool),
    /// Any integer type
    Int(i64),
    /// Float or double
    Float(f64),
    /// String, or a short UTF-16 array
    Text(String),
    /// Small array or struct
    List(Vec<DmValue>),
    /// Array that was skipped
    Binary {
        /// Encoded element type
        element_type: u64,
        /// Number of elements
        len: u64,
    },
}

impl DmValue {
    /// Child of a group by label
    pub fn child(&self, label: &str) -> Option<&DmValue> {
        match self {
            DmValue::Group(tags) => tags.iter().find(|t| t.label == label).map(|t| &t.value),
            _ => None,
        }
    }

    /// Child by position, for groups and lists
    pub fn index(&self, index: usize) -> Option<&DmValue> {
        match self {
            DmValue::Group(tags) => tags.get(index).map(|t| &t.value),
            DmValue::List(items) => items.get(index),
            _ => None,
        }
    }

    /// Follow a path of labels
    pub fn at_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&DmValue> {
        path.iter().try_fold(self, |node, label| node.child(label.as_ref()))
    }

    /// Group entries, if this is a group
    pub fn entries(&self) -> Option<&[DmTag]> {
        match self {
            DmValue::Group(tags) => Some(tags),
            _ => None,
        }
    }

    /// Numeric content
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DmValue::Int(v) => Some(*v as f64),
            DmValue::Float(v) => Some(*v),
            DmValue::Bool(v) => Some(f64::from(u8::from(*v))),
            _ => None,
        }
    }

    /// Integer content
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DmValue::Int(v) => Some(*v),
            DmValue::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Text content
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DmValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Render a scalar as text, the way a vendor key would be read
    pub fn to_text(&self) -> Option<String> {
        match self {
            DmValue::Text(s) => Some(s.clone()),
            DmValue::Int(v) => Some(v.to_string()),
            DmValue::Float(v) => Some(v.to_string()),
            DmValue::Bool(v) => Some(v.to_string()),
            _ => None,
        }
    }

    /// Convert to the generic metadata tree.
    ///
    /// Groups whose entries are all unlabelled become lists.
    pub fn to_metadata(&self) -> MetaValue {
        match self {
            DmValue::Group(tags) if !tags.is_empty() && tags.iter().all(|t| t.label.is_empty()) => {
                MetaValue::List(tags.iter().map(|t| t.value.to_metadata()).collect())
            }
            DmValue::Group(tags) => {
                let mut map = MetadataMap::new();
                for (i, tag) in tags.iter().enumerate() {
                    let key = if tag.label.is_empty() {
                        format!("[{i}]")
                    } else {
                        tag.label.clone()
                    };
                    map.insert(key, tag.value.to_metadata());
                }
                MetaValue::Map(map)
            }
            DmValue::Bool(v) => MetaValue::Bool(*v),
            DmValue::Int(v) => MetaValue::Int(*v),
            DmValue::Float(v) => MetaValue::Float(*v),
            DmValue::Text(s) => MetaValue::Text(s.clone()),
            DmValue::List(items) => MetaValue::List(items.iter().map(DmValue::to_metadata).collect()),
            DmValue::Binary { element_type, len } => {
                MetaValue::Text(format!("<array of {len} elements of type {element_type}>"))
            }
        }
    }
}

/// Decoded DigitalMicrograph tag tree
#[derive(Debug, Clone, PartialEq)]
pub struct DmFile {
    /// Format generation
    pub version: DmVersion,
    /// Whether value bytes are little-endian
    pub little_endian: bool,
    /// Root tag group
    pub root: DmValue,
}

impl DmFile {
    /// Read a tag tree from a seekable stream.
    pub fn read<R: Read + Seek>(reader: R) -> Result<DmFile, DmError> {
        let mut parser = Parser::new(reader)?;
        let version = match parser.inner.read_u32::<BigEndian>()? {
            3 => DmVersion::Dm3,
            4 => DmVersion::Dm4,
            other => return Err(DmError::UnsupportedVersion(other)),
        };
        parser.version = version;
        let _root_len = parser.read_count()?;
        parser.little_endian = parser.inner.read_u32::<BigEndian>()? == 1;
        let root = parser.read_group(0)?;
        Ok(DmFile {
            version,
            little_endian: parser.little_endian,
            root,
        })
    }

    /// Read the file at `path`.
    pub fn from_path(path: &Path) -> Result<DmFile, DmError> {
        Self::read(BufReader::new(File::open(path)?))
    }

    /// Read an in-memory buffer.
    pub fn from_bytes(bytes: &[u8]) -> Result<DmFile, DmError> {
        Self::read(Cursor::new(bytes))
    }

    /// Value at a label path from the root
    pub fn get<S: AsRef<str>>(&self, path: &[S]) -> Option<&DmValue> {
        self.root.at_path(path)
    }

    /// Whole tree as metadata
    pub fn to_metadata(&self) -> MetaValue {
        self.root.to_metadata()
    }
}

struct Parser<R> {
    inner: R,
    len: u64,
    version: DmVersion,
    little_endian: bool,
}

impl<R: Read + Seek> Parser<R> {
    fn new(mut inner: R) -> Result<Self, DmError> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self {
            inner,
            len,
            version: DmVersion::Dm3,
            little_endian: false,
        })
    }

    fn ensure(&mut self, needed: u64) -> Result<(), DmError> {
        let position = self.inner.stream_position()?;
        if position.checked_add(needed).map_or(true, |end| end > self.len) {
            return Err(DmError::Truncated {
                needed,
                position,
                len: self.len,
            });
        }
        Ok(())
    }

    fn skip(&mut self, bytes: u64) -> Result<(), DmError> {
        self.ensure(bytes)?;
        let offset = i64::try_from(bytes).map_err(|_| DmError::TooMany { what: "skip", count: bytes })?;
        self.inner.seek(SeekFrom::Current(offset))?;
        Ok(())
    }

    /// Structural count: u32 in DM3, u64 in DM4, always big-endian
    fn read_count(&mut self) -> Result<u64, DmError> {
        Ok(match self.version {
            DmVersion::Dm3 => u64::from(self.inner.read_u32::<BigEndian>()?),
            DmVersion::Dm4 => self.inner.read_u64::<BigEndian>()?,
        })
    }

    fn read_group(&mut self, depth: usize) -> Result<DmValue, DmError> {
        if depth > MAX_DEPTH {
            return Err(DmError::TooDeep(MAX_DEPTH));
        }
        let _sorted = self.inner.read_u8()?;
        let _open = self.inner.read_u8()?;
        let ntags = self.read_count()?;
        if ntags > MAX_TAGS {
            return Err(DmError::TooMany { what: "tag", count: ntags });
        }
        let mut tags = Vec::new();
        for _ in 0..ntags {
            let offset = self.inner.stream_position()?;
            let kind = self.inner.read_u8()?;
            let label_len = self.inner.read_u16::<BigEndian>()?;
            self.ensure(u64::from(label_len))?;
            let mut raw_label = vec![0u8; usize::from(label_len)];
            self.inner.read_exact(&mut raw_label)?;
            // Labels are Latin-1.
            let label: String = raw_label.iter().map(|&b| char::from(b)).collect();
            if self.version == DmVersion::Dm4 {
                let _tag_size = self.inner.read_u64::<BigEndian>()?;
            }
            let value = match kind {
                TAG_GROUP => self.read_group(depth + 1)?,
                TAG_DATA => self.read_data(&label)?,
                other => return Err(DmError::UnknownTagKind { kind: other, offset }),
            };
            tags.push(DmTag { label, value });
        }
        Ok(DmValue::Group(tags))
    }

    fn read_data(&mut self, label: &str) -> Result<DmValue, DmError> {
        let mut delimiter = [0u8; 4];
        self.inner.read_exact(&mut delimiter)?;
        if &delimiter != b"%%%%" {
            return Err(DmError::BadDelimiter(label.to_string()));
        }
        let ninfo = self.read_count()?;
        if ninfo == 0 {
            return Err(DmError::BadTypeInfo(label.to_string()));
        }
        if ninfo > MAX_INFO {
            return Err(DmError::TooMany { what: "type info", count: ninfo });
        }
        let mut info = Vec::with_capacity(ninfo as usize);
        for _ in 0..ninfo {
            info.push(self.read_count()?);
        }
        let bad_info = || DmError::BadTypeInfo(label.to_string());

        match info[0] {
            TYPE_STRING => {
                let chars = *info.get(1).ok_or_else(bad_info)?;
                self.read_utf16(chars)
            }
            TYPE_STRUCT => {
                let fields = struct_fields(&info[1..]).ok_or_else(bad_info)?;
                self.read_struct(&fields)
            }
            TYPE_ARRAY => {
                let element_type = *info.get(1).ok_or_else(bad_info)?;
                let len = *info.last().ok_or_else(bad_info)?;
                if element_type == TYPE_STRUCT {
                    let fields = info
                        .get(2..info.len().saturating_sub(1))
                        .and_then(struct_fields)
                        .ok_or_else(bad_info)?;
                    self.read_struct_array(label, &fields, len)
                } else {
                    self.read_array(label, element_type, len)
                }
            }
            simple => self.read_simple(simple),
        }
    }

    fn read_simple(&mut self, data_type: u64) -> Result<DmValue, DmError> {
        let size = simple_size(data_type).ok_or(DmError::UnknownType(data_type))?;
        self.ensure(size)?;
        let value = if self.little_endian {
            read_scalar::<LittleEndian, _>(&mut self.inner, data_type)?
        } else {
            read_scalar::<BigEndian, _>(&mut self.inner, data_type)?
        };
        Ok(value)
    }

    fn read_utf16(&mut self, chars: u64) -> Result<DmValue, DmError> {
        let bytes = chars.checked_mul(2).ok_or(DmError::TooMany { what: "string", count: chars })?;
        self.ensure(bytes)?;
        let mut units = Vec::with_capacity(chars as usize);
        for _ in 0..chars {
            units.push(if self.little_endian {
                self.inner.read_u16::<LittleEndian>()?
            } else {
                self.inner.read_u16::<BigEndian>()?
            });
        }
        let text = String::from_utf16_lossy(&units);
        Ok(DmValue::Text(text.trim_end_matches('\0').to_string()))
    }

    fn read_struct(&mut self, fields: &[u64]) -> Result<DmValue, DmError> {
        let mut values = Vec::with_capacity(fields.len());
        for &field_type in fields {
            values.push(self.read_simple(field_type)?);
        }
        Ok(DmValue::List(values))
    }

    fn read_array(&mut self, label: &str, element_type: u64, len: u64) -> Result<DmValue, DmError> {
        let size = simple_size(element_type).ok_or(DmError::UnknownType(element_type))?;
        let total = size
            .checked_mul(len)
            .ok_or(DmError::TooMany { what: "array", count: len })?;
        if label != "Data" && element_type == TYPE_USHORT && len <= MAX_TEXT_CHARS {
            return self.read_utf16(len);
        }
        if label == "Data" || len > MAX_LIST {
            self.skip(total)?;
            return Ok(DmValue::Binary { element_type, len });
        }
        self.ensure(total)?;
        let mut items = Vec::with_capacity(len as usize);
        for _ in 0..len {
            items.push(self.read_simple(element_type)?);
        }
        Ok(DmValue::List(items))
    }

    fn read_struct_array(&mut self, label: &str, fields: &[u64], len: u64) -> Result<DmValue, DmError> {
        let mut struct_size: u64 = 0;
        for &field_type in fields {
            let size = simple_size(field_type).ok_or(DmError::UnknownType(field_type))?;
            struct_size += size;
        }
        let total = struct_size
            .checked_mul(len)
            .ok_or(DmError::TooMany { what: "array", count: len })?;
        if label == "Data" || len > MAX_LIST {
            self.skip(total)?;
            return Ok(DmValue::Binary {
                element_type: TYPE_STRUCT,
                len,
            });
        }
        self.ensure(total)?;
        let mut items = Vec::with_capacity(len as usize);
        for _ in 0..len {
            items.push(self.read_struct(fields)?);
        }
        Ok(DmValue::List(items))
    }
}

/// Field types of a struct description `[name_len, nfields, (field_name_len, type)*]`.
fn struct_fields(info: &[u64]) -> Option<Vec<u64>> {
    let nfields = usize::try_from(*info.get(1)?).ok()?;
    let pairs = info.get(2..)?;
    if pairs.len() < nfields.checked_mul(2)? {
        return None;
    }
    Some(pairs.chunks_exact(2).take(nfields).map(|p| p[1]).collect())
}

fn read_scalar<B: byteorder::ByteOrder, R: Read>(r: &mut R, data_type: u64) -> Result<DmValue, DmError> {
    Ok(match data_type {
        TYPE_SHORT => DmValue::Int(i64::from(r.read_i16::<B>()?)),
        TYPE_LONG => DmValue::Int(i64::from(r.read_i32::<B>()?)),
        TYPE_USHORT => DmValue::Int(i64::from(r.read_u16::<B>()?)),
        TYPE_ULONG => DmValue::Int(i64::from(r.read_u32::<B>()?)),
        TYPE_FLOAT => DmValue::Float(f64::from(r.read_f32::<B>()?)),
        TYPE_DOUBLE => DmValue::Float(r.read_f64::<B>()?),
        TYPE_BOOL => DmValue::Bool(r.read_u8()? != 0),
        TYPE_CHAR => DmValue::Int(i64::from(r.read_i8()?)),
        TYPE_OCTET => DmValue::Int(i64::from(r.read_u8()?)),
        TYPE_INT64 => DmValue::Int(r.read_i64::<B>()?),
        TYPE_UINT64 => DmValue::Int(i64::try_from(r.read_u64::<B>()?).unwrap_or(i64::MAX)),
        other => return Err(DmError::UnknownType(other)),
    })
}
