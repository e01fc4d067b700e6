//! # TIA series files
//!
//! FEI/Thermo TIA writes a binary `.ser` file (little-endian) holding a series
//! of 1D spectra or 2D images, plus a companion `.emi` file whose only useful
//! content is an XML `<ObjectInfo>` block embedded in binary data.
//!
//! Only headers are read: the series header, the calibration of every
//! dimension, the first data element's header and the first tag's timestamp.

mod error;

pub use error::SerError;

use byteorder::{LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::formats::xml::XmlElement;

const BYTE_ORDER: u16 = 0x4949;
const SERIES_ID: u16 = 0x0197;
const VERSION_32: u16 = 0x0210;
const VERSION_64: u16 = 0x0220;
const DATA_1D: u32 = 0x4120;
const DATA_2D: u32 = 0x4122;
const TAG_TIME: u32 = 0x4152;
const TAG_TIME_POSITION: u32 = 0x4142;

const MAX_DIMENSIONS: u32 = 16;
const MAX_STRING: u32 = 4096;

/// Shape of the series elements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerDataKind {
    /// Spectra
    Spectrum,
    /// Images
    Image,
}

/// Calibration of one series dimension (e.g. the scan positions of a spectrum image)
#[derive(Debug, Clone, PartialEq)]
pub struct SerDimension {
    /// Number of elements along this dimension
    pub size: u32,
    /// Calibrated value at `calibration_element`
    pub calibration_offset: f64,
    /// Calibrated step
    pub calibration_delta: f64,
    /// Reference element index
    pub calibration_element: u32,
    /// Free-text description
    pub description: String,
    /// Unit text
    pub units: String,
}

/// Header of one data element
#[derive(Debug, Clone, PartialEq)]
pub struct SerElementHeader {
    /// Calibration (offset, delta, element) per element axis
    pub calibrations: Vec<(f64, f64, u32)>,
    /// Element value type code
    pub value_type: u16,
    /// Element shape, x first
    pub shape: Vec<u32>,
}

impl SerElementHeader {
    /// Name of the element value type
    pub fn value_type_name(&self) -> &'static str {
        match self.value_type {
            1 => "uint8",
            2 => "uint16",
            3 => "uint32",
            4 => "int8",
            5 => "int16",
            6 => "int32",
            7 => "float32",
            8 => "float64",
            9 => "complex64",
            10 => "complex128",
            _ => "unknown",
        }
    }
}

/// Parsed `.ser` headers
#[derive(Debug, Clone, PartialEq)]
pub struct SerHeader {
    /// Series version (0x0210 or 0x0220)
    pub version: u16,
    /// Spectrum or image series
    pub data_kind: SerDataKind,
    /// Whether tags carry a stage position in addition to time
    pub has_position_tags: bool,
    /// Elements allocated
    pub total_elements: u32,
    /// Elements actually written
    pub valid_elements: u32,
    /// Series dimensions
    pub dimensions: Vec<SerDimension>,
    /// Header of the first data element, if readable
    pub first_element: Option<SerElementHeader>,
    /// Unix timestamp of the first element tag, if readable
    pub first_time: Option<u32>,
    /// Why the first element or its tag could not be read. The series
    /// header itself was valid, so these describe a damaged or truncated file.
    pub element_errors: Vec<String>,
}

impl SerHeader {
    /// Read headers from a seekable stream.
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<SerHeader, SerError> {
        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        let byte_order = reader.read_u16::<LittleEndian>()?;
        if byte_order != BYTE_ORDER {
            return Err(SerError::BadByteOrder(byte_order));
        }
        let series_id = reader.read_u16::<LittleEndian>()?;
        if series_id != SERIES_ID {
            return Err(SerError::BadSeriesId(series_id));
        }
        let version = reader.read_u16::<LittleEndian>()?;
        if version != VERSION_32 && version != VERSION_64 {
            return Err(SerError::UnsupportedVersion(version));
        }
        let data_kind = match reader.read_u32::<LittleEndian>()? {
            DATA_1D => SerDataKind::Spectrum,
            DATA_2D => SerDataKind::Image,
            other => return Err(SerError::UnknownDataType(other)),
        };
        let has_position_tags = match reader.read_u32::<LittleEndian>()? {
            TAG_TIME => false,
            TAG_TIME_POSITION => true,
            other => return Err(SerError::UnknownTagType(other)),
        };
        let total_elements = reader.read_u32::<LittleEndian>()?;
        let valid_elements = reader.read_u32::<LittleEndian>()?;
        let offset_array_offset = read_offset(reader, version)?;
        let ndims = reader.read_u32::<LittleEndian>()?;
        if ndims > MAX_DIMENSIONS {
            return Err(SerError::TooMany {
                what: "dimension count",
                count: u64::from(ndims),
            });
        }

        let mut dimensions = Vec::with_capacity(ndims as usize);
        for _ in 0..ndims {
            let size = reader.read_u32::<LittleEndian>()?;
            let calibration_offset = reader.read_f64::<LittleEndian>()?;
            let calibration_delta = reader.read_f64::<LittleEndian>()?;
            let calibration_element = reader.read_u32::<LittleEndian>()?;
            let description = read_string(reader)?;
            let units = read_string(reader)?;
            dimensions.push(SerDimension {
                size,
                calibration_offset,
                calibration_delta,
                calibration_element,
                description,
                units,
            });
        }

        let mut header = SerHeader {
            version,
            data_kind,
            has_position_tags,
            total_elements,
            valid_elements,
            dimensions,
            first_element: None,
            first_time: None,
            element_errors: Vec::new(),
        };

        if total_elements > 0 {
            // Data offsets for every element, then tag offsets.
            let entry_size: u64 = if version == VERSION_64 { 8 } else { 4 };
            let data_offset = seek_checked(reader, offset_array_offset, len)
                .and_then(|()| read_offset(reader, version).map_err(SerError::from));
            match data_offset {
                Ok(data_offset) => {
                    let tag_array = offset_array_offset.saturating_add(entry_size * u64::from(total_elements));
                    match read_element_header(reader, data_offset, len, data_kind) {
                        Ok(element) => header.first_element = Some(element),
                        Err(e) => header.element_errors.push(format!("first data element unreadable: {e}")),
                    }
                    match read_first_time(reader, tag_array, len, version) {
                        Ok(time) => header.first_time = Some(time),
                        Err(e) => header.element_errors.push(format!("first element tag unreadable: {e}")),
                    }
                }
                Err(e) => header.element_errors.push(format!("offset array unreadable: {e}")),
            }
        }
        Ok(header)
    }

    /// Read the file at `path`.
    pub fn from_path(path: &Path) -> Result<SerHeader, SerError> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::read(&mut reader)
    }

    /// Read an in-memory buffer.
    pub fn from_bytes(bytes: &[u8]) -> Result<SerHeader, SerError> {
        Self::read(&mut Cursor::new(bytes))
    }
}

fn read_offset<R: Read>(reader: &mut R, version: u16) -> std::io::Result<u64> {
    if version == VERSION_64 {
        reader.read_u64::<LittleEndian>()
    } else {
        reader.read_u32::<LittleEndian>().map(u64::from)
    }
}

fn read_string<R: Read>(reader: &mut R) -> Result<String, SerError> {
    let len = reader.read_u32::<LittleEndian>()?;
    if len > MAX_STRING {
        return Err(SerError::TooMany {
            what: "string length",
            count: u64::from(len),
        });
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).trim_end_matches('\0').to_string())
}

fn seek_checked<R: Seek>(reader: &mut R, offset: u64, len: u64) -> Result<(), SerError> {
    if offset >= len {
        return Err(SerError::OffsetOutOfBounds { offset, len });
    }
    reader.seek(SeekFrom::Start(offset))?;
    Ok(())
}

fn read_element_header<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    len: u64,
    kind: SerDataKind,
) -> Result<SerElementHeader, SerError> {
    seek_checked(reader, offset, len)?;
    let axes = match kind {
        SerDataKind::Spectrum => 1,
        SerDataKind::Image => 2,
    };
    let mut calibrations = Vec::with_capacity(axes);
    for _ in 0..axes {
        let offset = reader.read_f64::<LittleEndian>()?;
        let delta = reader.read_f64::<LittleEndian>()?;
        let element = reader.read_u32::<LittleEndian>()?;
        calibrations.push((offset, delta, element));
    }
    let value_type = reader.read_u16::<LittleEndian>()?;
    let mut shape = Vec::with_capacity(axes);
    for _ in 0..axes {
        shape.push(reader.read_u32::<LittleEndian>()?);
    }
    Ok(SerElementHeader {
        calibrations,
        value_type,
        shape,
    })
}

fn read_first_time<R: Read + Seek>(reader: &mut R, tag_array: u64, len: u64, version: u16) -> Result<u32, SerError> {
    seek_checked(reader, tag_array, len)?;
    let tag_offset = read_offset(reader, version)?;
    seek_checked(reader, tag_offset, len)?;
    let _tag_type = reader.read_u16::<LittleEndian>()?;
    let _reserved = reader.read_u16::<LittleEndian>()?;
    Ok(reader.read_u32::<LittleEndian>()?)
}

/// Slice of `bytes` spanning `<ObjectInfo>…</ObjectInfo>`.
pub fn object_info_slice(bytes: &[u8]) -> Option<&[u8]> {
    const OPEN: &[u8] = b"<ObjectInfo>";
    const CLOSE: &[u8] = b"</ObjectInfo>";
    let start = find(bytes, OPEN)?;
    let end = find(&bytes[start..], CLOSE)? + start + CLOSE.len();
    Some(&bytes[start..end])
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// One `ExperimentalDescription` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentalEntry {
    /// Parameter label, e.g. `High tension`
    pub label: String,
    /// Value text
    pub value: String,
    /// Unit text, possibly empty
    pub unit: String,
}

/// Parsed `.emi` companion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmiInfo {
    /// Path the info was read from
    pub path: PathBuf,
    /// `<ObjectInfo>` root
    pub object_info: XmlElement,
}

impl EmiInfo {
    /// Parse the ObjectInfo block out of raw `.emi` bytes.
    pub fn from_bytes(path: PathBuf, bytes: &[u8]) -> Result<EmiInfo, SerError> {
        let slice = object_info_slice(bytes).ok_or(SerError::NoObjectInfo)?;
        let object_info = XmlElement::parse_bytes(slice)?;
        Ok(EmiInfo { path, object_info })
    }

    /// Read and parse the file at `path`.
    pub fn from_path(path: &Path) -> Result<EmiInfo, SerError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(path.to_path_buf(), &bytes)
    }

    /// Label/value/unit triples from `ExperimentalDescription`
    pub fn experimental_description(&self) -> Vec<ExperimentalEntry> {
        let Some(description) = self.object_info.find_descendant("ExperimentalDescription") else {
            return Vec::new();
        };
        let mut out = Vec::new();
        collect_entries(description, &mut out);
        out
    }
}

fn collect_entries(node: &XmlElement, out: &mut Vec<ExperimentalEntry>) {
    for child in &node.children {
        match (child.child("Label"), child.child("Value")) {
            (Some(label), Some(value)) => out.push(ExperimentalEntry {
                label: label.text.clone(),
                value: value.text.clone(),
                unit: child.child("Unit").map(|u| u.text.clone()).unwrap_or_default(),
            }),
            _ => collect_entries(child, out),
        }
    }
}

/// Companion `.emi` path for a `.ser` path: `name_1.ser` -> `name.emi`.
pub fn companion_emi_path(ser_path: &Path) -> Option<PathBuf> {
    let stem = ser_path.file_stem()?.to_str()?;
    let base = match stem.rsplit_once('_') {
        Some((base, index)) if !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()) => base,
        _ => stem,
    };
    Some(ser_path.with_file_name(format!("{base}.emi")))
}
