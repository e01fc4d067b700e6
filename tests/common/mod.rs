//! Synthetic instrument files shared by the integration tests.
//!
//! Each builder writes only the structures the decoders read; pixel payloads
//! are filler bytes.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

/// Write `bytes` to `dir/name` and return the path.
pub fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

// ---------------------------------------------------------------------------
// TIFF
// ---------------------------------------------------------------------------

/// TIFF field type codes used by the builders
pub const ASCII: u16 = 2;
pub const SHORT: u16 = 3;
pub const LONG: u16 = 4;
pub const UNDEFINED: u16 = 7;

/// Little-endian classic TIFF with a single IFD.
pub fn tiff(entries: &[(u16, u16, &[u8])]) -> Vec<u8> {
    let mut out = b"II".to_vec();
    out.extend_from_slice(&42u16.to_le_bytes());
    out.extend_from_slice(&8u32.to_le_bytes());
    let ifd_len = 2 + entries.len() * 12 + 4;
    let mut payload_offset = 8 + ifd_len;
    let mut payloads = Vec::new();
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for (tag, field_type, data) in entries {
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&field_type.to_le_bytes());
        let count = match *field_type {
            SHORT => data.len() / 2,
            LONG => data.len() / 4,
            _ => data.len(),
        };
        out.extend_from_slice(&(count as u32).to_le_bytes());
        if data.len() <= 4 {
            let mut inline = data.to_vec();
            inline.resize(4, 0);
            out.extend_from_slice(&inline);
        } else {
            out.extend_from_slice(&(payload_offset as u32).to_le_bytes());
            payloads.extend_from_slice(data);
            payload_offset += data.len();
        }
    }
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&payloads);
    out
}

/// TIFF carrying only image dimensions.
pub fn plain_tiff(width: u16, height: u16) -> Vec<u8> {
    tiff(&[
        (256, SHORT, &width.to_le_bytes()),
        (257, SHORT, &height.to_le_bytes()),
    ])
}

// ---------------------------------------------------------------------------
// DigitalMicrograph
// ---------------------------------------------------------------------------

/// A DigitalMicrograph tag value
#[derive(Debug, Clone)]
pub enum Dm {
    Group(Vec<(String, Dm)>),
    Double(f64),
    Float(f32),
    Long(i32),
    Text(String),
    Bytes(Vec<u8>),
}

impl Dm {
    /// Labelled group
    pub fn group<S: Into<String>>(entries: Vec<(S, Dm)>) -> Dm {
        Dm::Group(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Unlabelled group, read back as a list
    pub fn list(items: Vec<Dm>) -> Dm {
        Dm::Group(items.into_iter().map(|v| (String::new(), v)).collect())
    }

    /// UTF-16 string
    pub fn text(s: &str) -> Dm {
        Dm::Text(s.to_string())
    }
}

struct DmWriter {
    dm4: bool,
}

impl DmWriter {
    fn count(&self, out: &mut Vec<u8>, value: u64) {
        if self.dm4 {
            out.extend_from_slice(&value.to_be_bytes());
        } else {
            out.extend_from_slice(&(value as u32).to_be_bytes());
        }
    }

    fn group(&self, out: &mut Vec<u8>, entries: &[(String, Dm)]) {
        out.push(0);
        out.push(1);
        self.count(out, entries.len() as u64);
        for (label, node) in entries {
            self.tag(out, label, node);
        }
    }

    fn tag(&self, out: &mut Vec<u8>, label: &str, node: &Dm) {
        out.push(if matches!(node, Dm::Group(_)) { 20 } else { 21 });
        out.extend_from_slice(&(label.len() as u16).to_be_bytes());
        out.extend_from_slice(label.as_bytes());
        if self.dm4 {
            out.extend_from_slice(&0u64.to_be_bytes());
        }
        let (info, data): (Vec<u64>, Vec<u8>) = match node {
            Dm::Group(entries) => {
                self.group(out, entries);
                return;
            }
            Dm::Double(v) => (vec![7], v.to_le_bytes().to_vec()),
            Dm::Float(v) => (vec![6], v.to_le_bytes().to_vec()),
            Dm::Long(v) => (vec![3], v.to_le_bytes().to_vec()),
            Dm::Text(s) => {
                let units: Vec<u16> = s.encode_utf16().collect();
                let bytes = units.iter().flat_map(|u| u.to_le_bytes()).collect();
                (vec![20, 4, units.len() as u64], bytes)
            }
            Dm::Bytes(bytes) => (vec![20, 10, bytes.len() as u64], bytes.clone()),
        };
        out.extend_from_slice(b"%%%%");
        self.count(out, info.len() as u64);
        for word in info {
            self.count(out, word);
        }
        out.extend_from_slice(&data);
    }
}

/// A complete DM3 (`dm4 == false`) or DM4 file with `root` as the tag tree.
pub fn dm_file(dm4: bool, root: Vec<(&str, Dm)>) -> Vec<u8> {
    let writer = DmWriter { dm4 };
    let root: Vec<(String, Dm)> = root.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    let mut out = Vec::new();
    out.extend_from_slice(&(if dm4 { 4u32 } else { 3u32 }).to_be_bytes());
    writer.count(&mut out, 0);
    out.extend_from_slice(&1u32.to_be_bytes());
    writer.group(&mut out, &root);
    out.extend_from_slice(&[0u8; 8]);
    out
}

/// One `ImageList` entry.
///
/// `calibrations` holds (origin, scale, units) per axis.
pub fn dm_image(dims: &[i32], calibrations: &[(f64, f64, &str)], tags: Vec<(&str, Dm)>, payload: Vec<u8>) -> Dm {
    let axes = calibrations
        .iter()
        .map(|(origin, scale, units)| {
            Dm::group(vec![
                ("Origin", Dm::Float(*origin as f32)),
                ("Scale", Dm::Float(*scale as f32)),
                ("Units", Dm::text(units)),
            ])
        })
        .collect();
    Dm::group(vec![
        (
            "ImageData",
            Dm::group(vec![
                ("Data", Dm::Bytes(payload)),
                ("Dimensions", Dm::list(dims.iter().map(|d| Dm::Long(*d)).collect())),
                ("Calibrations", Dm::group(vec![("Dimension", Dm::list(axes))])),
            ]),
        ),
        ("ImageTags", Dm::group(tags)),
    ])
}

/// Thumbnail list pointing at `ImageList` entry `index`.
pub fn dm_thumbnails(index: i32) -> Dm {
    Dm::list(vec![Dm::group(vec![("ImageIndex", Dm::Long(index))])])
}

// ---------------------------------------------------------------------------
// TIA .ser / .emi
// ---------------------------------------------------------------------------

/// Element shape of a synthetic series
#[derive(Debug, Clone, Copy)]
pub enum SerShape {
    /// 1D spectra with this many channels
    Spectrum(u32),
    /// 2D images
    Image(u32, u32),
}

/// Parameters of a synthetic 32-bit-offset `.ser` file
#[derive(Debug, Clone, Copy)]
pub struct SerSpec {
    pub shape: SerShape,
    /// Series size along the single series dimension
    pub total: u32,
    /// First tag timestamp (unix seconds)
    pub time: u32,
    /// Element calibration (offset, delta) for every axis
    pub calibration: (f64, f64),
}

impl SerSpec {
    /// Single-element image series
    pub fn image(width: u32, height: u32) -> Self {
        Self {
            shape: SerShape::Image(width, height),
            total: 1,
            time: 1_700_000_000,
            calibration: (0.0, 2.5e-9),
        }
    }

    /// Spectrum series of `total` elements
    pub fn spectrum(channels: u32, total: u32) -> Self {
        Self {
            shape: SerShape::Spectrum(channels),
            total,
            time: 1_700_000_000,
            calibration: (100.0, 5.0),
        }
    }
}

fn put_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

/// Build a version 0x0210 `.ser` file.
pub fn ser_file(spec: SerSpec) -> Vec<u8> {
    let (data_type, axes): (u32, Vec<u32>) = match spec.shape {
        SerShape::Spectrum(n) => (0x4120, vec![n]),
        SerShape::Image(w, h) => (0x4122, vec![w, h]),
    };
    let mut out = Vec::new();
    out.extend_from_slice(&0x4949u16.to_le_bytes());
    out.extend_from_slice(&0x0197u16.to_le_bytes());
    out.extend_from_slice(&0x0210u16.to_le_bytes());
    out.extend_from_slice(&data_type.to_le_bytes());
    out.extend_from_slice(&0x4152u32.to_le_bytes());
    out.extend_from_slice(&spec.total.to_le_bytes());
    out.extend_from_slice(&spec.total.to_le_bytes());
    let offset_pos = out.len();
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&spec.total.to_le_bytes());
    out.extend_from_slice(&0f64.to_le_bytes());
    out.extend_from_slice(&1f64.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    put_string(&mut out, "Number");
    put_string(&mut out, "");

    let array_offset = out.len() as u32;
    let arrays_len = 8 * spec.total;
    let element_len = (axes.len() as u32) * 20 + 2 + 4 * axes.len() as u32 + 16;
    let data_offset = array_offset + arrays_len;
    let tag_offset = data_offset + element_len;
    out.extend_from_slice(&data_offset.to_le_bytes());
    for _ in 1..spec.total {
        out.extend_from_slice(&data_offset.to_le_bytes());
    }
    for _ in 0..spec.total {
        out.extend_from_slice(&tag_offset.to_le_bytes());
    }
    for _ in &axes {
        out.extend_from_slice(&spec.calibration.0.to_le_bytes());
        out.extend_from_slice(&spec.calibration.1.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
    }
    out.extend_from_slice(&7u16.to_le_bytes());
    for axis in &axes {
        out.extend_from_slice(&axis.to_le_bytes());
    }
    out.extend_from_slice(&[0u8; 16]);
    out.extend_from_slice(&0x4152u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&spec.time.to_le_bytes());

    out[offset_pos..offset_pos + 4].copy_from_slice(&array_offset.to_le_bytes());
    out
}

/// `.emi` bytes: binary filler around an `<ObjectInfo>` block holding
/// `(label, value, unit)` experimental conditions.
pub fn emi_file(entries: &[(&str, &str, &str)]) -> Vec<u8> {
    let mut xml = String::from("<ObjectInfo><ExperimentalConditions><MicroscopeConditions>");
    xml.push_str("</MicroscopeConditions></ExperimentalConditions><ExperimentalDescription><Root>");
    for (label, value, unit) in entries {
        xml.push_str(&format!(
            "<Data><Label>{label}</Label><Value>{value}</Value><Unit>{unit}</Unit></Data>"
        ));
    }
    xml.push_str("</Root></ExperimentalDescription></ObjectInfo>");

    let mut out = vec![0x4a, 0x00, 0x01, 0xff, 0x00, 0x10, 0x20];
    out.extend_from_slice(xml.as_bytes());
    out.extend_from_slice(&[0x00, 0x7f, 0x03]);
    out
}

// ---------------------------------------------------------------------------
// EMSA/MAS
// ---------------------------------------------------------------------------

/// A short EDS spectrum in EMSA/MAS format.
pub const EMSA_EDS: &str = "#FORMAT      : EMSA/MAS Spectral Data File\n\
#VERSION     : 1.0\n\
#TITLE       : Spectrum 3\n\
#DATE        : 12-MAR-2024\n\
#TIME        : 09:41:07\n\
#OWNER       : jdoe\n\
#NPOINTS     : 4.\n\
#NCOLUMNS    : 1.\n\
#XUNITS      : keV\n\
#YUNITS      : counts\n\
#DATATYPE    : Y\n\
#XPERCHAN    : 0.01\n\
#OFFSET      : -0.2\n\
#SIGNALTYPE  : EDS\n\
#BEAMKV   -kV: 15.0\n\
#LIVETIME  -s: 30.5\n\
#ELEVANGLE-dg: 35.0\n\
#EDSDET      : SDD\n\
#SPECTRUM    : Spectral Data Starts Here\n\
0.0, 12.0\n\
0.01, 15.0\n\
0.02, 9.0\n\
0.03, 4.0\n\
#ENDOFDATA   :\n";
