//! EMSA/MAS `.msa` spectra.
//!
//! A header of `#KEYWORD -unit: value` lines followed by `#SPECTRUM` and the
//! channel data. Only the header is read.

use std::io::{BufRead, BufReader};

use super::{dimensions_text, has_extension};
use crate::extractors::{ExtractError, ExtractionContext, Extractor};
use crate::fields::{apply_descriptors, FieldDescriptor};
use crate::metadata::{time, MetaValue, MetadataMap, RawRecord};
use crate::schema::DatasetType;
use crate::units::{split_number, Quantity, Unit};

const SNIFF_BYTES: usize = 512;
const MAX_HEADER_LINES: usize = 512;
const DATE_FORMATS: &[&str] = &["%d-%b-%Y %H:%M:%S", "%d-%b-%Y %H:%M", "%d-%b-%Y"];

/// Keywords every EMSA/MAS header must carry
const REQUIRED_KEYWORDS: &[&str] = &[
    "FORMAT", "VERSION", "TITLE", "DATE", "TIME", "OWNER", "NPOINTS", "NCOLUMNS", "XUNITS", "YUNITS",
    "DATATYPE", "XPERCHAN", "OFFSET",
];

/// Key holding every header keyword
pub const VENDOR_KEY: &str = "EMSA_Metadata";

static FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::scaled("", "BEAMKV", &["acceleration_voltage"], 1.0, Unit::Kilovolt),
    FieldDescriptor::scaled("", "EMISSION", &["emission_current"], 1.0, Unit::Microampere),
    FieldDescriptor::scaled("", "PROBECUR", &["beam_current"], 1e3, Unit::Picoampere),
    FieldDescriptor::number("", "MAGCAM", &["magnification"]),
    FieldDescriptor::scaled("", "CONVANGLE", &["convergence_angle"], 1.0, Unit::Milliradian),
    FieldDescriptor::scaled("", "LIVETIME", &["live_time"], 1.0, Unit::Second),
    FieldDescriptor::scaled("", "REALTIME", &["acquisition_time"], 1.0, Unit::Second),
    FieldDescriptor::scaled("", "ELEVANGLE", &["elevation_angle"], 1.0, Unit::Degree),
    FieldDescriptor::scaled("", "AZIMANGLE", &["azimuthal_angle"], 1.0, Unit::Degree),
    FieldDescriptor::scaled("", "XTILTSTGE", &["stage_position", "tilt_alpha"], 1.0, Unit::Degree),
    FieldDescriptor::scaled("", "YTILTSTGE", &["stage_position", "tilt_beta"], 1.0, Unit::Degree),
    FieldDescriptor::scaled("", "XPOSITION", &["stage_position", "x"], 1e3, Unit::Micrometer),
    FieldDescriptor::scaled("", "YPOSITION", &["stage_position", "y"], 1e3, Unit::Micrometer),
    FieldDescriptor::scaled("", "ZPOSITION", &["stage_position", "z"], 1e3, Unit::Micrometer),
    FieldDescriptor::text("", "TITLE", &["Title"]),
    FieldDescriptor::text("", "EDSDET", &["detector_type"]),
    FieldDescriptor::text("", "OWNER", &["Operator"]).flagged(),
];

/// One header line: keyword, optional unit, value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsaKeyword {
    /// Upper-cased keyword without `#`
    pub key: String,
    /// Unit given as `-unit` before the colon
    pub unit: Option<String>,
    /// Value text
    pub value: String,
}

/// Parse one `#KEY -unit: value` line.
pub fn parse_keyword(line: &str) -> Option<MsaKeyword> {
    let line = line.trim().strip_prefix('#')?;
    let (left, value) = line.split_once(':')?;
    let mut parts = left.split_whitespace();
    let key = parts.next()?.to_ascii_uppercase();
    let unit = parts
        .next()
        .and_then(|u| u.strip_prefix('-'))
        .filter(|u| !u.is_empty())
        .map(str::to_string);
    Some(MsaKeyword {
        key,
        unit,
        value: value.trim().to_string(),
    })
}

/// Header keywords up to (not including) `#SPECTRUM`.
pub fn parse_header<R: BufRead>(reader: R) -> std::io::Result<Vec<MsaKeyword>> {
    let mut keywords = Vec::new();
    for line in reader.split(b'\n').take(MAX_HEADER_LINES) {
        let line = line?;
        let line = String::from_utf8_lossy(&line);
        let Some(keyword) = parse_keyword(&line) else {
            continue;
        };
        if keyword.key == "SPECTRUM" || keyword.key == "ENDOFDATA" {
            break;
        }
        keywords.push(keyword);
    }
    Ok(keywords)
}

fn looks_like_emsa(head: &[u8]) -> bool {
    let text = String::from_utf8_lossy(head);
    text.lines()
        .find(|l| !l.trim().is_empty())
        .and_then(parse_keyword)
        .is_some_and(|k| k.key == "FORMAT" && k.value.to_ascii_uppercase().contains("EMSA"))
}

/// Decoder for EMSA/MAS spectra.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsaDecoder;

impl MsaDecoder {
    fn data_type(signal: Option<&str>) -> &'static str {
        match signal.map(str::to_ascii_uppercase).as_deref() {
            Some("EDS") | Some("WDS") => "EDS_Spectrum",
            Some("ELS") | Some("EELS") => "EELS_Spectrum",
            _ => "Spectrum",
        }
    }

    /// `XPERCHAN`/`OFFSET` are in `XUNITS`; normalize to eV when possible.
    fn energy_axis(value: Option<&str>, xunits: Option<Unit>) -> Option<MetaValue> {
        let (number, _) = split_number(value?).ok()?;
        let quantity = match xunits {
            Some(unit) => Quantity::new(number, unit),
            None => return Some(MetaValue::Float(number)),
        };
        Some(
            quantity
                .convert_to(Unit::ElectronVolt)
                .map_or(MetaValue::from(quantity), MetaValue::from),
        )
    }
}

impl Extractor for MsaDecoder {
    fn name(&self) -> &'static str {
        "msa"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn supports(&self, ctx: &ExtractionContext<'_>) -> Result<bool, ExtractError> {
        if !has_extension(ctx, &["msa", "txt"]) {
            return Ok(false);
        }
        if !ctx.exists() {
            return Ok(true);
        }
        Ok(looks_like_emsa(&ctx.read_head(SNIFF_BYTES)?))
    }

    fn decode(&self, ctx: &ExtractionContext<'_>) -> Result<Vec<RawRecord>, ExtractError> {
        let file = std::fs::File::open(ctx.path())?;
        let keywords = parse_header(BufReader::new(file))?;
        if keywords.is_empty() {
            return Err(ExtractError::MissingMetadata("no EMSA header keywords".into()));
        }
        let find = |key: &str| keywords.iter().find(|k| k.key == key).map(|k| k.value.as_str());

        let mut record = ctx.new_record(DatasetType::Spectrum, Self::data_type(find("SIGNALTYPE")));
        for key in REQUIRED_KEYWORDS.iter().filter(|&&key| find(key).is_none()) {
            record.warn(format!("missing EMSA keyword {key}"));
        }
        if let Some(date) = find("DATE") {
            let stamp = format!("{date} {}", find("TIME").unwrap_or_default());
            if let Some(created) =
                time::parse_naive(stamp.trim(), DATE_FORMATS).and_then(|n| time::localize(n, ctx.instrument))
            {
                record.creation_time = created;
            }
        }

        apply_descriptors(FIELDS, |d| find(d.source_key).map(str::to_string), &mut record);

        let xunits = find("XUNITS").and_then(Unit::parse);
        if let Some(v) = Self::energy_axis(find("XPERCHAN"), xunits) {
            record.set("channel_size", v);
            record.record_source("channel_size", "XPERCHAN");
        }
        if let Some(v) = Self::energy_axis(find("OFFSET"), xunits) {
            record.set("starting_energy", v);
            record.record_source("starting_energy", "OFFSET");
        }
        if let Some(n) = find("NPOINTS").and_then(|n| split_number(n).ok()) {
            if n.0 >= 1.0 {
                record.set("data_dimensions", dimensions_text([n.0 as u64]));
            }
        }

        let mut vendor = MetadataMap::new();
        for keyword in &keywords {
            let value = match &keyword.unit {
                Some(unit) => format!("{} {unit}", keyword.value),
                None => keyword.value.clone(),
            };
            vendor.insert(keyword.key.clone(), MetaValue::Text(value));
        }
        record.set(VENDOR_KEY, vendor);
        Ok(vec![record])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keyword() {
        let k = parse_keyword("#BEAMKV   -kV: 20.0").unwrap();
        assert_eq!(k.key, "BEAMKV");
        assert_eq!(k.unit.as_deref(), Some("kV"));
        assert_eq!(k.value, "20.0");

        let k = parse_keyword("#TITLE       : spot 1: rim").unwrap();
        assert_eq!(k.unit, None);
        assert_eq!(k.value, "spot 1: rim");

        assert!(parse_keyword("1.0, 2.0").is_none());
    }

    #[test]
    fn test_header_stops_at_spectrum() {
        let text = "#FORMAT : EMSA/MAS Spectral Data File\n#NPOINTS : 3\n#SPECTRUM :\n0.0, 1\n#ENDOFDATA :\n";
        let keywords = parse_header(text.as_bytes()).unwrap();
        assert_eq!(keywords.len(), 2);
        assert!(looks_like_emsa(text.as_bytes()));
        assert!(!looks_like_emsa(b"time,counts\n0,1\n"));
    }

    #[test]
    fn test_data_type() {
        assert_eq!(MsaDecoder::data_type(Some("eds")), "EDS_Spectrum");
        assert_eq!(MsaDecoder::data_type(Some("ELS")), "EELS_Spectrum");
        assert_eq!(MsaDecoder::data_type(None), "Spectrum");
    }

    #[test]
    fn test_energy_axis_in_ev() {
        let v = MsaDecoder::energy_axis(Some("0.01"), Some(Unit::KiloelectronVolt)).unwrap();
        let q = v.as_quantity().unwrap();
        assert_eq!(q.unit(), Unit::ElectronVolt);
        assert!((q.magnitude() - 10.0).abs() < 1e-9);
    }
}
