//! Tescan TIFF files.
//!
//! Tag 50431 carries INI text preceded by binary garbage and often missing its
//! section headers. When that cannot be recovered the `.hdr` sidecar written
//! next to the image is used. Standard TIFF tags only fill gaps.

use std::path::PathBuf;

use super::{dimensions_text, has_extension};
use crate::extractors::{ExtractError, ExtractionContext, Extractor};
use crate::fields::{apply_descriptors, FieldDescriptor};
use crate::formats::ini::{sanitize, IniDocument};
use crate::formats::tiff::{tags, TiffDirectory};
use crate::metadata::{time, MetaValue, RawRecord};
use crate::schema::DatasetType;
use crate::units::{Quantity, Unit};

/// Substrings that mark the start of the embedded INI payload
const PAYLOAD_MARKERS: &[&str] = &["[MAIN]", "AccFrames=", "Date=", "Device=", "DeviceModel=", "Company="];

/// Keys that only occur in the `[SEM]` section
const SEM_KEYS: &[&str] = &["HV=", "WD=", "SpotSize=", "EmissionCurrent=", "ChamberPressure=", "StageX=", "Detector="];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];
const TIFF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Key holding the whole INI tree
pub const VENDOR_KEY: &str = "Tescan_Metadata";

static FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::text("MAIN", "Device", &["Device"]),
    FieldDescriptor::text("MAIN", "DeviceModel", &["Device Model"]),
    FieldDescriptor::text("MAIN", "SerialNumber", &["Serial Number"]),
    FieldDescriptor::text("MAIN", "SoftwareVersion", &["Software Version"]),
    FieldDescriptor::text("MAIN", "UserName", &["Operator"]).flagged(),
    FieldDescriptor::text("MAIN", "Company", &["Company"]),
    FieldDescriptor::text("MAIN", "Description", &["Description"]),
    FieldDescriptor::number("MAIN", "AccFrames", &["Frames Integrated"]),
    FieldDescriptor::scaled("MAIN", "PixelSizeX", &["pixel_width"], 1e9, Unit::Nanometer),
    FieldDescriptor::scaled("MAIN", "PixelSizeY", &["pixel_height"], 1e9, Unit::Nanometer),
    FieldDescriptor::scaled("SEM", "HV", &["acceleration_voltage"], 1e-3, Unit::Kilovolt),
    FieldDescriptor::scaled("SEM", "WD", &["working_distance"], 1e3, Unit::Millimeter),
    FieldDescriptor::scaled("SEM", "SpotSize", &["Spot Size"], 1e9, Unit::Nanometer),
    FieldDescriptor::scaled("SEM", "EmissionCurrent", &["emission_current"], 1e6, Unit::Microampere),
    FieldDescriptor::scaled("SEM", "PredictedBeamCurrent", &["beam_current"], 1e12, Unit::Picoampere)
        .nonzero(),
    FieldDescriptor::scaled("SEM", "ChamberPressure", &["Chamber Pressure"], 1.0, Unit::Pascal),
    FieldDescriptor::scaled("SEM", "StageX", &["stage_position", "x"], 1e6, Unit::Micrometer),
    FieldDescriptor::scaled("SEM", "StageY", &["stage_position", "y"], 1e6, Unit::Micrometer),
    FieldDescriptor::scaled("SEM", "StageZ", &["stage_position", "z"], 1e6, Unit::Micrometer),
    FieldDescriptor::scaled("SEM", "StageRotation", &["stage_position", "rotation"], 1.0, Unit::Degree),
    FieldDescriptor::scaled("SEM", "StageTilt", &["stage_position", "tilt_alpha"], 1.0, Unit::Degree),
    FieldDescriptor::scaled("SEM", "DwellTime", &["dwell_time"], 1e6, Unit::Microsecond),
    FieldDescriptor::scaled("SEM", "ScanRotation", &["scan_rotation"], 1.0, Unit::Degree),
    FieldDescriptor::number("SEM", "Magnification", &["magnification"]),
    FieldDescriptor::text("SEM", "Detector", &["detector_type"]),
    FieldDescriptor::text("SEM", "ScanMode", &["Scan Mode"]),
    FieldDescriptor::text("SEM", "Gun", &["Gun Type"]),
    FieldDescriptor::text("SEM", "ChamberPressureMode", &["Vacuum Mode"]),
];

/// Decoder for Tescan SEM/FIB TIFF files.
#[derive(Debug, Clone, Copy, Default)]
pub struct TescanTiffDecoder;

impl TescanTiffDecoder {
    /// Recover INI text from the raw tag 50431 payload.
    pub fn recover_embedded_ini(bytes: &[u8]) -> Option<String> {
        let text = sanitize(bytes);
        let start = PAYLOAD_MARKERS.iter().filter_map(|m| text.find(m)).min()?;
        let printable: String = text[start..]
            .chars()
            .filter(|c| *c == '\n' || *c == '\t' || !(c.is_control() || *c == char::REPLACEMENT_CHARACTER))
            .collect();

        let mut lines: Vec<&str> = printable.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        if lines.first().is_some_and(|l| !l.starts_with('[')) {
            lines.insert(0, "[MAIN]");
        }
        let has_sem = lines.iter().any(|l| l.eq_ignore_ascii_case("[SEM]"));
        if !has_sem {
            if let Some(pos) = lines.iter().position(|l| SEM_KEYS.iter().any(|k| l.starts_with(k))) {
                lines.insert(pos, "[SEM]");
            }
        }
        Some(lines.join("\n"))
    }

    fn from_tag(dir: &TiffDirectory) -> Option<IniDocument> {
        let text = Self::recover_embedded_ini(dir.bytes(tags::TESCAN_METADATA)?)?;
        match IniDocument::parse(&text) {
            Ok(doc) if doc.has_section("MAIN") => Some(doc),
            Ok(_) => None,
            Err(err) => {
                log::debug!("embedded Tescan INI unusable: {err}");
                None
            }
        }
    }

    fn sidecar_path(ctx: &ExtractionContext<'_>) -> PathBuf {
        ctx.path().with_extension("hdr")
    }

    fn from_sidecar(ctx: &ExtractionContext<'_>) -> Option<IniDocument> {
        let bytes = std::fs::read(Self::sidecar_path(ctx)).ok()?;
        let text = sanitize(&bytes);
        if !Self::is_tescan_header(&text) {
            return None;
        }
        IniDocument::parse(&text)
            .map_err(|err| log::debug!("Tescan sidecar unusable: {err}"))
            .ok()
    }

    fn is_tescan_header(text: &str) -> bool {
        text.contains("[MAIN]") || text.contains("Device=TESCAN")
    }

    fn has_sidecar(ctx: &ExtractionContext<'_>) -> bool {
        std::fs::read(Self::sidecar_path(ctx))
            .map(|bytes| Self::is_tescan_header(&sanitize(&bytes)))
            .unwrap_or(false)
    }

    /// Fill gaps from standard tags without overriding INI values.
    fn fill_from_tags(ctx: &ExtractionContext<'_>, dir: &TiffDirectory, record: &mut RawRecord, dated: bool) {
        let text_tags = [
            (tags::MAKE, "Device"),
            (tags::MODEL, "Device Model"),
            (tags::SOFTWARE, "Software Version"),
            (tags::ARTIST, "Operator"),
        ];
        for (tag, key) in text_tags {
            if record.get(key).is_none() {
                if let Some(value) = dir.ascii(tag) {
                    record.set(key, value);
                }
            }
        }
        if record.get("data_dimensions").is_none() {
            if let (Some(w), Some(h)) = (dir.unsigned(tags::IMAGE_WIDTH), dir.unsigned(tags::IMAGE_LENGTH)) {
                record.set("data_dimensions", dimensions_text([w, h]));
            }
        }
        if !dated {
            let parsed = dir
                .ascii(tags::DATE_TIME)
                .and_then(|s| time::parse_naive(&s, &[TIFF_DATE_FORMAT]))
                .and_then(|n| time::localize(n, ctx.instrument));
            if let Some(created) = parsed {
                record.creation_time = created;
            }
        }
    }

    /// Horizontal field width from pixel size (m) and image width (px).
    fn derive_field_width(ini: &IniDocument, dir: Option<&TiffDirectory>, record: &mut RawRecord) {
        if record.get("horizontal_field_width").is_some() {
            return;
        }
        let pixel = ini.get("MAIN", "PixelSizeX").and_then(|v| v.trim().parse::<f64>().ok());
        let width = dir.and_then(|d| d.unsigned(tags::IMAGE_WIDTH));
        if let (Some(pixel), Some(width)) = (pixel, width) {
            let microns = pixel * width as f64 * 1e6;
            record.set("horizontal_field_width", Quantity::new(microns, Unit::Micrometer));
            record.record_source("horizontal_field_width", "MAIN.PixelSizeX");
        }
    }
}

impl Extractor for TescanTiffDecoder {
    fn name(&self) -> &'static str {
        "tescan_tif"
    }

    fn priority(&self) -> i32 {
        120
    }

    fn supports(&self, ctx: &ExtractionContext<'_>) -> Result<bool, ExtractError> {
        if !has_extension(ctx, &["tif", "tiff"]) {
            return Ok(false);
        }
        if !ctx.exists() {
            return Ok(true);
        }
        if let Ok(dir) = TiffDirectory::from_path(ctx.path()) {
            if let Some(bytes) = dir.bytes(tags::TESCAN_METADATA) {
                if Self::recover_embedded_ini(bytes).is_some() {
                    return Ok(true);
                }
            }
            if dir.ascii(tags::MAKE).is_some_and(|m| m.to_ascii_uppercase().contains("TESCAN")) {
                return Ok(true);
            }
        }
        Ok(Self::has_sidecar(ctx))
    }

    fn decode(&self, ctx: &ExtractionContext<'_>) -> Result<Vec<RawRecord>, ExtractError> {
        let dir = match TiffDirectory::from_path(ctx.path()) {
            Ok(dir) => Some(dir),
            Err(err) => {
                log::debug!("{} is not a readable TIFF: {err}", ctx.path().display());
                None
            }
        };
        let ini = dir
            .as_ref()
            .and_then(Self::from_tag)
            .or_else(|| Self::from_sidecar(ctx));
        if dir.is_none() && ini.is_none() {
            return Err(ExtractError::MissingMetadata(
                "neither TIFF tags nor a Tescan header are readable".into(),
            ));
        }

        let mut record = ctx.new_record(DatasetType::Image, "SEM_Imaging");
        let mut dated = false;
        match &ini {
            Some(ini) => {
                apply_descriptors(FIELDS, |d| ini.get(d.section, d.source_key).map(str::to_string), &mut record);
                if let (Some(date), Some(clock)) = (ini.get("MAIN", "Date"), ini.get("MAIN", "Time")) {
                    let stamp = format!("{date} {clock}");
                    if let Some(created) =
                        time::parse_naive(&stamp, DATE_FORMATS).and_then(|n| time::localize(n, ctx.instrument))
                    {
                        record.creation_time = created;
                        dated = true;
                    }
                }
                Self::derive_field_width(ini, dir.as_ref(), &mut record);
                record.set(VENDOR_KEY, MetaValue::Map(ini.to_metadata()));
            }
            None => record.warn("no Tescan INI metadata found; standard TIFF tags only"),
        }
        if let Some(dir) = &dir {
            Self::fill_from_tags(ctx, dir, &mut record, dated);
        }
        Ok(vec![record])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recover_embedded_ini_synthesizes_headers() {
        let mut raw = vec![0x01, 0xff, 0x00, 0x10];
        raw.extend_from_slice(b"AccFrames=4\r\nDate=2023-05-06\r\nTime=14:02:11\r\nDevice=TESCAN MIRA\r\n");
        raw.extend_from_slice(b"HV=15000.0\r\nWD=0.0081\x07\r\n");
        let text = TescanTiffDecoder::recover_embedded_ini(&raw).unwrap();
        let doc = IniDocument::parse(&text).unwrap();
        assert_eq!(doc.get("MAIN", "AccFrames"), Some("4"));
        assert_eq!(doc.get("SEM", "HV"), Some("15000.0"));
        assert_eq!(doc.get("SEM", "WD"), Some("0.0081"));
    }

    #[test]
    fn test_recover_keeps_existing_headers() {
        let text = TescanTiffDecoder::recover_embedded_ini(b"junk[MAIN]\nDevice=TESCAN\n[SEM]\nHV=5000\n").unwrap();
        assert!(text.starts_with("[MAIN]"));
        assert_eq!(text.matches("[SEM]").count(), 1);
    }

    #[test]
    fn test_recover_drops_invalid_utf8() {
        let raw = b"[MAIN]\nDevice=TES\xffCAN\n[SEM]\nH\xfe\xfdV=5000\n";
        let text = TescanTiffDecoder::recover_embedded_ini(raw).unwrap();
        assert!(!text.contains(char::REPLACEMENT_CHARACTER));
        let doc = IniDocument::parse(&text).unwrap();
        assert_eq!(doc.get("MAIN", "Device"), Some("TESCAN"));
        assert_eq!(doc.get("SEM", "HV"), Some("5000"));
    }

    #[test]
    fn test_recover_without_markers() {
        assert!(TescanTiffDecoder::recover_embedded_ini(b"\x00\x01random bytes").is_none());
    }
}
