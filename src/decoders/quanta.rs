//! FEI/Thermo Quanta, Helios and Scios TIFF files.
//!
//! Metadata is INI text in tag 34682, sometimes followed by an XML document
//! (or with the XML in tag 34683). Beam and detector sections are named by
//! `[Beam] Beam` and `[Detectors] Name`, so the table addresses them through
//! the `$beam` and `$detector` aliases.

use std::f64::consts::PI;

use super::{dimensions_text, find_bytes, has_extension};
use crate::extractors::{ExtractError, ExtractionContext, Extractor};
use crate::fields::{apply_descriptors, FieldDescriptor};
use crate::formats::ini::{rewrite_multigis_sections, sanitize, IniDocument};
use crate::formats::tiff::{tags, TiffDirectory};
use crate::formats::xml::XmlElement;
use crate::metadata::{time, MetaValue, RawRecord};
use crate::schema::DatasetType;
use crate::units::Unit;

const MARKERS: [&[u8]; 2] = [b"[User]", b"[Beam]"];
const SNIFF_BYTES: usize = 5 * 1024;
const RAW_SCAN_LIMIT: u64 = 64 * 1024 * 1024;
const BEAM: &str = "$beam";
const DETECTOR: &str = "$detector";
const RAD_TO_DEG: f64 = 180.0 / PI;

/// Key holding the whole INI tree
pub const VENDOR_KEY: &str = "FEI_Metadata";

static FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::scaled("Beam", "HV", &["acceleration_voltage"], 1e-3, Unit::Kilovolt),
    FieldDescriptor::number("Beam", "Spot", &["Spot Size"]),
    FieldDescriptor::scaled(BEAM, "EmissionCurrent", &["emission_current"], 1e6, Unit::Microampere).nonzero(),
    FieldDescriptor::scaled(BEAM, "BeamCurrent", &["beam_current"], 1e12, Unit::Picoampere).nonzero(),
    FieldDescriptor::scaled(BEAM, "ScanRotation", &["scan_rotation"], RAD_TO_DEG, Unit::Degree),
    FieldDescriptor::scaled(BEAM, "ApertureDiameter", &["Aperture Diameter"], 1e6, Unit::Micrometer).nonzero(),
    FieldDescriptor::number(BEAM, "StigmatorX", &["Stigmator X Value"]),
    FieldDescriptor::number(BEAM, "StigmatorY", &["Stigmator Y Value"]),
    FieldDescriptor::text(BEAM, "Source", &["Beam Source"]),
    FieldDescriptor::scaled("Stage", "WorkingDistance", &["working_distance"], 1e3, Unit::Millimeter),
    FieldDescriptor::scaled("Stage", "StageX", &["stage_position", "x"], 1e6, Unit::Micrometer),
    FieldDescriptor::scaled("Stage", "StageY", &["stage_position", "y"], 1e6, Unit::Micrometer),
    FieldDescriptor::scaled("Stage", "StageZ", &["stage_position", "z"], 1e6, Unit::Micrometer),
    FieldDescriptor::scaled("Stage", "StageR", &["stage_position", "rotation"], RAD_TO_DEG, Unit::Degree),
    FieldDescriptor::scaled("Stage", "StageT", &["stage_position", "tilt_alpha"], RAD_TO_DEG, Unit::Degree),
    FieldDescriptor::scaled("Stage", "StageTb", &["stage_position", "tilt_beta"], RAD_TO_DEG, Unit::Degree)
        .nonzero(),
    FieldDescriptor::scaled("Scan", "Dwelltime", &["dwell_time"], 1e6, Unit::Microsecond),
    FieldDescriptor::scaled("Scan", "FrameTime", &["Frame Time"], 1.0, Unit::Second),
    FieldDescriptor::scaled("Scan", "HorFieldsize", &["horizontal_field_width"], 1e6, Unit::Micrometer),
    FieldDescriptor::scaled("Scan", "VerFieldsize", &["vertical_field_width"], 1e6, Unit::Micrometer),
    FieldDescriptor::scaled("Scan", "PixelWidth", &["pixel_width"], 1e9, Unit::Nanometer),
    FieldDescriptor::scaled("Scan", "PixelHeight", &["pixel_height"], 1e9, Unit::Nanometer),
    FieldDescriptor::text("Scan", "InternalScan", &["Internal Scan"]),
    FieldDescriptor::number("Image", "Integrate", &["Frames Integrated"]),
    FieldDescriptor::number("Image", "DriftCorrected", &["Drift Corrected"]),
    FieldDescriptor::scaled("Vacuum", "ChamberPressure", &["Chamber Pressure"], 1.0, Unit::Pascal),
    FieldDescriptor::text("Vacuum", "UserMode", &["Vacuum Mode"]),
    FieldDescriptor::text("Detectors", "Name", &["detector_type"]),
    FieldDescriptor::text("Detectors", "Mode", &["Detector Mode"]),
    FieldDescriptor::number(DETECTOR, "Contrast", &["Detector Contrast"]),
    FieldDescriptor::number(DETECTOR, "Brightness", &["Detector Brightness"]),
    FieldDescriptor::text(DETECTOR, "Signal", &["Detector Signal"]),
    FieldDescriptor::scaled(DETECTOR, "Grid", &["Detector Grid Voltage"], 1.0, Unit::Volt),
    FieldDescriptor::text("System", "Type", &["Microscope Type"]),
    FieldDescriptor::text("System", "Dnumber", &["Microscope Serial Number"]),
    FieldDescriptor::text("System", "Software", &["Software Version"]),
    FieldDescriptor::text("System", "Source", &["Electron Source"]),
    FieldDescriptor::text("System", "Column", &["Column Type"]),
    FieldDescriptor::text("System", "Chamber", &["Chamber Type"]),
    FieldDescriptor::text("User", "User", &["Operator"]).flagged(),
    FieldDescriptor::text("User", "UserText", &["User Text"]),
    FieldDescriptor::text("Specimen", "Temperature", &["Specimen Temperature"]),
];

/// Decoder for FEI/Thermo SEM and FIB TIFF files.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuantaTiffDecoder;

impl QuantaTiffDecoder {
    fn has_marker(bytes: &[u8]) -> bool {
        MARKERS.iter().any(|m| find_bytes(bytes, m).is_some())
    }

    /// Metadata text from tag 34682, or from the raw bytes when the container
    /// is not readable as TIFF.
    fn metadata_text(
        ctx: &ExtractionContext<'_>,
        dir: Option<&TiffDirectory>,
    ) -> Result<String, ExtractError> {
        if let Some(bytes) = dir.and_then(|d| d.bytes(tags::FEI_METADATA)) {
            return Ok(sanitize(bytes));
        }
        let raw = ctx.read_head(RAW_SCAN_LIMIT as usize)?;
        let start = MARKERS
            .iter()
            .filter_map(|m| find_bytes(&raw, m))
            .min()
            .ok_or_else(|| ExtractError::MissingMetadata("no FEI [User]/[Beam] section".into()))?;
        let tail = &raw[start..];
        let end = tail.iter().position(|b| *b == 0).unwrap_or(tail.len());
        Ok(sanitize(&tail[..end]))
    }

    fn parse_ini(text: &str) -> Result<IniDocument, ExtractError> {
        Ok(IniDocument::parse(&rewrite_multigis_sections(text))?)
    }

    fn apply_xml(record: &mut RawRecord, xml: &str) {
        match XmlElement::parse(xml) {
            Ok(root) => record.set("xml_metadata", MetaValue::Map(root.to_metadata_map())),
            Err(err) => {
                log::debug!("unparsable FEI XML block: {err}");
                record.warn("xml_metadata");
            }
        }
    }
}

impl Extractor for QuantaTiffDecoder {
    fn name(&self) -> &'static str {
        "quanta_tif"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn supports(&self, ctx: &ExtractionContext<'_>) -> Result<bool, ExtractError> {
        if !has_extension(ctx, &["tif", "tiff"]) {
            return Ok(false);
        }
        if !ctx.exists() {
            return Ok(true);
        }
        if let Ok(dir) = TiffDirectory::from_path(ctx.path()) {
            if let Some(bytes) = dir.bytes(tags::FEI_METADATA) {
                return Ok(Self::has_marker(bytes));
            }
        }
        Ok(Self::has_marker(&ctx.read_head(SNIFF_BYTES)?))
    }

    fn decode(&self, ctx: &ExtractionContext<'_>) -> Result<Vec<RawRecord>, ExtractError> {
        let dir = TiffDirectory::from_path(ctx.path()).ok();
        let text = Self::metadata_text(ctx, dir.as_ref())?;

        let (ini_text, inline_xml) = match text.find("<?xml") {
            Some(pos) => (&text[..pos], Some(&text[pos..])),
            None => (text.as_str(), None),
        };
        let ini = Self::parse_ini(ini_text)?;

        let beam = ini.get("Beam", "Beam").map(str::to_string);
        let detector = ini.get("Detectors", "Name").map(str::to_string);
        let data_type = match beam.as_deref() {
            Some(b) if b.eq_ignore_ascii_case("IBeam") => "FIB_Imaging",
            _ => "SEM_Imaging",
        };

        let mut record = ctx.new_record(DatasetType::Image, data_type);
        apply_descriptors(
            FIELDS,
            |d| {
                let section = match d.section {
                    BEAM => beam.as_deref()?,
                    DETECTOR => detector.as_deref()?,
                    other => other,
                };
                ini.get(section, d.source_key).map(str::to_string)
            },
            &mut record,
        );

        let date = ini.get("User", "Date").unwrap_or_default();
        let clock = ini.get("User", "Time").unwrap_or_default();
        if !date.is_empty() {
            let stamp = format!("{date} {clock}");
            let naive = time::parse_naive(&stamp, &["%m/%d/%Y %I:%M:%S %p", "%m/%d/%Y %H:%M:%S", "%m/%d/%Y %I:%M %p"]);
            match naive.and_then(|n| time::localize(n, ctx.instrument)) {
                Some(created) => record.creation_time = created,
                None => log::debug!("unparsable FEI date {stamp:?}, keeping file time"),
            }
        }

        if let Some(dir) = &dir {
            if let (Some(w), Some(h)) = (dir.unsigned(tags::IMAGE_WIDTH), dir.unsigned(tags::IMAGE_LENGTH)) {
                record.set("data_dimensions", dimensions_text([w, h]));
            }
        }

        if let Some(xml) = inline_xml {
            Self::apply_xml(&mut record, xml);
        } else if let Some(bytes) = dir.as_ref().and_then(|d| d.bytes(tags::FEI_XML)) {
            Self::apply_xml(&mut record, &sanitize(bytes));
        }

        record.set(VENDOR_KEY, MetaValue::Map(ini.to_metadata()));
        Ok(vec![record])
    }
}
