//! Zeiss Orion and Fibics helium-ion microscope TIFF files.
//!
//! Zeiss writes `<ImageTags>` XML in tag 65000; Fibics writes `<Fibics>` XML
//! in tag 51023. The root element decides the variant.

use super::{dimensions_text, has_extension};
use crate::extractors::{ExtractError, ExtractionContext, Extractor};
use crate::fields::{apply_descriptors, FieldDescriptor};
use crate::formats::tiff::{tags, TiffDirectory};
use crate::formats::xml::XmlElement;
use crate::metadata::{MetaValue, RawRecord};
use crate::schema::DatasetType;
use crate::units::Unit;

/// Which helium-ion software wrote the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HimVariant {
    /// Zeiss Orion (`<ImageTags>` in tag 65000)
    Zeiss,
    /// Fibics NPVE (`<Fibics>` in tag 51023)
    Fibics,
}

impl HimVariant {
    fn vendor_key(self) -> &'static str {
        match self {
            HimVariant::Zeiss => "Zeiss_Metadata",
            HimVariant::Fibics => "Fibics_Metadata",
        }
    }
}

// Zeiss stores voltages in millivolt-equivalents.
static ZEISS_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::scaled("GFIS", "AccelerationVoltage", &["acceleration_voltage"], 1e-6, Unit::Kilovolt),
    FieldDescriptor::scaled("GFIS", "ExtractionVoltage", &["Extraction Voltage"], 1e-6, Unit::Kilovolt),
    FieldDescriptor::scaled("GFIS", "BeamCurrent", &["beam_current"], 1.0, Unit::Picoampere),
    FieldDescriptor::scaled("GFIS", "WorkingDistance", &["working_distance"], 1.0, Unit::Millimeter),
    FieldDescriptor::number("GFIS", "SpotControl", &["Spot Size"]),
    FieldDescriptor::text("GFIS", "ApertureSize", &["Aperture Size"]),
    FieldDescriptor::text("GFIS", "Gas", &["Gas Type"]),
    FieldDescriptor::scaled("Image", "FieldOfView", &["horizontal_field_width"], 1.0, Unit::Micrometer),
    FieldDescriptor::scaled("Image", "PixelSize", &["pixel_width"], 1.0, Unit::Nanometer),
    FieldDescriptor::scaled("Image", "DwellTime", &["dwell_time"], 1.0, Unit::Microsecond),
    FieldDescriptor::scaled("Image", "ScanRotation", &["scan_rotation"], 1.0, Unit::Degree),
    FieldDescriptor::number("Image", "LineAveraging", &["Line Averaging"]),
    FieldDescriptor::number("Image", "FrameAveraging", &["Frame Averaging"]),
    FieldDescriptor::scaled("Stage", "X", &["stage_position", "x"], 1e3, Unit::Micrometer),
    FieldDescriptor::scaled("Stage", "Y", &["stage_position", "y"], 1e3, Unit::Micrometer),
    FieldDescriptor::scaled("Stage", "Z", &["stage_position", "z"], 1e3, Unit::Micrometer),
    FieldDescriptor::scaled("Stage", "Tilt", &["stage_position", "tilt_alpha"], 1.0, Unit::Degree),
    FieldDescriptor::scaled("Stage", "Rotate", &["stage_position", "rotation"], 1.0, Unit::Degree),
    FieldDescriptor::text("Detector", "Name", &["detector_type"]),
    FieldDescriptor::number("Detector", "Contrast", &["Detector Contrast"]),
    FieldDescriptor::number("Detector", "Brightness", &["Detector Brightness"]),
    FieldDescriptor::text("System", "Version", &["Software Version"]),
    FieldDescriptor::text("System", "User", &["Operator"]).flagged(),
];

static FIBICS_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::text("Application", "Version", &["Software Version"]),
    FieldDescriptor::text("Application", "Supplier", &["Software Supplier"]),
    FieldDescriptor::scaled("Scan", "Dwell", &["dwell_time"], 1.0, Unit::Microsecond),
    FieldDescriptor::scaled("Scan", "FOV_X", &["horizontal_field_width"], 1.0, Unit::Micrometer),
    FieldDescriptor::scaled("Scan", "FOV_Y", &["vertical_field_width"], 1.0, Unit::Micrometer),
    FieldDescriptor::scaled("Scan", "Rot", &["scan_rotation"], 1.0, Unit::Degree),
    FieldDescriptor::number("Scan", "LineAvg", &["Line Averaging"]),
    FieldDescriptor::number("Scan", "FrameAvg", &["Frame Averaging"]),
    FieldDescriptor::scaled("Stage", "X", &["stage_position", "x"], 1.0, Unit::Micrometer),
    FieldDescriptor::scaled("Stage", "Y", &["stage_position", "y"], 1.0, Unit::Micrometer),
    FieldDescriptor::scaled("Stage", "Z", &["stage_position", "z"], 1.0, Unit::Micrometer),
    FieldDescriptor::scaled("Stage", "Tilt", &["stage_position", "tilt_alpha"], 1.0, Unit::Degree),
    FieldDescriptor::scaled("Stage", "Rot", &["stage_position", "rotation"], 1.0, Unit::Degree),
    FieldDescriptor::strip_units("BeamInfo", "AccV", &["acceleration_voltage"], Unit::Kilovolt),
    FieldDescriptor::strip_units("BeamInfo", "BeamI", &["beam_current"], Unit::Picoampere),
    FieldDescriptor::strip_units("BeamInfo", "Aperture", &["Aperture Size"], Unit::Micrometer),
    FieldDescriptor::text("BeamInfo", "Gas", &["Gas Type"]),
    FieldDescriptor::number("BeamInfo", "Spot", &["Spot Size"]),
    FieldDescriptor::text("DetectorInfo", "Detector", &["detector_type"]),
    FieldDescriptor::strip_units("DetectorInfo", "Collector Voltage", &["Collector Voltage"], Unit::Volt),
    FieldDescriptor::strip_units("DetectorInfo", "Stage Bias Voltage", &["Stage Bias Voltage"], Unit::Volt),
];

/// Decoder for helium-ion microscope TIFF files.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrionFibicsTiffDecoder;

impl OrionFibicsTiffDecoder {
    /// Parsed XML and variant, or `None` when neither tag holds the expected root.
    pub fn detect(dir: &TiffDirectory) -> Option<(HimVariant, XmlElement)> {
        let candidates = [
            (tags::ZEISS_XML, "ImageTags", HimVariant::Zeiss),
            (tags::FIBICS_XML, "Fibics", HimVariant::Fibics),
        ];
        candidates.into_iter().find_map(|(tag, root_name, variant)| {
            let bytes = dir.bytes(tag)?;
            match XmlElement::parse_bytes(bytes) {
                Ok(root) if root.name == root_name => Some((variant, root)),
                Ok(_) => None,
                Err(err) => {
                    log::debug!("tag {tag} holds malformed XML: {err}");
                    None
                }
            }
        })
    }

    /// Zeiss value: whole path as one tag name, then child-by-child.
    pub fn zeiss_value(root: &XmlElement, section: &str, key: &str) -> Option<String> {
        let dotted = format!("{section}.{key}");
        let node = root
            .find_descendant(&dotted)
            .or_else(|| root.find_descendant(&format!("{section}{key}")))
            .or_else(|| {
                let path: Vec<&str> = dotted.split('.').collect();
                root.at_path(&path)
                    .or_else(|| root.find_descendant(path[0]).and_then(|n| n.at_path(&path[1..])))
            })?;
        Self::element_value(node)
    }

    /// Fibics value: direct child, then `item[@name]`.
    pub fn fibics_value(root: &XmlElement, section: &str, key: &str) -> Option<String> {
        let parent = root.child(section)?;
        let node = parent.child(key).or_else(|| {
            parent
                .children_named("item")
                .find(|item| item.attribute("name") == Some(key))
        })?;
        Self::element_value(node)
    }

    fn element_value(node: &XmlElement) -> Option<String> {
        node.text()
            .or_else(|| node.child("Value").and_then(XmlElement::text))
            .map(str::to_string)
    }
}

impl Extractor for OrionFibicsTiffDecoder {
    fn name(&self) -> &'static str {
        "orion_fibics_tif"
    }

    fn priority(&self) -> i32 {
        150
    }

    fn supports(&self, ctx: &ExtractionContext<'_>) -> Result<bool, ExtractError> {
        if !has_extension(ctx, &["tif", "tiff"]) {
            return Ok(false);
        }
        if !ctx.exists() {
            return Ok(true);
        }
        Ok(TiffDirectory::from_path(ctx.path())
            .ok()
            .and_then(|dir| Self::detect(&dir))
            .is_some())
    }

    fn decode(&self, ctx: &ExtractionContext<'_>) -> Result<Vec<RawRecord>, ExtractError> {
        let dir = TiffDirectory::from_path(ctx.path())?;
        let (variant, root) = Self::detect(&dir)
            .ok_or_else(|| ExtractError::MissingMetadata("no Zeiss or Fibics XML tag".into()))?;

        let mut record = ctx.new_record(DatasetType::Image, "HIM_Imaging");
        match variant {
            HimVariant::Zeiss => apply_descriptors(
                ZEISS_FIELDS,
                |d| Self::zeiss_value(&root, d.section, d.source_key),
                &mut record,
            ),
            HimVariant::Fibics => apply_descriptors(
                FIBICS_FIELDS,
                |d| Self::fibics_value(&root, d.section, d.source_key),
                &mut record,
            ),
        };

        if let (Some(w), Some(h)) = (dir.unsigned(tags::IMAGE_WIDTH), dir.unsigned(tags::IMAGE_LENGTH)) {
            record.set("data_dimensions", dimensions_text([w, h]));
        }
        record.set(variant.vendor_key(), MetaValue::Map(root.to_metadata_map()));
        Ok(vec![record])
    }
}
