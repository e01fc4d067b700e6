//! Gatan DigitalMicrograph `.dm3`/`.dm4` files.
//!
//! A file holds an `ImageList`; every entry except the thumbnail becomes its
//! own record, tagged with its position among the signals.

use byteorder::{BigEndian, ReadBytesExt};

use super::{dimensions_text, has_extension};
use crate::extractors::{ExtractError, ExtractionContext, Extractor};
use crate::fields::{apply_descriptors, FieldDescriptor};
use crate::formats::dm::{DmFile, DmValue};
use crate::metadata::{MetaValue, RawRecord};
use crate::schema::DatasetType;
use crate::units::{Dimension, Quantity, Unit};

/// Key holding each signal's `ImageTags` tree
pub const VENDOR_KEY: &str = "DM_Metadata";

static FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::scaled("Microscope Info", "Voltage", &["acceleration_voltage"], 1e-3, Unit::Kilovolt),
    FieldDescriptor::scaled("Microscope Info", "Emission Current (µA)", &["emission_current"], 1.0, Unit::Microampere),
    FieldDescriptor::scaled("Microscope Info", "Probe Current (nA)", &["beam_current"], 1e3, Unit::Picoampere)
        .nonzero(),
    FieldDescriptor::scaled("Microscope Info", "Probe Size (nm)", &["Probe Size"], 1.0, Unit::Nanometer),
    FieldDescriptor::scaled("Microscope Info", "Cs(mm)", &["Spherical Aberration"], 1.0, Unit::Millimeter),
    FieldDescriptor::scaled("Microscope Info", "STEM Camera Length", &["camera_length"], 1.0, Unit::Millimeter),
    FieldDescriptor::scaled("Microscope Info", "Field of View (µm)", &["horizontal_field_width"], 1.0, Unit::Micrometer),
    FieldDescriptor::number("Microscope Info", "Indicated Magnification", &["magnification"]),
    FieldDescriptor::number("Microscope Info", "Actual Magnification", &["Actual Magnification"]),
    FieldDescriptor::text("Microscope Info", "Illumination Mode", &["Illumination Mode"]),
    FieldDescriptor::text("Microscope Info", "Imaging Mode", &["Imaging Mode"]),
    FieldDescriptor::text("Microscope Info", "Operation Mode", &["Operation Mode"]),
    FieldDescriptor::text("Microscope Info", "Microscope", &["Microscope"]),
    FieldDescriptor::text("Microscope Info", "Operator", &["Operator"]).flagged(),
    FieldDescriptor::text("Microscope Info", "Specimen", &["Specimen"]),
    FieldDescriptor::scaled("Microscope Info.Stage Position", "Stage X", &["stage_position", "x"], 1.0, Unit::Micrometer),
    FieldDescriptor::scaled("Microscope Info.Stage Position", "Stage Y", &["stage_position", "y"], 1.0, Unit::Micrometer),
    FieldDescriptor::scaled("Microscope Info.Stage Position", "Stage Z", &["stage_position", "z"], 1.0, Unit::Micrometer),
    FieldDescriptor::scaled("Microscope Info.Stage Position", "Stage Alpha", &["stage_position", "tilt_alpha"], 1.0, Unit::Degree),
    FieldDescriptor::scaled("Microscope Info.Stage Position", "Stage Beta", &["stage_position", "tilt_beta"], 1.0, Unit::Degree)
        .nonzero(),
    FieldDescriptor::text("DataBar", "Acquisition Date", &["Acquisition Date"]),
    FieldDescriptor::text("DataBar", "Acquisition Time", &["Acquisition Time"]),
    FieldDescriptor::scaled("DataBar", "Exposure Time (s)", &["Exposure Time"], 1.0, Unit::Second),
    FieldDescriptor::number("DataBar", "Binning", &["Binning"]),
    FieldDescriptor::text("DataBar", "Device Name", &["acquisition_device"]),
    FieldDescriptor::text("Acquisition.Device", "Name", &["acquisition_device"]),
    FieldDescriptor::text("Acquisition.Device", "Source", &["Camera Source"]),
    FieldDescriptor::text("Acquisition.Parameters.High Level", "Processing", &["Processing"]),
    FieldDescriptor::scaled("EELS.Acquisition", "Integration time (s)", &["acquisition_time"], 1.0, Unit::Second),
    FieldDescriptor::scaled("EELS.Acquisition", "Exposure (s)", &["Exposure Time"], 1.0, Unit::Second),
    FieldDescriptor::number("EELS.Acquisition", "Number of frames", &["Number of Frames"]),
    FieldDescriptor::scaled(
        "EELS.Experimental Conditions",
        "Collection semi-angle (mrad)",
        &["Collection Semi-angle"],
        1.0,
        Unit::Milliradian,
    ),
    FieldDescriptor::scaled(
        "EELS.Experimental Conditions",
        "Convergence semi-angle (mrad)",
        &["convergence_angle"],
        1.0,
        Unit::Milliradian,
    ),
    FieldDescriptor::text("EELS Spectrometer", "Aperture label", &["Spectrometer Aperture"]),
    FieldDescriptor::scaled("EELS Spectrometer", "Dispersion (eV/ch)", &["channel_size"], 1.0, Unit::ElectronVolt),
    FieldDescriptor::scaled("EELS Spectrometer", "Energy loss (eV)", &["Energy Loss"], 1.0, Unit::ElectronVolt),
    FieldDescriptor::scaled("EELS Spectrometer", "Slit width (eV)", &["Slit Width"], 1.0, Unit::ElectronVolt),
    FieldDescriptor::scaled("EELS Spectrometer", "Drift tube voltage (V)", &["Drift Tube Voltage"], 1.0, Unit::Volt),
    FieldDescriptor::text("EELS Spectrometer", "Slit inserted", &["Slit Inserted"]),
    FieldDescriptor::text("EELS Spectrometer", "Instrument name", &["Spectrometer Name"]),
    FieldDescriptor::number("EELS.Thickness", "Relative thickness", &["Relative Thickness"]),
    FieldDescriptor::scaled("EELS.Thickness", "Absolute thickness", &["Absolute Thickness"], 1.0, Unit::Nanometer),
    FieldDescriptor::scaled("EDS.Acquisition", "Live time", &["live_time"], 1.0, Unit::Second),
    FieldDescriptor::scaled("EDS.Acquisition", "Real time", &["acquisition_time"], 1.0, Unit::Second),
    FieldDescriptor::scaled("EDS.Detector Info", "Azimuthal angle", &["azimuthal_angle"], 1.0, Unit::Degree),
    FieldDescriptor::scaled("EDS.Detector Info", "Elevation angle", &["elevation_angle"], 1.0, Unit::Degree),
    FieldDescriptor::scaled("EDS.Detector Info", "Takeoff angle", &["takeoff_angle"], 1.0, Unit::Degree),
    FieldDescriptor::number("EDS.Detector Info", "Solid angle", &["Solid Angle"]),
    FieldDescriptor::scaled(
        "EDS.Detector Info",
        "Energy Resolution (eV)",
        &["detector_energy_resolution"],
        1.0,
        Unit::ElectronVolt,
    ),
    FieldDescriptor::scaled("SI.Acquisition", "Pixel time (s)", &["pixel_time"], 1.0, Unit::Second),
    FieldDescriptor::text("SI.Acquisition", "Scan mode", &["scan_mode"]),
    FieldDescriptor::text("SI.Acquisition", "Scan Device", &["Scan Device"]),
    FieldDescriptor::number("SI.Acquisition.Spatial Sampling", "Width (pixels)", &["Spatial Width"]),
    FieldDescriptor::number("SI.Acquisition.Spatial Sampling", "Height (pixels)", &["Spatial Height"]),
];

/// What kind of signal an `ImageList` entry holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Eels,
    Eds,
    Other,
}

/// Decoder for DigitalMicrograph files.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dm3Decoder;

impl Dm3Decoder {
    /// Indices of `ImageList` entries that are real signals, thumbnails excluded.
    pub fn signal_indices(file: &DmFile) -> Vec<usize> {
        let count = file
            .get(&["ImageList"])
            .and_then(DmValue::entries)
            .map_or(0, <[_]>::len);
        let thumbnails: Vec<usize> = file
            .get(&["Thumbnails"])
            .and_then(DmValue::entries)
            .map(|list| {
                list.iter()
                    .filter_map(|t| t.value.child("ImageIndex").and_then(DmValue::as_i64))
                    .filter_map(|i| usize::try_from(i).ok())
                    .collect()
            })
            .unwrap_or_else(|| if count > 1 { vec![0] } else { Vec::new() });
        (0..count).filter(|i| !thumbnails.contains(i)).collect()
    }

    fn dimensions(image: &DmValue) -> Vec<u64> {
        image
            .at_path(&["ImageData", "Dimensions"])
            .and_then(DmValue::entries)
            .map(|dims| {
                dims.iter()
                    .filter_map(|d| d.value.as_i64())
                    .filter_map(|d| u64::try_from(d).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn classify(tags: Option<&DmValue>, ndim: usize) -> (DatasetType, String) {
        let text = |path: &[&str]| {
            tags.and_then(|t| t.at_path(path))
                .and_then(DmValue::as_str)
                .map(str::to_ascii_lowercase)
                .unwrap_or_default()
        };
        let format = text(&["Meta Data", "Format"]);
        let signal_name = text(&["Meta Data", "Signal"]);
        let imaging_mode = text(&["Microscope Info", "Imaging Mode"]);
        let operation = text(&["Microscope Info", "Operation Mode"]);
        let has_group = |name: &str| tags.and_then(|t| t.child(name)).is_some();

        let signal = if signal_name.contains("eels") || (signal_name.is_empty() && has_group("EELS")) {
            Signal::Eels
        } else if signal_name.contains("eds") || signal_name.contains("x-ray") || (signal_name.is_empty() && has_group("EDS")) {
            Signal::Eds
        } else {
            Signal::Other
        };
        let mode = if operation.contains("scanning") || operation.contains("stem") { "STEM" } else { "TEM" };

        let dataset_type = if format.contains("spectrum image") || ndim == 3 {
            DatasetType::SpectrumImage
        } else if format.contains("spectrum") || ndim == 1 {
            DatasetType::Spectrum
        } else if format.contains("diffraction") || imaging_mode.contains("diffraction") {
            DatasetType::Diffraction
        } else {
            DatasetType::Image
        };

        let data_type = match (dataset_type, signal) {
            (DatasetType::SpectrumImage, Signal::Eels) => "EELS_Spectrum_Imaging".to_string(),
            (DatasetType::SpectrumImage, Signal::Eds) => "EDS_Spectrum_Imaging".to_string(),
            (DatasetType::SpectrumImage, Signal::Other) => format!("{mode}_Spectrum_Imaging"),
            (DatasetType::Spectrum, Signal::Eels) => format!("{mode}_EELS"),
            (DatasetType::Spectrum, Signal::Eds) => format!("{mode}_EDS"),
            (DatasetType::Spectrum, Signal::Other) => format!("{mode}_Spectrum"),
            (DatasetType::Diffraction, _) => format!("{mode}_Diffraction"),
            _ => format!("{mode}_Imaging"),
        };
        (dataset_type, data_type)
    }

    /// Operation names from `ImageTags.Processing`, in order.
    fn processing_steps(tags: &DmValue) -> Vec<MetaValue> {
        tags.child("Processing")
            .and_then(DmValue::entries)
            .map(|steps| {
                steps
                    .iter()
                    .filter_map(|s| s.value.child("Operation").and_then(DmValue::as_str))
                    .map(MetaValue::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Per-axis (scale, origin, unit) from `ImageData.Calibrations.Dimension`.
    fn calibrations(image: &DmValue) -> Vec<(f64, f64, Option<Unit>)> {
        image
            .at_path(&["ImageData", "Calibrations", "Dimension"])
            .and_then(DmValue::entries)
            .map(|axes| {
                axes.iter()
                    .map(|axis| {
                        let scale = axis.value.child("Scale").and_then(DmValue::as_f64).unwrap_or(1.0);
                        let origin = axis.value.child("Origin").and_then(DmValue::as_f64).unwrap_or(0.0);
                        let unit = axis.value.child("Units").and_then(DmValue::as_str).and_then(Unit::parse);
                        (scale, origin, unit)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn apply_calibrations(image: &DmValue, dataset_type: DatasetType, record: &mut RawRecord) {
        let axes = Self::calibrations(image);
        match dataset_type {
            DatasetType::Spectrum | DatasetType::SpectrumImage => {
                // Energy axis is the last one for spectrum images.
                let energy = axes
                    .iter()
                    .rev()
                    .find(|(_, _, unit)| unit.is_some_and(|u| u.dimension() == Dimension::Energy));
                if let Some(&(scale, origin, Some(unit))) = energy {
                    if record.get("channel_size").is_none() {
                        record.set("channel_size", Quantity::new(scale, unit));
                    }
                    record.set("starting_energy", Quantity::new(-origin * scale, unit));
                }
            }
            DatasetType::Image => {
                let length = |(scale, _, unit): &(f64, f64, Option<Unit>)| {
                    unit.filter(|u| u.dimension() == Dimension::Length)
                        .map(|u| Quantity::new(*scale, u))
                };
                if let Some(q) = axes.first().and_then(length) {
                    record.set("pixel_width", q);
                }
                if let Some(q) = axes.get(1).and_then(length) {
                    record.set("pixel_height", q);
                }
            }
            _ => {}
        }
    }

    fn decode_signal(
        ctx: &ExtractionContext<'_>,
        image: &DmValue,
        index: usize,
        count: usize,
    ) -> RawRecord {
        let tags = image.child("ImageTags");
        let dims = Self::dimensions(image);
        let (dataset_type, data_type) = Self::classify(tags, dims.len());

        let mut record = ctx.new_record(dataset_type, data_type);
        record.signal_index = Some(index);
        record.signal_count = count;
        if !dims.is_empty() {
            record.set("data_dimensions", dimensions_text(dims.iter().copied()));
        }

        if let Some(tags) = tags {
            apply_descriptors(
                FIELDS,
                |d| {
                    tags.at_path(&d.section.split('.').collect::<Vec<_>>())?
                        .child(d.source_key)?
                        .to_text()
                },
                &mut record,
            );
            let steps = Self::processing_steps(tags);
            if !steps.is_empty() {
                record.set("Processing Steps", MetaValue::List(steps));
            }
            record.set(VENDOR_KEY, tags.to_metadata());
        }
        Self::apply_calibrations(image, dataset_type, &mut record);
        record
    }
}

impl Extractor for Dm3Decoder {
    fn name(&self) -> &'static str {
        "dm3"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn supports(&self, ctx: &ExtractionContext<'_>) -> Result<bool, ExtractError> {
        if !has_extension(ctx, &["dm3", "dm4"]) {
            return Ok(false);
        }
        if !ctx.exists() {
            return Ok(true);
        }
        let head = ctx.read_head(4)?;
        Ok(head.len() == 4 && matches!((&head[..]).read_u32::<BigEndian>()?, 3 | 4))
    }

    fn decode(&self, ctx: &ExtractionContext<'_>) -> Result<Vec<RawRecord>, ExtractError> {
        let file = DmFile::from_path(ctx.path())?;
        let indices = Self::signal_indices(&file);
        let images = file.get(&["ImageList"]);
        let count = indices.len();
        let records: Vec<RawRecord> = indices
            .iter()
            .enumerate()
            .filter_map(|(signal, &entry)| {
                let image = images?.index(entry)?;
                Some(Self::decode_signal(ctx, image, signal, count))
            })
            .collect();
        if records.is_empty() {
            return Err(ExtractError::MissingMetadata("ImageList holds no signals".into()));
        }
        Ok(records)
    }
}
