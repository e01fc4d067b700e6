//! FEI/Thermo TIA `.ser` series with their `.emi` companions.
//!
//! The `.ser` header gives the series shape and calibration; microscope
//! conditions only live in the `.emi` ObjectInfo XML.

use std::path::{Path, PathBuf};

use log::debug;

use super::{dimensions_text, has_extension};
use crate::config::DATA_PATH_ENV;
use crate::extractors::{ExtractError, ExtractionContext, Extractor};
use crate::formats::ser::{companion_emi_path, EmiInfo, ExperimentalEntry, SerDataKind, SerHeader};
use crate::metadata::{time, MetaValue, RawRecord};
use crate::schema::DatasetType;
use crate::units::{split_number, Quantity, Unit};

const MAGIC: [u8; 4] = [0x49, 0x49, 0x97, 0x01];

/// Key holding the EMI ObjectInfo tree
pub const VENDOR_KEY: &str = "TIA_Metadata";

/// ExperimentalDescription labels with a canonical home: (label, output, target unit)
static LABELS: &[(&str, &[&str], Option<Unit>)] = &[
    ("High tension", &["acceleration_voltage"], Some(Unit::Kilovolt)),
    ("Emission", &["emission_current"], Some(Unit::Microampere)),
    ("Magnification", &["magnification"], None),
    ("Camera length", &["camera_length"], Some(Unit::Millimeter)),
    ("Spot size", &["Spot Size"], None),
    ("Defocus", &["Defocus"], Some(Unit::Nanometer)),
    ("Dwell time", &["dwell_time"], Some(Unit::Microsecond)),
    ("Convergence angle", &["convergence_angle"], Some(Unit::Milliradian)),
    ("Stage X", &["stage_position", "x"], Some(Unit::Micrometer)),
    ("Stage Y", &["stage_position", "y"], Some(Unit::Micrometer)),
    ("Stage Z", &["stage_position", "z"], Some(Unit::Micrometer)),
    ("Stage A", &["stage_position", "tilt_alpha"], Some(Unit::Degree)),
    ("Stage B", &["stage_position", "tilt_beta"], Some(Unit::Degree)),
    ("Microscope", &["Microscope"], None),
    ("Mode", &["Mode"], None),
    ("User", &["Operator"], None),
];

/// Decoder for TIA `.ser` files.
#[derive(Debug, Clone, Default)]
pub struct SerEmiDecoder {
    data_root: Option<PathBuf>,
}

impl SerEmiDecoder {
    /// Decoder storing `.emi` paths relative to `data_root` when possible.
    pub fn new(data_root: Option<PathBuf>) -> Self {
        Self { data_root }
    }

    /// Decoder whose data root comes from `NX_INSTRUMENT_DATA_PATH`.
    pub fn from_env() -> Self {
        Self::new(std::env::var_os(DATA_PATH_ENV).map(PathBuf::from))
    }

    /// Configured instrument-data root
    pub fn data_root(&self) -> Option<&Path> {
        self.data_root.as_deref()
    }

    /// `path` relative to the data root, else absolute.
    ///
    /// Both sides are made absolute first, so a relative root or a `.ser`
    /// opened through a relative path still resolve against each other.
    pub fn display_path(&self, path: &Path) -> PathBuf {
        let path = absolutize(path);
        self.data_root
            .as_deref()
            .map(absolutize)
            .and_then(|root| path.strip_prefix(root).ok().map(Path::to_path_buf))
            .unwrap_or(path)
    }

    fn entry_value(entry: &ExperimentalEntry, target: Option<Unit>) -> MetaValue {
        let value = entry.value.trim();
        let Ok((number, rest)) = split_number(value) else {
            return MetaValue::from(value);
        };
        if !rest.trim().is_empty() {
            return MetaValue::from(value);
        }
        let Some(unit) = Unit::parse(entry.unit.trim()) else {
            return MetaValue::from(number);
        };
        let quantity = Quantity::new(number, unit);
        match target {
            Some(target) => quantity.convert_to(target).map_or(MetaValue::from(quantity), MetaValue::from),
            None => MetaValue::from(quantity),
        }
    }

    fn apply_description(entries: &[ExperimentalEntry], record: &mut RawRecord) {
        for entry in entries {
            match LABELS.iter().find(|(label, _, _)| label.eq_ignore_ascii_case(entry.label.trim())) {
                Some((label, output, target)) => {
                    record.set_path(*output, Self::entry_value(entry, *target));
                    record.record_source(output.join("."), format!("ExperimentalDescription.{label}"));
                }
                None if !entry.label.trim().is_empty() => {
                    record.set(entry.label.trim(), Self::entry_value(entry, None));
                }
                None => {}
            }
        }
        if record.get("Operator").is_some() {
            record.warn("Operator");
        }
    }

    fn mode_text(emi: Option<&EmiInfo>) -> String {
        emi.and_then(|e| {
            e.experimental_description()
                .into_iter()
                .find(|entry| entry.label.eq_ignore_ascii_case("Mode"))
                .map(|entry| entry.value)
        })
        .unwrap_or_default()
        .to_ascii_lowercase()
    }

    fn classify(header: &SerHeader, mode: &str) -> (DatasetType, String) {
        let prefix = if mode.contains("stem") { "STEM" } else { "TEM" };
        match header.data_kind {
            SerDataKind::Spectrum if header.total_elements > 1 => {
                (DatasetType::SpectrumImage, format!("{prefix}_Spectrum_Imaging"))
            }
            SerDataKind::Spectrum => (DatasetType::Spectrum, format!("{prefix}_Spectrum")),
            SerDataKind::Image if mode.contains("diffraction") => {
                (DatasetType::Diffraction, format!("{prefix}_Diffraction"))
            }
            SerDataKind::Image => (DatasetType::Image, format!("{prefix}_Imaging")),
        }
    }

    fn apply_header(header: &SerHeader, record: &mut RawRecord) {
        let series = header
            .dimensions
            .iter()
            .map(|d| u64::from(d.size))
            .filter(|&size| size > 1);
        let element = header
            .first_element
            .iter()
            .flat_map(|e| e.shape.iter().map(|&s| u64::from(s)));
        let dims: Vec<u64> = series.chain(element).collect();
        if !dims.is_empty() {
            record.set("data_dimensions", dimensions_text(dims));
        }
        record.set("Series Elements", header.valid_elements);
        if let Some(element) = &header.first_element {
            record.set("Data Value Type", element.value_type_name());
            match header.data_kind {
                SerDataKind::Spectrum => {
                    if let Some(&(offset, delta, first)) = element.calibrations.first() {
                        let start = offset - f64::from(first) * delta;
                        record.set("channel_size", Quantity::new(delta, Unit::ElectronVolt));
                        record.set("starting_energy", Quantity::new(start, Unit::ElectronVolt));
                    }
                }
                SerDataKind::Image => {
                    let length = |delta: f64| {
                        Quantity::new(delta, Unit::Meter)
                            .convert_to(Unit::Nanometer)
                            .ok()
                    };
                    if let Some(q) = element.calibrations.first().and_then(|c| length(c.1)) {
                        record.set("pixel_width", q);
                    }
                    if let Some(q) = element.calibrations.get(1).and_then(|c| length(c.1)) {
                        record.set("pixel_height", q);
                    }
                }
            }
        }
    }
}

fn absolutize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

impl Extractor for SerEmiDecoder {
    fn name(&self) -> &'static str {
        "ser_emi"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn supports(&self, ctx: &ExtractionContext<'_>) -> Result<bool, ExtractError> {
        if !has_extension(ctx, &["ser"]) {
            return Ok(false);
        }
        if !ctx.exists() {
            return Ok(true);
        }
        Ok(ctx.read_head(MAGIC.len())? == MAGIC)
    }

    fn decode(&self, ctx: &ExtractionContext<'_>) -> Result<Vec<RawRecord>, ExtractError> {
        let header = SerHeader::from_path(ctx.path())?;

        let mut warnings = Vec::new();
        let emi = match companion_emi_path(ctx.path()) {
            Some(path) if path.is_file() => match EmiInfo::from_path(&path) {
                Ok(info) => Some(info),
                Err(e) => {
                    debug!("{}: unreadable companion {}: {e}", ctx.path().display(), path.display());
                    warnings.push(format!("companion .emi file could not be read: {e}"));
                    None
                }
            },
            _ => {
                warnings.push("no companion .emi file found".to_string());
                None
            }
        };

        let mode = Self::mode_text(emi.as_ref());
        let (dataset_type, data_type) = Self::classify(&header, &mode);
        let mut record = ctx.new_record(dataset_type, data_type);
        if let Some(created) = header
            .first_time
            .and_then(|t| time::from_unix_seconds(i64::from(t), ctx.instrument))
        {
            record.creation_time = created;
        }
        for warning in warnings {
            record.warn(warning);
        }
        for problem in &header.element_errors {
            debug!("{}: {problem}", ctx.path().display());
            record.warn(format!("series file damaged: {problem}"));
        }

        Self::apply_header(&header, &mut record);
        if let Some(emi) = &emi {
            record.set("emi Filename", self.display_path(&emi.path).display().to_string());
            Self::apply_description(&emi.experimental_description(), &mut record);
            record.set(VENDOR_KEY, emi.object_info.to_metadata());
        }
        Ok(vec![record])
    }
}
