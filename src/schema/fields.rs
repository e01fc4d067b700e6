use super::DatasetType;
use crate::glossary::term_for_field;
use crate::units::Unit;

/// Shape a core field accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Quantity, normalized to the preferred unit
    Quantity(Unit),
    /// Plain number
    Number,
    /// Free text
    Text,
    /// List of values
    List,
    /// `x`/`y`/`z`/`rotation`/`tilt_alpha`/`tilt_beta` mapping
    StagePosition,
}

impl FieldKind {
    /// Preferred unit for quantity fields
    pub const fn unit(self) -> Option<Unit> {
        match self {
            FieldKind::Quantity(unit) => Some(unit),
            _ => None,
        }
    }
}

/// A core field declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Canonical name
    pub name: &'static str,
    /// Accepted shape
    pub kind: FieldKind,
}

const fn spec(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind }
}

/// Stage sub-keys and their preferred units
pub const STAGE_AXES: &[(&str, Unit)] = &[
    ("x", Unit::Micrometer),
    ("y", Unit::Micrometer),
    ("z", Unit::Micrometer),
    ("rotation", Unit::Degree),
    ("tilt_alpha", Unit::Degree),
    ("tilt_beta", Unit::Degree),
];

/// Optional fields shared by every dataset type. The required
/// `creation_time`, `data_type` and `dataset_type` are struct fields.
const BASE: &[FieldSpec] = &[
    spec("instrument_id", FieldKind::Text),
    spec("data_dimensions", FieldKind::Text),
    spec("warnings", FieldKind::List),
];

const IMAGE: &[FieldSpec] = &[
    spec("acceleration_voltage", FieldKind::Quantity(Unit::Kilovolt)),
    spec("working_distance", FieldKind::Quantity(Unit::Millimeter)),
    spec("beam_current", FieldKind::Quantity(Unit::Picoampere)),
    spec("emission_current", FieldKind::Quantity(Unit::Microampere)),
    spec("dwell_time", FieldKind::Quantity(Unit::Microsecond)),
    spec("magnification", FieldKind::Number),
    spec("horizontal_field_width", FieldKind::Quantity(Unit::Micrometer)),
    spec("vertical_field_width", FieldKind::Quantity(Unit::Micrometer)),
    spec("pixel_width", FieldKind::Quantity(Unit::Nanometer)),
    spec("pixel_height", FieldKind::Quantity(Unit::Nanometer)),
    spec("scan_rotation", FieldKind::Quantity(Unit::Degree)),
    spec("detector_type", FieldKind::Text),
    spec("acquisition_device", FieldKind::Text),
    spec("stage_position", FieldKind::StagePosition),
];

const SPECTRUM: &[FieldSpec] = &[
    spec("acquisition_time", FieldKind::Quantity(Unit::Second)),
    spec("live_time", FieldKind::Quantity(Unit::Second)),
    spec("channel_size", FieldKind::Quantity(Unit::ElectronVolt)),
    spec("starting_energy", FieldKind::Quantity(Unit::KiloelectronVolt)),
    spec("azimuthal_angle", FieldKind::Quantity(Unit::Degree)),
    spec("elevation_angle", FieldKind::Quantity(Unit::Degree)),
    spec("takeoff_angle", FieldKind::Quantity(Unit::Degree)),
    spec("elements", FieldKind::List),
    spec("detector_energy_resolution", FieldKind::Quantity(Unit::ElectronVolt)),
    spec("acquisition_device", FieldKind::Text),
];

const SPECTRUM_IMAGE: &[FieldSpec] = &[
    spec("pixel_time", FieldKind::Quantity(Unit::Microsecond)),
    spec("scan_mode", FieldKind::Text),
];

const DIFFRACTION: &[FieldSpec] = &[
    spec("acceleration_voltage", FieldKind::Quantity(Unit::Kilovolt)),
    spec("camera_length", FieldKind::Quantity(Unit::Millimeter)),
    spec("convergence_angle", FieldKind::Quantity(Unit::Milliradian)),
];

/// Tables making up a dataset type's optional core fields, searched in order
pub fn core_fields(dataset_type: DatasetType) -> &'static [&'static [FieldSpec]] {
    match dataset_type {
        DatasetType::Image => &[BASE, IMAGE],
        DatasetType::Spectrum => &[BASE, SPECTRUM],
        DatasetType::SpectrumImage => &[BASE, IMAGE, SPECTRUM, SPECTRUM_IMAGE],
        DatasetType::Diffraction => &[BASE, DIFFRACTION],
        DatasetType::Misc | DatasetType::Unknown => &[BASE],
    }
}

/// Declaration of `name` for `dataset_type`, if it is a core field there
pub fn field_spec(name: &str, dataset_type: DatasetType) -> Option<FieldSpec> {
    core_fields(dataset_type)
        .iter()
        .flat_map(|table| table.iter())
        .find(|spec| spec.name == name)
        .copied()
}

/// Preferred unit of a `stage_position` sub-key
pub fn stage_axis(axis: &str) -> Option<Unit> {
    STAGE_AXES.iter().find(|(name, _)| *name == axis).map(|(_, unit)| *unit)
}

/// Whether `name` is a core field of `dataset_type`, and its glossary id.
///
/// The required fields count as core for every dataset type. Pure; the
/// answer depends only on the arguments.
pub fn classify_field(name: &str, dataset_type: DatasetType) -> (bool, Option<&'static str>) {
    let required = matches!(name, "creation_time" | "data_type" | "dataset_type");
    let is_core = required || field_spec(name, dataset_type).is_some();
    let glossary_id = is_core.then(|| term_for_field(name).map(|t| t.id)).flatten();
    (is_core, glossary_id)
}
