//! # Canonical metadata schema
//!
//! Every record is keyed by a [`DatasetType`]. Each dataset type declares a
//! closed set of core fields, each with a preferred display unit and, where
//! one exists, an EM Glossary term. Anything else goes to `extensions`.
//!
//! ## Core fields
//!
//! | Dataset type | Fields |
//! |---|---|
//! | all | creation_time, data_type, dataset_type, instrument_id, data_dimensions, warnings |
//! | Image | acceleration_voltage [kV], working_distance [mm], beam_current [pA], emission_current [µA], dwell_time [µs], magnification, horizontal/vertical_field_width [µm], pixel_width/height [nm], scan_rotation [°], detector_type, acquisition_device, stage_position |
//! | Spectrum | acquisition_time/live_time [s], channel_size [eV], starting_energy [keV], azimuthal/elevation/takeoff_angle [°], elements, detector_energy_resolution [eV], acquisition_device |
//! | SpectrumImage | Image ∪ Spectrum, pixel_time [µs], scan_mode |
//! | Diffraction | acceleration_voltage [kV], camera_length [mm], convergence_angle [mrad] |
//! | Misc, Unknown | base fields only |
//!
//! `stage_position` is a mapping over `x`, `y`, `z` [µm] and `rotation`,
//! `tilt_alpha`, `tilt_beta` [°].

mod canonical;
mod error;
mod fields;


pub use canonical::CanonicalMetadata;
pub use error::SchemaError;
pub use fields::{classify_field, core_fields, field_spec, stage_axis, FieldKind, FieldSpec, STAGE_AXES};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed vocabulary of dataset types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DatasetType {
    /// 2D image
    Image,
    /// 1D spectrum
    Spectrum,
    /// Spectrum per scan position
    SpectrumImage,
    /// Diffraction pattern
    Diffraction,
    /// Recognized but not one of the above
    Misc,
    /// Not decoded
    Unknown,
}

impl DatasetType {
    /// Every dataset type
    pub const ALL: [DatasetType; 6] = [
        DatasetType::Image,
        DatasetType::Spectrum,
        DatasetType::SpectrumImage,
        DatasetType::Diffraction,
        DatasetType::Misc,
        DatasetType::Unknown,
    ];

    /// Name used in records
    pub const fn as_str(self) -> &'static str {
        match self {
            DatasetType::Image => "Image",
            DatasetType::Spectrum => "Spectrum",
            DatasetType::SpectrumImage => "SpectrumImage",
            DatasetType::Diffraction => "Diffraction",
            DatasetType::Misc => "Misc",
            DatasetType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for DatasetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        DatasetType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| SchemaError::UnknownDatasetType(s.to_string()))
    }
}
