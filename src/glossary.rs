//! # EM Glossary terms
//!
//! Canonical schema fields are tied to the Electron Microscopy Glossary so that
//! records produced by different instruments can be compared on shared
//! semantics, not on vendor spellings.
//!
//! ## Reference
//! - Glossary: https://owl.emglossary.helmholtz-metadaten.de/
//! - Source: https://codebase.helmholtz.cloud/em_glossary/em_glossary

use serde::Serialize;
use std::fmt;

/// A glossary term with its identifier and label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct GlossaryTerm {
    /// Glossary identifier (e.g., "EMG_00000004")
    pub id: &'static str,
    /// Human-readable label
    pub label: &'static str,
}

impl GlossaryTerm {
    /// Create a new glossary term
    pub const fn new(id: &'static str, label: &'static str) -> Self {
        Self { id, label }
    }

    /// Resolvable IRI for this term
    pub fn iri(&self) -> String {
        format!("https://purls.helmholtz-metadaten.de/emg/{}", self.id)
    }
}

impl fmt::Display for GlossaryTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}: {}]", self.id, self.label)
    }
}

/// Terms referenced by the canonical schema
pub mod emg_terms {
    use super::GlossaryTerm;

    /// EMG_00000004 - acceleration voltage
    pub const ACCELERATION_VOLTAGE: GlossaryTerm =
        GlossaryTerm::new("EMG_00000004", "Acceleration Voltage");

    /// EMG_00000006 - beam current
    pub const BEAM_CURRENT: GlossaryTerm = GlossaryTerm::new("EMG_00000006", "Beam Current");

    /// EMG_00000008 - camera length
    pub const CAMERA_LENGTH: GlossaryTerm = GlossaryTerm::new("EMG_00000008", "Camera Length");

    /// EMG_00000010 - convergence angle
    pub const CONVERGENCE_ANGLE: GlossaryTerm =
        GlossaryTerm::new("EMG_00000010", "Convergence Angle");

    /// EMG_00000015 - dwell time
    pub const DWELL_TIME: GlossaryTerm = GlossaryTerm::new("EMG_00000015", "Dwell Time");

    /// EMG_00000025 - emission current
    pub const EMISSION_CURRENT: GlossaryTerm =
        GlossaryTerm::new("EMG_00000025", "Emission Current");

    /// EMG_00000050 - working distance
    pub const WORKING_DISTANCE: GlossaryTerm =
        GlossaryTerm::new("EMG_00000050", "Working Distance");
}

/// Glossary term for a canonical field name, if one is defined.
pub fn term_for_field(field: &str) -> Option<GlossaryTerm> {
    match field {
        "acceleration_voltage" => Some(emg_terms::ACCELERATION_VOLTAGE),
        "beam_current" => Some(emg_terms::BEAM_CURRENT),
        "camera_length" => Some(emg_terms::CAMERA_LENGTH),
        "convergence_angle" => Some(emg_terms::CONVERGENCE_ANGLE),
        "dwell_time" => Some(emg_terms::DWELL_TIME),
        "emission_current" => Some(emg_terms::EMISSION_CURRENT),
        "working_distance" => Some(emg_terms::WORKING_DISTANCE),
        _ => None,
    }
}
