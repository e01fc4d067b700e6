use super::DatasetType;
use crate::units::UnitError;

/// Violations of the canonical schema.
///
/// These indicate a routing bug between decoded fields and the schema, not a
/// malformed input file.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Timestamp text is not ISO-8601
    #[error("invalid creation time {0:?}")]
    InvalidTimestamp(String),

    /// Timestamp has no offset or `Z`
    #[error("creation time {0:?} has no timezone")]
    MissingTimezone(String),

    /// `data_type` is empty
    #[error("data_type must not be empty")]
    EmptyDataType,

    /// A required field is absent
    #[error("missing required field {0}")]
    MissingField(&'static str),

    /// Dataset type outside the closed vocabulary
    #[error("unknown dataset type {0:?}")]
    UnknownDatasetType(String),

    /// Field is not a core field of the dataset type
    #[error("{field} is not a core field of {dataset_type}")]
    UndeclaredField {
        /// Offending field
        field: String,
        /// Active dataset type
        dataset_type: DatasetType,
    },

    /// Value has the wrong shape for the field
    #[error("{field} expects {expected}, got {found}")]
    TypeMismatch {
        /// Field name
        field: String,
        /// Expected kind
        expected: &'static str,
        /// Kind found
        found: &'static str,
    },

    /// Quantity cannot be expressed in the field's preferred unit
    #[error("{field}: {source}")]
    Unit {
        /// Field name
        field: String,
        /// Conversion failure
        source: UnitError,
    },
}
