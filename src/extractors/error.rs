use crate::formats::dm::DmError;
use crate::formats::ini::IniError;
use crate::formats::ser::SerError;
use crate::formats::tiff::TiffError;
use crate::formats::xml::XmlError;

/// Errors raised inside a decoder.
///
/// These never leave [`super::Extractor::extract`]; they become the reason of
/// an [`super::Extraction::Recovered`] outcome.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// I/O error reading the file or a companion
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed TIFF container
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// Malformed INI payload
    #[error("INI error: {0}")]
    Ini(#[from] IniError),

    /// Malformed XML payload
    #[error("XML error: {0}")]
    Xml(#[from] XmlError),

    /// Malformed DigitalMicrograph file
    #[error("DigitalMicrograph error: {0}")]
    Dm(#[from] DmError),

    /// Malformed TIA series
    #[error("TIA error: {0}")]
    Ser(#[from] SerError),

    /// The container is valid but lacks the expected metadata
    #[error("missing metadata: {0}")]
    MissingMetadata(String),
}

/// Errors raised while registering an extractor
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Every extension probe failed, so the extractor was excluded
    #[error("extractor {name:?} failed all {failures} extension probes: {last_error}")]
    ProbeFailed {
        /// Extractor identity
        name: String,
        /// Number of failed probes
        failures: usize,
        /// Message of the last failure
        last_error: String,
    },
}
