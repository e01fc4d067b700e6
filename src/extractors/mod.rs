//! # Extractor contract and registry
//!
//! An [`Extractor`] is a named, prioritized decoder that can sniff a file
//! ([`Extractor::supports`]) and turn it into one or more [`RawRecord`]s.
//! [`ExtractorRegistry`] picks the right extractor for a file and guarantees a
//! result for every input.
//!
//! ## Failure model
//!
//! Decoders return `Result`s internally; the provided
//! [`Extractor::extract`] turns errors and panics into an
//! [`Extraction::Recovered`] outcome carrying a minimal record, so callers
//! always receive a non-empty record list.
//!
//! ```no_run
//! use nexuslims_extract::extractors::{global_registry, ExtractionContext};
//!
//! let ctx = ExtractionContext::new("/data/titan/scan_1.ser", None);
//! let outcome = global_registry().extract(&ctx);
//! for record in outcome.records() {
//!     println!("{} {}", record.dataset_type, record.data_type);
//! }
//! ```

mod context;
mod error;
mod registry;

#[cfg(test)]
mod tests;

pub use context::ExtractionContext;
pub use error::{ExtractError, RegistryError};
pub use registry::{global_registry, ExtractorRegistry, Registration, PROBE_EXTENSIONS};

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::metadata::RawRecord;

/// A decoder for one vendor format family.
pub trait Extractor: Send + Sync {
    /// Unique identity within a registry
    fn name(&self) -> &'static str;

    /// Higher priorities are tried first among extractors claiming an extension
    fn priority(&self) -> i32;

    /// Whether this extractor handles the file.
    ///
    /// When the file does not exist the answer comes from the extension alone;
    /// the registry relies on this to discover which extensions to index.
    fn supports(&self, ctx: &ExtractionContext<'_>) -> Result<bool, ExtractError>;

    /// Decode the file into one record per signal.
    fn decode(&self, ctx: &ExtractionContext<'_>) -> Result<Vec<RawRecord>, ExtractError>;

    /// Decode, degrading any error or panic to a minimal record.
    fn extract(&self, ctx: &ExtractionContext<'_>) -> Extraction {
        match catch_unwind(AssertUnwindSafe(|| self.decode(ctx))) {
            Ok(Ok(records)) if !records.is_empty() => Extraction::Decoded(records),
            Ok(Ok(_)) => Extraction::recovered(ctx, format!("{} produced no records", self.name())),
            Ok(Err(err)) => {
                log::warn!("{} failed on {}: {err}", self.name(), ctx.path().display());
                Extraction::recovered(ctx, format!("{} could not decode file: {err}", self.name()))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log::warn!("{} panicked on {}: {message}", self.name(), ctx.path().display());
                Extraction::recovered(ctx, format!("{} panicked: {message}", self.name()))
            }
        }
    }
}

/// Outcome of [`Extractor::extract`]; always holds at least one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// The decoder succeeded
    Decoded(Vec<RawRecord>),
    /// The decoder failed and the records are the minimal fallback
    Recovered {
        /// Minimal records
        records: Vec<RawRecord>,
        /// What went wrong
        reason: String,
    },
}

impl Extraction {
    fn recovered(ctx: &ExtractionContext<'_>, reason: String) -> Self {
        Extraction::Recovered {
            records: vec![ctx.minimal_record(reason.clone())],
            reason,
        }
    }

    /// Records of either outcome
    pub fn records(&self) -> &[RawRecord] {
        match self {
            Extraction::Decoded(records) | Extraction::Recovered { records, .. } => records,
        }
    }

    /// Take the records
    pub fn into_records(self) -> Vec<RawRecord> {
        match self {
            Extraction::Decoded(records) | Extraction::Recovered { records, .. } => records,
        }
    }

    /// Whether the decoder failed
    pub fn is_recovered(&self) -> bool {
        matches!(self, Extraction::Recovered { .. })
    }

    /// Failure reason, for recovered outcomes
    pub fn reason(&self) -> Option<&str> {
        match self {
            Extraction::Decoded(_) => None,
            Extraction::Recovered { reason, .. } => Some(reason),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
