//! # nexuslims-extract - Metadata extraction for microscopy instrument files
//!
//! `nexuslims_extract` turns files written by electron and ion microscopes into
//! normalized, unit-aware metadata records.
//!
//! ## Key Features
//!
//! - **Never fails on input**: every file yields at least one record. Corrupt
//!   or unrecognized files produce a `Data Type = "Unknown"` record with a
//!   warning explaining what went wrong.
//!
//! - **Priority + content sniffing**: several vendors write `.tif`; the
//!   registry tries the most specific decoder first and falls through to a
//!   generic fallback.
//!
//! - **Multi-signal containers**: DigitalMicrograph files holding several
//!   signals produce one record per signal.
//!
//! - **Unit-aware**: values carry explicit [`units::Quantity`] units and are
//!   normalized to the schema's preferred display units.
//!
//! - **Lossless**: fields outside the canonical schema are kept under
//!   `extensions`, including the complete vendor metadata tree.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nexuslims_extract::prelude::*;
//!
//! let config = ExtractConfig::from_env();
//! let instruments = config.instrument_db();
//! let outcome = extract_file("/data/Titan/2024/scan.dm3", &instruments);
//!
//! for record in outcome.records() {
//!     let canonical = CanonicalMetadata::from_raw(record)?;
//!     println!("{}", canonical.to_json_pretty()?);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Supported Formats
//!
//! | Vendor | Extensions | Decoder |
//! |--------|------------|---------|
//! | Gatan DigitalMicrograph | `.dm3`, `.dm4` | [`decoders::Dm3Decoder`] |
//! | FEI/Thermo TIA | `.ser` + `.emi` | [`decoders::SerEmiDecoder`] |
//! | FEI/Thermo Quanta, Helios | `.tif` | [`decoders::QuantaTiffDecoder`] |
//! | Tescan | `.tif` (+ `.hdr`) | [`decoders::TescanTiffDecoder`] |
//! | Zeiss Orion, Fibics | `.tif` | [`decoders::OrionFibicsTiffDecoder`] |
//! | EMSA/MAS spectra | `.msa`, `.txt` | [`decoders::MsaDecoder`] |
//! | anything else | * | [`decoders::BasicFallbackDecoder`] |
//!
//! ## Architecture
//!
//! - [`extractors`]: extractor contract, selection registry, outcome type
//! - [`decoders`]: one decoder per format family
//! - [`formats`]: low-level container readers (TIFF, DM, TIA, INI, XML)
//! - [`fields`]: declarative vendor-field mapping tables
//! - [`metadata`]: raw records, instruments, timestamps
//! - [`schema`]: canonical schema, field classification, routing
//! - [`units`]: quantities and the closed unit conversion table
//! - [`glossary`]: EM Glossary terms
//! - [`config`]: TOML + environment configuration

// Documentation lints - enforce complete documentation for publication
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod decoders;
pub mod extractors;
pub mod fields;
pub mod formats;
pub mod glossary;
pub mod metadata;
pub mod schema;
pub mod units;

use std::path::PathBuf;

use extractors::{global_registry, Extraction, ExtractionContext};
use metadata::InstrumentLookup;

/// Extract a file with the process-wide registry.
///
/// The instrument is resolved through `instruments`; pass
/// [`metadata::NoInstruments`] when no database is available.
///
/// The global registry takes the `.emi` data root from
/// `NX_INSTRUMENT_DATA_PATH` only. When the root is set in a TOML file, build
/// a registry with [`config::ExtractConfig::registry`] and call
/// [`extractors::ExtractorRegistry::extract`] on it instead.
pub fn extract_file(path: impl Into<PathBuf>, instruments: &dyn InstrumentLookup) -> Extraction {
    let ctx = ExtractionContext::resolve(path, instruments);
    global_registry().extract(&ctx)
}

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::{ConfigError, ExtractConfig};
    pub use crate::extract_file;
    pub use crate::extractors::{
        global_registry, ExtractError, Extraction, ExtractionContext, Extractor, ExtractorRegistry,
    };
    pub use crate::metadata::{
        Instrument, InstrumentDb, InstrumentLookup, MetaValue, MetadataMap, NoInstruments, RawRecord,
    };
    pub use crate::schema::{classify_field, CanonicalMetadata, DatasetType, SchemaError};
    pub use crate::units::{Quantity, Unit};
}
