//! TOML configuration.
//!
//! ```toml
//! # nexuslims.toml
//! instrument_data_path = "/mnt/nexuslims/instrument_data"
//!
//! [[instruments]]
//! name = "FEI-Quanta200-ESEM"
//! filestore_path = "Quanta"
//! timezone = "-05:00"
//!
//! [[instruments]]
//! name = "FEI-Titan-STEM"
//! display_name = "Titan STEM"
//! filestore_path = "Titan_STEM"
//! ```
//!
//! `NX_INSTRUMENT_DATA_PATH` overrides `instrument_data_path`.

use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::decoders::SerEmiDecoder;
use crate::extractors::{ExtractorRegistry, RegistryError};
use crate::metadata::{Instrument, InstrumentDb};

/// Environment variable naming the instrument data root
pub const DATA_PATH_ENV: &str = "NX_INSTRUMENT_DATA_PATH";

/// Errors loading a configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The TOML is malformed or has unknown keys
    #[error("failed to parse TOML configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// An instrument timezone is not a fixed UTC offset
    #[error("instrument {instrument}: invalid timezone {timezone:?} (expected e.g. \"-05:00\" or \"Z\")")]
    InvalidTimezone {
        /// Instrument name
        instrument: String,
        /// Offending value
        timezone: String,
    },

    /// Two instruments share a name
    #[error("instrument {0} is defined more than once")]
    DuplicateInstrument(String),
}

/// Root configuration structure for nexuslims.toml files.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractConfig {
    /// Root that instrument filestore paths and `.emi` companions are relative to.
    #[serde(default)]
    pub instrument_data_path: Option<PathBuf>,

    /// Known instruments.
    #[serde(default)]
    pub instruments: Vec<Instrument>,
}

impl ExtractConfig {
    /// Load configuration from a TOML file, then apply the environment.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_str(&content)?.with_env())
    }

    /// Parse and validate configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: ExtractConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration from the environment alone.
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Apply `NX_INSTRUMENT_DATA_PATH` when it is set and non-empty.
    pub fn with_env(mut self) -> Self {
        if let Some(root) = std::env::var_os(DATA_PATH_ENV).filter(|v| !v.is_empty()) {
            self.instrument_data_path = Some(PathBuf::from(root));
        }
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for instrument in &self.instruments {
            if !seen.insert(instrument.name.as_str()) {
                return Err(ConfigError::DuplicateInstrument(instrument.name.clone()));
            }
            if let Some(tz) = &instrument.timezone {
                if instrument.utc_offset().is_none() {
                    return Err(ConfigError::InvalidTimezone {
                        instrument: instrument.name.clone(),
                        timezone: tz.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Instrument database for path lookups.
    pub fn instrument_db(&self) -> InstrumentDb {
        InstrumentDb::new(self.instrument_data_path.clone(), self.instruments.clone())
    }

    /// Built-in registry with the TIA decoder bound to `instrument_data_path`.
    ///
    /// The global registry only sees `NX_INSTRUMENT_DATA_PATH`; use this when
    /// the data root comes from a TOML file.
    pub fn registry(&self) -> Result<ExtractorRegistry, RegistryError> {
        let mut registry = ExtractorRegistry::with_builtin();
        registry.register_decoder(SerEmiDecoder::new(self.instrument_data_path.clone()))?;
        Ok(registry)
    }
}
