use chrono::{DateTime, FixedOffset};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::metadata::{keys, time, Instrument, InstrumentLookup, RawRecord};
use crate::schema::DatasetType;

/// Immutable input of one extraction: the file and its instrument.
#[derive(Debug, Clone)]
pub struct ExtractionContext<'a> {
    /// File to decode
    pub file_path: PathBuf,
    /// Instrument that produced the file, owned by the caller
    pub instrument: Option<&'a Instrument>,
}

impl<'a> ExtractionContext<'a> {
    /// Context with an explicit instrument
    pub fn new(file_path: impl Into<PathBuf>, instrument: Option<&'a Instrument>) -> Self {
        Self {
            file_path: file_path.into(),
            instrument,
        }
    }

    /// Context whose instrument is resolved through `lookup`
    pub fn resolve(file_path: impl Into<PathBuf>, lookup: &'a dyn InstrumentLookup) -> Self {
        let file_path = file_path.into();
        let instrument = lookup.lookup(&file_path);
        Self {
            file_path,
            instrument,
        }
    }

    /// Path being decoded
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Lower-cased extension, if any
    pub fn extension(&self) -> Option<String> {
        self.file_path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
    }

    /// Whether the file exists; probes use contexts that do not
    pub fn exists(&self) -> bool {
        self.file_path.is_file()
    }

    /// Identity of the resolved instrument
    pub fn instrument_id(&self) -> Option<String> {
        self.instrument.map(|i| i.name.clone())
    }

    /// File modification time in the instrument's offset
    pub fn modified_time(&self) -> Option<DateTime<FixedOffset>> {
        time::modified(&self.file_path, self.instrument).ok()
    }

    /// Up to `limit` leading bytes of the file
    pub fn read_head(&self, limit: usize) -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(limit.min(64 * 1024));
        File::open(&self.file_path)?
            .take(limit as u64)
            .read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Start a record stamped with the file mtime and instrument.
    ///
    /// Without a readable mtime the current time is used and `Creation Time`
    /// is flagged.
    pub fn new_record(&self, dataset_type: DatasetType, data_type: impl Into<String>) -> RawRecord {
        let (creation_time, flagged) = match self.modified_time() {
            Some(t) => (t, false),
            None => (time::now(self.instrument), true),
        };
        let mut record =
            RawRecord::new(dataset_type, data_type, creation_time).with_instrument_id(self.instrument_id());
        if flagged {
            record.warn(keys::CREATION_TIME);
        }
        record
    }

    /// The record every failed extraction degrades to
    pub fn minimal_record(&self, reason: impl Into<String>) -> RawRecord {
        let mut record = self.new_record(DatasetType::Unknown, "Unknown");
        record.warn(reason);
        record
    }
}
