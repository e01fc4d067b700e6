use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// An instrument known to the facility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    /// Identity reported as `Instrument ID`
    pub name: String,

    /// Friendly name for display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Directory the instrument writes into, relative to the data root or absolute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filestore_path: Option<PathBuf>,

    /// Fixed UTC offset of the instrument's clock ("+02:00", "-0700", "Z")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl Instrument {
    /// Create an instrument with only a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            filestore_path: None,
            timezone: None,
        }
    }

    /// Builder: set the filestore path
    pub fn with_filestore_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.filestore_path = Some(path.into());
        self
    }

    /// Builder: set the clock offset
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// Parsed clock offset; `None` when unset or unparsable
    pub fn utc_offset(&self) -> Option<FixedOffset> {
        self.timezone.as_deref().and_then(parse_utc_offset)
    }
}

/// Parse a fixed UTC offset: `Z`, `UTC`, `+HH`, `+HHMM` or `+HH:MM`.
pub fn parse_utc_offset(text: &str) -> Option<FixedOffset> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("z") || text.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }
    let text = text
        .strip_prefix("UTC")
        .or_else(|| text.strip_prefix("GMT"))
        .unwrap_or(text);
    let (sign, rest) = match text.as_bytes().first()? {
        b'+' => (1, &text[1..]),
        b'-' => (-1, &text[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        1 | 2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Maps a file path to the instrument that produced it.
pub trait InstrumentLookup: Send + Sync {
    /// Instrument owning `path`, if any
    fn lookup(&self, path: &Path) -> Option<&Instrument>;
}

/// Lookup used when no instrument database is configured; resolves nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInstruments;

impl InstrumentLookup for NoInstruments {
    fn lookup(&self, _path: &Path) -> Option<&Instrument> {
        None
    }
}

/// Instrument table resolved by longest filestore-path prefix.
#[derive(Debug, Clone, Default)]
pub struct InstrumentDb {
    data_root: Option<PathBuf>,
    instruments: Vec<Instrument>,
}

impl InstrumentDb {
    /// Build a database; relative filestore paths are joined onto `data_root`
    pub fn new(data_root: Option<PathBuf>, instruments: Vec<Instrument>) -> Self {
        Self {
            data_root,
            instruments,
        }
    }

    /// All configured instruments
    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    /// Root directory that relative paths are resolved against
    pub fn data_root(&self) -> Option<&Path> {
        self.data_root.as_deref()
    }

    fn resolved_root(&self, instrument: &Instrument) -> Option<PathBuf> {
        let path = instrument.filestore_path.as_ref()?;
        match &self.data_root {
            Some(root) if path.is_relative() => Some(root.join(path)),
            _ => Some(path.clone()),
        }
    }
}

impl InstrumentLookup for InstrumentDb {
    fn lookup(&self, path: &Path) -> Option<&Instrument> {
        self.instruments
            .iter()
            .filter_map(|inst| {
                let root = self.resolved_root(inst)?;
                path.starts_with(&root)
                    .then(|| (root.components().count(), inst))
            })
            .max_by_key(|(depth, _)| *depth)
            .map(|(_, inst)| inst)
    }
}
