//! Timestamp localization.
//!
//! Every creation time carries an explicit offset: the instrument's configured
//! offset when known, the host's local offset otherwise.

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};
use std::path::Path;
use std::time::SystemTime;

use super::instrument::Instrument;

/// Attach the instrument (or local) offset to a naive vendor timestamp.
pub fn localize(naive: NaiveDateTime, instrument: Option<&Instrument>) -> Option<DateTime<FixedOffset>> {
    match instrument.and_then(Instrument::utc_offset) {
        Some(offset) => offset.from_local_datetime(&naive).single(),
        None => {
            let local = Local.from_local_datetime(&naive).earliest()?;
            Some(local.with_timezone(local.offset()))
        }
    }
}

/// Convert an absolute instant to the instrument (or local) offset.
pub fn from_utc(instant: DateTime<Utc>, instrument: Option<&Instrument>) -> DateTime<FixedOffset> {
    match instrument.and_then(Instrument::utc_offset) {
        Some(offset) => instant.with_timezone(&offset),
        None => {
            let local = instant.with_timezone(&Local);
            local.with_timezone(local.offset())
        }
    }
}

/// Convert seconds since the Unix epoch; `None` when out of range.
pub fn from_unix_seconds(seconds: i64, instrument: Option<&Instrument>) -> Option<DateTime<FixedOffset>> {
    DateTime::from_timestamp(seconds, 0).map(|utc| from_utc(utc, instrument))
}

/// Convert a filesystem time.
pub fn from_system_time(time: SystemTime, instrument: Option<&Instrument>) -> DateTime<FixedOffset> {
    from_utc(DateTime::<Utc>::from(time), instrument)
}

/// Modification time of `path`.
pub fn modified(path: &Path, instrument: Option<&Instrument>) -> std::io::Result<DateTime<FixedOffset>> {
    let time = std::fs::metadata(path)?.modified()?;
    Ok(from_system_time(time, instrument))
}

/// Current time.
pub fn now(instrument: Option<&Instrument>) -> DateTime<FixedOffset> {
    from_utc(Utc::now(), instrument)
}

/// Parse a naive timestamp against several formats, first match wins.
pub fn parse_naive(text: &str, formats: &[&str]) -> Option<NaiveDateTime> {
    let text = text.trim();
    formats
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}
