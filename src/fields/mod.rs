//! # Field Descriptors
//!
//! Each decoder declares a `static` table of [`FieldDescriptor`]s mapping one
//! vendor key to one output key. [`apply_descriptors`] walks the table, asks the
//! decoder for the raw text of each vendor key, converts it and places the result
//! in a [`RawRecord`].
//!
//! ## Conversion rules
//!
//! - [`Conversion::Scale`]: parse a number, multiply by the factor, tag with the
//!   descriptor unit (if any).
//! - [`Conversion::StripUnits`]: drop a leading `=` and any trailing unit token,
//!   no scaling (Fibics writes `"=500.0 V"`).
//! - [`Conversion::Text`]: keep the trimmed text as-is.
//!
//! A value that fails numeric conversion is kept as text under the vendor
//! `source_key`, never under the output key, so routing can tell the two apart.

use crate::metadata::{MetaValue, RawRecord};
use crate::units::{split_number, Quantity, Unit};

/// How the raw vendor text becomes a value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Conversion {
    /// Numeric value multiplied by the factor
    Scale(f64),
    /// Numeric value with surrounding `=` and unit text discarded
    StripUnits,
    /// Keep the text
    Text,
}

/// Declarative mapping of one vendor key to one output key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldDescriptor {
    /// Vendor grouping (INI section, XML parent path); empty for flat formats
    pub section: &'static str,
    /// Vendor key inside the section
    pub source_key: &'static str,
    /// Output path; more than one element places the value in nested maps
    pub output: &'static [&'static str],
    /// Conversion mode
    pub conversion: Conversion,
    /// Unit of the converted magnitude
    pub unit: Option<Unit>,
    /// Omit the output when the converted value is exactly zero
    pub suppress_zero: bool,
    /// Append the output name to the record's warnings when set
    pub flagged: bool,
}

impl FieldDescriptor {
    /// Numeric field scaled by `factor` and tagged with `unit`
    pub const fn scaled(
        section: &'static str,
        source_key: &'static str,
        output: &'static [&'static str],
        factor: f64,
        unit: Unit,
    ) -> Self {
        Self {
            section,
            source_key,
            output,
            conversion: Conversion::Scale(factor),
            unit: Some(unit),
            suppress_zero: false,
            flagged: false,
        }
    }

    /// Dimensionless numeric field
    pub const fn number(section: &'static str, source_key: &'static str, output: &'static [&'static str]) -> Self {
        Self {
            section,
            source_key,
            output,
            conversion: Conversion::Scale(1.0),
            unit: None,
            suppress_zero: false,
            flagged: false,
        }
    }

    /// Text field
    pub const fn text(section: &'static str, source_key: &'static str, output: &'static [&'static str]) -> Self {
        Self {
            section,
            source_key,
            output,
            conversion: Conversion::Text,
            unit: None,
            suppress_zero: false,
            flagged: false,
        }
    }

    /// Numeric field written with an inline unit, tagged with `unit`
    pub const fn strip_units(
        section: &'static str,
        source_key: &'static str,
        output: &'static [&'static str],
        unit: Unit,
    ) -> Self {
        Self {
            section,
            source_key,
            output,
            conversion: Conversion::StripUnits,
            unit: Some(unit),
            suppress_zero: false,
            flagged: false,
        }
    }

    /// Builder: skip zero values
    pub const fn nonzero(mut self) -> Self {
        self.suppress_zero = true;
        self
    }

    /// Builder: flag the field in the record warnings
    pub const fn flagged(mut self) -> Self {
        self.flagged = true;
        self
    }

    /// Dotted output path, used for provenance and warnings
    pub fn output_key(&self) -> String {
        self.output.join(".")
    }

    /// Dotted vendor path (`section.key`, or `key` for flat formats)
    pub fn source_path(&self) -> String {
        if self.section.is_empty() {
            self.source_key.to_string()
        } else {
            format!("{}.{}", self.section, self.source_key)
        }
    }

    /// Convert raw vendor text.
    ///
    /// `Ok(None)` means the value is intentionally omitted (empty or a
    /// suppressed zero).
    pub fn convert(&self, raw: &str) -> Result<Option<MetaValue>, crate::units::UnitError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let magnitude = match self.conversion {
            Conversion::Text => return Ok(Some(MetaValue::Text(raw.to_string()))),
            Conversion::StripUnits => split_number(raw)?.0,
            Conversion::Scale(factor) => {
                let (value, rest) = split_number(raw)?;
                if !rest.trim().is_empty() {
                    return Err(crate::units::UnitError::NotNumeric(raw.to_string()));
                }
                if factor == 1.0 && self.unit.is_none() {
                    if let Ok(int) = raw.parse::<i64>() {
                        return Ok((!(self.suppress_zero && int == 0)).then_some(MetaValue::Int(int)));
                    }
                }
                value * factor
            }
        };
        if self.suppress_zero && magnitude == 0.0 {
            return Ok(None);
        }
        Ok(Some(match self.unit {
            Some(unit) => MetaValue::Quantity(Quantity::new(magnitude, unit)),
            None => MetaValue::Float(magnitude),
        }))
    }

    /// Convert `raw` and place it in `record`; returns whether anything was written.
    pub fn apply(&self, raw: &str, record: &mut RawRecord) -> bool {
        match self.convert(raw) {
            Ok(Some(value)) => {
                record.set_path(self.output, value);
                record.record_source(self.output_key(), self.source_path());
                if self.flagged {
                    record.warn(self.output_key());
                }
                true
            }
            Ok(None) => false,
            Err(err) => {
                log::debug!(
                    "keeping {} as text under vendor key: {err}",
                    self.source_path()
                );
                record.set(self.source_key, raw.trim());
                true
            }
        }
    }
}

/// Apply every descriptor in `table`; `lookup` yields the raw text for one descriptor.
///
/// Returns the number of descriptors that produced output.
pub fn apply_descriptors<F>(table: &[FieldDescriptor], mut lookup: F, record: &mut RawRecord) -> usize
where
    F: FnMut(&FieldDescriptor) -> Option<String>,
{
    let mut written = 0;
    for descriptor in table {
        if let Some(raw) = lookup(descriptor) {
            if descriptor.apply(&raw, record) {
                written += 1;
            }
        }
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DatasetType;
    use chrono::{FixedOffset, TimeZone};

    fn record() -> RawRecord {
        let time = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .unwrap();
        RawRecord::new(DatasetType::Image, "SEM_Imaging", time)
    }

    #[test]
    fn test_scaled_field() {
        let desc = FieldDescriptor::scaled("Beam", "HV", &["acceleration_voltage"], 1e-3, Unit::Kilovolt);
        let mut rec = record();
        assert!(desc.apply("30000", &mut rec));
        let q = rec.get("acceleration_voltage").and_then(MetaValue::as_quantity).unwrap();
        assert!((q.magnitude() - 30.0).abs() < 1e-12);
        assert_eq!(q.unit(), Unit::Kilovolt);
        assert_eq!(rec.source_of("acceleration_voltage"), Some("Beam.HV"));
    }

    #[test]
    fn test_strip_units() {
        let desc = FieldDescriptor::strip_units("DetectorInfo", "Collector Voltage", &["Collector Voltage"], Unit::Volt);
        let value = desc.convert("=500.0 V").unwrap().unwrap();
        assert_eq!(value, MetaValue::Quantity(Quantity::new(500.0, Unit::Volt)));
    }

    #[test]
    fn test_non_numeric_kept_under_vendor_key() {
        let desc = FieldDescriptor::scaled("Beam", "HV", &["acceleration_voltage"], 1e-3, Unit::Kilovolt);
        let mut rec = record();
        assert!(desc.apply("n/a", &mut rec));
        assert!(rec.get("acceleration_voltage").is_none());
        assert_eq!(rec.get("HV"), Some(&MetaValue::from("n/a")));
    }

    #[test]
    fn test_suppress_zero_and_empty() {
        let desc = FieldDescriptor::scaled("Stage", "T", &["stage_position", "tilt_alpha"], 1.0, Unit::Degree).nonzero();
        let mut rec = record();
        assert!(!desc.apply("0", &mut rec));
        assert!(!desc.apply("   ", &mut rec));
        assert!(rec.fields.is_empty());
        assert!(desc.apply("5", &mut rec));
        assert!(rec.get_path(&["stage_position", "tilt_alpha"]).is_some());
    }

    #[test]
    fn test_number_keeps_integers() {
        let desc = FieldDescriptor::number("Image", "Integrate", &["Frames Integrated"]);
        assert_eq!(desc.convert("16").unwrap(), Some(MetaValue::Int(16)));
        assert_eq!(desc.convert("1.5").unwrap(), Some(MetaValue::Float(1.5)));
    }

    #[test]
    fn test_flagged_field_adds_warning() {
        let desc = FieldDescriptor::text("User", "User", &["Operator"]).flagged();
        let mut rec = record();
        desc.apply("alice", &mut rec);
        assert_eq!(rec.warnings, vec!["Operator".to_string()]);
    }

    #[test]
    fn test_apply_descriptors_counts_outputs() {
        static TABLE: &[FieldDescriptor] = &[
            FieldDescriptor::text("", "A", &["a"]),
            FieldDescriptor::number("", "B", &["b"]),
            FieldDescriptor::number("", "C", &["c"]),
        ];
        let mut rec = record();
        let written = apply_descriptors(
            TABLE,
            |d| match d.source_key {
                "A" => Some("x".into()),
                "B" => Some("2".into()),
                _ => None,
            },
            &mut rec,
        );
        assert_eq!(written, 2);
    }
}
