//! # Physical quantities and unit conversion
//!
//! Vendor files express the same physical parameter in wildly different units:
//! Tescan writes raw SI base units (volts, meters, amperes), FEI writes SI base
//! units with radians for angles, Zeiss writes millivolt-equivalents, and
//! DigitalMicrograph bakes the unit into the tag label (`"Voltage"` in volts,
//! `"Exposure (s)"` in seconds). This module provides a small, closed unit
//! vocabulary so that every decoder can tag a magnitude with its source unit and
//! the schema layer can convert it to the preferred display unit.
//!
//! ## Design
//!
//! - [`Unit`] is a closed enum; each unit belongs to exactly one [`Dimension`].
//! - Conversion multiplies into the dimension's base unit and back out again,
//!   so any two units of the same dimension are convertible.
//! - [`Quantity`] is immutable once constructed.
//!
//! There is no global unit registry; everything is plain values.

use serde::{Serialize, Serializer};
use std::f64::consts::PI;
use std::fmt;

/// Physical dimension a [`Unit`] measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    /// Electric potential (base: volt)
    Voltage,
    /// Length (base: meter)
    Length,
    /// Electric current (base: ampere)
    Current,
    /// Time (base: second)
    Time,
    /// Plane angle (base: radian)
    Angle,
    /// Energy (base: electron volt)
    Energy,
    /// Pressure (base: pascal)
    Pressure,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dimension::Voltage => "voltage",
            Dimension::Length => "length",
            Dimension::Current => "current",
            Dimension::Time => "time",
            Dimension::Angle => "angle",
            Dimension::Energy => "energy",
            Dimension::Pressure => "pressure",
        };
        f.write_str(name)
    }
}

/// A unit from the closed conversion table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    /// V
    Volt,
    /// kV
    Kilovolt,
    /// mV
    Millivolt,
    /// m
    Meter,
    /// mm
    Millimeter,
    /// µm
    Micrometer,
    /// nm
    Nanometer,
    /// pm
    Picometer,
    /// A
    Ampere,
    /// mA
    Milliampere,
    /// µA
    Microampere,
    /// nA
    Nanoampere,
    /// pA
    Picoampere,
    /// s
    Second,
    /// ms
    Millisecond,
    /// µs
    Microsecond,
    /// ns
    Nanosecond,
    /// rad
    Radian,
    /// mrad
    Milliradian,
    /// µrad
    Microradian,
    /// °
    Degree,
    /// eV
    ElectronVolt,
    /// keV
    KiloelectronVolt,
    /// Pa
    Pascal,
    /// mbar
    Millibar,
    /// Torr
    Torr,
}

/// Every unit, in declaration order.
pub const ALL_UNITS: [Unit; 26] = [
    Unit::Volt,
    Unit::Kilovolt,
    Unit::Millivolt,
    Unit::Meter,
    Unit::Millimeter,
    Unit::Micrometer,
    Unit::Nanometer,
    Unit::Picometer,
    Unit::Ampere,
    Unit::Milliampere,
    Unit::Microampere,
    Unit::Nanoampere,
    Unit::Picoampere,
    Unit::Second,
    Unit::Millisecond,
    Unit::Microsecond,
    Unit::Nanosecond,
    Unit::Radian,
    Unit::Milliradian,
    Unit::Microradian,
    Unit::Degree,
    Unit::ElectronVolt,
    Unit::KiloelectronVolt,
    Unit::Pascal,
    Unit::Millibar,
    Unit::Torr,
];

impl Unit {
    /// The dimension this unit measures.
    pub const fn dimension(self) -> Dimension {
        match self {
            Unit::Volt | Unit::Kilovolt | Unit::Millivolt => Dimension::Voltage,
            Unit::Meter
            | Unit::Millimeter
            | Unit::Micrometer
            | Unit::Nanometer
            | Unit::Picometer => Dimension::Length,
            Unit::Ampere
            | Unit::Milliampere
            | Unit::Microampere
            | Unit::Nanoampere
            | Unit::Picoampere => Dimension::Current,
            Unit::Second | Unit::Millisecond | Unit::Microsecond | Unit::Nanosecond => {
                Dimension::Time
            }
            Unit::Radian | Unit::Milliradian | Unit::Microradian | Unit::Degree => {
                Dimension::Angle
            }
            Unit::ElectronVolt | Unit::KiloelectronVolt => Dimension::Energy,
            Unit::Pascal | Unit::Millibar | Unit::Torr => Dimension::Pressure,
        }
    }

    /// Multiplier taking a magnitude in this unit to the dimension's base unit.
    pub fn to_base(self) -> f64 {
        match self {
            Unit::Volt => 1.0,
            Unit::Kilovolt => 1e3,
            Unit::Millivolt => 1e-3,
            Unit::Meter => 1.0,
            Unit::Millimeter => 1e-3,
            Unit::Micrometer => 1e-6,
            Unit::Nanometer => 1e-9,
            Unit::Picometer => 1e-12,
            Unit::Ampere => 1.0,
            Unit::Milliampere => 1e-3,
            Unit::Microampere => 1e-6,
            Unit::Nanoampere => 1e-9,
            Unit::Picoampere => 1e-12,
            Unit::Second => 1.0,
            Unit::Millisecond => 1e-3,
            Unit::Microsecond => 1e-6,
            Unit::Nanosecond => 1e-9,
            Unit::Radian => 1.0,
            Unit::Milliradian => 1e-3,
            Unit::Microradian => 1e-6,
            Unit::Degree => PI / 180.0,
            Unit::ElectronVolt => 1.0,
            Unit::KiloelectronVolt => 1e3,
            Unit::Pascal => 1.0,
            Unit::Millibar => 100.0,
            Unit::Torr => 101_325.0 / 760.0,
        }
    }

    /// Long name, used when serializing quantities (e.g. `"kilovolt"`).
    pub const fn name(self) -> &'static str {
        match self {
            Unit::Volt => "volt",
            Unit::Kilovolt => "kilovolt",
            Unit::Millivolt => "millivolt",
            Unit::Meter => "meter",
            Unit::Millimeter => "millimeter",
            Unit::Micrometer => "micrometer",
            Unit::Nanometer => "nanometer",
            Unit::Picometer => "picometer",
            Unit::Ampere => "ampere",
            Unit::Milliampere => "milliampere",
            Unit::Microampere => "microampere",
            Unit::Nanoampere => "nanoampere",
            Unit::Picoampere => "picoampere",
            Unit::Second => "second",
            Unit::Millisecond => "millisecond",
            Unit::Microsecond => "microsecond",
            Unit::Nanosecond => "nanosecond",
            Unit::Radian => "radian",
            Unit::Milliradian => "milliradian",
            Unit::Microradian => "microradian",
            Unit::Degree => "degree",
            Unit::ElectronVolt => "electron_volt",
            Unit::KiloelectronVolt => "kiloelectron_volt",
            Unit::Pascal => "pascal",
            Unit::Millibar => "millibar",
            Unit::Torr => "torr",
        }
    }

    /// Conventional symbol (e.g. `"kV"`).
    pub const fn symbol(self) -> &'static str {
        match self {
            Unit::Volt => "V",
            Unit::Kilovolt => "kV",
            Unit::Millivolt => "mV",
            Unit::Meter => "m",
            Unit::Millimeter => "mm",
            Unit::Micrometer => "µm",
            Unit::Nanometer => "nm",
            Unit::Picometer => "pm",
            Unit::Ampere => "A",
            Unit::Milliampere => "mA",
            Unit::Microampere => "µA",
            Unit::Nanoampere => "nA",
            Unit::Picoampere => "pA",
            Unit::Second => "s",
            Unit::Millisecond => "ms",
            Unit::Microsecond => "µs",
            Unit::Nanosecond => "ns",
            Unit::Radian => "rad",
            Unit::Milliradian => "mrad",
            Unit::Microradian => "µrad",
            Unit::Degree => "°",
            Unit::ElectronVolt => "eV",
            Unit::KiloelectronVolt => "keV",
            Unit::Pascal => "Pa",
            Unit::Millibar => "mbar",
            Unit::Torr => "Torr",
        }
    }

    /// Parse a unit from its name, symbol, or one of the spellings vendors use.
    ///
    /// Micro prefixes are accepted as `µ` (U+00B5), `μ` (U+03BC) or `u`.
    pub fn parse(text: &str) -> Option<Unit> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }

        // Symbols are case-sensitive (mV vs MV); try them before folding case.
        let normalized: String = trimmed
            .chars()
            .map(|c| if c == '\u{3bc}' || c == '\u{b5}' { 'u' } else { c })
            .collect();
        let by_symbol = match normalized.as_str() {
            "V" => Some(Unit::Volt),
            "kV" | "KV" => Some(Unit::Kilovolt),
            "mV" => Some(Unit::Millivolt),
            "m" => Some(Unit::Meter),
            "mm" => Some(Unit::Millimeter),
            "um" => Some(Unit::Micrometer),
            "nm" => Some(Unit::Nanometer),
            "pm" => Some(Unit::Picometer),
            "A" => Some(Unit::Ampere),
            "mA" => Some(Unit::Milliampere),
            "uA" => Some(Unit::Microampere),
            "nA" => Some(Unit::Nanoampere),
            "pA" => Some(Unit::Picoampere),
            "s" => Some(Unit::Second),
            "ms" => Some(Unit::Millisecond),
            "us" => Some(Unit::Microsecond),
            "ns" => Some(Unit::Nanosecond),
            "rad" => Some(Unit::Radian),
            "mrad" => Some(Unit::Milliradian),
            "urad" => Some(Unit::Microradian),
            "°" | "deg" | "dg" => Some(Unit::Degree),
            "eV" => Some(Unit::ElectronVolt),
            "keV" => Some(Unit::KiloelectronVolt),
            "Pa" => Some(Unit::Pascal),
            "mbar" => Some(Unit::Millibar),
            "Torr" | "torr" => Some(Unit::Torr),
            _ => None,
        };
        if by_symbol.is_some() {
            return by_symbol;
        }

        let lowered = normalized.to_ascii_lowercase().replace([' ', '-'], "_");
        match lowered.as_str() {
            "volt" | "volts" => Some(Unit::Volt),
            "kilovolt" | "kilovolts" => Some(Unit::Kilovolt),
            "millivolt" | "millivolts" => Some(Unit::Millivolt),
            "meter" | "meters" | "metre" | "metres" => Some(Unit::Meter),
            "millimeter" | "millimeters" | "millimetre" => Some(Unit::Millimeter),
            "micrometer" | "micrometers" | "micrometre" | "micron" | "microns" => {
                Some(Unit::Micrometer)
            }
            "nanometer" | "nanometers" | "nanometre" => Some(Unit::Nanometer),
            "picometer" | "picometers" | "picometre" => Some(Unit::Picometer),
            "ampere" | "amperes" | "amp" | "amps" => Some(Unit::Ampere),
            "milliampere" | "milliamperes" => Some(Unit::Milliampere),
            "microampere" | "microamperes" => Some(Unit::Microampere),
            "nanoampere" | "nanoamperes" => Some(Unit::Nanoampere),
            "picoampere" | "picoamperes" => Some(Unit::Picoampere),
            "second" | "seconds" | "sec" => Some(Unit::Second),
            "millisecond" | "milliseconds" => Some(Unit::Millisecond),
            "microsecond" | "microseconds" => Some(Unit::Microsecond),
            "nanosecond" | "nanoseconds" => Some(Unit::Nanosecond),
            "radian" | "radians" => Some(Unit::Radian),
            "milliradian" | "milliradians" => Some(Unit::Milliradian),
            "microradian" | "microradians" => Some(Unit::Microradian),
            "degree" | "degrees" => Some(Unit::Degree),
            "electron_volt" | "electronvolt" | "electron_volts" | "ev" => {
                Some(Unit::ElectronVolt)
            }
            "kiloelectron_volt" | "kiloelectronvolt" | "kev" => Some(Unit::KiloelectronVolt),
            "pascal" | "pascals" | "pa" => Some(Unit::Pascal),
            "millibar" => Some(Unit::Millibar),
            _ => None,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl Serialize for Unit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Errors raised while building or converting quantities
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UnitError {
    /// The two units measure different dimensions
    #[error("cannot convert {from} ({from_dimension}) to {to} ({to_dimension})")]
    IncompatibleUnits {
        /// Source unit
        from: Unit,
        /// Source dimension
        from_dimension: Dimension,
        /// Requested unit
        to: Unit,
        /// Requested dimension
        to_dimension: Dimension,
    },

    /// A unit string did not match the conversion table
    #[error("unknown unit: {0:?}")]
    UnknownUnit(String),

    /// The magnitude could not be parsed as a number
    #[error("not a numeric value: {0:?}")]
    NotNumeric(String),
}

/// A magnitude tagged with its unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quantity {
    #[serde(rename = "value")]
    magnitude: f64,
    #[serde(rename = "units")]
    unit: Unit,
}

impl Quantity {
    /// Create a new quantity
    pub const fn new(magnitude: f64, unit: Unit) -> Self {
        Self { magnitude, unit }
    }

    /// Numeric magnitude in [`Quantity::unit`]
    pub const fn magnitude(&self) -> f64 {
        self.magnitude
    }

    /// Unit of the magnitude
    pub const fn unit(&self) -> Unit {
        self.unit
    }

    /// Convert to another unit of the same dimension.
    pub fn convert_to(&self, target: Unit) -> Result<Quantity, UnitError> {
        if self.unit == target {
            return Ok(*self);
        }
        if self.unit.dimension() != target.dimension() {
            return Err(UnitError::IncompatibleUnits {
                from: self.unit,
                from_dimension: self.unit.dimension(),
                to: target,
                to_dimension: target.dimension(),
            });
        }
        let base = self.magnitude * self.unit.to_base();
        Ok(Quantity::new(base / target.to_base(), target))
    }

    /// Parse text such as `"30 kV"`, `"=500.0 V"` or `"12.5µm"`.
    ///
    /// A leading `=` (Fibics writes values this way) is discarded.
    pub fn parse(text: &str) -> Result<Quantity, UnitError> {
        let (magnitude, rest) = split_number(text)?;
        let unit_text = rest.trim();
        if unit_text.is_empty() {
            return Err(UnitError::UnknownUnit(String::new()));
        }
        let unit = Unit::parse(unit_text).ok_or_else(|| UnitError::UnknownUnit(unit_text.into()))?;
        Ok(Quantity::new(magnitude, unit))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.magnitude, self.unit.symbol())
    }
}

/// Split a leading floating-point number from trailing text.
///
/// Returns the parsed number and whatever follows it.
pub fn split_number(text: &str) -> Result<(f64, &str), UnitError> {
    let trimmed = text.trim().trim_start_matches('=').trim_start();
    let end = numeric_prefix_len(trimmed);
    if end == 0 {
        return Err(UnitError::NotNumeric(text.to_string()));
    }
    let (number, rest) = trimmed.split_at(end);
    let magnitude: f64 = number
        .parse()
        .map_err(|_| UnitError::NotNumeric(text.to_string()))?;
    if !magnitude.is_finite() {
        return Err(UnitError::NotNumeric(text.to_string()));
    }
    Ok((magnitude, rest))
}

/// Length in bytes of the longest prefix that looks like a float literal.
fn numeric_prefix_len(text: &str) -> usize {
    let bytes = text.as_bytes();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let mut digits = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
        digits += 1;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
            digits += 1;
        }
    }
    if digits == 0 {
        return 0;
    }
    // Exponent only counts when followed by at least one digit.
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exponent_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exponent_start {
            i = j;
        }
    }
    i
}
