//! Quantities in canonical units and the human-readable quantity parser.
//!
//! Sizes use binary multiples (`1KB = 1024`). Suffixes are matched
//! longest-first so `4GB` never falls through to the bare `B` unit. A string
//! without a suffix is taken as already canonical.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

const SIZE_UNITS: [(&str, u64); 5] = [
    ("TB", 1 << 40),
    ("GB", 1 << 30),
    ("MB", 1 << 20),
    ("KB", 1 << 10),
    ("B", 1),
];

// `ms` must be tried before `s` and `m`.
const DURATION_UNITS: [(&str, f64); 5] = [
    ("ms", 0.001),
    ("s", 1.0),
    ("m", 60.0),
    ("h", 3600.0),
    ("d", 86400.0),
];

/// A non-negative amount of some resource in canonical units.
///
/// Serializes as a bare number and deserializes from either a number or a
/// quantity string such as `"256GB"`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "QuantitySpec", into = "u64")]
pub struct Quantity(u64);

impl Quantity {
    pub const ZERO: Quantity = Quantity(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Quantity) -> Option<Quantity> {
        self.0.checked_add(other.0).map(Quantity)
    }

    pub fn checked_sub(self, other: Quantity) -> Option<Quantity> {
        self.0.checked_sub(other.0).map(Quantity)
    }

    pub fn saturating_sub(self, other: Quantity) -> Quantity {
        Quantity(self.0.saturating_sub(other.0))
    }

    /// Parse a size string such as `"4GB"` or `"500"`.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        parse_size(input)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Quantity {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Quantity> for u64 {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

impl FromStr for Quantity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_size(s)
    }
}

impl TryFrom<QuantitySpec> for Quantity {
    type Error = ParseError;

    fn try_from(spec: QuantitySpec) -> Result<Self, Self::Error> {
        spec.resolve()
    }
}

/// A quantity as a caller supplies it: a bare number in canonical units or a
/// string with a unit suffix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuantitySpec {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Text(String),
}

impl QuantitySpec {
    pub fn resolve(&self) -> Result<Quantity, ParseError> {
        match self {
            Self::Unsigned(value) => Ok(Quantity(*value)),
            Self::Signed(value) => u64::try_from(*value)
                .map(Quantity)
                .map_err(|_| ParseError::Negative(value.to_string())),
            Self::Float(value) => float_to_quantity(*value, &value.to_string()),
            Self::Text(text) => parse_size(text),
        }
    }
}

impl From<u64> for QuantitySpec {
    fn from(value: u64) -> Self {
        Self::Unsigned(value)
    }
}

impl From<u32> for QuantitySpec {
    fn from(value: u32) -> Self {
        Self::Unsigned(u64::from(value))
    }
}

impl From<i64> for QuantitySpec {
    fn from(value: i64) -> Self {
        Self::Signed(value)
    }
}

impl From<i32> for QuantitySpec {
    fn from(value: i32) -> Self {
        Self::Signed(i64::from(value))
    }
}

impl From<f64> for QuantitySpec {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for QuantitySpec {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for QuantitySpec {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Quantity> for QuantitySpec {
    fn from(value: Quantity) -> Self {
        Self::Unsigned(value.0)
    }
}

/// Parse a size-like quantity (`TB`, `GB`, `MB`, `KB`, `B`, or a bare
/// number) into canonical units. Suffixes are case-insensitive.
pub fn parse_size(input: &str) -> Result<Quantity, ParseError> {
    let original = input.trim();
    let normalized = original.to_uppercase();
    if normalized.is_empty() {
        return Err(ParseError::Empty);
    }

    for (suffix, multiplier) in SIZE_UNITS {
        if let Some(magnitude) = normalized.strip_suffix(suffix) {
            let magnitude = magnitude.trim();
            if magnitude.is_empty() {
                return Err(ParseError::MissingMagnitude(original.to_owned()));
            }
            return scale_magnitude(magnitude, multiplier, original)
                .map_err(|error| match error {
                    ParseError::UnknownFormat(text) => ParseError::InvalidNumber(text),
                    other => other,
                });
        }
    }

    scale_magnitude(&normalized, 1, original)
}

/// Parse a duration-like quantity (`ms`, `s`, `m`, `h`, `d`, or a bare number
/// of seconds).
pub fn parse_duration(input: &str) -> Result<Duration, ParseError> {
    let original = input.trim();
    if original.is_empty() {
        return Err(ParseError::Empty);
    }

    let unit = DURATION_UNITS.iter().find_map(|(suffix, factor)| {
        original
            .strip_suffix(*suffix)
            .map(|magnitude| (magnitude, *factor))
    });
    let (magnitude, seconds_per_unit) = unit.unwrap_or((original, 1.0));

    if magnitude.is_empty() {
        return Err(ParseError::MissingMagnitude(original.to_owned()));
    }
    let value: f64 = magnitude.parse().map_err(|_| match unit {
        Some(_) => ParseError::InvalidNumber(original.to_owned()),
        None => ParseError::UnknownFormat(original.to_owned()),
    })?;
    if !value.is_finite() {
        return Err(ParseError::InvalidNumber(original.to_owned()));
    }
    if value < 0.0 {
        return Err(ParseError::Negative(original.to_owned()));
    }
    Duration::try_from_secs_f64(value * seconds_per_unit)
        .map_err(|_| ParseError::Overflow(original.to_owned()))
}

fn scale_magnitude(magnitude: &str, multiplier: u64, original: &str) -> Result<Quantity, ParseError> {
    if let Ok(whole) = magnitude.parse::<u64>() {
        return whole
            .checked_mul(multiplier)
            .map(Quantity)
            .ok_or_else(|| ParseError::Overflow(original.to_owned()));
    }

    let value: f64 = magnitude
        .parse()
        .map_err(|_| ParseError::UnknownFormat(original.to_owned()))?;
    float_to_quantity(value * multiplier as f64, original)
}

fn float_to_quantity(value: f64, original: &str) -> Result<Quantity, ParseError> {
    if !value.is_finite() {
        return Err(ParseError::InvalidNumber(original.to_owned()));
    }
    if value < 0.0 {
        return Err(ParseError::Negative(original.to_owned()));
    }
    if value >= u64::MAX as f64 {
        return Err(ParseError::Overflow(original.to_owned()));
    }
    Ok(Quantity(value.trunc() as u64))
}
