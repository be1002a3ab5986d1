// ABOUTME: Defines the Value union carried through every serialization boundary.
// ABOUTME: Includes BigInteger, a lossless decimal integer that never passes through f64.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Largest integer magnitude an IEEE double holds exactly (2^53).
pub const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_992;

/// Returned when a string is not a plain decimal integer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("not a decimal integer: {0:?}")]
pub struct ParseBigIntegerError(pub String);

/// An arbitrary-precision integer kept in canonical decimal form: optional
/// leading '-', no leading zeros, no separators, and zero is always "0".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BigInteger(String);

impl BigInteger {
    /// Canonical decimal digits, sign included.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0.starts_with('-')
    }

    /// Returns the value as i64 when it fits.
    pub fn to_i64(&self) -> Option<i64> {
        self.0.parse().ok()
    }

    /// True when the magnitude is at most 2^53, i.e. an f64 holds it exactly.
    pub fn fits_f64_exactly(&self) -> bool {
        self.to_i64()
            .is_some_and(|v| v.unsigned_abs() <= MAX_SAFE_INTEGER as u64)
    }
}

impl FromStr for BigInteger {
    type Err = ParseBigIntegerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (negative, digits) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseBigIntegerError(s.to_string()));
        }

        let trimmed = digits.trim_start_matches('0');
        if trimmed.is_empty() {
            return Ok(Self("0".to_string()));
        }
        if negative {
            Ok(Self(format!("-{}", trimmed)))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }
}

impl fmt::Display for BigInteger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for BigInteger {
    fn from(v: i64) -> Self {
        Self(v.to_string())
    }
}

impl From<u64> for BigInteger {
    fn from(v: u64) -> Self {
        Self(v.to_string())
    }
}

impl From<i128> for BigInteger {
    fn from(v: i128) -> Self {
        Self(v.to_string())
    }
}

/// A single cell value. `Unsupported` is the open variant for engine values
/// outside this union (lists, blobs, structs); it can be held but never encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(BigInteger),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Unsupported { type_name: String },
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short variant name used in error messages.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "timestamp",
            Value::Unsupported { .. } => "unsupported",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v.into())
    }
}

impl From<BigInteger> for Value {
    fn from(v: BigInteger) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_integer_canonicalizes() {
        assert_eq!("000123".parse::<BigInteger>().unwrap().as_str(), "123");
        assert_eq!("+42".parse::<BigInteger>().unwrap().as_str(), "42");
        assert_eq!("-0".parse::<BigInteger>().unwrap().as_str(), "0");
        assert_eq!("-007".parse::<BigInteger>().unwrap().as_str(), "-7");
    }

    #[test]
    fn big_integer_rejects_non_digits() {
        for bad in ["", "-", "1,000", "1.5", "1e9", " 12", "0x10"] {
            assert!(bad.parse::<BigInteger>().is_err(), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn big_integer_keeps_values_beyond_i64() {
        let huge: BigInteger = "-170141183460469231731687303715884105728".parse().unwrap();
        assert!(huge.is_negative());
        assert!(huge.to_i64().is_none());
        assert!(!huge.fits_f64_exactly());
        assert_eq!(huge.to_string(), "-170141183460469231731687303715884105728");
    }

    #[test]
    fn safe_range_boundary() {
        assert!(BigInteger::from(MAX_SAFE_INTEGER).fits_f64_exactly());
        assert!(BigInteger::from(-MAX_SAFE_INTEGER).fits_f64_exactly());
        assert!(!BigInteger::from(MAX_SAFE_INTEGER + 1).fits_f64_exactly());
    }

    #[test]
    fn option_converts_to_null() {
        let none: Option<i64> = None;
        assert_eq!(Value::from(none), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".to_string()));
    }
}
