//! Fixed-point decimal for prices and 24h statistics
//!
//! i64 scaled by 10^8. Two values are "bit-identical" when their raw
//! representations are equal, which is what the store's dedup relies on.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Fixed-point number with 8 decimal places
/// Stored as i64 where value = real_value * 100_000_000
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct FixedPoint8(i64);

/// Returned when a decimal string cannot be represented
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid decimal: {0:?}")]
pub struct ParseDecimalError(pub String);

impl FixedPoint8 {
    /// Decimal places kept
    const PLACES: usize = 8;

    /// 10^8
    pub const SCALE: i64 = 100_000_000;

    pub const ZERO: Self = Self(0);

    #[inline(always)]
    pub const fn from_raw(value: i64) -> Self {
        Self(value)
    }

    #[inline(always)]
    pub const fn as_raw(&self) -> i64 {
        self.0
    }

    /// Whole units, e.g. `from_int(100)` is 100.0
    #[inline]
    pub const fn from_int(value: i64) -> Option<Self> {
        match value.checked_mul(Self::SCALE) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    /// Secondary source and config values; `None` for NaN, infinities and
    /// anything outside the i64 range once scaled
    pub fn from_f64(value: f64) -> Option<Self> {
        let scaled = (value * Self::SCALE as f64).round();
        (scaled.is_finite() && scaled >= i64::MIN as f64 && scaled < i64::MAX as f64)
            .then_some(Self(scaled as i64))
    }

    #[inline(always)]
    pub fn to_f64(&self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    /// Parse an exchange decimal field ("16540.25", "-0.263", "42")
    ///
    /// Digits past the eighth decimal place are truncated. Exponents,
    /// separators and a bare sign or point are rejected.
    pub fn parse_bytes(bytes: &[u8]) -> Option<Self> {
        let (negative, unsigned) = match bytes.split_first()? {
            (b'-', rest) => (true, rest),
            (b'+', rest) => (false, rest),
            _ => (false, bytes),
        };

        let (whole, fraction) = match unsigned.iter().position(|&b| b == b'.') {
            Some(dot) => (&unsigned[..dot], &unsigned[dot + 1..]),
            None => (unsigned, &[][..]),
        };
        if whole.is_empty() && fraction.is_empty() {
            return None;
        }
        if !whole.iter().chain(fraction).all(u8::is_ascii_digit) {
            return None;
        }

        let mut raw: i64 = 0;
        for &digit in whole {
            raw = raw.checked_mul(10)?.checked_add(i64::from(digit - b'0'))?;
        }
        raw = raw.checked_mul(Self::SCALE)?;

        let mut place = Self::SCALE;
        for &digit in fraction.iter().take(Self::PLACES) {
            place /= 10;
            raw = raw.checked_add(i64::from(digit - b'0') * place)?;
        }

        Some(Self(if negative { -raw } else { raw }))
    }

    #[inline(always)]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline(always)]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl Default for FixedPoint8 {
    #[inline(always)]
    fn default() -> Self {
        Self::ZERO
    }
}

/// Shortest form with at least one fractional digit ("42.0", "-0.5")
impl fmt::Display for FixedPoint8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let magnitude = self.0.unsigned_abs();
        let scale = Self::SCALE.unsigned_abs();
        let sign = if self.0 < 0 { "-" } else { "" };

        let digits = format!("{:08}", magnitude % scale);
        let fraction = digits.trim_end_matches('0');
        let fraction = if fraction.is_empty() { "0" } else { fraction };
        write!(f, "{sign}{}.{fraction}", magnitude / scale)
    }
}

impl FromStr for FixedPoint8 {
    type Err = ParseDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_bytes(s.trim().as_bytes()).ok_or_else(|| ParseDecimalError(s.to_string()))
    }
}

/// Serialized as a JSON number for dashboards
impl Serialize for FixedPoint8 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DecimalRepr {
    Int(i64),
    Float(f64),
    Text(String),
}

/// Accepts integers, floats and decimal strings
impl<'de> Deserialize<'de> for FixedPoint8 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        match DecimalRepr::deserialize(deserializer)? {
            DecimalRepr::Int(v) => {
                Self::from_int(v).ok_or_else(|| D::Error::custom(format!("decimal out of range: {v}")))
            }
            DecimalRepr::Float(v) => {
                Self::from_f64(v).ok_or_else(|| D::Error::custom(format!("decimal out of range: {v}")))
            }
            DecimalRepr::Text(s) => s.parse().map_err(D::Error::custom),
        }
    }
}
