//! Exact decimal temperatures.
//!
//! Every setpoint, threshold and measurement passes through [`Temperature`]. The
//! textual form written to storage is produced by `Display` only, and always
//! carries at least one fractional digit (`5` is written as `"5.0"`).

use core::fmt;
use rust_decimal::Decimal;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::ops::{Add, Sub};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemperatureError {
    Empty,
    Malformed(String),
}

impl Display for TemperatureError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TemperatureError::Empty => write!(f, "empty temperature value"),
            TemperatureError::Malformed(s) => write!(f, "malformed temperature value: {:?}", s),
        }
    }
}

impl Error for TemperatureError {}

/// Fixed-point temperature in degrees Celsius. Comparison is numeric, so
/// `5.0 == 5.00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Temperature(Decimal);

impl Temperature {
    /// Absolute difference between two temperatures.
    pub fn distance(&self, other: Temperature) -> Decimal {
        (self.0 - other.0).abs()
    }
}

impl FromStr for Temperature {
    type Err = TemperatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(TemperatureError::Empty);
        }

        let negative = trimmed.starts_with('-');
        let unsigned = trimmed.strip_prefix(['-', '+']).unwrap_or(trimmed);
        let (whole, fraction) = match unsigned.split_once('.') {
            Some((w, f)) => (w, Some(f)),
            None => (unsigned, None),
        };
        let is_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !is_digits(whole) || !fraction.is_none_or(is_digits) {
            return Err(TemperatureError::Malformed(trimmed.to_string()));
        }

        let value = Decimal::from_str(unsigned).map_err(|_| TemperatureError::Malformed(trimmed.to_string()))?;
        Ok(Temperature(if negative { -value } else { value }))
    }
}

impl Display for Temperature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.0.scale() == 0 {
            write!(f, "{}.0", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<i32> for Temperature {
    fn from(value: i32) -> Self {
        Temperature(Decimal::from(value))
    }
}

impl From<Decimal> for Temperature {
    fn from(value: Decimal) -> Self {
        Temperature(value)
    }
}

impl Add<i32> for Temperature {
    type Output = Temperature;

    fn add(self, rhs: i32) -> Temperature {
        Temperature(self.0 + Decimal::from(rhs))
    }
}

impl Sub<i32> for Temperature {
    type Output = Temperature;

    fn sub(self, rhs: i32) -> Temperature {
        Temperature(self.0 - Decimal::from(rhs))
    }
}
