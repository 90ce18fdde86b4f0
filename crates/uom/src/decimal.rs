//! Decimal normalization and checked arithmetic helpers.

use core::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{UomError, UomResult};

/// Fractional digits used when persisting custom conversion factors.
pub const STORED_FACTOR_SCALE: u32 = 12;

/// Numeric input accepted at the engine boundary.
///
/// Everything is normalized to [`Decimal`] before any arithmetic happens.
/// Floats go through their shortest round-tripping text form, so `0.1_f64`
/// becomes exactly `0.1` rather than its binary approximation.
#[derive(Debug, Clone, PartialEq)]
pub enum NumericInput {
    Decimal(Decimal),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl NumericInput {
    pub fn to_decimal(&self) -> UomResult<Decimal> {
        match self {
            NumericInput::Decimal(d) => Ok(*d),
            NumericInput::Integer(i) => Ok(Decimal::from(*i)),
            NumericInput::Float(f) => {
                if !f.is_finite() {
                    return Err(UomError::invalid_value(format!("{f} is not a finite number")));
                }
                parse_decimal(&f.to_string())
            }
            NumericInput::Text(s) => parse_decimal(s),
        }
    }
}

impl From<Decimal> for NumericInput {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<i64> for NumericInput {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for NumericInput {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for NumericInput {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for NumericInput {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for NumericInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for NumericInput {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Parse plain (`"12.5"`) or scientific (`"1.25e1"`) decimal text.
pub fn parse_decimal(text: &str) -> UomResult<Decimal> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(UomError::invalid_value("empty numeric string"));
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|e| UomError::invalid_value(format!("'{trimmed}': {e}")))
}

/// Round half away from zero to `precision` fractional digits, or leave the
/// value at full precision when none is requested.
pub fn round_to(value: Decimal, precision: Option<u32>) -> Decimal {
    match precision {
        Some(dp) => value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero),
        None => value,
    }
}

/// Round to exactly `scale` fractional digits, keeping trailing zeros
/// (`4` becomes `4.000000000000` at scale 12).
///
/// Fails when the integer part leaves too few of the 28 significant digits
/// for `scale` fractional ones.
pub fn to_fixed_scale(value: Decimal, scale: u32) -> UomResult<Decimal> {
    let mut fixed = value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
    fixed.rescale(scale);
    if fixed.scale() != scale {
        return Err(UomError::invalid_value(format!(
            "{value} cannot be stored with {scale} fractional digits"
        )));
    }
    Ok(fixed)
}

pub fn checked_mul(a: Decimal, b: Decimal) -> UomResult<Decimal> {
    a.checked_mul(b)
        .ok_or_else(|| UomError::arithmetic(format!("overflow computing {a} * {b}")))
}

pub fn checked_div(a: Decimal, b: Decimal) -> UomResult<Decimal> {
    if b.is_zero() {
        return Err(UomError::arithmetic(format!("division of {a} by zero")));
    }
    a.checked_div(b)
        .ok_or_else(|| UomError::arithmetic(format!("overflow computing {a} / {b}")))
}

pub fn checked_add(a: Decimal, b: Decimal) -> UomResult<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| UomError::arithmetic(format!("overflow computing {a} + {b}")))
}

pub fn checked_sub(a: Decimal, b: Decimal) -> UomResult<Decimal> {
    a.checked_sub(b)
        .ok_or_else(|| UomError::arithmetic(format!("overflow computing {a} - {b}")))
}

/// Powers beyond this over- or underflow a 28-digit decimal anyway.
const MAX_POWER: u32 = 64;

/// `base^power` by repeated multiplication.
pub fn checked_pow(base: Decimal, power: u32) -> UomResult<Decimal> {
    if base == Decimal::ONE {
        return Ok(Decimal::ONE);
    }
    if power > MAX_POWER {
        return Err(UomError::arithmetic(format!("exponent {power} is out of range")));
    }
    let mut acc = Decimal::ONE;
    for _ in 0..power {
        acc = checked_mul(acc, base)?;
    }
    Ok(acc)
}

/// Integer power; negative exponents divide.
pub fn checked_powi(base: Decimal, exponent: i32) -> UomResult<Decimal> {
    let acc = checked_pow(base, exponent.unsigned_abs())?;
    if exponent < 0 {
        checked_div(Decimal::ONE, acc)
    } else {
        Ok(acc)
    }
}

/// Reject zero and negative ratios.
pub fn ensure_positive(value: Decimal, what: &str) -> UomResult<Decimal> {
    if value <= Decimal::ZERO {
        return Err(UomError::invalid_value(format!("{what} must be greater than zero, got {value}")));
    }
    Ok(value)
}
