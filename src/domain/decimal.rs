//! Lossless decimal type for PV and money amounts, backed by rust_decimal.
//!
//! Amounts are persisted as canonical strings (no exponent, no trailing zeros)
//! so SQLite never rounds them through REAL.

use rust_decimal::Decimal as RustDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lossless decimal used for point value and currency.
///
/// Serializes to a JSON number.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Decimal(#[serde(with = "rust_decimal::serde::float")] RustDecimal);

/// A ledger amount left the representable range (about 7.9e28).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{0} overflowed")]
pub struct DecimalOverflow(pub &'static str);

impl Decimal {
    /// Parse a Decimal from a string losslessly.
    ///
    /// # Errors
    /// Returns an error if the string is not a valid decimal number.
    pub fn from_str_canonical(s: &str) -> Result<Self, rust_decimal::Error> {
        RustDecimal::from_str(s).map(Decimal)
    }

    /// Format as a canonical string (normalized, no exponent notation).
    pub fn to_canonical_string(&self) -> String {
        format!("{}", self.0.normalize())
    }

    pub fn zero() -> Self {
        Decimal(RustDecimal::ZERO)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the value is > 0.
    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.0.is_sign_positive()
    }

    pub fn checked_add(self, rhs: Decimal) -> Option<Decimal> {
        self.0.checked_add(rhs.0).map(Decimal)
    }

    pub fn checked_mul(self, rhs: Decimal) -> Option<Decimal> {
        self.0.checked_mul(rhs.0).map(Decimal)
    }

    /// Clamps at the representable bound instead of failing.
    pub fn saturating_add(self, rhs: Decimal) -> Decimal {
        Decimal(self.0.saturating_add(rhs.0))
    }

    /// `self * (percent / 100)`. The factor is applied pre-scaled, so any
    /// non-negative amount with `percent <= 100` stays representable.
    pub fn checked_percent(self, percent: u32) -> Option<Decimal> {
        let factor = RustDecimal::from(percent).checked_div(RustDecimal::ONE_HUNDRED)?;
        self.0.checked_mul(factor).map(Decimal)
    }

    /// Add `rhs`, naming `field` in the error on overflow.
    pub fn add_or_overflow(
        self,
        rhs: Decimal,
        field: &'static str,
    ) -> Result<Decimal, DecimalOverflow> {
        self.checked_add(rhs).ok_or(DecimalOverflow(field))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for Decimal {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl From<RustDecimal> for Decimal {
    fn from(value: RustDecimal) -> Self {
        Decimal(value)
    }
}

/// Only used where the result cannot exceed the minuend, e.g. carry-forward
/// after a match.
impl std::ops::Sub for Decimal {
    type Output = Decimal;

    fn sub(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 - rhs.0)
    }
}
