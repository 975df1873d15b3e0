//! Menu prices and order totals.
//!
//! Amounts are held as integer cents (how they are stored in SQLite) and
//! converted to [`Decimal`] only for display and averaging.

use core::fmt;
use core::iter::Sum;
use core::ops::Add;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors that can occur when building a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// Prices cannot be negative.
    #[error("price cannot be negative")]
    Negative,
    /// The decimal amount has more than two fractional digits or overflows.
    #[error("price must be a whole number of cents")]
    InvalidPrecision,
}

/// A non-negative amount of money in the store currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(i64);

impl Price {
    /// The zero amount.
    pub const ZERO: Self = Self(0);

    /// Create a price from a number of cents.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Negative` if `cents` is below zero.
    pub const fn from_cents(cents: i64) -> Result<Self, PriceError> {
        if cents < 0 {
            return Err(PriceError::Negative);
        }
        Ok(Self(cents))
    }

    /// Create a price from a decimal amount such as `12.50`.
    ///
    /// # Errors
    ///
    /// Returns an error for negative amounts or sub-cent precision.
    pub fn from_decimal(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative);
        }
        let cents = amount
            .checked_mul(Decimal::ONE_HUNDRED)
            .ok_or(PriceError::InvalidPrecision)?;
        if !cents.fract().is_zero() {
            return Err(PriceError::InvalidPrecision);
        }
        i64::try_from(cents)
            .map(Self)
            .map_err(|_| PriceError::InvalidPrecision)
    }

    /// The amount in cents.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// The amount as a two-decimal `Decimal`.
    #[must_use]
    pub fn as_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    /// Multiply a unit price by a quantity, saturating on overflow.
    ///
    /// Display only; anything that is persisted goes through [`Self::checked_times`].
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(i64::from(quantity)))
    }

    /// Multiply a unit price by a quantity, `None` on overflow.
    #[must_use]
    pub fn checked_times(self, quantity: u32) -> Option<Self> {
        self.0.checked_mul(i64::from(quantity)).map(Self)
    }

    /// Add two amounts, `None` on overflow.
    #[must_use]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Average of `self` over `count` parts, rounded to the cent.
    ///
    /// Returns zero when `count` is zero.
    #[must_use]
    pub fn average_over(self, count: u64) -> Self {
        if count == 0 {
            return Self::ZERO;
        }
        let avg = (self.as_decimal() / Decimal::from(count)).round_dp(2);
        Self::from_decimal(avg).unwrap_or(Self::ZERO)
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.as_decimal())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_checked_arithmetic_reports_overflow() {
        let unit = Price::from_cents(450).unwrap();
        assert_eq!(unit.checked_times(3), Some(Price::from_cents(1350).unwrap()));
        assert_eq!(unit.checked_add(unit), Some(Price::from_cents(900).unwrap()));

        let huge = Price::from_cents(i64::MAX / 2).unwrap();
        assert_eq!(huge.checked_times(3), None);
        assert_eq!(huge.checked_add(huge).and_then(|p| p.checked_add(huge)), None);
        assert_eq!(huge.times(3).cents(), i64::MAX);
    }

    #[test]
    fn test_from_cents_rejects_negative() {
        assert_eq!(Price::from_cents(-1), Err(PriceError::Negative));
        assert_eq!(Price::from_cents(0).unwrap(), Price::ZERO);
    }

    #[test]
    fn test_from_decimal() {
        let price = Price::from_decimal(Decimal::from_str("12.5").unwrap()).unwrap();
        assert_eq!(price.cents(), 1250);

        assert_eq!(
            Price::from_decimal(Decimal::from_str("1.005").unwrap()),
            Err(PriceError::InvalidPrecision)
        );
        assert_eq!(
            Price::from_decimal(Decimal::from_str("-3").unwrap()),
            Err(PriceError::Negative)
        );
    }

    #[test]
    fn test_line_totals_sum() {
        let burger = Price::from_cents(899).unwrap();
        let fries = Price::from_cents(349).unwrap();
        let total: Price = [burger.times(2), fries.times(3)].into_iter().sum();
        assert_eq!(total.cents(), 899 * 2 + 349 * 3);
    }

    #[test]
    fn test_average_over() {
        let revenue = Price::from_cents(1000).unwrap();
        assert_eq!(revenue.average_over(3).cents(), 333);
        assert_eq!(revenue.average_over(0), Price::ZERO);
    }

    #[test]
    fn test_display() {
        assert_eq!(Price::from_cents(705).unwrap().to_string(), "$7.05");
        assert_eq!(Price::ZERO.to_string(), "$0.00");
    }
}
