//! Money and commission arithmetic.
//!
//! All amounts are exact decimals carried at two decimal places. Commission is
//! rounded half-up (midpoint away from zero) to the cent, so a price of
//! `50.00` at a `0.05` rate yields exactly `2.50`.

use crate::error::{EngineError, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of decimal places carried by every [`Money`] value.
pub const MONEY_SCALE: u32 = 2;

/// Largest amount accepted by [`Money::new`] (one trillion).
///
/// Keeps every product computed by the engine far away from the decimal
/// overflow boundary.
// 10^12 = 232 * 2^32 + 3_567_587_328 (mid and lo words, scale 0).
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

/// A non-negative monetary amount with cent precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Creates a `Money` value, rejecting negative amounts and fractional cents.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidArgument`] if the amount is negative, has
    /// more than two decimal places, or exceeds [`MAX_AMOUNT`].
    pub fn new(amount: Decimal) -> Result<Self> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(EngineError::invalid("amount", format!("{amount} is negative")));
        }
        if amount.round_dp(MONEY_SCALE) != amount {
            return Err(EngineError::invalid(
                "amount",
                format!("{amount} has fractional cents"),
            ));
        }
        if amount > MAX_AMOUNT {
            return Err(EngineError::invalid(
                "amount",
                format!("{amount} exceeds the supported maximum"),
            ));
        }
        Ok(Self::at_scale(amount.abs()))
    }

    /// Creates a `Money` value from a whole number of cents.
    #[must_use]
    pub fn from_cents(cents: u32) -> Self {
        Self(Decimal::new(i64::from(cents), MONEY_SCALE))
    }

    /// Zero, at cent scale.
    #[must_use]
    pub fn zero() -> Self {
        Self(Decimal::new(0, MONEY_SCALE))
    }

    fn at_scale(mut amount: Decimal) -> Self {
        amount.rescale(MONEY_SCALE);
        Self(amount)
    }

    /// Returns the exact decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Checks if the amount is strictly positive
    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Subtracts, returning `None` if the result would be negative.
    #[must_use]
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        (self.0 >= other.0).then(|| Self::at_scale(self.0 - other.0))
    }
}

impl TryFrom<Decimal> for Money {
    type Error = EngineError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl FromStr for Money {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let amount = Decimal::from_str(s.trim())
            .map_err(|e| EngineError::invalid("amount", format!("`{s}` is not a decimal: {e}")))?;
        Self::new(amount)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Platform commission rate, a decimal fraction in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct CommissionRate(Decimal);

impl CommissionRate {
    /// A zero rate.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Creates a rate, validating it lies in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidArgument`] for rates outside `[0, 1]`.
    pub fn new(rate: Decimal) -> Result<Self> {
        if rate < Decimal::ZERO || rate > Decimal::ONE {
            return Err(EngineError::invalid(
                "commission_rate",
                format!("{rate} is outside [0, 1]"),
            ));
        }
        Ok(Self(rate))
    }

    /// Returns the rate as a decimal fraction.
    #[must_use]
    pub const fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for CommissionRate {
    type Error = EngineError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<CommissionRate> for Decimal {
    fn from(rate: CommissionRate) -> Self {
        rate.0
    }
}

impl FromStr for CommissionRate {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let rate = Decimal::from_str(s.trim()).map_err(|e| {
            EngineError::invalid("commission_rate", format!("`{s}` is not a decimal: {e}"))
        })?;
        Self::new(rate)
    }
}

impl fmt::Display for CommissionRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn round_to_cents(amount: Decimal) -> Money {
    Money::at_scale(amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero))
}

/// Commission owed on `price` at `rate`, rounded half-up to the cent.
///
/// Never exceeds `price` since `rate ≤ 1`.
#[must_use]
pub fn commission(price: Money, rate: CommissionRate) -> Money {
    round_to_cents(price.0 * rate.0)
}

/// Amount left to the organizer once commission is taken.
///
/// Saturates at zero; a commission computed by [`commission`] never exceeds
/// its price.
#[must_use]
pub fn net(price: Money, commission: Money) -> Money {
    price.checked_sub(commission).unwrap_or_else(Money::zero)
}

/// Commission estimate over `count` entries of `fee` at `rate`.
#[must_use]
pub fn commission_for(count: u32, fee: Money, rate: CommissionRate) -> Money {
    round_to_cents(Decimal::from(count) * fee.0 * rate.0)
}
