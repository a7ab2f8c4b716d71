use crate::error::{BillingError, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::ops::{Add, AddAssign};

/// Quantizes to two fraction digits, the precision every monetary value in
/// the ledger carries. Half-even rounding, matching the billing generator.
fn quantize(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp(2);
    rounded.rescale(2);
    rounded
}

/// A strictly positive monetary amount, as carried by payments and intents.
///
/// Wrapping `rust_decimal::Decimal` keeps arithmetic exact and serialization
/// string-based; binary floats never touch money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        let value = quantize(value);
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(BillingError::Validation(
                "amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = BillingError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A non-negative balance: an installment's total due, its accumulated paid
/// amount, or its remaining saldo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Balance(Decimal);

impl Balance {
    // Zero with two fraction digits, so it renders as "0.00" like every
    // other balance.
    pub const ZERO: Self = Self(Decimal::from_parts(0, 0, 0, false, 2));

    pub fn new(value: Decimal) -> Result<Self> {
        let value = quantize(value);
        if value >= Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(BillingError::Validation(
                "balance cannot be negative".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Adds a payment amount to this balance.
    pub fn plus(self, amount: Amount) -> Self {
        Self(quantize(self.0 + amount.value()))
    }

    /// Strict subtraction: rejects a result below zero. Used where the domain
    /// forbids a negative balance outright, e.g. validating an overpayment.
    pub fn minus(self, amount: Amount) -> Result<Self> {
        let result = self.0 - amount.value();
        if result < Decimal::ZERO {
            return Err(BillingError::Validation(format!(
                "subtracting {} from {} would leave a negative balance",
                amount, self
            )));
        }
        Ok(Self(quantize(result)))
    }

    /// Subtraction floored at zero. The saldo of an installment is reported
    /// this way even if invalidated history briefly overshoots.
    pub fn saturating_sub(self, other: Balance) -> Self {
        let result = self.0 - other.0;
        if result < Decimal::ZERO {
            Self::ZERO
        } else {
            Self(quantize(result))
        }
    }

    pub fn clamp(self, min: Balance, max: Balance) -> Self {
        Self(self.0.clamp(min.0, max.0))
    }

    /// Renders the balance for the presentation layer, e.g. `"Bs. 40.00"`.
    pub fn display_with(&self, currency_symbol: &str) -> String {
        format!("{} {}", currency_symbol, self.0)
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.value())
    }
}

impl Add for Balance {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(quantize(self.0 + rhs.0))
    }
}

impl AddAssign for Balance {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = quantize(self.0 + rhs.0);
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
