//! Monetary amounts.

use serde::{Deserialize, Serialize};

/// Money amount represented in minor units (cents) to avoid floating point drift.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Money {
    /// Amount in minor units (e.g., 1050 = 10.50)
    cents: i64,
}

impl Money {
    /// Creates a new amount from minor units.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Creates an amount from a decimal major-unit value, rounding to the
    /// nearest minor unit.
    ///
    /// Remote catalogs publish prices as JSON decimals, so this is the
    /// boundary where they enter the integer representation.
    pub fn from_decimal(value: f64) -> Self {
        Self {
            cents: (value * 100.0).round() as i64,
        }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in minor units.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the whole major-unit part.
    pub fn major(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the minor-unit remainder.
    pub fn minor_part(&self) -> i64 {
        (self.cents % 100).abs()
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Multiplies the amount by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            cents: self.cents * i64::from(quantity),
        }
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-{}.{:02}", self.major().abs(), self.minor_part())
        } else {
            write!(f, "{}.{:02}", self.major(), self.minor_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents + rhs.cents,
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.cents += rhs.cents;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// Serde adapter for amounts sent as JSON decimals in major units, the way
/// remote catalogs and order views publish them.
///
/// Use with `#[serde(with = "common::money::decimal")]`. Deserializing also
/// accepts the `{"cents": N}` form that [`Money`] itself produces.
pub mod decimal {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Money;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum WireAmount {
        Decimal(f64),
        Minor { cents: i64 },
    }

    pub fn serialize<S: Serializer>(money: &Money, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(money.cents as f64 / 100.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Money, D::Error> {
        Ok(match WireAmount::deserialize(deserializer)? {
            WireAmount::Decimal(value) => Money::from_decimal(value),
            WireAmount::Minor { cents } => Money::from_cents(cents),
        })
    }
}
