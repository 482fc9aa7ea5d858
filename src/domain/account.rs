use super::tag::TagId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// A card balance in whole currency units.
///
/// Signed on purpose: payments are applied without a sufficiency check, so a
/// balance may go below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balance(pub i64);

/// A top-up or payment amount. Never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Self = Self(0);

    /// Coerces a raw wire amount: missing or negative values count as zero.
    pub fn coerce(value: Option<i64>) -> Self {
        Self(value.unwrap_or(0).max(0))
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl Balance {
    pub const ZERO: Self = Self(0);

    pub fn new(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Balance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Balance {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl AddAssign for Balance {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Balance {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

/// The session-local state of one card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardAccount {
    pub id: TagId,
    pub balance: Balance,
}

impl CardAccount {
    pub fn new(id: TagId) -> Self {
        Self {
            id,
            balance: Balance::ZERO,
        }
    }

    pub fn credit(&mut self, amount: Amount) -> Balance {
        self.balance += amount.into();
        self.balance
    }

    /// Debits unconditionally, even past zero.
    pub fn debit(&mut self, amount: Amount) -> Balance {
        self.balance -= amount.into();
        self.balance
    }
}
