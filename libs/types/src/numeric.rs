//! Fixed-point decimal types for prices and sizes
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point errors).
//! Both types serialize as decimal strings, matching the feed's wire format.

use std::fmt;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::TypeError;

/// Price of one unit of the base asset, in quote currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    pub const ZERO: Price = Price(Decimal::ZERO);
    pub const ONE: Price = Price(Decimal::ONE);

    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Price {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str_exact(s)
            .map(Self)
            .map_err(|_| TypeError::InvalidDecimal(s.to_string()))
    }
}

impl From<Decimal> for Price {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

/// Order size in base-asset units. Never negative once it leaves this module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Size(Decimal);

impl Size {
    pub const ZERO: Size = Size(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Subtract, clamping at zero.
    pub fn saturating_sub(self, other: Size) -> Size {
        if other.0 >= self.0 {
            Size::ZERO
        } else {
            Size(self.0 - other.0)
        }
    }

    /// Signed difference `self - other`, used for change deltas.
    pub fn delta(self, other: Size) -> Decimal {
        self.0 - other.0
    }

    /// Quote-currency value of this size at the given price.
    pub fn notional(self, price: Price) -> Decimal {
        self.0 * price.0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Size {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str_exact(s).map_err(|_| TypeError::InvalidDecimal(s.to_string()))?;
        if value.is_sign_negative() && !value.is_zero() {
            return Err(TypeError::NegativeSize(s.to_string()));
        }
        Ok(Self(value))
    }
}

impl From<Decimal> for Size {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl Add for Size {
    type Output = Size;

    fn add(self, rhs: Size) -> Size {
        Size(self.0 + rhs.0)
    }
}

impl AddAssign for Size {
    fn add_assign(&mut self, rhs: Size) {
        self.0 += rhs.0;
    }
}
