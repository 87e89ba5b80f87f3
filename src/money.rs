use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// One cent, the tolerance used when comparing a client-declared amount
/// against a recomputed total.
pub const CENT: Decimal = dec!(0.01);

/// A monetary amount in the store currency.
///
/// All order math goes through this type so the rounding rule
/// (round-half-up to 2 decimal places) lives in exactly one place.
/// Rounding is explicit: arithmetic keeps full precision until
/// [`Money::rounded`] is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Money(amount)
    }

    /// Round to 2 decimal places, half away from zero.
    pub fn rounded(self) -> Self {
        Money(
            self.0
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    pub fn amount(self) -> Decimal {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Unit price times quantity, unrounded.
    pub fn times(self, quantity: i32) -> Self {
        Money(self.0 * Decimal::from(quantity))
    }

    /// Apply a fractional rate (e.g. a tax rate), unrounded.
    pub fn apply_rate(self, rate: Decimal) -> Self {
        Money(self.0 * rate)
    }

    /// True when the two amounts differ by at most one cent.
    pub fn within_one_cent(self, other: Money) -> bool {
        (self.0 - other.0).abs() <= CENT
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Money(amount)
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}
