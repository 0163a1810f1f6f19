use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Neg, Sub};

/// `value * 100` rounded half away from zero, saturating at the `i64` bounds.
pub fn hundredths(value: Decimal) -> i64 {
    let saturated = if value.is_sign_negative() { i64::MIN } else { i64::MAX };
    value
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|v| v.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|v| v.to_i64())
        .unwrap_or(saturated)
}

/// Integer minor currency units (US cents).
///
/// The backend mixes float dollars (portfolio state) and integer cents (Kalshi
/// endpoints); everything is converted to `Cents` at the boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cents(pub i64);

impl Cents {
    pub const ZERO: Cents = Cents(0);

    /// Dollars to cents, rounding half away from zero.
    pub fn from_usd(usd: Decimal) -> Self {
        Cents(hundredths(usd))
    }

    pub fn to_usd(self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn abs(self) -> Self {
        Cents(self.0.saturating_abs())
    }

    /// `+$6.00` / `-$4.00` / `+$0.00`, used for P&L figures.
    pub fn signed(self) -> String {
        if self.is_negative() {
            format!("-{}", self.abs())
        } else {
            format!("+{self}")
        }
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_negative() {
            write!(f, "-${}", self.abs().to_usd())
        } else {
            write!(f, "${}", self.to_usd())
        }
    }
}

impl Add for Cents {
    type Output = Cents;
    fn add(self, rhs: Cents) -> Cents {
        Cents(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Cents {
    type Output = Cents;
    fn sub(self, rhs: Cents) -> Cents {
        Cents(self.0.saturating_sub(rhs.0))
    }
}

impl Neg for Cents {
    type Output = Cents;
    fn neg(self) -> Cents {
        Cents(self.0.saturating_neg())
    }
}

impl Sum for Cents {
    fn sum<I: Iterator<Item = Cents>>(iter: I) -> Cents {
        iter.fold(Cents::ZERO, |acc, c| acc + c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_from_usd_rounds_half_away_from_zero() {
        assert_eq!(Cents::from_usd(dec!(150.5)), Cents(15050));
        assert_eq!(Cents::from_usd(dec!(0.125)), Cents(13));
        assert_eq!(Cents::from_usd(dec!(-0.125)), Cents(-13));
        assert_eq!(Cents::from_usd(dec!(-4)), Cents(-400));
    }

    #[test]
    fn test_from_usd_saturates_out_of_range_amounts() {
        assert_eq!(Cents::from_usd(Decimal::MAX), Cents(i64::MAX));
        assert_eq!(Cents::from_usd(Decimal::MIN), Cents(i64::MIN));
        assert_eq!(Cents::from_usd(Decimal::from(i64::MAX)), Cents(i64::MAX));
    }

    #[test]
    fn test_display() {
        assert_eq!(Cents(15050).to_string(), "$150.50");
        assert_eq!(Cents(-400).to_string(), "-$4.00");
        assert_eq!(Cents(600).signed(), "+$6.00");
        assert_eq!(Cents(-5).signed(), "-$0.05");
        assert_eq!(Cents::ZERO.signed(), "+$0.00");
    }

    #[test]
    fn test_sum() {
        let total: Cents = [Cents(1000), Cents(-400)].into_iter().sum();
        assert_eq!(total, Cents(600));
    }
}
