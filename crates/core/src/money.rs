//! Monetary amounts in minor currency units.
//!
//! All arithmetic inside the core happens on integer cents. Conversion to and
//! from display currency only happens at the boundary (`from_major`,
//! `to_major`, `FromStr`, `Display`).

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, AddAssign, Neg, Sub};
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// An amount of money in minor units (e.g. cents).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cents(i64);

impl Cents {
    pub const ZERO: Cents = Cents(0);

    pub const fn new(minor_units: i64) -> Self {
        Self(minor_units)
    }

    pub const fn get(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Convert a display amount (e.g. `99.99`) to minor units, rounding to the
    /// nearest cent.
    ///
    /// `99.99 * 100.0` is `9998.999…` in binary floating point, so truncation
    /// would lose a cent.
    pub fn from_major(amount: f64) -> DomainResult<Self> {
        if !amount.is_finite() {
            return Err(DomainError::validation("amount must be a finite number"));
        }
        let scaled = (amount * 100.0).round();
        if scaled > i64::MAX as f64 || scaled < i64::MIN as f64 {
            return Err(DomainError::validation("amount is out of range"));
        }
        Ok(Self(scaled as i64))
    }

    /// Display-currency value. Lossy; only for presentation.
    pub fn to_major(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn checked_add(self, other: Cents) -> Option<Cents> {
        self.0.checked_add(other.0).map(Cents)
    }

    /// Mean of `count` amounts summing to `self`, rounded half away from zero.
    ///
    /// Returns zero when `count` is zero.
    pub fn average_over(self, count: u64) -> Cents {
        if count == 0 {
            return Cents::ZERO;
        }
        let total = i128::from(self.0);
        let n = i128::from(count);
        let half = n / 2;
        let rounded = if total >= 0 {
            (total + half) / n
        } else {
            (total - half) / n
        };
        // |rounded| <= |total|, so it always fits back into i64.
        Cents(rounded as i64)
    }
}

// Operators saturate at the i64 bounds; use `checked_add` to detect overflow.
impl Add for Cents {
    type Output = Cents;

    fn add(self, rhs: Cents) -> Cents {
        Cents(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Cents {
    fn add_assign(&mut self, rhs: Cents) {
        *self = *self + rhs;
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
        iter.fold(Cents::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Cents> for Cents {
    fn sum<I: Iterator<Item = &'a Cents>>(iter: I) -> Cents {
        iter.copied().sum()
    }
}

impl From<i64> for Cents {
    fn from(value: i64) -> Self {
        Cents(value)
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Parses decimal strings such as `"99.99"`, `"-4.5"` or `"12"` exactly.
impl FromStr for Cents {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };

        let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if whole.is_empty() || !all_digits(whole) || !all_digits(frac) {
            return Err(DomainError::validation(format!("invalid amount: {s:?}")));
        }
        if frac.len() > 2 {
            return Err(DomainError::validation(format!(
                "amount has more than two decimal places: {s:?}"
            )));
        }

        let whole: i64 = whole
            .parse()
            .map_err(|_| DomainError::validation(format!("amount is out of range: {s:?}")))?;
        let frac: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().unwrap_or(0) * 10,
            _ => frac.parse::<i64>().unwrap_or(0),
        };

        let minor = whole
            .checked_mul(100)
            .and_then(|v| v.checked_add(frac))
            .ok_or_else(|| DomainError::validation(format!("amount is out of range: {s:?}")))?;

        Ok(Cents(if negative { -minor } else { minor }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn from_major_rounds_instead_of_truncating() {
        assert_eq!(Cents::from_major(99.99).unwrap(), Cents::new(9999));
        assert_eq!(Cents::from_major(5.99).unwrap(), Cents::new(599));
        assert_eq!(Cents::from_major(0.1 + 0.2).unwrap(), Cents::new(30));
    }

    #[test]
    fn arithmetic_saturates_at_bounds() {
        let max = Cents::new(i64::MAX);
        let min = Cents::new(i64::MIN);
        assert_eq!(max + Cents::new(1), max);
        assert_eq!(min - Cents::new(1), min);
        assert_eq!(-min, max);

        let mut total = max;
        total += Cents::new(599);
        assert_eq!(total, max);
        assert_eq!([max, max].iter().sum::<Cents>(), max);
        assert_eq!(max.checked_add(Cents::new(1)), None);
    }

    #[test]
    fn from_major_rejects_non_finite() {
        assert!(Cents::from_major(f64::NAN).is_err());
        assert!(Cents::from_major(f64::INFINITY).is_err());
    }

    #[test]
    fn parses_decimal_strings() {
        assert_eq!("99.99".parse::<Cents>().unwrap(), Cents::new(9999));
        assert_eq!("4.5".parse::<Cents>().unwrap(), Cents::new(450));
        assert_eq!("12".parse::<Cents>().unwrap(), Cents::new(1200));
        assert_eq!("-0.05".parse::<Cents>().unwrap(), Cents::new(-5));
        assert!("1.234".parse::<Cents>().is_err());
        assert!("abc".parse::<Cents>().is_err());
        assert!(".50".parse::<Cents>().is_err());
    }

    #[test]
    fn display_uses_two_decimals() {
        assert_eq!(Cents::new(1198).to_string(), "11.98");
        assert_eq!(Cents::new(5).to_string(), "0.05");
        assert_eq!(Cents::new(-250).to_string(), "-2.50");
    }

    #[test]
    fn average_over_zero_count_is_zero() {
        assert_eq!(Cents::new(1000).average_over(0), Cents::ZERO);
    }

    #[test]
    fn average_rounds_half_away_from_zero() {
        // 2048 / 3 = 682.67
        assert_eq!(Cents::new(2048).average_over(3), Cents::new(683));
        // 5 / 2 = 2.5
        assert_eq!(Cents::new(5).average_over(2), Cents::new(3));
        assert_eq!(Cents::new(-5).average_over(2), Cents::new(-3));
    }

    proptest! {
        #[test]
        fn display_then_parse_is_identity(minor in -1_000_000_000i64..1_000_000_000i64) {
            let c = Cents::new(minor);
            prop_assert_eq!(c.to_string().parse::<Cents>().unwrap(), c);
        }

        #[test]
        fn average_is_bounded_by_total(total in 0i64..10_000_000, count in 1u64..10_000) {
            let avg = Cents::new(total).average_over(count);
            prop_assert!(avg.get() >= 0);
            prop_assert!(avg.get() <= total);
        }
    }
}
