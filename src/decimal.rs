use std::cmp::Ordering;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;

use bigdecimal::{BigDecimal, Signed, Zero};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of fractional digits carried by every quantity and monetary amount.
pub const SCALE: i64 = 8;

/// Largest magnitude storable in a `NUMERIC(20, 8)` column (12 integer digits).
const INTEGER_DIGITS: usize = 12;

/// Exact signed decimal with a fixed scale of 8 fractional digits.
///
/// Addition and subtraction are exact. Multiplication and division produce
/// an exact intermediate which is then rounded back to 8 fractional digits
/// using banker's rounding (round half to even). This matters for per-share
/// cost: `1000 / 3` is `333.33333333`, never a float approximation.
///
/// Serialized to JSON as a decimal string.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, sqlx::Type)]
#[sqlx(transparent)]
pub struct Decimal(BigDecimal);

impl Decimal {
    pub fn zero() -> Self {
        Decimal(BigDecimal::zero().with_scale(SCALE))
    }

    pub fn from_i64(value: i64) -> Self {
        Decimal(BigDecimal::from(value).with_scale(SCALE))
    }

    /// Builds a value from an integer mantissa and a decimal exponent,
    /// e.g. `Decimal::new(5, 1)` is `0.5`.
    pub fn new(mantissa: i64, scale: i64) -> Self {
        Decimal::from_big(BigDecimal::new(mantissa.into(), scale))
    }

    fn from_big(value: BigDecimal) -> Self {
        Decimal(round_half_even(&value, SCALE))
    }

    pub fn as_big(&self) -> &BigDecimal {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    pub fn is_positive(&self) -> bool {
        self.0.is_positive()
    }

    pub fn abs(&self) -> Self {
        Decimal(self.0.abs())
    }

    /// Rounds to `scale` fractional digits (banker's rounding). Scales above
    /// 8 are a no-op since the value never carries more digits than that.
    pub fn round_dp(&self, scale: i64) -> Self {
        if scale >= SCALE {
            return self.clone();
        }
        Decimal(round_half_even(&self.0, scale).with_scale(SCALE))
    }

    /// Division rounded to 8 fractional digits. `None` when dividing by zero.
    pub fn checked_div(&self, other: &Decimal) -> Option<Decimal> {
        if other.is_zero() {
            return None;
        }
        Some(Decimal::from_big(&self.0 / &other.0))
    }

    /// `self / other`, or zero when `other` is zero.
    pub fn div_or_zero(&self, other: &Decimal) -> Decimal {
        self.checked_div(other).unwrap_or_else(Decimal::zero)
    }

    pub fn min(self, other: Decimal) -> Decimal {
        if self <= other {
            self
        } else {
            other
        }
    }

    pub fn max(self, other: Decimal) -> Decimal {
        if self >= other {
            self
        } else {
            other
        }
    }

    /// Whether the value fits a `NUMERIC(20, 8)` column.
    pub fn fits_storage(&self) -> bool {
        let text = self.0.abs().with_scale(0).to_string();
        text.trim_start_matches('-').len() <= INTEGER_DIGITS
    }
}

/// Rounds `value` to `scale` fractional digits, ties to even.
fn round_half_even(value: &BigDecimal, scale: i64) -> BigDecimal {
    // with_scale truncates toward zero when reducing digits
    let truncated = value.with_scale(scale);
    let remainder = value - &truncated;
    if remainder.is_zero() {
        return truncated;
    }

    let ulp = BigDecimal::new(1.into(), scale);
    let doubled = (&remainder * &BigDecimal::from(2)).abs();
    let away_from_zero = match doubled.cmp(&ulp) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => last_digit_is_odd(&truncated, scale),
    };

    if !away_from_zero {
        truncated
    } else if value.is_negative() {
        (truncated - ulp).with_scale(scale)
    } else {
        (truncated + ulp).with_scale(scale)
    }
}

fn last_digit_is_odd(value: &BigDecimal, scale: i64) -> bool {
    // value * 10^scale is an integer n; n / 2 has a fractional part iff n is odd
    let halved = value * &BigDecimal::new(5.into(), 1 - scale);
    halved.with_scale(0) != halved
}

impl Default for Decimal {
    fn default() -> Self {
        Decimal::zero()
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Decimal::from_i64(value)
    }
}

impl From<BigDecimal> for Decimal {
    fn from(value: BigDecimal) -> Self {
        Decimal::from_big(value)
    }
}

impl FromStr for Decimal {
    type Err = bigdecimal::ParseBigDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BigDecimal::from_str(s.trim()).map(Decimal::from_big)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.0.with_scale(SCALE).to_string();
        let trimmed = if text.contains('.') {
            text.trim_end_matches('0').trim_end_matches('.')
        } else {
            text.as_str()
        };
        if trimmed == "-0" {
            f.write_str("0")
        } else {
            f.write_str(trimmed)
        }
    }
}

impl fmt::Debug for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Decimal({})", self)
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $op:tt) => {
        impl<'a> $trait<&'a Decimal> for &'a Decimal {
            type Output = Decimal;

            fn $method(self, rhs: &'a Decimal) -> Decimal {
                Decimal::from_big(&self.0 $op &rhs.0)
            }
        }

        impl $trait<Decimal> for Decimal {
            type Output = Decimal;

            fn $method(self, rhs: Decimal) -> Decimal {
                (&self).$method(&rhs)
            }
        }

        impl<'a> $trait<&'a Decimal> for Decimal {
            type Output = Decimal;

            fn $method(self, rhs: &'a Decimal) -> Decimal {
                (&self).$method(rhs)
            }
        }
    };
}

impl_binary_op!(Add, add, +);
impl_binary_op!(Sub, sub, -);
impl_binary_op!(Mul, mul, *);

impl AddAssign<&Decimal> for Decimal {
    fn add_assign(&mut self, rhs: &Decimal) {
        *self = &*self + rhs;
    }
}

impl AddAssign for Decimal {
    fn add_assign(&mut self, rhs: Decimal) {
        *self = &*self + &rhs;
    }
}

impl SubAssign<&Decimal> for Decimal {
    fn sub_assign(&mut self, rhs: &Decimal) {
        *self = &*self - rhs;
    }
}

impl SubAssign for Decimal {
    fn sub_assign(&mut self, rhs: Decimal) {
        *self = &*self - &rhs;
    }
}

impl Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal(-self.0)
    }
}

impl Sum for Decimal {
    fn sum<I: Iterator<Item = Decimal>>(iter: I) -> Self {
        iter.fold(Decimal::zero(), |acc, x| acc + x)
    }
}

impl<'a> Sum<&'a Decimal> for Decimal {
    fn sum<I: Iterator<Item = &'a Decimal>>(iter: I) -> Self {
        iter.fold(Decimal::zero(), |acc, x| acc + x)
    }
}

impl Serialize for Decimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

struct DecimalVisitor;

impl<'de> Visitor<'de> for DecimalVisitor {
    type Value = Decimal;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a decimal string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Decimal, E> {
        Decimal::from_str(v).map_err(|_| E::custom(format!("invalid decimal: {}", v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Decimal, E> {
        Ok(Decimal::from_i64(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Decimal, E> {
        Decimal::from_str(&v.to_string()).map_err(E::custom)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Decimal, E> {
        Decimal::from_str(&v.to_string()).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Decimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DecimalVisitor)
    }
}

/// Shorthand for tests and constants: `dec("12.5")`.
#[cfg(test)]
pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).expect("valid decimal literal")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addition_and_subtraction_are_exact() {
        assert_eq!(dec("0.1") + dec("0.2"), dec("0.3"));
        assert_eq!(dec("100") - dec("99.99999999"), dec("0.00000001"));
    }

    #[test]
    fn test_division_rounds_to_eight_digits() {
        assert_eq!(dec("1000").checked_div(&dec("3")).unwrap(), dec("333.33333333"));
        assert_eq!(dec("2").checked_div(&dec("3")).unwrap(), dec("0.66666667"));
        assert!(dec("1").checked_div(&Decimal::zero()).is_none());
    }

    #[test]
    fn test_bankers_rounding_on_ties() {
        // 0.000000025 sits exactly between ...02 and ...03
        assert_eq!(dec("0.000000025"), dec("0.00000002"));
        assert_eq!(dec("0.000000035"), dec("0.00000004"));
        assert_eq!(dec("-0.000000025"), dec("-0.00000002"));
        assert_eq!(dec("-0.000000035"), dec("-0.00000004"));
        assert_eq!(dec("0.0000000251"), dec("0.00000003"));
    }

    #[test]
    fn test_round_dp() {
        assert_eq!(dec("2.345").round_dp(2), dec("2.34"));
        assert_eq!(dec("2.355").round_dp(2), dec("2.36"));
        assert_eq!(dec("2.3551").round_dp(2), dec("2.36"));
    }

    #[test]
    fn test_multiplication() {
        assert_eq!(dec("0.5") * dec("100"), dec("50"));
        assert_eq!(dec("1.23456789") * dec("0.1"), dec("0.12345679"));
    }

    #[test]
    fn test_predicates() {
        assert!(Decimal::zero().is_zero());
        assert!(dec("-1").is_negative());
        assert!(dec("1").is_positive());
        assert_eq!(dec("-4.5").abs(), dec("4.5"));
        assert!(dec("999999999999.99999999").fits_storage());
        assert!(!dec("1000000000000").fits_storage());
    }

    #[test]
    fn test_display_trims_trailing_zeros() {
        assert_eq!(dec("150").to_string(), "150");
        assert_eq!(dec("0.50").to_string(), "0.5");
        assert_eq!(dec("-12.34000").to_string(), "-12.34");
        assert_eq!(Decimal::zero().to_string(), "0");
    }

    #[test]
    fn test_json_is_a_string() {
        let json = serde_json::to_string(&dec("12.5")).unwrap();
        assert_eq!(json, "\"12.5\"");

        let parsed: Decimal = serde_json::from_str("\"0.00000001\"").unwrap();
        assert_eq!(parsed, dec("0.00000001"));

        let from_number: Decimal = serde_json::from_str("42").unwrap();
        assert_eq!(from_number, dec("42"));
    }

    #[test]
    fn test_sum() {
        let values = vec![dec("1.5"), dec("2.25"), dec("3")];
        let total: Decimal = values.iter().sum();
        assert_eq!(total, dec("6.75"));
    }
}
