// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Fixed-scale monetary amounts.
//!
//! [`Money`] wraps a [`Decimal`] that is always normalized to exactly two
//! fractional digits and is never negative. Arithmetic is checked: a
//! subtraction that would go below zero yields `None` instead of a value, so
//! a negative balance cannot be constructed.
//!
//! # Example
//!
//! ```
//! use balance_ledger::Money;
//!
//! let balance = Money::parse("10.5").unwrap();
//! let stake = Money::parse_positive("20.00").unwrap();
//! assert_eq!(balance.to_string(), "10.50");
//! assert!(balance.checked_sub(stake).is_none());
//! ```

use crate::error::FormatError;
use rust_decimal::Decimal;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A non-negative amount with exactly two fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(Decimal);

impl Money {
    /// Number of fractional digits carried by every amount.
    pub const SCALE: u32 = 2;

    pub const ZERO: Money = Money(Decimal::from_parts(0, 0, 0, false, Self::SCALE));

    /// Builds an amount from a count of minor units (cents).
    pub fn from_minor(cents: u64) -> Self {
        Self(Decimal::from_i128_with_scale(i128::from(cents), Self::SCALE))
    }

    /// Wraps a decimal, rejecting negatives and anything finer than a cent.
    pub fn from_decimal(value: Decimal) -> Result<Self, FormatError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(FormatError::Negative(value.to_string()));
        }
        if value.normalize().scale() > Self::SCALE {
            return Err(FormatError::TooManyFractionDigits(value.to_string()));
        }
        Self::with_cents(value).ok_or_else(|| FormatError::OutOfRange(value.to_string()))
    }

    /// Parses a plain decimal string (`"10"`, `"10.5"`, `"10.50"`).
    ///
    /// Signs, exponents, digit separators and surrounding whitespace are all
    /// rejected, as is any string with more than two characters after the
    /// decimal point.
    pub fn parse(s: &str) -> Result<Self, FormatError> {
        if s.starts_with('-') {
            return Err(FormatError::Negative(s.to_string()));
        }

        let (whole, fraction) = match s.split_once('.') {
            Some((whole, fraction)) => (whole, Some(fraction)),
            None => (s, None),
        };
        let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(whole) || !fraction.is_none_or(all_digits) {
            return Err(FormatError::Invalid(s.to_string()));
        }
        if fraction.is_some_and(|f| f.len() > Self::SCALE as usize) {
            return Err(FormatError::TooManyFractionDigits(s.to_string()));
        }

        // Decimal rounds away digits it cannot hold instead of failing.
        let value = Decimal::from_str(s).map_err(|_| FormatError::OutOfRange(s.to_string()))?;
        Self::with_cents(value).ok_or_else(|| FormatError::OutOfRange(s.to_string()))
    }

    /// Parses an amount that must be strictly greater than zero.
    pub fn parse_positive(s: &str) -> Result<Self, FormatError> {
        let amount = Self::parse(s)?;
        if !amount.is_positive() {
            return Err(FormatError::NotPositive(s.to_string()));
        }
        Ok(amount)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Returns `true` when the amount is zero or above.
    pub fn is_non_negative(&self) -> bool {
        !self.0.is_sign_negative() || self.0.is_zero()
    }

    /// `self + other`, or `None` on overflow.
    pub fn checked_add(self, other: Money) -> Option<Money> {
        // Near its limit Decimal trades scale for range; losing cents is overflow.
        Self::with_cents(self.0.checked_add(other.0)?)
    }

    /// `self - other`, or `None` when the result would be negative.
    pub fn checked_sub(self, other: Money) -> Option<Money> {
        if other > self {
            return None;
        }
        self.0.checked_sub(other.0).map(Self::normalized)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    fn normalized(mut value: Decimal) -> Self {
        value.rescale(Self::SCALE);
        Self(value)
    }

    /// Rescales to cents, or `None` if the value is too large to carry them.
    fn with_cents(value: Decimal) -> Option<Self> {
        let money = Self::normalized(value);
        (money.0.scale() == Self::SCALE).then_some(money)
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Money {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Money {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Money::parse(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parse_normalizes_to_two_places() {
        assert_eq!(Money::parse("10").unwrap().to_string(), "10.00");
        assert_eq!(Money::parse("10.5").unwrap().to_string(), "10.50");
        assert_eq!(Money::parse("10.50").unwrap().to_string(), "10.50");
        assert_eq!(Money::parse("0").unwrap(), Money::ZERO);
    }

    #[test]
    fn parse_rejects_malformed_input() {
        for input in ["", ".", "1.", ".5", "abc", "1.2.3", " 1", "1 ", "+1", "1e2", "1_000"] {
            assert_eq!(
                Money::parse(input),
                Err(FormatError::Invalid(input.to_string())),
                "input {input:?}"
            );
        }
    }

    #[test]
    fn parse_rejects_more_than_two_fraction_digits() {
        assert_eq!(
            Money::parse("1.234"),
            Err(FormatError::TooManyFractionDigits("1.234".to_string()))
        );
        // Counted as written, not after trimming zeros.
        assert!(Money::parse("1.230").is_err());
    }

    #[test]
    fn parse_rejects_amounts_too_large_for_cents() {
        for input in [
            "10000000000000000000000000000.01",
            "7922816251426433759354395033.99",
            "79228162514264337593543950335",
            "792281625142643375935439503350000",
        ] {
            assert_eq!(
                Money::parse(input),
                Err(FormatError::OutOfRange(input.to_string())),
                "input {input:?}"
            );
        }
    }

    #[test]
    fn parse_keeps_largest_amounts_with_cents() {
        let input = "792281625142643375935439503.35";
        let money = Money::parse(input).unwrap();
        assert_eq!(money.to_string(), input);
        assert_eq!(money.as_decimal().scale(), Money::SCALE);
    }

    #[test]
    fn parse_rejects_negative() {
        assert_eq!(
            Money::parse("-5.00"),
            Err(FormatError::Negative("-5.00".to_string()))
        );
    }

    #[test]
    fn parse_positive_rejects_zero() {
        assert_eq!(
            Money::parse_positive("0.00"),
            Err(FormatError::NotPositive("0.00".to_string()))
        );
        assert!(Money::parse_positive("0.01").is_ok());
    }

    #[test]
    fn checked_sub_refuses_to_go_negative() {
        let balance = Money::parse("10.50").unwrap();
        assert_eq!(
            balance.checked_sub(Money::parse("10.50").unwrap()),
            Some(Money::ZERO)
        );
        assert_eq!(balance.checked_sub(Money::parse("10.51").unwrap()), None);
    }

    #[test]
    fn repeated_addition_does_not_drift() {
        let cent = Money::from_minor(1);
        let mut total = Money::ZERO;
        for _ in 0..10_000 {
            total = total.checked_add(cent).unwrap();
        }
        assert_eq!(total, Money::from_minor(10_000));
        assert_eq!(total.to_string(), "100.00");
    }

    #[test]
    fn checked_add_reports_overflow() {
        let max = Money::normalized(Decimal::MAX.trunc() / dec!(1000));
        let mut total = max;
        let mut overflowed = false;
        for _ in 0..2000 {
            match total.checked_add(max) {
                Some(next) => total = next,
                None => {
                    overflowed = true;
                    break;
                }
            }
        }
        assert!(overflowed);
    }

    #[test]
    fn from_decimal_validates() {
        assert_eq!(Money::from_decimal(dec!(1.5)).unwrap().to_string(), "1.50");
        assert_eq!(Money::from_decimal(dec!(1.500)).unwrap().to_string(), "1.50");
        assert!(Money::from_decimal(dec!(1.505)).is_err());
        assert!(Money::from_decimal(dec!(-1)).is_err());
    }

    #[test]
    fn predicates() {
        assert!(!Money::ZERO.is_positive());
        assert!(Money::ZERO.is_non_negative());
        assert!(Money::from_minor(1).is_positive());
    }

    #[test]
    fn serializes_as_fixed_string() {
        let json = serde_json::to_string(&Money::parse("3").unwrap()).unwrap();
        assert_eq!(json, "\"3.00\"");

        let parsed: Money = serde_json::from_str("\"7.25\"").unwrap();
        assert_eq!(parsed, Money::from_minor(725));
        assert!(serde_json::from_str::<Money>("\"7.255\"").is_err());
    }

    #[test]
    fn ordering_is_numeric() {
        assert!(Money::parse("9.99").unwrap() < Money::parse("10").unwrap());
    }
}
