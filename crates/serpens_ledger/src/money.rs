//! # Fixed-Point Money
//!
//! **NO FLOATING POINT IN BALANCES OR FEES**
//!
//! Every balance, deposit, withdrawal and fee in the ledger is a [`Money`]:
//! a u64 holding the amount in millionths of a currency unit.
//!
//! ## Why Fixed-Point?
//!
//! - Deterministic: 100 × 1.03 is exactly 103, on every machine
//! - Exact reversals: a rejected withdrawal refunds the same integer it debited
//! - Auditable: fee + credit always sums back to the deposit amount
//!
//! ## Wire Format
//!
//! Serialized as a decimal string (`"103.00"`), so ledger snapshots and TOML
//! configs stay readable and lossless.

use std::fmt;
use std::iter::Sum;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{LedgerError, LedgerResult};

/// Number of decimal places.
const DECIMAL_PLACES: u32 = 6;

/// The multiplier for 6 decimal places.
const MULTIPLIER: u64 = 10u64.pow(DECIMAL_PLACES);

/// Basis points in 100%.
pub const BASIS_POINTS: u32 = 10_000;

/// Fixed-point currency amount with 6 decimal places.
///
/// Internally stores value * 1,000,000 as a u64.
///
/// # Range
///
/// - Minimum: 0.000000
/// - Maximum: 18,446,744,073,709.551615
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero value.
    pub const ZERO: Self = Self(0);

    /// One unit (1.000000).
    pub const ONE: Self = Self(MULTIPLIER);

    /// Maximum representable value.
    pub const MAX: Self = Self(u64::MAX);

    /// Creates an amount from a whole number of units.
    ///
    /// ```rust,ignore
    /// let hundred = Money::from_whole(100); // 100.00
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `whole` exceeds [`Money::MAX`]'s whole part. Use
    /// [`try_from_whole`](Self::try_from_whole) for untrusted input.
    #[inline]
    #[must_use]
    pub const fn from_whole(whole: u64) -> Self {
        match Self::try_from_whole(whole) {
            Some(value) => value,
            None => panic!("Money::from_whole overflow"),
        }
    }

    /// Creates an amount from whole units and cents.
    ///
    /// ```rust,ignore
    /// let price = Money::from_cents(10_250); // 102.50
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the amount does not fit. Use
    /// [`try_from_cents`](Self::try_from_cents) for untrusted input.
    #[inline]
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        match Self::try_from_cents(cents) {
            Some(value) => value,
            None => panic!("Money::from_cents overflow"),
        }
    }

    /// Checked [`from_whole`](Self::from_whole). Returns `None` on overflow.
    #[inline]
    #[must_use]
    pub const fn try_from_whole(whole: u64) -> Option<Self> {
        match whole.checked_mul(MULTIPLIER) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Checked [`from_cents`](Self::from_cents). Returns `None` on overflow.
    #[inline]
    #[must_use]
    pub const fn try_from_cents(cents: u64) -> Option<Self> {
        match cents.checked_mul(MULTIPLIER / 100) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Creates an amount from its raw millionths.
    #[inline]
    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Returns the raw value in millionths.
    #[inline]
    #[must_use]
    pub const fn micros(self) -> u64 {
        self.0
    }

    /// Returns the whole number part.
    #[inline]
    #[must_use]
    pub const fn whole(self) -> u64 {
        self.0 / MULTIPLIER
    }

    /// Returns the fractional part in millionths (0-999999).
    #[inline]
    #[must_use]
    pub const fn fraction(self) -> u32 {
        (self.0 % MULTIPLIER) as u32
    }

    /// Returns true if this amount is zero.
    #[inline]
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Checked addition. Returns `None` on overflow.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Checked subtraction. Returns `None` on underflow.
    #[inline]
    #[must_use]
    pub const fn checked_sub(self, rhs: Self) -> Option<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Multiplies by a percentage expressed in basis points (100 = 1%).
    ///
    /// Truncates toward zero, so `x - x.mul_bp(fee)` never exceeds `x`.
    ///
    /// ```rust,ignore
    /// let fee = Money::from_whole(100).mul_bp(300); // 3.00
    /// ```
    #[inline]
    #[must_use]
    pub const fn mul_bp(self, basis_points: u32) -> Self {
        // u128 avoids overflow during the multiplication
        let result = (self.0 as u128 * basis_points as u128) / BASIS_POINTS as u128;
        Self(result as u64)
    }

    /// Safe addition with error on overflow.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::ArithmeticOverflow` if the addition would overflow.
    #[inline]
    pub fn safe_add(self, rhs: Self) -> LedgerResult<Self> {
        self.checked_add(rhs).ok_or(LedgerError::ArithmeticOverflow)
    }

    /// Safe subtraction with error on underflow.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::ArithmeticOverflow` if the subtraction would underflow.
    #[inline]
    pub fn safe_sub(self, rhs: Self) -> LedgerResult<Self> {
        self.checked_sub(rhs).ok_or(LedgerError::ArithmeticOverflow)
    }

    /// Adds a basis-point surcharge: `self × (1 + bp / 10000)`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::ArithmeticOverflow` if the result does not fit.
    #[inline]
    pub fn with_surcharge_bp(self, basis_points: u32) -> LedgerResult<Self> {
        self.safe_add(self.mul_bp(basis_points))
    }
}

impl fmt::Debug for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Money({self})")
    }
}

impl fmt::Display for Money {
    /// Shortest exact form with at least two decimals: `5.00`, `1.015`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = format!("{:06}", self.fraction());
        let trimmed = digits.trim_end_matches('0');
        let decimals = if trimmed.len() < 2 { &digits[..2] } else { trimmed };
        write!(f, "{}.{}", self.whole(), decimals)
    }
}

impl FromStr for Money {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LedgerError::InvalidConfig(format!("not a currency amount: {s:?}"));
        let s = s.trim();
        let (whole, frac) = s.split_once('.').unwrap_or((s, ""));

        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if frac.len() > DECIMAL_PLACES as usize || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let whole: u64 = whole.parse().map_err(|_| invalid())?;
        let mut micros: u64 = 0;
        for (i, b) in frac.bytes().enumerate() {
            micros += u64::from(b - b'0') * 10u64.pow(DECIMAL_PLACES - 1 - i as u32);
        }

        whole
            .checked_mul(MULTIPLIER)
            .and_then(|w| w.checked_add(micros))
            .map(Self)
            .ok_or(LedgerError::ArithmeticOverflow)
    }
}

impl Sum for Money {
    /// Saturating sum, used for read-only reports.
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, m| Self(acc.0.saturating_add(m.0)))
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MoneyVisitor;

        impl Visitor<'_> for MoneyVisitor {
            type Value = Money;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a decimal string such as \"5.00\" or a whole number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Money, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Money, E> {
                Money::try_from_whole(v).ok_or_else(|| E::custom("amount overflows"))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Money, E> {
                let v = u64::try_from(v).map_err(|_| E::custom("amount must not be negative"))?;
                self.visit_u64(v)
            }
        }

        deserializer.deserialize_any(MoneyVisitor)
    }
}
