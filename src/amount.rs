//! Fixed-point currency amounts
//!
//! All balances and accrual math use micro-units (1 unit = 1_000_000 micros)
//! so that multi-day sessions never accumulate floating point drift.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Micro-units per whole unit.
pub const MICROS_PER_UNIT: u64 = 1_000_000;

/// Number of decimal places carried by [`Amount`].
pub const DECIMALS: usize = 6;

const MS_PER_DAY: u128 = 86_400_000;

/// Multiplier expressed in basis points (10_000 = 1x).
pub const BPS_ONE: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountParseError {
    #[error("empty amount")]
    Empty,
    #[error("invalid amount: {0}")]
    Invalid(String),
    #[error("too many decimal places (max 6): {0}")]
    TooPrecise(String),
    #[error("amount out of range: {0}")]
    Overflow(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("amount {0} exceeds the storable range")]
pub struct AmountOutOfRange(pub Amount);

/// Non-negative fixed-point amount of the mined currency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    pub const fn from_units(units: u64) -> Self {
        Self(units * MICROS_PER_UNIT)
    }

    pub const fn micros(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }

    /// Lossy conversion for display and USD pricing.
    pub fn as_f64(self) -> f64 {
        self.0 as f64 / MICROS_PER_UNIT as f64
    }

    /// Database representation (BIGINT / INTEGER columns).
    pub fn to_db(self) -> Result<i64, AmountOutOfRange> {
        i64::try_from(self.0).map_err(|_| AmountOutOfRange(self))
    }

    /// Negative values read from storage clamp to zero.
    pub fn from_db(value: i64) -> Self {
        Self(u64::try_from(value).unwrap_or(0))
    }

    /// Amount accrued at `daily_rate` scaled by `multiplier_bps` over
    /// `elapsed_ms` milliseconds. Rounds down, so the result is monotone in
    /// `elapsed_ms` and identical for identical inputs.
    pub fn accrued(daily_rate: Amount, multiplier_bps: u32, elapsed_ms: i64) -> Amount {
        if elapsed_ms <= 0 {
            return Amount::ZERO;
        }
        let numerator = daily_rate.0 as u128 * multiplier_bps as u128 * elapsed_ms as u128;
        let denominator = MS_PER_DAY * BPS_ONE as u128;
        Amount(u64::try_from(numerator / denominator).unwrap_or(u64::MAX))
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, Amount::saturating_add)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / MICROS_PER_UNIT;
        let frac = self.0 % MICROS_PER_UNIT;
        if frac == 0 {
            return write!(f, "{}", whole);
        }
        let frac = format!("{:06}", frac);
        write!(f, "{}.{}", whole, frac.trim_end_matches('0'))
    }
}

impl FromStr for Amount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AmountParseError::Empty);
        }

        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        let digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty()) || !digits(whole) || !digits(frac) {
            return Err(AmountParseError::Invalid(s.to_string()));
        }
        if frac.len() > DECIMALS {
            return Err(AmountParseError::TooPrecise(s.to_string()));
        }

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| AmountParseError::Overflow(s.to_string()))?
        };
        let frac_micros: u64 = if frac.is_empty() {
            0
        } else {
            format!("{:0<width$}", frac, width = DECIMALS)
                .parse()
                .map_err(|_| AmountParseError::Invalid(s.to_string()))?
        };

        whole
            .checked_mul(MICROS_PER_UNIT)
            .and_then(|w| w.checked_add(frac_micros))
            .map(Amount)
            .ok_or_else(|| AmountParseError::Overflow(s.to_string()))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Whole(u64),
            Float(f64),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Text(s) => s.parse().map_err(de::Error::custom),
            Repr::Whole(n) => n
                .checked_mul(MICROS_PER_UNIT)
                .map(Amount)
                .ok_or_else(|| de::Error::custom("amount out of range")),
            Repr::Float(f) => {
                if !f.is_finite() || f < 0.0 {
                    return Err(de::Error::custom("amount must be a non-negative number"));
                }
                Ok(Amount((f * MICROS_PER_UNIT as f64).round() as u64))
            }
        }
    }
}
