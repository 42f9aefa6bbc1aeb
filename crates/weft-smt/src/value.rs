//! Numeric decoding of solver value text.
//!
//! Backends evaluate model variables to text: plain decimal literals or
//! `num/den` rationals. Decoding is pure; failure is an explicit
//! [`Decoded::Invalid`] rather than a sentinel float, so persisted timing
//! fields always carry their own validity.

use num::bigint::BigInt;
use num::rational::BigRational;
use num::traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

/// A decoded solver value: either a usable decimal or explicitly invalid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Decoded {
    Value(f64),
    Invalid,
}

impl Decoded {
    pub fn value(&self) -> Option<f64> {
        match self {
            Decoded::Value(v) => Some(*v),
            Decoded::Invalid => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Decoded::Value(_))
    }

    /// Legacy rendering: `-1` stands for "value could not be recovered".
    /// For log text only; never persist the sentinel without the enum.
    pub fn to_sentinel(&self) -> f64 {
        match self {
            Decoded::Value(v) => *v,
            Decoded::Invalid => -1.0,
        }
    }
}

impl std::fmt::Display for Decoded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_sentinel())
    }
}

/// Decode solver value text into a decimal.
///
/// Text with a single `/` is treated as `numerator/denominator`; both sides
/// are parsed as arbitrary-precision decimals and divided exactly before
/// narrowing to `f64`. Anything else is parsed as a float literal. Any
/// parse failure (or a zero denominator) yields [`Decoded::Invalid`].
pub fn decode(text: &str) -> Decoded {
    let text = text.trim();
    if text.matches('/').count() == 1 {
        let (num, den) = match text.split_once('/') {
            Some(parts) => parts,
            None => return Decoded::Invalid,
        };
        let (num, den) = match (parse_decimal(num), parse_decimal(den)) {
            (Some(n), Some(d)) => (n, d),
            _ => return Decoded::Invalid,
        };
        if den.is_zero() {
            return Decoded::Invalid;
        }
        match (num / den).to_f64() {
            Some(v) if v.is_finite() => Decoded::Value(v),
            _ => Decoded::Invalid,
        }
    } else {
        match text.parse::<f64>() {
            Ok(v) if v.is_finite() => Decoded::Value(v),
            _ => Decoded::Invalid,
        }
    }
}

/// Parse a decimal literal (`-12.75`) into an exact rational.
fn parse_decimal(text: &str) -> Option<BigRational> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let mut numer: BigInt = format!("{int_part}{frac_part}")
        .parse()
        .unwrap_or_else(|_| BigInt::from(0));
    if negative {
        numer = -numer;
    }
    let denom = BigInt::from(10u32).pow(frac_part.len() as u32);
    Some(BigRational::new(numer, denom))
}
