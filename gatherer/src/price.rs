//! Fixed-point price representation.
//!
//! Prices are stored as integer hundred-thousandths of a dollar in
//! `[0, 100000]`, never as floating point, so that parsing and formatting a
//! dollar string round-trips exactly.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PriceError {
    #[error("price string '{0}' is not a valid decimal")]
    InvalidFormat(String),
    #[error("price string '{0}' has more than 6 fractional digits")]
    TooManyFractionalDigits(String),
    #[error("price {0} is out of range [0, 100000]")]
    OutOfRange(i64),
}

/// A price in hundred-thousandths of a dollar, e.g. `Price(55000)` is $0.55.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Price(i32);

const SCALE: i64 = 100_000;
const MAX: i64 = 100_000;

impl Price {
    pub fn from_scaled(value: i32) -> Result<Self, PriceError> {
        if (0..=MAX as i32).contains(&value) {
            Ok(Price(value))
        } else {
            Err(PriceError::OutOfRange(value as i64))
        }
    }

    pub fn scaled(&self) -> i32 {
        self.0
    }

    /// Parse a dollar-denominated decimal string (e.g. `"0.55"`, `"1"`,
    /// `"0.12345"`) into its exact fixed-point representation. Never routes
    /// through `f64`. A sixth fractional digit is accepted and rounded into
    /// the fifth with round-half-to-even; a seventh or later digit is
    /// rejected outright.
    pub fn parse_dollars(input: &str) -> Result<Self, PriceError> {
        let trimmed = input.trim();
        let (whole, frac) = match trimmed.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (trimmed, ""),
        };

        if frac.len() > 6 {
            return Err(PriceError::TooManyFractionalDigits(trimmed.to_string()));
        }
        if whole.is_empty() && frac.is_empty() {
            return Err(PriceError::InvalidFormat(trimmed.to_string()));
        }

        let mut whole_value: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| PriceError::InvalidFormat(trimmed.to_string()))?
        };

        let mut frac_value = if frac.len() == 6 {
            let six_digits: i64 = frac.parse().map_err(|_| PriceError::InvalidFormat(trimmed.to_string()))?;
            round_half_to_even(six_digits)
        } else {
            let padded_frac = format!("{frac:0<5}");
            padded_frac.parse().map_err(|_| PriceError::InvalidFormat(trimmed.to_string()))?
        };

        if frac_value == SCALE {
            frac_value = 0;
            whole_value += 1;
        }

        let scaled = whole_value
            .checked_mul(SCALE)
            .and_then(|v| v.checked_add(frac_value))
            .ok_or_else(|| PriceError::InvalidFormat(trimmed.to_string()))?;

        if !(0..=MAX).contains(&scaled) {
            return Err(PriceError::OutOfRange(scaled));
        }

        Ok(Price(scaled as i32))
    }

    /// Render as a dollar string with exactly five fractional digits
    /// trimmed of trailing zeros (but never below two digits, matching
    /// currency display conventions).
    pub fn to_dollars(&self) -> String {
        let whole = self.0 as i64 / SCALE;
        let frac = self.0 as i64 % SCALE;
        let frac_str = format!("{frac:05}");
        let trimmed = frac_str.trim_end_matches('0');
        let frac_display = if trimmed.len() < 2 { &frac_str[..2] } else { trimmed };
        format!("{whole}.{frac_display}")
    }
}

/// Round a 6-digit fractional value (`0..=999999`) down to 5 digits,
/// breaking exact half-cent ties toward the even neighbor. May return
/// `SCALE` (100_000) when the input rounds up past `0.999995`.
fn round_half_to_even(six_digits: i64) -> i64 {
    let quotient = six_digits / 10;
    let remainder = six_digits % 10;
    match remainder.cmp(&5) {
        std::cmp::Ordering::Less => quotient,
        std::cmp::Ordering::Greater => quotient + 1,
        std::cmp::Ordering::Equal if quotient % 2 == 0 => quotient,
        std::cmp::Ordering::Equal => quotient + 1,
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_dollars())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dollars() {
        struct TestCase {
            input: &'static str,
            expected: Result<i32, PriceError>,
        }

        let tests = vec![
            TestCase {
                // TC0: whole dollar
                input: "1",
                expected: Ok(100_000),
            },
            TestCase {
                // TC1: half dollar
                input: "0.5",
                expected: Ok(50_000),
            },
            TestCase {
                // TC2: full five fractional digits
                input: "0.12345",
                expected: Ok(12_345),
            },
            TestCase {
                // TC3: seven fractional digits rejected
                input: "0.1234567",
                expected: Err(PriceError::TooManyFractionalDigits("0.1234567".into())),
            },
            TestCase {
                // TC4: above max
                input: "1.00001",
                expected: Err(PriceError::OutOfRange(100_001)),
            },
            TestCase {
                // TC5: zero
                input: "0",
                expected: Ok(0),
            },
            TestCase {
                // TC6: garbage input
                input: "abc",
                expected: Err(PriceError::InvalidFormat("abc".into())),
            },
            TestCase {
                // TC7: exact half-cent at the 6th digit rounds to the even
                // neighbor, here rolling over into the next whole dollar
                input: "0.999995",
                expected: Ok(100_000),
            },
            TestCase {
                // TC8: exact half-cent rounding down to an even neighbor
                input: "0.123425",
                expected: Ok(12_342),
            },
            TestCase {
                // TC9: exact half-cent rounding up to an even neighbor
                input: "0.123435",
                expected: Ok(12_344),
            },
            TestCase {
                // TC10: sixth digit below the halfway point truncates down
                input: "0.123421",
                expected: Ok(12_342),
            },
            TestCase {
                // TC11: sixth digit above the halfway point rounds up
                input: "0.123429",
                expected: Ok(12_343),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = Price::parse_dollars(test.input).map(|p| p.scaled());
            assert_eq!(actual, test.expected, "TC{index} failed");
        }
    }

    #[test]
    fn test_to_dollars_round_trips() {
        struct TestCase {
            input: &'static str,
            expected: &'static str,
        }

        let tests = vec![
            TestCase { input: "1", expected: "1.00" },
            TestCase { input: "0.5", expected: "0.50" },
            TestCase { input: "0.12345", expected: "0.12345" },
            TestCase { input: "0", expected: "0.00" },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let price = Price::parse_dollars(test.input).unwrap();
            assert_eq!(price.to_dollars(), test.expected, "TC{index} failed");
        }
    }
}
