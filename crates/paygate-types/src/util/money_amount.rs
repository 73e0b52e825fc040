//! Human-readable price parsing.
//!
//! Operators configure prices the way people write them (`"$0.01"`,
//! `"1,000.50"`). [`MoneyAmount`] parses those strings into an exact decimal
//! and converts them into the integer atomic units a token settles in.
//!
//! ```rust
//! use paygate_types::util::MoneyAmount;
//!
//! let amount = MoneyAmount::parse("$10.50").unwrap();
//! assert_eq!(amount.to_atomic(6).unwrap().to_string(), "10500000");
//! ```

use alloy_primitives::U256;
use regex::Regex;
use rust_decimal::Decimal;
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::proto::AtomicAmount;

/// A non-negative decimal price with its original precision.
#[derive(Debug, Clone, PartialEq)]
pub struct MoneyAmount(pub Decimal);

/// Errors that can occur when parsing or converting a price.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum MoneyAmountParseError {
    /// The input string could not be parsed as a number.
    #[error("Invalid number format")]
    InvalidFormat,
    /// The value is above the accepted price ceiling.
    #[error("Amount must not exceed {}", MAX_STR)]
    OutOfRange,
    /// Negative values are not allowed.
    #[error("Negative value is not allowed")]
    Negative,
    /// The input has more decimal places than the token supports.
    #[error("Too big of a precision: {money} vs {token} on token")]
    WrongPrecision {
        /// Decimal places in the input.
        money: u32,
        /// Decimal places supported by the token.
        token: u32,
    },
    /// The atomic value does not fit into 256 bits.
    #[error("Amount overflows 256-bit atomic units at {decimals} decimals")]
    Overflow { decimals: u32 },
}

const MAX_STR: &str = "999999999";

static MAX: LazyLock<Decimal> =
    LazyLock::new(|| Decimal::from_str(MAX_STR).expect("valid decimal"));

// Currency symbols, thousand separators and whitespace.
static DECORATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s,_$€£¥]+").expect("valid regex"));

impl MoneyAmount {
    /// Parses a human-readable price.
    ///
    /// Currency symbols, thousand separators and whitespace are stripped
    /// before parsing. Anything else that is not part of a plain decimal
    /// number (exponents, hex prefixes, stray letters) is rejected.
    pub fn parse(input: &str) -> Result<Self, MoneyAmountParseError> {
        let cleaned = DECORATION.replace_all(input, "");
        if cleaned.is_empty() {
            return Err(MoneyAmountParseError::InvalidFormat);
        }
        let parsed =
            Decimal::from_str(&cleaned).map_err(|_| MoneyAmountParseError::InvalidFormat)?;
        if parsed.is_sign_negative() && !parsed.is_zero() {
            return Err(MoneyAmountParseError::Negative);
        }
        if parsed > *MAX {
            return Err(MoneyAmountParseError::OutOfRange);
        }
        Ok(MoneyAmount(parsed.normalize()))
    }

    /// Number of significant decimal places.
    pub fn scale(&self) -> u32 {
        self.0.scale()
    }

    /// The value with the decimal point removed, e.g. `12.34` gives `1234`.
    pub fn mantissa(&self) -> u128 {
        self.0.mantissa().unsigned_abs()
    }

    /// Converts the price into atomic units of a token with `decimals` places.
    pub fn to_atomic(&self, decimals: u32) -> Result<AtomicAmount, MoneyAmountParseError> {
        let scale = self.scale();
        if scale > decimals {
            return Err(MoneyAmountParseError::WrongPrecision {
                money: scale,
                token: decimals,
            });
        }
        let overflow = MoneyAmountParseError::Overflow { decimals };
        let multiplier = U256::from(10u8)
            .checked_pow(U256::from(decimals - scale))
            .ok_or(overflow.clone())?;
        let atomic = U256::from(self.mantissa())
            .checked_mul(multiplier)
            .ok_or(overflow)?;
        Ok(AtomicAmount(atomic))
    }
}

impl FromStr for MoneyAmount {
    type Err = MoneyAmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MoneyAmount::parse(s)
    }
}

impl Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_currency_decoration() {
        assert_eq!(MoneyAmount::parse("$1,000.50").unwrap().to_string(), "1000.5");
        assert_eq!(MoneyAmount::parse(" € 20 ").unwrap().to_string(), "20");
    }

    #[test]
    fn rejects_non_decimal_input() {
        assert_eq!(MoneyAmount::parse("1e5"), Err(MoneyAmountParseError::InvalidFormat));
        assert_eq!(MoneyAmount::parse("0x10"), Err(MoneyAmountParseError::InvalidFormat));
        assert_eq!(MoneyAmount::parse("$"), Err(MoneyAmountParseError::InvalidFormat));
        assert_eq!(MoneyAmount::parse("-1"), Err(MoneyAmountParseError::Negative));
        assert_eq!(
            MoneyAmount::parse("1000000000"),
            Err(MoneyAmountParseError::OutOfRange)
        );
    }

    #[test]
    fn converts_to_atomic_units() {
        let amount = MoneyAmount::parse("0.01").unwrap();
        assert_eq!(amount.to_atomic(6).unwrap(), AtomicAmount::from(10_000u64));
        // trailing zeros do not count against token precision
        let padded = MoneyAmount::parse("1.500000000").unwrap();
        assert_eq!(padded.to_atomic(1).unwrap(), AtomicAmount::from(15u64));
    }

    #[test]
    fn rejects_excess_precision() {
        let amount = MoneyAmount::parse("0.0000001").unwrap();
        assert_eq!(
            amount.to_atomic(6),
            Err(MoneyAmountParseError::WrongPrecision { money: 7, token: 6 })
        );
    }

    #[test]
    fn rejects_overflowing_decimals() {
        let amount = MoneyAmount::parse("999999999").unwrap();
        assert_eq!(
            amount.to_atomic(78),
            Err(MoneyAmountParseError::Overflow { decimals: 78 })
        );
    }
}
