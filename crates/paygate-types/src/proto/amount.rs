//! Maximum amounts in the smallest unit of an asset.

use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A non-negative integer amount of atomic units, carried on the wire as a
/// decimal string (`"10000"`).
///
/// Only plain ASCII digits are accepted: no sign, no fraction, no exponent,
/// no hex prefix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AtomicAmount(pub U256);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AtomicAmountParseError {
    #[error("atomic amount is empty")]
    Empty,
    #[error("atomic amount {0:?} is not a non-negative integer")]
    NotAnInteger(String),
    #[error("atomic amount {0:?} does not fit into 256 bits")]
    Overflow(String),
}

impl AtomicAmount {
    pub const ZERO: AtomicAmount = AtomicAmount(U256::ZERO);

    pub fn as_u256(&self) -> U256 {
        self.0
    }
}

impl FromStr for AtomicAmount {
    type Err = AtomicAmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(AtomicAmountParseError::Empty);
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AtomicAmountParseError::NotAnInteger(s.to_string()));
        }
        U256::from_str_radix(s, 10)
            .map(AtomicAmount)
            .map_err(|_| AtomicAmountParseError::Overflow(s.to_string()))
    }
}

impl fmt::Display for AtomicAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<U256> for AtomicAmount {
    fn from(value: U256) -> Self {
        AtomicAmount(value)
    }
}

impl From<u64> for AtomicAmount {
    fn from(value: u64) -> Self {
        AtomicAmount(U256::from(value))
    }
}

impl From<u128> for AtomicAmount {
    fn from(value: u128) -> Self {
        AtomicAmount(U256::from(value))
    }
}

impl Serialize for AtomicAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AtomicAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
