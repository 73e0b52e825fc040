//! Utility types for payment message handling.
//!
//! - [`Base64Bytes`] - Base64 text wrapper used by the envelope codec
//! - [`MoneyAmount`] - Human-readable currency amounts

pub mod b64;
pub mod money_amount;

pub use b64::*;
pub use money_amount::*;
