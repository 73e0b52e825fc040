//! Configuration values that may come from the environment.
//!
//! Facilitator URLs and API keys tend to differ per deployment and should not
//! live in checked-in files. Any string field wrapped in [`LiteralOrEnv`]
//! accepts either the value itself or a reference to an environment variable:
//!
//! ```json
//! {
//!   "url": "https://facilitator.example.com",
//!   "headers": { "authorization": "${FACILITATOR_TOKEN}" },
//!   "fallbackUrl": "$FALLBACK_FACILITATOR_URL"
//! }
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::Display;
use std::ops::Deref;
use std::str::FromStr;

/// A value given literally or as `$VAR` / `${VAR}`, resolved once at
/// deserialization time and parsed into `T`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(T);

impl<T> LiteralOrEnv<T> {
    pub fn from_literal(value: T) -> Self {
        Self(value)
    }

    pub fn inner(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

/// Returns the variable name if `raw` is an environment reference.
fn env_reference(raw: &str) -> Option<&str> {
    if let Some(braced) = raw.strip_prefix("${").and_then(|r| r.strip_suffix('}')) {
        return (!braced.is_empty()).then_some(braced);
    }
    let bare = raw.strip_prefix('$')?;
    let valid = !bare.is_empty() && bare.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some(bare)
}

/// Resolves `raw` against the process environment.
fn resolve(raw: String) -> Result<String, String> {
    match env_reference(&raw) {
        Some(var) => std::env::var(var).map_err(|_| {
            format!("environment variable '{var}' is not set (referenced as '{raw}')")
        }),
        None => Ok(raw),
    }
}

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: Display,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let value = resolve(raw).map_err(serde::de::Error::custom)?;
        value
            .parse::<T>()
            .map(LiteralOrEnv)
            .map_err(|e| serde::de::Error::custom(format!("invalid value: {e}")))
    }
}

impl<T: Serialize> Serialize for LiteralOrEnv<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}
