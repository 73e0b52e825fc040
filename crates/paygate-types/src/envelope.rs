//! Header envelopes: JSON messages carried as base64 text.
//!
//! Three messages travel in HTTP headers or bodies as envelopes:
//! [`Authorization`] in `X-PAYMENT`, [`SettlementResult`] in
//! `X-PAYMENT-RESPONSE`, and [`PaymentRequired`] for clients that move
//! offers through headers. Decoding fails closed: a value either decodes into
//! a fully populated message or yields [`MalformedEnvelope`].
//!
//! ```rust
//! use paygate_types::envelope::Envelope;
//! use paygate_types::proto::SettlementResult;
//!
//! let result = SettlementResult::success("0xabc", "0xpayer", "base-sepolia");
//! let text = result.to_envelope().unwrap();
//! assert_eq!(SettlementResult::from_envelope(&text).unwrap(), result);
//! ```

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{ErrorKind, HasErrorKind};
use crate::proto::{Authorization, PaymentRequired, SettlementResult};
use crate::util::Base64Bytes;

/// Which layer of the envelope was broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedLayer {
    /// The text is not canonical base64.
    Base64,
    /// The decoded bytes are not valid JSON.
    Json,
    /// The JSON does not have the shape of the expected message.
    Structure,
}

/// A value that does not decode into the expected message.
#[derive(Debug, thiserror::Error)]
#[error("malformed payment envelope ({layer:?}): {detail}")]
pub struct MalformedEnvelope {
    pub layer: MalformedLayer,
    pub detail: String,
}

impl MalformedEnvelope {
    fn new(layer: MalformedLayer, detail: impl ToString) -> Self {
        Self {
            layer,
            detail: detail.to_string(),
        }
    }
}

impl HasErrorKind for MalformedEnvelope {
    fn error_kind(&self) -> ErrorKind {
        ErrorKind::MalformedHeader
    }
}

/// A message could not be serialized.
#[derive(Debug, thiserror::Error)]
#[error("failed to encode payment envelope: {0}")]
pub struct EnvelopeEncodeError(#[source] serde_json::Error);

/// Decodes envelope text into untyped JSON.
///
/// Surrounding ASCII whitespace is ignored; anything else that is not
/// canonical base64 of a JSON document is rejected.
pub fn decode_json(text: &str) -> Result<serde_json::Value, MalformedEnvelope> {
    let bytes = Base64Bytes::from(text.trim_ascii())
        .decode()
        .map_err(|e| MalformedEnvelope::new(MalformedLayer::Base64, e))?;
    serde_json::from_slice(&bytes).map_err(|e| MalformedEnvelope::new(MalformedLayer::Json, e))
}

/// A message that can be carried as envelope text.
pub trait Envelope: Serialize + DeserializeOwned {
    fn to_envelope(&self) -> Result<String, EnvelopeEncodeError> {
        let json = serde_json::to_vec(self).map_err(EnvelopeEncodeError)?;
        Ok(Base64Bytes::encode(json).to_string())
    }

    fn from_envelope(text: &str) -> Result<Self, MalformedEnvelope> {
        let json = decode_json(text)?;
        Self::from_json(json)
    }

    /// Second half of [`Envelope::from_envelope`], for callers that inspect
    /// the untyped JSON first.
    fn from_json(json: serde_json::Value) -> Result<Self, MalformedEnvelope> {
        serde_json::from_value(json)
            .map_err(|e| MalformedEnvelope::new(MalformedLayer::Structure, e))
    }
}

impl Envelope for Authorization {}
impl Envelope for SettlementResult {}
impl Envelope for PaymentRequired {}
