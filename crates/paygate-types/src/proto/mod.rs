//! Wire format types for payment messages.
//!
//! All types serialize to JSON with camelCase field names. The protocol
//! version travels in the `x402Version` field.
//!
//! # Key Types
//!
//! - [`Requirement`] - One way the seller is willing to be paid
//! - [`PaymentRequired`] - The 402 response body listing the offers
//! - [`Authorization`] - Signed proof of payment sent by the buyer
//! - [`VerifyRequest`] / [`VerificationResult`] - Verification messages
//! - [`SettleRequest`] / [`SettlementResult`] - Settlement messages
//! - [`SupportedResponse`] - What a facilitator can verify and settle

use serde::{Deserialize, Serialize};
use serde_with::{VecSkipError, serde_as};
use std::collections::HashMap;
use std::fmt;

mod amount;

pub use amount::*;

/// Protocol version carried by every message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolVersion(pub u8);

impl ProtocolVersion {
    pub const V1: ProtocolVersion = ProtocolVersion(1);
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        ProtocolVersion::V1
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for ProtocolVersion {
    fn from(value: u8) -> Self {
        ProtocolVersion(value)
    }
}

/// MIME type assumed for a resource when none is configured.
pub const DEFAULT_MIME_TYPE: &str = "application/json";

fn default_mime_type() -> String {
    DEFAULT_MIME_TYPE.to_string()
}

/// One acceptable way to pay for a resource.
///
/// ```json
/// {
///   "scheme": "exact",
///   "network": "base-sepolia",
///   "maxAmountRequired": "10000",
///   "resource": "https://api.example.com/weather",
///   "description": "Weather report",
///   "mimeType": "application/json",
///   "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
///   "maxTimeoutSeconds": 300,
///   "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
///   "extra": { "name": "USDC", "version": "2" }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    /// Payment method identifier, e.g. `"exact"`.
    pub scheme: String,
    /// Settlement network, e.g. `"base-sepolia"`.
    pub network: String,
    /// Ceiling in atomic units of `asset`.
    pub max_amount_required: AtomicAmount,
    /// The resource being paid for.
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    /// Recipient address.
    pub pay_to: String,
    /// How long a signed authorization stays valid.
    pub max_timeout_seconds: u64,
    /// Token identifier on `network`.
    pub asset: String,
    /// Scheme-specific data, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Map<String, serde_json::Value>>,
}

/// The ordered list of offers made for one resource. Order is significant:
/// buyers prefer earlier entries.
pub type RequirementSet = Vec<Requirement>;

/// The body of a `402 Payment Required` response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    pub x402_version: ProtocolVersion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub accepts: RequirementSet,
}

impl PaymentRequired {
    pub fn new(x402_version: ProtocolVersion, accepts: RequirementSet) -> Self {
        Self {
            x402_version,
            error: None,
            accepts,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// A signed payment authorization produced by the buyer for one requirement.
///
/// The `payload` is scheme-specific and opaque to everything except the
/// signer that produced it and the facilitator that checks it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    pub x402_version: ProtocolVersion,
    pub scheme: String,
    pub network: String,
    pub payload: serde_json::Value,
}

impl Authorization {
    /// Whether this authorization was made for the given requirement's
    /// scheme and network.
    pub fn matches(&self, requirement: &Requirement) -> bool {
        self.scheme == requirement.scheme && self.network == requirement.network
    }
}

/// Request body for the facilitator's `/verify` and `/settle` endpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub x402_version: ProtocolVersion,
    pub payment_payload: Authorization,
    pub payment_requirements: Requirement,
}

/// Settlement takes the same body as verification.
pub type SettleRequest = VerifyRequest;

impl VerifyRequest {
    pub fn new(authorization: Authorization, requirement: Requirement) -> Self {
        Self {
            x402_version: authorization.x402_version,
            payment_payload: authorization,
            payment_requirements: requirement,
        }
    }
}

/// The facilitator's verdict on an authorization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub is_valid: bool,
    #[serde(default)]
    pub payer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
}

impl VerificationResult {
    pub fn valid(payer: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            payer: payer.into(),
            invalid_reason: None,
        }
    }

    pub fn invalid(payer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            payer: payer.into(),
            invalid_reason: Some(reason.into()),
        }
    }
}

/// The outcome of settling an authorization; returned to the buyer in the
/// `X-PAYMENT-RESPONSE` header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    /// Transaction identifier on the settlement network. Empty when not settled.
    #[serde(default)]
    pub transaction: String,
    #[serde(default)]
    pub payer: String,
    pub network: String,
}

impl SettlementResult {
    pub fn success(
        transaction: impl Into<String>,
        payer: impl Into<String>,
        network: impl Into<String>,
    ) -> Self {
        Self {
            success: true,
            error_reason: None,
            transaction: transaction.into(),
            payer: payer.into(),
            network: network.into(),
        }
    }

    pub fn failure(reason: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            success: false,
            error_reason: Some(reason.into()),
            transaction: String::new(),
            payer: String::new(),
            network: network.into(),
        }
    }
}

/// A payment method a facilitator can handle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedPaymentKind {
    pub x402_version: ProtocolVersion,
    pub scheme: String,
    pub network: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// Response from a facilitator's `/supported` endpoint.
///
/// Kinds this library cannot parse are skipped instead of failing the
/// whole response.
#[serde_as]
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedResponse {
    #[serde_as(as = "VecSkipError<_>")]
    pub kinds: Vec<SupportedPaymentKind>,
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Signer addresses per network.
    #[serde(default)]
    pub signers: HashMap<String, Vec<String>>,
}

impl SupportedResponse {
    /// Whether the facilitator advertises the requirement's scheme and network.
    pub fn supports(&self, requirement: &Requirement) -> bool {
        self.kinds
            .iter()
            .any(|k| k.scheme == requirement.scheme && k.network == requirement.network)
    }
}
