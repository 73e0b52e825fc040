//! The error taxonomy shared by buyers, sellers, and facilitator clients.
//!
//! Every failure in a payment flow carries an [`ErrorKind`]. Kinds are kept
//! distinct internally even when several of them surface as the same HTTP
//! status, so callers can log and branch on the precise cause.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What went wrong in a payment flow, independent of transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request carried no payment authorization.
    PaymentRequired,
    /// The payment header is not a well-formed envelope.
    MalformedHeader,
    /// The envelope declares a protocol version this side does not speak.
    UnsupportedVersion,
    /// The authorization does not match any offered requirement, or an offer is invalid.
    InvalidRequirements,
    /// No requirements were offered at all.
    NoPaymentRequirements,
    /// No configured signer can satisfy any offered requirement.
    NoValidSigner,
    /// The offered amount exceeds a signer's configured ceiling.
    AmountExceeded,
    /// A signer failed while producing the authorization.
    SigningFailed,
    /// The facilitator judged the authorization invalid.
    VerificationFailed,
    /// The facilitator did not settle the payment.
    SettlementFailed,
    /// The facilitator could not be reached.
    FacilitatorUnavailable,
    /// Verification did not complete within its deadline.
    VerificationTimeout,
    /// Settlement did not complete within its deadline.
    SettlementTimeout,
    /// The caller abandoned the flow.
    Cancelled,
}

impl ErrorKind {
    /// Stable machine-readable name, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::PaymentRequired => "payment_required",
            ErrorKind::MalformedHeader => "malformed_header",
            ErrorKind::UnsupportedVersion => "unsupported_version",
            ErrorKind::InvalidRequirements => "invalid_requirements",
            ErrorKind::NoPaymentRequirements => "no_payment_requirements",
            ErrorKind::NoValidSigner => "no_valid_signer",
            ErrorKind::AmountExceeded => "amount_exceeded",
            ErrorKind::SigningFailed => "signing_failed",
            ErrorKind::VerificationFailed => "verification_failed",
            ErrorKind::SettlementFailed => "settlement_failed",
            ErrorKind::FacilitatorUnavailable => "facilitator_unavailable",
            ErrorKind::VerificationTimeout => "verification_timeout",
            ErrorKind::SettlementTimeout => "settlement_timeout",
            ErrorKind::Cancelled => "cancelled",
        }
    }

    /// Whether the kind is caused by what the client sent.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ErrorKind::MalformedHeader | ErrorKind::UnsupportedVersion
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by every error type that takes part in a payment flow.
pub trait HasErrorKind {
    fn error_kind(&self) -> ErrorKind;
}

impl HasErrorKind for ErrorKind {
    fn error_kind(&self) -> ErrorKind {
        *self
    }
}

/// Boxed error used where a pluggable component reports its own failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_name_matches_as_str() {
        for kind in [
            ErrorKind::PaymentRequired,
            ErrorKind::MalformedHeader,
            ErrorKind::VerificationTimeout,
            ErrorKind::Cancelled,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, serde_json::Value::String(kind.as_str().into()));
        }
    }
}
