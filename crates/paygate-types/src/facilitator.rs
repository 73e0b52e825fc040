//! The contract of a payment facilitator.
//!
//! A facilitator is the party that checks a signed [`Authorization`] against a
//! [`Requirement`] and moves the funds. The seller side never inspects the
//! authorization payload itself; it only talks to a [`Facilitator`].
//!
//! [`Authorization`]: crate::proto::Authorization
//! [`Requirement`]: crate::proto::Requirement

use std::error::Error;
use std::sync::Arc;

use crate::error::HasErrorKind;
use crate::proto::{
    SettleRequest, SettlementResult, SupportedResponse, VerificationResult, VerifyRequest,
};

/// Verification and settlement of payment authorizations.
///
/// `verify` is expected to be side-effect free; `settle` moves funds and must
/// only be called with an authorization that verified successfully.
///
/// A returned `Err` means the facilitator could not produce a verdict
/// (unreachable, timed out, refused the request). A verdict of "invalid" or
/// "not settled" is an `Ok` carrying `is_valid: false` or `success: false`.
pub trait Facilitator {
    type Error: Error + HasErrorKind + Send + Sync + 'static;

    fn verify(
        &self,
        request: &VerifyRequest,
    ) -> impl Future<Output = Result<VerificationResult, Self::Error>> + Send;

    fn settle(
        &self,
        request: &SettleRequest,
    ) -> impl Future<Output = Result<SettlementResult, Self::Error>> + Send;

    fn supported(&self) -> impl Future<Output = Result<SupportedResponse, Self::Error>> + Send;
}

impl<T: Facilitator + Send + Sync> Facilitator for Arc<T> {
    type Error = T::Error;

    fn verify(
        &self,
        request: &VerifyRequest,
    ) -> impl Future<Output = Result<VerificationResult, Self::Error>> + Send {
        self.as_ref().verify(request)
    }

    fn settle(
        &self,
        request: &SettleRequest,
    ) -> impl Future<Output = Result<SettlementResult, Self::Error>> + Send {
        self.as_ref().settle(request)
    }

    fn supported(&self) -> impl Future<Output = Result<SupportedResponse, Self::Error>> + Send {
        self.as_ref().supported()
    }
}
