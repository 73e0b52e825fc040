//! Turning a [`Rejection`] into an HTTP response.
//!
//! This is the only place where error kinds become status codes.

use http::header::{CONTENT_TYPE, HeaderValue};
use http::{Response, StatusCode};
use paygate_types::error::ErrorKind;
use paygate_types::proto::{PaymentRequired, ProtocolVersion, Requirement};
use serde::Serialize;

use crate::gate::Rejection;

/// The status a rejection of the given kind is answered with.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::PaymentRequired
        | ErrorKind::InvalidRequirements
        | ErrorKind::VerificationFailed => StatusCode::PAYMENT_REQUIRED,
        ErrorKind::MalformedHeader | ErrorKind::UnsupportedVersion => StatusCode::BAD_REQUEST,
        ErrorKind::FacilitatorUnavailable
        | ErrorKind::VerificationTimeout
        | ErrorKind::SettlementFailed
        | ErrorKind::SettlementTimeout
        | ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::NoPaymentRequirements
        | ErrorKind::NoValidSigner
        | ErrorKind::AmountExceeded
        | ErrorKind::SigningFailed => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Whether the response repeats the offers so the client can try again.
pub fn carries_offers(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::PaymentRequired
            | ErrorKind::MalformedHeader
            | ErrorKind::UnsupportedVersion
            | ErrorKind::InvalidRequirements
            | ErrorKind::VerificationFailed
    )
}

/// Body of rejections that do not repeat the offers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    x402_version: ProtocolVersion,
    error: &'a str,
    kind: ErrorKind,
}

/// Builds the JSON response for a rejection.
pub fn rejection_response<B>(
    rejection: &Rejection,
    protocol_version: ProtocolVersion,
    accepts: &[Requirement],
) -> Response<B>
where
    B: From<Vec<u8>>,
{
    let kind = rejection.kind();
    let body = if carries_offers(kind) {
        let offers = PaymentRequired::new(protocol_version, accepts.to_vec())
            .with_error(rejection.message());
        serde_json::to_vec(&offers)
    } else {
        serde_json::to_vec(&ErrorBody {
            x402_version: protocol_version,
            error: rejection.message(),
            kind,
        })
    };
    match body {
        Ok(bytes) => json_response(status_for(kind), bytes),
        Err(error) => {
            tracing::error!(%error, "failed to serialize rejection body");
            let mut response = Response::new(B::from(Vec::new()));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

fn json_response<B: From<Vec<u8>>>(status: StatusCode, bytes: Vec<u8>) -> Response<B> {
    let mut response = Response::new(B::from(bytes));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
