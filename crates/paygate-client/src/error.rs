use paygate_types::envelope::EnvelopeEncodeError;
use paygate_types::error::{BoxError, ErrorKind, HasErrorKind};
use paygate_types::proto::{AtomicAmount, ProtocolVersion};
use reqwest_middleware as rqm;

/// Why the buyer could not produce an authorization.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("the server offered no payment requirements")]
    NoPaymentRequirements,
    #[error("no registered signer can satisfy any offered requirement")]
    NoValidSigner,
    /// The offer asks for more than the signer is allowed to spend.
    #[error("requested amount {requested} exceeds the allowed maximum {allowed}")]
    AmountExceeded {
        requested: AtomicAmount,
        allowed: AtomicAmount,
    },
    #[error("failed to sign payment authorization: {0}")]
    SigningFailed(#[source] BoxError),
}

impl PaymentError {
    pub fn signing_failed<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        PaymentError::SigningFailed(error.into())
    }
}

impl HasErrorKind for PaymentError {
    fn error_kind(&self) -> ErrorKind {
        match self {
            PaymentError::NoPaymentRequirements => ErrorKind::NoPaymentRequirements,
            PaymentError::NoValidSigner => ErrorKind::NoValidSigner,
            PaymentError::AmountExceeded { .. } => ErrorKind::AmountExceeded,
            PaymentError::SigningFailed(_) => ErrorKind::SigningFailed,
        }
    }
}

/// Failures of the paying HTTP client.
#[derive(Debug, thiserror::Error)]
pub enum X402Error {
    #[error("invalid 402 response: {0}")]
    ParseError(String),
    #[error("server speaks protocol version {got}, this client speaks {expected}")]
    UnsupportedVersion {
        got: ProtocolVersion,
        expected: ProtocolVersion,
    },
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error(transparent)]
    Envelope(#[from] EnvelopeEncodeError),
    /// The payment envelope cannot be placed into a header value.
    #[error("failed to encode payment header: {0}")]
    HeaderValue(#[from] http::header::InvalidHeaderValue),
    /// Streaming bodies cannot be replayed with the payment attached.
    #[error("request object is not cloneable, are you passing a streaming body?")]
    RequestNotCloneable,
}

impl HasErrorKind for X402Error {
    fn error_kind(&self) -> ErrorKind {
        match self {
            X402Error::ParseError(_) => ErrorKind::MalformedHeader,
            X402Error::UnsupportedVersion { .. } => ErrorKind::UnsupportedVersion,
            X402Error::Payment(e) => e.error_kind(),
            X402Error::Envelope(_) | X402Error::HeaderValue(_) | X402Error::RequestNotCloneable => {
                ErrorKind::SigningFailed
            }
        }
    }
}

impl From<X402Error> for rqm::Error {
    fn from(error: X402Error) -> Self {
        rqm::Error::Middleware(error.into())
    }
}
