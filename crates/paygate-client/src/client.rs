//! The paying HTTP client.
//!
//! [`X402Client`] is a `reqwest-middleware` middleware. It lets requests pass
//! through untouched until one comes back `402 Payment Required`; then it
//! reads the offers, asks its [`PaymentSelector`] for a signed authorization,
//! and replays the request once with the `X-PAYMENT` header attached.

use http::header::HeaderValue;
use http::{Extensions, HeaderMap, StatusCode};
use paygate_types::envelope::{Envelope, MalformedEnvelope};
use paygate_types::proto::{PaymentRequired, ProtocolVersion, SettlementResult};
use reqwest::{Request, Response};
use reqwest_middleware as rqm;
use std::sync::Arc;
use tracing::{debug, info, instrument, trace};

use crate::error::X402Error;
use crate::selector::{PaymentSelector, PriorityFirstMatch};
use crate::signer::SignerCapability;

pub const PAYMENT_HEADER: &str = "X-PAYMENT";
pub const PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";

/// Pays for `402` responses with the registered signer capabilities.
///
/// ```rust,ignore
/// use paygate_client::{ConfiguredSigner, ReqwestWithPayments, TokenConfig, X402Client};
///
/// let x402 = X402Client::new().register(
///     ConfiguredSigner::new("base-sepolia", "exact", wallet)
///         .with_token(TokenConfig::new(USDC, "USDC", 6)),
/// );
/// let http = reqwest::Client::new().with_payments(x402).build();
/// let response = http.get("https://api.example.com/weather").send().await?;
/// ```
pub struct X402Client<TSelector> {
    capabilities: Vec<Arc<dyn SignerCapability>>,
    selector: TSelector,
    protocol_version: ProtocolVersion,
}

impl X402Client<PriorityFirstMatch> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for X402Client<PriorityFirstMatch> {
    fn default() -> Self {
        Self {
            capabilities: Vec::new(),
            selector: PriorityFirstMatch,
            protocol_version: ProtocolVersion::V1,
        }
    }
}

impl<TSelector> X402Client<TSelector> {
    /// Registers a signer capability. Registration order breaks priority ties.
    pub fn register<C>(mut self, capability: C) -> Self
    where
        C: SignerCapability + 'static,
    {
        self.capabilities.push(Arc::new(capability));
        self
    }

    /// Replaces the default [`PriorityFirstMatch`] selection.
    pub fn with_selector<P: PaymentSelector + 'static>(self, selector: P) -> X402Client<P> {
        X402Client {
            capabilities: self.capabilities,
            selector,
            protocol_version: self.protocol_version,
        }
    }

    /// The protocol version this client accepts offers for.
    pub fn with_protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }

    pub fn capabilities(&self) -> &[Arc<dyn SignerCapability>] {
        &self.capabilities
    }
}

impl<TSelector> X402Client<TSelector>
where
    TSelector: PaymentSelector,
{
    /// Builds the `X-PAYMENT` header value answering the given offers.
    #[instrument(name = "paygate.client.make_payment_header", skip_all, err)]
    pub async fn make_payment_header(
        &self,
        payment_required: &PaymentRequired,
    ) -> Result<HeaderValue, X402Error> {
        if payment_required.x402_version != self.protocol_version {
            return Err(X402Error::UnsupportedVersion {
                got: payment_required.x402_version,
                expected: self.protocol_version,
            });
        }
        let authorization = self
            .selector
            .select_and_sign(&payment_required.accepts, &self.capabilities)
            .await?;
        debug!(
            scheme = %authorization.scheme,
            network = %authorization.network,
            "signed payment authorization"
        );
        let envelope = authorization.to_envelope()?;
        Ok(HeaderValue::from_str(&envelope)?)
    }
}

#[async_trait::async_trait]
impl<TSelector> rqm::Middleware for X402Client<TSelector>
where
    TSelector: PaymentSelector + Send + Sync + 'static,
{
    #[instrument(name = "paygate.client.handle", skip_all, err)]
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let retry_req = req.try_clone();
        let res = next.clone().run(req, extensions).await?;

        if res.status() != StatusCode::PAYMENT_REQUIRED {
            trace!(status = ?res.status(), "no payment required");
            return Ok(res);
        }

        info!(url = %res.url(), "received 402 Payment Required, paying");

        let payment_required = parse_payment_required(res).await?;
        let header = self.make_payment_header(&payment_required).await?;

        let mut retry = retry_req.ok_or(X402Error::RequestNotCloneable)?;
        retry.headers_mut().insert(PAYMENT_HEADER, header);

        trace!(url = %retry.url(), "retrying request with payment");
        next.run(retry, extensions).await
    }
}

/// Reads the offers out of a `402` response body.
pub async fn parse_payment_required(response: Response) -> Result<PaymentRequired, X402Error> {
    let body = response
        .bytes()
        .await
        .map_err(|e| X402Error::ParseError(format!("failed to read body: {e}")))?;
    serde_json::from_slice::<PaymentRequired>(&body)
        .map_err(|e| X402Error::ParseError(e.to_string()))
}

/// Decodes the seller's `X-PAYMENT-RESPONSE` header, if there is one.
pub fn settlement_from_headers(
    headers: &HeaderMap,
) -> Option<Result<SettlementResult, MalformedEnvelope>> {
    let value = headers.get(PAYMENT_RESPONSE_HEADER)?;
    let text = String::from_utf8_lossy(value.as_bytes());
    Some(SettlementResult::from_envelope(&text))
}
