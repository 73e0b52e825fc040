//! A [`Facilitator`] that talks to a _remote_ facilitator over HTTP.
//!
//! [`FacilitatorClient`] calls the `/verify`, `/settle` and `/supported`
//! endpoints of a primary facilitator, with an optional fallback facilitator
//! tried once when no connection to the primary could be established.
//!
//! ```rust
//! use paygate_server::facilitator_client::FacilitatorClient;
//! use std::time::Duration;
//!
//! let facilitator = FacilitatorClient::try_from("https://facilitator.x402.rs")
//!     .unwrap()
//!     .with_verify_timeout(Duration::from_secs(3));
//! assert_eq!(facilitator.verify_url().as_str(), "https://facilitator.x402.rs/verify");
//! ```
//!
//! ## Deadlines
//!
//! Every call runs under one deadline: the verify deadline for `/verify` and
//! `/supported`, the settle deadline for `/settle`. A fallback attempt only
//! gets what is left of it. An expired deadline is reported as a timeout and
//! is never retried against the fallback, since the facilitator may still be
//! acting on the call.
//!
//! ## Fallback
//!
//! Only a failure to connect to the primary moves the call to the fallback.
//! Once the primary has received the request, any outcome, including a 5xx,
//! is final: the primary may already have settled.
//!
//! Dropping the returned future aborts the in-flight HTTP request.

use http::{HeaderMap, StatusCode};
use paygate_types::error::{ErrorKind, HasErrorKind};
use paygate_types::facilitator::Facilitator;
use paygate_types::proto::{
    SettleRequest, SettlementResult, SupportedResponse, VerificationResult, VerifyRequest,
};
use reqwest::Client;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{instrument, warn};
use url::Url;

/// The facilitator endpoints this client calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacilitatorOperation {
    Verify,
    Settle,
    Supported,
}

impl FacilitatorOperation {
    fn path(&self) -> &'static str {
        match self {
            FacilitatorOperation::Verify => "./verify",
            FacilitatorOperation::Settle => "./settle",
            FacilitatorOperation::Supported => "./supported",
        }
    }
}

impl fmt::Display for FacilitatorOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FacilitatorOperation::Verify => "POST /verify",
            FacilitatorOperation::Settle => "POST /settle",
            FacilitatorOperation::Supported => "GET /supported",
        })
    }
}

/// Errors that can occur while interacting with a remote facilitator.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorClientError {
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        context: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("HTTP error: {operation} {url}: {source}")]
    Http {
        operation: FacilitatorOperation,
        url: Url,
        #[source]
        source: reqwest::Error,
    },
    #[error("{operation} did not complete within {timeout:?}")]
    Timeout {
        operation: FacilitatorOperation,
        timeout: Duration,
    },
    #[error("Unexpected HTTP status {status}: {operation}: {body}")]
    HttpStatus {
        operation: FacilitatorOperation,
        status: StatusCode,
        body: String,
    },
    #[error("Failed to deserialize JSON: {operation}: {source}")]
    JsonDeserialization {
        operation: FacilitatorOperation,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to read response body as text: {operation}: {source}")]
    ResponseBodyRead {
        operation: FacilitatorOperation,
        #[source]
        source: reqwest::Error,
    },
}

impl FacilitatorClientError {
    /// Whether the request never reached the facilitator, so that another
    /// facilitator may be asked instead.
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(self, FacilitatorClientError::Http { source, .. } if source.is_connect())
    }
}

impl HasErrorKind for FacilitatorClientError {
    fn error_kind(&self) -> ErrorKind {
        match self {
            FacilitatorClientError::Timeout {
                operation: FacilitatorOperation::Settle,
                ..
            } => ErrorKind::SettlementTimeout,
            FacilitatorClientError::Timeout { .. } => ErrorKind::VerificationTimeout,
            FacilitatorClientError::HttpStatus {
                operation, status, ..
            } if status.is_client_error() => match operation {
                FacilitatorOperation::Verify => ErrorKind::VerificationFailed,
                FacilitatorOperation::Settle => ErrorKind::SettlementFailed,
                FacilitatorOperation::Supported => ErrorKind::FacilitatorUnavailable,
            },
            _ => ErrorKind::FacilitatorUnavailable,
        }
    }
}

#[derive(Clone, Debug)]
struct SupportedCacheState {
    response: SupportedResponse,
    expires_at: Instant,
}

/// TTL cache for the `/supported` response. A zero TTL disables caching.
///
/// Each clone starts with an empty cache of its own.
#[derive(Debug)]
pub struct SupportedCache {
    ttl: Duration,
    state: RwLock<Option<SupportedCacheState>>,
}

impl SupportedCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self) -> Option<SupportedResponse> {
        let guard = self.state.read().await;
        let cached = guard.as_ref()?;
        (Instant::now() < cached.expires_at).then(|| cached.response.clone())
    }

    pub async fn set(&self, response: SupportedResponse) {
        if self.ttl.is_zero() {
            return;
        }
        let mut guard = self.state.write().await;
        *guard = Some(SupportedCacheState {
            response,
            expires_at: Instant::now() + self.ttl,
        });
    }

    pub async fn clear(&self) {
        *self.state.write().await = None;
    }
}

impl Clone for SupportedCache {
    fn clone(&self) -> Self {
        Self::new(self.ttl)
    }
}

/// The endpoint URLs of one facilitator, derived from its base URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FacilitatorEndpoint {
    base_url: Url,
    verify_url: Url,
    settle_url: Url,
    supported_url: Url,
}

impl FacilitatorEndpoint {
    pub fn try_new(base_url: Url) -> Result<Self, FacilitatorClientError> {
        let join = |operation: FacilitatorOperation, context: &'static str| {
            base_url
                .join(operation.path())
                .map_err(|source| FacilitatorClientError::UrlParse { context, source })
        };
        Ok(Self {
            verify_url: join(FacilitatorOperation::Verify, "Failed to construct ./verify URL")?,
            settle_url: join(FacilitatorOperation::Settle, "Failed to construct ./settle URL")?,
            supported_url: join(
                FacilitatorOperation::Supported,
                "Failed to construct ./supported URL",
            )?,
            base_url,
        })
    }

    /// Parses a base URL, normalizing any trailing slashes to exactly one so
    /// endpoint paths are joined below it.
    pub fn parse(value: &str) -> Result<Self, FacilitatorClientError> {
        let mut normalized = value.trim_end_matches('/').to_string();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|source| FacilitatorClientError::UrlParse {
            context: "Failed to parse base url",
            source,
        })?;
        Self::try_new(url)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn url(&self, operation: FacilitatorOperation) -> &Url {
        match operation {
            FacilitatorOperation::Verify => &self.verify_url,
            FacilitatorOperation::Settle => &self.settle_url,
            FacilitatorOperation::Supported => &self.supported_url,
        }
    }
}

/// A client for a remote facilitator, with optional fallback.
#[derive(Clone, Debug)]
pub struct FacilitatorClient {
    primary: FacilitatorEndpoint,
    fallback: Option<FacilitatorEndpoint>,
    client: Client,
    /// Sent with every request, e.g. an API key.
    headers: HeaderMap,
    verify_timeout: Duration,
    settle_timeout: Duration,
    supported_cache: SupportedCache,
}

impl Facilitator for FacilitatorClient {
    type Error = FacilitatorClientError;

    async fn verify(&self, request: &VerifyRequest) -> Result<VerificationResult, Self::Error> {
        FacilitatorClient::verify(self, request).await
    }

    async fn settle(&self, request: &SettleRequest) -> Result<SettlementResult, Self::Error> {
        FacilitatorClient::settle(self, request).await
    }

    async fn supported(&self) -> Result<SupportedResponse, Self::Error> {
        FacilitatorClient::supported(self).await
    }
}

impl FacilitatorClient {
    pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_secs(60);
    pub const DEFAULT_SUPPORTED_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

    pub fn new(primary: FacilitatorEndpoint) -> Self {
        Self {
            primary,
            fallback: None,
            client: Client::new(),
            headers: HeaderMap::new(),
            verify_timeout: Self::DEFAULT_VERIFY_TIMEOUT,
            settle_timeout: Self::DEFAULT_SETTLE_TIMEOUT,
            supported_cache: SupportedCache::new(Self::DEFAULT_SUPPORTED_CACHE_TTL),
        }
    }

    pub fn try_new(base_url: Url) -> Result<Self, FacilitatorClientError> {
        Ok(Self::new(FacilitatorEndpoint::try_new(base_url)?))
    }

    pub fn base_url(&self) -> &Url {
        self.primary.base_url()
    }

    pub fn verify_url(&self) -> &Url {
        self.primary.url(FacilitatorOperation::Verify)
    }

    pub fn settle_url(&self) -> &Url {
        self.primary.url(FacilitatorOperation::Settle)
    }

    pub fn supported_url(&self) -> &Url {
        self.primary.url(FacilitatorOperation::Supported)
    }

    pub fn fallback(&self) -> Option<&FacilitatorEndpoint> {
        self.fallback.as_ref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn verify_timeout(&self) -> Duration {
        self.verify_timeout
    }

    pub fn settle_timeout(&self) -> Duration {
        self.settle_timeout
    }

    pub fn supported_cache(&self) -> &SupportedCache {
        &self.supported_cache
    }

    pub fn with_fallback(mut self, fallback: FacilitatorEndpoint) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_verify_timeout(mut self, timeout: Duration) -> Self {
        self.verify_timeout = timeout;
        self
    }

    pub fn with_settle_timeout(mut self, timeout: Duration) -> Self {
        self.settle_timeout = timeout;
        self
    }

    /// Default is 10 minutes. Use [`Self::without_supported_cache()`] to disable caching.
    pub fn with_supported_cache_ttl(mut self, ttl: Duration) -> Self {
        self.supported_cache = SupportedCache::new(ttl);
        self
    }

    pub fn without_supported_cache(self) -> Self {
        self.with_supported_cache_ttl(Duration::ZERO)
    }

    /// Sends `POST /verify`.
    #[instrument(name = "paygate.facilitator_client.verify", skip_all, err, fields(
        scheme = %request.payment_payload.scheme,
        network = %request.payment_payload.network,
        timeout = ?self.verify_timeout,
    ))]
    pub async fn verify(
        &self,
        request: &VerifyRequest,
    ) -> Result<VerificationResult, FacilitatorClientError> {
        self.call(FacilitatorOperation::Verify, Some(request)).await
    }

    /// Sends `POST /settle`.
    #[instrument(name = "paygate.facilitator_client.settle", skip_all, err, fields(
        scheme = %request.payment_payload.scheme,
        network = %request.payment_payload.network,
        timeout = ?self.settle_timeout,
    ))]
    pub async fn settle(
        &self,
        request: &SettleRequest,
    ) -> Result<SettlementResult, FacilitatorClientError> {
        self.call(FacilitatorOperation::Settle, Some(request)).await
    }

    /// Sends `GET /supported`, bypassing the cache.
    #[instrument(name = "paygate.facilitator_client.supported", skip_all, err)]
    pub async fn supported_inner(&self) -> Result<SupportedResponse, FacilitatorClientError> {
        self.call(FacilitatorOperation::Supported, None).await
    }

    /// Sends `GET /supported` unless a cached answer is still fresh.
    pub async fn supported(&self) -> Result<SupportedResponse, FacilitatorClientError> {
        if let Some(response) = self.supported_cache.get().await {
            return Ok(response);
        }
        tracing::debug!("supported cache miss");
        let response = self.supported_inner().await?;
        self.supported_cache.set(response.clone()).await;
        Ok(response)
    }

    fn timeout_for(&self, operation: FacilitatorOperation) -> Duration {
        match operation {
            FacilitatorOperation::Settle => self.settle_timeout,
            FacilitatorOperation::Verify | FacilitatorOperation::Supported => self.verify_timeout,
        }
    }

    /// Tries the primary, then the fallback once if the primary was never reached.
    async fn call<R>(
        &self,
        operation: FacilitatorOperation,
        payload: Option<&VerifyRequest>,
    ) -> Result<R, FacilitatorClientError>
    where
        R: serde::de::DeserializeOwned,
    {
        let timeout = self.timeout_for(operation);
        let deadline = tokio::time::Instant::now() + timeout;
        let error = match self.attempt(&self.primary, operation, payload, deadline).await {
            Ok(response) => return Ok(response),
            Err(error) => error,
        };
        match &self.fallback {
            Some(fallback) if error.is_fallback_eligible() => {
                warn!(
                    %operation,
                    primary = %self.primary.base_url(),
                    fallback = %fallback.base_url(),
                    error = %error,
                    "primary facilitator unreachable, trying fallback"
                );
                self.attempt(fallback, operation, payload, deadline).await
            }
            _ => Err(error),
        }
    }

    /// One HTTP exchange with one endpoint, cut off at the call's deadline.
    async fn attempt<R>(
        &self,
        endpoint: &FacilitatorEndpoint,
        operation: FacilitatorOperation,
        payload: Option<&VerifyRequest>,
        deadline: tokio::time::Instant,
    ) -> Result<R, FacilitatorClientError>
    where
        R: serde::de::DeserializeOwned,
    {
        tokio::time::timeout_at(deadline, self.exchange(endpoint, operation, payload))
            .await
            .map_err(|_| FacilitatorClientError::Timeout {
                operation,
                timeout: self.timeout_for(operation),
            })?
    }

    async fn exchange<R>(
        &self,
        endpoint: &FacilitatorEndpoint,
        operation: FacilitatorOperation,
        payload: Option<&VerifyRequest>,
    ) -> Result<R, FacilitatorClientError>
    where
        R: serde::de::DeserializeOwned,
    {
        let url = endpoint.url(operation);
        let mut req = match payload {
            Some(payload) => self.client.post(url.clone()).json(payload),
            None => self.client.get(url.clone()),
        };
        for (key, value) in self.headers.iter() {
            req = req.header(key, value);
        }
        let http_response = req.send().await.map_err(|source| FacilitatorClientError::Http {
            operation,
            url: url.clone(),
            source,
        })?;

        let status = http_response.status();
        if status.is_success() {
            return http_response
                .json::<R>()
                .await
                .map_err(|source| FacilitatorClientError::JsonDeserialization {
                    operation,
                    source,
                });
        }
        let body = http_response
            .text()
            .await
            .map_err(|source| FacilitatorClientError::ResponseBodyRead { operation, source })?;
        Err(FacilitatorClientError::HttpStatus {
            operation,
            status,
            body,
        })
    }
}

impl TryFrom<&str> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Ok(FacilitatorClient::new(FacilitatorEndpoint::parse(value)?))
    }
}

impl TryFrom<String> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        FacilitatorClient::try_from(value.as_str())
    }
}
