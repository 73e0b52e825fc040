//! The payment gate in front of a protected operation.
//!
//! Each request walks a small state machine:
//!
//! ```text
//! NoAuthorization ─▶ AuthorizationParsed ─▶ VerifiedPending ─┬▶ SettledPending ─▶ Granted
//!                                                            └▶ VerifySkipped ──▶ Granted
//! ```
//!
//! Every non-terminal stage may end in `Rejected` instead. The protected
//! operation runs only from `Granted`, and receives the [`PaymentContext`]
//! collected on the way as an explicit argument.

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Response};
use paygate_types::envelope::{self, Envelope};
use paygate_types::error::{BoxError, ErrorKind, HasErrorKind};
use paygate_types::facilitator::Facilitator;
use paygate_types::proto::{
    Authorization, PaymentRequired, ProtocolVersion, Requirement, RequirementSet,
    SettlementResult, VerificationResult, VerifyRequest,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::response::rejection_response;

pub const PAYMENT_HEADER: HeaderName = HeaderName::from_static("x-payment");
pub const PAYMENT_RESPONSE_HEADER: HeaderName = HeaderName::from_static("x-payment-response");

/// The stages a request passes through; see the module documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateStage {
    NoAuthorization,
    AuthorizationParsed,
    VerifiedPending,
    VerifySkipped,
    SettledPending,
    Granted,
    Rejected,
}

/// Why a request was not let through.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct Rejection {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl Rejection {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Wraps a facilitator failure. The outward message only names the kind;
    /// the failure itself stays reachable through `source()` and the logs.
    fn caused_by<E>(error: E) -> Self
    where
        E: std::error::Error + HasErrorKind + Send + Sync + 'static,
    {
        let kind = error.error_kind();
        warn!(error = %error, %kind, "facilitator call failed");
        Self {
            kind,
            message: facilitator_failure_message(kind).to_owned(),
            source: Some(Box::new(error)),
        }
    }

    fn payment_required() -> Self {
        Self::new(ErrorKind::PaymentRequired, "X-PAYMENT header is required")
    }

    fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "request cancelled")
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl HasErrorKind for Rejection {
    fn error_kind(&self) -> ErrorKind {
        self.kind
    }
}

/// What a granted request paid, handed read-only to the protected operation.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentContext {
    requirement: Requirement,
    verification: VerificationResult,
    settlement: Option<SettlementResult>,
    settlement_header: Option<HeaderValue>,
}

impl PaymentContext {
    /// The offer the buyer paid for.
    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }

    pub fn verification(&self) -> &VerificationResult {
        &self.verification
    }

    /// Absent in verify-only mode.
    pub fn settlement(&self) -> Option<&SettlementResult> {
        self.settlement.as_ref()
    }

    pub fn payer(&self) -> &str {
        &self.verification.payer
    }

    /// The encoded `X-PAYMENT-RESPONSE` value, when the payment was settled.
    pub fn settlement_header(&self) -> Option<&HeaderValue> {
        self.settlement_header.as_ref()
    }
}

/// The result of running the gate for one request.
#[derive(Debug)]
pub struct GateOutcome {
    path: Vec<GateStage>,
    result: Result<PaymentContext, Rejection>,
}

impl GateOutcome {
    /// Every stage visited, in order, ending in `Granted` or `Rejected`.
    pub fn path(&self) -> &[GateStage] {
        &self.path
    }

    pub fn result(&self) -> &Result<PaymentContext, Rejection> {
        &self.result
    }

    pub fn into_result(self) -> Result<PaymentContext, Rejection> {
        self.result
    }
}

enum GateState {
    NoAuthorization,
    AuthorizationParsed(Result<Authorization, Rejection>),
    VerifiedPending(VerifyRequest),
    VerifySkipped(VerifyRequest, VerificationResult),
    SettledPending(VerifyRequest, VerificationResult),
    Granted(PaymentContext),
    Rejected(Rejection),
}

impl GateState {
    fn stage(&self) -> GateStage {
        match self {
            GateState::NoAuthorization => GateStage::NoAuthorization,
            GateState::AuthorizationParsed(_) => GateStage::AuthorizationParsed,
            GateState::VerifiedPending(_) => GateStage::VerifiedPending,
            GateState::VerifySkipped(..) => GateStage::VerifySkipped,
            GateState::SettledPending(..) => GateStage::SettledPending,
            GateState::Granted(_) => GateStage::Granted,
            GateState::Rejected(_) => GateStage::Rejected,
        }
    }
}

/// Enforces payment for one protected resource.
///
/// Configuration is immutable after construction; one `Gate` serves any
/// number of concurrent requests.
///
/// ```rust,ignore
/// let gate = Gate::new(facilitator, vec![requirement])?.verify_only(false);
/// let response = gate
///     .handle(request.headers(), &cancel, async |payment: &PaymentContext| {
///         render_report(payment.payer())
///     })
///     .await;
/// ```
#[derive(Debug)]
pub struct Gate<F> {
    facilitator: F,
    accepts: Arc<RequirementSet>,
    verify_only: bool,
    protocol_version: ProtocolVersion,
}

impl<F: Clone> Clone for Gate<F> {
    fn clone(&self) -> Self {
        Self {
            facilitator: self.facilitator.clone(),
            accepts: self.accepts.clone(),
            verify_only: self.verify_only,
            protocol_version: self.protocol_version,
        }
    }
}

impl<F> Gate<F> {
    /// Fails with `NoPaymentRequirements` when `accepts` is empty.
    pub fn new(facilitator: F, accepts: RequirementSet) -> Result<Self, Rejection> {
        if accepts.is_empty() {
            return Err(Rejection::new(
                ErrorKind::NoPaymentRequirements,
                "a gate needs at least one payment requirement",
            ));
        }
        Ok(Self {
            facilitator,
            accepts: Arc::new(accepts),
            verify_only: false,
            protocol_version: ProtocolVersion::V1,
        })
    }

    /// Grant on successful verification alone, never calling settle.
    pub fn verify_only(mut self, verify_only: bool) -> Self {
        self.verify_only = verify_only;
        self
    }

    pub fn with_protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }

    pub fn facilitator(&self) -> &F {
        &self.facilitator
    }

    pub fn accepts(&self) -> &[Requirement] {
        &self.accepts
    }

    pub fn is_verify_only(&self) -> bool {
        self.verify_only
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    /// The 402 body offering this gate's requirements.
    pub fn payment_required(&self) -> PaymentRequired {
        PaymentRequired::new(self.protocol_version, self.accepts.to_vec())
    }

    /// The response sent for a rejected request.
    pub fn reject<B: From<Vec<u8>>>(&self, rejection: &Rejection) -> Response<B> {
        rejection_response(rejection, self.protocol_version, &self.accepts)
    }

    fn decode_authorization(&self, raw: &HeaderValue) -> Result<Authorization, Rejection> {
        let malformed = |e: envelope::MalformedEnvelope| {
            debug!(error = %e, "malformed payment header");
            Rejection::new(ErrorKind::MalformedHeader, "Invalid or malformed payment header")
        };
        let text = raw.to_str().map_err(|_| {
            Rejection::new(ErrorKind::MalformedHeader, "Invalid or malformed payment header")
        })?;
        let json = envelope::decode_json(text).map_err(malformed)?;
        // A version mismatch is reported even when the rest of the message
        // would not parse under this version's rules.
        if let Some(version) = json.get("x402Version").and_then(|v| v.as_u64())
            && version != u64::from(self.protocol_version.0)
        {
            return Err(Rejection::new(
                ErrorKind::UnsupportedVersion,
                format!(
                    "Unsupported protocol version {version}, expected {}",
                    self.protocol_version
                ),
            ));
        }
        Authorization::from_json(json).map_err(malformed)
    }

    fn find_requirement(&self, authorization: &Authorization) -> Option<&Requirement> {
        self.accepts.iter().find(|r| authorization.matches(r))
    }
}

impl<F> Gate<F>
where
    F: Facilitator + Send + Sync,
{
    /// Runs the state machine for one request.
    ///
    /// Firing `cancel` while verify or settle is in flight drops that call
    /// and ends the run in `Rejected` with kind `Cancelled`.
    #[instrument(name = "paygate.gate.evaluate", skip_all)]
    pub async fn evaluate(&self, headers: &HeaderMap, cancel: &CancellationToken) -> GateOutcome {
        let mut path = Vec::with_capacity(5);
        let mut state = GateState::NoAuthorization;
        loop {
            let stage = state.stage();
            path.push(stage);
            debug!(?stage, "gate stage");
            state = match state {
                GateState::Granted(context) => {
                    return GateOutcome {
                        path,
                        result: Ok(context),
                    };
                }
                GateState::Rejected(rejection) => {
                    debug!(kind = %rejection.kind(), reason = %rejection, "payment rejected");
                    return GateOutcome {
                        path,
                        result: Err(rejection),
                    };
                }
                pending => self.advance(pending, headers, cancel).await,
            };
        }
    }

    async fn advance(
        &self,
        state: GateState,
        headers: &HeaderMap,
        cancel: &CancellationToken,
    ) -> GateState {
        match state {
            GateState::NoAuthorization => match headers.get(&PAYMENT_HEADER) {
                Some(raw) if !raw.is_empty() => {
                    GateState::AuthorizationParsed(self.decode_authorization(raw))
                }
                _ => GateState::Rejected(Rejection::payment_required()),
            },
            GateState::AuthorizationParsed(Err(rejection)) => GateState::Rejected(rejection),
            GateState::AuthorizationParsed(Ok(authorization)) => {
                match self.find_requirement(&authorization) {
                    Some(requirement) => GateState::VerifiedPending(VerifyRequest::new(
                        authorization,
                        requirement.clone(),
                    )),
                    None => GateState::Rejected(Rejection::new(
                        ErrorKind::InvalidRequirements,
                        "No matching payment requirements found",
                    )),
                }
            }
            GateState::VerifiedPending(request) => {
                match guarded(cancel, self.facilitator.verify(&request)).await {
                    Err(rejection) => GateState::Rejected(rejection),
                    Ok(verification) if !verification.is_valid => {
                        let reason = verification.invalid_reason.as_deref().unwrap_or("unknown");
                        GateState::Rejected(Rejection::new(
                            ErrorKind::VerificationFailed,
                            format!("Payment verification failed: {reason}"),
                        ))
                    }
                    Ok(verification) if self.verify_only => {
                        GateState::VerifySkipped(request, verification)
                    }
                    Ok(verification) => GateState::SettledPending(request, verification),
                }
            }
            GateState::VerifySkipped(request, verification) => GateState::Granted(PaymentContext {
                requirement: request.payment_requirements,
                verification,
                settlement: None,
                settlement_header: None,
            }),
            GateState::SettledPending(request, verification) => {
                match guarded(cancel, self.facilitator.settle(&request)).await {
                    Err(rejection) => GateState::Rejected(rejection),
                    Ok(settlement) if !settlement.success => {
                        let reason = settlement.error_reason.as_deref().unwrap_or("unknown");
                        GateState::Rejected(Rejection::new(
                            ErrorKind::SettlementFailed,
                            format!("Payment settlement failed: {reason}"),
                        ))
                    }
                    Ok(settlement) => match settlement_header(&settlement) {
                        Ok(header) => {
                            debug!(
                                transaction = %settlement.transaction,
                                payer = %settlement.payer,
                                network = %settlement.network,
                                "payment settled"
                            );
                            GateState::Granted(PaymentContext {
                                requirement: request.payment_requirements,
                                verification,
                                settlement: Some(settlement),
                                settlement_header: Some(header),
                            })
                        }
                        Err(rejection) => GateState::Rejected(rejection),
                    },
                }
            }
            terminal @ (GateState::Granted(_) | GateState::Rejected(_)) => terminal,
        }
    }

    /// Runs the gate and, only if the payment is granted, the protected
    /// operation. A settled payment's `X-PAYMENT-RESPONSE` header is added to
    /// the operation's response.
    #[instrument(name = "paygate.gate.handle", skip_all)]
    pub async fn handle<B, Op>(
        &self,
        headers: &HeaderMap,
        cancel: &CancellationToken,
        operation: Op,
    ) -> Response<B>
    where
        B: From<Vec<u8>>,
        Op: AsyncFnOnce(&PaymentContext) -> Response<B>,
    {
        match self.evaluate(headers, cancel).await.into_result() {
            Err(rejection) => self.reject(&rejection),
            Ok(context) => {
                let mut response = operation(&context).await;
                if let Some(value) = context.settlement_header {
                    response.headers_mut().insert(PAYMENT_RESPONSE_HEADER, value);
                }
                response
            }
        }
    }
}

/// Awaits a facilitator call unless the request is cancelled first.
async fn guarded<T, E>(
    cancel: &CancellationToken,
    call: impl Future<Output = Result<T, E>>,
) -> Result<T, Rejection>
where
    E: std::error::Error + HasErrorKind + Send + Sync + 'static,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Rejection::cancelled()),
        result = call => result.map_err(Rejection::caused_by),
    }
}

fn facilitator_failure_message(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::FacilitatorUnavailable => "Payment facilitator unavailable",
        ErrorKind::VerificationTimeout => "Payment verification timed out",
        ErrorKind::VerificationFailed => "Payment verification failed",
        ErrorKind::SettlementTimeout => "Payment settlement timed out",
        ErrorKind::SettlementFailed => "Payment settlement failed",
        other => other.as_str(),
    }
}

fn settlement_header(settlement: &SettlementResult) -> Result<HeaderValue, Rejection> {
    let encoded = settlement.to_envelope().map_err(|e| {
        Rejection::new(ErrorKind::SettlementFailed, format!("Failed to encode settlement: {e}"))
    })?;
    HeaderValue::from_str(&encoded).map_err(|e| {
        Rejection::new(ErrorKind::SettlementFailed, format!("Failed to encode settlement: {e}"))
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use paygate_types::proto::{AtomicAmount, SupportedResponse};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, thiserror::Error)]
    #[error("http://facilitator.internal:8080 answered {0}")]
    pub struct ScriptedError(pub ErrorKind);

    impl HasErrorKind for ScriptedError {
        fn error_kind(&self) -> ErrorKind {
            self.0
        }
    }

    #[derive(Debug, Clone, Copy)]
    pub enum Script {
        Succeed,
        Refuse(&'static str),
        Fail(ErrorKind),
        Hang,
    }

    /// An in-process facilitator answering according to a script.
    #[derive(Debug, Clone)]
    pub struct ScriptedFacilitator {
        pub verify: Script,
        pub settle: Script,
        pub verify_calls: Arc<AtomicUsize>,
        pub settle_calls: Arc<AtomicUsize>,
    }

    impl ScriptedFacilitator {
        pub fn new(verify: Script, settle: Script) -> Self {
            Self {
                verify,
                settle,
                verify_calls: Arc::default(),
                settle_calls: Arc::default(),
            }
        }

        pub fn calls(&self) -> (usize, usize) {
            (
                self.verify_calls.load(Ordering::SeqCst),
                self.settle_calls.load(Ordering::SeqCst),
            )
        }
    }

    impl Facilitator for ScriptedFacilitator {
        type Error = ScriptedError;

        async fn verify(&self, _: &VerifyRequest) -> Result<VerificationResult, ScriptedError> {
            self.verify_calls.fetch_add(1, Ordering::SeqCst);
            match self.verify {
                Script::Succeed => Ok(VerificationResult::valid("0xpayer")),
                Script::Refuse(reason) => Ok(VerificationResult::invalid("0xpayer", reason)),
                Script::Fail(kind) => Err(ScriptedError(kind)),
                Script::Hang => std::future::pending().await,
            }
        }

        async fn settle(&self, request: &VerifyRequest) -> Result<SettlementResult, ScriptedError> {
            self.settle_calls.fetch_add(1, Ordering::SeqCst);
            let network = request.payment_requirements.network.clone();
            match self.settle {
                Script::Succeed => Ok(SettlementResult::success("0xtx", "0xpayer", network)),
                Script::Refuse(reason) => Ok(SettlementResult::failure(reason, network)),
                Script::Fail(kind) => Err(ScriptedError(kind)),
                Script::Hang => std::future::pending().await,
            }
        }

        async fn supported(&self) -> Result<SupportedResponse, ScriptedError> {
            Ok(SupportedResponse::default())
        }
    }

    pub fn offer(network: &str, amount: u64) -> Requirement {
        Requirement {
            scheme: "exact".into(),
            network: network.into(),
            max_amount_required: AtomicAmount::from(amount),
            resource: "https://api.example.com/report".into(),
            description: "Quarterly report".into(),
            mime_type: "application/json".into(),
            output_schema: None,
            pay_to: "0x209693Bc6afc0C5328bA36FaF03C514EF312287C".into(),
            max_timeout_seconds: 300,
            asset: "0x036CbD53842c5426634e7929541eC2318f3dCF7e".into(),
            extra: None,
        }
    }

    pub fn paid_headers(network: &str, version: u8) -> HeaderMap {
        let authorization = Authorization {
            x402_version: ProtocolVersion(version),
            scheme: "exact".into(),
            network: network.into(),
            payload: json!({ "signature": "0xsig" }),
        };
        let mut headers = HeaderMap::new();
        headers.insert(
            PAYMENT_HEADER,
            HeaderValue::from_str(&authorization.to_envelope().unwrap()).unwrap(),
        );
        headers
    }

    fn gate(facilitator: ScriptedFacilitator) -> Gate<ScriptedFacilitator> {
        Gate::new(facilitator, vec![offer("base-sepolia", 1000)]).unwrap()
    }

    async fn run(gate: &Gate<ScriptedFacilitator>, headers: &HeaderMap) -> GateOutcome {
        gate.evaluate(headers, &CancellationToken::new()).await
    }

    fn rejected_kind(outcome: &GateOutcome) -> ErrorKind {
        match outcome.result() {
            Err(rejection) => rejection.kind(),
            Ok(_) => panic!("expected rejection, got {:?}", outcome.path()),
        }
    }

    use GateStage::*;

    #[test]
    fn empty_offer_set_is_refused() {
        let facilitator = ScriptedFacilitator::new(Script::Succeed, Script::Succeed);
        let err = Gate::new(facilitator, vec![]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoPaymentRequirements);
    }

    #[tokio::test]
    async fn missing_header_requires_payment() {
        let facilitator = ScriptedFacilitator::new(Script::Succeed, Script::Succeed);
        let gate = gate(facilitator.clone());
        let outcome = run(&gate, &HeaderMap::new()).await;
        assert_eq!(outcome.path(), [NoAuthorization, Rejected]);
        assert_eq!(rejected_kind(&outcome), ErrorKind::PaymentRequired);
        assert_eq!(facilitator.calls(), (0, 0));

        let response: Response<Vec<u8>> = gate.reject(&outcome.into_result().unwrap_err());
        assert_eq!(response.status(), http::StatusCode::PAYMENT_REQUIRED);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["x402Version"], 1);
        assert_eq!(body["accepts"][0]["network"], "base-sepolia");
        assert_eq!(body["accepts"][0]["maxAmountRequired"], "1000");
        assert_eq!(body["error"], "X-PAYMENT header is required");
    }

    #[tokio::test]
    async fn empty_header_requires_payment() {
        let gate = gate(ScriptedFacilitator::new(Script::Succeed, Script::Succeed));
        let mut headers = HeaderMap::new();
        headers.insert(PAYMENT_HEADER, HeaderValue::from_static(""));
        let outcome = run(&gate, &headers).await;
        assert_eq!(rejected_kind(&outcome), ErrorKind::PaymentRequired);
    }

    #[tokio::test]
    async fn malformed_header_is_rejected() {
        let facilitator = ScriptedFacilitator::new(Script::Succeed, Script::Succeed);
        let gate = gate(facilitator.clone());
        let mut headers = HeaderMap::new();
        headers.insert(PAYMENT_HEADER, HeaderValue::from_static("bm90IGpzb24="));
        let outcome = run(&gate, &headers).await;
        assert_eq!(outcome.path(), [NoAuthorization, AuthorizationParsed, Rejected]);
        assert_eq!(rejected_kind(&outcome), ErrorKind::MalformedHeader);
        assert_eq!(facilitator.calls(), (0, 0));

        let response: Response<Vec<u8>> = gate.reject(&outcome.into_result().unwrap_err());
        assert_eq!(response.status(), http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn wrong_version_is_rejected_before_verify() {
        let facilitator = ScriptedFacilitator::new(Script::Succeed, Script::Succeed);
        let gate = gate(facilitator.clone()).with_protocol_version(ProtocolVersion(2));
        let outcome = run(&gate, &paid_headers("base-sepolia", 1)).await;
        assert_eq!(outcome.path(), [NoAuthorization, AuthorizationParsed, Rejected]);
        assert_eq!(rejected_kind(&outcome), ErrorKind::UnsupportedVersion);
        assert_eq!(facilitator.calls(), (0, 0));
    }

    #[tokio::test]
    async fn wrong_version_wins_over_structural_errors() {
        let gate = gate(ScriptedFacilitator::new(Script::Succeed, Script::Succeed));
        let text = paygate_types::util::Base64Bytes::encode(br#"{"x402Version":9}"#).to_string();
        let mut headers = HeaderMap::new();
        headers.insert(PAYMENT_HEADER, HeaderValue::from_str(&text).unwrap());
        let outcome = run(&gate, &headers).await;
        assert_eq!(rejected_kind(&outcome), ErrorKind::UnsupportedVersion);
    }

    #[tokio::test]
    async fn unmatched_network_is_rejected_before_verify() {
        let facilitator = ScriptedFacilitator::new(Script::Succeed, Script::Succeed);
        let gate = gate(facilitator.clone());
        let outcome = run(&gate, &paid_headers("polygon", 1)).await;
        assert_eq!(outcome.path(), [NoAuthorization, AuthorizationParsed, Rejected]);
        assert_eq!(rejected_kind(&outcome), ErrorKind::InvalidRequirements);
        assert_eq!(facilitator.calls(), (0, 0));
    }

    #[tokio::test]
    async fn invalid_verdict_is_verification_failure() {
        let facilitator =
            ScriptedFacilitator::new(Script::Refuse("insufficient_funds"), Script::Succeed);
        let gate = gate(facilitator.clone());
        let outcome = run(&gate, &paid_headers("base-sepolia", 1)).await;
        assert_eq!(
            outcome.path(),
            [NoAuthorization, AuthorizationParsed, VerifiedPending, Rejected]
        );
        assert_eq!(rejected_kind(&outcome), ErrorKind::VerificationFailed);
        assert_eq!(facilitator.calls(), (1, 0));

        let response: Response<Vec<u8>> = gate.reject(&outcome.into_result().unwrap_err());
        assert_eq!(response.status(), http::StatusCode::PAYMENT_REQUIRED);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert!(body["error"].as_str().unwrap().contains("insufficient_funds"));
        assert_eq!(body["accepts"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn verify_timeout_is_service_unavailable() {
        let facilitator =
            ScriptedFacilitator::new(Script::Fail(ErrorKind::VerificationTimeout), Script::Succeed);
        let gate = gate(facilitator.clone());
        let outcome = run(&gate, &paid_headers("base-sepolia", 1)).await;
        assert_eq!(rejected_kind(&outcome), ErrorKind::VerificationTimeout);
        assert_eq!(facilitator.calls(), (1, 0));
        let response: Response<Vec<u8>> = gate.reject(&outcome.into_result().unwrap_err());
        assert_eq!(response.status(), http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn facilitator_failure_details_stay_out_of_the_response() {
        let facilitator = ScriptedFacilitator::new(
            Script::Fail(ErrorKind::FacilitatorUnavailable),
            Script::Succeed,
        );
        let gate = gate(facilitator);
        let outcome = run(&gate, &paid_headers("base-sepolia", 1)).await;
        let rejection = outcome.into_result().unwrap_err();
        assert_eq!(rejection.kind(), ErrorKind::FacilitatorUnavailable);
        assert_eq!(rejection.message(), "Payment facilitator unavailable");
        let cause = std::error::Error::source(&rejection).unwrap().to_string();
        assert!(cause.contains("facilitator.internal"), "{cause}");

        let response: Response<Vec<u8>> = gate.reject(&rejection);
        assert_eq!(response.status(), http::StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        let error = body["error"].as_str().unwrap();
        assert_eq!(error, "Payment facilitator unavailable");
        assert!(!error.contains("facilitator.internal"));
        assert_eq!(body["kind"], "facilitator_unavailable");
    }

    #[tokio::test]
    async fn verify_only_grants_without_settling() {
        let facilitator = ScriptedFacilitator::new(Script::Succeed, Script::Succeed);
        let gate = gate(facilitator.clone()).verify_only(true);
        let outcome = run(&gate, &paid_headers("base-sepolia", 1)).await;
        assert_eq!(
            outcome.path(),
            [NoAuthorization, AuthorizationParsed, VerifiedPending, VerifySkipped, Granted]
        );
        let context = outcome.into_result().unwrap();
        assert!(context.settlement().is_none());
        assert!(context.settlement_header().is_none());
        assert_eq!(context.payer(), "0xpayer");
        assert_eq!(facilitator.calls(), (1, 0));
    }

    #[tokio::test]
    async fn settled_payment_is_granted() {
        let facilitator = ScriptedFacilitator::new(Script::Succeed, Script::Succeed);
        let gate = gate(facilitator.clone());
        let outcome = run(&gate, &paid_headers("base-sepolia", 1)).await;
        assert_eq!(
            outcome.path(),
            [NoAuthorization, AuthorizationParsed, VerifiedPending, SettledPending, Granted]
        );
        let context = outcome.into_result().unwrap();
        assert_eq!(context.requirement().network, "base-sepolia");
        assert_eq!(context.settlement().unwrap().transaction, "0xtx");
        let header = context.settlement_header().unwrap().to_str().unwrap();
        let decoded = SettlementResult::from_envelope(header).unwrap();
        assert_eq!(Some(&decoded), context.settlement());
        assert_eq!(facilitator.calls(), (1, 1));
    }

    #[tokio::test]
    async fn unsuccessful_settlement_is_rejected() {
        let facilitator = ScriptedFacilitator::new(Script::Succeed, Script::Refuse("nonce_used"));
        let gate = gate(facilitator.clone());
        let outcome = run(&gate, &paid_headers("base-sepolia", 1)).await;
        assert_eq!(
            outcome.path(),
            [NoAuthorization, AuthorizationParsed, VerifiedPending, SettledPending, Rejected]
        );
        assert_eq!(rejected_kind(&outcome), ErrorKind::SettlementFailed);
        let response: Response<Vec<u8>> = gate.reject(&outcome.into_result().unwrap_err());
        assert_eq!(response.status(), http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn settle_timeout_is_rejected() {
        let facilitator =
            ScriptedFacilitator::new(Script::Succeed, Script::Fail(ErrorKind::SettlementTimeout));
        let gate = gate(facilitator.clone());
        let outcome = run(&gate, &paid_headers("base-sepolia", 1)).await;
        assert_eq!(rejected_kind(&outcome), ErrorKind::SettlementTimeout);
        assert_eq!(facilitator.calls(), (1, 1));
    }

    #[tokio::test]
    async fn cancellation_ends_in_cancelled() {
        let facilitator = ScriptedFacilitator::new(Script::Hang, Script::Succeed);
        let gate = gate(facilitator.clone());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let outcome = gate.evaluate(&paid_headers("base-sepolia", 1), &cancel).await;
        assert_eq!(
            outcome.path(),
            [NoAuthorization, AuthorizationParsed, VerifiedPending, Rejected]
        );
        assert_eq!(rejected_kind(&outcome), ErrorKind::Cancelled);
        assert_eq!(facilitator.calls(), (1, 0));
    }

    #[tokio::test]
    async fn handle_runs_operation_only_when_granted() {
        let facilitator = ScriptedFacilitator::new(Script::Succeed, Script::Succeed);
        let gate = gate(facilitator);
        let invoked = AtomicUsize::new(0);
        let cancel = CancellationToken::new();

        let operation = async |payment: &PaymentContext| {
            invoked.fetch_add(1, Ordering::SeqCst);
            Response::new(payment.payer().as_bytes().to_vec())
        };
        let response = gate.handle(&HeaderMap::new(), &cancel, operation).await;
        assert_eq!(response.status(), http::StatusCode::PAYMENT_REQUIRED);
        assert_eq!(invoked.load(Ordering::SeqCst), 0);

        let operation = async |payment: &PaymentContext| {
            invoked.fetch_add(1, Ordering::SeqCst);
            Response::new(payment.payer().as_bytes().to_vec())
        };
        let response = gate
            .handle(&paid_headers("base-sepolia", 1), &cancel, operation)
            .await;
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(response.body(), b"0xpayer");
        assert!(response.headers().contains_key(PAYMENT_RESPONSE_HEADER));
        assert_eq!(invoked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handle_in_verify_only_mode_sets_no_settlement_header() {
        let facilitator = ScriptedFacilitator::new(Script::Succeed, Script::Succeed);
        let gate = gate(facilitator).verify_only(true);
        let response = gate
            .handle(
                &paid_headers("base-sepolia", 1),
                &CancellationToken::new(),
                async |_: &PaymentContext| Response::new(Vec::new()),
            )
            .await;
        assert_eq!(response.status(), http::StatusCode::OK);
        assert!(!response.headers().contains_key(PAYMENT_RESPONSE_HEADER));
    }
}
