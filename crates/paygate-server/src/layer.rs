//! `tower` middleware enforcing payment on the routes it wraps.
//!
//! ```rust,ignore
//! use axum::{Router, routing::get};
//! use paygate_server::{FacilitatorClient, Gate, PaygateLayer, PaymentContext};
//!
//! let facilitator = FacilitatorClient::try_from("https://facilitator.example.com")?;
//! let gate = Gate::new(facilitator, vec![requirement])?;
//!
//! let app: Router = Router::new().route(
//!     "/report",
//!     get(report).layer(PaygateLayer::new(gate)),
//! );
//!
//! async fn report(Extension(payment): Extension<PaymentContext>) -> String {
//!     format!("paid by {}", payment.payer())
//! }
//! ```
//!
//! A [`CancellationToken`] found in the request extensions is honoured while
//! the facilitator is being called. Without one, the request runs until the
//! facilitator deadlines expire or the future is dropped.

use axum_core::extract::Request;
use axum_core::response::Response;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service, ServiceExt};

use crate::gate::{Gate, PAYMENT_RESPONSE_HEADER};
use paygate_types::facilitator::Facilitator;

/// Wraps a service so that it only runs for paid requests.
#[derive(Debug)]
pub struct PaygateLayer<F> {
    gate: Arc<Gate<F>>,
}

impl<F> Clone for PaygateLayer<F> {
    fn clone(&self) -> Self {
        Self {
            gate: self.gate.clone(),
        }
    }
}

impl<F> PaygateLayer<F> {
    pub fn new(gate: Gate<F>) -> Self {
        Self {
            gate: Arc::new(gate),
        }
    }

    pub fn gate(&self) -> &Gate<F> {
        &self.gate
    }
}

impl<F> From<Arc<Gate<F>>> for PaygateLayer<F> {
    fn from(gate: Arc<Gate<F>>) -> Self {
        Self { gate }
    }
}

impl<S, F> Layer<S> for PaygateLayer<F>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Service = PaygateService<F>;

    fn layer(&self, inner: S) -> Self::Service {
        PaygateService {
            gate: self.gate.clone(),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// Service produced by [`PaygateLayer`].
///
/// Granted requests reach the inner service with their
/// [`PaymentContext`](crate::gate::PaymentContext) in the request extensions.
#[derive(Debug)]
pub struct PaygateService<F> {
    gate: Arc<Gate<F>>,
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl<F> Clone for PaygateService<F> {
    fn clone(&self) -> Self {
        Self {
            gate: self.gate.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<F> Service<Request> for PaygateService<F>
where
    F: Facilitator + Send + Sync + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let gate = self.gate.clone();
        // The clone is not necessarily ready; take the polled one and leave the clone.
        let inner = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, inner);
        Box::pin(async move {
            let cancel = req
                .extensions()
                .get::<CancellationToken>()
                .cloned()
                .unwrap_or_default();
            let headers = req.headers().clone();
            let context = match gate.evaluate(&headers, &cancel).await.into_result() {
                Ok(context) => context,
                Err(rejection) => return Ok(gate.reject(&rejection)),
            };
            let settlement_header = context.settlement_header().cloned();
            req.extensions_mut().insert(context);
            let mut response = inner.oneshot(req).await?;
            if let Some(value) = settlement_header {
                response.headers_mut().insert(PAYMENT_RESPONSE_HEADER, value);
            }
            Ok(response)
        })
    }
}
