#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Seller side of HTTP 402 payments.
//!
//! A [`Gate`] guards one protected resource. It decodes the buyer's
//! `X-PAYMENT` header, matches it against the configured offers, and has a
//! facilitator verify and (unless in verify-only mode) settle it before the
//! protected operation runs.
//!
//! ## Quickstart
//!
//! ```rust,ignore
//! use paygate_server::{FacilitatorClient, FacilitatorEndpoint, Gate};
//! use tokio_util::sync::CancellationToken;
//!
//! let facilitator = FacilitatorClient::try_from("https://facilitator.example.com/")?
//!     .with_fallback(FacilitatorEndpoint::parse("https://backup-facilitator.example.com/")?);
//! let gate = Gate::new(facilitator, vec![requirement])?;
//!
//! let response = gate
//!     .handle(request.headers(), &CancellationToken::new(), async |payment| {
//!         http::Response::new(format!("paid by {}", payment.payer()).into_bytes())
//!     })
//!     .await;
//! ```
//!
//! For `tower`/`axum` routers, [`PaygateLayer`] runs the same gate and hands
//! the [`PaymentContext`] to the inner service through the request
//! extensions.
//!
//! ## Modules
//!
//! - [`facilitator_client`] - HTTP client for a remote facilitator, with fallback
//! - [`gate`] - The per-request payment state machine
//! - [`layer`] - `tower` middleware
//! - [`response`] - Rejection to HTTP response mapping

pub mod facilitator_client;
pub mod gate;
pub mod layer;
pub mod response;

pub use facilitator_client::{FacilitatorClient, FacilitatorClientError, FacilitatorEndpoint};
pub use gate::{Gate, GateOutcome, GateStage, PaymentContext, Rejection};
pub use layer::{PaygateLayer, PaygateService};
