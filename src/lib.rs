//! HTTP-native payment negotiation over the `402 Payment Required` status code.
//!
//! A seller answers unpaid requests with a set of offers. A buyer picks one it
//! can pay, signs an authorization for it, and retries. The seller has a
//! facilitator verify and settle the authorization before serving the
//! resource, and returns the settlement receipt in a response header.
//!
//! # Crates
//!
//! - [`types`] - Wire messages, the header envelope codec, error kinds and the
//!   facilitator contract.
//! - [`client`] - Signer capabilities, payment selection, and a `reqwest`
//!   middleware that pays `402`s.
//! - [`server`] - The facilitator HTTP client, the payment gate, and a `tower` layer.
//! - [`config`] - Loading a gate and its facilitator from a JSON document.
//!
//! # Example
//!
//! ```rust,ignore
//! use paygate::config::PaygateConfig;
//! use paygate::server::PaygateLayer;
//!
//! let gate = PaygateConfig::load("paygate.json")?.into_gate()?;
//! let app = Router::new().route("/report", get(report).layer(PaygateLayer::new(gate)));
//! ```

pub mod config;

pub use paygate_client as client;
pub use paygate_server as server;
pub use paygate_types as types;
