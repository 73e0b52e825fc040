#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Buyer side of HTTP 402 payments.
//!
//! Register one [`SignerCapability`] per wallet, network and scheme on an
//! [`X402Client`], attach it to a `reqwest` client, and requests to paid
//! resources are paid for transparently:
//!
//! ```rust,ignore
//! use paygate_client::{ReqwestWithPayments, X402Client};
//!
//! let http = reqwest::Client::new()
//!     .with_payments(X402Client::new().register(my_signer))
//!     .build();
//! let response = http.get("https://api.example.com/report").send().await?;
//! let settlement = paygate_client::settlement_from_headers(response.headers());
//! ```
//!
//! ## Payment Selection
//!
//! When several offers and signers are available, a [`PaymentSelector`]
//! decides. The default [`PriorityFirstMatch`] honours the server's offer
//! order first and the signers' priority second, and never signs when no
//! signer qualifies.

mod builder;
mod client;
mod error;
mod selector;
mod signer;

pub use builder::*;
pub use client::*;
pub use error::*;
pub use selector::*;
pub use signer::*;
