//! Attaching an [`X402Client`] to plain `reqwest` clients.
//!
//! ```rust,ignore
//! let http = reqwest::Client::new()
//!     .with_payments(X402Client::new())
//!     .register(base_wallet)
//!     .register(polygon_wallet.with_priority(1))
//!     .build();
//! ```

use reqwest::{Client, ClientBuilder};
use reqwest_middleware as rqm;
use tracing::{debug, warn};

use crate::client::X402Client;
use crate::selector::PaymentSelector;
use crate::signer::SignerCapability;
use paygate_types::proto::ProtocolVersion;

/// Adds payment handling to a [`Client`] or a [`ClientBuilder`].
pub trait ReqwestWithPayments: Sized {
    fn with_payments<S>(self, x402_client: X402Client<S>) -> PaymentsBuilder<Self, S>;
}

impl ReqwestWithPayments for Client {
    fn with_payments<S>(self, x402_client: X402Client<S>) -> PaymentsBuilder<Self, S> {
        PaymentsBuilder {
            inner: self,
            x402_client,
        }
    }
}

impl ReqwestWithPayments for ClientBuilder {
    fn with_payments<S>(self, x402_client: X402Client<S>) -> PaymentsBuilder<Self, S> {
        PaymentsBuilder {
            inner: self,
            x402_client,
        }
    }
}

/// A reqwest client (or builder) and the payment client that will wrap it.
///
/// Signers, the selector and the protocol version can still be adjusted
/// here; they are fixed once the client is built.
pub struct PaymentsBuilder<A, S> {
    inner: A,
    x402_client: X402Client<S>,
}

impl<A, S> PaymentsBuilder<A, S> {
    /// Registers one more signer capability, after those already present.
    pub fn register<C>(mut self, capability: C) -> Self
    where
        C: SignerCapability + 'static,
    {
        self.x402_client = self.x402_client.register(capability);
        self
    }

    pub fn with_selector<P>(self, selector: P) -> PaymentsBuilder<A, P>
    where
        P: PaymentSelector + 'static,
    {
        PaymentsBuilder {
            inner: self.inner,
            x402_client: self.x402_client.with_selector(selector),
        }
    }

    pub fn with_protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.x402_client = self.x402_client.with_protocol_version(version);
        self
    }

    pub fn x402_client(&self) -> &X402Client<S> {
        &self.x402_client
    }
}

fn attach<S>(client: Client, x402_client: X402Client<S>) -> rqm::ClientBuilder
where
    X402Client<S>: rqm::Middleware,
{
    let capabilities = x402_client.capabilities().len();
    if capabilities == 0 {
        warn!("payment middleware has no signer capabilities, every 402 will fail");
    } else {
        debug!(capabilities, "payment middleware attached");
    }
    rqm::ClientBuilder::new(client).with(x402_client)
}

impl<S> PaymentsBuilder<Client, S>
where
    X402Client<S>: rqm::Middleware,
{
    pub fn build(self) -> rqm::ClientWithMiddleware {
        self.builder().build()
    }

    /// The middleware stack with payments first, open for more middleware.
    pub fn builder(self) -> rqm::ClientBuilder {
        attach(self.inner, self.x402_client)
    }
}

impl<S> PaymentsBuilder<ClientBuilder, S>
where
    X402Client<S>: rqm::Middleware,
{
    /// Fails when the underlying `reqwest` builder does.
    pub fn build(self) -> Result<rqm::ClientWithMiddleware, reqwest::Error> {
        self.builder().map(rqm::ClientBuilder::build)
    }

    pub fn builder(self) -> Result<rqm::ClientBuilder, reqwest::Error> {
        Ok(attach(self.inner.build()?, self.x402_client))
    }
}
