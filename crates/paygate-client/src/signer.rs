//! Signer capabilities: what a buyer is able and willing to pay with.
//!
//! A [`SignerCapability`] wraps one wallet on one network for one scheme,
//! together with the tokens it holds and an optional spending ceiling. The
//! client never looks inside the signed payload; it only asks capabilities
//! whether they can sign a requirement and, if so, to sign it.

use async_trait::async_trait;
use paygate_types::error::BoxError;
use paygate_types::proto::{AtomicAmount, Authorization, ProtocolVersion, Requirement};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::PaymentError;

/// A token a signer holds. Lower `priority` is preferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenConfig {
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
    #[serde(default)]
    pub priority: i32,
}

impl TokenConfig {
    pub fn new(address: impl Into<String>, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            address: address.into(),
            symbol: symbol.into(),
            decimals,
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Asset identifiers are compared case-insensitively.
    pub fn matches_asset(&self, asset: &str) -> bool {
        self.address.eq_ignore_ascii_case(asset)
    }
}

/// Tokens in preference order: ascending priority, configuration order on ties.
pub fn ordered_tokens(tokens: &[TokenConfig]) -> Vec<&TokenConfig> {
    let mut ordered: Vec<&TokenConfig> = tokens.iter().collect();
    ordered.sort_by_key(|t| t.priority);
    ordered
}

/// The most preferred token that pays for `requirement`'s asset.
pub fn matching_token<'a>(
    tokens: &'a [TokenConfig],
    requirement: &Requirement,
) -> Option<&'a TokenConfig> {
    ordered_tokens(tokens)
        .into_iter()
        .find(|t| t.matches_asset(&requirement.asset))
}

/// One way the buyer can pay.
///
/// `can_sign` must stay a pure predicate. `sign` may do I/O (fetch a nonce,
/// read chain state) and must re-check the same conditions before producing
/// anything, failing with [`PaymentError::NoValidSigner`] or
/// [`PaymentError::AmountExceeded`] when they no longer hold.
#[async_trait]
pub trait SignerCapability: Send + Sync {
    fn network(&self) -> &str;

    fn scheme(&self) -> &str;

    fn tokens(&self) -> &[TokenConfig];

    /// Upper bound on `maxAmountRequired` this signer agrees to, if any.
    fn max_amount(&self) -> Option<AtomicAmount>;

    /// Lower is preferred when several signers can pay the same requirement.
    fn priority(&self) -> i32 {
        0
    }

    fn can_sign(&self, requirement: &Requirement) -> bool {
        check_requirement(self, requirement).is_ok()
    }

    async fn sign(&self, requirement: &Requirement) -> Result<Authorization, PaymentError>;
}

/// Checks every signing precondition, reporting which one failed.
///
/// Network, scheme and asset mismatches are [`PaymentError::NoValidSigner`];
/// an amount above the ceiling is [`PaymentError::AmountExceeded`].
pub fn check_requirement<C>(capability: &C, requirement: &Requirement) -> Result<(), PaymentError>
where
    C: SignerCapability + ?Sized,
{
    let identity_matches =
        capability.network() == requirement.network && capability.scheme() == requirement.scheme;
    if !identity_matches || matching_token(capability.tokens(), requirement).is_none() {
        return Err(PaymentError::NoValidSigner);
    }
    match capability.max_amount() {
        Some(allowed) if requirement.max_amount_required > allowed => {
            Err(PaymentError::AmountExceeded {
                requested: requirement.max_amount_required,
                allowed,
            })
        }
        _ => Ok(()),
    }
}

/// Produces the scheme-specific payload for an authorization.
///
/// Implementations hold the key material and know the scheme's signing
/// format; [`ConfiguredSigner`] handles everything around them.
#[async_trait]
pub trait PayloadSigner: Send + Sync {
    async fn sign_payload(
        &self,
        requirement: &Requirement,
        token: &TokenConfig,
    ) -> Result<serde_json::Value, BoxError>;
}

#[async_trait]
impl<T: PayloadSigner + ?Sized> PayloadSigner for Arc<T> {
    async fn sign_payload(
        &self,
        requirement: &Requirement,
        token: &TokenConfig,
    ) -> Result<serde_json::Value, BoxError> {
        self.as_ref().sign_payload(requirement, token).await
    }
}

/// A [`SignerCapability`] assembled from configuration and a [`PayloadSigner`].
///
/// ```rust,ignore
/// let signer = ConfiguredSigner::new("base-sepolia", "exact", wallet)
///     .with_token(TokenConfig::new(USDC, "USDC", 6))
///     .with_max_amount(AtomicAmount::from(1_000_000u64));
/// ```
#[derive(Debug, Clone)]
pub struct ConfiguredSigner<P> {
    network: String,
    scheme: String,
    tokens: Vec<TokenConfig>,
    max_amount: Option<AtomicAmount>,
    priority: i32,
    protocol_version: ProtocolVersion,
    payload_signer: P,
}

impl<P> ConfiguredSigner<P> {
    pub fn new(network: impl Into<String>, scheme: impl Into<String>, payload_signer: P) -> Self {
        Self {
            network: network.into(),
            scheme: scheme.into(),
            tokens: Vec::new(),
            max_amount: None,
            priority: 0,
            protocol_version: ProtocolVersion::V1,
            payload_signer,
        }
    }

    pub fn with_token(mut self, token: TokenConfig) -> Self {
        self.tokens.push(token);
        self
    }

    pub fn with_max_amount(mut self, max_amount: AtomicAmount) -> Self {
        self.max_amount = Some(max_amount);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }
}

#[async_trait]
impl<P: PayloadSigner> SignerCapability for ConfiguredSigner<P> {
    fn network(&self) -> &str {
        &self.network
    }

    fn scheme(&self) -> &str {
        &self.scheme
    }

    fn tokens(&self) -> &[TokenConfig] {
        &self.tokens
    }

    fn max_amount(&self) -> Option<AtomicAmount> {
        self.max_amount
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn sign(&self, requirement: &Requirement) -> Result<Authorization, PaymentError> {
        check_requirement(self, requirement)?;
        let token =
            matching_token(&self.tokens, requirement).ok_or(PaymentError::NoValidSigner)?;
        let payload = self
            .payload_signer
            .sign_payload(requirement, token)
            .await
            .map_err(PaymentError::signing_failed)?;
        Ok(Authorization {
            x402_version: self.protocol_version,
            scheme: requirement.scheme.clone(),
            network: requirement.network.clone(),
            payload,
        })
    }
}
