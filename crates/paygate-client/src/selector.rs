//! Choosing which offer to pay and which signer pays it.

use async_trait::async_trait;
use paygate_types::proto::{Authorization, Requirement};
use std::sync::Arc;

use crate::error::PaymentError;
use crate::signer::SignerCapability;

/// Picks one (requirement, signer) pair out of the offers and signs it.
///
/// Selection must be deterministic: the same offers and the same registered
/// signers always produce the same choice.
#[async_trait]
pub trait PaymentSelector: Send + Sync {
    async fn select_and_sign(
        &self,
        requirements: &[Requirement],
        capabilities: &[Arc<dyn SignerCapability>],
    ) -> Result<Authorization, PaymentError>;
}

/// Default selector.
///
/// Walks the offers in server order and, for each, the signers in ascending
/// priority (registration order on ties). The first signer that can sign the
/// first satisfiable offer is used; a failure from that signer is returned
/// without trying other pairs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityFirstMatch;

impl PriorityFirstMatch {
    /// The pair that would be signed, without signing it.
    pub fn select<'a>(
        &self,
        requirements: &'a [Requirement],
        capabilities: &'a [Arc<dyn SignerCapability>],
    ) -> Option<(&'a Requirement, &'a Arc<dyn SignerCapability>)> {
        let mut ordered: Vec<&Arc<dyn SignerCapability>> = capabilities.iter().collect();
        ordered.sort_by_key(|c| c.priority());
        requirements.iter().find_map(|requirement| {
            ordered
                .iter()
                .find(|c| c.can_sign(requirement))
                .map(|c| (requirement, *c))
        })
    }
}

#[async_trait]
impl PaymentSelector for PriorityFirstMatch {
    async fn select_and_sign(
        &self,
        requirements: &[Requirement],
        capabilities: &[Arc<dyn SignerCapability>],
    ) -> Result<Authorization, PaymentError> {
        if requirements.is_empty() {
            return Err(PaymentError::NoPaymentRequirements);
        }
        let (requirement, capability) = self
            .select(requirements, capabilities)
            .ok_or(PaymentError::NoValidSigner)?;
        tracing::debug!(
            scheme = %requirement.scheme,
            network = %requirement.network,
            asset = %requirement.asset,
            "selected payment requirement"
        );
        capability.sign(requirement).await
    }
}
