//! Building offers from operator configuration.
//!
//! [`RequirementConfig`] is what an operator writes; [`build_requirement`]
//! validates it and produces the wire-level [`Requirement`]. Nothing here
//! touches the network.

use serde::{Deserialize, Serialize};

use crate::networks;
use crate::proto::{AtomicAmount, DEFAULT_MIME_TYPE, Requirement};
use crate::util::{MoneyAmount, MoneyAmountParseError};

/// Scheme used when a configuration does not name one.
pub const DEFAULT_SCHEME: &str = "exact";
/// Authorization validity window used when a configuration does not set one.
pub const DEFAULT_MAX_TIMEOUT_SECONDS: u64 = 300;

fn default_scheme() -> String {
    DEFAULT_SCHEME.to_string()
}

fn default_max_timeout_seconds() -> u64 {
    DEFAULT_MAX_TIMEOUT_SECONDS
}

fn default_mime_type() -> String {
    DEFAULT_MIME_TYPE.to_string()
}

/// Operator-facing description of one offer.
///
/// The price is given either as a human amount plus the asset's `decimals`:
///
/// ```json
/// { "network": "base-sepolia", "asset": "0x036C…", "payTo": "0x2096…",
///   "price": "$0.01", "decimals": 6 }
/// ```
///
/// or directly in atomic units with `"maxAmountRequired": "10000"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementConfig {
    #[serde(default = "default_scheme")]
    pub scheme: String,
    pub network: String,
    pub asset: String,
    pub pay_to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_amount_required: Option<String>,
    #[serde(default = "default_max_timeout_seconds")]
    pub max_timeout_seconds: u64,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Map<String, serde_json::Value>>,
}

impl RequirementConfig {
    /// A config with a human price; the remaining fields take their defaults.
    pub fn new(
        network: impl Into<String>,
        asset: impl Into<String>,
        pay_to: impl Into<String>,
        price: impl Into<String>,
        decimals: u32,
    ) -> Self {
        Self {
            scheme: default_scheme(),
            network: network.into(),
            asset: asset.into(),
            pay_to: pay_to.into(),
            price: Some(price.into()),
            decimals: Some(decimals),
            max_amount_required: None,
            max_timeout_seconds: DEFAULT_MAX_TIMEOUT_SECONDS,
            resource: String::new(),
            description: String::new(),
            mime_type: default_mime_type(),
            output_schema: None,
            extra: None,
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_extra(mut self, extra: serde_json::Map<String, serde_json::Value>) -> Self {
        self.extra = Some(extra);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RequirementError {
    #[error("requirement field `{0}` must not be empty")]
    EmptyField(&'static str),
    #[error("requirement needs either `price` with `decimals` or `maxAmountRequired`")]
    MissingAmount,
    #[error("requirement sets both `price` and `maxAmountRequired`")]
    AmbiguousAmount,
    #[error("requirement `price` needs the asset's `decimals`")]
    MissingDecimals,
    #[error("invalid price: {0}")]
    Price(#[from] MoneyAmountParseError),
    #[error("invalid maxAmountRequired: {0}")]
    Atomic(#[from] crate::proto::AtomicAmountParseError),
    #[error("maxTimeoutSeconds must be positive")]
    ZeroTimeout,
}

/// Validates a configured offer and produces the wire-level requirement.
///
/// Unknown networks are accepted: the network namespace is open-ended.
pub fn build_requirement(config: &RequirementConfig) -> Result<Requirement, RequirementError> {
    let non_empty = |field: &'static str, value: &str| {
        if value.trim().is_empty() {
            Err(RequirementError::EmptyField(field))
        } else {
            Ok(())
        }
    };
    non_empty("scheme", &config.scheme)?;
    non_empty("network", &config.network)?;
    non_empty("payTo", &config.pay_to)?;
    non_empty("asset", &config.asset)?;
    if config.max_timeout_seconds == 0 {
        return Err(RequirementError::ZeroTimeout);
    }
    if !networks::is_known_network(&config.network) {
        tracing::debug!(
            network = %config.network,
            "requirement uses a network outside the known registry"
        );
    }

    let max_amount_required = match (&config.price, &config.max_amount_required) {
        (Some(_), Some(_)) => return Err(RequirementError::AmbiguousAmount),
        (None, None) => return Err(RequirementError::MissingAmount),
        (Some(price), None) => {
            let decimals = config.decimals.ok_or(RequirementError::MissingDecimals)?;
            MoneyAmount::parse(price)?.to_atomic(decimals)?
        }
        (None, Some(atomic)) => atomic.parse::<AtomicAmount>()?,
    };

    Ok(Requirement {
        scheme: config.scheme.clone(),
        network: config.network.clone(),
        max_amount_required,
        resource: config.resource.clone(),
        description: config.description.clone(),
        mime_type: config.mime_type.clone(),
        output_schema: config.output_schema.clone(),
        pay_to: config.pay_to.clone(),
        max_timeout_seconds: config.max_timeout_seconds,
        asset: config.asset.clone(),
        extra: config.extra.clone(),
    })
}

impl TryFrom<&RequirementConfig> for Requirement {
    type Error = RequirementError;

    fn try_from(config: &RequirementConfig) -> Result<Self, Self::Error> {
        build_requirement(config)
    }
}
