//! Gate configuration loaded from JSON.
//!
//! ```json
//! {
//!   "facilitator": {
//!     "url": "https://facilitator.example.com/",
//!     "fallbackUrl": "$BACKUP_FACILITATOR_URL",
//!     "verifyTimeoutMs": 5000,
//!     "settleTimeoutMs": 60000,
//!     "headers": { "authorization": "${FACILITATOR_TOKEN}" }
//!   },
//!   "verifyOnly": false,
//!   "requirements": [
//!     {
//!       "network": "base-sepolia",
//!       "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
//!       "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
//!       "price": "0.01",
//!       "decimals": 6,
//!       "resource": "https://api.example.com/report"
//!     }
//!   ]
//! }
//! ```
//!
//! Environment references are resolved while the document is parsed; a
//! missing variable fails the load.

use http::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderName, InvalidHeaderValue};
use paygate_server::facilitator_client::{
    FacilitatorClient, FacilitatorClientError, FacilitatorEndpoint,
};
use paygate_server::gate::{Gate, Rejection};
use paygate_types::config::LiteralOrEnv;
use paygate_types::proto::{ProtocolVersion, RequirementSet};
use paygate_types::requirement::{RequirementConfig, RequirementError, build_requirement};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("Invalid requirement #{index}: {source}")]
    Requirement {
        index: usize,
        #[source]
        source: RequirementError,
    },
    #[error("Invalid facilitator configuration: {0}")]
    Facilitator(#[from] FacilitatorClientError),
    #[error("Invalid facilitator header name '{0}': {1}")]
    HeaderName(String, #[source] InvalidHeaderName),
    #[error("Invalid value for facilitator header '{0}': {1}")]
    HeaderValue(String, #[source] InvalidHeaderValue),
    #[error("Invalid gate configuration: {0}")]
    Gate(#[from] Rejection),
}

/// Where and how to reach the facilitator.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilitatorConfig {
    pub url: LiteralOrEnv<Url>,
    #[serde(default)]
    pub fallback_url: Option<LiteralOrEnv<Url>>,
    #[serde(default)]
    pub verify_timeout_ms: Option<u64>,
    #[serde(default)]
    pub settle_timeout_ms: Option<u64>,
    /// `0` disables caching of `/supported`.
    #[serde(default)]
    pub supported_cache_ttl_secs: Option<u64>,
    /// Sent with every facilitator request, e.g. an API key.
    #[serde(default)]
    pub headers: BTreeMap<String, LiteralOrEnv<String>>,
}

impl FacilitatorConfig {
    fn header_map(&self) -> Result<HeaderMap, ConfigError> {
        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let header_name = HeaderName::try_from(name.as_str())
                .map_err(|e| ConfigError::HeaderName(name.clone(), e))?;
            let header_value = HeaderValue::from_str(value.inner())
                .map_err(|e| ConfigError::HeaderValue(name.clone(), e))?;
            headers.insert(header_name, header_value);
        }
        Ok(headers)
    }

    /// Builds the facilitator client this section describes.
    pub fn client(&self) -> Result<FacilitatorClient, ConfigError> {
        let primary = FacilitatorEndpoint::parse(self.url.as_str())?;
        let mut client = FacilitatorClient::new(primary).with_headers(self.header_map()?);
        if let Some(fallback) = &self.fallback_url {
            client = client.with_fallback(FacilitatorEndpoint::parse(fallback.as_str())?);
        }
        if let Some(ms) = self.verify_timeout_ms {
            client = client.with_verify_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.settle_timeout_ms {
            client = client.with_settle_timeout(Duration::from_millis(ms));
        }
        if let Some(secs) = self.supported_cache_ttl_secs {
            client = client.with_supported_cache_ttl(Duration::from_secs(secs));
        }
        Ok(client)
    }
}

/// Everything needed to guard one resource.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaygateConfig {
    pub facilitator: FacilitatorConfig,
    #[serde(default)]
    pub verify_only: bool,
    #[serde(default)]
    pub protocol_version: ProtocolVersion,
    pub requirements: Vec<RequirementConfig>,
}

impl PaygateConfig {
    /// Reads and parses a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::FileRead(path.to_path_buf(), e))?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validates and builds the offers, keeping their configured order.
    pub fn requirements(&self) -> Result<RequirementSet, ConfigError> {
        self.requirements
            .iter()
            .enumerate()
            .map(|(index, config)| {
                build_requirement(config)
                    .map_err(|source| ConfigError::Requirement { index, source })
            })
            .collect()
    }

    pub fn facilitator_client(&self) -> Result<FacilitatorClient, ConfigError> {
        self.facilitator.client()
    }

    /// Builds a ready gate talking to the configured facilitator.
    pub fn into_gate(self) -> Result<Gate<FacilitatorClient>, ConfigError> {
        let accepts = self.requirements()?;
        let facilitator = self.facilitator_client()?;
        tracing::debug!(
            offers = accepts.len(),
            verify_only = self.verify_only,
            facilitator = %facilitator.base_url(),
            "gate configured"
        );
        let gate = Gate::new(facilitator, accepts)?
            .verify_only(self.verify_only)
            .with_protocol_version(self.protocol_version);
        Ok(gate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paygate_types::proto::AtomicAmount;

    const CONFIG: &str = r#"{
        "facilitator": {
            "url": "https://facilitator.example.com/v1",
            "fallbackUrl": "https://backup.example.com/",
            "verifyTimeoutMs": 1500,
            "headers": { "x-api-key": "secret" }
        },
        "verifyOnly": true,
        "requirements": [
            {
                "network": "base-sepolia",
                "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
                "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                "price": "$0.01",
                "decimals": 6
            },
            {
                "network": "solana-devnet",
                "asset": "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU",
                "payTo": "EGBQqKn968sVv5cQh5Cr72pSTHfxsuzq7o7asqYB5uEV",
                "maxAmountRequired": "20000"
            }
        ]
    }"#;

    #[test]
    fn builds_gate_from_document() {
        let gate = PaygateConfig::from_json(CONFIG).unwrap().into_gate().unwrap();
        assert!(gate.is_verify_only());
        assert_eq!(gate.protocol_version(), ProtocolVersion::V1);
        let accepts = gate.accepts();
        assert_eq!(accepts.len(), 2);
        assert_eq!(accepts[0].max_amount_required, AtomicAmount::from(10_000u64));
        assert_eq!(accepts[1].network, "solana-devnet");

        let facilitator = gate.facilitator();
        assert_eq!(
            facilitator.verify_url().as_str(),
            "https://facilitator.example.com/v1/verify"
        );
        assert_eq!(
            facilitator.fallback().unwrap().base_url().as_str(),
            "https://backup.example.com/"
        );
        assert_eq!(facilitator.verify_timeout(), Duration::from_millis(1500));
        assert_eq!(facilitator.settle_timeout(), FacilitatorClient::DEFAULT_SETTLE_TIMEOUT);
        assert_eq!(facilitator.headers()["x-api-key"], "secret");
    }

    #[test]
    fn reports_which_requirement_is_invalid() {
        let json = CONFIG.replace(r#""decimals": 6"#, r#""decimals": 1"#);
        let err = PaygateConfig::from_json(&json).unwrap().into_gate().unwrap_err();
        assert!(matches!(err, ConfigError::Requirement { index: 0, .. }), "{err}");
    }

    #[test]
    fn empty_requirements_are_refused() {
        let json = r#"{ "facilitator": { "url": "https://f.example.com/" }, "requirements": [] }"#;
        let err = PaygateConfig::from_json(json).unwrap().into_gate().unwrap_err();
        assert!(matches!(err, ConfigError::Gate(_)));
    }

    #[test]
    fn facilitator_url_from_environment() {
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("PAYGATE_CONFIG_TEST_FACILITATOR", "https://env.example.com/") };
        let json = r#"{
            "facilitator": { "url": "${PAYGATE_CONFIG_TEST_FACILITATOR}" },
            "requirements": []
        }"#;
        let config = PaygateConfig::from_json(json).unwrap();
        let client = config.facilitator_client().unwrap();
        assert_eq!(client.base_url().host_str(), Some("env.example.com"));
    }

    #[test]
    fn missing_environment_variable_fails_load() {
        let json = r#"{
            "facilitator": { "url": "$PAYGATE_CONFIG_TEST_UNSET" },
            "requirements": []
        }"#;
        assert!(matches!(
            PaygateConfig::from_json(json),
            Err(ConfigError::JsonParse(_))
        ));
    }

    #[test]
    fn invalid_header_name_is_reported() {
        let json = r#"{
            "facilitator": { "url": "https://f.example.com/", "headers": { "bad header": "x" } },
            "requirements": []
        }"#;
        let err = PaygateConfig::from_json(json).unwrap().facilitator_client().unwrap_err();
        assert!(matches!(err, ConfigError::HeaderName(..)));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = PaygateConfig::load("/nonexistent/paygate.json").unwrap_err();
        assert!(matches!(err, ConfigError::FileRead(..)));
    }
}
