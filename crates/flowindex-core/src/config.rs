//! Application configuration.
//!
//! Loaded from a JSON file; every field has a default so a partial (or empty)
//! file is valid. `FLOWINDEX_RPC_URL` overrides the RPC endpoint.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::FlowIndexError;
use crate::indexer::IndexerConfig;
use crate::query::DEFAULT_PAGE_SIZE;
use crate::view::{ContractAddresses, TokenInfo, TokenRegistry};

/// Environment variable that replaces `rpc_url`.
pub const RPC_URL_ENV: &str = "FLOWINDEX_RPC_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowIndexConfig {
    /// JSON-RPC endpoint of the node.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// Forwarder contract used for create/update/delete.
    #[serde(default)]
    pub forwarder: Option<String>,
    /// Agreement contract that emits `FlowUpdated`.
    #[serde(default)]
    pub cfa: Option<String>,
    /// Known tokens. Merged with those from `contracts_file`.
    #[serde(default)]
    pub tokens: Vec<TokenInfo>,
    /// Optional path to the deployment's `contractAddresses.json`.
    #[serde(default)]
    pub contracts_file: Option<String>,
    /// Dashboard refresh interval in seconds.
    #[serde(default = "default_poll_secs")]
    pub poll_interval_secs: u64,
    /// Dashboard page size.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// SQLite database URL (e.g. `sqlite://flows.db`). `None` = in-memory.
    #[serde(default)]
    pub database_url: Option<String>,
    /// Seconds to wait for a submitted transaction to be mined.
    #[serde(default = "default_confirm_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default)]
    pub indexer: IndexerConfig,
}

fn default_rpc_url() -> String { "http://localhost:8545".into() }
fn default_poll_secs() -> u64 { 30 }
fn default_page_size() -> u32 { DEFAULT_PAGE_SIZE }
fn default_confirm_secs() -> u64 { 120 }

impl Default for FlowIndexConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            forwarder: None,
            cfa: None,
            tokens: Vec::new(),
            contracts_file: None,
            poll_interval_secs: default_poll_secs(),
            page_size: default_page_size(),
            database_url: None,
            confirmation_timeout_secs: default_confirm_secs(),
            indexer: IndexerConfig::default(),
        }
    }
}

impl FlowIndexConfig {
    pub fn from_json(json: &str) -> Result<Self, FlowIndexError> {
        serde_json::from_str(json).map_err(|e| FlowIndexError::Config(e.to_string()))
    }

    /// Read `path` and apply the environment override.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FlowIndexError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| FlowIndexError::Config(format!("{}: {e}", path.display())))?;
        let mut config = Self::from_json(&text)?;
        config.apply_env();
        Ok(config)
    }

    /// Defaults plus the environment override, for running without a file.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(RPC_URL_ENV) {
            if !url.trim().is_empty() {
                self.rpc_url = url.trim().to_string();
            }
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    /// Fill `forwarder`, `cfa` and `tokens` from the deployment file, without
    /// overriding values set explicitly.
    pub fn merge_contracts(&mut self, contracts: &ContractAddresses) {
        if self.forwarder.is_none() {
            self.forwarder = contracts.cfav1_forwarder.clone();
        }
        if self.cfa.is_none() {
            self.cfa = contracts.cfa.clone();
        }
        for token in contracts.tokens() {
            let known = self
                .tokens
                .iter()
                .any(|t| t.address.eq_ignore_ascii_case(&token.address));
            if !known {
                self.tokens.push(token);
            }
        }
    }

    /// Read `contracts_file`, if set, and merge it.
    pub fn load_contracts(&mut self) -> Result<(), FlowIndexError> {
        let Some(path) = self.contracts_file.clone() else {
            return Ok(());
        };
        let text = std::fs::read_to_string(&path)
            .map_err(|e| FlowIndexError::Config(format!("{path}: {e}")))?;
        self.merge_contracts(&ContractAddresses::from_json(&text)?);
        Ok(())
    }

    pub fn token_registry(&self) -> TokenRegistry {
        TokenRegistry::new(self.tokens.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = FlowIndexConfig::from_json("{}").unwrap();
        assert_eq!(cfg.rpc_url, "http://localhost:8545");
        assert_eq!(cfg.poll_interval(), Duration::from_secs(30));
        assert_eq!(cfg.page_size, 100);
        assert_eq!(cfg.indexer.chain, "local");
    }

    #[test]
    fn bad_json_is_config_error() {
        assert!(matches!(
            FlowIndexConfig::from_json("{").unwrap_err(),
            FlowIndexError::Config(_)
        ));
    }

    #[test]
    fn merge_contracts_keeps_explicit_values() {
        let mut cfg = FlowIndexConfig::from_json(
            r#"{"forwarder":"0xf0","tokens":[{"symbol":"fDAIx","address":"0xAA"}]}"#,
        )
        .unwrap();
        let contracts = ContractAddresses::from_json(
            r#"{"fdaix":"0xaa","ftusdx":"0xcc","cfa":"0xcf","cfav1Forwarder":"0xff"}"#,
        )
        .unwrap();
        cfg.merge_contracts(&contracts);

        assert_eq!(cfg.forwarder.as_deref(), Some("0xf0"));
        assert_eq!(cfg.cfa.as_deref(), Some("0xcf"));
        assert_eq!(cfg.tokens.len(), 2);
        assert_eq!(cfg.token_registry().symbol("0xcc"), "fTUSDx");
    }
}
