// src/config.rs
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{AaError, Result};

pub const PRODUCTION_RPC_URL: &str = "https://rpc.particle.network";
pub const DEVELOPMENT_RPC_URL: &str = "https://rpc-debug.particle.network";

/// Set to `development` to talk to the debug backend.
pub const ENVIRONMENT_VAR: &str = "PARTICLE_ENVIRONMENT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountContractConfig {
    pub version: String,
    /// Chains the contract may be used on; empty means any chain.
    #[serde(default)]
    pub chain_ids: Vec<u64>,
}

/// A `(name, version)` pair selecting one entry of the contract registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountContract {
    pub name: String,
    pub version: String,
}

impl AccountContract {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self { name: name.into(), version: version.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AaOptions {
    /// Contract name to versions, in configuration order. The first entry is active by default.
    pub account_contracts: IndexMap<String, Vec<AccountContractConfig>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartAccountConfig {
    pub project_id: String,
    pub client_key: String,
    pub app_id: String,
    pub aa_options: AaOptions,
    /// Overrides the backend host selected from the environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
}

impl SmartAccountConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AaError::Configuration(format!("{}: {e}", path.as_ref().display())))?;
        serde_json::from_str(&raw).map_err(|e| AaError::Configuration(e.to_string()))
    }

    /// Checks credentials and the contract registry, returning the contract that is active
    /// by default.
    pub fn validate(&self) -> Result<AccountContract> {
        if self.project_id.is_empty() || self.client_key.is_empty() || self.app_id.is_empty() {
            return Err(AaError::Configuration("invalid project config".to_string()));
        }
        if self.aa_options.account_contracts.is_empty() {
            return Err(AaError::Configuration("invalid AA contract config".to_string()));
        }
        let (name, versions) = self
            .aa_options
            .account_contracts
            .iter()
            .next()
            .ok_or_else(|| AaError::Configuration("invalid AA contract config".to_string()))?;
        match versions.first() {
            Some(first) if !name.is_empty() && !first.version.is_empty() => {
                Ok(AccountContract::new(name.clone(), first.version.clone()))
            }
            _ => Err(AaError::Configuration("invalid AA name or version".to_string())),
        }
    }

    /// Registry entry for `contract`, if configured.
    pub fn contract_config(&self, contract: &AccountContract) -> Option<&AccountContractConfig> {
        self.aa_options
            .account_contracts
            .get(&contract.name)?
            .iter()
            .find(|c| c.version == contract.version)
    }

    pub fn require_contract(&self, contract: &AccountContract) -> Result<&AccountContractConfig> {
        self.contract_config(contract).ok_or_else(|| {
            AaError::Configuration("Please configure the smart account contract first".to_string())
        })
    }

    /// Base URL of the backend's EVM endpoint.
    pub fn endpoint(&self) -> String {
        let host = match &self.rpc_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => default_rpc_url().to_string(),
        };
        format!("{host}/evm-chain")
    }
}

impl AccountContractConfig {
    pub fn supports_chain(&self, chain_id: u64) -> bool {
        self.chain_ids.is_empty() || self.chain_ids.contains(&chain_id)
    }
}

pub fn default_rpc_url() -> &'static str {
    match std::env::var(ENVIRONMENT_VAR) {
        Ok(env) if env == "development" => DEVELOPMENT_RPC_URL,
        _ => PRODUCTION_RPC_URL,
    }
}
