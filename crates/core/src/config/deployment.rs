//! Per-chain contract deployments.
//!
//! Built-in entries cover Ethereum mainnet. Additional chains (or overrides of
//! the built-ins) load from TOML; `${VAR}` references are expanded from the
//! environment before parsing.
//!
//! ```toml
//! [[chains]]
//! chain_id = 8453
//! name = "base"
//! rpc_url = "${BASE_RPC_URL}"
//! morpho = "0xBBBBBbbBBb9cC5e90e3b3Af64bdAF62C37EEFFCb"
//! bundler = "0x..."
//!
//! [chains.generalized]
//! bundler3 = "0x..."
//! general_adapter = "0x..."
//! swap_adapter = "0x..."
//! ```

use alloy::primitives::{address, Address};
use leverage_chain::PERMIT2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Generalized bundler and its adapters (swap route).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralizedBundler {
    pub bundler3: Address,
    pub general_adapter: Address,
    pub swap_adapter: Address,
}

/// Liquid-staking token pair (liquid-staking route).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidStakingPair {
    /// Wrapped staking token used as collateral
    pub wst_eth: Address,
    /// Rebasing staking token (direct pair)
    pub st_eth: Address,
}

/// Contracts deployed on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainDeployment {
    pub chain_id: u64,
    pub name: String,
    #[serde(default)]
    pub rpc_url: Option<String>,
    /// Lending market singleton
    pub morpho: Address,
    #[serde(default = "default_permit2")]
    pub permit2: Address,
    #[serde(default)]
    pub wrapped_native: Option<Address>,
    /// Purpose-built bundler (deterministic routes)
    #[serde(default)]
    pub bundler: Option<Address>,
    #[serde(default)]
    pub generalized: Option<GeneralizedBundler>,
    #[serde(default)]
    pub liquid_staking: Option<LiquidStakingPair>,
}

fn default_permit2() -> Address {
    PERMIT2
}

impl ChainDeployment {
    /// Ethereum mainnet.
    pub fn mainnet() -> Self {
        Self {
            chain_id: 1,
            name: "ethereum".to_string(),
            rpc_url: None,
            morpho: address!("BBBBBbbBBb9cC5e90e3b3Af64bdAF62C37EEFFCb"),
            permit2: PERMIT2,
            wrapped_native: Some(address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2")),
            bundler: Some(address!("4095F064B8d3c3548A3bebfd0Bbfd04750E30077")),
            generalized: Some(GeneralizedBundler {
                bundler3: address!("6566194141eefa99Af43Bb5Aa71460Ca2Dc90245"),
                general_adapter: address!("4A6c312ec70E8747a587EE860a0353cd42Be0aE0"),
                swap_adapter: address!("03b5259Bd204BfD4A616E5B79b0B786d90c6C38f"),
            }),
            liquid_staking: Some(LiquidStakingPair {
                wst_eth: address!("7f39C581F595B53c5cb19bD0b3f8dA6c935E2Ca0"),
                st_eth: address!("ae7ab96520DE3A18E5e111B7EaAb095312D7fE84"),
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct DeploymentFile {
    #[serde(default)]
    chains: Vec<ChainDeployment>,
}

/// Deployments keyed by chain id.
#[derive(Debug, Clone, Default)]
pub struct DeploymentRegistry {
    chains: HashMap<u64, ChainDeployment>,
}

impl DeploymentRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in deployments.
    pub fn builtin() -> Self {
        Self::new().with_chain(ChainDeployment::mainnet())
    }

    /// Add or replace one chain.
    pub fn with_chain(mut self, deployment: ChainDeployment) -> Self {
        self.chains.insert(deployment.chain_id, deployment);
        self
    }

    /// Parse TOML (after env expansion) and merge it over this registry.
    pub fn merge_toml(mut self, content: &str) -> anyhow::Result<Self> {
        let expanded = expand_env(content);
        let file: DeploymentFile = toml::from_str(&expanded)?;
        for chain in file.chains {
            tracing::debug!(chain_id = chain.chain_id, name = %chain.name, "Deployment loaded");
            self.chains.insert(chain.chain_id, chain);
        }
        Ok(self)
    }

    /// Built-ins overridden by a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::builtin().merge_toml(&content)
    }

    /// Built-ins, overridden by the file named in `LEVERAGE_DEPLOYMENTS` if set.
    pub fn from_env() -> anyhow::Result<Self> {
        match std::env::var("LEVERAGE_DEPLOYMENTS") {
            Ok(path) => Self::from_file(path),
            Err(_) => Ok(Self::builtin()),
        }
    }

    pub fn get(&self, chain_id: u64) -> Option<&ChainDeployment> {
        self.chains.get(&chain_id)
    }

    pub fn chain_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.chains.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Expand ${VAR_NAME} patterns with environment variable values.
/// Unset variables are left as-is.
fn expand_env(s: &str) -> String {
    let Ok(re) = regex_lite::Regex::new(r"\$\{([^}]+)\}") else {
        return s.to_string();
    };

    let mut result = s.to_string();
    for cap in re.captures_iter(s) {
        if let (Some(full_match), Some(var_match)) = (cap.get(0), cap.get(1)) {
            if let Ok(value) = std::env::var(var_match.as_str()) {
                result = result.replace(full_match.as_str(), &value);
            }
        }
    }

    result
}
