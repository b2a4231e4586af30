//! Configuration management for the bridge relayer
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub bridge: BridgeConfig,
    pub mpc: MpcConfig,
    pub src: ChainConfig,
    pub dst: ChainConfig,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    pub instance_id: String,
    /// Pause between two scheduler passes of one direction
    pub poll_interval_ms: u64,
    /// Only swaps created within this window are picked up by the scheduler
    pub max_swap_lifetime_secs: u64,
    pub retry_send_tx_count: u32,
    pub retry_send_tx_interval_ms: u64,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_lock_memo_prefix")]
    pub lock_memo_prefix: String,
    #[serde(default = "default_unlock_memo_prefix")]
    pub unlock_memo_prefix: String,
    #[serde(default = "default_recall_memo_prefix")]
    pub recall_memo_prefix: String,
    pub health_check_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MpcConfig {
    pub api_address: String,
    /// Public key or account the signing group signs with
    pub key_id: String,
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
    /// Wait after submitting a request before the first status poll
    #[serde(default = "default_sign_interval_secs")]
    pub settle_interval_secs: u64,
    #[serde(default = "default_sign_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_sign_interval_secs")]
    pub retry_interval_secs: u64,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    Bitcoin,
    Ethereum,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub family: ChainFamily,
    pub name: String,
    /// Bitcoin network name (`bitcoin`, `testnet`, `signet`, `regtest`)
    pub network: Option<String>,
    /// EIP-155 chain id for account-model chains
    pub chain_id: Option<u64>,
    pub rpc_urls: Vec<String>,
    pub confirmations: u64,
    /// Bridge custodied address, signed for by the MPC group
    pub dcrm_address: String,
    /// Token contract (source erc20) or mapping contract (destination)
    pub contract_address: Option<String>,
    #[serde(default = "default_gas_limit")]
    pub default_gas_limit: u64,
    #[serde(default = "default_rpc_retry_count")]
    pub rpc_retry_count: u32,
    #[serde(default = "default_rpc_retry_interval_ms")]
    pub rpc_retry_interval_ms: u64,
    pub token: TokenConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub symbol: String,
    pub decimals: u32,
    pub minimum_swap: f64,
    pub maximum_swap: f64,
    #[serde(default)]
    pub swap_fee_rate: f64,
    #[serde(default)]
    pub minimum_swap_fee: f64,
    #[serde(default)]
    pub maximum_swap_fee: f64,
    #[serde(default)]
    pub is_erc20: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres URL, or `memory://` for a process-local store
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

/// Upper bound of the scheduler lookback window (one year)
pub const MAX_SWAP_LIFETIME_SECS: u64 = 365 * 24 * 60 * 60;

fn default_history_capacity() -> usize {
    1000
}

fn default_lock_memo_prefix() -> String {
    "SWAPTO:".to_string()
}

fn default_unlock_memo_prefix() -> String {
    "SWAPTX:".to_string()
}

fn default_recall_memo_prefix() -> String {
    "RECALL:".to_string()
}

fn default_rpc_timeout_secs() -> u64 {
    30
}

fn default_sign_interval_secs() -> u64 {
    10
}

fn default_sign_retry_count() -> u32 {
    15
}

fn default_gas_limit() -> u64 {
    90_000
}

fn default_rpc_retry_count() -> u32 {
    3
}

fn default_rpc_retry_interval_ms() -> u64 {
    1000
}

impl Settings {
    /// Load settings from the file named by `BRIDGE_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("BRIDGE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.bridge.history_capacity == 0 {
            anyhow::bail!("bridge.history_capacity must be positive");
        }
        if self.bridge.retry_send_tx_count == 0 {
            anyhow::bail!("bridge.retry_send_tx_count must be positive");
        }
        if self.mpc.retry_count == 0 {
            anyhow::bail!("mpc.retry_count must be positive");
        }
        if self.bridge.max_swap_lifetime_secs == 0
            || self.bridge.max_swap_lifetime_secs > MAX_SWAP_LIFETIME_SECS
        {
            anyhow::bail!(
                "bridge.max_swap_lifetime_secs must be within 1..={}",
                MAX_SWAP_LIFETIME_SECS
            );
        }

        for (side, chain) in [("src", &self.src), ("dst", &self.dst)] {
            if chain.rpc_urls.is_empty() {
                anyhow::bail!("Chain {} ({}) has no RPC URLs configured", chain.name, side);
            }
            if chain.dcrm_address.is_empty() {
                anyhow::bail!("Chain {} ({}) has no dcrm address configured", chain.name, side);
            }
            if chain.token.minimum_swap > chain.token.maximum_swap {
                anyhow::bail!(
                    "Chain {} ({}) has minimum swap {} above maximum swap {}",
                    chain.name,
                    side,
                    chain.token.minimum_swap,
                    chain.token.maximum_swap
                );
            }
            if chain.token.swap_fee_rate < 0.0 || chain.token.swap_fee_rate >= 1.0 {
                anyhow::bail!("Chain {} ({}) has swap fee rate out of [0, 1)", chain.name, side);
            }
            match chain.family {
                ChainFamily::Ethereum => {
                    if chain.chain_id.is_none() {
                        anyhow::bail!("Chain {} ({}) needs a chain_id", chain.name, side);
                    }
                }
                ChainFamily::Bitcoin => {
                    if chain.token.is_erc20 {
                        anyhow::bail!("Chain {} ({}) cannot carry an erc20 token", chain.name, side);
                    }
                }
            }
        }

        if self.dst.family != ChainFamily::Ethereum {
            anyhow::bail!("Destination chain must be an account-model chain");
        }
        if self.dst.contract_address.is_none() {
            anyhow::bail!("Destination chain needs the mapping contract address");
        }
        if self.src.token.is_erc20 && self.src.contract_address.is_none() {
            anyhow::bail!("Source erc20 token needs a contract address");
        }

        Ok(())
    }
}

impl BridgeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_send_tx_interval(&self) -> Duration {
        Duration::from_millis(self.retry_send_tx_interval_ms)
    }
}

impl ChainConfig {
    pub fn rpc_retry_interval(&self) -> Duration {
        Duration::from_millis(self.rpc_retry_interval_ms)
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    lazy_static::lazy_static! {
        static ref ENV_VAR: regex::Regex =
            regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid env var pattern");
    }

    let mut result = input.to_string();
    for cap in ENV_VAR.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
