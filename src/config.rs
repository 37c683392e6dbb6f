use alloy::primitives::Address;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

use crate::swap::slippage::SlippageBound;

/// Environment variable overriding `network.rpc_url`.
pub const RPC_URL_ENV: &str = "RPC_URL";
/// Environment variable holding the agent's signing key. Never read from the config file.
pub const PRIVATE_KEY_ENV: &str = "PRIVATE_KEY";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub swap: SwapConfig,
    #[serde(default)]
    pub fees: FeeConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    #[serde(default)]
    pub rpc_url: String,
    /// Expected chain id. Startup fails when the endpoint reports another one.
    pub chain_id: Option<u64>,
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            chain_id: None,
            rpc_timeout_secs: default_rpc_timeout_secs(),
        }
    }
}

fn default_rpc_timeout_secs() -> u64 {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct ListenerConfig {
    #[serde(default = "default_deployment_path")]
    pub deployment_path: String,
    #[serde(default = "default_event_name")]
    pub event_name: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    pub start_block: Option<u64>,
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            deployment_path: default_deployment_path(),
            event_name: default_event_name(),
            poll_interval_secs: default_poll_interval_secs(),
            start_block: None,
            batch_size: default_batch_size(),
            channel_capacity: default_channel_capacity(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_deployment_path() -> String {
    "deployedContract.json".to_string()
}

fn default_event_name() -> String {
    "ETHReceived".to_string()
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_batch_size() -> u64 {
    1000
}

fn default_channel_capacity() -> usize {
    256
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

// ============================================================
// Swap Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct SwapConfig {
    #[serde(default = "default_router")]
    pub router: String,
    #[serde(default = "default_wrapped_native")]
    pub wrapped_native: String,
    #[serde(default = "default_stablecoin")]
    pub stablecoin: String,
    #[serde(default = "default_slippage_tolerance")]
    pub slippage_tolerance: f64,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    #[serde(default = "default_gas_buffer_percent")]
    pub gas_buffer_percent: u64,
    #[serde(default = "default_broadcast_retries")]
    pub broadcast_retries: u32,
    #[serde(default = "default_broadcast_backoff_ms")]
    pub broadcast_backoff_ms: u64,
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_receipt_poll_ms")]
    pub receipt_poll_ms: u64,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            router: default_router(),
            wrapped_native: default_wrapped_native(),
            stablecoin: default_stablecoin(),
            slippage_tolerance: default_slippage_tolerance(),
            deadline_secs: default_deadline_secs(),
            gas_buffer_percent: default_gas_buffer_percent(),
            broadcast_retries: default_broadcast_retries(),
            broadcast_backoff_ms: default_broadcast_backoff_ms(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            receipt_poll_ms: default_receipt_poll_ms(),
        }
    }
}

// Sepolia deployments.
fn default_router() -> String {
    "0x3fC91A3afd70395Cd496C647d5a6CC9D4B2b7FAD".to_string()
}

fn default_wrapped_native() -> String {
    "0xB4FBF271143F4FBf7B91A5ded31805e42b2208d6".to_string()
}

fn default_stablecoin() -> String {
    "0x94a9D9AC8a22534E3FaCa9F4e7F2E2cf85d5E4C8".to_string()
}

fn default_slippage_tolerance() -> f64 {
    0.005
}

fn default_deadline_secs() -> u64 {
    20 * 60
}

fn default_gas_buffer_percent() -> u64 {
    20
}

fn default_broadcast_retries() -> u32 {
    3
}

fn default_broadcast_backoff_ms() -> u64 {
    500
}

fn default_confirmation_timeout_secs() -> u64 {
    300
}

fn default_receipt_poll_ms() -> u64 {
    1000
}

// ============================================================
// Fee Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct FeeConfig {
    /// Chains priced with max fee / priority fee. Everything else gets a flat gas price.
    #[serde(default = "default_dynamic_fee_chain_ids")]
    pub dynamic_fee_chain_ids: Vec<u64>,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            dynamic_fee_chain_ids: default_dynamic_fee_chain_ids(),
        }
    }
}

fn default_dynamic_fee_chain_ids() -> Vec<u64> {
    vec![11_155_111]
}

impl Config {
    pub fn load(path: &str) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("Failed to read config file '{}': {}", path, e))?;
        let mut config: Config = toml::from_str(&content)
            .map_err(|e| eyre::eyre!("Failed to parse config file '{}': {}", path, e))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Config with every default, used when no config file exists.
    pub fn from_env() -> eyre::Result<Self> {
        let mut config: Config = toml::from_str("")
            .map_err(|e| eyre::eyre!("Failed to build default config: {}", e))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(RPC_URL_ENV) {
            if !url.trim().is_empty() {
                self.network.rpc_url = url;
            }
        }
    }

    fn validate(&self) -> eyre::Result<()> {
        if self.network.rpc_url.trim().is_empty() {
            return Err(eyre::eyre!(
                "No RPC endpoint configured (set network.rpc_url or {})",
                RPC_URL_ENV
            ));
        }
        if self.network.rpc_timeout_secs == 0 {
            return Err(eyre::eyre!("network.rpc_timeout_secs must be positive"));
        }
        if self.listener.poll_interval_secs == 0 {
            return Err(eyre::eyre!("listener.poll_interval_secs must be positive"));
        }
        if self.listener.batch_size == 0 {
            return Err(eyre::eyre!("listener.batch_size must be positive"));
        }
        if self.listener.channel_capacity == 0 {
            return Err(eyre::eyre!("listener.channel_capacity must be positive"));
        }
        if self.swap.deadline_secs == 0 {
            return Err(eyre::eyre!("swap.deadline_secs must be positive"));
        }
        if self.swap.broadcast_retries == 0 {
            return Err(eyre::eyre!("swap.broadcast_retries must be at least 1"));
        }
        for (name, value) in [
            ("router", &self.swap.router),
            ("wrapped_native", &self.swap.wrapped_native),
            ("stablecoin", &self.swap.stablecoin),
        ] {
            parse_address(value)
                .map_err(|e| eyre::eyre!("Invalid swap.{} address '{}': {}", name, value, e))?;
        }
        SlippageBound::from_fraction(self.swap.slippage_tolerance)?;
        Ok(())
    }

    pub fn router_address(&self) -> eyre::Result<Address> {
        parse_address(&self.swap.router)
    }

    pub fn swap_path(&self) -> eyre::Result<Vec<Address>> {
        Ok(vec![
            parse_address(&self.swap.wrapped_native)?,
            parse_address(&self.swap.stablecoin)?,
        ])
    }

    pub fn slippage(&self) -> eyre::Result<SlippageBound> {
        SlippageBound::from_fraction(self.swap.slippage_tolerance)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.listener.poll_interval_secs)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.network.rpc_timeout_secs)
    }
}

fn parse_address(value: &str) -> eyre::Result<Address> {
    if !value.starts_with("0x") || value.len() != 42 {
        return Err(eyre::eyre!("expected a 0x-prefixed 20-byte hex address"));
    }
    Address::from_str(value).map_err(|e| eyre::eyre!("{}", e))
}
