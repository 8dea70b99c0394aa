use std::{
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};

use alloy::primitives::{
    Address,
    U256,
    utils::{
        UnitsError,
        parse_units,
    },
};
use serde::Deserialize;

use crate::{
    domain::merkle::{
        DEFAULT_TREE_HEIGHT,
        MAX_TREE_HEIGHT,
    },
    withdrawal::InstanceConfig,
};

/// Top-level client configuration loaded from TOML.
#[derive(Debug, Deserialize)]
pub struct TornadoConfig {
    pub network: NetworkConfig,
    pub instance: InstanceSection,
    pub prover: ProverConfig,
}

#[derive(Debug, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: String,
    /// Signing key. When absent only read-only commands work.
    pub private_key: Option<String>,
    /// Chain id, must match the note's network id.
    pub network_id: u64,
}

/// The mixer instance a note belongs to.
#[derive(Debug, Deserialize)]
pub struct InstanceSection {
    pub address: Address,
    /// Block the instance was deployed at; event scans start here.
    #[serde(default)]
    pub deployment_block: u64,
    pub currency: String,
    /// Amount as written in notes (e.g. "0.1").
    pub amount: String,
    /// Denomination in base units, decimal.
    pub denomination: String,
    #[serde(default = "default_tree_height")]
    pub merkle_tree_height: usize,
    #[serde(default = "default_native_currency")]
    pub native_currency: String,
    /// Decimals of the instance's asset, used to scale relayer fees.
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

#[derive(Debug, Deserialize)]
pub struct ProverConfig {
    #[serde(default = "default_snarkjs_bin")]
    pub snarkjs_bin: PathBuf,
    pub circuit_wasm: PathBuf,
    pub proving_key: PathBuf,
    /// Proving timeout (e.g. "5m", "90s"). Parsed via humantime.
    #[serde(with = "humantime_serde", default = "default_prover_timeout")]
    pub timeout: Duration,
}

fn default_tree_height() -> usize {
    DEFAULT_TREE_HEIGHT
}

fn default_native_currency() -> String {
    "eth".to_string()
}

fn default_decimals() -> u8 {
    18
}

fn default_snarkjs_bin() -> PathBuf {
    PathBuf::from("snarkjs")
}

fn default_prover_timeout() -> Duration {
    Duration::from_secs(300)
}

/// Errors from config loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

impl TornadoConfig {
    /// Load and validate a config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.rpc_url.trim().is_empty() {
            return Err(ConfigError::Validation("network.rpc_url must not be empty".into()));
        }

        let height = self.instance.merkle_tree_height;
        if height == 0 || height > MAX_TREE_HEIGHT {
            return Err(ConfigError::Validation(format!(
                "instance.merkle_tree_height must be between 1 and {MAX_TREE_HEIGHT}, got {height}"
            )));
        }

        self.denomination()?;

        if self.instance.currency.is_empty() || self.instance.amount.is_empty() {
            return Err(ConfigError::Validation(
                "instance.currency and instance.amount must be set".into(),
            ));
        }

        if self.prover.circuit_wasm.as_os_str().is_empty()
            || self.prover.proving_key.as_os_str().is_empty()
        {
            return Err(ConfigError::Validation(
                "prover.circuit_wasm and prover.proving_key must be set".into(),
            ));
        }

        Ok(())
    }

    pub fn denomination(&self) -> Result<U256, ConfigError> {
        self.instance.denomination.parse().map_err(|e| {
            ConfigError::Validation(format!(
                "instance.denomination `{}` is not a decimal integer: {e}",
                self.instance.denomination
            ))
        })
    }

    /// Scale a decimal amount of the instance's asset to base units.
    pub fn parse_asset_amount(&self, value: &str) -> Result<U256, UnitsError> {
        Ok(parse_units(value, self.instance.decimals)?.get_absolute())
    }

    /// The settings the withdrawal pipeline checks notes against.
    pub fn instance_config(&self) -> Result<InstanceConfig, ConfigError> {
        Ok(InstanceConfig {
            network_id: self.network.network_id,
            currency: self.instance.currency.clone(),
            amount: self.instance.amount.clone(),
            denomination: self.denomination()?,
            merkle_tree_height: self.instance.merkle_tree_height,
            deployment_block: self.instance.deployment_block,
            native: self
                .instance
                .currency
                .eq_ignore_ascii_case(&self.instance.native_currency),
        })
    }
}
