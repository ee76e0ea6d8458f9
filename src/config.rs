//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Chain to operate on; must be one of [`SUPPORTED_NETWORKS`]
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    /// Explicit endpoint override; defaults to the network table entry
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// How long a send waits for inclusion before giving up
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_confirmation_poll_ms")]
    pub confirmation_poll_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Location of the encrypted wallet record
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_chain_id() -> u64 {
    1
}
fn default_timeout_ms() -> u64 {
    10_000
}
fn default_confirmation_timeout_secs() -> u64 {
    120
}
fn default_confirmation_poll_ms() -> u64 {
    2_000
}
fn default_store_path() -> String {
    "encrypted-wallet.json".to_string()
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: default_timeout_ms(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            confirmation_poll_ms: default_confirmation_poll_ms(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            rpc: RpcConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

/// Default gas limits per transfer kind
#[derive(Debug, Clone, Copy)]
pub struct GasLimits {
    pub transfer: u64,
    pub token: u64,
    pub nft: u64,
}

const STANDARD_GAS: GasLimits = GasLimits {
    transfer: 21_000,
    token: 65_000,
    nft: 85_000,
};

/// A supported network and its endpoints
#[derive(Debug, Clone, Copy)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub name: &'static str,
    pub symbol: &'static str,
    pub decimals: u32,
    pub rpc_url: &'static str,
    /// Tried exactly once if the primary endpoint is unreachable
    pub fallback_rpc_url: Option<&'static str>,
    pub block_explorer: &'static str,
    pub gas_limits: GasLimits,
}

/// Networks this wallet can talk to out of the box
pub const SUPPORTED_NETWORKS: &[NetworkConfig] = &[
    NetworkConfig {
        chain_id: 1,
        name: "Ethereum Mainnet",
        symbol: "ETH",
        decimals: 18,
        rpc_url: "https://ethereum-rpc.publicnode.com",
        fallback_rpc_url: Some("https://eth.llamarpc.com"),
        block_explorer: "https://etherscan.io",
        gas_limits: STANDARD_GAS,
    },
    NetworkConfig {
        chain_id: 10,
        name: "Optimism",
        symbol: "ETH",
        decimals: 18,
        rpc_url: "https://optimism-rpc.publicnode.com",
        fallback_rpc_url: Some("https://mainnet.optimism.io"),
        block_explorer: "https://optimistic.etherscan.io",
        gas_limits: STANDARD_GAS,
    },
    NetworkConfig {
        chain_id: 137,
        name: "Polygon Mainnet",
        symbol: "MATIC",
        decimals: 18,
        rpc_url: "https://polygon-bor-rpc.publicnode.com",
        fallback_rpc_url: Some("https://polygon-rpc.com"),
        block_explorer: "https://polygonscan.com",
        gas_limits: STANDARD_GAS,
    },
    NetworkConfig {
        chain_id: 8453,
        name: "Base",
        symbol: "ETH",
        decimals: 18,
        rpc_url: "https://mainnet.base.org",
        fallback_rpc_url: Some("https://base-rpc.publicnode.com"),
        block_explorer: "https://basescan.org",
        gas_limits: STANDARD_GAS,
    },
    NetworkConfig {
        chain_id: 42_161,
        name: "Arbitrum One",
        symbol: "ETH",
        decimals: 18,
        rpc_url: "https://arbitrum-one-rpc.publicnode.com",
        fallback_rpc_url: Some("https://arb1.arbitrum.io/rpc"),
        block_explorer: "https://arbiscan.io",
        gas_limits: STANDARD_GAS,
    },
    NetworkConfig {
        chain_id: 11_155_111,
        name: "Sepolia",
        symbol: "ETH",
        decimals: 18,
        rpc_url: "https://ethereum-sepolia-rpc.publicnode.com",
        fallback_rpc_url: Some("https://rpc.sepolia.org"),
        block_explorer: "https://sepolia.etherscan.io",
        gas_limits: STANDARD_GAS,
    },
];

/// Look up a supported network by chain id
pub fn network_by_chain_id(chain_id: u64) -> Option<&'static NetworkConfig> {
    SUPPORTED_NETWORKS.iter().find(|n| n.chain_id == chain_id)
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Environment variables use the `RADHASPHERE` prefix with `__` as the
    /// nesting separator, e.g. `RADHASPHERE_RPC__ENDPOINT`,
    /// `RADHASPHERE_CHAIN_ID`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        // Pick up a local .env before reading the environment
        dotenvy::dotenv().ok();

        let path = path.as_ref();
        let settings = config::Config::builder()
            // Start with defaults
            .set_default("chain_id", default_chain_id() as i64)?
            .set_default("rpc.timeout_ms", default_timeout_ms() as i64)?
            .set_default(
                "rpc.confirmation_timeout_secs",
                default_confirmation_timeout_secs() as i64,
            )?
            .set_default(
                "rpc.confirmation_poll_ms",
                default_confirmation_poll_ms() as i64,
            )?
            .set_default("store.path", default_store_path())?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix RADHASPHERE_)
            .add_source(
                config::Environment::with_prefix("RADHASPHERE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if network_by_chain_id(self.chain_id).is_none() {
            let known: Vec<u64> = SUPPORTED_NETWORKS.iter().map(|n| n.chain_id).collect();
            anyhow::bail!(
                "Unsupported chain id {}; supported chain ids are {:?}",
                self.chain_id,
                known
            );
        }

        if self.rpc.timeout_ms == 0 {
            anyhow::bail!("rpc.timeout_ms must be positive");
        }

        if self.rpc.confirmation_poll_ms == 0 {
            anyhow::bail!("rpc.confirmation_poll_ms must be positive");
        }

        if self.rpc.confirmation_poll_ms >= self.rpc.confirmation_timeout_secs * 1_000 {
            anyhow::bail!(
                "rpc.confirmation_poll_ms ({}) must be shorter than the confirmation timeout ({}s)",
                self.rpc.confirmation_poll_ms,
                self.rpc.confirmation_timeout_secs
            );
        }

        if let Some(endpoint) = &self.rpc.endpoint {
            let url = Url::parse(endpoint)
                .with_context(|| format!("Invalid rpc.endpoint: {}", mask_url(endpoint)))?;
            if url.scheme() != "http" && url.scheme() != "https" {
                anyhow::bail!(
                    "rpc.endpoint must be http(s), got scheme '{}'",
                    url.scheme()
                );
            }
        }

        if self.store.path.trim().is_empty() {
            anyhow::bail!("store.path must not be empty");
        }

        Ok(())
    }

    /// The network table entry for the configured chain
    pub fn network(&self) -> crate::Result<&'static NetworkConfig> {
        network_by_chain_id(self.chain_id).ok_or_else(|| {
            crate::Error::Config(format!("unsupported chain id {}", self.chain_id))
        })
    }

    /// Resolve the (primary, fallback) endpoint pair: an explicit endpoint
    /// override wins, with the network's fallback kept unless it would
    /// duplicate the primary.
    pub fn resolve_endpoints(&self) -> crate::Result<(String, Option<String>)> {
        let network = self.network()?;
        let primary = self
            .rpc
            .endpoint
            .clone()
            .unwrap_or_else(|| network.rpc_url.to_string());
        let fallback = network
            .fallback_rpc_url
            .filter(|f| *f != primary)
            .map(str::to_string);
        Ok((primary, fallback))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc.timeout_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc.confirmation_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.rpc.confirmation_poll_ms)
    }

    /// Get configuration for display (endpoint secrets masked)
    pub fn masked_display(&self) -> String {
        let network = network_by_chain_id(self.chain_id);
        format!(
            r#"Configuration:
  Network:
    chain_id: {}
    name: {}
  RPC:
    endpoint: {}
    timeout: {}ms
    confirmation_timeout: {}s
    confirmation_poll: {}ms
  Store:
    path: {}
"#,
            self.chain_id,
            network.map(|n| n.name).unwrap_or("(unknown)"),
            self.rpc
                .endpoint
                .as_deref()
                .map(mask_url)
                .unwrap_or_else(|| "(network default)".to_string()),
            self.rpc.timeout_ms,
            self.rpc.confirmation_timeout_secs,
            self.rpc.confirmation_poll_ms,
            self.store.path,
        )
    }
}

/// Mask URL for display (hide API keys in query params or key-bearing
/// path segments)
pub fn mask_url(url: &str) -> String {
    let base = match url.find('?') {
        Some(idx) => format!("{}?***", &url[..idx]),
        None => url.to_string(),
    };
    match base.find("/v2/") {
        Some(idx) => format!("{}/v2/***", &base[..idx]),
        None => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chain_id, 1);
        assert_eq!(config.rpc.timeout_ms, 10_000);
        assert_eq!(config.store.path, "encrypted-wallet.json");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_every_network_validates() {
        for network in SUPPORTED_NETWORKS {
            let config = Config {
                chain_id: network.chain_id,
                ..Config::default()
            };
            assert!(config.validate().is_ok(), "chain {}", network.chain_id);
            assert!(Url::parse(network.rpc_url).is_ok());
            if let Some(fallback) = network.fallback_rpc_url {
                assert!(Url::parse(fallback).is_ok());
                assert_ne!(fallback, network.rpc_url);
            }
        }
    }

    #[test]
    fn test_unknown_chain_rejected() {
        let config = Config {
            chain_id: 424_242,
            ..Config::default()
        };
        assert!(config.validate().is_err());
        assert!(config.network().is_err());
    }

    #[test]
    fn test_poll_must_be_shorter_than_timeout() {
        let mut config = Config::default();
        config.rpc.confirmation_poll_ms = config.rpc.confirmation_timeout_secs * 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_endpoint_scheme_validation() {
        let mut config = Config::default();
        config.rpc.endpoint = Some("wss://example.com".into());
        assert!(config.validate().is_err());
        config.rpc.endpoint = Some("not a url".into());
        assert!(config.validate().is_err());
        config.rpc.endpoint = Some("https://example.com/rpc".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolve_endpoints_prefers_override() {
        let mut config = Config::default();
        let (primary, fallback) = config.resolve_endpoints().unwrap();
        assert_eq!(primary, "https://ethereum-rpc.publicnode.com");
        assert_eq!(fallback.as_deref(), Some("https://eth.llamarpc.com"));

        config.rpc.endpoint = Some("https://example.com/rpc".into());
        let (primary, fallback) = config.resolve_endpoints().unwrap();
        assert_eq!(primary, "https://example.com/rpc");
        assert_eq!(fallback.as_deref(), Some("https://eth.llamarpc.com"));
    }

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("https://api.example.com?key=secret"),
            "https://api.example.com?***"
        );
        assert_eq!(
            mask_url("https://eth-mainnet.g.alchemy.com/v2/SeCrEtKeY"),
            "https://eth-mainnet.g.alchemy.com/v2/***"
        );
        assert_eq!(
            mask_url("https://api.example.com"),
            "https://api.example.com"
        );
    }

    #[test]
    fn test_masked_display_hides_endpoint_key() {
        let mut config = Config::default();
        config.rpc.endpoint = Some("https://eth-mainnet.g.alchemy.com/v2/SeCrEtKeY".into());
        let display = config.masked_display();
        assert!(!display.contains("SeCrEtKeY"));
        assert!(display.contains("/v2/***"));
    }
}
