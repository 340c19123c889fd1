//! Configuration for the wallet layer

pub mod rpc;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

// Re-export RPC config
pub use rpc::RpcConfig;

/// Environment variable names read by [`Config::from_env`]
mod env_vars {
    pub const ETHEREUM_NETWORK: &str = "ETHEREUM_NETWORK";
    pub const BTC_NETWORK: &str = "BTC_NETWORK";
    pub const ESCROW_CONTRACT: &str = "ESCROW_CONTRACT";
    pub const BRIDGE_URL: &str = "WALLETCONNECT_BRIDGE_URL";
}

/// Supported Ethereum networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EthereumNetwork {
    #[default]
    Mainnet,
    Ropsten,
    Rinkeby,
    Goerli,
    Kovan,
}

impl EthereumNetwork {
    pub fn chain_id(&self) -> u64 {
        match self {
            EthereumNetwork::Mainnet => 1,
            EthereumNetwork::Ropsten => 3,
            EthereumNetwork::Rinkeby => 4,
            EthereumNetwork::Goerli => 5,
            EthereumNetwork::Kovan => 42,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EthereumNetwork::Mainnet => "mainnet",
            EthereumNetwork::Ropsten => "ropsten",
            EthereumNetwork::Rinkeby => "rinkeby",
            EthereumNetwork::Goerli => "goerli",
            EthereumNetwork::Kovan => "kovan",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "mainnet" | "ethereum" => Some(EthereumNetwork::Mainnet),
            "ropsten" => Some(EthereumNetwork::Ropsten),
            "rinkeby" => Some(EthereumNetwork::Rinkeby),
            "goerli" => Some(EthereumNetwork::Goerli),
            "kovan" => Some(EthereumNetwork::Kovan),
            _ => None,
        }
    }
}

/// Supported Bitcoin networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BitcoinNetwork {
    Mainnet,
    #[default]
    Testnet,
}

impl BitcoinNetwork {
    pub fn network(&self) -> bitcoin::Network {
        match self {
            BitcoinNetwork::Mainnet => bitcoin::Network::Bitcoin,
            BitcoinNetwork::Testnet => bitcoin::Network::Testnet,
        }
    }

    /// BIP49 purpose/coin prefix used for every derived path
    pub fn base_path(&self) -> &'static str {
        match self {
            BitcoinNetwork::Mainnet => "49'/0'",
            BitcoinNetwork::Testnet => "49'/1'",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BitcoinNetwork::Mainnet => "mainnet",
            BitcoinNetwork::Testnet => "testnet",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "mainnet" | "bitcoin" => Some(BitcoinNetwork::Mainnet),
            "testnet" | "testnet3" => Some(BitcoinNetwork::Testnet),
            _ => None,
        }
    }
}

/// Hardware signer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareConfig {
    /// Attempts per device request before giving up
    pub max_attempts: u32,
    /// Fixed delay between attempts (milliseconds)
    pub retry_delay_ms: u64,
    /// Idle time after which the USB transport is closed (seconds)
    pub idle_timeout_secs: u64,
}

impl HardwareConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            max_attempts: 15,
            retry_delay_ms: 2_000,
            idle_timeout_secs: 300, // 5 minutes
        }
    }
}

/// Bridge (QR pairing) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Relay server used by freshly created bridge clients
    pub bridge_url: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bridge_url: "https://bridge.walletconnect.org".to_string(),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub ethereum_network: EthereumNetwork,
    #[serde(default)]
    pub bitcoin_network: BitcoinNetwork,
    #[serde(default)]
    pub hardware: HardwareConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    /// Escrow (multi-sig) contract; spender for ERC20 allowances
    #[serde(default)]
    pub escrow_contract: Option<Address>,
    /// Token contract overrides by crypto type (testnet deployments)
    #[serde(default)]
    pub token_contracts: HashMap<String, Address>,
}

impl Config {
    /// Build a config from environment variables, falling back to defaults
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Self::default();

        if let Ok(name) = std::env::var(env_vars::ETHEREUM_NETWORK) {
            config.ethereum_network = EthereumNetwork::parse(&name).ok_or_else(|| {
                crate::Error::Config(format!("Unknown Ethereum network: {}", name))
            })?;
        }
        if let Ok(name) = std::env::var(env_vars::BTC_NETWORK) {
            config.bitcoin_network = BitcoinNetwork::parse(&name).ok_or_else(|| {
                crate::Error::Config(format!("Unknown Bitcoin network: {}", name))
            })?;
        }
        if let Ok(addr) = std::env::var(env_vars::ESCROW_CONTRACT) {
            let addr = addr
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid ESCROW_CONTRACT: {}", e)))?;
            config.escrow_contract = Some(addr);
        }
        if let Ok(url) = std::env::var(env_vars::BRIDGE_URL) {
            config.bridge.bridge_url = url;
        }

        Ok(config)
    }

    /// Load a JSON config file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| crate::Error::Config(e.to_string()))?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_hardware_policy() {
        let config = Config::default();
        assert_eq!(config.hardware.max_attempts, 15);
        assert_eq!(config.hardware.retry_delay(), Duration::from_secs(2));
        assert_eq!(config.hardware.idle_timeout(), Duration::from_secs(300));
        assert_eq!(config.ethereum_network.chain_id(), 1);
        assert_eq!(config.bitcoin_network.base_path(), "49'/1'");
    }

    #[test]
    fn deserialize_partial_config() {
        let value = serde_json::json!({
            "ethereum_network": "rinkeby",
            "bitcoin_network": "mainnet",
            "escrow_contract": "0x1111111111111111111111111111111111111111"
        });
        let parsed: Config = serde_json::from_value(value).expect("parse config");
        assert_eq!(parsed.ethereum_network.chain_id(), 4);
        assert_eq!(parsed.bitcoin_network.network(), bitcoin::Network::Bitcoin);
        assert!(parsed.escrow_contract.is_some());
        assert_eq!(parsed.hardware.max_attempts, 15);
        assert!(parsed.token_contracts.is_empty());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"ethereum_network": "goerli", "hardware": {{"max_attempts": 3, "retry_delay_ms": 10, "idle_timeout_secs": 1}}}}"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.ethereum_network, EthereumNetwork::Goerli);
        assert_eq!(config.hardware.max_attempts, 3);
    }

    #[test]
    fn parse_network_names() {
        assert_eq!(EthereumNetwork::parse("Rinkeby"), Some(EthereumNetwork::Rinkeby));
        assert_eq!(EthereumNetwork::parse("ethereum"), Some(EthereumNetwork::Mainnet));
        assert_eq!(EthereumNetwork::parse("sepolia"), None);
        assert_eq!(BitcoinNetwork::parse("testnet3"), Some(BitcoinNetwork::Testnet));
    }
}
