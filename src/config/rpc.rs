//! RPC endpoint configuration
//!
//! Endpoints are resolved from the environment in priority order:
//! 1. Explicit URLs (`ETH_RPC_URL`, `BTC_API_URL`, `BTC_FEE_ENDPOINT`)
//! 2. Provider API key (`INFURA_API_KEY`) - builds the Ethereum URL for the network
//! 3. Public fallbacks - for testing only
//!
//! # Examples
//!
//! ```bash
//! export ETH_RPC_URL="https://rinkeby.infura.io/v3/YOUR_KEY"
//! export BTC_API_URL="https://blockstream.info/testnet/api"
//! ```

use crate::config::{BitcoinNetwork, EthereumNetwork};
use serde::{Deserialize, Serialize};

/// Environment variable names
mod env_vars {
    pub const ETH_RPC_URL: &str = "ETH_RPC_URL";
    pub const INFURA_API_KEY: &str = "INFURA_API_KEY";
    pub const BTC_API_URL: &str = "BTC_API_URL";
    pub const BTC_FEE_ENDPOINT: &str = "BTC_FEE_ENDPOINT";
}

/// Public endpoints (rate limited, for testing only)
mod public_rpcs {
    pub const ETHEREUM_MAINNET: &str = "https://eth.llamarpc.com";
    pub const BTC_MAINNET: &str = "https://blockstream.info/api";
    pub const BTC_TESTNET: &str = "https://blockstream.info/testnet/api";
    pub const BTC_FEES: &str = "https://bitcoinfees.earn.com/api/v1/fees/recommended";
}

/// Chain endpoints used by the injected clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Ethereum JSON-RPC endpoint
    pub eth_rpc_url: String,
    /// Esplora-style Bitcoin explorer API
    pub btc_api_url: String,
    /// Recommended fee endpoint (`fastestFee`, `halfHourFee`, `hourFee` in sat/byte)
    pub btc_fee_endpoint: String,
}

impl RpcConfig {
    /// Resolve endpoints for the given networks from the environment
    pub fn from_env(eth: EthereumNetwork, btc: BitcoinNetwork) -> Self {
        let eth_rpc_url = if let Ok(url) = std::env::var(env_vars::ETH_RPC_URL) {
            tracing::debug!("Using ETH_RPC_URL for {}", eth.name());
            url
        } else if let Ok(key) = std::env::var(env_vars::INFURA_API_KEY) {
            tracing::info!("Building Ethereum RPC URL from INFURA_API_KEY");
            infura_url(eth, &key)
        } else {
            tracing::warn!(
                network = eth.name(),
                "No RPC configured for Ethereum, using public RPC (rate limited)"
            );
            public_eth_url(eth)
        };

        let btc_api_url = std::env::var(env_vars::BTC_API_URL).unwrap_or_else(|_| match btc {
            BitcoinNetwork::Mainnet => public_rpcs::BTC_MAINNET.to_string(),
            BitcoinNetwork::Testnet => public_rpcs::BTC_TESTNET.to_string(),
        });

        let btc_fee_endpoint = std::env::var(env_vars::BTC_FEE_ENDPOINT)
            .unwrap_or_else(|_| public_rpcs::BTC_FEES.to_string());

        Self {
            eth_rpc_url,
            btc_api_url,
            btc_fee_endpoint,
        }
    }

    /// Create with explicit URLs
    pub fn with_urls(eth_rpc_url: &str, btc_api_url: &str, btc_fee_endpoint: &str) -> Self {
        Self {
            eth_rpc_url: eth_rpc_url.to_string(),
            btc_api_url: btc_api_url.trim_end_matches('/').to_string(),
            btc_fee_endpoint: btc_fee_endpoint.to_string(),
        }
    }
}

fn infura_url(network: EthereumNetwork, key: &str) -> String {
    format!("https://{}.infura.io/v3/{}", network.name(), key)
}

fn public_eth_url(network: EthereumNetwork) -> String {
    match network {
        EthereumNetwork::Mainnet => public_rpcs::ETHEREUM_MAINNET.to_string(),
        // Infura no longer serves unauthenticated requests; the URL still documents the target
        other => format!("https://{}.infura.io/v3/", other.name()),
    }
}
