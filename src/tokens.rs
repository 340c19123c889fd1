//! Shared crypto-type registry
//!
//! Maps the `cryptoType` tags carried by account records to chain family,
//! decimals and (for ERC20 tokens) the token contract.
//!
//! This module is the single source of truth for token information.

use crate::config::Config;
use crate::{Error, Result};
use alloy::primitives::{address, Address, U256};
use std::collections::HashMap;

/// Ledger family a crypto type lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainFamily {
    /// Account-based EVM chain (native ETH or an ERC20 token)
    Evm,
    /// UTXO-based Bitcoin
    Utxo,
}

/// Crypto type metadata
#[derive(Debug, Clone, Copy)]
pub struct TokenInfo {
    /// Token symbol (e.g., "ETH", "DAI")
    pub symbol: &'static str,
    /// Number of decimals of the basic unit
    pub decimals: u8,
    pub family: ChainFamily,
    /// ERC20 contract; `None` for native assets
    pub contract: Option<Address>,
}

impl TokenInfo {
    const fn native(symbol: &'static str, decimals: u8, family: ChainFamily) -> Self {
        Self {
            symbol,
            decimals,
            family,
            contract: None,
        }
    }

    const fn erc20(symbol: &'static str, decimals: u8, contract: Address) -> Self {
        Self {
            symbol,
            decimals,
            family: ChainFamily::Evm,
            contract: Some(contract),
        }
    }

    pub fn is_erc20(&self) -> bool {
        self.contract.is_some()
    }
}

/// Crypto type tags
pub mod crypto_types {
    pub const ETHEREUM: &str = "ethereum";
    pub const BITCOIN: &str = "bitcoin";
    pub const DAI: &str = "dai";
    pub const TETHER: &str = "tether";
    pub const USD_COIN: &str = "usd-coin";
}

/// Mainnet token contracts
pub mod addresses {
    use super::*;

    pub const DAI: Address = address!("6b175474e89094c44da98b954eedeac495271d0f");
    pub const TETHER: Address = address!("dac17f958d2ee523a2206206994597c13d831ec7");
    pub const USD_COIN: Address = address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
}

/// Registry providing crypto type lookups
#[derive(Debug, Clone)]
pub struct TokenRegistry {
    tokens: HashMap<String, TokenInfo>,
}

impl TokenRegistry {
    /// Create a registry with the mainnet contracts
    pub fn new() -> Self {
        use crypto_types::*;

        let mut tokens = HashMap::new();
        tokens.insert(
            ETHEREUM.to_string(),
            TokenInfo::native("ETH", 18, ChainFamily::Evm),
        );
        tokens.insert(
            BITCOIN.to_string(),
            TokenInfo::native("BTC", 8, ChainFamily::Utxo),
        );
        tokens.insert(DAI.to_string(), TokenInfo::erc20("DAI", 18, addresses::DAI));
        tokens.insert(
            TETHER.to_string(),
            TokenInfo::erc20("USDT", 6, addresses::TETHER),
        );
        tokens.insert(
            USD_COIN.to_string(),
            TokenInfo::erc20("USDC", 6, addresses::USD_COIN),
        );

        Self { tokens }
    }

    /// Registry with the contract overrides from the config applied
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        for (crypto_type, contract) in &config.token_contracts {
            registry.set_contract(crypto_type, *contract);
        }
        registry
    }

    /// Point an ERC20 crypto type at a different contract (testnet deployments)
    pub fn set_contract(&mut self, crypto_type: &str, contract: Address) {
        if let Some(info) = self.tokens.get_mut(crypto_type) {
            if info.is_erc20() {
                info.contract = Some(contract);
                return;
            }
        }
        tracing::warn!(crypto_type, "Ignoring contract override for non-ERC20 crypto type");
    }

    pub fn get(&self, crypto_type: &str) -> Option<&TokenInfo> {
        self.tokens.get(crypto_type)
    }

    /// Get token info, failing for unknown crypto types
    pub fn lookup(&self, crypto_type: &str) -> Result<&TokenInfo> {
        self.get(crypto_type)
            .ok_or_else(|| Error::InvalidArgument(format!("Invalid cryptoType: {}", crypto_type)))
    }

    pub fn is_erc20(&self, crypto_type: &str) -> bool {
        self.get(crypto_type).map(|t| t.is_erc20()).unwrap_or(false)
    }

    /// Contract address of an ERC20 crypto type
    pub fn contract(&self, crypto_type: &str) -> Result<Address> {
        self.lookup(crypto_type)?.contract.ok_or_else(|| {
            Error::InvalidArgument(format!("{} is not an ERC20 token", crypto_type))
        })
    }

    pub fn crypto_types(&self) -> impl Iterator<Item = &str> {
        self.tokens.keys().map(|k| k.as_str())
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a basic-unit amount with decimals
pub fn format_units(value: U256, decimals: u32) -> String {
    if value.is_zero() {
        return "0".to_string();
    }

    let divisor = U256::from(10).pow(U256::from(decimals));
    let whole = value / divisor;
    let remainder = value % divisor;

    if remainder.is_zero() {
        whole.to_string()
    } else {
        let remainder_str = format!("{:0>width$}", remainder, width = decimals as usize);
        let trimmed = remainder_str.trim_end_matches('0');
        format!("{}.{}", whole, trimmed)
    }
}
