//! Chain clients
//!
//! Drivers reach the networks only through these traits, so tests can swap
//! in in-memory clients. Every transport failure surfaces as
//! [`Error::BackendUnavailable`](crate::Error::BackendUnavailable).

mod bitcoin;
mod evm;

pub use self::bitcoin::{FeeRecommendation, HttpBitcoinClient};
pub use self::evm::AlloyEvmClient;

use crate::tx::EvmTxObject;
use crate::Result;
use alloy::primitives::{Address, B256};
use async_trait::async_trait;

/// Ethereum JSON-RPC operations used by the drivers
#[async_trait]
pub trait EvmClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;

    /// Current gas price in wei
    async fn gas_price(&self) -> Result<u128>;

    async fn estimate_gas(&self, tx: &EvmTxObject) -> Result<u64>;

    /// Nonce of the next transaction from `address`
    async fn transaction_count(&self, address: Address) -> Result<u64>;

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256>;
}

/// Bitcoin explorer operations used by the drivers
#[async_trait]
pub trait BitcoinClient: Send + Sync {
    /// Recommended fee rate in sat/byte
    async fn fee_rate(&self) -> Result<u64>;

    /// Raw hex of a previous transaction (hardware signing needs full inputs)
    async fn raw_transaction(&self, txid: &str) -> Result<String>;

    /// Broadcast a signed transaction, returning its txid
    async fn broadcast(&self, tx_hex: &str) -> Result<String>;
}

/// Error type for chain client failures
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request rejected with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Execution reverted: {0}")]
    Reverted(String),
}

impl From<ChainError> for crate::Error {
    fn from(err: ChainError) -> Self {
        crate::Error::BackendUnavailable(err.to_string())
    }
}
