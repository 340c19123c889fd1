//! Ethereum JSON-RPC client over the alloy HTTP provider

use super::{ChainError, EvmClient};
use crate::config::rpc::RpcConfig;
use crate::tx::EvmTxObject;
use crate::Result;
use alloy::hex;
use alloy::primitives::{Address, B256};
use alloy::providers::{Provider, ProviderBuilder};
use async_trait::async_trait;

/// [`EvmClient`] talking to a JSON-RPC endpoint
#[derive(Debug, Clone)]
pub struct AlloyEvmClient {
    url: url::Url,
}

impl AlloyEvmClient {
    pub fn new(rpc_url: &str) -> std::result::Result<Self, ChainError> {
        let url = rpc_url
            .parse()
            .map_err(|e| ChainError::InvalidUrl(format!("{}: {}", rpc_url, e)))?;
        Ok(Self { url })
    }

    pub fn from_rpc_config(rpc: &RpcConfig) -> std::result::Result<Self, ChainError> {
        Self::new(&rpc.eth_rpc_url)
    }

    fn provider(&self) -> impl Provider {
        ProviderBuilder::new().connect_http(self.url.clone())
    }

    /// Pull a readable revert reason out of an RPC error message
    fn parse_revert_reason(error: &str) -> String {
        if error.contains("execution reverted") {
            if let Some(start) = error.find("revert: ") {
                let reason = &error[start + 8..];
                if let Some(end) = reason.find('"') {
                    return reason[..end].to_string();
                }
                return reason.to_string();
            }
            if let Some(start) = error.find("0x") {
                let hex_data = &error[start..];
                let end = hex_data
                    .find(|c: char| !c.is_ascii_hexdigit() && c != 'x')
                    .unwrap_or(hex_data.len());
                let data = &hex_data[..end];
                // Error(string) selector followed by offset and length words
                if data.starts_with("0x08c379a0") && data.len() > 138 {
                    if let Ok(decoded) = hex::decode(&data[138..]) {
                        let text: Vec<u8> = decoded.into_iter().filter(|&b| b != 0).collect();
                        if let Ok(s) = String::from_utf8(text) {
                            return s;
                        }
                    }
                }
                return format!("Reverted with data: {}", data);
            }
            return "execution reverted".to_string();
        }
        error.to_string()
    }
}

#[async_trait]
impl EvmClient for AlloyEvmClient {
    async fn chain_id(&self) -> Result<u64> {
        let id = self
            .provider()
            .get_chain_id()
            .await
            .map_err(|e| ChainError::Network(e.to_string()))?;
        Ok(id)
    }

    async fn gas_price(&self) -> Result<u128> {
        let price = self
            .provider()
            .get_gas_price()
            .await
            .map_err(|e| ChainError::Network(e.to_string()))?;
        Ok(price)
    }

    async fn estimate_gas(&self, tx: &EvmTxObject) -> Result<u64> {
        let gas = self
            .provider()
            .estimate_gas(tx.to_request())
            .await
            .map_err(|e| ChainError::Reverted(Self::parse_revert_reason(&e.to_string())))?;
        Ok(gas)
    }

    async fn transaction_count(&self, address: Address) -> Result<u64> {
        let nonce = self
            .provider()
            .get_transaction_count(address)
            .await
            .map_err(|e| ChainError::Network(e.to_string()))?;
        Ok(nonce)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256> {
        let pending = self
            .provider()
            .send_raw_transaction(raw)
            .await
            .map_err(|e| ChainError::Network(e.to_string()))?;
        let hash = *pending.tx_hash();
        tracing::info!(tx_hash = %hash, "Broadcast EVM transaction");
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_url() {
        assert!(matches!(
            AlloyEvmClient::new("not a url"),
            Err(ChainError::InvalidUrl(_))
        ));
        let rpc = RpcConfig::with_urls("http://localhost:8545", "http://localhost:3000", "http://fees");
        assert!(AlloyEvmClient::from_rpc_config(&rpc).is_ok());
    }

    #[test]
    fn parse_revert_reason() {
        let error = "execution reverted: revert: Insufficient balance\"";
        assert_eq!(
            AlloyEvmClient::parse_revert_reason(error),
            "Insufficient balance"
        );

        assert_eq!(
            AlloyEvmClient::parse_revert_reason("execution reverted"),
            "execution reverted"
        );

        assert_eq!(
            AlloyEvmClient::parse_revert_reason("execution reverted, data: 0xdeadbeef"),
            "Reverted with data: 0xdeadbeef"
        );

        assert_eq!(
            AlloyEvmClient::parse_revert_reason("connection refused"),
            "connection refused"
        );
    }

    #[test]
    fn chain_errors_become_backend_unavailable() {
        let err: crate::Error = ChainError::Reverted("nope".to_string()).into();
        assert!(matches!(err, crate::Error::BackendUnavailable(_)));
    }
}
