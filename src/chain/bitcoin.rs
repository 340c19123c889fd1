//! Esplora-style Bitcoin explorer client

use super::{BitcoinClient, ChainError};
use crate::config::rpc::RpcConfig;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

/// Response of the recommended-fee endpoint, sat/byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeRecommendation {
    pub fastest_fee: u64,
    pub half_hour_fee: u64,
    pub hour_fee: u64,
}

/// [`BitcoinClient`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpBitcoinClient {
    client: Client,
    api_url: String,
    fee_endpoint: String,
}

impl HttpBitcoinClient {
    pub fn new(api_url: &str, fee_endpoint: &str) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            fee_endpoint: fee_endpoint.to_string(),
        }
    }

    pub fn from_rpc_config(rpc: &RpcConfig) -> Self {
        Self::new(&rpc.btc_api_url, &rpc.btc_fee_endpoint)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }

    async fn read_text(response: reqwest::Response) -> std::result::Result<String, ChainError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ChainError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(ChainError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body.trim().to_string())
    }
}

#[async_trait]
impl BitcoinClient for HttpBitcoinClient {
    async fn fee_rate(&self) -> Result<u64> {
        let response = self
            .client
            .get(&self.fee_endpoint)
            .send()
            .await
            .map_err(|e| ChainError::Network(format!("Fee request failed: {}", e)))?;
        let body = Self::read_text(response).await?;
        let fees: FeeRecommendation = serde_json::from_str(&body)
            .map_err(|e| ChainError::Decode(format!("Failed to parse fee response: {}", e)))?;

        tracing::debug!(fastest = fees.fastest_fee, "Fetched Bitcoin fee rate");
        Ok(fees.fastest_fee)
    }

    async fn raw_transaction(&self, txid: &str) -> Result<String> {
        let response = self
            .client
            .get(self.endpoint(&format!("tx/{}/hex", txid)))
            .send()
            .await
            .map_err(|e| ChainError::Network(e.to_string()))?;
        Ok(Self::read_text(response).await?)
    }

    async fn broadcast(&self, tx_hex: &str) -> Result<String> {
        let response = self
            .client
            .post(self.endpoint("tx"))
            .body(tx_hex.to_string())
            .send()
            .await
            .map_err(|e| ChainError::Network(e.to_string()))?;
        let txid = Self::read_text(response).await?;
        tracing::info!(txid = %txid, "Broadcast Bitcoin transaction");
        Ok(txid)
    }
}
