//! Fee estimates
//!
//! EVM fees are `gas * gasPrice` in wei. Bitcoin fees come out of the UTXO
//! selector for a given sat/byte rate.

use super::{EvmTxObject, ETH_TRANSFER_GAS};
use crate::account::BitcoinAccount;
use crate::chain::{BitcoinClient, EvmClient};
use crate::tokens::format_units;
use crate::{Error, Result};
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

/// Fee quote attached to a send request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxFee {
    /// Gas price in wei (EVM) or fee rate in sat/byte (Bitcoin)
    pub price: String,
    /// Gas limit; absent for Bitcoin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<String>,
    pub cost_in_basic_unit: String,
    pub cost_in_standard_unit: String,
}

impl TxFee {
    pub fn evm(gas_price: u128, gas: u64) -> Self {
        let cost = U256::from(gas_price) * U256::from(gas);
        Self {
            price: gas_price.to_string(),
            gas: Some(gas.to_string()),
            cost_in_basic_unit: cost.to_string(),
            cost_in_standard_unit: format_units(cost, 18),
        }
    }

    pub fn bitcoin(fee_rate: u64, fee: u64) -> Self {
        Self {
            price: fee_rate.to_string(),
            gas: None,
            cost_in_basic_unit: fee.to_string(),
            cost_in_standard_unit: format_units(U256::from(fee), 8),
        }
    }

    pub fn gas_limit(&self) -> Result<u64> {
        let gas = self.gas.as_deref().ok_or(Error::MissingFee)?;
        gas.parse()
            .map_err(|e| Error::InvalidArgument(format!("Invalid gas limit {}: {}", gas, e)))
    }

    pub fn gas_price(&self) -> Result<u128> {
        self.price
            .parse()
            .map_err(|e| Error::InvalidArgument(format!("Invalid gas price {}: {}", self.price, e)))
    }

    /// Sat/byte rate of a Bitcoin fee
    pub fn fee_rate(&self) -> Result<u64> {
        if self.gas.is_some() {
            return Err(Error::InvalidArgument("not a Bitcoin fee".to_string()));
        }
        self.price
            .parse()
            .map_err(|e| Error::InvalidArgument(format!("Invalid fee rate {}: {}", self.price, e)))
    }

    /// Fee paid, in the chain's basic unit
    pub fn cost(&self) -> Result<U256> {
        self.cost_in_basic_unit
            .parse()
            .map_err(|e| Error::InvalidArgument(format!("Invalid fee cost: {}", e)))
    }
}

/// Fee for an EVM transaction
///
/// Plain value transfers use the fixed transfer gas; anything carrying
/// calldata is estimated by the node.
pub async fn estimate_evm_fee(client: &dyn EvmClient, tx: &EvmTxObject) -> Result<TxFee> {
    let gas_price = client.gas_price().await?;
    let gas = if tx.data.is_empty() {
        ETH_TRANSFER_GAS
    } else {
        client.estimate_gas(tx).await?
    };

    tracing::debug!(gas_price, gas, "Estimated EVM fee");
    Ok(TxFee::evm(gas_price, gas))
}

/// Fee for sending `value` satoshi out of a Bitcoin account
pub async fn estimate_bitcoin_fee(
    client: &dyn BitcoinClient,
    account: &BitcoinAccount,
    value: u64,
) -> Result<TxFee> {
    let fee_rate = client.fee_rate().await?;
    let selection = account.collect_utxos(value, fee_rate)?;

    let fee = selection.fee_paid(value);
    tracing::debug!(
        fee_rate,
        fee,
        inputs = selection.utxos_collected.len(),
        "Estimated Bitcoin fee"
    );
    Ok(TxFee::bitcoin(fee_rate, fee))
}
