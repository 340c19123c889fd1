//! Transaction builder
//!
//! Side-effect-free construction of chain-specific unsigned transactions.
//! Builders never choose fees: callers merge a [`TxFee`] after estimation
//! with [`EvmTxObject::with_fee`].

pub mod btc;
pub mod erc20;
pub mod escrow;
pub mod fee;
pub mod utxo;

pub use erc20::Erc20;
pub use escrow::{ContractEscrow, MultiSig};
pub use fee::TxFee;
pub use utxo::{collect_utxos, UtxoSelection};

use crate::tokens::TokenRegistry;
use crate::{Error, Result};
use alloy::consensus::TxLegacy;
use alloy::primitives::{Address, Bytes, TxKind, U256};
use alloy::rpc::types::TransactionRequest;
use serde::{Deserialize, Serialize};

/// Gas used by a plain value transfer
pub const ETH_TRANSFER_GAS: u64 = 21_000;

/// Unsigned EVM transaction object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmTxObject {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u128>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
}

impl EvmTxObject {
    pub fn new(from: Address, to: Address, value: U256, data: Bytes) -> Self {
        Self {
            from,
            to,
            value,
            data,
            gas: None,
            gas_price: None,
            nonce: None,
        }
    }

    /// Merge an estimated fee (gas limit + gas price)
    pub fn with_fee(mut self, fee: &TxFee) -> Result<Self> {
        self.gas = Some(fee.gas_limit()?);
        self.gas_price = Some(fee.gas_price()?);
        Ok(self)
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    /// Request used for gas estimation and provider-side signing
    pub fn to_request(&self) -> TransactionRequest {
        let mut request = TransactionRequest::default()
            .from(self.from)
            .to(self.to)
            .value(self.value)
            .input(self.data.clone().into());
        if let Some(gas) = self.gas {
            request = request.gas_limit(gas);
        }
        if let Some(price) = self.gas_price {
            request = request.gas_price(price);
        }
        if let Some(nonce) = self.nonce {
            request = request.nonce(nonce);
        }
        request
    }

    /// Legacy (EIP-155) transaction ready for signing
    pub fn to_legacy(&self, chain_id: u64) -> Result<TxLegacy> {
        let gas_limit = self.gas.ok_or(Error::MissingFee)?;
        let gas_price = self.gas_price.ok_or(Error::MissingFee)?;
        let nonce = self
            .nonce
            .ok_or_else(|| Error::InvalidArgument("nonce must be resolved before signing".to_string()))?;

        Ok(TxLegacy {
            chain_id: Some(chain_id),
            nonce,
            gas_price,
            gas_limit,
            to: TxKind::Call(self.to),
            value: self.value,
            input: self.data.clone(),
        })
    }
}

/// Parse a hex address supplied by a caller
pub fn parse_address(address: &str) -> Result<Address> {
    address
        .parse()
        .map_err(|e| Error::InvalidArgument(format!("Invalid address {}: {}", address, e)))
}

/// Direct transfer of `value` from `from` to `to`
///
/// Native ETH moves as transaction value; ERC20 tokens become a `transfer`
/// call on the token contract.
pub fn direct_transfer_tx(
    tokens: &TokenRegistry,
    from: Address,
    to: Address,
    value: U256,
    crypto_type: &str,
) -> Result<EvmTxObject> {
    let info = tokens.lookup(crypto_type)?;
    if info.family != crate::tokens::ChainFamily::Evm {
        return Err(Error::UnsupportedOperation(format!(
            "{} is not an EVM crypto type",
            crypto_type
        )));
    }

    match info.contract {
        None => Ok(EvmTxObject::new(from, to, value, Bytes::new())),
        Some(contract) => Ok(EvmTxObject::new(
            from,
            contract,
            U256::ZERO,
            erc20::transfer_calldata(to, value),
        )),
    }
}

/// Deposit into escrow, built by the multi-sig collaborator
pub fn escrow_deposit_tx(
    multi_sig: &dyn MultiSig,
    from: Address,
    to: Address,
    value: U256,
    crypto_type: &str,
) -> Result<EvmTxObject> {
    multi_sig.send_to_escrow_tx(from, to, value, crypto_type)
}
