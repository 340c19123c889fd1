//! ERC20 call construction

use super::EvmTxObject;
use crate::tokens::TokenRegistry;
use crate::{Error, Result};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

sol! {
    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
    }
}

pub(crate) fn transfer_calldata(to: Address, amount: U256) -> Bytes {
    IERC20::transferCall { to, amount }.abi_encode().into()
}

pub(crate) fn approve_calldata(spender: Address, amount: U256) -> Bytes {
    IERC20::approveCall { spender, amount }.abi_encode().into()
}

/// Decode `transfer(to, amount)` calldata
pub fn decode_transfer(data: &[u8]) -> Result<(Address, U256)> {
    let call = IERC20::transferCall::abi_decode(data)
        .map_err(|e| Error::InvalidArgument(format!("Not an ERC20 transfer: {}", e)))?;
    Ok((call.to, call.amount))
}

/// Decode `approve(spender, amount)` calldata
pub fn decode_approve(data: &[u8]) -> Result<(Address, U256)> {
    let call = IERC20::approveCall::abi_decode(data)
        .map_err(|e| Error::InvalidArgument(format!("Not an ERC20 approve: {}", e)))?;
    Ok((call.spender, call.amount))
}

/// ERC20 helper bound to the escrow contract that spends allowances
#[derive(Debug, Clone)]
pub struct Erc20 {
    tokens: TokenRegistry,
    spender: Option<Address>,
}

impl Erc20 {
    pub fn new(tokens: TokenRegistry, spender: Option<Address>) -> Self {
        Self { tokens, spender }
    }

    /// `approve(escrow, amount)` on the token contract of `crypto_type`
    pub fn set_allowance_tx(
        &self,
        owner: Address,
        amount: U256,
        crypto_type: &str,
    ) -> Result<EvmTxObject> {
        let contract = self.tokens.contract(crypto_type)?;
        let spender = self
            .spender
            .ok_or_else(|| Error::Config("escrow contract is not configured".to_string()))?;

        Ok(EvmTxObject::new(
            owner,
            contract,
            U256::ZERO,
            approve_calldata(spender, amount),
        ))
    }

    /// `transfer(to, amount)` on the token contract of `crypto_type`
    pub fn transfer_tx(
        &self,
        from: Address,
        to: Address,
        amount: U256,
        crypto_type: &str,
    ) -> Result<EvmTxObject> {
        let contract = self.tokens.contract(crypto_type)?;
        Ok(EvmTxObject::new(
            from,
            contract,
            U256::ZERO,
            transfer_calldata(to, amount),
        ))
    }
}
