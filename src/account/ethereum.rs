use super::AccountData;
use crate::{Error, Result};
use alloy::primitives::Address;

/// Account on an EVM chain (native ETH or an ERC20 sub-account)
#[derive(Debug, Clone, PartialEq)]
pub struct EthereumAccount {
    data: AccountData,
}

impl EthereumAccount {
    pub fn new(data: AccountData) -> Self {
        Self { data }
    }

    /// A freshly derived account: connected, verified, zero balances
    pub fn fresh(name: &str, crypto_type: &str, wallet_type: &str, address: &str) -> Self {
        Self::new(AccountData {
            crypto_type: crypto_type.to_string(),
            wallet_type: wallet_type.to_string(),
            name: name.to_string(),
            address: address.to_string(),
            balance: "0".to_string(),
            balance_in_standard_unit: "0".to_string(),
            eth_balance: Some("0".to_string()),
            connected: true,
            verified: true,
            receivable: true,
            sendable: true,
            last_synced: 0,
            hd_wallet_variables: None,
        })
    }

    pub fn data(&self) -> &AccountData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut AccountData {
        &mut self.data
    }

    pub fn into_data(self) -> AccountData {
        self.data
    }

    /// Parsed account address
    pub fn address(&self) -> Result<Address> {
        self.data
            .address
            .parse()
            .map_err(|e| Error::InvalidArgument(format!("Invalid account address: {}", e)))
    }

    /// Hex addresses compare case-insensitively (checksum casing is cosmetic)
    pub fn matches_address(&self, other: &str) -> bool {
        self.data.address.eq_ignore_ascii_case(other)
    }
}
