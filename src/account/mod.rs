//! Account abstraction
//!
//! An [`Account`] wraps the plain [`AccountData`] record exchanged with the
//! API layer. Two variants exist: account-based (EVM) and UTXO-based
//! (Bitcoin). Drivers mutate `connected`/`verified` in place; persisting the
//! record is the caller's job.

mod bitcoin;
mod ethereum;

pub use self::bitcoin::{AddressEntry, BitcoinAccount, HdWalletVariables, Utxo};
pub use self::ethereum::EthereumAccount;

use crate::tokens::crypto_types;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

fn zero() -> String {
    "0".to_string()
}

/// Account record shared with the API layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountData {
    pub crypto_type: String,
    pub wallet_type: String,
    pub name: String,
    pub address: String,
    /// Balance in basic units (wei, satoshi, token base unit)
    #[serde(default = "zero")]
    pub balance: String,
    #[serde(default = "zero")]
    pub balance_in_standard_unit: String,
    /// Native ETH balance of the platform address (ERC20 sub-accounts)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eth_balance: Option<String>,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub receivable: bool,
    #[serde(default)]
    pub sendable: bool,
    /// Unix seconds of the last balance sync
    #[serde(default)]
    pub last_synced: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hd_wallet_variables: Option<HdWalletVariables>,
}

/// Account owned by a wallet driver
#[derive(Debug, Clone, PartialEq)]
pub enum Account {
    Ethereum(EthereumAccount),
    Bitcoin(BitcoinAccount),
}

impl Account {
    /// Wrap a record, picking the variant from `cryptoType`
    pub fn from_data(data: AccountData) -> Result<Self> {
        if data.crypto_type == crypto_types::BITCOIN {
            Ok(Account::Bitcoin(BitcoinAccount::new(data)?))
        } else {
            Ok(Account::Ethereum(EthereumAccount::new(data)))
        }
    }

    pub fn data(&self) -> &AccountData {
        match self {
            Account::Ethereum(a) => a.data(),
            Account::Bitcoin(a) => a.data(),
        }
    }

    pub fn data_mut(&mut self) -> &mut AccountData {
        match self {
            Account::Ethereum(a) => a.data_mut(),
            Account::Bitcoin(a) => a.data_mut(),
        }
    }

    pub fn into_data(self) -> AccountData {
        match self {
            Account::Ethereum(a) => a.into_data(),
            Account::Bitcoin(a) => a.into_data(),
        }
    }

    pub fn crypto_type(&self) -> &str {
        &self.data().crypto_type
    }

    pub fn is_connected(&self) -> bool {
        self.data().connected
    }

    pub fn as_ethereum(&self) -> Result<&EthereumAccount> {
        match self {
            Account::Ethereum(a) => Ok(a),
            Account::Bitcoin(_) => Err(Error::UnsupportedOperation(
                "operation requires an Ethereum account".to_string(),
            )),
        }
    }

    pub fn as_bitcoin(&self) -> Result<&BitcoinAccount> {
        match self {
            Account::Bitcoin(a) => Ok(a),
            Account::Ethereum(_) => Err(Error::UnsupportedOperation(
                "operation requires a Bitcoin account".to_string(),
            )),
        }
    }

    pub fn as_bitcoin_mut(&mut self) -> Result<&mut BitcoinAccount> {
        match self {
            Account::Bitcoin(a) => Ok(a),
            Account::Ethereum(_) => Err(Error::UnsupportedOperation(
                "operation requires a Bitcoin account".to_string(),
            )),
        }
    }

    /// Record the outcome of a successful backend verification
    pub(crate) fn mark_verified(&mut self) {
        let data = self.data_mut();
        data.connected = true;
        data.verified = true;
    }

    /// Revoke the connection after a verification mismatch
    pub(crate) fn mark_disconnected(&mut self) {
        self.data_mut().connected = false;
    }

    /// Store refreshed balances and stamp `lastSynced`
    pub fn set_balances(&mut self, balance: String, balance_in_standard_unit: String) {
        let data = self.data_mut();
        data.balance = balance;
        data.balance_in_standard_unit = balance_in_standard_unit;
        data.last_synced = chrono::Utc::now().timestamp();
    }
}
