use super::AccountData;
use crate::tokens::crypto_types;
use crate::tx::utxo::{self, UtxoSelection};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Unspent output owned by one address of the HD account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Utxo {
    pub tx_hash: String,
    pub output_index: u32,
    /// Value in satoshi
    pub value: u64,
    /// Full derivation path of the key that can spend this output
    pub key_path: String,
}

/// One derived address and the outputs it holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressEntry {
    pub address: String,
    pub path: String,
    #[serde(default)]
    pub utxos: Vec<Utxo>,
}

/// HD derivation bookkeeping for a UTXO account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HdWalletVariables {
    pub xpub: String,
    /// Account-level extended private key; accepted on input, never written back out
    #[serde(default, skip_serializing)]
    pub xpriv: Option<String>,
    #[serde(default)]
    pub next_address_index: u32,
    #[serde(default)]
    pub next_change_index: u32,
    pub change_address: String,
    #[serde(default)]
    pub addresses: Vec<AddressEntry>,
    #[serde(default)]
    pub last_update: i64,
    #[serde(default)]
    pub end_address_index: u32,
    #[serde(default)]
    pub end_change_index: u32,
}

impl HdWalletVariables {
    /// Sum of all known outputs
    pub fn total_value(&self) -> u64 {
        self.addresses
            .iter()
            .flat_map(|a| a.utxos.iter())
            .map(|u| u.value)
            .sum()
    }
}

/// Account on the Bitcoin ledger
#[derive(Debug, Clone, PartialEq)]
pub struct BitcoinAccount {
    data: AccountData,
}

impl BitcoinAccount {
    pub fn new(data: AccountData) -> Result<Self> {
        if data.hd_wallet_variables.is_none() {
            return Err(Error::InvalidArgument(
                "Bitcoin account is missing hdWalletVariables".to_string(),
            ));
        }
        Ok(Self { data })
    }

    /// A freshly derived account with a single receive address
    pub fn fresh(name: &str, wallet_type: &str, address: &str, xpub: &str, path: &str) -> Self {
        Self {
            data: AccountData {
                crypto_type: crypto_types::BITCOIN.to_string(),
                wallet_type: wallet_type.to_string(),
                name: name.to_string(),
                address: address.to_string(),
                balance: "0".to_string(),
                balance_in_standard_unit: "0".to_string(),
                eth_balance: None,
                connected: true,
                verified: true,
                receivable: true,
                sendable: true,
                last_synced: 0,
                hd_wallet_variables: Some(HdWalletVariables {
                    xpub: xpub.to_string(),
                    xpriv: None,
                    next_address_index: 0,
                    next_change_index: 0,
                    change_address: address.to_string(),
                    addresses: vec![AddressEntry {
                        address: address.to_string(),
                        path: path.to_string(),
                        utxos: Vec::new(),
                    }],
                    last_update: 0,
                    end_address_index: 0,
                    end_change_index: 0,
                }),
            },
        }
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

    pub fn hd_wallet_variables(&self) -> Result<&HdWalletVariables> {
        self.data
            .hd_wallet_variables
            .as_ref()
            .ok_or_else(|| Error::InvalidArgument("hdWalletVariables missing".to_string()))
    }

    fn hd_wallet_variables_mut(&mut self) -> Result<&mut HdWalletVariables> {
        self.data
            .hd_wallet_variables
            .as_mut()
            .ok_or_else(|| Error::InvalidArgument("hdWalletVariables missing".to_string()))
    }

    /// Extended public keys compare exactly
    pub fn matches_xpub(&self, xpub: &str) -> bool {
        self.hd_wallet_variables()
            .map(|hd| hd.xpub == xpub)
            .unwrap_or(false)
    }

    /// Pick inputs covering `value` plus the fee at `fee_rate` sat/byte
    pub fn collect_utxos(&self, value: u64, fee_rate: u64) -> Result<UtxoSelection> {
        utxo::collect_utxos(&self.hd_wallet_variables()?.addresses, value, fee_rate)
    }

    /// Drop spent outputs and register the change address that received the remainder
    pub fn record_spend(&mut self, selection: &UtxoSelection, change: Option<AddressEntry>) -> Result<()> {
        let hd = self.hd_wallet_variables_mut()?;
        for entry in hd.addresses.iter_mut() {
            entry.utxos.retain(|u| {
                !selection
                    .utxos_collected
                    .iter()
                    .any(|s| s.tx_hash == u.tx_hash && s.output_index == u.output_index)
            });
        }

        if let Some(change) = change {
            hd.change_address = change.address.clone();
            hd.next_change_index += 1;
            hd.end_change_index = hd.end_change_index.max(hd.next_change_index);
            if !hd.addresses.iter().any(|a| a.address == change.address) {
                hd.addresses.push(change);
            }
        }
        Ok(())
    }
}
