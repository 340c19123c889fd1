//! Coin selection for Bitcoin inputs
//!
//! Greedy accumulation in pool order followed by a pruning pass that drops
//! any single input the remaining set can do without. The result is
//! deterministic for a given pool ordering.

use crate::account::{AddressEntry, Utxo};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Estimated size of a one-input P2SH-P2WPKH payment, in bytes
pub const BASE_TX_BYTES: u64 = 138;
/// Estimated size added by every further input, in bytes
pub const INPUT_BYTES: u64 = 64;
/// Outputs below this value are non-standard
pub const DUST_LIMIT: u64 = 546;

/// Fee in satoshi for a transaction spending `inputs` outputs
pub fn estimate_fee(inputs: usize, fee_rate: u64) -> Result<u64> {
    let extra = inputs.saturating_sub(1) as u64;
    INPUT_BYTES
        .checked_mul(extra)
        .and_then(|bytes| bytes.checked_add(BASE_TX_BYTES))
        .and_then(|bytes| bytes.checked_mul(fee_rate))
        .ok_or_else(|| {
            Error::InvalidArgument(format!(
                "Fee for {} inputs at {} sat/byte overflows",
                inputs, fee_rate
            ))
        })
}

/// `value` plus the fee for `inputs` inputs
fn required(value: u64, inputs: usize, fee_rate: u64) -> Result<u64> {
    estimate_fee(inputs, fee_rate)?
        .checked_add(value)
        .ok_or_else(|| Error::InvalidArgument(format!("Amount {} plus fee overflows", value)))
}

fn sum(utxos: &[Utxo]) -> u64 {
    utxos.iter().fold(0u64, |acc, u| acc.saturating_add(u.value))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtxoSelection {
    pub fee: u64,
    pub utxos_collected: Vec<Utxo>,
}

impl UtxoSelection {
    /// Total value of the selected inputs
    pub fn total(&self) -> u64 {
        sum(&self.utxos_collected)
    }

    /// Amount returned to the change address
    ///
    /// A remainder below the dust limit gets no output and is left to the
    /// miner, so this returns zero for it.
    pub fn change(&self, value: u64) -> u64 {
        let change = self
            .total()
            .saturating_sub(value.saturating_add(self.fee));
        if change < DUST_LIMIT {
            0
        } else {
            change
        }
    }

    /// Fee actually paid, dust remainder included
    pub fn fee_paid(&self, value: u64) -> u64 {
        self.total()
            .saturating_sub(value)
            .saturating_sub(self.change(value))
    }
}

fn covers(selected: &[Utxo], value: u64, fee_rate: u64) -> Result<bool> {
    Ok(sum(selected) >= required(value, selected.len(), fee_rate)?)
}

/// Select inputs from `addresses` covering `value` plus the fee
pub fn collect_utxos(addresses: &[AddressEntry], value: u64, fee_rate: u64) -> Result<UtxoSelection> {
    let mut selected: Vec<Utxo> = Vec::new();

    for utxo in addresses.iter().flat_map(|a| a.utxos.iter()) {
        selected.push(utxo.clone());
        if covers(&selected, value, fee_rate)? {
            break;
        }
    }

    if selected.is_empty() || !covers(&selected, value, fee_rate)? {
        return Err(Error::InsufficientFunds {
            needed: required(value, selected.len().max(1), fee_rate)?,
            available: sum(&selected),
        });
    }

    // Restart from the front after every removal so the earliest removable
    // input always goes first
    let mut i = 0;
    while i < selected.len() && selected.len() > 1 {
        let removed = selected.remove(i);
        if covers(&selected, value, fee_rate)? {
            i = 0;
        } else {
            selected.insert(i, removed);
            i += 1;
        }
    }

    let fee = estimate_fee(selected.len(), fee_rate)?;
    Ok(UtxoSelection {
        fee,
        utxos_collected: selected,
    })
}
