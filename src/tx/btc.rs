//! Bitcoin payment assembly and BIP49 (P2SH-P2WPKH) signing

use super::utxo::UtxoSelection;
pub use super::utxo::DUST_LIMIT;
use crate::{Error, Result};
use bitcoin::absolute::LockTime;
use bitcoin::address::NetworkUnchecked;
use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv, Xpub};
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::hashes::Hash;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::secp256k1::{Message, Secp256k1, SecretKey, Signing, Verification};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, CompressedPublicKey, Network, OutPoint, ScriptBuf, Sequence, Transaction,
    TxIn, TxOut, Txid, Witness,
};
use std::str::FromStr;

/// Depth of a BIP49 account key (`purpose'/coin'/account'`)
const ACCOUNT_DEPTH: usize = 3;

/// Parse an address and check it belongs to `network`
pub fn parse_address(address: &str, network: Network) -> Result<Address> {
    address
        .parse::<Address<NetworkUnchecked>>()
        .map_err(|e| Error::InvalidArgument(format!("Invalid Bitcoin address {}: {}", address, e)))?
        .require_network(network)
        .map_err(|e| Error::InvalidArgument(format!("Address {} on wrong network: {}", address, e)))
}

/// P2SH-P2WPKH address of a public key
pub fn p2shwpkh_address(public_key: &CompressedPublicKey, network: Network) -> Address {
    Address::p2shwpkh(public_key, network)
}

/// Parse `a'/b'/c'/d/e` style key paths (with or without a leading `m/`)
pub fn parse_path(path: &str) -> Result<DerivationPath> {
    let normalized = if path.starts_with('m') {
        path.to_string()
    } else {
        format!("m/{}", path)
    };
    DerivationPath::from_str(&normalized)
        .map_err(|e| Error::InvalidArgument(format!("Invalid derivation path {}: {}", path, e)))
}

/// Children below the account level of a full key path
fn account_relative(path: &str) -> Result<Vec<ChildNumber>> {
    let path = parse_path(path)?;
    let children: &[ChildNumber] = path.as_ref();
    if children.len() < ACCOUNT_DEPTH {
        return Err(Error::InvalidArgument(format!(
            "Key path {} is above the account level",
            path
        )));
    }
    Ok(children[ACCOUNT_DEPTH..].to_vec())
}

/// Private key for `key_path`, derived from the account-level extended key
pub fn derive_secret<C: Signing>(
    secp: &Secp256k1<C>,
    account_xpriv: &Xpriv,
    key_path: &str,
) -> Result<SecretKey> {
    let children = account_relative(key_path)?;
    let child = account_xpriv
        .derive_priv(secp, &children)
        .map_err(|e| Error::InvalidArgument(format!("Key derivation failed: {}", e)))?;
    Ok(child.private_key)
}

/// Address for `key_path`, derived from the account-level extended public key
pub fn derive_address<C: Verification>(
    secp: &Secp256k1<C>,
    account_xpub: &Xpub,
    key_path: &str,
    network: Network,
) -> Result<Address> {
    let children = account_relative(key_path)?;
    let child = account_xpub
        .derive_pub(secp, &children)
        .map_err(|e| Error::InvalidArgument(format!("Key derivation failed: {}", e)))?;
    Ok(p2shwpkh_address(&CompressedPublicKey(child.public_key), network))
}

/// Recipient output plus change
///
/// The change output is left out when it would be dust.
pub fn payment_outputs(
    to: &Address,
    value: u64,
    change_address: &Address,
    change: u64,
) -> Result<Vec<TxOut>> {
    if value < DUST_LIMIT {
        return Err(Error::InvalidArgument(format!(
            "Payment of {} sat is below the dust limit",
            value
        )));
    }

    let mut outputs = vec![TxOut {
        value: Amount::from_sat(value),
        script_pubkey: to.script_pubkey(),
    }];
    if change >= DUST_LIMIT {
        outputs.push(TxOut {
            value: Amount::from_sat(change),
            script_pubkey: change_address.script_pubkey(),
        });
    }
    Ok(outputs)
}

/// Consensus encoding of an output list (count prefix included), hex
pub fn serialize_outputs(outputs: &[TxOut]) -> String {
    serialize_hex(&outputs.to_vec())
}

/// Unsigned transaction spending the selected outputs
pub fn unsigned_payment(selection: &UtxoSelection, outputs: Vec<TxOut>) -> Result<Transaction> {
    let input = selection
        .utxos_collected
        .iter()
        .map(|utxo| {
            let txid = Txid::from_str(&utxo.tx_hash).map_err(|e| {
                Error::InvalidArgument(format!("Invalid UTXO hash {}: {}", utxo.tx_hash, e))
            })?;
            Ok(TxIn {
                previous_output: OutPoint::new(txid, utxo.output_index),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input,
        output: outputs,
    })
}

/// Sign input `index` (worth `value` sat) as P2SH-P2WPKH
pub fn sign_p2shwpkh_input<C: Signing>(
    secp: &Secp256k1<C>,
    tx: &mut Transaction,
    index: usize,
    value: u64,
    secret: &SecretKey,
) -> Result<()> {
    let public_key = CompressedPublicKey(secret.public_key(secp));
    let witness_script = ScriptBuf::new_p2wpkh(&public_key.wpubkey_hash());

    let sighash = SighashCache::new(&*tx)
        .p2wpkh_signature_hash(
            index,
            &witness_script,
            Amount::from_sat(value),
            EcdsaSighashType::All,
        )
        .map_err(|e| Error::InvalidArgument(format!("Sighash failed for input {}: {}", index, e)))?;

    let message = Message::from_digest(sighash.to_byte_array());
    let signature = bitcoin::ecdsa::Signature {
        signature: secp.sign_ecdsa(&message, secret),
        sighash_type: EcdsaSighashType::All,
    };

    let mut witness = Witness::new();
    witness.push(signature.to_vec());
    witness.push(public_key.to_bytes());

    // The redeem script is the P2WPKH program itself
    let redeem = PushBytesBuf::try_from(witness_script.to_bytes())
        .map_err(|e| Error::InvalidArgument(format!("Redeem script too large: {}", e)))?;

    let input = tx
        .input
        .get_mut(index)
        .ok_or_else(|| Error::InvalidArgument(format!("No input {}", index)))?;
    input.witness = witness;
    input.script_sig = Builder::new().push_slice(redeem).into_script();
    Ok(())
}

/// Hex of the fully signed transaction
pub fn to_hex(tx: &Transaction) -> String {
    serialize_hex(tx)
}
