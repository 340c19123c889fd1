//! Cloud-backed software wallet
//!
//! Keys come from the [`KeyStore`](super::KeyStore): a hex private key for
//! EVM accounts and an account-level xpriv for Bitcoin. Everything is signed
//! locally; Bitcoin inputs are spent as BIP49 P2SH-P2WPKH.

use super::{
    bitcoin_tx_fee, build_evm_tx, ensure_connected, evm_tx_fee, finalize_evm_tx,
    require_account, require_account_mut, require_evm, to_satoshi, verify_evm_address,
    verify_xpub, wallet_types, FeeRequest, KeyPurpose, LocalSigner, SendRequest, SendResult,
    Wallet, WalletContext,
};
use crate::account::{Account, AddressEntry, BitcoinAccount, EthereumAccount};
use crate::tokens::{crypto_types, ChainFamily};
use crate::tx::fee::estimate_evm_fee;
use crate::tx::{btc, EvmTxObject, TxFee};
use crate::{Error, Result};
use alloy::primitives::{B256, U256};
use async_trait::async_trait;
use bitcoin::bip32::{Xpriv, Xpub};
use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::CompressedPublicKey;
use secrecy::ExposeSecret;
use serde_json::Value;
use std::str::FromStr;

pub struct DriveWallet {
    ctx: WalletContext,
    account: Option<Account>,
    secp: Secp256k1<All>,
}

impl DriveWallet {
    pub fn new(ctx: WalletContext, account: Option<Account>) -> Self {
        Self {
            ctx,
            account,
            secp: Secp256k1::new(),
        }
    }

    async fn evm_signer(&self) -> Result<LocalSigner> {
        let key = self
            .ctx
            .key_store()?
            .key(KeyPurpose::Drive, ChainFamily::Evm)
            .await?;
        LocalSigner::from_secret(&key)
    }

    /// Account xpriv from the record when present, else from the key store
    async fn account_xpriv(&self) -> Result<Xpriv> {
        let from_record = self
            .account
            .as_ref()
            .and_then(|a| a.data().hd_wallet_variables.as_ref())
            .and_then(|hd| hd.xpriv.clone());

        let parsed = match from_record {
            Some(xpriv) => Xpriv::from_str(&xpriv),
            None => {
                let key = self
                    .ctx
                    .key_store()?
                    .key(KeyPurpose::Drive, ChainFamily::Utxo)
                    .await?;
                Xpriv::from_str(key.expose_secret())
            }
        };
        parsed.map_err(|e| Error::InvalidArgument(format!("Invalid account xpriv: {}", e)))
    }

    fn receive_path(&self) -> String {
        format!("{}/0'/0/0", self.ctx.config.bitcoin_network.base_path())
    }

    async fn new_bitcoin_account(&self, name: &str) -> Result<Account> {
        let xpub = Xpub::from_priv(&self.secp, &self.account_xpriv().await?);
        let path = self.receive_path();
        let address = btc::derive_address(&self.secp, &xpub, &path, self.ctx.bitcoin_network())?;

        tracing::info!(address = %address, "Derived drive Bitcoin account");
        Ok(Account::Bitcoin(BitcoinAccount::fresh(
            name,
            wallet_types::DRIVE,
            &address.to_string(),
            &xpub.to_string(),
            &path,
        )))
    }

    async fn sign_and_send(&self, tx: EvmTxObject) -> Result<B256> {
        let signer = self.evm_signer().await?;
        let raw = signer.sign_transaction(tx.to_legacy(self.ctx.chain_id())?)?;
        let hash = self.ctx.evm()?.send_raw_transaction(&raw).await?;
        tracing::info!(tx_hash = %hash, "Drive transaction broadcast");
        Ok(hash)
    }

    async fn send_bitcoin(&mut self, request: &SendRequest, fee: &TxFee) -> Result<SendResult> {
        let network = self.ctx.bitcoin_network();
        let value = to_satoshi(request.value)?;
        let to = btc::parse_address(&request.to, network)?;
        let xpriv = self.account_xpriv().await?;
        let xpub = Xpub::from_priv(&self.secp, &xpriv);

        let account = require_account(&self.account)?.as_bitcoin()?;
        let hd = account.hd_wallet_variables()?;
        let selection = account.collect_utxos(value, fee.fee_rate()?)?;
        let change = selection.change(value);
        let change_path = format!(
            "{}/0'/1/{}",
            self.ctx.config.bitcoin_network.base_path(),
            hd.next_change_index
        );
        let change_address = btc::derive_address(&self.secp, &xpub, &change_path, network)?;

        let outputs = btc::payment_outputs(&to, value, &change_address, change)?;
        let mut tx = btc::unsigned_payment(&selection, outputs)?;

        for (index, utxo) in selection.utxos_collected.iter().enumerate() {
            let secret = btc::derive_secret(&self.secp, &xpriv, &utxo.key_path)?;
            let derived = btc::p2shwpkh_address(
                &CompressedPublicKey(secret.public_key(&self.secp)),
                network,
            )
            .to_string();

            let owner = hd
                .addresses
                .iter()
                .find(|entry| {
                    entry
                        .utxos
                        .iter()
                        .any(|u| u.tx_hash == utxo.tx_hash && u.output_index == utxo.output_index)
                })
                .map(|entry| entry.address.as_str());
            if owner != Some(derived.as_str()) {
                return Err(Error::IncorrectSigningKey(format!(
                    "{} does not derive the address holding {}:{}",
                    utxo.key_path, utxo.tx_hash, utxo.output_index
                )));
            }

            btc::sign_p2shwpkh_input(&self.secp, &mut tx, index, utxo.value, &secret)?;
        }

        let txid = self.ctx.bitcoin()?.broadcast(&btc::to_hex(&tx)).await?;
        tracing::info!(txid = %txid, inputs = selection.utxos_collected.len(), fee = selection.fee_paid(value), "Drive payment broadcast");

        let change_entry = (change > 0).then(|| AddressEntry {
            address: change_address.to_string(),
            path: change_path,
            utxos: Vec::new(),
        });
        require_account_mut(&mut self.account)?
            .as_bitcoin_mut()?
            .record_spend(&selection, change_entry)?;
        Ok(SendResult::tx_hash(txid))
    }
}

#[async_trait]
impl Wallet for DriveWallet {
    fn wallet_type(&self) -> &str {
        wallet_types::DRIVE
    }

    fn account(&self) -> Result<&Account> {
        require_account(&self.account)
    }

    fn account_mut(&mut self) -> Result<&mut Account> {
        require_account_mut(&mut self.account)
    }

    async fn new_account(
        &mut self,
        name: &str,
        crypto_type: &str,
        _options: Option<&Value>,
    ) -> Result<Account> {
        let account = if crypto_type == crypto_types::BITCOIN {
            self.new_bitcoin_account(name).await?
        } else {
            require_evm(&self.ctx, crypto_type)?;
            let signer = self.evm_signer().await?;
            Account::Ethereum(EthereumAccount::fresh(
                name,
                crypto_type,
                wallet_types::DRIVE,
                &signer.address_string(),
            ))
        };

        self.account = Some(account.clone());
        Ok(account)
    }

    async fn check_wallet_connection(&mut self, _info: Option<&Value>) -> Result<bool> {
        Ok(self.ctx.key_store.is_some())
    }

    async fn verify_account(&mut self, _info: Option<&Value>) -> Result<bool> {
        let is_bitcoin = matches!(require_account(&self.account)?, Account::Bitcoin(_));
        if is_bitcoin {
            let xpub = Xpub::from_priv(&self.secp, &self.account_xpriv().await?).to_string();
            verify_xpub(require_account_mut(&mut self.account)?, &xpub)
        } else {
            let address = self.evm_signer().await?.address_string();
            verify_evm_address(require_account_mut(&mut self.account)?, &address)
        }
    }

    async fn send_transaction(&mut self, request: SendRequest) -> Result<SendResult> {
        let account = require_account(&self.account)?;
        ensure_connected(account)?;
        let fee = request.tx_fee.clone().ok_or(Error::MissingFee)?;

        if let Account::Ethereum(eth) = account {
            let tx = build_evm_tx(
                &self.ctx,
                eth,
                &request.to,
                request.value,
                request.options.as_ref(),
            )?;
            let tx = finalize_evm_tx(&self.ctx, tx, &fee).await?;
            return Ok(SendResult::tx_hash(self.sign_and_send(tx).await?));
        }
        self.send_bitcoin(&request, &fee).await
    }

    async fn get_tx_fee(&self, request: FeeRequest) -> Result<TxFee> {
        match require_account(&self.account)? {
            Account::Ethereum(eth) => evm_tx_fee(&self.ctx, eth, &request).await,
            Account::Bitcoin(btc) => bitcoin_tx_fee(&self.ctx, btc, &request).await,
        }
    }

    async fn set_token_allowance(&mut self, amount: U256) -> Result<String> {
        let account = require_account(&self.account)?;
        ensure_connected(account)?;
        let eth = account.as_ethereum()?;

        let tx = self
            .ctx
            .erc20()
            .set_allowance_tx(eth.address()?, amount, &eth.data().crypto_type)?;
        let fee = estimate_evm_fee(self.ctx.evm()?.as_ref(), &tx).await?;
        let tx = finalize_evm_tx(&self.ctx, tx, &fee).await?;
        Ok(self.sign_and_send(tx).await?.to_string())
    }
}
