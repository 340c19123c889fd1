//! Hardware device driver
//!
//! The device is acquired once per operation from the shared
//! [`HardwareSession`]; an unreachable transport fails straight away with
//! `BackendUnavailable`. App calls on the acquired device go through the
//! bounded retry policy. Ethereum transactions are signed on the device as
//! legacy EIP-155 payloads; Bitcoin payments are assembled here and signed by
//! the device's Bitcoin app.

use super::{
    bitcoin_tx_fee, build_evm_tx, ensure_connected, evm_tx_fee, finalize_evm_tx,
    require_account, require_account_mut, require_evm, to_satoshi, verify_evm_address, verify_xpub,
    wallet_types, FeeRequest, SendRequest, SendResult, Wallet, WalletContext,
};
use crate::account::{Account, AddressEntry, BitcoinAccount, EthereumAccount};
use crate::session::hardware::{BtcPaymentInput, BtcPaymentRequest, LedgerDevice, WalletPublicKey};
use crate::session::{retry, HardwareSession, RetryPolicy};
use crate::tokens::crypto_types;
use crate::tx::fee::estimate_evm_fee;
use crate::tx::{btc, EvmTxObject, TxFee};
use crate::{Error, Result};
use alloy::consensus::{SignableTransaction, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Signature, B256, U256};
use async_trait::async_trait;
use bitcoin::bip32::{ChainCode, ChildNumber, Fingerprint, Xpub};
use bitcoin::hashes::{hash160, Hash};
use bitcoin::secp256k1::PublicKey;
use bitcoin::NetworkKind;
use serde_json::Value;
use std::sync::Arc;

/// Ethereum app derivation path
pub const ETH_PATH: &str = "44'/60'/0'/0/0";

/// Driver for a USB hardware wallet
pub struct LedgerWallet {
    ctx: WalletContext,
    account: Option<Account>,
    retry: RetryPolicy,
}

impl LedgerWallet {
    pub fn new(ctx: WalletContext, account: Option<Account>) -> Self {
        let retry = RetryPolicy::from_config(&ctx.config.hardware);
        Self {
            ctx,
            account,
            retry,
        }
    }

    fn session(&self) -> Result<&HardwareSession> {
        self.ctx.hardware()
    }

    async fn device(&self) -> Result<Arc<dyn LedgerDevice>> {
        self.session()?.acquire().await
    }

    async fn eth_address(&self) -> Result<String> {
        let device = self.device().await?;
        retry(&self.retry, "eth_get_address", |_| {
            let device = &device;
            async move { device.eth_get_address(ETH_PATH).await }
        })
        .await
    }

    async fn wallet_public_key(&self, path: &str) -> Result<WalletPublicKey> {
        let device = self.device().await?;
        retry(&self.retry, "btc_get_wallet_public_key", |_| {
            let device = &device;
            async move { device.btc_get_wallet_public_key(path).await }
        })
        .await
    }

    /// `{purpose'/coin'}` for the configured Bitcoin network
    fn btc_base_path(&self) -> &'static str {
        self.ctx.config.bitcoin_network.base_path()
    }

    /// Account-level xpub at `{base}/0'`
    ///
    /// The device only hands out raw keys, so the extended key is assembled
    /// from the parent's fingerprint and the account key's chain code.
    async fn account_xpub(&self) -> Result<Xpub> {
        let base = self.btc_base_path();
        let parent = self.wallet_public_key(base).await?;
        let account = self.wallet_public_key(&format!("{}/0'", base)).await?;

        let parent_key = parse_public_key(&parent.public_key)?;
        let hash = hash160::Hash::hash(&parent_key.serialize());
        let mut fingerprint = [0u8; 4];
        fingerprint.copy_from_slice(&hash.as_byte_array()[..4]);

        Ok(Xpub {
            network: NetworkKind::from(self.ctx.bitcoin_network()),
            depth: 3,
            parent_fingerprint: Fingerprint::from(fingerprint),
            child_number: ChildNumber::from_hardened_idx(0).map_err(Error::invalid)?,
            public_key: parse_public_key(&account.public_key)?,
            chain_code: ChainCode::from(account.chain_code),
        })
    }

    async fn new_bitcoin_account(&self, name: &str) -> Result<Account> {
        let xpub = self.account_xpub().await?;
        let receive_path = format!("{}/0'/0/0", self.btc_base_path());
        let receive = self.wallet_public_key(&receive_path).await?;

        tracing::info!(address = %receive.bitcoin_address, "Derived hardware Bitcoin account");
        Ok(Account::Bitcoin(BitcoinAccount::fresh(
            name,
            wallet_types::LEDGER,
            &receive.bitcoin_address,
            &xpub.to_string(),
            &receive_path,
        )))
    }

    /// Sign on the device and broadcast
    async fn sign_and_send(&self, tx: EvmTxObject) -> Result<B256> {
        let chain_id = self.ctx.chain_id();
        let legacy = tx.to_legacy(chain_id)?;
        let unsigned = legacy.encoded_for_signing();

        let device = self.device().await?;
        let device_sig = retry(&self.retry, "eth_sign_transaction", |_| {
            let (device, unsigned) = (&device, &unsigned);
            async move { device.eth_sign_transaction(ETH_PATH, unsigned).await }
        })
        .await?;

        let signed_chain = device_sig.v.checked_sub(35).map(|v| v / 2);
        if signed_chain != Some(chain_id) {
            tracing::error!(expected = chain_id, v = device_sig.v, "Device signed for another chain");
            return Err(Error::ChainIdMismatch {
                expected: chain_id,
                actual: signed_chain,
            });
        }
        let parity = (device_sig.v - 35) % 2 == 1;
        let signature = Signature::new(device_sig.r, device_sig.s, parity);

        let raw = TxEnvelope::Legacy(legacy.into_signed(signature)).encoded_2718();
        let hash = self.ctx.evm()?.send_raw_transaction(&raw).await?;
        tracing::info!(tx_hash = %hash, "Hardware-signed transaction broadcast");
        Ok(hash)
    }

    async fn send_ethereum(
        &self,
        account: &EthereumAccount,
        request: &SendRequest,
        fee: &TxFee,
    ) -> Result<SendResult> {
        let tx = build_evm_tx(
            &self.ctx,
            account,
            &request.to,
            request.value,
            request.options.as_ref(),
        )?;
        let tx = finalize_evm_tx(&self.ctx, tx, fee).await?;
        Ok(SendResult::tx_hash(self.sign_and_send(tx).await?))
    }

    async fn send_bitcoin(&mut self, request: &SendRequest, fee: &TxFee) -> Result<SendResult> {
        let network = self.ctx.bitcoin_network();
        let value = to_satoshi(request.value)?;
        let to = btc::parse_address(&request.to, network)?;

        let account = require_account(&self.account)?.as_bitcoin()?;
        let selection = account.collect_utxos(value, fee.fee_rate()?)?;
        let change = selection.change(value);
        let change_path = format!(
            "{}/0'/1/{}",
            self.btc_base_path(),
            account.hd_wallet_variables()?.next_change_index
        );

        let change_key = self.wallet_public_key(&change_path).await?;
        let change_address = btc::parse_address(&change_key.bitcoin_address, network)?;
        let outputs = btc::payment_outputs(&to, value, &change_address, change)?;

        let client = self.ctx.bitcoin()?;
        let mut inputs = Vec::with_capacity(selection.utxos_collected.len());
        for utxo in &selection.utxos_collected {
            inputs.push(BtcPaymentInput {
                prev_tx_hex: client.raw_transaction(&utxo.tx_hash).await?,
                output_index: utxo.output_index,
                key_path: utxo.key_path.clone(),
                value: utxo.value,
            });
        }
        let payment = BtcPaymentRequest {
            inputs,
            change_path: change_path.clone(),
            outputs_hex: btc::serialize_outputs(&outputs),
            segwit: true,
        };

        let device = self.device().await?;
        let signed = retry(&self.retry, "btc_create_payment_transaction", |_| {
            let (device, payment) = (&device, &payment);
            async move { device.btc_create_payment_transaction(payment).await }
        })
        .await?;
        let txid = client.broadcast(&signed).await?;
        tracing::info!(txid = %txid, inputs = selection.utxos_collected.len(), "Hardware-signed payment broadcast");

        let change_entry = (change > 0).then(|| AddressEntry {
            address: change_key.bitcoin_address.clone(),
            path: change_path,
            utxos: Vec::new(),
        });
        require_account_mut(&mut self.account)?
            .as_bitcoin_mut()?
            .record_spend(&selection, change_entry)?;
        Ok(SendResult::tx_hash(txid))
    }
}

fn parse_public_key(bytes: &[u8]) -> Result<PublicKey> {
    PublicKey::from_slice(bytes)
        .map_err(|e| Error::InvalidArgument(format!("Device returned an invalid public key: {}", e)))
}

#[async_trait]
impl Wallet for LedgerWallet {
    fn wallet_type(&self) -> &str {
        wallet_types::LEDGER
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
            let address = self.eth_address().await?;
            tracing::info!(address = %address, crypto_type, "Derived hardware Ethereum account");
            Account::Ethereum(EthereumAccount::fresh(
                name,
                crypto_type,
                wallet_types::LEDGER,
                &address,
            ))
        };

        self.account = Some(account.clone());
        Ok(account)
    }

    async fn check_wallet_connection(&mut self, _info: Option<&Value>) -> Result<bool> {
        match self.session()?.acquire().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::debug!(error = %e, "Hardware device not reachable");
                Ok(false)
            }
        }
    }

    async fn verify_account(&mut self, _info: Option<&Value>) -> Result<bool> {
        let is_bitcoin = matches!(require_account(&self.account)?, Account::Bitcoin(_));
        if is_bitcoin {
            let xpub = self.account_xpub().await?.to_string();
            verify_xpub(require_account_mut(&mut self.account)?, &xpub)
        } else {
            let address = self.eth_address().await?;
            verify_evm_address(require_account_mut(&mut self.account)?, &address)
        }
    }

    async fn send_transaction(&mut self, request: SendRequest) -> Result<SendResult> {
        let account = require_account(&self.account)?;
        ensure_connected(account)?;
        let fee = request.tx_fee.clone().ok_or(Error::MissingFee)?;

        if let Account::Ethereum(eth) = account {
            return self.send_ethereum(eth, &request, &fee).await;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Utxo;
    use crate::config::Config;
    use crate::testing::{
        funding_tx, test_master, MockBitcoinClient, MockConnector, MockEvmClient, MockLedger,
        ANVIL_ADDRESS, RECIPIENT,
    };
    use crate::wallet::SendOptions;
    use alloy::consensus::transaction::SignerRecoverable;
    use alloy::consensus::Transaction as _;
    use alloy::eips::eip2718::Decodable2718;
    use bitcoin::consensus::encode::deserialize_hex;
    use bitcoin::secp256k1::Secp256k1;
    use bitcoin::{CompressedPublicKey, Network, Transaction};

    struct Fixture {
        wallet: LedgerWallet,
        connector: Arc<MockConnector>,
        evm: Arc<MockEvmClient>,
        bitcoin: Arc<MockBitcoinClient>,
    }

    fn fixture(device: MockLedger) -> Fixture {
        let mut config = Config::default();
        config.hardware.max_attempts = 3;
        config.hardware.retry_delay_ms = 1;

        let connector = Arc::new(MockConnector::new(device));
        let evm = Arc::new(MockEvmClient::new(1).with_nonce(7));
        let bitcoin = Arc::new(MockBitcoinClient::new(5));
        let ctx = WalletContext::new(config.clone())
            .with_hardware(HardwareSession::from_config(connector.clone(), &config.hardware))
            .with_evm_client(evm.clone())
            .with_bitcoin_client(bitcoin.clone());

        Fixture {
            wallet: LedgerWallet::new(ctx, None),
            connector,
            evm,
            bitcoin,
        }
    }

    fn eth_send(fee: Option<TxFee>) -> SendRequest {
        SendRequest {
            to: RECIPIENT.to_string(),
            value: U256::from(1_000u64),
            tx_fee: fee,
            options: Some(SendOptions::direct()),
        }
    }

    #[tokio::test]
    async fn new_ethereum_account_from_device() {
        let mut f = fixture(MockLedger::new(1));
        let account = f
            .wallet
            .new_account("hw", crypto_types::ETHEREUM, None)
            .await
            .unwrap();

        assert_eq!(account.data().address, ANVIL_ADDRESS);
        assert_eq!(account.data().wallet_type, "ledger");
        assert!(account.data().connected && account.data().verified);
        assert_eq!(f.wallet.account().unwrap(), &account);
        assert_eq!(f.connector.opens(), 1);
    }

    #[tokio::test]
    async fn flaky_device_is_retried() {
        let mut f = fixture(MockLedger::new(1).with_failures(2));
        f.wallet
            .new_account("hw", crypto_types::ETHEREUM, None)
            .await
            .unwrap();
        assert_eq!(f.connector.device().calls(), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let mut f = fixture(MockLedger::new(1).with_failures(10));
        let err = f
            .wallet
            .new_account("hw", crypto_types::ETHEREUM, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DeviceCommunicationFailed { attempts: 3, .. }
        ));
    }

    #[tokio::test]
    async fn verify_detects_other_device() {
        let mut f = fixture(MockLedger::new(1));
        f.wallet
            .new_account("hw", crypto_types::ETHEREUM, None)
            .await
            .unwrap();
        assert!(f.wallet.verify_account(None).await.unwrap());

        f.connector.device().set_eth_address(RECIPIENT);
        assert!(matches!(
            f.wallet.verify_account(None).await,
            Err(Error::IncorrectAccount { .. })
        ));
        assert!(!f.wallet.account().unwrap().is_connected());
    }

    #[tokio::test]
    async fn signs_eip155_transfer() {
        let mut f = fixture(MockLedger::new(1));
        f.wallet
            .new_account("hw", crypto_types::ETHEREUM, None)
            .await
            .unwrap();

        let result = f
            .wallet
            .send_transaction(eth_send(Some(TxFee::evm(1_000_000_000, 21_000))))
            .await
            .unwrap();
        assert!(result.tx_hash.is_some());

        let sent = f.evm.sent();
        assert_eq!(sent.len(), 1);
        let envelope = TxEnvelope::decode_2718(&mut sent[0].as_slice()).unwrap();
        assert_eq!(envelope.chain_id(), Some(1));
        assert_eq!(envelope.nonce(), 7);
        assert_eq!(envelope.value(), U256::from(1_000u64));
        assert_eq!(
            envelope.recover_signer().unwrap().to_checksum(None),
            ANVIL_ADDRESS
        );
    }

    #[tokio::test]
    async fn chain_id_mismatch_is_fatal() {
        let mut f = fixture(MockLedger::new(4));
        f.wallet
            .new_account("hw", crypto_types::ETHEREUM, None)
            .await
            .unwrap();

        let err = f
            .wallet
            .send_transaction(eth_send(Some(TxFee::evm(1_000_000_000, 21_000))))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ChainIdMismatch {
                expected: 1,
                actual: Some(4)
            }
        ));
        assert!(f.evm.sent().is_empty());
    }

    #[tokio::test]
    async fn send_preconditions() {
        let mut f = fixture(MockLedger::new(1));
        assert!(matches!(
            f.wallet.send_transaction(eth_send(None)).await,
            Err(Error::AccountUndefined)
        ));

        f.wallet
            .new_account("hw", crypto_types::ETHEREUM, None)
            .await
            .unwrap();
        assert!(matches!(
            f.wallet.send_transaction(eth_send(None)).await,
            Err(Error::MissingFee)
        ));

        f.wallet.account_mut().unwrap().data_mut().connected = false;
        assert!(matches!(
            f.wallet
                .send_transaction(eth_send(Some(TxFee::evm(1, 21_000))))
                .await,
            Err(Error::NotConnected)
        ));
        assert!(f.evm.sent().is_empty());
    }

    #[tokio::test]
    async fn unplugged_device_is_not_connected() {
        let connector = Arc::new(MockConnector::unplugged());
        let config = Config::default();
        let ctx = WalletContext::new(config.clone())
            .with_hardware(HardwareSession::from_config(connector, &config.hardware));
        let mut wallet = LedgerWallet::new(ctx, None);
        assert!(!wallet.check_wallet_connection(None).await.unwrap());
    }

    #[tokio::test]
    async fn unplugged_device_fails_without_retrying() {
        let connector = Arc::new(MockConnector::unplugged());
        let mut config = Config::default();
        config.hardware.max_attempts = 3;
        config.hardware.retry_delay_ms = 1;
        let ctx = WalletContext::new(config.clone())
            .with_hardware(HardwareSession::from_config(connector.clone(), &config.hardware));
        let mut wallet = LedgerWallet::new(ctx, None);

        let err = wallet
            .new_account("hw", crypto_types::ETHEREUM, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(_)), "{err:?}");
        assert_eq!(connector.opens(), 1);

        assert!(matches!(
            wallet.new_account("hw", crypto_types::BITCOIN, None).await,
            Err(Error::BackendUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn bitcoin_account_xpub_matches_derivation() {
        let mut f = fixture(MockLedger::new(1));
        let account = f
            .wallet
            .new_account("btc", crypto_types::BITCOIN, None)
            .await
            .unwrap();

        let secp = Secp256k1::new();
        let account_key = test_master()
            .derive_priv(&secp, &btc::parse_path("49'/1'/0'").unwrap())
            .unwrap();
        let expected = Xpub::from_priv(&secp, &account_key);

        let hd = account.data().hd_wallet_variables.as_ref().unwrap();
        assert_eq!(hd.xpub, expected.to_string());
        assert_eq!(hd.addresses[0].path, "49'/1'/0'/0/0");
        assert!(f.wallet.verify_account(None).await.unwrap());
    }

    #[tokio::test]
    async fn bitcoin_payment_spends_and_records_change() {
        let mut f = fixture(MockLedger::new(1));
        let account = f
            .wallet
            .new_account("btc", crypto_types::BITCOIN, None)
            .await
            .unwrap();

        let receive = btc::parse_address(&account.data().address, Network::Testnet).unwrap();
        let txid = f.bitcoin.add_transaction(&funding_tx(&receive, 100_000, 1));
        {
            let hd = f
                .wallet
                .account_mut()
                .unwrap()
                .data_mut()
                .hd_wallet_variables
                .as_mut()
                .unwrap();
            hd.addresses[0].utxos = vec![Utxo {
                tx_hash: txid,
                output_index: 0,
                value: 100_000,
                key_path: "49'/1'/0'/0/0".to_string(),
            }];
        }

        let secp = Secp256k1::new();
        let dest_key = test_master()
            .derive_priv(&secp, &btc::parse_path("49'/1'/5'/0/0").unwrap())
            .unwrap();
        let dest = btc::p2shwpkh_address(
            &CompressedPublicKey(dest_key.private_key.public_key(&secp)),
            Network::Testnet,
        );

        let result = f
            .wallet
            .send_transaction(SendRequest {
                to: dest.to_string(),
                value: U256::from(10_000u64),
                tx_fee: Some(TxFee::bitcoin(5, 690)),
                options: None,
            })
            .await
            .unwrap();

        let broadcasts = f.bitcoin.broadcasts();
        assert_eq!(broadcasts.len(), 1);
        let tx: Transaction = deserialize_hex(&broadcasts[0]).unwrap();
        assert_eq!(result.tx_hash, Some(tx.compute_txid().to_string()));
        assert_eq!(tx.output.len(), 2);
        assert_eq!(tx.output[0].value.to_sat(), 10_000);
        assert_eq!(tx.output[1].value.to_sat(), 100_000 - 10_000 - 690);
        assert!(!tx.input[0].witness.is_empty());

        let hd = f.wallet.account().unwrap().as_bitcoin().unwrap().hd_wallet_variables().unwrap();
        assert_eq!(hd.total_value(), 0);
        assert_eq!(hd.next_change_index, 1);
        assert!(hd.addresses.iter().any(|a| a.path == "49'/1'/0'/1/0"));
    }

    #[tokio::test]
    async fn wrong_key_path_is_rejected_by_device() {
        let mut f = fixture(MockLedger::new(1));
        let account = f
            .wallet
            .new_account("btc", crypto_types::BITCOIN, None)
            .await
            .unwrap();

        let receive = btc::parse_address(&account.data().address, Network::Testnet).unwrap();
        let txid = f.bitcoin.add_transaction(&funding_tx(&receive, 50_000, 2));
        f.wallet
            .account_mut()
            .unwrap()
            .data_mut()
            .hd_wallet_variables
            .as_mut()
            .unwrap()
            .addresses[0]
            .utxos = vec![Utxo {
            tx_hash: txid,
            output_index: 0,
            value: 50_000,
            key_path: "49'/1'/0'/0/9".to_string(),
        }];

        let err = f
            .wallet
            .send_transaction(SendRequest {
                to: account.data().address.clone(),
                value: U256::from(5_000u64),
                tx_fee: Some(TxFee::bitcoin(1, 138)),
                options: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IncorrectSigningKey(_)));
        assert!(f.bitcoin.broadcasts().is_empty());
    }
}
