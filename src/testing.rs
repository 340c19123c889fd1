//! In-memory collaborators for driver tests

use crate::chain::{BitcoinClient, EvmClient};
use crate::session::bridge::{BridgeClient, BridgeClientFactory, PairingDisplay};
use crate::session::hardware::{
    BtcPaymentRequest, DeviceConnector, DeviceSignature, LedgerDevice, WalletPublicKey,
};
use crate::tx::btc;
use crate::tx::EvmTxObject;
use crate::wallet::metamask::InjectedProvider;
use crate::{Error, Result};
use alloy::primitives::{keccak256, Address, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use async_trait::async_trait;
use bitcoin::bip32::Xpriv;
use bitcoin::consensus::encode::deserialize_hex;
use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::transaction::Version;
use bitcoin::{
    absolute::LockTime, CompressedPublicKey, Network, OutPoint, ScriptBuf, Sequence, Transaction,
    TxIn, TxOut, Witness,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Anvil's first dev key
pub const ANVIL_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const ANVIL_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
pub const RECIPIENT: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

/// Deterministic test master key
pub fn test_master() -> Xpriv {
    Xpriv::new_master(Network::Testnet, &[7u8; 32]).unwrap()
}

pub fn anvil_signer() -> PrivateKeySigner {
    ANVIL_KEY.trim_start_matches("0x").parse().unwrap()
}

// ---------------------------------------------------------------------------
// Chains
// ---------------------------------------------------------------------------

pub struct MockEvmClient {
    chain_id: u64,
    gas_price: u128,
    gas_estimate: u64,
    nonce: u64,
    reachable: bool,
    sent: Mutex<Vec<Vec<u8>>>,
}

impl MockEvmClient {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            gas_price: 20_000_000_000,
            gas_estimate: 50_000,
            nonce: 0,
            reachable: true,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn with_gas_estimate(mut self, gas: u64) -> Self {
        self.gas_estimate = gas;
        self
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    fn check(&self) -> Result<()> {
        if self.reachable {
            Ok(())
        } else {
            Err(Error::backend("connection refused"))
        }
    }
}

#[async_trait]
impl EvmClient for MockEvmClient {
    async fn chain_id(&self) -> Result<u64> {
        self.check()?;
        Ok(self.chain_id)
    }

    async fn gas_price(&self) -> Result<u128> {
        self.check()?;
        Ok(self.gas_price)
    }

    async fn estimate_gas(&self, _tx: &EvmTxObject) -> Result<u64> {
        self.check()?;
        Ok(self.gas_estimate)
    }

    async fn transaction_count(&self, _address: Address) -> Result<u64> {
        self.check()?;
        Ok(self.nonce)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256> {
        self.check()?;
        self.sent.lock().unwrap().push(raw.to_vec());
        Ok(keccak256(raw))
    }
}

pub struct MockBitcoinClient {
    fee_rate: u64,
    raw: Mutex<HashMap<String, String>>,
    broadcasts: Mutex<Vec<String>>,
}

impl MockBitcoinClient {
    pub fn new(fee_rate: u64) -> Self {
        Self {
            fee_rate,
            raw: Mutex::new(HashMap::new()),
            broadcasts: Mutex::new(Vec::new()),
        }
    }

    /// Register a previous transaction, returning its txid
    pub fn add_transaction(&self, tx: &Transaction) -> String {
        let txid = tx.compute_txid().to_string();
        self.raw.lock().unwrap().insert(txid.clone(), btc::to_hex(tx));
        txid
    }

    pub fn broadcasts(&self) -> Vec<String> {
        self.broadcasts.lock().unwrap().clone()
    }
}

#[async_trait]
impl BitcoinClient for MockBitcoinClient {
    async fn fee_rate(&self) -> Result<u64> {
        Ok(self.fee_rate)
    }

    async fn raw_transaction(&self, txid: &str) -> Result<String> {
        self.raw
            .lock()
            .unwrap()
            .get(txid)
            .cloned()
            .ok_or_else(|| Error::backend(format!("unknown transaction {}", txid)))
    }

    async fn broadcast(&self, tx_hex: &str) -> Result<String> {
        let tx: Transaction = deserialize_hex(tx_hex).map_err(Error::invalid)?;
        self.broadcasts.lock().unwrap().push(tx_hex.to_string());
        Ok(tx.compute_txid().to_string())
    }
}

/// Previous transaction paying `value` to `address`
pub fn funding_tx(address: &bitcoin::Address, value: u64, salt: u32) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::from_consensus(salt),
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: bitcoin::Amount::from_sat(value),
            script_pubkey: address.script_pubkey(),
        }],
    }
}

// ---------------------------------------------------------------------------
// Hardware
// ---------------------------------------------------------------------------

pub struct MockLedger {
    open: AtomicBool,
    closes: AtomicU32,
    calls: AtomicU32,
    failures: AtomicU32,
    signing_chain_id: u64,
    eth_key: PrivateKeySigner,
    eth_address: Mutex<Option<String>>,
    master: Xpriv,
    secp: Secp256k1<All>,
}

impl MockLedger {
    /// Device whose Ethereum app signs for `chain_id`
    pub fn new(chain_id: u64) -> Self {
        Self {
            open: AtomicBool::new(false),
            closes: AtomicU32::new(0),
            calls: AtomicU32::new(0),
            failures: AtomicU32::new(0),
            signing_chain_id: chain_id,
            eth_key: anvil_signer(),
            eth_address: Mutex::new(None),
            master: test_master(),
            secp: Secp256k1::new(),
        }
    }

    /// Fail the next `n` address requests
    pub fn with_failures(self, n: u32) -> Self {
        self.failures.store(n, Ordering::SeqCst);
        self
    }

    /// Report a different Ethereum address (user switched device seed)
    pub fn set_eth_address(&self, address: &str) {
        *self.eth_address.lock().unwrap() = Some(address.to_string());
    }

    pub fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn flaky(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::backend("app not responding"));
        }
        Ok(())
    }

    fn derive(&self, path: &str) -> Result<Xpriv> {
        self.master
            .derive_priv(&self.secp, &btc::parse_path(path)?)
            .map_err(Error::invalid)
    }
}

#[async_trait]
impl LedgerDevice for MockLedger {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::SeqCst);
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn eth_get_address(&self, _path: &str) -> Result<String> {
        self.flaky()?;
        let address = self.eth_address.lock().unwrap().clone();
        Ok(address.unwrap_or_else(|| self.eth_key.address().to_checksum(None)))
    }

    async fn eth_sign_transaction(&self, _path: &str, unsigned_rlp: &[u8]) -> Result<DeviceSignature> {
        let signature = self
            .eth_key
            .sign_hash_sync(&keccak256(unsigned_rlp))
            .map_err(Error::invalid)?;
        Ok(DeviceSignature {
            v: 35 + 2 * self.signing_chain_id + signature.v() as u64,
            r: signature.r(),
            s: signature.s(),
        })
    }

    async fn btc_get_wallet_public_key(&self, path: &str) -> Result<WalletPublicKey> {
        self.flaky()?;
        let key = self.derive(path)?;
        let public_key = key.private_key.public_key(&self.secp);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&key.chain_code[..]);

        Ok(WalletPublicKey {
            public_key: public_key.serialize_uncompressed().to_vec(),
            bitcoin_address: btc::p2shwpkh_address(&CompressedPublicKey(public_key), Network::Testnet)
                .to_string(),
            chain_code,
        })
    }

    async fn btc_create_payment_transaction(&self, request: &BtcPaymentRequest) -> Result<String> {
        let outputs: Vec<TxOut> = deserialize_hex(&request.outputs_hex).map_err(Error::invalid)?;
        let mut tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: Vec::new(),
            output: outputs,
        };

        let mut keys = Vec::new();
        for input in &request.inputs {
            let prev: Transaction = deserialize_hex(&input.prev_tx_hex).map_err(Error::invalid)?;
            let prev_out = prev
                .output
                .get(input.output_index as usize)
                .ok_or_else(|| Error::invalid("output index out of range"))?;

            let secret = self.derive(&input.key_path)?.private_key;
            let owner = btc::p2shwpkh_address(
                &CompressedPublicKey(secret.public_key(&self.secp)),
                Network::Testnet,
            );
            if owner.script_pubkey() != prev_out.script_pubkey {
                return Err(Error::IncorrectSigningKey(format!(
                    "{} has no matching script",
                    input.key_path
                )));
            }

            tx.input.push(TxIn {
                previous_output: OutPoint::new(prev.compute_txid(), input.output_index),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            });
            keys.push((secret, prev_out.value.to_sat()));
        }

        for (index, (secret, value)) in keys.iter().enumerate() {
            btc::sign_p2shwpkh_input(&self.secp, &mut tx, index, *value, secret)?;
        }
        Ok(btc::to_hex(&tx))
    }
}

pub struct MockConnector {
    device: Arc<MockLedger>,
    plugged: bool,
    opens: AtomicU32,
}

impl MockConnector {
    pub fn new(device: MockLedger) -> Self {
        Self {
            device: Arc::new(device),
            plugged: true,
            opens: AtomicU32::new(0),
        }
    }

    pub fn unplugged() -> Self {
        Self {
            plugged: false,
            ..Self::new(MockLedger::new(1))
        }
    }

    pub fn device(&self) -> &Arc<MockLedger> {
        &self.device
    }

    pub fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceConnector for MockConnector {
    async fn open(&self) -> Result<Arc<dyn LedgerDevice>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if !self.plugged {
            return Err(Error::backend("device not connected"));
        }
        self.device.open.store(true, Ordering::SeqCst);
        let device: Arc<dyn LedgerDevice> = self.device.clone();
        Ok(device)
    }
}

// ---------------------------------------------------------------------------
// Browser extension
// ---------------------------------------------------------------------------

pub struct MockProvider {
    branded: bool,
    network: u64,
    accounts: Vec<String>,
    deny: bool,
    account_requests: AtomicU32,
    sent: Mutex<Vec<EvmTxObject>>,
}

impl MockProvider {
    pub fn new(network: u64, accounts: Vec<String>) -> Self {
        Self {
            branded: true,
            network,
            accounts,
            deny: false,
            account_requests: AtomicU32::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn denying(mut self) -> Self {
        self.deny = true;
        self
    }

    pub fn unbranded(mut self) -> Self {
        self.branded = false;
        self
    }

    pub fn account_requests(&self) -> u32 {
        self.account_requests.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<EvmTxObject> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl InjectedProvider for MockProvider {
    fn is_metamask(&self) -> bool {
        self.branded
    }

    async fn network_version(&self) -> Result<u64> {
        Ok(self.network)
    }

    async fn request_accounts(&self) -> Result<Vec<String>> {
        self.account_requests.fetch_add(1, Ordering::SeqCst);
        if self.deny {
            return Err(Error::AuthorizationDenied("user denied account access".to_string()));
        }
        Ok(self.accounts.clone())
    }

    async fn send_transaction(&self, tx: &EvmTxObject) -> Result<B256> {
        self.sent.lock().unwrap().push(tx.clone());
        Ok(keccak256(&tx.data))
    }
}

// ---------------------------------------------------------------------------
// Bridge
// ---------------------------------------------------------------------------

#[derive(Default)]
struct BridgeCounters {
    created: AtomicU32,
    pairings: AtomicU32,
    kills: AtomicU32,
}

pub struct MockBridgeClient {
    connected: AtomicBool,
    approve: bool,
    accounts: Vec<String>,
    counters: Arc<BridgeCounters>,
    sent: Arc<Mutex<Vec<EvmTxObject>>>,
}

#[async_trait]
impl BridgeClient for MockBridgeClient {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn accounts(&self) -> Vec<String> {
        if self.is_connected() {
            self.accounts.clone()
        } else {
            Vec::new()
        }
    }

    async fn create_session(&self) -> Result<String> {
        Ok("wc:00e46b69-d0cc-4b3e-b6a2-cee442f97188@1?bridge=test&key=00".to_string())
    }

    async fn wait_for_connect(&self) -> Result<Vec<String>> {
        if !self.approve {
            std::future::pending::<()>().await;
        }
        self.counters.pairings.fetch_add(1, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        Ok(self.accounts.clone())
    }

    async fn kill_session(&self) -> Result<()> {
        self.counters.kills.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn send_transaction(&self, tx: &EvmTxObject) -> Result<B256> {
        self.sent.lock().unwrap().push(tx.clone());
        Ok(keccak256(&tx.data))
    }
}

pub struct MockBridgeFactory {
    approve: bool,
    accounts: Vec<String>,
    counters: Arc<BridgeCounters>,
    sent: Arc<Mutex<Vec<EvmTxObject>>>,
}

impl MockBridgeFactory {
    /// Remote wallet approves pairings and exposes `accounts`
    pub fn approving(accounts: Vec<String>) -> Self {
        Self {
            approve: true,
            accounts,
            counters: Arc::default(),
            sent: Arc::default(),
        }
    }

    /// Remote wallet never answers
    pub fn never_approving() -> Self {
        Self {
            approve: false,
            ..Self::approving(Vec::new())
        }
    }

    pub fn created(&self) -> u32 {
        self.counters.created.load(Ordering::SeqCst)
    }

    pub fn pairings(&self) -> u32 {
        self.counters.pairings.load(Ordering::SeqCst)
    }

    pub fn kills(&self) -> u32 {
        self.counters.kills.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<EvmTxObject> {
        self.sent.lock().unwrap().clone()
    }
}

impl BridgeClientFactory for MockBridgeFactory {
    fn create(&self, _bridge_url: &str) -> Result<Arc<dyn BridgeClient>> {
        self.counters.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockBridgeClient {
            connected: AtomicBool::new(false),
            approve: self.approve,
            accounts: self.accounts.clone(),
            counters: self.counters.clone(),
            sent: self.sent.clone(),
        }))
    }
}

pub struct MockDisplay {
    dismiss: bool,
    closes: AtomicU32,
}

impl MockDisplay {
    /// Dialog stays up until the pairing completes
    pub fn waiting() -> Self {
        Self {
            dismiss: false,
            closes: AtomicU32::new(0),
        }
    }

    /// User closes the dialog right away
    pub fn dismissing() -> Self {
        Self {
            dismiss: true,
            closes: AtomicU32::new(0),
        }
    }

    pub fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PairingDisplay for MockDisplay {
    async fn show(&self, _uri: &str) {
        if !self.dismiss {
            std::future::pending::<()>().await;
        }
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
