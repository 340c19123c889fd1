//! Wallet drivers
//!
//! Every signing backend implements [`Wallet`]. A driver owns at most one
//! [`Account`] and reaches chains, devices and pairing sessions only through
//! the collaborators in [`WalletContext`].

pub mod bridge;
pub mod drive;
pub mod escrow;
pub mod factory;
pub mod ledger;
pub mod metamask;
pub mod signer;

pub use factory::{wallet_types, WalletFactory};
pub use signer::{KeyPurpose, KeyStore, LocalSigner, StaticKeyStore};

use crate::account::{Account, BitcoinAccount, EthereumAccount};
use crate::chain::{BitcoinClient, EvmClient};
use crate::config::Config;
use crate::session::{BridgeSession, HardwareSession};
use crate::tokens::{ChainFamily, TokenRegistry};
use crate::tx::erc20::Erc20;
use crate::tx::fee::{estimate_bitcoin_fee, estimate_evm_fee};
use crate::tx::{self, EvmTxObject, MultiSig, TxFee};
use crate::{Error, Result};
use alloy::primitives::U256;
use async_trait::async_trait;
use metamask::InjectedProvider;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Per-send options
#[derive(Clone, Default)]
pub struct SendOptions {
    /// Send straight to the recipient instead of into escrow
    pub direct_transfer: bool,
    /// Escrow contract collaborator; required when `direct_transfer` is false
    pub multi_sig: Option<Arc<dyn MultiSig>>,
}

impl SendOptions {
    pub fn direct() -> Self {
        Self {
            direct_transfer: true,
            multi_sig: None,
        }
    }

    pub fn escrow(multi_sig: Arc<dyn MultiSig>) -> Self {
        Self {
            direct_transfer: false,
            multi_sig: Some(multi_sig),
        }
    }
}

impl std::fmt::Debug for SendOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendOptions")
            .field("direct_transfer", &self.direct_transfer)
            .field("multi_sig", &self.multi_sig.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SendRequest {
    /// Recipient address (hex for EVM, base58/bech32 for Bitcoin)
    pub to: String,
    /// Amount in the basic unit (wei, token base unit, satoshi)
    pub value: U256,
    pub tx_fee: Option<TxFee>,
    pub options: Option<SendOptions>,
}

/// Outcome of a send: a broadcast hash or, for escrow, the client signature
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_sig: Option<String>,
}

impl SendResult {
    pub fn tx_hash(hash: impl ToString) -> Self {
        Self {
            tx_hash: Some(hash.to_string()),
            client_sig: None,
        }
    }

    pub fn client_sig(sig: String) -> Self {
        Self {
            tx_hash: None,
            client_sig: Some(sig),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeeRequest {
    pub value: U256,
    pub options: Option<SendOptions>,
}

/// Uniform contract of every signing backend
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Wallet-type tag (`ledger`, `metamask`, ...)
    fn wallet_type(&self) -> &str;

    /// Bound account; `AccountUndefined` before `new_account`
    fn account(&self) -> Result<&Account>;

    fn account_mut(&mut self) -> Result<&mut Account>;

    /// Derive an address from the backend and bind a fresh account to it
    async fn new_account(
        &mut self,
        name: &str,
        crypto_type: &str,
        options: Option<&Value>,
    ) -> Result<Account>;

    /// Reachability check; makes no claim about which address is exposed
    async fn check_wallet_connection(&mut self, info: Option<&Value>) -> Result<bool>;

    /// Confirm the backend still controls the bound account
    async fn verify_account(&mut self, info: Option<&Value>) -> Result<bool>;

    async fn send_transaction(&mut self, request: SendRequest) -> Result<SendResult>;

    async fn get_tx_fee(&self, request: FeeRequest) -> Result<TxFee>;

    /// ERC20 `approve` of the escrow contract
    async fn set_token_allowance(&mut self, _amount: U256) -> Result<String> {
        Err(Error::UnsupportedOperation(format!(
            "{} wallets cannot set token allowances",
            self.wallet_type()
        )))
    }
}

/// Collaborators shared by every driver built from one factory
#[derive(Clone)]
pub struct WalletContext {
    pub config: Config,
    pub tokens: TokenRegistry,
    pub evm: Option<Arc<dyn EvmClient>>,
    pub bitcoin: Option<Arc<dyn BitcoinClient>>,
    pub hardware: Option<HardwareSession>,
    pub bridge: Option<BridgeSession>,
    pub provider: Option<Arc<dyn InjectedProvider>>,
    pub key_store: Option<Arc<dyn KeyStore>>,
    /// Escrow collaborator used for fee quotes when no options are given
    pub multi_sig: Option<Arc<dyn MultiSig>>,
}

impl WalletContext {
    pub fn new(config: Config) -> Self {
        Self {
            tokens: TokenRegistry::from_config(&config),
            config,
            evm: None,
            bitcoin: None,
            hardware: None,
            bridge: None,
            provider: None,
            key_store: None,
            multi_sig: None,
        }
    }

    pub fn with_evm_client(mut self, client: Arc<dyn EvmClient>) -> Self {
        self.evm = Some(client);
        self
    }

    pub fn with_bitcoin_client(mut self, client: Arc<dyn BitcoinClient>) -> Self {
        self.bitcoin = Some(client);
        self
    }

    pub fn with_hardware(mut self, session: HardwareSession) -> Self {
        self.hardware = Some(session);
        self
    }

    pub fn with_bridge(mut self, session: BridgeSession) -> Self {
        self.bridge = Some(session);
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn InjectedProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_key_store(mut self, key_store: Arc<dyn KeyStore>) -> Self {
        self.key_store = Some(key_store);
        self
    }

    pub fn with_multi_sig(mut self, multi_sig: Arc<dyn MultiSig>) -> Self {
        self.multi_sig = Some(multi_sig);
        self
    }

    pub fn evm(&self) -> Result<&Arc<dyn EvmClient>> {
        self.evm
            .as_ref()
            .ok_or_else(|| Error::BackendUnavailable("no Ethereum client configured".to_string()))
    }

    pub fn bitcoin(&self) -> Result<&Arc<dyn BitcoinClient>> {
        self.bitcoin
            .as_ref()
            .ok_or_else(|| Error::BackendUnavailable("no Bitcoin client configured".to_string()))
    }

    pub fn hardware(&self) -> Result<&HardwareSession> {
        self.hardware
            .as_ref()
            .ok_or_else(|| Error::BackendUnavailable("no hardware transport configured".to_string()))
    }

    pub fn bridge(&self) -> Result<&BridgeSession> {
        self.bridge
            .as_ref()
            .ok_or_else(|| Error::BackendUnavailable("no bridge session configured".to_string()))
    }

    pub fn key_store(&self) -> Result<&Arc<dyn KeyStore>> {
        self.key_store
            .as_ref()
            .ok_or_else(|| Error::BackendUnavailable("no key store configured".to_string()))
    }

    pub fn chain_id(&self) -> u64 {
        self.config.ethereum_network.chain_id()
    }

    pub fn bitcoin_network(&self) -> bitcoin::Network {
        self.config.bitcoin_network.network()
    }

    pub fn erc20(&self) -> Erc20 {
        Erc20::new(self.tokens.clone(), self.config.escrow_contract)
    }
}

impl std::fmt::Debug for WalletContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletContext")
            .field("config", &self.config)
            .field("evm", &self.evm.is_some())
            .field("bitcoin", &self.bitcoin.is_some())
            .field("hardware", &self.hardware.is_some())
            .field("bridge", &self.bridge.is_some())
            .field("provider", &self.provider.is_some())
            .field("key_store", &self.key_store.is_some())
            .finish()
    }
}

pub(crate) fn require_account(account: &Option<Account>) -> Result<&Account> {
    account.as_ref().ok_or(Error::AccountUndefined)
}

pub(crate) fn require_account_mut(account: &mut Option<Account>) -> Result<&mut Account> {
    account.as_mut().ok_or(Error::AccountUndefined)
}

/// Sends need a connected account; nothing is signed otherwise
pub(crate) fn ensure_connected(account: &Account) -> Result<()> {
    if !account.is_connected() {
        return Err(Error::NotConnected);
    }
    Ok(())
}

/// Reject crypto types that do not live on the EVM chain
pub(crate) fn require_evm(ctx: &WalletContext, crypto_type: &str) -> Result<()> {
    match ctx.tokens.lookup(crypto_type)?.family {
        ChainFamily::Evm => Ok(()),
        ChainFamily::Utxo => Err(Error::UnsupportedOperation(format!(
            "{} is not an EVM asset",
            crypto_type
        ))),
    }
}

/// Satoshi amount of a send
pub(crate) fn to_satoshi(value: U256) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| Error::InvalidArgument(format!("{} satoshi does not fit in u64", value)))
}

/// Direct transfer or escrow deposit, per the send options
pub(crate) fn build_evm_tx(
    ctx: &WalletContext,
    account: &EthereumAccount,
    to: &str,
    value: U256,
    options: Option<&SendOptions>,
) -> Result<EvmTxObject> {
    let options = options.ok_or_else(|| Error::MissingOptions("send options".to_string()))?;
    let from = account.address()?;
    let to = tx::parse_address(to)?;
    let crypto_type = &account.data().crypto_type;

    if options.direct_transfer {
        tx::direct_transfer_tx(&ctx.tokens, from, to, value, crypto_type)
    } else {
        let multi_sig = options
            .multi_sig
            .as_ref()
            .ok_or_else(|| Error::MissingOptions("multiSig".to_string()))?;
        tx::escrow_deposit_tx(multi_sig.as_ref(), from, to, value, crypto_type)
    }
}

/// Fee quote for an EVM account
///
/// Without options the quote is for an escrow deposit through the context's
/// multi-sig collaborator, falling back to a direct transfer.
pub(crate) async fn evm_tx_fee(
    ctx: &WalletContext,
    account: &EthereumAccount,
    request: &FeeRequest,
) -> Result<TxFee> {
    let options = match &request.options {
        Some(options) => options.clone(),
        None => match &ctx.multi_sig {
            Some(multi_sig) => SendOptions::escrow(multi_sig.clone()),
            None => SendOptions::direct(),
        },
    };

    // Fee quotes do not depend on the recipient
    let placeholder = account.data().address.clone();
    let tx = build_evm_tx(ctx, account, &placeholder, request.value, Some(&options))?;
    estimate_evm_fee(ctx.evm()?.as_ref(), &tx).await
}

pub(crate) async fn bitcoin_tx_fee(
    ctx: &WalletContext,
    account: &BitcoinAccount,
    request: &FeeRequest,
) -> Result<TxFee> {
    estimate_bitcoin_fee(ctx.bitcoin()?.as_ref(), account, to_satoshi(request.value)?).await
}

/// Merge fee and nonce into an unsigned transaction
pub(crate) async fn finalize_evm_tx(
    ctx: &WalletContext,
    tx: EvmTxObject,
    fee: &TxFee,
) -> Result<EvmTxObject> {
    let nonce = ctx.evm()?.transaction_count(tx.from).await?;
    Ok(tx.with_fee(fee)?.with_nonce(nonce))
}

/// Compare a backend-reported hex address with the bound account
pub(crate) fn verify_evm_address(account: &mut Account, actual: &str) -> Result<bool> {
    let expected = account.data().address.clone();
    if expected.eq_ignore_ascii_case(actual) {
        account.mark_verified();
        tracing::info!(address = %expected, "Account verified");
        Ok(true)
    } else {
        account.mark_disconnected();
        tracing::warn!(expected = %expected, actual = %actual, "Account verification failed");
        Err(Error::IncorrectAccount {
            expected,
            actual: actual.to_string(),
        })
    }
}

/// Compare a backend-derived xpub with the bound account (exact match)
pub(crate) fn verify_xpub(account: &mut Account, actual: &str) -> Result<bool> {
    let btc = account.as_bitcoin()?;
    if btc.matches_xpub(actual) {
        account.mark_verified();
        tracing::info!(address = %account.data().address, "Bitcoin account verified");
        Ok(true)
    } else {
        let expected = btc.hd_wallet_variables()?.xpub.clone();
        account.mark_disconnected();
        tracing::warn!("Bitcoin account xpub mismatch");
        Err(Error::IncorrectAccount {
            expected,
            actual: actual.to_string(),
        })
    }
}
