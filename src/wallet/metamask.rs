//! Browser extension driver
//!
//! The injected provider holds the keys and broadcasts on its own; this
//! driver only checks the provider sits on the configured network before
//! asking it for accounts.

use super::{
    build_evm_tx, ensure_connected, evm_tx_fee, require_account, require_account_mut,
    require_evm, verify_evm_address, wallet_types, FeeRequest, SendRequest, SendResult, Wallet,
    WalletContext,
};
use crate::account::{Account, EthereumAccount};
use crate::tx::{EvmTxObject, TxFee};
use crate::{Error, Result};
use alloy::primitives::{B256, U256};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Injected browser wallet (EIP-1193 style)
#[async_trait]
pub trait InjectedProvider: Send + Sync {
    /// Whether the provider identifies itself as MetaMask
    fn is_metamask(&self) -> bool;

    /// Chain id the provider is currently on
    async fn network_version(&self) -> Result<u64>;

    /// Prompt for account access; denial maps to `AuthorizationDenied`
    async fn request_accounts(&self) -> Result<Vec<String>>;

    /// Sign and broadcast through the provider
    async fn send_transaction(&self, tx: &EvmTxObject) -> Result<B256>;
}

pub struct MetamaskWallet {
    ctx: WalletContext,
    account: Option<Account>,
}

impl MetamaskWallet {
    pub fn new(ctx: WalletContext, account: Option<Account>) -> Self {
        Self { ctx, account }
    }

    fn provider(&self) -> Result<&Arc<dyn InjectedProvider>> {
        self.ctx
            .provider
            .as_ref()
            .ok_or_else(|| Error::BackendUnavailable("browser provider not found".to_string()))
    }

    /// First exposed account, after the branding and network checks
    async fn current_address(&self) -> Result<String> {
        let provider = self.provider()?;
        if !provider.is_metamask() {
            return Err(Error::BackendUnavailable(
                "browser provider is not MetaMask".to_string(),
            ));
        }

        let network = provider.network_version().await?;
        let expected = self.ctx.chain_id();
        if network != expected {
            tracing::warn!(expected, actual = network, "Provider on wrong network");
            return Err(Error::IncorrectNetwork {
                expected: self.ctx.config.ethereum_network.name().to_string(),
                actual: network.to_string(),
            });
        }

        provider
            .request_accounts()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::BackendUnavailable("provider exposed no accounts".to_string()))
    }
}

#[async_trait]
impl Wallet for MetamaskWallet {
    fn wallet_type(&self) -> &str {
        wallet_types::METAMASK
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
        require_evm(&self.ctx, crypto_type)?;
        let address = self.current_address().await?;
        tracing::info!(address = %address, crypto_type, "Bound browser extension account");

        let account = Account::Ethereum(EthereumAccount::fresh(
            name,
            crypto_type,
            wallet_types::METAMASK,
            &address,
        ));
        self.account = Some(account.clone());
        Ok(account)
    }

    async fn check_wallet_connection(&mut self, _info: Option<&Value>) -> Result<bool> {
        Ok(self
            .ctx
            .provider
            .as_ref()
            .map(|p| p.is_metamask())
            .unwrap_or(false))
    }

    async fn verify_account(&mut self, _info: Option<&Value>) -> Result<bool> {
        require_account(&self.account)?;
        let address = self.current_address().await?;
        verify_evm_address(require_account_mut(&mut self.account)?, &address)
    }

    async fn send_transaction(&mut self, request: SendRequest) -> Result<SendResult> {
        let account = require_account(&self.account)?;
        ensure_connected(account)?;
        let eth = account.as_ethereum()?;

        let mut tx = build_evm_tx(
            &self.ctx,
            eth,
            &request.to,
            request.value,
            request.options.as_ref(),
        )?;
        // The provider fills in whatever fee fields are left out
        if let Some(fee) = &request.tx_fee {
            tx = tx.with_fee(fee)?;
        }

        let hash = self.provider()?.send_transaction(&tx).await?;
        tracing::info!(tx_hash = %hash, "Provider broadcast transaction");
        Ok(SendResult::tx_hash(hash))
    }

    async fn get_tx_fee(&self, request: FeeRequest) -> Result<TxFee> {
        let eth = require_account(&self.account)?.as_ethereum()?;
        evm_tx_fee(&self.ctx, eth, &request).await
    }

    async fn set_token_allowance(&mut self, amount: U256) -> Result<String> {
        let account = require_account(&self.account)?;
        ensure_connected(account)?;
        let eth = account.as_ethereum()?;

        let tx = self
            .ctx
            .erc20()
            .set_allowance_tx(eth.address()?, amount, &eth.data().crypto_type)?;
        let hash = self.provider()?.send_transaction(&tx).await?;
        Ok(hash.to_string())
    }
}
