//! QR-paired bridge wallets
//!
//! MetaMask mobile, Trust and Coinbase Wallet differ only in their tag; all of
//! them sign through the one [`BridgeSession`] held by the context.

use super::{
    build_evm_tx, ensure_connected, evm_tx_fee, require_account, require_account_mut,
    require_evm, verify_evm_address, FeeRequest, SendRequest, SendResult, Wallet, WalletContext,
};
use crate::account::{Account, EthereumAccount};
use crate::session::BridgeSession;
use crate::tx::fee::estimate_evm_fee;
use crate::tx::TxFee;
use crate::{Error, Result};
use alloy::primitives::U256;
use async_trait::async_trait;
use serde_json::Value;

pub struct BridgeWallet {
    ctx: WalletContext,
    account: Option<Account>,
    wallet_type: &'static str,
}

impl BridgeWallet {
    pub fn new(ctx: WalletContext, account: Option<Account>, wallet_type: &'static str) -> Self {
        Self {
            ctx,
            account,
            wallet_type,
        }
    }

    fn session(&self) -> Result<&BridgeSession> {
        self.ctx.bridge()
    }

    async fn paired_address(&self) -> Result<String> {
        self.session()?
            .connected_accounts()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::BackendUnavailable("bridge wallet exposed no accounts".to_string()))
    }
}

#[async_trait]
impl Wallet for BridgeWallet {
    fn wallet_type(&self) -> &str {
        self.wallet_type
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
        let address = self.paired_address().await?;
        tracing::info!(address = %address, wallet_type = self.wallet_type, "Bound bridge account");

        let account = Account::Ethereum(EthereumAccount::fresh(
            name,
            crypto_type,
            self.wallet_type,
            &address,
        ));
        self.account = Some(account.clone());
        Ok(account)
    }

    /// Pairs if needed; a session exposing another account is torn down
    async fn check_wallet_connection(&mut self, _info: Option<&Value>) -> Result<bool> {
        let session = self.session()?;
        let accounts = session.connected_accounts().await?;

        let Some(Account::Ethereum(bound)) = &self.account else {
            return Ok(true);
        };
        let matches = accounts
            .first()
            .map(|a| bound.matches_address(a))
            .unwrap_or(false);
        if !matches {
            tracing::warn!(
                expected = %bound.data().address,
                "Bridge session exposes another account, resetting"
            );
            session.reset().await?;
        }
        Ok(matches)
    }

    async fn verify_account(&mut self, _info: Option<&Value>) -> Result<bool> {
        require_account(&self.account)?;
        let address = self.paired_address().await?;
        verify_evm_address(require_account_mut(&mut self.account)?, &address)
    }

    async fn send_transaction(&mut self, request: SendRequest) -> Result<SendResult> {
        let account = require_account(&self.account)?;
        ensure_connected(account)?;
        let fee = request.tx_fee.as_ref().ok_or(Error::MissingFee)?;
        let eth = account.as_ethereum()?;

        let tx = build_evm_tx(
            &self.ctx,
            eth,
            &request.to,
            request.value,
            request.options.as_ref(),
        )?
        .with_fee(fee)?;

        let hash = self.session()?.send_transaction(&tx).await?;
        tracing::info!(tx_hash = %hash, wallet_type = self.wallet_type, "Bridge wallet broadcast transaction");
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
        let fee = estimate_evm_fee(self.ctx.evm()?.as_ref(), &tx).await?;
        let hash = self.session()?.send_transaction(&tx.with_fee(&fee)?).await?;
        Ok(hash.to_string())
    }
}
