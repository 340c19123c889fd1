//! Escrow multi-sig client wallet
//!
//! Funds sit in the escrow contract; this wallet never broadcasts. A send
//! produces the client half of the release authorization: an EIP-191
//! signature over the multi-sig's release digest.

use super::{
    ensure_connected, evm_tx_fee, require_account, require_account_mut, require_evm,
    verify_evm_address, wallet_types, FeeRequest, KeyPurpose, LocalSigner, SendRequest,
    SendResult, Wallet, WalletContext,
};
use crate::account::{Account, EthereumAccount};
use crate::tokens::ChainFamily;
use crate::tx::{self, TxFee};
use crate::{Error, Result};
use alloy::primitives::hex;
use async_trait::async_trait;
use serde_json::Value;

pub struct EscrowWallet {
    ctx: WalletContext,
    account: Option<Account>,
}

impl EscrowWallet {
    pub fn new(ctx: WalletContext, account: Option<Account>) -> Self {
        Self { ctx, account }
    }

    async fn signer(&self) -> Result<LocalSigner> {
        let key = self
            .ctx
            .key_store()?
            .key(KeyPurpose::Escrow, ChainFamily::Evm)
            .await?;
        LocalSigner::from_secret(&key)
    }
}

#[async_trait]
impl Wallet for EscrowWallet {
    fn wallet_type(&self) -> &str {
        wallet_types::ESCROW
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
        let address = self.signer().await?.address_string();

        let account = Account::Ethereum(EthereumAccount::fresh(
            name,
            crypto_type,
            wallet_types::ESCROW,
            &address,
        ));
        self.account = Some(account.clone());
        Ok(account)
    }

    async fn check_wallet_connection(&mut self, _info: Option<&Value>) -> Result<bool> {
        Ok(self.ctx.key_store.is_some())
    }

    async fn verify_account(&mut self, _info: Option<&Value>) -> Result<bool> {
        require_account(&self.account)?;
        let address = self.signer().await?.address_string();
        verify_evm_address(require_account_mut(&mut self.account)?, &address)
    }

    async fn send_transaction(&mut self, request: SendRequest) -> Result<SendResult> {
        let account = require_account(&self.account)?;
        ensure_connected(account)?;
        let eth = account.as_ethereum()?;

        let multi_sig = request
            .options
            .as_ref()
            .and_then(|o| o.multi_sig.clone())
            .or_else(|| self.ctx.multi_sig.clone())
            .ok_or_else(|| Error::MissingOptions("multiSig".to_string()))?;

        let to = tx::parse_address(&request.to)?;
        let digest = multi_sig.release_digest(to, request.value, &eth.data().crypto_type)?;
        let signature = self.signer().await?.sign_message(digest.as_slice())?;

        tracing::info!(to = %to, "Signed escrow release");
        Ok(SendResult::client_sig(hex::encode_prefixed(
            signature.as_bytes(),
        )))
    }

    async fn get_tx_fee(&self, request: FeeRequest) -> Result<TxFee> {
        let eth = require_account(&self.account)?.as_ethereum()?;
        evm_tx_fee(&self.ctx, eth, &request).await
    }
}
