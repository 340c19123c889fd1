//! Wallet-type registry
//!
//! Maps the `walletType` tag of an account record to a driver constructor.
//! New backends are added with [`WalletFactory::register`].

use super::bridge::BridgeWallet;
use super::drive::DriveWallet;
use super::escrow::EscrowWallet;
use super::ledger::LedgerWallet;
use super::metamask::MetamaskWallet;
use super::{Wallet, WalletContext};
use crate::account::{Account, AccountData};
use crate::{Error, Result};
use std::collections::BTreeMap;

/// Wallet-type tags
pub mod wallet_types {
    pub const LEDGER: &str = "ledger";
    pub const METAMASK: &str = "metamask";
    pub const METAMASK_WALLET_CONNECT: &str = "metamaskWalletConnect";
    pub const TRUST_WALLET_CONNECT: &str = "trustWalletConnect";
    pub const COINBASE_WALLET_LINK: &str = "coinbaseWalletLink";
    pub const DRIVE: &str = "drive";
    pub const ESCROW: &str = "escrow";

    /// Tags backed by the shared bridge session
    pub const BRIDGE: [&str; 3] = [
        METAMASK_WALLET_CONNECT,
        TRUST_WALLET_CONNECT,
        COINBASE_WALLET_LINK,
    ];
}

/// Builds a driver, optionally bound to an existing account
pub type WalletConstructor =
    Box<dyn Fn(&WalletContext, Option<Account>) -> Result<Box<dyn Wallet>> + Send + Sync>;

pub struct WalletFactory {
    ctx: WalletContext,
    constructors: BTreeMap<String, WalletConstructor>,
}

impl WalletFactory {
    /// Factory with every built-in backend registered
    pub fn new(ctx: WalletContext) -> Self {
        let mut factory = Self {
            ctx,
            constructors: BTreeMap::new(),
        };

        factory.register(wallet_types::LEDGER, |ctx, account| {
            Ok(Box::new(LedgerWallet::new(ctx.clone(), account)))
        });
        factory.register(wallet_types::METAMASK, |ctx, account| {
            Ok(Box::new(MetamaskWallet::new(ctx.clone(), account)))
        });
        for tag in wallet_types::BRIDGE {
            factory.register(tag, move |ctx, account| {
                Ok(Box::new(BridgeWallet::new(ctx.clone(), account, tag)))
            });
        }
        factory.register(wallet_types::DRIVE, |ctx, account| {
            Ok(Box::new(DriveWallet::new(ctx.clone(), account)))
        });
        factory.register(wallet_types::ESCROW, |ctx, account| {
            Ok(Box::new(EscrowWallet::new(ctx.clone(), account)))
        });

        factory
    }

    /// Add (or replace) the constructor for `wallet_type`
    pub fn register<F>(&mut self, wallet_type: &str, constructor: F)
    where
        F: Fn(&WalletContext, Option<Account>) -> Result<Box<dyn Wallet>> + Send + Sync + 'static,
    {
        self.constructors
            .insert(wallet_type.to_string(), Box::new(constructor));
    }

    /// Driver bound to an existing account, dispatched on its `walletType`
    pub fn create(&self, data: AccountData) -> Result<Box<dyn Wallet>> {
        let constructor = self.constructor(&data.wallet_type)?;
        tracing::debug!(wallet_type = %data.wallet_type, crypto_type = %data.crypto_type, "Creating wallet");
        constructor(&self.ctx, Some(Account::from_data(data)?))
    }

    /// Driver with no account yet, ready for `new_account`
    pub fn create_empty(&self, wallet_type: &str) -> Result<Box<dyn Wallet>> {
        self.constructor(wallet_type)?(&self.ctx, None)
    }

    pub fn supported_types(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn context(&self) -> &WalletContext {
        &self.ctx
    }

    fn constructor(&self, wallet_type: &str) -> Result<&WalletConstructor> {
        self.constructors
            .get(wallet_type)
            .ok_or_else(|| Error::InvalidWalletType(wallet_type.to_string()))
    }
}

impl std::fmt::Debug for WalletFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletFactory")
            .field("types", &self.supported_types())
            .finish_non_exhaustive()
    }
}
