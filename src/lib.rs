//! Multi-wallet transaction layer
//!
//! One uniform [`Wallet`] contract over very different signing backends:
//! - `ledger`: USB hardware device with Ethereum and Bitcoin apps
//! - `metamask`: injected browser extension
//! - `metamaskWalletConnect` / `trustWalletConnect` / `coinbaseWalletLink`:
//!   QR-paired bridge wallets sharing one session
//! - `drive`: cloud-backed software keys (EVM key + BIP49 account xpriv)
//! - `escrow`: client half of the escrow multi-sig
//!
//! # Security Model
//!
//! - Private keys live only in [`wallet::LocalSigner`] and the key store
//! - Debug output of key holders is redacted
//! - A send is refused unless the bound account is connected and verified

pub mod account;
pub mod chain;
pub mod config;
pub mod session;
pub mod tokens;
pub mod tx;
pub mod wallet;

mod error;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use account::{Account, AccountData};
pub use config::{Config, RpcConfig};
pub use error::{Error, Result};
pub use wallet::{Wallet, WalletContext, WalletFactory};
