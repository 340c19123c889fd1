//! Local key material
//!
//! SECURITY: private keys exist only inside [`LocalSigner`] and the
//! [`KeyStore`] that hands them out.
//! - Keys are held in alloy's PrivateKeySigner or a `SecretString`
//! - Keys are never serialized
//! - Keys are never logged; `Debug` impls redact them

use crate::tokens::ChainFamily;
use crate::{Error, Result};
use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::{Signature, SignerSync};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;

/// secp256k1 signer for EVM accounts
pub struct LocalSigner {
    signer: PrivateKeySigner,
    address: Address,
}

impl LocalSigner {
    /// Create a signer from a hex-encoded private key
    pub fn from_hex(key_hex: &str) -> Result<Self> {
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| Error::InvalidArgument(format!("Invalid private key: {}", e)))?;
        let address = signer.address();

        Ok(Self { signer, address })
    }

    pub fn from_secret(key: &SecretString) -> Result<Self> {
        Self::from_hex(key.expose_secret())
    }

    /// Public address (safe to share)
    pub fn address(&self) -> Address {
        self.address
    }

    /// Checksummed address
    pub fn address_string(&self) -> String {
        self.address.to_checksum(None)
    }

    pub fn sign_hash(&self, hash: &B256) -> Result<Signature> {
        self.signer
            .sign_hash_sync(hash)
            .map_err(|e| Error::InvalidArgument(format!("Signing failed: {}", e)))
    }

    /// EIP-191 personal-message signature
    pub fn sign_message(&self, message: &[u8]) -> Result<Signature> {
        self.signer
            .sign_message_sync(message)
            .map_err(|e| Error::InvalidArgument(format!("Signing failed: {}", e)))
    }

    /// Sign a legacy transaction, returning the raw encoded bytes
    pub fn sign_transaction(&self, tx: TxLegacy) -> Result<Vec<u8>> {
        let signature = self.sign_hash(&tx.signature_hash())?;
        let envelope = TxEnvelope::Legacy(tx.into_signed(signature));
        Ok(envelope.encoded_2718())
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .field("signer", &"[REDACTED]")
            .finish()
    }
}

/// Who the keys belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyPurpose {
    /// The user's cloud-backed wallet
    Drive,
    /// The client half of an escrow multi-sig
    Escrow,
}

/// Source of key material for the software wallets
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Hex private key (EVM) or account-level xpriv (Bitcoin)
    async fn key(&self, purpose: KeyPurpose, family: ChainFamily) -> Result<SecretString>;
}

/// In-memory [`KeyStore`]
#[derive(Default)]
pub struct StaticKeyStore {
    keys: HashMap<(KeyPurpose, ChainFamily), SecretString>,
}

impl StaticKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, purpose: KeyPurpose, family: ChainFamily, key: &str) -> Self {
        self.keys
            .insert((purpose, family), SecretString::from(key.to_string()));
        self
    }
}

#[async_trait]
impl KeyStore for StaticKeyStore {
    async fn key(&self, purpose: KeyPurpose, family: ChainFamily) -> Result<SecretString> {
        self.keys
            .get(&(purpose, family))
            .map(|key| SecretString::from(key.expose_secret().to_string()))
            .ok_or_else(|| {
                Error::BackendUnavailable(format!("No {:?} key for {:?}", family, purpose))
            })
    }
}

impl std::fmt::Debug for StaticKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticKeyStore")
            .field("keys", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}
