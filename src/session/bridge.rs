//! Bridge (QR pairing) session
//!
//! A relay-backed client pairs with a remote wallet by showing a URI the
//! user scans. The session is shared by every bridge-flavoured driver and
//! survives across them until it is reset or the remote side disconnects.

use crate::config::BridgeConfig;
use crate::tx::EvmTxObject;
use crate::{Error, Result};
use alloy::primitives::B256;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Relay client for one pairing
#[async_trait]
pub trait BridgeClient: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Accounts exposed by the paired wallet
    fn accounts(&self) -> Vec<String>;

    /// Start a pairing, returning the URI to display
    async fn create_session(&self) -> Result<String>;

    /// Resolves with the exposed accounts once the wallet approves the pairing
    async fn wait_for_connect(&self) -> Result<Vec<String>>;

    async fn kill_session(&self) -> Result<()>;

    /// Ask the paired wallet to sign and broadcast
    async fn send_transaction(&self, tx: &EvmTxObject) -> Result<B256>;
}

pub trait BridgeClientFactory: Send + Sync {
    fn create(&self, bridge_url: &str) -> Result<Arc<dyn BridgeClient>>;
}

/// Pairing UI
#[async_trait]
pub trait PairingDisplay: Send + Sync {
    /// Show the pairing URI; resolves only when the user dismisses it
    async fn show(&self, uri: &str);

    async fn close(&self);
}

/// Shared owner of the bridge client
#[derive(Clone)]
pub struct BridgeSession {
    factory: Arc<dyn BridgeClientFactory>,
    display: Arc<dyn PairingDisplay>,
    bridge_url: String,
    client: Arc<Mutex<Option<Arc<dyn BridgeClient>>>>,
}

impl BridgeSession {
    pub fn new(
        factory: Arc<dyn BridgeClientFactory>,
        display: Arc<dyn PairingDisplay>,
        config: &BridgeConfig,
    ) -> Self {
        Self {
            factory,
            display,
            bridge_url: config.bridge_url.clone(),
            client: Arc::new(Mutex::new(None)),
        }
    }

    /// Current client, created on first use
    pub async fn client(&self) -> Result<Arc<dyn BridgeClient>> {
        let mut slot = self.client.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client = self.factory.create(&self.bridge_url)?;
        tracing::debug!(bridge = %self.bridge_url, "Created bridge client");
        *slot = Some(client.clone());
        Ok(client)
    }

    /// Accounts of the paired wallet, pairing first when needed
    pub async fn connected_accounts(&self) -> Result<Vec<String>> {
        let client = self.client().await?;
        if client.is_connected() {
            return Ok(client.accounts());
        }

        let uri = client.create_session().await?;
        tracing::info!("Waiting for bridge pairing");

        let accounts = tokio::select! {
            accounts = client.wait_for_connect() => accounts?,
            _ = self.display.show(&uri) => {
                tracing::info!("Pairing dialog dismissed");
                return Err(Error::UserRejected("pairing dialog closed".to_string()));
            }
        };
        self.display.close().await;

        tracing::info!(accounts = accounts.len(), "Bridge paired");
        Ok(accounts)
    }

    /// Tear down the pairing and start over with a fresh client
    pub async fn reset(&self) -> Result<()> {
        let mut slot = self.client.lock().await;
        if let Some(old) = slot.take() {
            if old.is_connected() {
                if let Err(e) = old.kill_session().await {
                    tracing::warn!(error = %e, "Failed to kill bridge session");
                }
            }
        }
        *slot = Some(self.factory.create(&self.bridge_url)?);
        tracing::info!("Bridge session reset");
        Ok(())
    }

    /// Drop the client after the remote wallet disconnected
    pub async fn handle_disconnect(&self) {
        self.client.lock().await.take();
        tracing::info!("Bridge wallet disconnected");
    }

    pub async fn send_transaction(&self, tx: &EvmTxObject) -> Result<B256> {
        let client = self.client().await?;
        if !client.is_connected() {
            return Err(Error::NotConnected);
        }
        client.send_transaction(tx).await
    }
}

impl std::fmt::Debug for BridgeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeSession")
            .field("bridge_url", &self.bridge_url)
            .finish_non_exhaustive()
    }
}
