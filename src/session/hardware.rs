//! Hardware wallet transport
//!
//! The USB transport and the on-device apps are consumed through
//! [`DeviceConnector`] and [`LedgerDevice`]. [`HardwareSession`] owns the one
//! open handle: acquisition reuses it while it stays open, and an idle timer
//! closes it once nobody has touched it for the configured timeout.

use crate::config::HardwareConfig;
use crate::Result;
use alloy::primitives::U256;
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Ethereum signature as returned by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSignature {
    /// EIP-155 `v` (`35 + 2 * chainId + parity`)
    pub v: u64,
    pub r: U256,
    pub s: U256,
}

/// Public key of a Bitcoin derivation path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletPublicKey {
    /// SEC1 encoded key, compressed or uncompressed
    pub public_key: Vec<u8>,
    pub bitcoin_address: String,
    pub chain_code: [u8; 32],
}

/// One input of a device-signed payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtcPaymentInput {
    /// Raw hex of the transaction that created the output
    pub prev_tx_hex: String,
    pub output_index: u32,
    pub key_path: String,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtcPaymentRequest {
    pub inputs: Vec<BtcPaymentInput>,
    pub change_path: String,
    /// Consensus-serialized outputs, hex
    pub outputs_hex: String,
    pub segwit: bool,
}

/// Open handle to a hardware wallet with its Ethereum and Bitcoin apps
#[async_trait]
pub trait LedgerDevice: Send + Sync {
    fn is_open(&self) -> bool;

    async fn close(&self) -> Result<()>;

    async fn eth_get_address(&self, path: &str) -> Result<String>;

    /// Sign an unsigned EIP-155 RLP payload
    async fn eth_sign_transaction(&self, path: &str, unsigned_rlp: &[u8]) -> Result<DeviceSignature>;

    async fn btc_get_wallet_public_key(&self, path: &str) -> Result<WalletPublicKey>;

    /// Build and sign a payment, returning the raw transaction hex
    async fn btc_create_payment_transaction(&self, request: &BtcPaymentRequest) -> Result<String>;
}

/// Opens the USB transport
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    /// Fails with `BackendUnavailable` when no device is plugged in
    async fn open(&self) -> Result<Arc<dyn LedgerDevice>>;
}

#[derive(Default)]
struct Slot {
    device: Option<Arc<dyn LedgerDevice>>,
    /// Bumped on every acquire and release; a timer only fires for its own generation
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl Slot {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Shared owner of the hardware transport
#[derive(Clone)]
pub struct HardwareSession {
    connector: Arc<dyn DeviceConnector>,
    idle_timeout: Duration,
    slot: Arc<Mutex<Slot>>,
}

impl HardwareSession {
    pub fn new(connector: Arc<dyn DeviceConnector>, idle_timeout: Duration) -> Self {
        Self {
            connector,
            idle_timeout,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    pub fn from_config(connector: Arc<dyn DeviceConnector>, config: &HardwareConfig) -> Self {
        Self::new(connector, config.idle_timeout())
    }

    /// Open handle, reusing the current one while it is still open
    pub async fn acquire(&self) -> Result<Arc<dyn LedgerDevice>> {
        let mut slot = self.slot.lock().await;

        if let Some(device) = slot.device.as_ref().filter(|d| d.is_open()).cloned() {
            tracing::debug!("Reusing open hardware transport");
            self.arm_idle_timer(&mut slot);
            return Ok(device);
        }

        let device = self.connector.open().await?;
        tracing::info!(
            idle_timeout_secs = self.idle_timeout.as_secs(),
            "Opened hardware transport"
        );
        slot.device = Some(device.clone());
        self.arm_idle_timer(&mut slot);
        Ok(device)
    }

    /// Close the handle now
    pub async fn release(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        slot.cancel_timer();
        slot.generation += 1;
        if let Some(device) = slot.device.take() {
            device.close().await?;
            tracing::info!("Released hardware transport");
        }
        Ok(())
    }

    pub async fn is_active(&self) -> bool {
        let slot = self.slot.lock().await;
        slot.device.as_ref().map(|d| d.is_open()).unwrap_or(false)
    }

    fn arm_idle_timer(&self, slot: &mut Slot) {
        slot.cancel_timer();
        slot.generation += 1;

        let generation = slot.generation;
        let timeout = self.idle_timeout;
        let shared: Weak<Mutex<Slot>> = Arc::downgrade(&self.slot);

        slot.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let mut slot = shared.lock().await;
            if slot.generation != generation {
                return;
            }
            slot.timer = None;
            if let Some(device) = slot.device.take() {
                if let Err(e) = device.close().await {
                    tracing::warn!(error = %e, "Failed to close idle hardware transport");
                }
                tracing::info!("Closed idle hardware transport");
            }
        }));
    }
}

impl std::fmt::Debug for HardwareSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareSession")
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}
