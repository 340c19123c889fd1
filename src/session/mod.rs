//! Session and transport management
//!
//! Only one USB device and one bridge pairing are addressable at a time, so
//! drivers of the same variant share a single session manager. Managers are
//! cheap to clone (`Arc` inside) and serialize access internally.

pub mod bridge;
pub mod hardware;
pub mod retry;

pub use bridge::{BridgeClient, BridgeClientFactory, BridgeSession, PairingDisplay};
pub use hardware::{DeviceConnector, HardwareSession, LedgerDevice};
pub use retry::{retry, RetryPolicy};
