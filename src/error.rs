//! Error types for the wallet layer

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Transport, provider or chain endpoint could not be reached
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The human declined (closed a pairing prompt, rejected a request)
    #[error("User rejected: {0}")]
    UserRejected(String),

    /// The browser provider refused to expose accounts
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    /// The backend exposes a different account than the one bound to the driver
    #[error("Incorrect account: expected {expected}, backend returned {actual}")]
    IncorrectAccount { expected: String, actual: String },

    #[error("Incorrect network: expected {expected}, provider is on {actual}")]
    IncorrectNetwork { expected: String, actual: String },

    /// Hardware retries exhausted
    #[error("Device communication failed after {attempts} attempts: {last_error}")]
    DeviceCommunicationFailed { attempts: u32, last_error: String },

    #[error("Must connect and verify account first")]
    NotConnected,

    #[error("Invalid wallet type: {0}")]
    InvalidWalletType(String),

    #[error("Missing txFee")]
    MissingFee,

    #[error("Options must not be null: {0}")]
    MissingOptions(String),

    #[error("Account is undefined")]
    AccountUndefined,

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Insufficient funds: need {needed}, available {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    /// The device signed for a different chain than the configured one
    #[error("Chain id mismatch: expected {expected}, signature encodes {actual:?}")]
    ChainIdMismatch { expected: u64, actual: Option<u64> },

    #[error("Signing key does not match the spent outputs: {0}")]
    IncorrectSigningKey(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn backend(err: impl std::fmt::Display) -> Self {
        Error::BackendUnavailable(err.to_string())
    }

    pub(crate) fn invalid(err: impl std::fmt::Display) -> Self {
        Error::InvalidArgument(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
