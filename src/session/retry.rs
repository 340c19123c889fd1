//! Bounded retry for flaky device calls

use crate::config::HardwareConfig;
use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;

/// How many times to try a device call, and how long to wait between tries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &HardwareConfig) -> Self {
        Self::new(config.max_attempts, config.retry_delay())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&HardwareConfig::default())
    }
}

/// Failures a retry cannot fix
fn is_permanent(err: &Error) -> bool {
    matches!(
        err,
        Error::UserRejected(_)
            | Error::IncorrectSigningKey(_)
            | Error::ChainIdMismatch { .. }
            | Error::InvalidArgument(_)
    )
}

/// Run `op` until it succeeds or the policy is exhausted
///
/// `op` receives the 1-based attempt number. Permanent failures are returned
/// immediately; exhaustion yields [`Error::DeviceCommunicationFailed`].
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = String::new();

    for attempt in 1..=policy.max_attempts {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(operation, attempt, "Device call recovered");
                }
                return Ok(value);
            }
            Err(err) if is_permanent(&err) => return Err(err),
            Err(err) => {
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %err,
                    "Device call failed"
                );
                last_error = err.to_string();
                if attempt < policy.max_attempts {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    Err(Error::DeviceCommunicationFailed {
        attempts: policy.max_attempts,
        last_error,
    })
}
