//! Pending-block retry.
//!
//! A block read can come back `pending` while the store materializes the
//! backing data. That is the one transient condition in the pipeline: the
//! read is repeated at a fixed interval up to a fixed budget. Every other
//! remote error is fatal on the first occurrence.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use super::TransferError;
use crate::constants::{DEFAULT_PENDING_RETRY_ATTEMPTS, DEFAULT_PENDING_RETRY_DELAY};
use crate::remote::{FileAddress, RemoteError, RemoteStore};

/// Fixed-interval retry budget for pending blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRetryPolicy {
    attempts: u32,
    delay: Duration,
}

impl Default for PendingRetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_PENDING_RETRY_ATTEMPTS,
            delay: DEFAULT_PENDING_RETRY_DELAY,
        }
    }
}

impl PendingRetryPolicy {
    /// Creates a policy; `attempts` is raised to at least 1.
    #[must_use]
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Total number of reads before giving up.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Pause between reads.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// Reads block `index` until it is ready and returns its payload URL.
///
/// Sleeps between pending answers can be interrupted by `cancel`.
///
/// # Errors
///
/// - [`TransferError::BlockPending`] when the budget runs out
/// - [`TransferError::Cancelled`] when `cancel` fires
/// - [`TransferError::BlockRead`] for any remote error or a ready block without URL
#[instrument(level = "debug", skip(remote, policy, cancel), fields(address = %address))]
pub async fn read_ready_block(
    remote: &dyn RemoteStore,
    address: &FileAddress,
    index: u64,
    policy: PendingRetryPolicy,
    cancel: &CancellationToken,
) -> Result<String, TransferError> {
    for attempt in 1..=policy.attempts {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let read = remote
            .read_block(address, index)
            .await
            .map_err(|e| TransferError::block_read(index, e.into()))?;

        if !read.is_pending() {
            return read.url.ok_or_else(|| {
                TransferError::block_read(
                    index,
                    RemoteError::invalid_response("Read", "ready block without url").into(),
                )
            });
        }

        if attempt == policy.attempts {
            break;
        }

        warn!(index, attempt, max = policy.attempts, "block pending, retrying");
        tokio::select! {
            () = cancel.cancelled() => return Err(TransferError::Cancelled),
            () = tokio::time::sleep(policy.delay) => {}
        }
    }

    Err(TransferError::BlockPending {
        index,
        attempts: policy.attempts,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_twenty_by_five_seconds() {
        let policy = PendingRetryPolicy::default();
        assert_eq!(policy.attempts(), 20);
        assert_eq!(policy.delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_policy_needs_at_least_one_attempt() {
        let policy = PendingRetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.attempts(), 1);
    }
}
