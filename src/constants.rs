//! Shared defaults for timeouts, retry budget and download parallelism.

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large blocks).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// How many times a pending block is requested before giving up.
pub const DEFAULT_PENDING_RETRY_ATTEMPTS: u32 = 20;

/// Fixed pause between two requests for a pending block.
pub const DEFAULT_PENDING_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Download worker count when the user has not chosen one.
pub const DEFAULT_DOWNLOAD_THREADS: usize = 1;

/// Upper bound on download workers per file.
pub const MAX_DOWNLOAD_THREADS: usize = 64;
