//! Error types for the transfer pipeline.

use std::path::PathBuf;

use thiserror::Error;

use super::BlobError;
use crate::record::RecordError;
use crate::remote::RemoteError;

/// Errors that abort a file-level transfer.
///
/// The only transient condition (a pending block) is retried inside
/// [`read_ready_block`](super::read_ready_block); anything that reaches a
/// caller as `TransferError` has already failed the transfer record.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The remote store rejected a call.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A block payload GET or PUT failed.
    #[error(transparent)]
    Blob(#[from] BlobError),

    /// Local file system error.
    #[error("IO error on {path}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The transfer record could not be written.
    #[error("failed to update transfer record: {0}")]
    Record(#[from] RecordError),

    /// A block stayed pending for the whole retry budget.
    #[error("block {index} is still pending after retries")]
    BlockPending {
        /// Block index.
        index: u64,
        /// How many reads were attempted.
        attempts: u32,
    },

    /// Reading one block failed for a reason other than pending.
    #[error("failed to read block {index}: {source}")]
    BlockRead {
        /// Block index.
        index: u64,
        /// Why the read failed.
        #[source]
        source: Box<TransferError>,
    },

    /// The location reported an unusable block size.
    #[error("invalid block size {block_size} for {address}")]
    InvalidBlockSize {
        /// Address whose location was resolved.
        address: String,
        /// Reported size.
        block_size: u64,
    },

    /// A block payload was shorter than its planned length.
    #[error("block body has {actual} bytes, expected {expected}")]
    ShortBlock {
        /// Planned block length.
        expected: u64,
        /// Bytes actually received.
        actual: u64,
    },

    /// A remote listing returned a name that is not a single path segment.
    #[error("refusing remote entry name {name:?}")]
    UnsafeEntryName {
        /// The rejected name.
        name: String,
    },

    /// The source is not something this operation can handle.
    #[error("{path} has no file name")]
    MissingFileName {
        /// Offending path.
        path: String,
    },

    /// The transfer was stopped before completion.
    #[error("transfer cancelled")]
    Cancelled,

    /// A background task ended abnormally.
    #[error("transfer task failed: {0}")]
    Task(String),
}

impl TransferError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wraps a failure of block `index`.
    ///
    /// Pending exhaustion and cancellation pass through unchanged.
    #[must_use]
    pub fn block_read(index: u64, source: TransferError) -> Self {
        match source {
            Self::BlockPending { .. } | Self::Cancelled | Self::BlockRead { .. } => source,
            other => Self::BlockRead {
                index,
                source: Box::new(other),
            },
        }
    }

    /// Whether the transfer stopped because it was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_message_names_block() {
        let err = TransferError::BlockPending {
            index: 7,
            attempts: 20,
        };
        assert_eq!(err.to_string(), "block 7 is still pending after retries");
    }

    #[test]
    fn test_block_read_wraps_remote_errors_once() {
        let remote = RemoteError::rpc("Read", "internal", "disk gone");
        let err = TransferError::block_read(3, TransferError::from(remote));
        assert!(err.to_string().starts_with("failed to read block 3:"));

        let rewrapped = TransferError::block_read(4, err);
        assert!(rewrapped.to_string().starts_with("failed to read block 3:"));
    }

    #[test]
    fn test_block_read_keeps_cancellation() {
        let err = TransferError::block_read(1, TransferError::Cancelled);
        assert!(err.is_cancelled());
    }
}
