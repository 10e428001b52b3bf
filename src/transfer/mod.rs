//! Block transfer pipeline.
//!
//! This module moves files between the local filesystem and the remote
//! store, or between two remote locations, one fixed-size block at a time.
//!
//! # Overview
//!
//! - [`BlockPlan`] - block index range and byte ranges of a file
//! - [`upload_file`] - sequential upload
//! - [`download_file`] / [`download_tree`] - parallel download, ordered reassembly
//! - [`copy_tree`] / [`move_tree`] - remote-to-remote transfers
//! - [`ProgressTracker`] - owner of one transfer record
//! - [`read_ready_block`] - pending-block retry
//!
//! Every function takes a [`TransferContext`] holding the shared clients and
//! a [`CancellationToken`](tokio_util::sync::CancellationToken).

mod blob;
mod blocks;
mod download;
mod error;
mod progress;
mod retry;
mod upload;
mod walker;

pub use blob::{BlobClient, BlobError};
pub use blocks::{BlockDescriptor, BlockPlan, progress_percent};
pub use download::download_file;
pub use error::TransferError;
pub use progress::ProgressTracker;
pub use retry::{PendingRetryPolicy, read_ready_block};
pub use upload::{file_content_hash, upload_file};
pub use walker::{copy_tree, download_tree, move_tree};

use std::sync::Arc;

use crate::record::TransferRepository;
use crate::remote::RemoteStore;

/// Shared collaborators of every transfer.
///
/// Cheap to clone; each field is reference-counted or pooled.
#[derive(Clone)]
pub struct TransferContext {
    /// Remote store client.
    pub remote: Arc<dyn RemoteStore>,
    /// Block payload client.
    pub blobs: BlobClient,
    /// Transfer record persistence.
    pub records: Arc<dyn TransferRepository>,
    /// Pending-block retry budget.
    pub retry: PendingRetryPolicy,
}

impl TransferContext {
    /// Bundles the collaborators with the default retry policy.
    #[must_use]
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        blobs: BlobClient,
        records: Arc<dyn TransferRepository>,
    ) -> Self {
        Self {
            remote,
            blobs,
            records,
            retry: PendingRetryPolicy::default(),
        }
    }

    /// Replaces the pending-block retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: PendingRetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl std::fmt::Debug for TransferContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferContext")
            .field("blobs", &self.blobs)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
