//! Public facade over the transfer pipeline.
//!
//! [`TransferEngine`] launches every file-level operation as an independent
//! tokio task and hands back a [`TransferHandle`] immediately. Progress and
//! outcome are observed through the record store; failures are additionally
//! broadcast to [`TransferEngine::subscribe_failures`] subscribers.

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::constants::MAX_DOWNLOAD_THREADS;
use crate::record::{RecordError, TransferKind, TransferRecord, TransferStore};
use crate::remote::{FileAddress, RemoteError, RemoteFile, RemoteStore};
use crate::transfer::{
    BlobClient, PendingRetryPolicy, ProgressTracker, TransferContext, TransferError, copy_tree,
    download_tree, move_tree, upload_file,
};

const FAILURE_CHANNEL_CAPACITY: usize = 64;

/// Errors raised synchronously by engine calls.
///
/// Failures of running transfers are not returned here; they land in the
/// transfer record and on the failure channel.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Record store failure.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// Remote store failure.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Download worker count outside `1..=64`.
    #[error("download threads must be between 1 and {max}, got {threads}")]
    InvalidThreads {
        /// Requested count.
        threads: usize,
        /// Upper bound.
        max: usize,
    },

    /// Local upload source without a file name.
    #[error("cannot upload {path}: not a file path")]
    InvalidSource {
        /// The rejected path.
        path: String,
    },
}

/// Which engine operation a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOperation {
    /// Local to remote.
    Upload,
    /// Remote to local.
    Download,
    /// Remote to remote.
    Copy,
    /// Remote to remote, then remove the source.
    Move,
}

impl fmt::Display for TransferOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::Copy => "copy",
            Self::Move => "move",
        })
    }
}

/// A surfaced transfer failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFailure {
    /// Operation that failed.
    pub operation: TransferOperation,
    /// Single human-readable error message.
    pub message: String,
}

/// Handle to a launched operation.
#[derive(Debug)]
pub struct TransferHandle {
    record_id: Option<i64>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TransferHandle {
    /// Record id, when the operation owns exactly one record known up front.
    #[must_use]
    pub fn record_id(&self) -> Option<i64> {
        self.record_id
    }

    /// Stops the operation; its active record ends up `failed`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this operation, usable after the handle is consumed.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Waits for the operation to end, successfully or not.
    pub async fn finished(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "transfer task ended abnormally");
        }
    }
}

/// Entry point for transfers, record queries and remote passthroughs.
#[derive(Clone)]
pub struct TransferEngine {
    ctx: TransferContext,
    store: TransferStore,
    failures: broadcast::Sender<TransferFailure>,
}

impl fmt::Debug for TransferEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferEngine")
            .field("ctx", &self.ctx)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl TransferEngine {
    /// Creates an engine over the given collaborators.
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteStore>, blobs: BlobClient, store: TransferStore) -> Self {
        let records = Arc::new(store.clone());
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        Self {
            ctx: TransferContext::new(remote, blobs, records),
            store,
            failures,
        }
    }

    /// Replaces the pending-block retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: PendingRetryPolicy) -> Self {
        self.ctx = self.ctx.with_retry(retry);
        self
    }

    /// Receives every failure surfaced after this call.
    #[must_use]
    pub fn subscribe_failures(&self) -> broadcast::Receiver<TransferFailure> {
        self.failures.subscribe()
    }

    /// Record store backing this engine.
    #[must_use]
    pub fn store(&self) -> &TransferStore {
        &self.store
    }

    // ==================== Transfers ====================

    /// Uploads `local` into the remote directory `dest_dir`.
    ///
    /// The upload record is created before this returns, so the handle
    /// always carries its id.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidSource`] if `local` has no file name, or
    /// [`EngineError::Record`] if the record cannot be created.
    #[instrument(skip(self), fields(local = %local.display(), dest_dir = %dest_dir))]
    pub async fn start_upload(
        &self,
        local: &Path,
        dest_dir: &FileAddress,
    ) -> Result<TransferHandle, EngineError> {
        let name = local
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| EngineError::InvalidSource {
                path: local.display().to_string(),
            })?;
        let dest = dest_dir.join(name);
        let id = self.store.create(TransferKind::Upload, &dest, None).await?;
        let tracker = ProgressTracker::attach(self.ctx.records.clone(), id);

        let ctx = self.ctx.clone();
        let local = local.to_path_buf();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        Ok(self.launch(TransferOperation::Upload, Some(id), cancel, async move {
            upload_file(&ctx, &tracker, &local, &dest, &token).await
        }))
    }

    /// Downloads a remote file or directory into `output`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidThreads`] if `threads` is outside `1..=64`.
    #[instrument(skip(self), fields(src = %src, output = %output.display()))]
    pub fn start_download(
        &self,
        src: &FileAddress,
        output: &Path,
        threads: usize,
    ) -> Result<TransferHandle, EngineError> {
        validate_threads(threads)?;
        let ctx = self.ctx.clone();
        let src = src.clone();
        let output = output.to_path_buf();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        Ok(self.launch(TransferOperation::Download, None, cancel, async move {
            download_tree(&ctx, &src, &output, threads, &token).await
        }))
    }

    /// Copies a remote entry to another remote address.
    #[must_use]
    #[instrument(skip(self), fields(src = %src, dest = %dest))]
    pub fn start_copy(&self, src: &FileAddress, dest: &FileAddress) -> TransferHandle {
        let ctx = self.ctx.clone();
        let (src, dest) = (src.clone(), dest.clone());
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        self.launch(TransferOperation::Copy, None, cancel, async move {
            copy_tree(&ctx, &src, &dest, &token).await
        })
    }

    /// Copies a remote entry, then removes the source.
    #[must_use]
    #[instrument(skip(self), fields(src = %src, dest = %dest))]
    pub fn start_move(&self, src: &FileAddress, dest: &FileAddress) -> TransferHandle {
        let ctx = self.ctx.clone();
        let (src, dest) = (src.clone(), dest.clone());
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        self.launch(TransferOperation::Move, None, cancel, async move {
            move_tree(&ctx, &src, &dest, &token).await
        })
    }

    fn launch<F>(
        &self,
        operation: TransferOperation,
        record_id: Option<i64>,
        cancel: CancellationToken,
        work: F,
    ) -> TransferHandle
    where
        F: Future<Output = Result<(), TransferError>> + Send + 'static,
    {
        let failures = self.failures.clone();
        let task = tokio::spawn(async move {
            match work.await {
                Ok(()) => info!(%operation, "transfer finished"),
                Err(e) => {
                    error!(%operation, error = %e, "transfer failed");
                    // No subscribers is fine; the record already says failed.
                    let _ = failures.send(TransferFailure {
                        operation,
                        message: e.to_string(),
                    });
                }
            }
        });
        TransferHandle {
            record_id,
            cancel,
            task,
        }
    }

    // ==================== Records ====================

    /// Records of one kind, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Record`] if the query fails.
    pub async fn list_records(&self, kind: TransferKind) -> Result<Vec<TransferRecord>, EngineError> {
        Ok(self.store.list(kind).await?)
    }

    /// One record by id.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Record`] if the query fails.
    pub async fn get_record(&self, id: i64) -> Result<Option<TransferRecord>, EngineError> {
        Ok(self.store.get(id).await?)
    }

    /// Deletes one record.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Record`] for an unknown id or a database failure.
    pub async fn delete_record(&self, id: i64) -> Result<(), EngineError> {
        Ok(self.store.delete(id).await?)
    }

    /// Deletes every record of one kind and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Record`] if the delete fails.
    pub async fn delete_records_by_kind(&self, kind: TransferKind) -> Result<u64, EngineError> {
        Ok(self.store.delete_all(kind).await?)
    }

    // ==================== Remote passthroughs ====================

    /// Lists a remote directory.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Remote`] on any remote failure.
    pub async fn list_dir(&self, address: &FileAddress) -> Result<Vec<RemoteFile>, EngineError> {
        Ok(self.ctx.remote.list(address).await?)
    }

    /// Stats a remote entry.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Remote`] on any remote failure.
    pub async fn stat(&self, address: &FileAddress) -> Result<RemoteFile, EngineError> {
        Ok(self.ctx.remote.stat(address, false).await?)
    }

    /// Creates a remote directory.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Remote`] on any remote failure.
    pub async fn mkdir(&self, address: &FileAddress) -> Result<(), EngineError> {
        Ok(self.ctx.remote.mkdir(address, None).await?)
    }

    /// Removes a remote entry and everything below it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Remote`] on any remote failure.
    pub async fn remove(&self, address: &FileAddress) -> Result<(), EngineError> {
        Ok(self.ctx.remote.remove(address, true).await?)
    }

    /// Renames a remote entry in place.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Remote`] on any remote failure.
    pub async fn rename(&self, src: &FileAddress, dest: &FileAddress) -> Result<(), EngineError> {
        Ok(self.ctx.remote.rename(src, dest).await?)
    }

    /// Streaming playback URL of a media file.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Remote`] on any remote failure.
    pub async fn streaming_url(&self, address: &FileAddress) -> Result<String, EngineError> {
        Ok(self.ctx.remote.streaming_url(address).await?)
    }
}

fn validate_threads(threads: usize) -> Result<(), EngineError> {
    if (1..=MAX_DOWNLOAD_THREADS).contains(&threads) {
        Ok(())
    } else {
        Err(EngineError::InvalidThreads {
            threads,
            max: MAX_DOWNLOAD_THREADS,
        })
    }
}
