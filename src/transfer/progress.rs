//! Per-transfer progress reporting.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{BlockPlan, TransferError};
use crate::record::{MAX_PROGRESS, TransferKind, TransferRepository, TransferStatus};
use crate::remote::FileAddress;

/// Owner of one transfer record for the duration of a file-level transfer.
///
/// Created when the transfer begins; the only writer of its record.
pub struct ProgressTracker {
    repo: Arc<dyn TransferRepository>,
    id: i64,
}

impl ProgressTracker {
    /// Creates an `active` record at 0 % and returns its tracker.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Record`] if the record cannot be inserted.
    pub async fn start(
        repo: Arc<dyn TransferRepository>,
        kind: TransferKind,
        address: &FileAddress,
        local_path: Option<&Path>,
    ) -> Result<Self, TransferError> {
        let id = repo.create(kind, address, local_path).await?;
        debug!(record_id = id, %kind, "transfer record created");
        Ok(Self { repo, id })
    }

    /// Attaches to a record that was created up front.
    #[must_use]
    pub fn attach(repo: Arc<dyn TransferRepository>, id: i64) -> Self {
        Self { repo, id }
    }

    /// Record id.
    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Reports block `index` as committed.
    ///
    /// The final index flips the record to `success`.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Record`] if the update fails.
    pub async fn advance(&self, plan: &BlockPlan, index: u64) -> Result<(), TransferError> {
        let status = if index >= plan.last_index() {
            TransferStatus::Success
        } else {
            TransferStatus::Active
        };
        let progress = plan.progress_after(index);
        debug!(record_id = self.id, index, progress, "block committed");
        self.repo.update_progress(self.id, progress, status).await?;
        Ok(())
    }

    /// Marks the record `success` at 100 % without block accounting.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Record`] if the update fails.
    pub async fn complete(&self) -> Result<(), TransferError> {
        self.repo
            .update_progress(self.id, MAX_PROGRESS, TransferStatus::Success)
            .await?;
        Ok(())
    }

    /// Marks the record `failed`, freezing its progress.
    ///
    /// Best effort: a failure to write the status is logged, the original
    /// error still wins.
    pub async fn fail(&self, error: &TransferError) {
        debug!(record_id = self.id, error = %error, "marking transfer failed");
        if let Err(e) = self.repo.mark_failed(self.id).await {
            warn!(record_id = self.id, error = %e, "could not mark transfer failed");
        }
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker").field("id", &self.id).finish_non_exhaustive()
    }
}
