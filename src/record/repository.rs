//! Repository seam between the transfer pipeline and record persistence.
//!
//! The progress tracker depends on this trait rather than on
//! [`TransferStore`] directly, so the pipeline can be driven against any
//! store that offers atomic update-by-id.

use std::path::Path;

use async_trait::async_trait;

use super::{Result, TransferKind, TransferRecord, TransferStatus, TransferStore};
use crate::remote::FileAddress;

/// Data-access contract used by a single in-flight transfer.
#[async_trait]
pub trait TransferRepository: Send + Sync {
    /// Creates an active record at 0 % and returns its id.
    async fn create(
        &self,
        kind: TransferKind,
        address: &FileAddress,
        local_path: Option<&Path>,
    ) -> Result<i64>;

    /// Writes progress/status for an active record.
    async fn update_progress(&self, id: i64, progress: u8, status: TransferStatus) -> Result<()>;

    /// Marks an active record failed.
    async fn mark_failed(&self, id: i64) -> Result<()>;

    /// Reads one record back.
    async fn get(&self, id: i64) -> Result<Option<TransferRecord>>;
}

#[async_trait]
impl TransferRepository for TransferStore {
    async fn create(
        &self,
        kind: TransferKind,
        address: &FileAddress,
        local_path: Option<&Path>,
    ) -> Result<i64> {
        TransferStore::create(self, kind, address, local_path).await
    }

    async fn update_progress(&self, id: i64, progress: u8, status: TransferStatus) -> Result<()> {
        TransferStore::update_progress(self, id, progress, status).await
    }

    async fn mark_failed(&self, id: i64) -> Result<()> {
        TransferStore::mark_failed(self, id).await
    }

    async fn get(&self, id: i64) -> Result<Option<TransferRecord>> {
        TransferStore::get(self, id).await
    }
}
