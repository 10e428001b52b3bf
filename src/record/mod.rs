//! Durable transfer records.
//!
//! Every file-level upload, download or copy owns exactly one row in the
//! `transfer_records` table. The row is the only completion signal a caller
//! gets: transfers run in the background and callers poll [`TransferStore`].
//!
//! # Overview
//!
//! - [`TransferStore`] - SQLite-backed create/update/query/delete
//! - [`TransferRecord`] - one row
//! - [`TransferKind`] / [`TransferStatus`] - row classification
//! - [`TransferRepository`] - seam used by the progress tracker
//!
//! # Example
//!
//! ```no_run
//! use blockdrive_core::{Database, FileAddress, TransferKind, TransferStatus, TransferStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = TransferStore::new(Database::new_in_memory().await?);
//! let address = FileAddress::new("node-a", "photos", "/img.jpg");
//! let id = store.create(TransferKind::Upload, &address, None).await?;
//! store.update_progress(id, 50, TransferStatus::Active).await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod item;
mod repository;

pub use error::RecordError;
pub use item::{TransferKind, TransferRecord, TransferStatus};
pub use repository::TransferRepository;

use std::path::Path;

use sqlx::Row;
use tracing::instrument;

use crate::db::Database;
use crate::remote::FileAddress;

/// Result type for record operations.
pub type Result<T> = std::result::Result<T, RecordError>;

/// Upper bound of the `progress` column.
pub const MAX_PROGRESS: u8 = 100;

/// SQLite-backed transfer record table.
#[derive(Debug, Clone)]
pub struct TransferStore {
    db: Database,
}

impl TransferStore {
    /// Creates a store over an opened database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Inserts an `active` record with progress 0 and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Database`] if the insert fails.
    #[instrument(skip(self, address, local_path), fields(kind = %kind, path = %address.path))]
    pub async fn create(
        &self,
        kind: TransferKind,
        address: &FileAddress,
        local_path: Option<&Path>,
    ) -> Result<i64> {
        let local_path = local_path.map(|p| p.to_string_lossy().into_owned());
        let row = sqlx::query(
            r"INSERT INTO transfer_records (kind, node_id, location, path, local_path, status, progress)
              VALUES (?, ?, ?, ?, ?, ?, 0)
              RETURNING id",
        )
        .bind(kind.as_str())
        .bind(&address.node_id)
        .bind(&address.location)
        .bind(&address.path)
        .bind(local_path)
        .bind(TransferStatus::Active.as_str())
        .fetch_one(self.db.pool())
        .await?;

        Ok(row.get("id"))
    }

    /// Fetches one record by id.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get(&self, id: i64) -> Result<Option<TransferRecord>> {
        let record =
            sqlx::query_as::<_, TransferRecord>("SELECT * FROM transfer_records WHERE id = ?")
                .bind(id)
                .fetch_optional(self.db.pool())
                .await?;
        Ok(record)
    }

    /// Sets progress and status on an active record.
    ///
    /// The stored progress never decreases, and rows that already reached
    /// `success` or `failed` are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::NotFound`] for an unknown id,
    /// [`RecordError::NotActive`] for a frozen record,
    /// or [`RecordError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn update_progress(
        &self,
        id: i64,
        progress: u8,
        status: TransferStatus,
    ) -> Result<()> {
        let progress = i64::from(progress.min(MAX_PROGRESS));
        let result = sqlx::query(
            r"UPDATE transfer_records
              SET progress = MAX(progress, ?), status = ?, updated_at = datetime('now')
              WHERE id = ? AND status = ?",
        )
        .bind(progress)
        .bind(status.as_str())
        .bind(id)
        .bind(TransferStatus::Active.as_str())
        .execute(self.db.pool())
        .await?;

        self.check_active_update(id, result.rows_affected()).await
    }

    /// Marks an active record `failed`, freezing its progress.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::NotFound`] for an unknown id,
    /// [`RecordError::NotActive`] for a frozen record,
    /// or [`RecordError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn mark_failed(&self, id: i64) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE transfer_records
              SET status = ?, updated_at = datetime('now')
              WHERE id = ? AND status = ?",
        )
        .bind(TransferStatus::Failed.as_str())
        .bind(id)
        .bind(TransferStatus::Active.as_str())
        .execute(self.db.pool())
        .await?;

        self.check_active_update(id, result.rows_affected()).await
    }

    /// Lists records of one kind, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn list(&self, kind: TransferKind) -> Result<Vec<TransferRecord>> {
        let records = sqlx::query_as::<_, TransferRecord>(
            "SELECT * FROM transfer_records WHERE kind = ? ORDER BY id DESC",
        )
        .bind(kind.as_str())
        .fetch_all(self.db.pool())
        .await?;
        Ok(records)
    }

    /// Deletes one record.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::NotFound`] if no record has this id.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM transfer_records WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(RecordError::NotFound(id));
        }
        Ok(())
    }

    /// Deletes every record of one kind and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Database`] if the delete fails.
    #[instrument(skip(self))]
    pub async fn delete_all(&self, kind: TransferKind) -> Result<u64> {
        let result = sqlx::query("DELETE FROM transfer_records WHERE kind = ?")
            .bind(kind.as_str())
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected())
    }

    async fn check_active_update(&self, id: i64, rows_affected: u64) -> Result<()> {
        if rows_affected > 0 {
            return Ok(());
        }
        match self.get(id).await? {
            Some(_) => Err(RecordError::NotActive(id)),
            None => Err(RecordError::NotFound(id)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn store() -> TransferStore {
        TransferStore::new(Database::new_in_memory().await.unwrap())
    }

    fn address(path: &str) -> FileAddress {
        FileAddress::new("node-a", "docs", path)
    }

    #[tokio::test]
    async fn test_create_starts_active_at_zero() {
        let store = store().await;
        let id = store
            .create(TransferKind::Upload, &address("/a.txt"), None)
            .await
            .unwrap();

        let record = store.get(id).await.unwrap().unwrap();
        assert_eq!(record.kind(), TransferKind::Upload);
        assert_eq!(record.status(), TransferStatus::Active);
        assert_eq!(record.progress, 0);
        assert!(record.local_path.is_none());
    }

    #[tokio::test]
    async fn test_create_download_keeps_local_path() {
        let store = store().await;
        let id = store
            .create(
                TransferKind::Download,
                &address("/a.txt"),
                Some(Path::new("/tmp/out/a.txt")),
            )
            .await
            .unwrap();

        let record = store.get(id).await.unwrap().unwrap();
        assert_eq!(record.local_path.as_deref(), Some("/tmp/out/a.txt"));
    }

    #[tokio::test]
    async fn test_update_progress_never_decreases() {
        let store = store().await;
        let id = store
            .create(TransferKind::Copy, &address("/a"), None)
            .await
            .unwrap();

        store
            .update_progress(id, 60, TransferStatus::Active)
            .await
            .unwrap();
        store
            .update_progress(id, 30, TransferStatus::Active)
            .await
            .unwrap();

        assert_eq!(store.get(id).await.unwrap().unwrap().progress, 60);
    }

    #[tokio::test]
    async fn test_success_freezes_record() {
        let store = store().await;
        let id = store
            .create(TransferKind::Copy, &address("/a"), None)
            .await
            .unwrap();
        store
            .update_progress(id, 100, TransferStatus::Success)
            .await
            .unwrap();

        let err = store.mark_failed(id).await.unwrap_err();
        assert!(matches!(err, RecordError::NotActive(got) if got == id));
        let record = store.get(id).await.unwrap().unwrap();
        assert_eq!(record.status(), TransferStatus::Success);
        assert_eq!(record.progress, 100);
    }

    #[tokio::test]
    async fn test_mark_failed_freezes_progress() {
        let store = store().await;
        let id = store
            .create(TransferKind::Download, &address("/a"), None)
            .await
            .unwrap();
        store
            .update_progress(id, 25, TransferStatus::Active)
            .await
            .unwrap();
        store.mark_failed(id).await.unwrap();

        let err = store
            .update_progress(id, 90, TransferStatus::Active)
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::NotActive(_)));
        assert_eq!(store.get(id).await.unwrap().unwrap().progress, 25);
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_not_found() {
        let store = store().await;
        let err = store
            .update_progress(999, 10, TransferStatus::Active)
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::NotFound(999)));
    }

    #[tokio::test]
    async fn test_progress_is_clamped_to_100() {
        let store = store().await;
        let id = store
            .create(TransferKind::Upload, &address("/a"), None)
            .await
            .unwrap();
        store
            .update_progress(id, 250, TransferStatus::Success)
            .await
            .unwrap();
        assert_eq!(store.get(id).await.unwrap().unwrap().progress, 100);
    }

    #[tokio::test]
    async fn test_list_filters_by_kind_newest_first() {
        let store = store().await;
        let first = store
            .create(TransferKind::Upload, &address("/1"), None)
            .await
            .unwrap();
        store
            .create(TransferKind::Download, &address("/2"), None)
            .await
            .unwrap();
        let third = store
            .create(TransferKind::Upload, &address("/3"), None)
            .await
            .unwrap();

        let uploads = store.list(TransferKind::Upload).await.unwrap();
        let ids: Vec<i64> = uploads.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![third, first]);
    }

    #[tokio::test]
    async fn test_delete_and_delete_all() {
        let store = store().await;
        let a = store
            .create(TransferKind::Copy, &address("/a"), None)
            .await
            .unwrap();
        store
            .create(TransferKind::Copy, &address("/b"), None)
            .await
            .unwrap();
        store
            .create(TransferKind::Upload, &address("/c"), None)
            .await
            .unwrap();

        store.delete(a).await.unwrap();
        assert!(matches!(
            store.delete(a).await.unwrap_err(),
            RecordError::NotFound(_)
        ));

        assert_eq!(store.delete_all(TransferKind::Copy).await.unwrap(), 1);
        assert!(store.list(TransferKind::Copy).await.unwrap().is_empty());
        assert_eq!(store.list(TransferKind::Upload).await.unwrap().len(), 1);
    }
}
