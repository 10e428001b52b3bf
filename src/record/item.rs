//! Transfer record types and status definitions.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::remote::FileAddress;

/// Direction of a file-level transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    /// Local file pushed to the remote store.
    Upload,
    /// Remote file fetched to local disk.
    Download,
    /// Remote file copied to another remote address.
    Copy,
}

impl TransferKind {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::Copy => "copy",
        }
    }

    /// Progressive verb shown while a record of this kind is active.
    #[must_use]
    pub fn active_label(&self) -> &'static str {
        match self {
            Self::Upload => "uploading",
            Self::Download => "downloading",
            Self::Copy => "copying",
        }
    }
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TransferKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload" => Ok(Self::Upload),
            "download" => Ok(Self::Download),
            "copy" => Ok(Self::Copy),
            _ => Err(format!("invalid transfer kind: {s}")),
        }
    }
}

/// Lifecycle state of a transfer record.
///
/// There is no pending or cancelled state: a record is created when bytes
/// start moving and ends either `Success` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Blocks are still being moved.
    Active,
    /// Every block was committed.
    Success,
    /// An unrecovered error stopped the transfer.
    Failed,
}

impl TransferStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Whether progress is frozen in this state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TransferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid transfer status: {s}")),
        }
    }
}

/// One row of the `transfer_records` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TransferRecord {
    /// Opaque identifier assigned at creation.
    pub id: i64,
    /// Transfer kind as stored (parsed via `kind()`).
    #[sqlx(rename = "kind")]
    #[serde(rename = "kind")]
    pub kind_str: String,
    /// Remote node hosting the remote-side file.
    pub node_id: String,
    /// Location name on that node.
    pub location: String,
    /// Path inside the location.
    pub path: String,
    /// Local destination, downloads only.
    pub local_path: Option<String>,
    /// Status as stored (parsed via `status()`).
    #[sqlx(rename = "status")]
    #[serde(rename = "status")]
    pub status_str: String,
    /// Percent complete, `0..=100`.
    pub progress: i64,
    /// When the record was created.
    pub created_at: String,
    /// When the record was last updated.
    pub updated_at: String,
}

impl TransferRecord {
    /// Returns the parsed kind.
    ///
    /// The table's CHECK constraint keeps unknown kinds out; `Copy` is
    /// returned if one slips through.
    #[must_use]
    pub fn kind(&self) -> TransferKind {
        self.kind_str.parse().unwrap_or(TransferKind::Copy)
    }

    /// Returns the parsed status, falling back to `Failed` for unknown values.
    #[must_use]
    pub fn status(&self) -> TransferStatus {
        self.status_str.parse().unwrap_or(TransferStatus::Failed)
    }

    /// Remote-side address this record tracks.
    #[must_use]
    pub fn address(&self) -> FileAddress {
        FileAddress::new(&self.node_id, &self.location, &self.path)
    }

    /// Human label: `uploading`/`downloading`/`copying` while active, else the status.
    #[must_use]
    pub fn status_label(&self) -> &'static str {
        match self.status() {
            TransferStatus::Active => self.kind().active_label(),
            other => other.as_str(),
        }
    }
}

impl fmt::Display for TransferRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TransferRecord {{ id: {}, kind: {}, path: {}, status: {}, progress: {} }}",
            self.id,
            self.kind(),
            self.path,
            self.status(),
            self.progress
        )
    }
}
