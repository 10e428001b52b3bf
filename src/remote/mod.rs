//! Boundary to the remote block-addressed file store.
//!
//! The transfer engine never talks to the network directly for metadata: it
//! consumes the [`RemoteStore`] trait. [`HttpRemoteStore`] is the production
//! implementation (JSON unary RPC over HTTP); tests plug in fakes.
//!
//! Block payloads themselves do not go through this trait. `read_block` and
//! `request_upload_target` hand back URLs that the
//! [`BlobClient`](crate::transfer::BlobClient) GETs or PUTs.

mod error;
mod http;
mod types;

pub use error::{CODE_NOT_FOUND, CODE_PERMISSION_DENIED, RemoteError};
pub use http::{DEFAULT_RPC_PACKAGE, HttpRemoteStore};
pub use types::{
    BlockRead, BlockStatus, FileAddress, FileKind, Location, RemoteFile, UploadTarget, WriteCommit,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Operations the engine needs from the remote store.
///
/// Implementations must be safe to share between tasks; the engine holds one
/// `Arc<dyn RemoteStore>` for the whole process.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Stats one entry, optionally asking the store to compute its content hash.
    async fn stat(&self, address: &FileAddress, with_hash: bool)
    -> Result<RemoteFile, RemoteError>;

    /// Lists the direct children of a directory.
    async fn list(&self, address: &FileAddress) -> Result<Vec<RemoteFile>, RemoteError>;

    /// Creates a directory, optionally stamping its modification time.
    async fn mkdir(
        &self,
        address: &FileAddress,
        mtime: Option<DateTime<Utc>>,
    ) -> Result<(), RemoteError>;

    /// Removes an entry.
    async fn remove(&self, address: &FileAddress, recursive: bool) -> Result<(), RemoteError>;

    /// Renames/moves an entry within the store.
    async fn rename(&self, src: &FileAddress, dest: &FileAddress) -> Result<(), RemoteError>;

    /// Copies an entry on the same node without block plumbing.
    async fn copy(&self, src: &FileAddress, dest: &FileAddress) -> Result<(), RemoteError>;

    /// Sets access and modification times.
    async fn change_times(
        &self,
        address: &FileAddress,
        atime: DateTime<Utc>,
        mtime: Option<DateTime<Utc>>,
    ) -> Result<(), RemoteError>;

    /// Requests block `index` of a file; may report the block as pending.
    async fn read_block(&self, address: &FileAddress, index: u64)
    -> Result<BlockRead, RemoteError>;

    /// Requests a PUT target for block `index` of an upload.
    async fn request_upload_target(
        &self,
        address: &FileAddress,
        hash: &str,
        index: u64,
        size: u64,
    ) -> Result<UploadTarget, RemoteError>;

    /// Confirms a block write.
    async fn commit_write_block(
        &self,
        address: &FileAddress,
        commit: &WriteCommit,
    ) -> Result<(), RemoteError>;

    /// Resolves the location (block size, network) an address lives in.
    async fn resolve_location(&self, address: &FileAddress) -> Result<Location, RemoteError>;

    /// Returns a streaming playback URL for a media file.
    async fn streaming_url(&self, address: &FileAddress) -> Result<String, RemoteError>;
}
