//! Blockdrive Core Library
//!
//! Moves files between a local filesystem and a remote, block-addressed file
//! store, and between locations of that store. Files travel in fixed-size
//! blocks; every file-level transfer is tracked by a durable record.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`db`] - Database connection and schema management
//! - [`record`] - Transfer record persistence
//! - [`remote`] - Remote store trait and its HTTP client
//! - [`transfer`] - Block planning, upload, parallel download, tree walks
//! - [`engine`] - Background launch of transfers and passthrough operations
//! - [`preferences`] - Local download preferences

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod constants;
pub mod db;
pub mod engine;
pub mod preferences;
pub mod record;
pub mod remote;
pub mod transfer;

// Re-export commonly used types
pub use constants::{DEFAULT_DOWNLOAD_THREADS, MAX_DOWNLOAD_THREADS};
pub use db::{Database, DatabaseOptions, DbError};
pub use engine::{EngineError, TransferEngine, TransferFailure, TransferHandle, TransferOperation};
pub use preferences::{Preferences, PreferencesError};
pub use record::{RecordError, TransferKind, TransferRecord, TransferStatus, TransferStore};
pub use remote::{
    BlockRead, FileAddress, FileKind, HttpRemoteStore, Location, RemoteError, RemoteFile,
    RemoteStore, UploadTarget, WriteCommit,
};
pub use transfer::{BlobClient, BlockPlan, PendingRetryPolicy, TransferContext, TransferError};
