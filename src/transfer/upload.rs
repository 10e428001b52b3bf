//! Sequential block upload.
//!
//! One outstanding remote call at a time: for each block, ask for a PUT
//! target, read the block's bytes, PUT them, then confirm the write. Any
//! failure aborts the upload and fails its record. Uploads are not retried.

use std::io::{Read, SeekFrom};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::{BlockDescriptor, BlockPlan, ProgressTracker, TransferContext, TransferError};
use crate::remote::{FileAddress, WriteCommit};

/// Lowercase hex SHA-256 of a local file.
///
/// # Errors
///
/// Returns [`TransferError::Io`] if the file cannot be read.
pub async fn file_content_hash(path: &Path) -> Result<String, TransferError> {
    let owned: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || hash_file_blocking(&owned))
        .await
        .map_err(|e| TransferError::Task(e.to_string()))?
}

fn hash_file_blocking(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path).map_err(|e| TransferError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| TransferError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Uploads `local` to `dest`, reporting through `tracker`.
///
/// The record is marked failed on any error.
///
/// # Errors
///
/// Returns the first [`TransferError`] hit; the upload stops there.
#[instrument(skip(ctx, tracker, cancel), fields(record_id = tracker.id(), dest = %dest))]
pub async fn upload_file(
    ctx: &TransferContext,
    tracker: &ProgressTracker,
    local: &Path,
    dest: &FileAddress,
    cancel: &CancellationToken,
) -> Result<(), TransferError> {
    match push_blocks(ctx, tracker, local, dest, cancel).await {
        Ok(()) => {
            info!(path = %local.display(), "upload complete");
            Ok(())
        }
        Err(e) => {
            tracker.fail(&e).await;
            Err(e)
        }
    }
}

async fn push_blocks(
    ctx: &TransferContext,
    tracker: &ProgressTracker,
    local: &Path,
    dest: &FileAddress,
    cancel: &CancellationToken,
) -> Result<(), TransferError> {
    let location = ctx.remote.resolve_location(dest).await?;

    let mut file = tokio::fs::File::open(local)
        .await
        .map_err(|e| TransferError::io(local, e))?;
    let file_size = file
        .metadata()
        .await
        .map_err(|e| TransferError::io(local, e))?
        .len();
    let hash = file_content_hash(local).await?;

    let plan = BlockPlan::new(file_size, location.block_size).ok_or_else(|| {
        TransferError::InvalidBlockSize {
            address: dest.to_string(),
            block_size: location.block_size,
        }
    })?;
    debug!(file_size, blocks = plan.block_count(), %hash, "upload planned");

    for block in plan.blocks() {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let target = ctx
            .remote
            .request_upload_target(dest, &hash, block.index, block.length)
            .await?;
        let payload = read_block(&mut file, local, &block).await?;
        ctx.blobs.put(&target.url, payload).await?;
        ctx.remote
            .commit_write_block(dest, &WriteCommit::uploaded(&hash, block.index))
            .await?;

        tracker.advance(&plan, block.index).await?;
    }

    Ok(())
}

async fn read_block(
    file: &mut tokio::fs::File,
    path: &Path,
    block: &BlockDescriptor,
) -> Result<Vec<u8>, TransferError> {
    let length = usize::try_from(block.length).map_err(|_| {
        TransferError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "block too large for memory"),
        )
    })?;
    let mut buffer = vec![0u8; length];
    file.seek(SeekFrom::Start(block.offset))
        .await
        .map_err(|e| TransferError::io(path, e))?;
    file.read_exact(&mut buffer)
        .await
        .map_err(|e| TransferError::io(path, e))?;
    Ok(buffer)
}
