//! Tree operations: copy, move and recursive download.
//!
//! Directories are walked with an explicit work stack of
//! `(source, destination)` pairs. Children are pushed in reverse so they pop
//! in listing order, and a directory is created before any of its children
//! are visited. The walk stops at the first failing entry; nothing already
//! transferred is rolled back.

use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::download::download_stated;
use super::{
    BlockPlan, ProgressTracker, TransferContext, TransferError, read_ready_block,
};
use crate::record::TransferKind;
use crate::remote::{FileAddress, RemoteFile, WriteCommit};

/// Copies `src` to `dest`, recursing into directories.
///
/// Same-node copies are a single remote call tracked by one record.
/// Cross-node copies move every file block by block, one record per file.
///
/// # Errors
///
/// Returns the first [`TransferError`]; the walk stops there.
#[instrument(skip(ctx, cancel), fields(src = %src, dest = %dest))]
pub async fn copy_tree(
    ctx: &TransferContext,
    src: &FileAddress,
    dest: &FileAddress,
    cancel: &CancellationToken,
) -> Result<(), TransferError> {
    if src.same_node(dest) {
        return copy_same_node(ctx, src, dest).await;
    }

    let mut stack = vec![(src.clone(), dest.clone())];
    while let Some((src, dest)) = stack.pop() {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let stat = ctx.remote.stat(&src, true).await?;
        if stat.is_dir() {
            ctx.remote.mkdir(&dest, stat.modified_at).await?;
            let children = ctx.remote.list(&src).await?;
            debug!(dir = %src, children = children.len(), "copying directory");
            push_children(&mut stack, &children, |name| (src.join(name), dest.join(name)));
        } else {
            copy_file_blocks(ctx, &src, &dest, &stat, cancel).await?;
        }
    }
    Ok(())
}

/// Copies `src` to `dest`, then removes `src` recursively.
///
/// If the copy fails the source is untouched. If the removal fails the
/// copy stays in place and the removal error is returned.
///
/// # Errors
///
/// Returns the copy's [`TransferError`] or the removal's remote error.
#[instrument(skip(ctx, cancel), fields(src = %src, dest = %dest))]
pub async fn move_tree(
    ctx: &TransferContext,
    src: &FileAddress,
    dest: &FileAddress,
    cancel: &CancellationToken,
) -> Result<(), TransferError> {
    copy_tree(ctx, src, dest, cancel).await?;
    ctx.remote.remove(src, true).await?;
    info!("move complete");
    Ok(())
}

/// Downloads `src` into `output`, recreating directories locally.
///
/// Every file gets its own download record.
///
/// # Errors
///
/// Returns the first [`TransferError`]; the walk stops there.
#[instrument(skip(ctx, cancel), fields(src = %src, output = %output.display()))]
pub async fn download_tree(
    ctx: &TransferContext,
    src: &FileAddress,
    output: &Path,
    threads: usize,
    cancel: &CancellationToken,
) -> Result<(), TransferError> {
    let mut stack: Vec<(FileAddress, PathBuf)> = vec![(src.clone(), output.to_path_buf())];
    while let Some((src, output)) = stack.pop() {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let stat = ctx.remote.stat(&src, false).await?;
        if stat.is_dir() {
            tokio::fs::create_dir_all(&output)
                .await
                .map_err(|e| TransferError::io(&output, e))?;
            let children = ctx.remote.list(&src).await?;
            for child in children.iter().rev() {
                let local = local_child(&output, &child.name)?;
                stack.push((src.join(&child.name), local));
            }
        } else {
            download_stated(ctx, &src, &stat, &output, threads, cancel).await?;
        }
    }
    Ok(())
}

/// Local path of the remote child `name` under `dir`.
///
/// `name` must be exactly one normal path segment.
fn local_child(dir: &Path, name: &str) -> Result<PathBuf, TransferError> {
    let mut components = Path::new(name).components();
    let single_segment = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(segment)), None) if segment == name
    );
    if !single_segment || name.contains(['/', '\\']) {
        return Err(TransferError::UnsafeEntryName {
            name: name.to_string(),
        });
    }
    Ok(dir.join(name))
}

fn push_children<T>(stack: &mut Vec<T>, children: &[RemoteFile], pair: impl Fn(&str) -> T) {
    stack.extend(children.iter().rev().map(|child| pair(&child.name)));
}

async fn copy_same_node(
    ctx: &TransferContext,
    src: &FileAddress,
    dest: &FileAddress,
) -> Result<(), TransferError> {
    let tracker = ProgressTracker::start(ctx.records.clone(), TransferKind::Copy, src, None).await?;
    if let Err(e) = ctx.remote.copy(src, dest).await {
        let e = TransferError::from(e);
        tracker.fail(&e).await;
        return Err(e);
    }
    tracker.complete().await?;
    info!(record_id = tracker.id(), "same-node copy complete");
    Ok(())
}

async fn copy_file_blocks(
    ctx: &TransferContext,
    src: &FileAddress,
    dest: &FileAddress,
    stat: &RemoteFile,
    cancel: &CancellationToken,
) -> Result<(), TransferError> {
    let location = ctx.remote.resolve_location(src).await?;
    let plan = BlockPlan::new(stat.size, location.block_size).ok_or_else(|| {
        TransferError::InvalidBlockSize {
            address: src.to_string(),
            block_size: location.block_size,
        }
    })?;

    let tracker = ProgressTracker::start(ctx.records.clone(), TransferKind::Copy, src, None).await?;
    match relay_blocks(ctx, &tracker, src, dest, stat, plan, cancel).await {
        Ok(()) => {
            info!(record_id = tracker.id(), bytes = stat.size, "copy complete");
            Ok(())
        }
        Err(e) => {
            tracker.fail(&e).await;
            Err(e)
        }
    }
}

async fn relay_blocks(
    ctx: &TransferContext,
    tracker: &ProgressTracker,
    src: &FileAddress,
    dest: &FileAddress,
    stat: &RemoteFile,
    plan: BlockPlan,
    cancel: &CancellationToken,
) -> Result<(), TransferError> {
    let hash = stat.hash.clone().unwrap_or_default();
    for index in 0..=plan.last_index() {
        let url = read_ready_block(ctx.remote.as_ref(), src, index, ctx.retry, cancel).await?;
        let offset = index * plan.block_size();
        ctx.remote
            .commit_write_block(dest, &WriteCommit::copied(&hash, index, offset, url))
            .await?;

        if index == plan.last_index() {
            ctx.remote
                .change_times(dest, Utc::now(), stat.modified_at)
                .await?;
        }
        tracker.advance(&plan, index).await?;
    }
    Ok(())
}
