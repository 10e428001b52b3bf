//! Parallel block download with ordered reassembly.
//!
//! A producer feeds block indices into a bounded MPMC queue; `threads`
//! workers pull from it, wait out pending blocks, GET the payloads and send
//! `(index, result)` to a single consumer. The consumer parks early arrivals
//! in a pre-sized arena and writes the longest contiguous run starting at the
//! next expected index, so the output file only ever grows in block order and
//! has exactly one writer.

use std::io::SeekFrom;
use std::path::Path;

use bytes::Bytes;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::{
    BlockPlan, ProgressTracker, TransferContext, TransferError, read_ready_block,
};
use crate::constants::MAX_DOWNLOAD_THREADS;
use crate::record::TransferKind;
use crate::remote::{FileAddress, RemoteFile};

type BlockResult = (u64, Result<Bytes, TransferError>);

/// Downloads one remote file into `output` using `threads` workers.
///
/// The record is created once the source has been stat'ed and its location
/// resolved; from then on any failure marks it failed.
///
/// # Errors
///
/// Returns the first [`TransferError`]; remaining workers are stopped.
pub async fn download_file(
    ctx: &TransferContext,
    source: &FileAddress,
    output: &Path,
    threads: usize,
    cancel: &CancellationToken,
) -> Result<(), TransferError> {
    let stat = ctx.remote.stat(source, false).await?;
    download_stated(ctx, source, &stat, output, threads, cancel).await
}

/// Same as [`download_file`] for a source that was already stat'ed.
#[instrument(skip(ctx, stat, cancel), fields(source = %source, output = %output.display()))]
pub(crate) async fn download_stated(
    ctx: &TransferContext,
    source: &FileAddress,
    stat: &RemoteFile,
    output: &Path,
    threads: usize,
    cancel: &CancellationToken,
) -> Result<(), TransferError> {
    let location = ctx.remote.resolve_location(source).await?;
    let plan = BlockPlan::new(stat.size, location.block_size).ok_or_else(|| {
        TransferError::InvalidBlockSize {
            address: source.to_string(),
            block_size: location.block_size,
        }
    })?;

    let tracker = ProgressTracker::start(
        ctx.records.clone(),
        TransferKind::Download,
        source,
        Some(output),
    )
    .await?;

    match fetch_blocks(ctx, &tracker, source, output, plan, threads, cancel).await {
        Ok(()) => {
            info!(record_id = tracker.id(), bytes = plan.file_size(), "download complete");
            Ok(())
        }
        Err(e) => {
            tracker.fail(&e).await;
            Err(e)
        }
    }
}

async fn fetch_blocks(
    ctx: &TransferContext,
    tracker: &ProgressTracker,
    source: &FileAddress,
    output: &Path,
    plan: BlockPlan,
    threads: usize,
    cancel: &CancellationToken,
) -> Result<(), TransferError> {
    let threads = threads.clamp(1, MAX_DOWNLOAD_THREADS);
    let last_index = plan.last_index();
    let slots = usize::try_from(plan.block_count()).map_err(|_| {
        TransferError::InvalidBlockSize {
            address: source.to_string(),
            block_size: plan.block_size(),
        }
    })?;

    let mut file = tokio::fs::File::create(output)
        .await
        .map_err(|e| TransferError::io(output, e))?;

    // Local to this file: stopping the workers must not cancel the caller.
    let stop = cancel.child_token();
    let _stop_on_exit = stop.clone().drop_guard();

    let (index_tx, index_rx) = flume::bounded::<u64>(threads * 2);
    let (result_tx, mut result_rx) = mpsc::channel::<BlockResult>(threads * 2);
    let mut tasks = JoinSet::new();

    let producer_stop = stop.clone();
    tasks.spawn(async move {
        for index in 0..=last_index {
            tokio::select! {
                () = producer_stop.cancelled() => break,
                sent = index_tx.send_async(index) => if sent.is_err() { break },
            }
        }
    });

    for worker in 0..threads {
        let ctx = ctx.clone();
        let source = source.clone();
        let index_rx = index_rx.clone();
        let result_tx = result_tx.clone();
        let stop = stop.clone();
        tasks.spawn(async move {
            while let Ok(index) = index_rx.recv_async().await {
                if stop.is_cancelled() {
                    break;
                }
                debug!(worker, index, "fetching block");
                let result = fetch_block(&ctx, &source, index, &stop).await;
                let failed = result.is_err();
                if result_tx.send((index, result)).await.is_err() || failed {
                    break;
                }
            }
        });
    }
    drop(index_rx);
    drop(result_tx);

    let mut arena: Vec<Option<Bytes>> = vec![None; slots];
    let mut next: u64 = 0;

    while next <= last_index {
        let received = tokio::select! {
            () = cancel.cancelled() => return Err(TransferError::Cancelled),
            received = result_rx.recv() => received,
        };
        let Some((index, result)) = received else {
            return Err(TransferError::Task(
                "download workers stopped before all blocks arrived".to_string(),
            ));
        };

        let payload = result?;
        if let Some(slot) = usize::try_from(index).ok().and_then(|i| arena.get_mut(i)) {
            *slot = Some(payload);
        }

        while let Some(payload) = usize::try_from(next)
            .ok()
            .and_then(|i| arena.get_mut(i))
            .and_then(Option::take)
        {
            write_block(&mut file, output, &plan, next, &payload).await?;
            if next == last_index {
                // The record must not read success before the file is final.
                file.flush().await.map_err(|e| TransferError::io(output, e))?;
                file.set_len(plan.file_size())
                    .await
                    .map_err(|e| TransferError::io(output, e))?;
            }
            tracker.advance(&plan, next).await?;
            next += 1;
        }
    }

    stop.cancel();
    while tasks.join_next().await.is_some() {}
    Ok(())
}

async fn fetch_block(
    ctx: &TransferContext,
    source: &FileAddress,
    index: u64,
    stop: &CancellationToken,
) -> Result<Bytes, TransferError> {
    let url = read_ready_block(ctx.remote.as_ref(), source, index, ctx.retry, stop).await?;
    ctx.blobs
        .get(&url)
        .await
        .map_err(|e| TransferError::block_read(index, e.into()))
}

/// Writes one block at its planned offset, clipped to its planned length.
///
/// A payload shorter than the planned length fails the block.
async fn write_block(
    file: &mut tokio::fs::File,
    output: &Path,
    plan: &BlockPlan,
    index: u64,
    payload: &Bytes,
) -> Result<(), TransferError> {
    let Some(block) = plan.block(index) else {
        return Ok(());
    };
    let received = u64::try_from(payload.len()).unwrap_or(u64::MAX);
    if received < block.length {
        return Err(TransferError::block_read(
            index,
            TransferError::ShortBlock {
                expected: block.length,
                actual: received,
            },
        ));
    }
    let length = usize::try_from(block.length).unwrap_or(usize::MAX);

    file.seek(SeekFrom::Start(block.offset))
        .await
        .map_err(|e| TransferError::io(output, e))?;
    file.write_all(&payload[..length])
        .await
        .map_err(|e| TransferError::io(output, e))?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_block_clips_to_planned_length() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.bin");
        let mut file = tokio::fs::File::create(&output).await.unwrap();
        let plan = BlockPlan::new(6, 4).unwrap();

        write_block(&mut file, &output, &plan, 0, &Bytes::from_static(b"abcdXX"))
            .await
            .unwrap();
        write_block(&mut file, &output, &plan, 1, &Bytes::from_static(b"efgh"))
            .await
            .unwrap();
        file.flush().await.unwrap();
        drop(file);

        assert_eq!(std::fs::read(&output).unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn test_write_block_degenerate_last_rewrites_final_byte() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.bin");
        let mut file = tokio::fs::File::create(&output).await.unwrap();
        let plan = BlockPlan::new(4, 2).unwrap();

        for (index, payload) in [(0, &b"ab"[..]), (1, &b"cd"[..]), (2, &b"d"[..])] {
            write_block(&mut file, &output, &plan, index, &Bytes::copy_from_slice(payload))
                .await
                .unwrap();
        }
        file.flush().await.unwrap();
        drop(file);

        assert_eq!(std::fs::read(&output).unwrap(), b"abcd");
    }

    #[tokio::test]
    async fn test_write_block_rejects_short_payload() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.bin");
        let mut file = tokio::fs::File::create(&output).await.unwrap();
        let plan = BlockPlan::new(10, 4).unwrap();

        let err = write_block(&mut file, &output, &plan, 1, &Bytes::from_static(b"45"))
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::BlockRead { index: 1, .. }));
        assert!(err.to_string().contains("expected 4"));
    }
}
