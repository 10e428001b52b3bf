//! Subcommand dispatch.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use blockdrive_core::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_PENDING_RETRY_ATTEMPTS, DEFAULT_PENDING_RETRY_DELAY,
    READ_TIMEOUT_SECS,
};
use blockdrive_core::{
    BlobClient, Database, DatabaseOptions, FileAddress, HttpRemoteStore, PendingRetryPolicy,
    Preferences, RemoteFile, TransferEngine, TransferHandle, TransferKind, TransferRecord,
    TransferStatus, TransferStore,
};
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{debug, info, warn};

use crate::app_config::{FileConfig, default_state_dir};
use crate::cli::{Args, Command};
use crate::progress_ui::{Watch, spawn_progress_ui};

const DATABASE_FILE: &str = "transfers.db";
const PREFERENCES_FILE: &str = "preferences.json";

/// Runs one subcommand and returns the process exit code.
pub(crate) async fn run(args: Args, config: FileConfig) -> Result<i32> {
    let state_dir = args.state_dir.clone().unwrap_or_else(default_state_dir);
    std::fs::create_dir_all(&state_dir)
        .with_context(|| format!("Failed to create state directory '{}'", state_dir.display()))?;
    let preferences = Preferences::new(state_dir.join(PREFERENCES_FILE));

    if let Command::Prefs {
        download_dir,
        threads,
    } = &args.command
    {
        return run_prefs(&preferences, download_dir.as_deref(), *threads).await;
    }

    let db_options = DatabaseOptions {
        max_connections: config
            .db_max_connections
            .unwrap_or(DatabaseOptions::default().max_connections),
        busy_timeout_ms: config
            .db_busy_timeout_ms
            .unwrap_or(DatabaseOptions::default().busy_timeout_ms),
    };
    let db = Database::new_with_options(&state_dir.join(DATABASE_FILE), &db_options).await?;
    let store = TransferStore::new(db);

    if !args.command.needs_remote() {
        return run_records(&store, args.command).await;
    }

    let engine = Arc::new(build_engine(&args, &config, store)?);
    let use_spinner = !args.quiet && !args.no_progress;

    match args.command {
        Command::Upload { local, dest_dir } => {
            let failures = engine.subscribe_failures();
            let handle = engine.start_upload(&local, &dest_dir).await?;
            let watch = handle
                .record_id()
                .map_or(Watch::Kind(TransferKind::Upload), Watch::Record);
            wait_for(&engine, handle, watch, use_spinner, failures).await
        }
        Command::Download {
            src,
            output,
            threads,
        } => {
            let output = match output {
                Some(output) => output,
                None => default_output(&preferences, &src).await?,
            };
            let threads = match threads {
                Some(threads) => usize::from(threads),
                None => preferences.download_threads().await?,
            };
            info!(src = %src, output = %output.display(), threads, "starting download");
            let failures = engine.subscribe_failures();
            let handle = engine.start_download(&src, &output, threads)?;
            wait_for(
                &engine,
                handle,
                Watch::Kind(TransferKind::Download),
                use_spinner,
                failures,
            )
            .await
        }
        Command::Copy { src, dest } => {
            let failures = engine.subscribe_failures();
            let handle = engine.start_copy(&src, &dest);
            wait_for(&engine, handle, Watch::Kind(TransferKind::Copy), use_spinner, failures).await
        }
        Command::Move { src, dest } => {
            let failures = engine.subscribe_failures();
            let handle = engine.start_move(&src, &dest);
            wait_for(&engine, handle, Watch::Kind(TransferKind::Copy), use_spinner, failures).await
        }
        Command::Rename { src, dest } => {
            engine.rename(&src, &dest).await?;
            info!(src = %src, dest = %dest, "renamed");
            Ok(0)
        }
        Command::Ls { address } => {
            for entry in engine.list_dir(&address).await? {
                println!("{}", format_entry(&entry));
            }
            Ok(0)
        }
        Command::Stat { address } => {
            let stat = engine.stat(&address).await?;
            println!("{}", serde_json::to_string_pretty(&stat)?);
            Ok(0)
        }
        Command::Mkdir { address } => {
            engine.mkdir(&address).await?;
            Ok(0)
        }
        Command::Rm { address } => {
            engine.remove(&address).await?;
            info!(address = %address, "removed");
            Ok(0)
        }
        Command::StreamUrl { address } => {
            println!("{}", engine.streaming_url(&address).await?);
            Ok(0)
        }
        Command::Records { .. }
        | Command::DeleteRecord { .. }
        | Command::ClearRecords { .. }
        | Command::Prefs { .. } => Ok(0),
    }
}

fn build_engine(args: &Args, config: &FileConfig, store: TransferStore) -> Result<TransferEngine> {
    let Some(endpoint) = args.endpoint.as_deref().or(config.endpoint.as_deref()) else {
        bail!("No remote endpoint configured. Pass --endpoint, set BLOCKDRIVE_ENDPOINT, or set `endpoint` in config.toml");
    };
    let connect_timeout = config.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS);
    let read_timeout = config.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS);

    let mut remote = HttpRemoteStore::with_timeouts(endpoint, connect_timeout, read_timeout)?;
    if let Some(package) = &config.rpc_package {
        remote = remote.with_package(package);
    }
    if let Some(token) = &args.token {
        remote = remote.with_token(token);
    }
    let blobs = BlobClient::with_timeouts(connect_timeout, read_timeout)?;

    let retry = PendingRetryPolicy::new(
        config
            .pending_retry_attempts
            .unwrap_or(DEFAULT_PENDING_RETRY_ATTEMPTS),
        config
            .pending_retry_delay_secs
            .map_or(DEFAULT_PENDING_RETRY_DELAY, Duration::from_secs),
    );
    debug!(endpoint, ?retry, "remote client configured");

    Ok(TransferEngine::new(Arc::new(remote), blobs, store).with_retry(retry))
}

/// Waits for a launched transfer with a spinner; Ctrl-C cancels it.
async fn wait_for(
    engine: &Arc<TransferEngine>,
    handle: TransferHandle,
    watch: Watch,
    use_spinner: bool,
    mut failures: tokio::sync::broadcast::Receiver<blockdrive_core::TransferFailure>,
) -> Result<i32> {
    let (spinner, stop) = spawn_progress_ui(use_spinner, Arc::clone(engine), watch);
    let record_id = handle.record_id();
    let cancel = handle.cancellation_token();

    let finished = handle.finished();
    tokio::pin!(finished);
    tokio::select! {
        () = &mut finished => {}
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, cancelling transfer");
            cancel.cancel();
            (&mut finished).await;
        }
    }

    stop.store(true, std::sync::atomic::Ordering::SeqCst);
    if let Some(spinner) = spinner {
        let _ = spinner.await;
    }

    let mut exit_code = 0;
    loop {
        match failures.try_recv() {
            Ok(failure) => {
                eprintln!("{} failed: {}", failure.operation, failure.message);
                exit_code = 1;
            }
            Err(TryRecvError::Lagged(_)) => exit_code = 1,
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }

    if let Some(id) = record_id
        && let Some(record) = engine.get_record(id).await?
    {
        info!(record_id = id, status = %record.status(), progress = record.progress, "transfer ended");
        if record.status() != TransferStatus::Success {
            exit_code = 1;
        }
    }
    Ok(exit_code)
}

async fn default_output(preferences: &Preferences, src: &FileAddress) -> Result<PathBuf> {
    let dir = preferences.download_dir().await?;
    let name = src.file_name().unwrap_or(&src.location);
    Ok(dir.join(name))
}

async fn run_records(store: &TransferStore, command: Command) -> Result<i32> {
    match command {
        Command::Records { kind, json } => {
            let records = store.list(kind).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                info!(%kind, "no transfer records");
            } else {
                for record in &records {
                    println!("{}", format_record(record));
                }
            }
            Ok(0)
        }
        Command::DeleteRecord { id } => {
            store.delete(id).await?;
            info!(record_id = id, "record deleted");
            Ok(0)
        }
        Command::ClearRecords { kind } => {
            let removed = store.delete_all(kind).await?;
            info!(%kind, removed, "records cleared");
            Ok(0)
        }
        other => bail!("unexpected command {other:?}"),
    }
}

async fn run_prefs(
    preferences: &Preferences,
    download_dir: Option<&Path>,
    threads: Option<u8>,
) -> Result<i32> {
    if let Some(dir) = download_dir {
        preferences.set_download_dir(dir).await?;
    }
    if let Some(threads) = threads {
        preferences.set_download_threads(usize::from(threads)).await?;
    }
    println!("download_dir = {}", preferences.download_dir().await?.display());
    println!("download_threads = {}", preferences.download_threads().await?);
    Ok(0)
}

fn format_entry(entry: &RemoteFile) -> String {
    let kind = if entry.is_dir() { "dir" } else { "file" };
    let modified = entry
        .modified_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    format!("{kind:<4} {:>12} {modified:<16} {}", entry.size, entry.name)
}

fn format_record(record: &TransferRecord) -> String {
    let target = record
        .local_path
        .as_deref()
        .map(|local| format!(" -> {local}"))
        .unwrap_or_default();
    format!(
        "{:>6} {:<11} {:>3}% {}{target}  ({})",
        record.id,
        record.status_label(),
        record.progress,
        record.address(),
        record.updated_at
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockdrive_core::FileKind;

    #[test]
    fn test_format_entry_marks_directories() {
        let entry = RemoteFile {
            name: "photos".to_string(),
            kind: FileKind::Dir,
            size: 0,
            hash: None,
            modified_at: None,
        };
        let line = format_entry(&entry);
        assert!(line.starts_with("dir "));
        assert!(line.ends_with("photos"));
    }

    #[tokio::test]
    async fn test_default_output_uses_file_name_or_location() {
        let dir = tempfile::TempDir::new().unwrap();
        let prefs = Preferences::new(dir.path().join("prefs.json"));
        prefs.set_download_dir(dir.path()).await.unwrap();

        let file = FileAddress::new("n", "media", "/clips/a.mp4");
        assert_eq!(
            default_output(&prefs, &file).await.unwrap(),
            dir.path().join("a.mp4")
        );

        let root = FileAddress::new("n", "media", "/");
        assert_eq!(
            default_output(&prefs, &root).await.unwrap(),
            dir.path().join("media")
        );
    }
}
