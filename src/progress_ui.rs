//! Progress UI (spinner) for foreground transfers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use blockdrive_core::{TransferEngine, TransferKind, TransferStatus};
use indicatif::{ProgressBar, ProgressStyle};

/// What the spinner watches.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Watch {
    /// A single record known up front.
    Record(i64),
    /// The newest active record of one kind.
    Kind(TransferKind),
}

/// Spawns the progress UI (spinner) when requested.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `use_spinner` is false, returns (None, stop) with stop already true.
pub(crate) fn spawn_progress_ui(
    use_spinner: bool,
    engine: Arc<TransferEngine>,
    watch: Watch,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !use_spinner {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_spinner_inner(engine, watch, Arc::clone(&stop));
    (Some(handle), stop)
}

fn spawn_spinner_inner(
    engine: Arc<TransferEngine>,
    watch: Watch,
    stop: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));

        while !stop.load(Ordering::SeqCst) {
            let record = match watch {
                Watch::Record(id) => engine.get_record(id).await.ok().flatten(),
                Watch::Kind(kind) => engine
                    .list_records(kind)
                    .await
                    .unwrap_or_default()
                    .into_iter()
                    .find(|record| record.status() == TransferStatus::Active),
            };

            let message = record.map_or_else(
                || "Preparing transfer...".to_string(),
                |record| {
                    format!(
                        "[{:>3}%] {} {}",
                        record.progress,
                        record.status_label(),
                        record.address()
                    )
                },
            );
            spinner.set_message(message);
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        spinner.finish_and_clear();
    })
}
