//! Per-file progress aggregation.
//!
//! Part fetchers report received bytes through a cheap, non-blocking
//! [`ProgressReporter`]. One consumer task per file turns those reports into
//! throttled [`DownloadProgress`] snapshots, so the user callback is never
//! called concurrently for the same file.

use chrono::NaiveDate;
use dataquery_types::DownloadProgress;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

/// Callback receiving progress snapshots.
pub type ProgressCallback = Arc<dyn Fn(&DownloadProgress) + Send + Sync>;

/// Default minimum spacing between snapshots.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Wake-up channel depth; a full channel already guarantees a pending emit.
const WAKE_CAPACITY: usize = 1;

/// Handle held by fetchers to report received bytes.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    counter: Arc<AtomicU64>,
    wake: mpsc::Sender<()>,
}

impl ProgressReporter {
    /// Adds `delta` received bytes for a part.
    pub fn on_bytes(&self, part_index: usize, delta: u64) {
        trace!(part = part_index, delta, "bytes received");
        self.counter.fetch_add(delta, Ordering::Relaxed);
        let _ = self.wake.try_send(());
    }

    /// Takes back bytes of a part whose data is being re-fetched from zero.
    pub fn retract(&self, part_index: usize, bytes: u64) {
        if bytes == 0 {
            return;
        }
        debug!(part = part_index, bytes, "retracting progress");
        let _ = self
            .counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(bytes))
            });
        let _ = self.wake.try_send(());
    }

    /// Bytes reported so far.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

/// Owns the consumer task that emits snapshots for one file.
#[derive(Debug)]
pub struct ProgressAggregator {
    reporter: ProgressReporter,
    done: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ProgressAggregator {
    /// Spawns the consumer task for one file.
    ///
    /// # Arguments
    ///
    /// * `file_id` - Identifier carried in every snapshot
    /// * `file_date` - Date carried in every snapshot
    /// * `total_bytes` - Expected size, if known
    /// * `interval` - Minimum spacing between snapshots
    /// * `callback` - Receiver of snapshots; `None` logs them at debug level
    #[must_use]
    pub fn spawn(
        file_id: String,
        file_date: Option<NaiveDate>,
        total_bytes: Option<u64>,
        interval: Duration,
        callback: Option<ProgressCallback>,
    ) -> Self {
        let counter = Arc::new(AtomicU64::new(0));
        let (wake_tx, wake_rx) = mpsc::channel(WAKE_CAPACITY);
        let (done_tx, done_rx) = oneshot::channel();

        let task = tokio::spawn(run(
            file_id,
            file_date,
            total_bytes,
            interval,
            callback,
            Arc::clone(&counter),
            wake_rx,
            done_rx,
        ));

        Self {
            reporter: ProgressReporter {
                counter,
                wake: wake_tx,
            },
            done: done_tx,
            task,
        }
    }

    /// Returns a reporter for a fetcher.
    #[must_use]
    pub fn reporter(&self) -> ProgressReporter {
        self.reporter.clone()
    }

    /// Emits the final snapshot, stops the task and returns the byte total.
    pub async fn finish(self) -> u64 {
        let _ = self.done.send(());
        let _ = self.task.await;
        self.reporter.bytes()
    }
}

async fn run(
    file_id: String,
    file_date: Option<NaiveDate>,
    total_bytes: Option<u64>,
    interval: Duration,
    callback: Option<ProgressCallback>,
    counter: Arc<AtomicU64>,
    mut wake: mpsc::Receiver<()>,
    mut done: oneshot::Receiver<()>,
) {
    let emit = |bytes: u64| {
        let mut snapshot = DownloadProgress::new(file_id.clone(), bytes, total_bytes);
        snapshot.file_date = file_date;
        match &callback {
            Some(callback) => callback(&snapshot),
            None => debug!(
                file_id = %snapshot.file_id,
                bytes = snapshot.bytes_downloaded,
                percentage = format!("{:.1}", snapshot.percentage),
                "download progress"
            ),
        }
    };

    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut dirty = false;
    let mut last_emitted = None;
    let mut wake_open = true;

    loop {
        tokio::select! {
            biased;
            _ = &mut done => break,
            msg = wake.recv(), if wake_open => match msg {
                Some(()) => dirty = true,
                None => wake_open = false,
            },
            _ = ticker.tick(), if dirty => {
                dirty = false;
                let bytes = counter.load(Ordering::Relaxed);
                if last_emitted != Some(bytes) {
                    emit(bytes);
                    last_emitted = Some(bytes);
                }
            }
        }
    }

    emit(counter.load(Ordering::Relaxed));
}
