//! Date-range batch downloads with bounded file concurrency.

use crate::file::{FileDownloader, FileRequest};
use crate::progress::ProgressCallback;
use crate::transport::FileCatalog;
use chrono::NaiveDate;
use dataquery_types::{
    BatchReport, DateRange, DownloadResult, FetchError, SkipReason, local_file_name,
    validate_file_id,
};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Circuit breaker target used for availability checks.
const AVAILABILITY_TARGET: &str = "availability";

/// Configuration for batch downloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Files downloaded at the same time.
    pub max_concurrent_files: usize,
    /// Pause between successive scheduling events.
    pub schedule_delay: Option<Duration>,
    /// Only consider Monday to Friday.
    pub weekdays_only: bool,
    /// Extension appended to local file names, including the dot. `None`
    /// takes it from the file id, falling back to `.bin`.
    pub extension: Option<String>,
    /// Place files under `destination_dir/<group_id>/`.
    pub group_subdirectory: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_files: 3,
            schedule_delay: None,
            weekdays_only: false,
            extension: None,
            group_subdirectory: true,
        }
    }
}

/// Files of one group over a date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    /// The group the files belong to.
    pub group_id: String,
    /// File identifiers to fetch for every date.
    pub file_ids: Vec<String>,
    /// Dates to fetch, inclusive.
    pub range: DateRange,
    /// Root directory for downloaded files.
    pub destination_dir: PathBuf,
}

/// Drives many file downloads and summarizes them in a [`BatchReport`].
pub struct BatchDownloader {
    downloader: Arc<FileDownloader>,
    catalog: Arc<dyn FileCatalog>,
    config: BatchConfig,
}

impl std::fmt::Debug for BatchDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchDownloader")
            .field("downloader", &self.downloader)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BatchDownloader {
    /// Creates a batch downloader.
    #[must_use]
    pub fn new(
        downloader: Arc<FileDownloader>,
        catalog: Arc<dyn FileCatalog>,
        config: BatchConfig,
    ) -> Self {
        Self {
            downloader,
            catalog,
            config,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Lists the file identifiers of a group through the catalog.
    pub async fn resolve_file_ids(&self, group_id: &str) -> Result<Vec<String>, FetchError> {
        let catalog = &self.catalog;
        let limiter = self.downloader.limiter();
        self.downloader
            .retry()
            .execute("files", move |_| async move {
                limiter.acquire().await;
                catalog.list_file_ids(group_id).await
            })
            .await
    }

    /// Local path for a file on a date.
    ///
    /// # Errors
    ///
    /// Returns a `Client` error if the file id or group subdirectory could
    /// escape the destination directory.
    pub fn destination(
        &self,
        request: &BatchRequest,
        file_id: &str,
        date: NaiveDate,
    ) -> Result<PathBuf, FetchError> {
        let name = local_file_name(file_id, date, self.config.extension.as_deref())?;
        let mut path = request.destination_dir.clone();
        if self.config.group_subdirectory {
            validate_file_id(&request.group_id)?;
            path.push(&request.group_id);
        }
        path.push(name);
        Ok(path)
    }

    /// Downloads every `(file, date)` of the request.
    ///
    /// Individual failures never abort the batch. Cancelling `cancel` stops
    /// admission; files already admitted run to completion and the rest are
    /// reported as cancelled.
    pub async fn run(
        &self,
        request: &BatchRequest,
        callback: Option<ProgressCallback>,
        cancel: CancellationToken,
    ) -> BatchReport {
        let started = Instant::now();
        let mut report = BatchReport::new(&request.group_id, request.range);
        let dates: Vec<NaiveDate> = if self.config.weekdays_only {
            request.range.weekdays().collect()
        } else {
            request.range.days().collect()
        };

        info!(
            group_id = %request.group_id,
            range = %request.range,
            files = request.file_ids.len(),
            dates = dates.len(),
            max_concurrent = self.config.max_concurrent_files,
            "starting batch download"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_files.max(1)));
        let mut tasks = JoinSet::new();
        let mut scheduled_any = false;

        for file_id in &request.file_ids {
            for &date in &dates {
                let destination = match self.destination(request, file_id, date) {
                    Ok(path) => path,
                    Err(err) => {
                        warn!(file_id = %file_id, error = %err, "refusing unsafe file id");
                        report.record(&DownloadResult::failed(
                            file_id.clone(),
                            date,
                            request.destination_dir.clone(),
                            0,
                            0.0,
                            err,
                        ));
                        continue;
                    }
                };
                if cancel.is_cancelled() {
                    report.record(&DownloadResult::cancelled(file_id.clone(), date, destination));
                    continue;
                }

                if let Some(delay) = self.config.schedule_delay
                    && scheduled_any
                {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            report.record(&DownloadResult::cancelled(file_id.clone(), date, destination));
                            continue;
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                scheduled_any = true;

                match self.check_availability(file_id, date).await {
                    Ok(true) => {}
                    Ok(false) => {
                        report.record(&DownloadResult::skipped(
                            file_id.clone(),
                            date,
                            destination,
                            0,
                            SkipReason::Unavailable,
                        ));
                        continue;
                    }
                    Err(err) => {
                        warn!(file_id = %file_id, date = %date, error = %err, "availability check failed");
                        report.record(&DownloadResult::failed(
                            file_id.clone(),
                            date,
                            destination,
                            0,
                            0.0,
                            err,
                        ));
                        continue;
                    }
                }

                let permit = tokio::select! {
                    biased;
                    () = cancel.cancelled() => None,
                    permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
                };
                let Some(permit) = permit else {
                    report.record(&DownloadResult::cancelled(file_id.clone(), date, destination));
                    continue;
                };

                let file_request = FileRequest {
                    file_id: file_id.clone(),
                    file_date: date,
                    url: self.catalog.download_url(file_id, date),
                    destination,
                };
                let downloader = Arc::clone(&self.downloader);
                let callback = callback.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    let outcome = AssertUnwindSafe(downloader.download(&file_request, callback))
                        .catch_unwind()
                        .await;
                    outcome.unwrap_or_else(|_| {
                        DownloadResult::failed(
                            file_request.file_id.clone(),
                            file_request.file_date,
                            file_request.destination.clone(),
                            0,
                            0.0,
                            "download task panicked",
                        )
                    })
                });

                // Record whatever finished meanwhile so the set stays small.
                while let Some(joined) = tasks.try_join_next() {
                    Self::record_joined(&mut report, joined);
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            Self::record_joined(&mut report, joined);
        }

        report.finalize(started.elapsed());
        info!(
            group_id = %report.group_id,
            total = report.total_files,
            succeeded = report.successful_downloads,
            failed = report.failed_downloads,
            skipped = report.skipped_downloads,
            cancelled = report.cancelled_downloads,
            success_rate = format!("{:.1}", report.success_rate),
            elapsed = %report.total_time_formatted,
            "batch download finished"
        );
        report
    }

    async fn check_availability(&self, file_id: &str, date: NaiveDate) -> Result<bool, FetchError> {
        let catalog = &self.catalog;
        let limiter = self.downloader.limiter();
        self.downloader
            .retry()
            .execute(AVAILABILITY_TARGET, move |_| async move {
                limiter.acquire().await;
                catalog.is_available(file_id, date).await
            })
            .await
    }

    fn record_joined(
        report: &mut BatchReport,
        joined: Result<DownloadResult, tokio::task::JoinError>,
    ) {
        match joined {
            Ok(result) => report.record(&result),
            Err(err) => error!(error = %err, "download task did not complete"),
        }
    }
}
