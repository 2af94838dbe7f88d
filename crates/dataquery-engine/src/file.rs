//! Single-file download orchestration.
//!
//! A download moves through `probe -> plan -> fetch -> verify -> finalize`.
//! Parts stream into `<destination>.part`, which is renamed into place only
//! after the byte count checks out.

use crate::part::{DEFAULT_REQUEST_TIMEOUT, PartFetcher};
use crate::planner::{ChunkPlan, ChunkPlanner, DEFAULT_MIN_PART_SIZE, DEFAULT_PARTS_PER_FILE};
use crate::progress::{DEFAULT_PROGRESS_INTERVAL, ProgressAggregator, ProgressCallback, ProgressReporter};
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;
use crate::sink::{PartFile, temp_path};
use crate::transport::{FetchRequest, Transport, endpoint_key};
use chrono::NaiveDate;
use dataquery_types::{
    ByteRange, DownloadResult, ErrorKind, FetchError, FileDescriptor, SkipReason, format_bytes,
};
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// What happens to `<destination>.part` when a download fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PartialFilePolicy {
    /// Leave the partial file for inspection.
    #[default]
    Keep,
    /// Remove the partial file.
    Delete,
}

/// Configuration for single-file downloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDownloadConfig {
    /// Requested number of parts per file.
    pub parts_per_file: usize,
    /// Smallest part worth a separate request.
    pub min_part_size: u64,
    /// Time allowed for response headers and between body chunks.
    pub request_timeout: Duration,
    /// Replace an existing destination instead of skipping it.
    pub overwrite: bool,
    /// Create missing parent directories of the destination.
    pub create_directories: bool,
    /// Fate of the partial file after a failure.
    pub partial_file_policy: PartialFilePolicy,
    /// Minimum spacing between progress snapshots.
    pub progress_interval: Duration,
}

impl Default for FileDownloadConfig {
    fn default() -> Self {
        Self {
            parts_per_file: DEFAULT_PARTS_PER_FILE,
            min_part_size: DEFAULT_MIN_PART_SIZE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            overwrite: false,
            create_directories: true,
            partial_file_policy: PartialFilePolicy::Keep,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

/// One file to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRequest {
    /// The file group identifier.
    pub file_id: String,
    /// The file date.
    pub file_date: NaiveDate,
    /// Download URL.
    pub url: String,
    /// Final path of the file.
    pub destination: PathBuf,
}

/// Downloads single files as concurrently fetched byte ranges.
pub struct FileDownloader {
    transport: Arc<dyn Transport>,
    limiter: RateLimiter,
    retry: RetryPolicy,
    fetcher: PartFetcher,
    planner: ChunkPlanner,
    config: FileDownloadConfig,
}

impl std::fmt::Debug for FileDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDownloader")
            .field("planner", &self.planner)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A failed run: the error and the bytes received before it.
struct Failure {
    error: FetchError,
    bytes: u64,
}

impl From<FetchError> for Failure {
    fn from(error: FetchError) -> Self {
        Self { error, bytes: 0 }
    }
}

impl FileDownloader {
    /// Creates a downloader sharing `limiter` and `retry` with its other users.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        limiter: RateLimiter,
        retry: RetryPolicy,
        config: FileDownloadConfig,
    ) -> Self {
        let fetcher = PartFetcher::new(
            Arc::clone(&transport),
            limiter.clone(),
            retry.clone(),
            config.request_timeout,
        );
        Self {
            transport,
            limiter,
            retry,
            fetcher,
            planner: ChunkPlanner::new(config.parts_per_file, config.min_part_size),
            config,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &FileDownloadConfig {
        &self.config
    }

    /// Returns the shared rate limiter.
    #[must_use]
    pub const fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Returns the shared retry policy.
    #[must_use]
    pub const fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Downloads one file and reports the terminal outcome.
    ///
    /// Never returns an error: failures are described by the result. An
    /// existing destination is skipped without network I/O unless overwrite
    /// is enabled.
    pub async fn download(
        &self,
        request: &FileRequest,
        callback: Option<ProgressCallback>,
    ) -> DownloadResult {
        let started = Instant::now();

        if !self.config.overwrite
            && let Ok(meta) = tokio::fs::metadata(&request.destination).await
            && meta.is_file()
        {
            debug!(path = %request.destination.display(), "destination exists, skipping");
            return DownloadResult::skipped(
                request.file_id.clone(),
                request.file_date,
                request.destination.clone(),
                meta.len(),
                SkipReason::AlreadyExists,
            );
        }

        info!(
            file_id = %request.file_id,
            date = %request.file_date,
            path = %request.destination.display(),
            "starting download"
        );

        let outcome = self.run(request, callback).await;
        let elapsed = started.elapsed().as_secs_f64();
        match outcome {
            Ok(size) => {
                info!(
                    file_id = %request.file_id,
                    date = %request.file_date,
                    size = %format_bytes(size),
                    elapsed_secs = format!("{elapsed:.2}"),
                    "download completed"
                );
                DownloadResult::completed(
                    request.file_id.clone(),
                    request.file_date,
                    request.destination.clone(),
                    size,
                    elapsed,
                )
            }
            Err(failure) => {
                warn!(
                    file_id = %request.file_id,
                    date = %request.file_date,
                    error = %failure.error,
                    "download failed"
                );
                DownloadResult::failed(
                    request.file_id.clone(),
                    request.file_date,
                    request.destination.clone(),
                    failure.bytes,
                    elapsed,
                    failure.error,
                )
            }
        }
    }

    /// Learns the size and range support of a file.
    ///
    /// Probe failures are not fatal: the file is then fetched as one body.
    pub async fn probe(&self, request: &FileRequest) -> FileDescriptor {
        let limiter = &self.limiter;
        let transport = &self.transport;
        let url = request.url.as_str();

        let head = self
            .retry
            .execute(endpoint_key(url), move |_| async move {
                limiter.acquire().await;
                transport.head_info(url).await
            })
            .await;

        let (mut total, mut supports_range) = match head {
            Ok(info) => (info.content_length, info.accept_ranges),
            Err(err) => {
                warn!(file_id = %request.file_id, error = %err, "probe failed, downloading as one stream");
                return FileDescriptor::unprobed(request.file_id.clone(), request.file_date);
            }
        };

        if supports_range != Some(false) && (supports_range.is_none() || total.is_none()) {
            match self.range_probe(url).await {
                Ok((supported, range_total)) => {
                    supports_range = Some(supported);
                    total = total.or(range_total);
                }
                Err(err) => {
                    debug!(file_id = %request.file_id, error = %err, "range probe failed");
                    supports_range = Some(false);
                }
            }
        }

        FileDescriptor::new(
            request.file_id.clone(),
            request.file_date,
            total,
            supports_range == Some(true),
        )
    }

    /// Requests `bytes=0-0`; a 206 confirms range support and may carry the size.
    async fn range_probe(&self, url: &str) -> Result<(bool, Option<u64>), FetchError> {
        let limiter = &self.limiter;
        let transport = &self.transport;

        self.retry
            .execute(endpoint_key(url), move |_| async move {
                limiter.acquire().await;
                let response = transport
                    .request(FetchRequest::get(url, Some(ByteRange::new(0, 0))))
                    .await?;
                // The body is dropped unread.
                match response.status {
                    206 => Ok((true, response.headers.content_range.and_then(|cr| cr.total))),
                    200..=299 => Ok((false, response.headers.content_length)),
                    status => Err(FetchError::from_status(status, format!("HTTP {status}"))
                        .with_retry_after(response.headers.retry_after)),
                }
            })
            .await
    }

    async fn run(
        &self,
        request: &FileRequest,
        callback: Option<ProgressCallback>,
    ) -> Result<u64, Failure> {
        if self.config.create_directories
            && let Some(parent) = request.destination.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::file_system(&e))?;
        }

        let descriptor = self.probe(request).await;
        let plan = self
            .planner
            .plan(descriptor.total_bytes, descriptor.supports_range);
        debug!(
            file_id = %request.file_id,
            total_bytes = ?descriptor.total_bytes,
            parts = plan.len(),
            ranged = plan.ranged,
            "planned download"
        );

        let temp = temp_path(&request.destination);
        let file = PartFile::create(&temp, descriptor.total_bytes).await?;
        let aggregator = ProgressAggregator::spawn(
            request.file_id.clone(),
            Some(request.file_date),
            descriptor.total_bytes,
            self.config.progress_interval,
            callback,
        );
        let reporter = aggregator.reporter();

        let mut fetched = self.fetch_plan(plan, &file, &request.url, &reporter).await;
        if let Err(err) = &fetched
            && err.kind == ErrorKind::RangeUnsupported
        {
            warn!(file_id = %request.file_id, "server ignored range requests, refetching as one stream");
            reporter.retract(0, reporter.bytes());
            fetched = self
                .fetch_plan(
                    ChunkPlan::whole_body(descriptor.total_bytes),
                    &file,
                    &request.url,
                    &reporter,
                )
                .await;
        }
        let bytes = aggregator.finish().await;

        let finalized = match fetched {
            Ok(written) => Self::finalize(file, &descriptor, written, &request.destination).await,
            Err(err) => {
                drop(file);
                Err(err)
            }
        };

        match finalized {
            Ok(size) => Ok(size),
            Err(error) => {
                self.discard(&temp).await;
                Err(Failure { error, bytes })
            }
        }
    }

    /// Runs every part of a plan concurrently; returns the bytes written.
    async fn fetch_plan(
        &self,
        plan: ChunkPlan,
        file: &PartFile,
        url: &str,
        reporter: &ProgressReporter,
    ) -> Result<u64, FetchError> {
        let mut parts = plan.parts;
        let results = join_all(
            parts
                .iter_mut()
                .map(|part| self.fetcher.fetch(part, file, url, reporter)),
        )
        .await;

        let mut errors: Vec<FetchError> = results.into_iter().filter_map(Result::err).collect();
        if let Some(pos) = errors
            .iter()
            .position(|e| e.kind == ErrorKind::RangeUnsupported)
        {
            return Err(errors.swap_remove(pos));
        }
        if let Some(err) = errors.into_iter().next() {
            return Err(err);
        }
        Ok(parts.iter().map(|p| p.bytes_written).sum())
    }

    async fn finalize(
        file: PartFile,
        descriptor: &FileDescriptor,
        written: u64,
        destination: &Path,
    ) -> Result<u64, FetchError> {
        if let Some(expected) = descriptor.total_bytes
            && written != expected
        {
            return Err(FetchError::new(
                ErrorKind::Verification,
                format!("wrote {written} bytes, expected {expected}"),
            ));
        }
        file.finish(written).await?;
        let temp = file.path().to_path_buf();
        drop(file);
        tokio::fs::rename(&temp, destination)
            .await
            .map_err(|e| FetchError::file_system(&e))?;
        Ok(written)
    }

    async fn discard(&self, temp: &Path) {
        match self.config.partial_file_policy {
            PartialFilePolicy::Keep => {
                debug!(path = %temp.display(), "keeping partial file");
            }
            PartialFilePolicy::Delete => {
                if let Err(err) = tokio::fs::remove_file(temp).await
                    && err.kind() != std::io::ErrorKind::NotFound
                {
                    warn!(path = %temp.display(), error = %err, "failed to remove partial file");
                }
            }
        }
    }
}
