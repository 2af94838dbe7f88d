//! Parallel range-request file delivery engine.
//!
//! Components, leaf to root:
//!
//! - [`RateLimiter`] - Token bucket shared by every outbound request
//! - [`RetryPolicy`] - Backoff with jitter and an optional [`CircuitBreaker`]
//! - [`ChunkPlanner`] - Splits a file into byte-range parts
//! - [`PartFetcher`] - Fetches one part straight into its file offset
//! - [`ProgressAggregator`] - Merges part counters into throttled snapshots
//! - [`FileDownloader`] - Probe, plan, fetch, verify and finalize one file
//! - [`BatchDownloader`] - Many files over a date range with bounded concurrency

#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod batch;
mod breaker;
mod file;
mod part;
mod planner;
mod progress;
mod rate_limit;
mod retry;
mod sink;
mod transport;

pub use batch::{BatchConfig, BatchDownloader, BatchRequest};
pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitPhase};
pub use file::{FileDownloadConfig, FileDownloader, FileRequest, PartialFilePolicy};
pub use part::{DEFAULT_REQUEST_TIMEOUT, PartFetcher};
pub use planner::{ChunkPlan, ChunkPlanner, DEFAULT_MIN_PART_SIZE, DEFAULT_PARTS_PER_FILE};
pub use progress::{
    DEFAULT_PROGRESS_INTERVAL, ProgressAggregator, ProgressCallback, ProgressReporter,
};
pub use rate_limit::{RateLimitConfig, RateLimiter, RateLimiterStats};
pub use retry::{Attempts, RetryConfig, RetryPolicy, RetryStats};
pub use sink::{PART_SUFFIX, PartFile, temp_path};
pub use transport::{
    ByteStream, ContentRange, FetchRequest, FetchResponse, FileCatalog, HeadInfo, Method,
    ResponseHeaders, Transport, endpoint_key,
};
pub use tokio_util::sync::CancellationToken;
