//! Parallel file delivery SDK for the DataQuery API.
//!
//! This is a facade crate that re-exports the DataQuery workspace crates.
//!
//! # Quick Start
//!
//! ```no_run
//! use dataquery_lib::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let client = Arc::new(DataQueryClient::from_env()?);
//!     let batch = client.batch_downloader(FileDownloadConfig::default(), BatchConfig::default());
//!
//!     let request = BatchRequest {
//!         group_id: "JPMAQS".to_string(),
//!         file_ids: vec!["JPMAQS_GENERIC_RETURNS".to_string()],
//!         range: DateRange::parse("20240101", "20240131")?,
//!         destination_dir: client.config().download_dir.clone(),
//!     };
//!     let report = batch.run(&request, None, CancellationToken::new()).await;
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!     Ok(())
//! }
//! ```

#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use dataquery_types::*;

// Re-export the engine
pub use dataquery_engine::{
    Attempts, BatchConfig, BatchDownloader, BatchRequest, ByteStream, ChunkPlan, ChunkPlanner,
    CircuitBreaker, CircuitBreakerConfig, CircuitPhase, ContentRange, FetchRequest,
    FetchResponse, FileCatalog, FileDownloadConfig, FileDownloader, FileRequest, HeadInfo,
    Method, PartFetcher, PartialFilePolicy, ProgressAggregator, ProgressCallback,
    ProgressReporter, RateLimitConfig, RateLimiter, RateLimiterStats, ResponseHeaders,
    RetryConfig, RetryPolicy, RetryStats, Transport,
};

// Re-export the HTTP client
#[cfg(feature = "fetch")]
pub use dataquery_fetch::{
    AvailabilityInfo, ClientConfig, ClientError, DataQueryClient, FileInfo, StaticToken,
    TokenProvider,
};

/// Cancellation handle accepted by [`BatchDownloader::run`].
pub use dataquery_engine::CancellationToken;

/// Prelude module for convenient imports.
///
/// ```
/// use dataquery_lib::prelude::*;
/// ```
pub mod prelude {
    pub use dataquery_types::{
        BatchReport, DataQueryError, DateRange, DownloadProgress, DownloadResult,
        DownloadStatus, ErrorKind, FetchError, Result, SkipReason,
    };

    pub use dataquery_engine::{
        BatchConfig, BatchDownloader, BatchRequest, CancellationToken, FileDownloadConfig,
        FileDownloader, FileRequest, PartialFilePolicy, ProgressCallback, RateLimiter,
        RetryConfig, RetryPolicy,
    };

    #[cfg(feature = "fetch")]
    pub use dataquery_fetch::{ClientConfig, DataQueryClient, TokenProvider};
}
