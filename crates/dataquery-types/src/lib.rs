//! Core types for the DataQuery file delivery SDK.
//!
//! This crate provides the data structures shared by the download engine,
//! the HTTP client and the CLI:
//!
//! - [`FileDescriptor`] - What a probe learned about a remote file
//! - [`DownloadPart`] - One byte range of a file and its fetch state
//! - [`DownloadResult`] - Terminal outcome of one file download
//! - [`DownloadProgress`] - Progress snapshot handed to callbacks
//! - [`BatchReport`] - Summary of a date-range batch download
//! - [`FetchError`] - Tagged error with a retryable flag
//! - [`DateRange`] - Inclusive date range with day iteration

#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod date_range;
mod error;
mod file;
mod format;
mod naming;
mod report;
mod result;

pub use date_range::{DateRange, DayIterator, file_datetime, parse_file_datetime};
pub use error::{DataQueryError, DateRangeError, ErrorKind, FetchError, Result};
pub use file::{ByteRange, DownloadPart, FileDescriptor, PartState};
pub use format::{format_bytes, format_duration};
pub use naming::{DEFAULT_EXTENSION, file_extension, local_file_name, validate_file_id};
pub use report::BatchReport;
pub use result::{DownloadProgress, DownloadResult, DownloadStatus, SkipReason};
