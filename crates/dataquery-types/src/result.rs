//! Per-file download outcomes and progress snapshots.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Why a file was skipped without being downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The destination exists and overwriting is disabled.
    AlreadyExists,
    /// The availability check reported the file as not yet published.
    Unavailable,
}

/// Terminal status of a file download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum DownloadStatus {
    /// The file is complete at its destination.
    Completed,
    /// The download failed; see the error message.
    Failed,
    /// No download was attempted.
    Skipped(SkipReason),
    /// The batch was cancelled before this file was admitted.
    Cancelled,
}

impl DownloadStatus {
    /// Returns the status as a string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped(SkipReason::AlreadyExists) => "skipped (exists)",
            Self::Skipped(SkipReason::Unavailable) => "skipped (unavailable)",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns true for any skipped variant.
    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of one file download, produced exactly once per file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadResult {
    /// The file group identifier.
    pub file_id: String,
    /// The file date.
    pub file_date: NaiveDate,
    /// Where the file was (or would have been) written.
    pub local_path: PathBuf,
    /// Size of the finished file in bytes (0 unless completed or skipped as existing).
    pub file_size_bytes: u64,
    /// Bytes received over the network during this run.
    pub bytes_downloaded: u64,
    /// Wall-clock duration of the run.
    pub elapsed_seconds: f64,
    /// Terminal status.
    pub status: DownloadStatus,
    /// Error description for failed downloads.
    pub error_message: Option<String>,
}

impl DownloadResult {
    /// Creates a completed result.
    #[must_use]
    pub const fn completed(
        file_id: String,
        file_date: NaiveDate,
        local_path: PathBuf,
        file_size_bytes: u64,
        elapsed_seconds: f64,
    ) -> Self {
        Self {
            file_id,
            file_date,
            local_path,
            file_size_bytes,
            bytes_downloaded: file_size_bytes,
            elapsed_seconds,
            status: DownloadStatus::Completed,
            error_message: None,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failed(
        file_id: String,
        file_date: NaiveDate,
        local_path: PathBuf,
        bytes_downloaded: u64,
        elapsed_seconds: f64,
        error: impl std::fmt::Display,
    ) -> Self {
        Self {
            file_id,
            file_date,
            local_path,
            file_size_bytes: 0,
            bytes_downloaded,
            elapsed_seconds,
            status: DownloadStatus::Failed,
            error_message: Some(error.to_string()),
        }
    }

    /// Creates a skipped result.
    #[must_use]
    pub const fn skipped(
        file_id: String,
        file_date: NaiveDate,
        local_path: PathBuf,
        file_size_bytes: u64,
        reason: SkipReason,
    ) -> Self {
        Self {
            file_id,
            file_date,
            local_path,
            file_size_bytes,
            bytes_downloaded: 0,
            elapsed_seconds: 0.0,
            status: DownloadStatus::Skipped(reason),
            error_message: None,
        }
    }

    /// Creates a result for a file that was never admitted due to cancellation.
    #[must_use]
    pub const fn cancelled(file_id: String, file_date: NaiveDate, local_path: PathBuf) -> Self {
        Self {
            file_id,
            file_date,
            local_path,
            file_size_bytes: 0,
            bytes_downloaded: 0,
            elapsed_seconds: 0.0,
            status: DownloadStatus::Cancelled,
            error_message: None,
        }
    }

    /// Returns true if the file is complete at its destination.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == DownloadStatus::Completed
    }

    /// Returns true if the download failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status == DownloadStatus::Failed
    }
}

/// Progress snapshot for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// The file group identifier.
    pub file_id: String,
    /// The file date, when the snapshot belongs to a dated download.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_date: Option<NaiveDate>,
    /// Bytes received so far.
    pub bytes_downloaded: u64,
    /// Expected size, if known.
    pub total_bytes: Option<u64>,
    /// Completion percentage (0-100); 0 while the size is unknown.
    pub percentage: f64,
}

impl DownloadProgress {
    /// Builds a snapshot, deriving the percentage.
    #[must_use]
    pub fn new(file_id: String, bytes_downloaded: u64, total_bytes: Option<u64>) -> Self {
        let percentage = match total_bytes {
            Some(0) => 100.0,
            Some(total) => (bytes_downloaded as f64 / total as f64 * 100.0).min(100.0),
            None => 0.0,
        };
        Self {
            file_id,
            file_date: None,
            bytes_downloaded,
            total_bytes,
            percentage,
        }
    }
}
