//! Batch download summary report.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{DateRange, DownloadResult, DownloadStatus, format_duration};

/// Summary of a batch download over a date range.
///
/// Built incrementally with [`BatchReport::record`] as files resolve and
/// closed with [`BatchReport::finalize`]. Field names serialize in camelCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// The group the files belong to.
    pub group_id: String,
    /// First date of the batch.
    pub start_date: NaiveDate,
    /// Last date of the batch.
    pub end_date: NaiveDate,
    /// Number of `(file, date)` entries considered.
    pub total_files: usize,
    /// Files completed in this run.
    pub successful_downloads: usize,
    /// Files whose download or availability check failed.
    pub failed_downloads: usize,
    /// Files skipped as unavailable or already present.
    pub skipped_downloads: usize,
    /// Files never admitted because the batch was cancelled.
    pub cancelled_downloads: usize,
    /// Successful downloads as a percentage (0-100) of attempted downloads.
    pub success_rate: f64,
    /// Wall-clock duration of the batch in seconds.
    pub total_time_seconds: f64,
    /// Wall-clock duration of the batch, human readable.
    pub total_time_formatted: String,
    /// Bytes received across all files.
    pub total_bytes: u64,
    /// Average throughput over the batch.
    pub throughput_bytes_per_second: f64,
    /// Identifiers (`fileId_date`) of completed files.
    pub downloaded_files: Vec<String>,
    /// Identifiers (`fileId_date`) of failed files.
    pub failed_files: Vec<String>,
    /// Identifiers (`fileId_date`) of skipped files.
    pub skipped_files: Vec<String>,
}

impl BatchReport {
    /// Creates an empty report for a group and date range.
    #[must_use]
    pub fn new(group_id: impl Into<String>, range: DateRange) -> Self {
        Self {
            group_id: group_id.into(),
            start_date: range.start,
            end_date: range.end,
            total_files: 0,
            successful_downloads: 0,
            failed_downloads: 0,
            skipped_downloads: 0,
            cancelled_downloads: 0,
            success_rate: 0.0,
            total_time_seconds: 0.0,
            total_time_formatted: format_duration(Duration::ZERO),
            total_bytes: 0,
            throughput_bytes_per_second: 0.0,
            downloaded_files: Vec::new(),
            failed_files: Vec::new(),
            skipped_files: Vec::new(),
        }
    }

    /// Records one resolved file.
    pub fn record(&mut self, result: &DownloadResult) {
        let id = format!("{}_{}", result.file_id, crate::file_datetime(result.file_date));
        self.total_files += 1;
        self.total_bytes += result.bytes_downloaded;
        match result.status {
            DownloadStatus::Completed => {
                self.successful_downloads += 1;
                self.downloaded_files.push(id);
            }
            DownloadStatus::Failed => {
                self.failed_downloads += 1;
                self.failed_files.push(id);
            }
            DownloadStatus::Skipped(_) => {
                self.skipped_downloads += 1;
                self.skipped_files.push(id);
            }
            DownloadStatus::Cancelled => self.cancelled_downloads += 1,
        }
    }

    /// Number of files for which a download was attempted.
    #[must_use]
    pub const fn attempted_downloads(&self) -> usize {
        self.successful_downloads + self.failed_downloads
    }

    /// Computes aggregate rate, timing and throughput figures.
    pub fn finalize(&mut self, elapsed: Duration) {
        let attempted = self.attempted_downloads();
        self.success_rate = if attempted == 0 {
            0.0
        } else {
            self.successful_downloads as f64 / attempted as f64 * 100.0
        };
        self.total_time_seconds = elapsed.as_secs_f64();
        self.total_time_formatted = format_duration(elapsed);
        self.throughput_bytes_per_second = if self.total_time_seconds > 0.0 {
            self.total_bytes as f64 / self.total_time_seconds
        } else {
            0.0
        };
        self.downloaded_files.sort();
        self.failed_files.sort();
        self.skipped_files.sort();
    }

    /// Returns true if no file failed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failed_downloads == 0
    }
}
