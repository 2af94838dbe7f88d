//! Progress bars and result printing for the dataquery CLI.

use anyhow::Result;
use chrono::NaiveDate;
use clap::ValueEnum;
use dataquery_lib::{
    BatchReport, DownloadProgress, DownloadResult, ProgressCallback, file_datetime, format_bytes,
};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// How results are printed on stdout.
#[derive(Clone, Copy, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

const BAR_TEMPLATE: &str =
    "{prefix:.bold} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}";
const SPINNER_TEMPLATE: &str = "{spinner:.green} {prefix:.bold} {bytes} ({bytes_per_sec})";

type BarKey = (String, Option<NaiveDate>);

/// One progress bar per file in flight, fed by the download callback.
pub(crate) struct ProgressDisplay {
    multi: MultiProgress,
    bars: Arc<Mutex<HashMap<BarKey, ProgressBar>>>,
}

impl ProgressDisplay {
    pub(crate) fn new(quiet: bool) -> Self {
        let multi = if quiet {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };
        Self {
            multi,
            bars: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Callback that creates, advances and clears bars.
    pub(crate) fn callback(&self) -> ProgressCallback {
        let multi = self.multi.clone();
        let bars = Arc::clone(&self.bars);
        Arc::new(move |progress: &DownloadProgress| {
            let mut bars = bars.lock().unwrap_or_else(PoisonError::into_inner);
            let bar = bars
                .entry((progress.file_id.clone(), progress.file_date))
                .or_insert_with(|| multi.add(new_bar(progress)));
            if bar.is_finished() {
                return;
            }
            bar.set_position(progress.bytes_downloaded);
            if progress
                .total_bytes
                .is_some_and(|total| progress.bytes_downloaded >= total)
            {
                bar.finish_and_clear();
            }
        })
    }

    /// Clears bars of files that never reached their size.
    pub(crate) fn finish(&self) {
        let bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        for bar in bars.values() {
            if !bar.is_finished() {
                bar.finish_and_clear();
            }
        }
    }
}

fn new_bar(progress: &DownloadProgress) -> ProgressBar {
    let label = match progress.file_date {
        Some(date) => format!("{}_{}", progress.file_id, file_datetime(date)),
        None => progress.file_id.clone(),
    };
    let bar = match progress.total_bytes {
        Some(total) => ProgressBar::new(total).with_style(
            ProgressStyle::with_template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        ),
        None => ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template(SPINNER_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        ),
    };
    bar.set_prefix(label);
    bar
}

/// Prints a value as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Prints the outcome of a single download.
pub(crate) fn print_result(result: &DownloadResult) {
    println!("{} {}: {}", result.file_id, result.file_date, result.status);
    println!("  Path: {}", result.local_path.display());
    if result.file_size_bytes > 0 {
        println!("  Size: {}", format_bytes(result.file_size_bytes));
    }
    if result.bytes_downloaded > 0 {
        println!(
            "  Transferred: {} in {:.1}s",
            format_bytes(result.bytes_downloaded),
            result.elapsed_seconds
        );
    }
    if let Some(error) = &result.error_message {
        println!("  Error: {error}");
    }
}

/// Prints a batch summary.
pub(crate) fn print_report(report: &BatchReport) {
    println!(
        "\nBatch download complete: {} {} -> {}",
        report.group_id, report.start_date, report.end_date
    );
    println!("  Total files:  {}", report.total_files);
    println!("  Downloaded:   {}", report.successful_downloads);
    println!("  Skipped:      {}", report.skipped_downloads);
    println!("  Failed:       {}", report.failed_downloads);
    if report.cancelled_downloads > 0 {
        println!("  Cancelled:    {}", report.cancelled_downloads);
    }
    println!("  Success rate: {:.1}%", report.success_rate);
    println!(
        "  Transferred:  {} in {} ({}/s)",
        format_bytes(report.total_bytes),
        report.total_time_formatted,
        format_bytes(report.throughput_bytes_per_second as u64)
    );
    if !report.failed_files.is_empty() {
        println!("  Failed files:");
        for id in &report.failed_files {
            println!("    {id}");
        }
    }
}
