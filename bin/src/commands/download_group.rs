//! Download-group command implementation.
//!
//! Downloads every file of a group for every date of a range, with bounded
//! file concurrency and a summary report at the end.

use crate::commands::ConnectionArgs;
use crate::display::{OutputFormat, ProgressDisplay, print_json, print_report};
use anyhow::{Context, Result, bail};
use clap::Args;
use dataquery_lib::prelude::*;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

#[derive(Args)]
pub(crate) struct DownloadGroupArgs {
    /// Group identifier
    group_id: String,

    /// First date (YYYYMMDD or YYYY-MM-DD)
    start_date: String,

    /// Last date, inclusive (YYYYMMDD or YYYY-MM-DD)
    end_date: String,

    /// Destination directory. Defaults to DATAQUERY_DOWNLOAD_DIR or ./downloads
    destination: Option<PathBuf>,

    /// File to download; repeat for several. Defaults to every file of the group
    #[arg(long = "file-id")]
    file_ids: Vec<String>,

    /// Files downloaded at the same time
    #[arg(long, default_value = "3")]
    max_concurrent: usize,

    /// Byte-range parts per file
    #[arg(long, default_value = "5")]
    num_parts: usize,

    /// Seconds to wait between starting files
    #[arg(long)]
    delay: Option<f64>,

    /// Skip Saturdays and Sundays
    #[arg(long)]
    weekdays_only: bool,

    /// Local file extension, including the dot. Defaults to the file id's
    /// own extension, or .bin
    #[arg(long)]
    extension: Option<String>,

    /// Write files directly into the destination, not a group subdirectory
    #[arg(long)]
    flat: bool,

    /// Replace existing files
    #[arg(long)]
    overwrite: bool,

    /// Remove partial files after failures
    #[arg(long)]
    delete_partial: bool,

    /// Also write the JSON report to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

/// Download a group over a date range.
pub(crate) async fn download_group(
    connection: &ConnectionArgs,
    args: DownloadGroupArgs,
    output: OutputFormat,
    quiet: bool,
) -> Result<()> {
    let range = DateRange::parse(&args.start_date, &args.end_date)?;
    let schedule_delay = args
        .delay
        .map(Duration::try_from_secs_f64)
        .transpose()
        .context("Invalid --delay")?;
    let client = connection.client()?;

    let file_config = FileDownloadConfig {
        parts_per_file: args.num_parts.max(1),
        overwrite: args.overwrite,
        partial_file_policy: if args.delete_partial {
            PartialFilePolicy::Delete
        } else {
            PartialFilePolicy::Keep
        },
        ..FileDownloadConfig::default()
    };
    let batch_config = BatchConfig {
        max_concurrent_files: args.max_concurrent.max(1),
        schedule_delay,
        weekdays_only: args.weekdays_only,
        extension: args.extension,
        group_subdirectory: !args.flat,
    };
    let batch = client.batch_downloader(file_config, batch_config);

    let file_ids = if args.file_ids.is_empty() {
        batch
            .resolve_file_ids(&args.group_id)
            .await
            .with_context(|| format!("Failed to list files of group {}", args.group_id))?
    } else {
        args.file_ids
    };
    if file_ids.is_empty() {
        bail!("Group {} has no files", args.group_id);
    }

    let request = BatchRequest {
        group_id: args.group_id,
        file_ids,
        range,
        destination_dir: args
            .destination
            .unwrap_or_else(|| client.config().download_dir.clone()),
    };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl+C received, finishing files in flight");
                cancel.cancel();
            }
        }
    });

    let display = ProgressDisplay::new(quiet);
    let report = batch.run(&request, Some(display.callback()), cancel).await;
    display.finish();

    if let Some(path) = &args.report {
        let file = File::create(path)
            .with_context(|| format!("Failed to create report {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &report)?;
    }
    match output {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => print_report(&report),
    }

    if report.cancelled_downloads > 0 {
        bail!(
            "Interrupted: {} of {} files not started",
            report.cancelled_downloads,
            report.total_files
        );
    }
    if !report.is_success() {
        bail!(
            "{} out of {} downloads failed",
            report.failed_downloads,
            report.attempted_downloads()
        );
    }
    Ok(())
}
