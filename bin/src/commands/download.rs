//! Download command implementation.
//!
//! Fetches one file for one date as concurrent byte ranges.

use crate::commands::ConnectionArgs;
use crate::display::{OutputFormat, ProgressDisplay, print_json, print_result};
use anyhow::{Context, Result, bail};
use clap::Args;
use dataquery_lib::prelude::*;
use dataquery_lib::{local_file_name, parse_file_datetime};
use std::path::PathBuf;

#[derive(Args)]
pub(crate) struct DownloadArgs {
    /// File group identifier
    file_id: String,

    /// File date (YYYYMMDD or YYYY-MM-DD)
    date: String,

    /// Output directory. Defaults to DATAQUERY_DOWNLOAD_DIR or ./downloads
    #[arg(short = 'd', long)]
    output_dir: Option<PathBuf>,

    /// Number of byte-range parts
    #[arg(long, default_value = "5")]
    num_parts: usize,

    /// Local file extension, including the dot. Defaults to the file id's
    /// own extension, or .bin
    #[arg(long)]
    extension: Option<String>,

    /// Replace an existing file
    #[arg(long)]
    overwrite: bool,

    /// Remove the partial file after a failure
    #[arg(long)]
    delete_partial: bool,
}

/// Download a single file.
pub(crate) async fn download(
    connection: &ConnectionArgs,
    args: DownloadArgs,
    output: OutputFormat,
    quiet: bool,
) -> Result<()> {
    let date = parse_file_datetime(&args.date)
        .with_context(|| format!("Invalid file date: {}", args.date))?;
    let client = connection.client()?;

    let dir = args
        .output_dir
        .unwrap_or_else(|| client.config().download_dir.clone());
    let destination = dir.join(
        local_file_name(&args.file_id, date, args.extension.as_deref())
            .context("Cannot derive a local file name")?,
    );
    let url = client
        .urls()
        .download(&args.file_id, date)
        .context("Failed to build download URL")?;

    let downloader = client.file_downloader(FileDownloadConfig {
        parts_per_file: args.num_parts.max(1),
        overwrite: args.overwrite,
        partial_file_policy: if args.delete_partial {
            PartialFilePolicy::Delete
        } else {
            PartialFilePolicy::Keep
        },
        ..FileDownloadConfig::default()
    });
    let request = FileRequest {
        file_id: args.file_id,
        file_date: date,
        url,
        destination,
    };

    let display = ProgressDisplay::new(quiet);
    let result = tokio::select! {
        result = downloader.download(&request, Some(display.callback())) => result,
        _ = tokio::signal::ctrl_c() => {
            display.finish();
            bail!("Interrupted; partial data left at {}.part", request.destination.display());
        }
    };
    display.finish();

    match output {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => print_result(&result),
    }

    if result.is_failed() {
        bail!(
            "Download of {} failed: {}",
            result.file_id,
            result.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}
