//! Availability command implementation.

use crate::commands::ConnectionArgs;
use crate::display::{OutputFormat, print_json};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;
use dataquery_lib::AvailabilityInfo;
use dataquery_lib::prelude::*;

#[derive(Args)]
pub(crate) struct AvailabilityArgs {
    /// File group identifier
    file_id: String,

    /// First date (YYYYMMDD or YYYY-MM-DD)
    start_date: String,

    /// Last date, inclusive. Defaults to the first date
    end_date: Option<String>,

    /// Skip Saturdays and Sundays
    #[arg(long)]
    weekdays_only: bool,
}

/// Print availability of a file for each date of a range.
pub(crate) async fn availability(
    connection: &ConnectionArgs,
    args: AvailabilityArgs,
    output: OutputFormat,
) -> Result<()> {
    let end = args.end_date.as_deref().unwrap_or(&args.start_date);
    let range = DateRange::parse(&args.start_date, end)?;
    let client = connection.client()?;

    let dates: Vec<NaiveDate> = if args.weekdays_only {
        range.weekdays().collect()
    } else {
        range.days().collect()
    };

    let mut entries: Vec<AvailabilityInfo> = Vec::with_capacity(dates.len());
    for date in dates {
        let info = client
            .check_availability(&args.file_id, date)
            .await
            .with_context(|| format!("Availability check failed for {date}"))?;
        entries.push(info);
    }

    match output {
        OutputFormat::Json => print_json(&entries)?,
        OutputFormat::Text => {
            let available = entries.iter().filter(|e| e.is_available).count();
            for entry in &entries {
                println!(
                    "{}  {:<13}  {}",
                    entry.file_datetime,
                    if entry.is_available {
                        "available"
                    } else {
                        "not available"
                    },
                    entry.file_name.as_deref().unwrap_or("-")
                );
            }
            println!("\n{available} of {} dates available", entries.len());
        }
    }
    Ok(())
}
