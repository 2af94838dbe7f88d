//! dataquery CLI - parallel file downloads from the DataQuery API.

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod display;

use commands::ConnectionArgs;
use commands::availability::AvailabilityArgs;
use commands::download::DownloadArgs;
use commands::download_group::DownloadGroupArgs;
use display::OutputFormat;

#[derive(Parser)]
#[command(name = "dataquery")]
#[command(about = "Parallel file downloads from the DataQuery API", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    connection: ConnectionArgs,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (suppress progress output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format for results
    #[arg(long, value_enum, default_value = "text", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Download one file for one date
    Download(DownloadArgs),

    /// Download files of a group over a date range
    DownloadGroup(DownloadGroupArgs),

    /// Check file availability over a date range
    Availability(AvailabilityArgs),
}

/// Logs go to stderr so that results on stdout stay machine readable.
///
/// `RUST_LOG` wins over `-v`; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing(verbose: u8, quiet: bool) {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let default_level = match (quiet, verbose) {
        (true, _) => "dataquery=warn",
        (false, 0) => "dataquery=info",
        (false, 1) => "dataquery=debug",
        (false, _) => "dataquery=trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    // Show help if no command provided
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Commands::Download(args) => {
            commands::download::download(&cli.connection, args, cli.output, cli.quiet).await
        }
        Commands::DownloadGroup(args) => {
            commands::download_group::download_group(&cli.connection, args, cli.output, cli.quiet)
                .await
        }
        Commands::Availability(args) => {
            commands::availability::availability(&cli.connection, args, cli.output).await
        }
    }
}
