//! CLI entry point for the daily aggregation job.
//!
//! Fetches the day's self-report export, merges it into the published CSV
//! datasets and writes the last-update marker. Any failure ends the process
//! with a non-zero status so the scheduler marks the step as failed.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use daily_aggregator::{
    config::Config,
    fetch::{
        BasicClient, auth::UrlParam, fetch_daily_changes, fetch_geocoding, parse_daily_changes,
        read_source,
    },
    geocoding::Geocoder,
    reports::{finish_geocoding, run_reports},
    store,
    types::{DailyChange, daystamp},
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "daily_aggregator")]
#[command(about = "Merges the daily self-report export into CSV datasets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch today's export and rebuild all datasets
    Run {
        /// Day to aggregate (defaults to today, local time)
        #[arg(short, long, value_name = "YYYY-MM-DD")]
        date: Option<NaiveDate>,

        /// Directory holding the datasets (overrides DATA_DIR)
        #[arg(short = 'D', long)]
        data_dir: Option<PathBuf>,

        /// Read change records from this file or URL instead of the export
        #[arg(short, long, value_name = "FILE_OR_URL")]
        changes: Option<String>,

        /// Write postal codes without coordinates back to the side file
        #[arg(long, default_value_t = false)]
        persist_unknown: bool,
    },
    /// Download the export for one day and save it as JSON
    Fetch {
        /// Day to download (defaults to today, local time)
        #[arg(short, long, value_name = "YYYY-MM-DD")]
        date: Option<NaiveDate>,

        /// File to write the records to
        #[arg(short, long, default_value = "daily_changes.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/daily_aggregator.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("daily_aggregator.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(env_filter("RUST_LOG", "info"));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(env_filter("RUST_LOG_JSON", "debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = format!("{e:#}");
            error!(error = %message, "Daily aggregation failed");
            if std::env::var("GITHUB_ACTIONS").as_deref() == Ok("true") {
                println!("::error::{message}");
            }
            ExitCode::FAILURE
        }
    }
}

fn env_filter(var: &str, default: &str) -> EnvFilter {
    EnvFilter::try_from_env(var).unwrap_or_else(|_| EnvFilter::new(default))
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env()?;

    match cli.command {
        Commands::Run {
            date,
            data_dir,
            changes,
            persist_unknown,
        } => {
            let config = match data_dir {
                Some(dir) => config.with_data_dir(dir),
                None => config,
            };
            let today = date.unwrap_or_else(|| Local::now().date_naive());
            aggregate_day(&config, today, changes.as_deref(), persist_unknown).await?;
        }
        Commands::Fetch { date, output } => {
            let today = date.unwrap_or_else(|| Local::now().date_naive());
            let changes = load_changes(&config, today, None).await?;
            let json = serde_json::to_vec_pretty(&changes)?;
            store::write_atomic(&output, &json)?;
            info!(path = %output.display(), records = changes.len(), "Daily export saved");
        }
    }

    Ok(())
}

/// Runs the whole job for one day.
#[tracing::instrument(skip_all, fields(today = %today, persist_unknown))]
async fn aggregate_day(
    config: &Config,
    today: NaiveDate,
    source: Option<&str>,
    persist_unknown: bool,
) -> Result<()> {
    info!(daystamp = %daystamp(today), "Starting daily aggregation");

    let changes = load_changes(config, today, source).await?;

    let mut geocoder = match &config.geocoding_url {
        Some(url) => {
            let table = fetch_geocoding(&BasicClient::new(), url, config.geocoding_format).await?;
            let unknown = store::load_locators(&config.unknown_geocoding_path())?;
            Some(Geocoder::new(table, unknown))
        }
        None => None,
    };

    let summary = run_reports(config, &changes, geocoder.as_mut(), today)?;

    if let Some(geocoder) = &geocoder {
        finish_geocoding(config, geocoder, persist_unknown)?;
    }

    info!(
        merged_rows = summary.merged_rows,
        carried = summary.carried,
        daily_rows = summary.daily_rows,
        rolling_rows = summary.rolling_rows,
        unknown_locators = summary.unknown_locators,
        "Done"
    );
    Ok(())
}

/// Change records for `today`, from `source` when given, else from the export.
async fn load_changes(
    config: &Config,
    today: NaiveDate,
    source: Option<&str>,
) -> Result<Vec<DailyChange>> {
    match source {
        Some(source) => {
            let bytes = read_source(&BasicClient::new(), source).await?;
            parse_daily_changes(&bytes)
                .with_context(|| format!("Invalid change records in '{source}'"))
        }
        None => {
            let client = UrlParam::token(BasicClient::new(), config.export_token.clone());
            fetch_daily_changes(&client, &config.export_url, &daystamp(today)).await
        }
    }
}
