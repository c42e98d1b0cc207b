//! SwapFetch CLI: fetch a range of days of Uniswap V3 swaps into CSV files.
//!
//! Usage: `swapfetch <START_DATE> <DAYS> [--config FILE] [--output-dir DIR]
//! [--concurrency K] [--force]`
//!
//! One file per day under `<output-dir>/<protocol>/swaps_<date>.csv`. Days that
//! already have a file are skipped, so re-running after a partial failure
//! only fetches what is missing. Exits 1 if any day failed.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use swapfetch_core::data::circuit_breaker::BreakerState;
use swapfetch_core::data::{
    daily_windows, parse_start_date, BatchFetcher, CircuitBreaker, CsvStore, FetchSummary,
    PlaygroundsClient, SubgraphClient,
};
use swapfetch_core::FetchConfig;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "swapfetch",
    about = "SwapFetch: daily Uniswap V3 swaps from the subgraph into CSV"
)]
struct Cli {
    /// First day to fetch (YYYY-MM-DD).
    start_date: String,

    /// Number of consecutive days to fetch.
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    days: u32,

    /// TOML config file. Defaults apply for anything it leaves out.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root output directory (overrides the config file).
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Maximum days fetched at once (overrides the config file).
    #[arg(long)]
    concurrency: Option<usize>,

    /// Re-fetch days whose file already exists.
    #[arg(long, default_value_t = false)]
    force: bool,

    /// Playgrounds API key.
    #[arg(long, env = "PLAYGROUNDS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config(&cli)?;
    let start = parse_start_date(&cli.start_date)?;
    let windows = daily_windows(start, cli.days)?;

    let store = CsvStore::new(&config.output_dir, &config.protocol);
    store.ensure_dir()?;

    let stored = store.fetched_dates()?;
    let pending = if config.force {
        windows.len()
    } else {
        store.missing(&windows).len()
    };

    let circuit_breaker = Arc::new(CircuitBreaker::default_subgraph());
    let client = PlaygroundsClient::new(
        config.subgraph.endpoint(),
        Arc::clone(&circuit_breaker),
        config.client_options(),
    );
    info!(
        client = client.name(),
        endpoint = %client.endpoint().url,
        days = windows.len(),
        pending,
        stored = stored.len(),
        concurrency = config.concurrency,
        output = %store.dir().display(),
        "starting fetch"
    );

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling outstanding days");
            on_ctrl_c.cancel();
        }
    });

    let summary = BatchFetcher::new(&client, &store, &config)
        .with_cancellation(cancel)
        .run(&windows)
        .await;

    print_summary(&summary, &circuit_breaker);

    Ok(if summary.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn load_config(cli: &Cli) -> Result<FetchConfig> {
    let mut config = match &cli.config {
        Some(path) => FetchConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => FetchConfig::default(),
    };

    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(k) = cli.concurrency {
        config.concurrency = k;
    }
    if cli.force {
        config.force = true;
    }
    if cli.api_key.is_some() {
        config.subgraph.api_key = cli.api_key.clone();
    }

    config.validate().context("invalid settings")?;
    Ok(config)
}

fn print_summary(summary: &FetchSummary, circuit_breaker: &CircuitBreaker) {
    println!();
    println!("=== Fetch Summary ===");
    println!("Days:       {}", summary.total);
    println!("Written:    {} ({} rows)", summary.written, summary.rows);
    println!("Skipped:    {}", summary.skipped);
    println!("Failed:     {}", summary.failed);
    if summary.cancelled > 0 {
        println!("Cancelled:  {}", summary.cancelled);
    }
    for (date, err) in summary.failures() {
        println!("  FAIL {date}: {err}");
    }
    if let BreakerState::Open { .. } = circuit_breaker.state() {
        println!(
            "Endpoint paused by circuit breaker, retry in {}s",
            circuit_breaker.remaining_cooldown().as_secs()
        );
    }
    println!(
        "Async queries completed in {:.2}s",
        summary.elapsed.as_secs_f64()
    );
}
