//! tickcache CLI: refresh, lookup, stats and background-run commands.
//!
//! Commands:
//! - `refresh`: run one refresh cycle and print its report
//! - `get SYMBOL`: print the cached points for a symbol
//! - `symbols`: list symbols with stored data
//! - `stats`: print refresh/store statistics and the health verdict
//! - `purge`: delete rows outside the retention window
//! - `probe [SYMBOL]`: one upstream request, no retries
//! - `run`: background refresh loop until stdin closes or a line is entered
//!
//! Configuration comes from `--config FILE` (TOML) and then the environment.
//! Results go to stdout as JSON; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tickcache_core::{AlphaVantageClient, ServiceConfig, Store};
use tickcache_runner::{spot_check, Orchestrator};

/// How long `run` waits for the loop to exit after being told to stop.
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(
    name = "tickcache",
    about = "tickcache: intraday price cache with background refresh"
)]
struct Cli {
    /// Path to a TOML config file. Environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one refresh cycle for every configured symbol.
    Refresh,
    /// Print cached points for a symbol.
    Get {
        symbol: String,
    },
    /// List symbols that have stored data.
    Symbols,
    /// Print statistics and the health verdict.
    Stats,
    /// Delete rows older than the retention window.
    Purge,
    /// Check upstream connectivity with a single request.
    Probe {
        /// Symbol to probe with. Defaults to the first configured symbol.
        symbol: Option<String>,
    },
    /// Run the background refresh loop.
    Run {
        /// Stop after this many cycles instead of waiting for stdin.
        #[arg(long)]
        cycles: Option<u64>,

        /// Random lookups to run after the first cycle.
        #[arg(long, default_value_t = 6)]
        spot_checks: usize,
    },
}

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let orch = build_orchestrator(config)?;

    match cli.command {
        Commands::Refresh => run_refresh(&orch),
        Commands::Get { symbol } => print_json(&orch.get_data(&symbol)),
        Commands::Symbols => print_json(&orch.list_symbols()),
        Commands::Stats => run_stats(&orch),
        Commands::Purge => print_json(&serde_json::json!({ "rows_purged": orch.purge_expired() })),
        Commands::Probe { symbol } => {
            let status = orch.probe(symbol.as_deref());
            print_json(&status)?;
            if !status.reachable {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Run {
            cycles,
            spot_checks,
        } => run_loop(&orch, cycles, spot_checks),
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<ServiceConfig> {
    let mut config = match path {
        Some(p) => ServiceConfig::from_file(p)
            .with_context(|| format!("loading config from {}", p.display()))?,
        None => ServiceConfig::default(),
    };
    config.apply_env(|name| std::env::var(name).ok())?;
    config.validate()?;
    if config.api_key.is_empty() {
        tracing::warn!("no API key configured, upstream requests will be rejected");
    }
    Ok(config)
}

fn build_orchestrator(config: ServiceConfig) -> Result<Arc<Orchestrator>> {
    let store = Store::open_default(&config)
        .with_context(|| format!("opening store at {}", config.db_path().display()))?;
    let client = AlphaVantageClient::from_config(&config).context("building HTTP client")?;
    Ok(Orchestrator::new(config, Arc::new(client), store)?)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_refresh(orch: &Orchestrator) -> Result<()> {
    let report = orch.refresh_cycle();
    print_json(&report)?;
    if !report.success() {
        std::process::exit(1);
    }
    Ok(())
}

fn run_stats(orch: &Orchestrator) -> Result<()> {
    let stats = orch.stats();
    let config = orch.config();
    let health = stats.health(&config.symbols, config.refresh_interval());
    print_json(&serde_json::json!({ "stats": stats, "health": health }))
}

fn run_loop(orch: &Arc<Orchestrator>, cycles: Option<u64>, spot_checks: usize) -> Result<()> {
    orch.start_background_refresh(orch.config().refresh_interval())?;

    let (line_tx, line_rx) = mpsc::channel::<()>();
    thread::Builder::new()
        .name("tickcache-stdin".into())
        .spawn(move || {
            let mut line = String::new();
            let _ = std::io::stdin().lock().read_line(&mut line);
            let _ = line_tx.send(());
        })
        .context("spawning stdin watcher")?;

    eprintln!("Background refresh running. Press Enter or close stdin to stop.");

    let mut spot_checked = false;
    loop {
        match line_rx.recv_timeout(POLL_INTERVAL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let done = orch.stats().refresh.update_count;
        if !spot_checked && done >= 1 && spot_checks > 0 {
            spot_check(orch, spot_checks, &mut rand::thread_rng());
            spot_checked = true;
        }
        if cycles.is_some_and(|n| done >= n) {
            break;
        }
    }

    orch.stop_background_refresh(STOP_TIMEOUT);
    print_json(&orch.stats())
}
