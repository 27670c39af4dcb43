//! CLI definition, composition root and command runners.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};

use crate::adapters::csv_adapter::ProviderLayouts;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::http_source_adapter::{HttpSourceAdapter, DEFAULT_USER_AGENT};
use crate::adapters::json_store_adapter::JsonStoreAdapter;
use crate::domain::asset::AssetCatalogue;
use crate::domain::config_validation::validate_config;
use crate::domain::error::DcaError;
use crate::domain::refresh_policy::RefreshPolicy;
use crate::domain::request::{RawSimulationRequest, SimulationRequest};
use crate::domain::series::ReturnMode;
use crate::logging::{self, LogConfig};
use crate::ports::config_port::ConfigPort;
use crate::services::comparison::{run_comparison, ComparisonReport};
use crate::services::fetcher::{SourceFetcher, DEFAULT_MIN_ROWS};
use crate::services::refresh::RefreshOrchestrator;
use crate::services::store::{RegressionGuard, SeriesStore};

pub const DEFAULT_CACHE_DIR: &str = "data/market-cache";

#[derive(Parser, Debug)]
#[command(name = "dcalab", about = "Dollar-cost averaging backtests over cached index history")]
pub struct Cli {
    /// INI configuration file; built-in defaults apply when absent
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compare DCA outcomes for one or two assets
    Simulate {
        /// Asset ids, e.g. sp500 nasdaq100
        #[arg(required = true, num_args = 1..)]
        assets: Vec<String>,
        #[arg(short, long, default_value = "total_return")]
        mode: String,
        #[arg(short, long, default_value = "monthly")]
        frequency: String,
        #[arg(short, long, default_value = "monthly")]
        precision: String,
        /// First contribution date (YYYY-MM-DD)
        #[arg(short, long)]
        start: String,
        /// Amount invested per contribution
        #[arg(short, long)]
        amount: f64,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Load the cache and refresh every series once
    Refresh,
    /// Show cached date ranges per series
    Info,
    /// Keep the cache refreshed on the configured schedule until interrupted
    Watch,
}

pub fn run(cli: Cli) -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to start runtime: {e}");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(dispatch(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode, DcaError> {
    let orchestrator = prepare(cli.config.as_deref(), cli.verbose)?;
    match cli.command {
        Command::Simulate {
            assets,
            mode,
            frequency,
            precision,
            start,
            amount,
            json,
        } => {
            let raw = RawSimulationRequest {
                assets,
                return_mode: Some(mode),
                frequency: Some(frequency),
                precision: Some(precision),
                start_date: Some(start),
                amount: Some(amount),
            };
            run_simulate(&orchestrator, &raw, json).await
        }
        Command::Refresh => run_refresh(&orchestrator).await,
        Command::Info => run_info(&orchestrator).await,
        Command::Watch => run_watch(&orchestrator).await,
    }
}

/// A missing path means an empty configuration.
pub fn load_config(path: Option<&Path>) -> Result<FileConfigAdapter, DcaError> {
    match path {
        Some(path) => FileConfigAdapter::from_file(path),
        None => Ok(FileConfigAdapter::empty()),
    }
}

fn prepare(config_path: Option<&Path>, verbose: u8) -> Result<RefreshOrchestrator, DcaError> {
    let config = load_config(config_path)?;
    validate_config(&config)?;
    logging::init(&LogConfig::from_config(&config)?.with_verbosity(verbose))?;
    if let Some(path) = config_path {
        info!(path = %path.display(), "loaded configuration");
    }
    build_orchestrator(&config)
}

/// Wires the HTTP source, the JSON cache and the built-in catalogue.
pub fn build_orchestrator(config: &dyn ConfigPort) -> Result<RefreshOrchestrator, DcaError> {
    let user_agent = config
        .get_string("fetch", "user_agent")
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
    let source = Arc::new(HttpSourceAdapter::new(&user_agent)?);

    let min_rows = usize::try_from(config.get_int("fetch", "min_rows", DEFAULT_MIN_ROWS as i64))
        .unwrap_or(DEFAULT_MIN_ROWS);
    let fetcher = SourceFetcher::new(source, ProviderLayouts::from_config(config), min_rows);

    let cache_dir = config
        .get_string("cache", "dir")
        .unwrap_or_else(|| DEFAULT_CACHE_DIR.to_string());
    let guard = RegressionGuard::new(config.get_double(
        "cache",
        "min_retained_ratio",
        RegressionGuard::DEFAULT_MIN_RETAINED_RATIO,
    ));
    let repository = JsonStoreAdapter::new(cache_dir);
    debug!(dir = %repository.dir().display(), ratio = guard.min_retained_ratio, "series cache");
    let store = SeriesStore::with_guard(Arc::new(repository), guard);

    Ok(RefreshOrchestrator::new(
        AssetCatalogue::builtin(),
        fetcher,
        store,
        RefreshPolicy::from_config(config),
    ))
}

async fn run_simulate(
    orchestrator: &RefreshOrchestrator,
    raw: &RawSimulationRequest,
    json: bool,
) -> Result<ExitCode, DcaError> {
    let request = SimulationRequest::validate(raw, orchestrator.catalogue())?;
    let report = run_comparison(orchestrator, &request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_refresh(orchestrator: &RefreshOrchestrator) -> Result<ExitCode, DcaError> {
    orchestrator.warm_up().await;
    let report = orchestrator.refresh_all("manual").await;
    eprintln!(
        "refreshed {} series, {} failed",
        report.completed, report.failed
    );
    if report.failed > 0 {
        return Ok(ExitCode::from(3));
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_info(orchestrator: &RefreshOrchestrator) -> Result<ExitCode, DcaError> {
    let store = orchestrator.store();
    for key in orchestrator.catalogue().keys() {
        match store.get(&key).await {
            Some(series) => println!(
                "{key}: {} rows, {} to {} ({}{}, {}, fetched {})",
                series.len(),
                series.earliest_date(),
                series.latest_date(),
                series.resolved_return_mode(),
                if series.is_estimated() { " estimated" } else { "" },
                series.meta.provider,
                series.meta.fetched_at.format("%Y-%m-%d %H:%M UTC"),
            ),
            None => println!("{key}: no cached data"),
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_watch(orchestrator: &RefreshOrchestrator) -> Result<ExitCode, DcaError> {
    let loaded = orchestrator.warm_up().await;
    let scheduler = orchestrator.spawn_scheduler();
    eprintln!(
        "watching {loaded} cached series, sweeping every {}s (Ctrl-C to stop)",
        orchestrator.policy().interval.as_secs()
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not listen for Ctrl-C, stopping");
    }
    scheduler.abort();
    info!("watch stopped");
    Ok(ExitCode::SUCCESS)
}

fn fmt_opt_pct(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}%"))
}

/// Plain-text rendering of a comparison.
pub fn render_report(report: &ComparisonReport) -> String {
    let request = &report.request;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} | {} | {} {:.2} | {} to {}",
        request.assets.join(" vs "),
        request.return_mode,
        request.frequency,
        request.amount,
        report.effective_start_date,
        report.end_date,
    );
    for warning in &report.warnings {
        let _ = writeln!(out, "warning: {warning}");
    }

    for run in &report.series {
        let summary = &run.simulation.summary;
        let basis = match (run.resolved_return_mode, run.is_estimated) {
            (ReturnMode::TotalReturn, true) => "estimated total return",
            (ReturnMode::TotalReturn, false) => "total return",
            (ReturnMode::Price, _) => "price",
        };
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{} ({}, {}, {basis})",
            run.asset_name, run.symbol, run.provider
        );
        let _ = writeln!(
            out,
            "  contributions {}  invested {:.2}  value {:.2}  P/L {:.2} ({:.2}%)",
            summary.total_contributions,
            summary.total_invested,
            summary.ending_value,
            summary.profit_loss,
            summary.total_return_pct,
        );
        let _ = write!(out, "  max drawdown {:.2}%", summary.max_drawdown_pct);
        if let (Some(peak), Some(trough)) =
            (summary.max_drawdown_peak_date, summary.max_drawdown_trough_date)
        {
            let _ = write!(out, " ({peak} to {trough})");
        }
        match (summary.drawdown_recovery_date, summary.drawdown_recovery_days) {
            (Some(date), Some(days)) => {
                let _ = writeln!(out, ", recovered {date} after {days} days");
            }
            _ if summary.max_drawdown_pct < 0.0 => {
                let _ = writeln!(out, ", not recovered");
            }
            _ => {
                let _ = writeln!(out);
            }
        }
        let _ = writeln!(
            out,
            "  volatility {:.2}%  annualized return {}",
            summary.annualized_volatility_pct,
            fmt_opt_pct(run.annualized_return.map(|r| r * 100.0)),
        );
    }
    out
}
