mod config;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use comfy_table::{Cell, ContentArrangement, Table};
use sessionr_core::{
    NullExecutionAdapter, NullFeedAdapter, QualityChecker, SessionRuntime,
};
use sessionr_data::{BarStore, Interval, TradingCalendar};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sessionr")]
#[command(about = "Market-data session runtime", long_about = None)]
struct Cli {
    /// Path to the historical bar store
    #[arg(long)]
    store: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a session from a config file
    Run {
        /// Path to the session config (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Validate a session config without starting anything
    Validate {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Expected bar count for a date range and interval
    ExpectedBars {
        #[arg(long)]
        from: NaiveDate,

        #[arg(long)]
        to: NaiveDate,

        #[arg(long, default_value = "1m")]
        interval: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let process = config::ProcessConfig::load()?;
    let store_path = cli.store.clone().unwrap_or(process.store_path.clone());

    match &cli.command {
        Commands::Run { config: path } => {
            let path = path.clone().unwrap_or(process.session_config_path.clone());
            handle_run(&store_path, &path)
        }
        Commands::Validate { config: path } => {
            let path = path.clone().unwrap_or(process.session_config_path.clone());
            let session_config = config::load_session_config(&path)?;
            println!(
                "ok: session '{}', base interval {}",
                session_config.session_name,
                session_config.base_interval()?
            );
            Ok(())
        }
        Commands::ExpectedBars { from, to, interval } => {
            let interval: Interval = interval
                .parse()
                .map_err(|e| anyhow::anyhow!("bad interval: {e}"))?;
            handle_expected_bars(&store_path, *from, *to, interval)
        }
    }
}

fn open_calendar(store: &BarStore, exchange_group: &str) -> Result<Arc<TradingCalendar>> {
    let calendar = TradingCalendar::us_equities();
    let days = store
        .load_calendar_days(exchange_group)
        .context("failed to load calendar table")?;
    if days.is_empty() {
        info!("calendar table empty; weekday defaults in effect");
    } else {
        calendar.refresh(days);
    }
    Ok(Arc::new(calendar))
}

fn handle_run(store_path: &PathBuf, config_path: &PathBuf) -> Result<()> {
    let session_config = config::load_session_config(config_path)?;
    info!(
        session = session_config.session_name.as_str(),
        mode = ?session_config.mode,
        "starting session runtime"
    );

    let store = Arc::new(BarStore::new_file(store_path).context("failed to open bar store")?);
    let calendar = open_calendar(&store, &session_config.exchange_group)?;

    let runtime = SessionRuntime::launch(
        session_config,
        store,
        Arc::new(NullFeedAdapter::new()),
        Arc::new(NullExecutionAdapter),
        calendar,
    )?;

    print_init_report(runtime.init_reports());
    runtime.join();
    Ok(())
}

fn print_init_report(reports: &[sessionr_core::SymbolReport]) {
    let mut table = Table::new();
    table
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Symbol", "Status", "Quality", "Reason"]);
    for report in reports {
        table.add_row(vec![
            Cell::new(&report.symbol),
            Cell::new(if report.outcome.success { "loaded" } else { "failed" }),
            Cell::new(
                report
                    .quality
                    .map(|q| format!("{q:.1}"))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(report.outcome.reason.as_deref().unwrap_or("")),
        ]);
    }
    println!("{table}");
}

fn handle_expected_bars(
    store_path: &PathBuf,
    from: NaiveDate,
    to: NaiveDate,
    interval: Interval,
) -> Result<()> {
    let store = BarStore::new_file(store_path).context("failed to open bar store")?;
    let calendar = open_calendar(&store, "us_equities")?;
    let checker = QualityChecker::new(calendar);
    let expected = checker.expected_bars(from, to, interval);
    println!("{expected}");
    Ok(())
}
