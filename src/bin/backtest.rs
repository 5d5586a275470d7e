use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use trend_cluster_bot::backtesting::store::{self, RunArtifacts};
use trend_cluster_bot::backtesting::{BacktestReport, BacktestSimulator};
use trend_cluster_bot::config::Config;
use trend_cluster_bot::exchange::{collect_bars, HistoricalSource};
use trend_cluster_bot::strategies::StrategyFactory;

/// Usage: backtest [DATA_FILE] [START_RFC3339] [END_RFC3339]
#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.log_level.to_lowercase()));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    cfg.validate().context("invalid configuration")?;

    let args: Vec<String> = std::env::args().collect();
    let data_file = args.get(1).cloned().unwrap_or_else(|| cfg.data_file.clone());
    let start = parse_bound(args.get(2))?;
    let end = parse_bound(args.get(3))?;

    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║          ADAPTIVE TREND CLUSTER — BACKTESTER             ║");
    println!("╠══════════════════════════════════════════════════════════╣");
    println!("  Symbol:     {}", cfg.symbol);
    println!("  Data:       {}", data_file);
    println!("  Factors:    {} to {} step {}", cfg.min_factor, cfg.max_factor, cfg.factor_step);
    println!("  Cluster:    {}", cfg.cluster_choice);
    println!("  Balance:    ${:.2}", cfg.initial_balance);
    println!("╚══════════════════════════════════════════════════════════╝");
    println!();

    let source = HistoricalSource::from_file(&cfg.symbol, &data_file)
        .await?
        .with_range(start, end);
    let bars = collect_bars(source).await?;

    if bars.len() < cfg.warmup_bars() {
        println!(
            "ERROR: {} bars loaded, at least {} needed before any signal can fire",
            bars.len(),
            cfg.warmup_bars()
        );
        return Ok(());
    }
    info!("Loaded {} bars", bars.len());

    let factory = StrategyFactory::with_defaults();
    let simulator = BacktestSimulator::new(&cfg, &factory).context("building simulator")?;
    let result = simulator.run(&bars);

    let report = BacktestReport::from_result(&result, cfg.annualization_factor);
    report.print_summary();

    let report_file = store::output_path(&cfg, &result, "backtest", "txt");
    store::save_report_to_file(&report, &report_file)?;
    println!("\nReport saved to: {}", report_file.display());

    let run_file = store::output_path(&cfg, &result, "run", "json");
    RunArtifacts::new(&cfg, result).save(&run_file)?;
    println!("Trades and equity saved to: {}", run_file.display());

    Ok(())
}

fn parse_bound(arg: Option<&String>) -> Result<Option<DateTime<Utc>>> {
    arg.map(|s| {
        DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .with_context(|| format!("bad timestamp `{}`", s))
    })
    .transpose()
}
