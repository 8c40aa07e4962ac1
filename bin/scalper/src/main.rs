use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use common::{Config, OrderGateway, TradingMode};
use engine::bybit::{fetch_klines, BybitClient, BybitStream};
use engine::{BacktestDriver, ExecutionRouter, Ledger, Trader};
use paper::SimulatedGateway;
use strategy::{EmaScalper, RunConfig};

#[derive(Parser)]
#[command(name = "scalper", version, about = "EMA-crossover spot scalper for Bybit")]
struct Cli {
    /// Execution mode.
    #[arg(long, value_enum, default_value_t = Mode::DryRun)]
    mode: Mode,

    /// Override the trading pair from the run config, e.g. BTCUSDT.
    #[arg(long)]
    pair: Option<String>,

    /// Override the candle timeframe from the run config, e.g. 1m.
    #[arg(long)]
    timeframe: Option<String>,

    /// Path to the TOML run config (default: $RUN_CONFIG_PATH or
    /// config/scalper.toml).
    #[arg(long)]
    config: Option<String>,

    /// Historical bars to replay in backtest mode (up to 1000).
    #[arg(long, default_value_t = 1000)]
    bars: usize,

    /// Write the backtest summary as JSON to this path.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Live,
    DryRun,
    Backtest,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Live => write!(f, "live"),
            Mode::DryRun => write!(f, "dry-run"),
            Mode::Backtest => write!(f, "backtest"),
        }
    }
}

impl From<Mode> for TradingMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Live => TradingMode::Live,
            Mode::DryRun => TradingMode::DryRun,
            Mode::Backtest => TradingMode::Backtest,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let cli = Cli::parse();
    let cfg = Config::from_env();

    let mut run_cfg = RunConfig::load(cli.config.as_deref().unwrap_or(&cfg.run_config_path));
    if let Some(pair) = cli.pair {
        run_cfg.pair = pair;
    }
    if let Some(timeframe) = cli.timeframe {
        run_cfg.timeframe = timeframe;
    }
    run_cfg.validate();

    let mode = TradingMode::from(cli.mode);
    info!(
        %mode,
        pair = %run_cfg.pair,
        timeframe = %run_cfg.timeframe,
        fast = run_cfg.strategy.fast_period,
        slow = run_cfg.strategy.slow_period,
        "Spot scalper starting"
    );

    // The only mode-dependent wiring: which sink receives orders.
    let gateway: Arc<dyn OrderGateway> = match mode {
        TradingMode::Live => {
            let (key, secret) = cfg.credentials();
            info!("Live mode — orders go to Bybit");
            Arc::new(BybitClient::new(key, secret))
        }
        TradingMode::DryRun | TradingMode::Backtest => {
            info!(
                balance = cfg.initial_balance,
                slippage_bps = run_cfg.execution.slippage.bps(),
                "Simulated fills — no real orders"
            );
            Arc::new(SimulatedGateway::new(
                cfg.initial_balance,
                run_cfg.execution.slippage.bps(),
                run_cfg.execution.fee_rate,
            ))
        }
    };

    let mut trader = Trader::new(
        Box::new(EmaScalper::new(&run_cfg.strategy)),
        ExecutionRouter::new(
            gateway,
            run_cfg.sizing,
            Duration::from_secs(cfg.order_timeout_secs),
        ),
        Ledger::new(cfg.initial_balance),
    );

    match mode {
        TradingMode::Backtest => {
            let candles = fetch_klines(&run_cfg.pair, &run_cfg.timeframe, cli.bars)
                .await
                .context("failed to fetch historical klines")?;
            info!(bars = candles.len(), "Historical data loaded");

            let summary = BacktestDriver::new(trader)
                .run(candles)
                .await
                .context("backtest failed")?;
            summary.log();

            if let Some(path) = cli.out {
                std::fs::write(&path, serde_json::to_vec_pretty(&summary)?)
                    .with_context(|| format!("failed to write summary to {}", path.display()))?;
                info!(path = %path.display(), "Summary exported");
            }
        }
        TradingMode::Live | TradingMode::DryRun => {
            let mut feed = BybitStream::new(run_cfg.pair.clone(), &run_cfg.timeframe)?;
            tokio::select! {
                result = trader.run(&mut feed) => result.context("trading loop failed")?,
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received. Exiting.");
                }
            }
        }
    }

    Ok(())
}
