use serde::Serialize;
use tracing::{info, warn};

use common::{Candle, CandleFeed, Fill, HistoryFeed, Result, Signal};

use crate::ledger::ClosedTrade;
use crate::trader::{BarRecord, Trader};

/// Lifecycle of a backtest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    Replaying,
    Finalizing,
    Done,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Init => write!(f, "init"),
            Phase::Replaying => write!(f, "replaying"),
            Phase::Finalizing => write!(f, "finalizing"),
            Phase::Done => write!(f, "done"),
        }
    }
}

/// Aggregate result of a completed backtest. Immutable once produced.
///
/// Metric definitions follow the usual backtest conventions: win rate over
/// closed trades, average win/loss as percentages of entry notional, and
/// max drawdown over the compounded per-trade return curve.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub pair: String,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub win_rate_pct: f64,
    pub realized_pnl: f64,
    /// Realized PnL as a percentage of the initial balance.
    pub total_pnl_pct: f64,
    pub avg_win_pct: f64,
    pub avg_loss_pct: f64,
    pub max_drawdown_pct: f64,
    pub final_balance: f64,
    /// PnL of a position left open despite finalization. Normally 0.0,
    /// since run-end positions are force-closed.
    pub unrealized_pnl: f64,
    /// Orders the gateway failed to fill during the run.
    pub rejected_orders: u64,
    pub trades: Vec<ClosedTrade>,
    pub fills: Vec<Fill>,
    pub bars: Vec<BarRecord>,
}

impl RunSummary {
    /// Log the summary the way the run operator expects to read it.
    pub fn log(&self) {
        info!("Backtest results for {}:", self.pair);
        info!("  Total trades:  {}", self.total_trades);
        info!("  Win rate:      {:.2}%", self.win_rate_pct);
        info!("  Total PnL:     {:.2} ({:.2}%)", self.realized_pnl, self.total_pnl_pct);
        info!("  Average win:   {:.2}%", self.avg_win_pct);
        info!("  Average loss:  {:.2}%", self.avg_loss_pct);
        info!("  Max drawdown:  {:.2}%", self.max_drawdown_pct);
        info!("  Final balance: {:.2}", self.final_balance);
        if self.rejected_orders > 0 {
            info!("  Rejected orders: {}", self.rejected_orders);
        }
    }
}

/// Replays a historical candle sequence through the shared trading loop.
///
/// INIT (fresh trader, full history) → REPLAYING (one bar at a time, in
/// order) → FINALIZING (force-close any open long at the final close, via
/// the gateway so fees and slippage apply) → DONE (immutable summary).
/// Replaying identical candles with identical configuration produces an
/// identical summary.
pub struct BacktestDriver {
    trader: Trader,
    phase: Phase,
}

impl BacktestDriver {
    pub fn new(trader: Trader) -> Self {
        Self {
            trader,
            phase: Phase::Init,
        }
    }

    pub async fn run(mut self, candles: Vec<Candle>) -> Result<RunSummary> {
        let pair = candles
            .first()
            .map(|c| c.pair.clone())
            .unwrap_or_default();
        info!(phase = %self.phase, bars = candles.len(), %pair, "Backtest loaded");

        self.phase = Phase::Replaying;
        let mut feed = HistoryFeed::new(candles);
        let mut last_candle = None;
        while let Some(candle) = feed.next_candle().await? {
            self.trader.process_candle(&candle).await?;
            last_candle = Some(candle);
        }

        self.phase = Phase::Finalizing;
        if let Some(last) = &last_candle {
            self.force_close(last).await?;
        }

        self.phase = Phase::Done;
        let (router, ledger, bars) = self.trader.into_parts();

        let trades = ledger.closed_trades().to_vec();
        let total_trades = trades.len();
        let winning_trades = trades.iter().filter(|t| t.pnl > 0.0).count();
        let realized_pnl = ledger.realized_pnl();
        let initial_balance = ledger.initial_balance();
        let unrealized_pnl = last_candle
            .as_ref()
            .map(|c| ledger.mark(c.close))
            .unwrap_or(0.0);

        let wins: Vec<f64> = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl_pct).collect();
        let losses: Vec<f64> = trades.iter().filter(|t| t.pnl < 0.0).map(|t| t.pnl_pct).collect();

        let summary = RunSummary {
            pair,
            total_trades,
            winning_trades,
            win_rate_pct: if total_trades > 0 {
                winning_trades as f64 / total_trades as f64 * 100.0
            } else {
                0.0
            },
            realized_pnl,
            total_pnl_pct: if initial_balance > 0.0 {
                realized_pnl / initial_balance * 100.0
            } else {
                0.0
            },
            avg_win_pct: mean(&wins),
            avg_loss_pct: mean(&losses),
            max_drawdown_pct: max_drawdown_pct(&trades),
            final_balance: initial_balance + realized_pnl,
            unrealized_pnl,
            rejected_orders: router.rejected_orders(),
            trades,
            fills: ledger.fills().to_vec(),
            bars,
        };
        info!(phase = %self.phase, trades = summary.total_trades, "Backtest complete");
        Ok(summary)
    }

    /// Run-end policy: an open long is not left unrealized in the summary.
    async fn force_close(&mut self, last: &Candle) -> Result<()> {
        if self.trader.ledger().position().is_flat() {
            return Ok(());
        }
        info!(
            phase = %self.phase,
            position = %self.trader.ledger().position(),
            close = last.close,
            "Force-closing open position at end of history"
        );
        let position = self.trader.ledger().position().clone();
        let equity = self.trader.ledger().equity();
        let fill = self
            .trader
            .router_mut()
            .on_signal(Signal::Sell, &position, equity, last)
            .await;
        match fill {
            Some(fill) => {
                self.trader.ledger_mut().apply(&fill)?;
            }
            None => {
                // The summary will carry the remaining unrealized PnL.
                warn!("Force-close order was not filled — position left open");
            }
        }
        Ok(())
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Max drawdown over the compounded per-trade return curve, as a positive
/// percentage.
fn max_drawdown_pct(trades: &[ClosedTrade]) -> f64 {
    let mut cumulative = 1.0;
    let mut peak = 1.0;
    let mut worst = 0.0_f64;
    for trade in trades {
        cumulative *= 1.0 + trade.pnl_pct / 100.0;
        if cumulative > peak {
            peak = cumulative;
        }
        let drawdown = (cumulative - peak) / peak * 100.0;
        if drawdown < worst {
            worst = drawdown;
        }
    }
    worst.abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use common::OrderSide;
    use paper::SimulatedGateway;
    use strategy::{EmaScalper, SizingRule, StrategyParams};

    use crate::ledger::Ledger;
    use crate::router::ExecutionRouter;

    fn candles(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                pair: "BTCUSDT".into(),
                timestamp: Utc.timestamp_opt(1_700_000_000 + 60 * i as i64, 0).unwrap(),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
            })
            .collect()
    }

    fn driver(initial_balance: f64, slippage_bps: f64, fee_rate: f64) -> BacktestDriver {
        let gateway = Arc::new(SimulatedGateway::new(initial_balance, slippage_bps, fee_rate));
        let strategy = EmaScalper::new(&StrategyParams {
            fast_period: 2,
            slow_period: 3,
        });
        let trader = Trader::new(
            Box::new(strategy),
            ExecutionRouter::new(gateway, SizingRule::Fixed { value: 1.0 }, Duration::from_secs(1)),
            Ledger::new(initial_balance),
        );
        BacktestDriver::new(trader)
    }

    const REFERENCE_CLOSES: [f64; 7] = [10.0, 10.0, 10.0, 12.0, 15.0, 9.0, 8.0];

    #[tokio::test]
    async fn reference_series_buys_then_sells_with_exact_pnl() {
        // fast=2/slow=3: the 2-period EMA first exceeds the 3-period EMA on
        // bar 4 (close 12); the downward cross lands on bar 6 (close 9).
        let summary = driver(1_000.0, 0.0, 0.001)
            .run(candles(&REFERENCE_CLOSES))
            .await
            .unwrap();

        assert_eq!(summary.total_trades, 1);
        assert_eq!(summary.fills.len(), 2);
        assert_eq!(summary.fills[0].side, OrderSide::Buy);
        assert!((summary.fills[0].price - 12.0).abs() < 1e-9);
        assert_eq!(summary.fills[1].side, OrderSide::Sell);
        assert!((summary.fills[1].price - 9.0).abs() < 1e-9);

        // entry = 12 + 0.012, exit pnl = (9 − 12.012) × 1 − 0.009
        assert!((summary.realized_pnl - (-3.021)).abs() < 1e-9);
        assert_eq!(summary.winning_trades, 0);
        assert!((summary.win_rate_pct - 0.0).abs() < 1e-9);
        assert!((summary.final_balance - 996.979).abs() < 1e-9);
        assert!((summary.unrealized_pnl).abs() < 1e-9);

        assert_eq!(summary.bars.len(), 7);
        assert_eq!(summary.bars[3].signal, Signal::Buy);
        assert_eq!(summary.bars[5].signal, Signal::Sell);
    }

    #[tokio::test]
    async fn open_position_is_force_closed_at_final_close() {
        // Rising series: buy fires, no downward cross before the end.
        let summary = driver(1_000.0, 0.0, 0.0)
            .run(candles(&[10.0, 10.0, 10.0, 12.0, 15.0, 16.0, 17.0]))
            .await
            .unwrap();

        assert_eq!(summary.total_trades, 1);
        assert_eq!(summary.fills.len(), 2);
        assert!((summary.fills[1].price - 17.0).abs() < 1e-9);
        assert!((summary.realized_pnl - 5.0).abs() < 1e-9);
        assert!((summary.win_rate_pct - 100.0).abs() < 1e-9);
        assert!((summary.unrealized_pnl).abs() < 1e-9);
    }

    #[tokio::test]
    async fn replay_is_deterministic() {
        let a = driver(1_000.0, 10.0, 0.001)
            .run(candles(&REFERENCE_CLOSES))
            .await
            .unwrap();
        let b = driver(1_000.0, 10.0, 0.001)
            .run(candles(&REFERENCE_CLOSES))
            .await
            .unwrap();

        // Client order ids are run-local; everything economic must match
        // exactly.
        assert_eq!(a.total_trades, b.total_trades);
        assert_eq!(a.realized_pnl, b.realized_pnl);
        assert_eq!(a.win_rate_pct, b.win_rate_pct);
        assert_eq!(a.max_drawdown_pct, b.max_drawdown_pct);
        assert_eq!(a.final_balance, b.final_balance);
        assert_eq!(a.bars, b.bars);
        assert_eq!(a.trades, b.trades);
        let econ = |fills: &[Fill]| {
            fills
                .iter()
                .map(|f| (f.side, f.price, f.quantity, f.fee, f.timestamp))
                .collect::<Vec<_>>()
        };
        assert_eq!(econ(&a.fills), econ(&b.fills));
    }

    #[tokio::test]
    async fn out_of_order_history_aborts_the_run() {
        let mut series = candles(&REFERENCE_CLOSES);
        series.swap(2, 3);
        let err = driver(1_000.0, 0.0, 0.0).run(series).await.unwrap_err();
        assert!(matches!(err, common::Error::OutOfOrderCandle { .. }));
    }

    #[tokio::test]
    async fn rejected_buy_is_counted_and_run_continues() {
        // Balance far too small for a 1.0-quantity buy at 12: the gateway
        // reports InsufficientFunds, the bar becomes a no-fill, and the run
        // completes flat.
        let summary = driver(1.0, 0.0, 0.0)
            .run(candles(&REFERENCE_CLOSES))
            .await
            .unwrap();
        assert_eq!(summary.total_trades, 0);
        assert!(summary.fills.is_empty());
        assert_eq!(summary.rejected_orders, 1);
        assert!((summary.realized_pnl).abs() < 1e-9);
    }

    #[tokio::test]
    async fn empty_history_produces_an_empty_summary() {
        let summary = driver(1_000.0, 0.0, 0.0).run(Vec::new()).await.unwrap();
        assert_eq!(summary.total_trades, 0);
        assert!(summary.bars.is_empty());
        assert!((summary.final_balance - 1_000.0).abs() < 1e-9);
    }

    #[test]
    fn max_drawdown_compounds_per_trade_returns() {
        let ts = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let trade = |pnl_pct: f64| ClosedTrade {
            entry_price: 100.0,
            exit_price: 100.0 * (1.0 + pnl_pct / 100.0),
            quantity: 1.0,
            pnl: pnl_pct,
            pnl_pct,
            opened_at: ts,
            closed_at: ts,
        };
        // +10%, −20%, −10%: trough at 0.792 of the 1.10 peak → 28% drawdown.
        let trades = vec![trade(10.0), trade(-20.0), trade(-10.0)];
        assert!((max_drawdown_pct(&trades) - 28.0).abs() < 1e-9);
        assert!((max_drawdown_pct(&[]) - 0.0).abs() < 1e-9);
    }
}
