use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use common::{Candle, CandleFeed, Error, Result, Signal};
use strategy::Strategy;

use crate::ledger::Ledger;
use crate::router::ExecutionRouter;

/// Per-bar decision record, appended for every processed candle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarRecord {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub signal: Signal,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
}

/// The mode-agnostic engine core: one strategy, one router, one ledger.
///
/// `process_candle` runs the full evaluate, route, apply, mark sequence to
/// completion for each bar: there is no cancellation mid-bar, and no other
/// task ever mutates the ledger or the indicator state. Backtest,
/// dry-run and live all drive this same loop; only the feed and the gateway
/// behind the router differ.
pub struct Trader {
    strategy: Box<dyn Strategy>,
    router: ExecutionRouter,
    ledger: Ledger,
    last_timestamp: Option<DateTime<Utc>>,
    records: Vec<BarRecord>,
}

impl Trader {
    pub fn new(strategy: Box<dyn Strategy>, router: ExecutionRouter, ledger: Ledger) -> Self {
        info!(strategy = strategy.name(), "Trader initialized");
        Self {
            strategy,
            router,
            ledger,
            last_timestamp: None,
            records: Vec::new(),
        }
    }

    /// Process one closed candle. Fatal data errors and ledger invariant
    /// violations abort the run; gateway failures do not reach this level.
    pub async fn process_candle(&mut self, candle: &Candle) -> Result<BarRecord> {
        self.validate(candle)?;
        self.last_timestamp = Some(candle.timestamp);

        let signal = self.strategy.on_candle(candle);

        if signal != Signal::Hold {
            let fill = self
                .router
                .on_signal(signal, self.ledger.position(), self.ledger.equity(), candle)
                .await;
            if let Some(fill) = fill {
                self.ledger.apply(&fill)?;
            }
        }

        let record = BarRecord {
            timestamp: candle.timestamp,
            close: candle.close,
            signal,
            realized_pnl: self.ledger.realized_pnl(),
            unrealized_pnl: self.ledger.mark(candle.close),
        };
        self.records.push(record.clone());
        Ok(record)
    }

    /// Open-ended loop for live and dry-run modes: block on the feed, run
    /// each bar to completion, repeat until the feed ends or the task is
    /// stopped externally.
    pub async fn run(&mut self, feed: &mut dyn CandleFeed) -> Result<()> {
        while let Some(candle) = feed.next_candle().await? {
            let record = self.process_candle(&candle).await?;
            info!(
                timestamp = %record.timestamp,
                close = record.close,
                signal = %record.signal,
                realized = record.realized_pnl,
                unrealized = record.unrealized_pnl,
                "Bar processed"
            );
        }
        warn!("Candle feed ended");
        Ok(())
    }

    fn validate(&self, candle: &Candle) -> Result<()> {
        if let Some(prev) = self.last_timestamp {
            if candle.timestamp <= prev {
                return Err(Error::OutOfOrderCandle {
                    prev,
                    next: candle.timestamp,
                });
            }
        }
        let prices = [candle.open, candle.high, candle.low, candle.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(Error::BadCandle {
                timestamp: candle.timestamp,
                reason: format!(
                    "prices must be positive finite numbers, got o={} h={} l={} c={}",
                    candle.open, candle.high, candle.low, candle.close
                ),
            });
        }
        if !candle.volume.is_finite() || candle.volume < 0.0 {
            return Err(Error::BadCandle {
                timestamp: candle.timestamp,
                reason: format!("volume must be a non-negative number, got {}", candle.volume),
            });
        }
        Ok(())
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn records(&self) -> &[BarRecord] {
        &self.records
    }

    /// Split the trader into its parts for finalization.
    pub(crate) fn into_parts(self) -> (ExecutionRouter, Ledger, Vec<BarRecord>) {
        (self.router, self.ledger, self.records)
    }

    pub(crate) fn router_mut(&mut self) -> &mut ExecutionRouter {
        &mut self.router
    }

    pub(crate) fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }
}
