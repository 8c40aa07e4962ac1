pub mod config;
pub mod ema_scalper;
pub mod indicators;

pub use config::{ExecutionParams, RunConfig, SizingRule, SlippageModel, StrategyParams};
pub use ema_scalper::EmaScalper;

use common::{Candle, Signal};

/// A strategy instance for one run: one pair, one timeframe.
///
/// Implementations carry their indicator state internally and update it
/// incrementally; `on_candle` is called exactly once per closed candle, in
/// timestamp order. Returning [`Signal::Hold`] during indicator warm-up is
/// the expected behavior, not an error.
pub trait Strategy: Send {
    /// Human-readable name of this strategy instance.
    fn name(&self) -> &str;

    /// Consume the next closed candle and emit a decision for it.
    fn on_candle(&mut self, candle: &Candle) -> Signal;
}
