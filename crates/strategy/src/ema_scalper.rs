use tracing::debug;

use common::{Candle, Signal};

use crate::indicators::{Crossing, EmaCross};
use crate::{Strategy, StrategyParams};

/// EMA-crossover scalper: Buy when the fast EMA crosses above the slow EMA,
/// Sell on the downward cross, Hold otherwise.
///
/// Emits nothing but Hold until `slow_period` candles have been observed:
/// the cross detector needs both averages seeded plus one prior bar of
/// delta, so the earliest possible Buy/Sell is the bar after seeding.
pub struct EmaScalper {
    name: String,
    cross: EmaCross,
}

impl EmaScalper {
    pub fn new(params: &StrategyParams) -> Self {
        Self {
            name: format!("ema-scalper {}/{}", params.fast_period, params.slow_period),
            cross: EmaCross::new(params.fast_period, params.slow_period),
        }
    }
}

impl Strategy for EmaScalper {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_candle(&mut self, candle: &Candle) -> Signal {
        let signal = match self.cross.update(candle.close) {
            Crossing::Bullish => Signal::Buy,
            Crossing::Bearish => Signal::Sell,
            Crossing::None => Signal::Hold,
        };
        if signal != Signal::Hold {
            debug!(
                pair = %candle.pair,
                close = candle.close,
                fast = ?self.cross.fast(),
                slow = ?self.cross.slow(),
                %signal,
                "EMA cross"
            );
        }
        signal
    }
}
