use async_trait::async_trait;

use crate::{Candle, Result};

/// Source of closed candles, in strictly increasing timestamp order.
///
/// Live feeds block in `next_candle` until the next bar closes and never
/// return `Ok(None)`. Historical feeds return `Ok(None)` at end of stream.
#[async_trait]
pub trait CandleFeed: Send {
    async fn next_candle(&mut self) -> Result<Option<Candle>>;
}

/// Replay feed over a preloaded candle history (backtest mode).
pub struct HistoryFeed {
    candles: std::vec::IntoIter<Candle>,
}

impl HistoryFeed {
    pub fn new(candles: Vec<Candle>) -> Self {
        Self {
            candles: candles.into_iter(),
        }
    }
}

#[async_trait]
impl CandleFeed for HistoryFeed {
    async fn next_candle(&mut self) -> Result<Option<Candle>> {
        Ok(self.candles.next())
    }
}
