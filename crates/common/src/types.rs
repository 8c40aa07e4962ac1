use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One closed OHLCV bar for a trading pair.
///
/// The feeds only ever deliver finalized candles, in strictly increasing
/// timestamp order. All prices must be positive finite numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub pair: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Decision emitted by the strategy for one closed candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Buy => write!(f, "BUY"),
            Signal::Sell => write!(f, "SELL"),
            Signal::Hold => write!(f, "HOLD"),
        }
    }
}

/// An order intent to be submitted to a gateway.
///
/// `mark_price` is the close of the candle that produced the signal and
/// `timestamp` is that candle's timestamp. Simulated gateways fill at
/// `mark_price` (plus slippage) and stamp the fill with `timestamp`, so a
/// replay over identical candles produces identical fills.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub pair: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub mark_price: f64,
    pub timestamp: DateTime<Utc>,
}

impl Order {
    pub fn market(
        pair: impl Into<String>,
        side: OrderSide,
        quantity: f64,
        mark_price: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            pair: pair.into(),
            side,
            quantity,
            mark_price,
            timestamp,
        }
    }
}

/// Confirmation of a filled order returned by a gateway.
/// Immutable once produced; appended to the ledger's fill log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub pair: String,
    pub side: OrderSide,
    pub price: f64,
    pub quantity: f64,
    pub fee: f64,
    pub timestamp: DateTime<Utc>,
}

/// The single position of a run. Spot only: flat or long, never short.
///
/// The `quantity = 0 <=> flat` invariant is structural: a `Long` variant
/// cannot exist without a quantity and entry price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "side")]
pub enum Position {
    Flat,
    Long {
        quantity: f64,
        /// Entry price with the buy fee folded in.
        entry_price: f64,
        opened_at: DateTime<Utc>,
    },
}

impl Position {
    pub fn is_flat(&self) -> bool {
        matches!(self, Position::Flat)
    }

    pub fn quantity(&self) -> f64 {
        match self {
            Position::Flat => 0.0,
            Position::Long { quantity, .. } => *quantity,
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Position::Flat => write!(f, "flat"),
            Position::Long {
                quantity,
                entry_price,
                ..
            } => write!(f, "long {quantity} @ {entry_price}"),
        }
    }
}

/// How orders are executed for this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TradingMode {
    /// Real orders against the exchange.
    Live,
    /// Live market data, simulated fills.
    DryRun,
    /// Historical replay, simulated fills.
    Backtest,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::DryRun => write!(f, "dry-run"),
            TradingMode::Backtest => write!(f, "backtest"),
        }
    }
}
