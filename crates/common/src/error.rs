use std::time::Duration;

use thiserror::Error;

/// Fatal errors that abort the run.
///
/// Gateway failures are deliberately NOT part of this enum: they are
/// recoverable, absorbed at the bar level by the router as [`GatewayError`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("candle feed error: {0}")]
    Feed(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Exchange API error: {0}")]
    Exchange(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Out-of-order or duplicate candle timestamp: an upstream feed defect
    /// the engine cannot recover from mid-run.
    #[error("out-of-order candle: previous timestamp {prev}, next {next}")]
    OutOfOrderCandle {
        prev: chrono::DateTime<chrono::Utc>,
        next: chrono::DateTime<chrono::Utc>,
    },

    #[error("malformed candle at {timestamp}: {reason}")]
    BadCandle {
        timestamp: chrono::DateTime<chrono::Utc>,
        reason: String,
    },

    /// A fill that cannot legally apply to the current position. Indicates a
    /// router bug and must never be masked.
    #[error("position invariant violated: {0}")]
    InvariantViolation(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures a gateway may report for a single order.
///
/// Shared contract between the simulated and live sinks: the router treats
/// any of these as "no fill this bar", logs it, and carries on.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("order timed out after {0:?}")]
    Timeout(Duration),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
}
