pub mod rest;
pub mod stream;

pub use rest::{fetch_klines, BybitClient};
pub use stream::BybitStream;

use common::{Error, Result};

/// Map a human timeframe ("1m", "1h", ...) onto Bybit's V5 interval token.
pub fn interval(timeframe: &str) -> Result<&'static str> {
    Ok(match timeframe {
        "1m" => "1",
        "3m" => "3",
        "5m" => "5",
        "15m" => "15",
        "30m" => "30",
        "1h" => "60",
        "2h" => "120",
        "4h" => "240",
        "6h" => "360",
        "12h" => "720",
        "1d" => "D",
        other => {
            return Err(Error::Config(format!(
                "unsupported timeframe '{other}' (expected 1m/3m/5m/15m/30m/1h/2h/4h/6h/12h/1d)"
            )))
        }
    })
}
