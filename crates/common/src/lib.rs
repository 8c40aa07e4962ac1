pub mod config;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod types;

pub use config::Config;
pub use error::{Error, GatewayError, Result};
pub use feed::{CandleFeed, HistoryFeed};
pub use gateway::OrderGateway;
pub use types::*;
