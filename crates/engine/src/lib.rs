pub mod backtest;
pub mod bybit;
pub mod ledger;
pub mod router;
pub mod trader;

pub use backtest::{BacktestDriver, RunSummary};
pub use bybit::{BybitClient, BybitStream};
pub use ledger::{ClosedTrade, Ledger, PnlSnapshot};
pub use router::ExecutionRouter;
pub use trader::{BarRecord, Trader};
