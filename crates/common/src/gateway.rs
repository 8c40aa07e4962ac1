use async_trait::async_trait;

use crate::{Fill, GatewayError, Order};

/// Abstraction over the order submission path, the single capability that
/// distinguishes run modes.
///
/// `BybitClient` implements this for live trading.
/// `SimulatedGateway` implements this for dry-run and backtest.
///
/// Only the `ExecutionRouter` in `crates/engine` should hold a reference to
/// a `dyn OrderGateway`; the ledger never talks to a gateway and therefore
/// never needs to know which mode is running.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Submit an order and return the fill confirmation, or one of the
    /// recoverable failures of the shared contract.
    async fn submit_order(&self, order: &Order) -> Result<Fill, GatewayError>;
}
