use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use common::{Candle, Fill, GatewayError, Order, OrderGateway, OrderSide, Position, Signal};
use strategy::SizingRule;

/// Turns signals into orders and dispatches them to the configured gateway.
///
/// This is the ONLY component that calls `OrderGateway::submit_order`. Spot
/// only: a Buy while already long and a Sell while flat are no-ops, since
/// the router never pyramids and never shorts. Gateway failures are logged,
/// counted, and treated as "no fill this bar"; the next bar re-evaluates
/// from scratch.
pub struct ExecutionRouter {
    gateway: Arc<dyn OrderGateway>,
    sizing: SizingRule,
    order_timeout: Duration,
    rejected_orders: u64,
}

impl ExecutionRouter {
    pub fn new(gateway: Arc<dyn OrderGateway>, sizing: SizingRule, order_timeout: Duration) -> Self {
        Self {
            gateway,
            sizing,
            order_timeout,
            rejected_orders: 0,
        }
    }

    /// Pure routing decision: which side to trade, if any, given the signal
    /// and the current position.
    fn route(signal: Signal, position: &Position) -> Option<OrderSide> {
        match (signal, position) {
            (Signal::Buy, Position::Flat) => Some(OrderSide::Buy),
            (Signal::Sell, Position::Long { .. }) => Some(OrderSide::Sell),
            _ => None,
        }
    }

    fn order_quantity(&self, side: OrderSide, position: &Position, equity: f64, close: f64) -> f64 {
        match side {
            // Closing always unwinds the full position.
            OrderSide::Sell => position.quantity(),
            OrderSide::Buy => match self.sizing {
                SizingRule::Fixed { value } => value,
                SizingRule::BalancePct { value } => equity * value / close,
            },
        }
    }

    /// Act on a signal for the given bar. Returns the confirmed fill, or
    /// `None` when the signal routes to a no-op or the gateway failed.
    pub async fn on_signal(
        &mut self,
        signal: Signal,
        position: &Position,
        equity: f64,
        candle: &Candle,
    ) -> Option<Fill> {
        let side = Self::route(signal, position)?;
        let quantity = self.order_quantity(side, position, equity, candle.close);
        if quantity <= 0.0 {
            warn!(pair = %candle.pair, %side, quantity, "Computed order quantity is not positive — skipping");
            return None;
        }

        let order = Order::market(&candle.pair, side, quantity, candle.close, candle.timestamp);
        info!(
            pair = %order.pair,
            %side,
            qty = order.quantity,
            mark = order.mark_price,
            "Submitting order"
        );

        match self.submit_with_timeout(&order).await {
            Ok(fill) => {
                info!(
                    pair = %fill.pair,
                    price = fill.price,
                    qty = fill.quantity,
                    fee = fill.fee,
                    "Order filled"
                );
                Some(fill)
            }
            Err(e) => {
                // Recoverable per the shared contract: no retry mid-bar, no
                // position change. The next candle re-evaluates.
                warn!(pair = %order.pair, %side, error = %e, "Order not filled — holding this bar");
                self.rejected_orders += 1;
                None
            }
        }
    }

    async fn submit_with_timeout(&self, order: &Order) -> Result<Fill, GatewayError> {
        match tokio::time::timeout(self.order_timeout, self.gateway.submit_order(order)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.order_timeout)),
        }
    }

    /// Orders that failed at the gateway during this run.
    pub fn rejected_orders(&self) -> u64 {
        self.rejected_orders
    }
}
