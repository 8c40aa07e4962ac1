use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use common::{Fill, GatewayError, Order, OrderGateway, OrderSide};

/// Simulated fill model for dry-run and backtest modes.
///
/// Fills execute at the order's `mark_price` (the close of the signal
/// candle) with configurable slippage and proportional fees, and are
/// stamped with the order's timestamp. Given identical orders the gateway
/// produces identical fills, which is what makes backtests replayable.
/// No real orders are ever sent to the exchange.
pub struct SimulatedGateway {
    /// Remaining simulated quote balance. A buy whose cost (including fee)
    /// exceeds it is rejected with `InsufficientFunds`.
    balance: Mutex<f64>,
    /// Slippage in basis points applied to all fills.
    slippage_bps: f64,
    /// Proportional fee charged on every fill.
    fee_rate: f64,
}

impl SimulatedGateway {
    pub fn new(initial_balance: f64, slippage_bps: f64, fee_rate: f64) -> Self {
        info!(
            balance = initial_balance,
            slippage_bps,
            fee_rate,
            "SimulatedGateway initialized"
        );
        Self {
            balance: Mutex::new(initial_balance),
            slippage_bps,
            fee_rate,
        }
    }

    /// Remaining simulated quote balance.
    pub async fn balance(&self) -> f64 {
        *self.balance.lock().await
    }

    fn fill_price(&self, order: &Order) -> f64 {
        // Buys pay more, sells receive less.
        match order.side {
            OrderSide::Buy => order.mark_price * (1.0 + self.slippage_bps / 10_000.0),
            OrderSide::Sell => order.mark_price * (1.0 - self.slippage_bps / 10_000.0),
        }
    }
}

#[async_trait]
impl OrderGateway for SimulatedGateway {
    async fn submit_order(&self, order: &Order) -> Result<Fill, GatewayError> {
        let fill_price = self.fill_price(order);
        let notional = fill_price * order.quantity;
        let fee = notional * self.fee_rate;

        let mut balance = self.balance.lock().await;
        match order.side {
            OrderSide::Buy => {
                let cost = notional + fee;
                if cost > *balance {
                    return Err(GatewayError::InsufficientFunds(format!(
                        "buy cost {cost:.8} exceeds simulated balance {:.8}",
                        *balance
                    )));
                }
                *balance -= cost;
            }
            OrderSide::Sell => {
                *balance += notional - fee;
            }
        }

        debug!(
            pair = %order.pair,
            side = %order.side,
            mark = order.mark_price,
            fill = fill_price,
            qty = order.quantity,
            fee,
            "Simulated fill"
        );

        Ok(Fill {
            order_id: order.id.clone(),
            pair: order.pair.clone(),
            side: order.side,
            price: fill_price,
            quantity: order.quantity,
            fee,
            timestamp: order.timestamp,
        })
    }
}
