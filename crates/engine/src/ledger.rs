use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use common::{Error, Fill, OrderSide, Position, Result};

/// Realized and mark-to-market PnL at a point in time. Derived from the
/// ledger's position and fill log, never stored independently.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PnlSnapshot {
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
}

/// A completed buy+sell round trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedTrade {
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
    /// Realized profit of this trade, net of fees.
    pub pnl: f64,
    /// `pnl` as a percentage of the entry notional.
    pub pnl_pct: f64,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

/// The authoritative position and PnL state machine for one run.
///
/// Exclusively owns the Position, the fill log, and the closed-trade list.
/// Mutated only by confirmed fills via [`Ledger::apply`]; a fill that cannot
/// legally apply is a fatal [`Error::InvariantViolation`]: it means the
/// router upstream is broken, and masking it would corrupt the books.
#[derive(Debug)]
pub struct Ledger {
    position: Position,
    fills: Vec<Fill>,
    closed_trades: Vec<ClosedTrade>,
    realized_pnl: f64,
    initial_balance: f64,
}

impl Ledger {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            position: Position::Flat,
            fills: Vec::new(),
            closed_trades: Vec::new(),
            realized_pnl: 0.0,
            initial_balance,
        }
    }

    /// Apply a confirmed fill and return the updated snapshot.
    ///
    /// Buy while flat opens a long with the fee folded into the effective
    /// entry price. Sell while long realizes `(price − entry) × qty − fee`
    /// and goes flat. Anything else violates the position invariant.
    pub fn apply(&mut self, fill: &Fill) -> Result<PnlSnapshot> {
        match (self.position.clone(), fill.side) {
            (Position::Flat, OrderSide::Buy) => {
                let entry_price = fill.price + fill.fee / fill.quantity;
                self.position = Position::Long {
                    quantity: fill.quantity,
                    entry_price,
                    opened_at: fill.timestamp,
                };
                info!(
                    pair = %fill.pair,
                    qty = fill.quantity,
                    price = fill.price,
                    entry = entry_price,
                    "Opened long"
                );
            }
            (
                Position::Long {
                    entry_price,
                    opened_at,
                    ..
                },
                OrderSide::Sell,
            ) => {
                let pnl = (fill.price - entry_price) * fill.quantity - fill.fee;
                let entry_notional = entry_price * fill.quantity;
                self.closed_trades.push(ClosedTrade {
                    entry_price,
                    exit_price: fill.price,
                    quantity: fill.quantity,
                    pnl,
                    pnl_pct: if entry_notional > 0.0 {
                        pnl / entry_notional * 100.0
                    } else {
                        0.0
                    },
                    opened_at,
                    closed_at: fill.timestamp,
                });
                self.realized_pnl += pnl;
                self.position = Position::Flat;
                info!(
                    pair = %fill.pair,
                    qty = fill.quantity,
                    exit = fill.price,
                    pnl,
                    realized = self.realized_pnl,
                    "Closed long"
                );
            }
            (position, side) => {
                return Err(Error::InvariantViolation(format!(
                    "{side} fill while position is {position}"
                )));
            }
        }

        self.fills.push(fill.clone());
        Ok(PnlSnapshot {
            realized_pnl: self.realized_pnl,
            unrealized_pnl: self.mark(fill.price),
        })
    }

    /// Mark-to-market PnL of the open position at the latest close.
    /// Always 0 while flat.
    pub fn mark(&self, latest_price: f64) -> f64 {
        match &self.position {
            Position::Flat => 0.0,
            Position::Long {
                quantity,
                entry_price,
                ..
            } => (latest_price - entry_price) * quantity,
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn closed_trades(&self) -> &[ClosedTrade] {
        &self.closed_trades
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    /// Current equity: initial balance plus realized PnL. Used by the
    /// balance-pct sizing rule in every mode.
    pub fn equity(&self) -> f64 {
        self.initial_balance + self.realized_pnl
    }

    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fill(side: OrderSide, price: f64, quantity: f64, fee: f64, minute: i64) -> Fill {
        Fill {
            order_id: format!("order-{minute}"),
            pair: "BTCUSDT".into(),
            side,
            price,
            quantity,
            fee,
            timestamp: Utc.timestamp_opt(1_700_000_000 + minute * 60, 0).unwrap(),
        }
    }

    #[test]
    fn unrealized_is_zero_while_flat() {
        let ledger = Ledger::new(1_000.0);
        assert_eq!(ledger.mark(123.45), 0.0);
        assert_eq!(ledger.mark(0.01), 0.0);
    }

    #[test]
    fn buy_folds_fee_into_entry_price() {
        let mut ledger = Ledger::new(1_000.0);
        ledger.apply(&fill(OrderSide::Buy, 100.0, 2.0, 1.0, 0)).unwrap();
        match ledger.position() {
            Position::Long {
                entry_price,
                quantity,
                ..
            } => {
                assert!((entry_price - 100.5).abs() < 1e-9); // 100 + 1.0/2.0
                assert!((quantity - 2.0).abs() < 1e-9);
            }
            Position::Flat => panic!("expected long position"),
        }
    }

    #[test]
    fn sell_realizes_pnl_net_of_fees() {
        let mut ledger = Ledger::new(1_000.0);
        ledger.apply(&fill(OrderSide::Buy, 100.0, 1.0, 0.1, 0)).unwrap();
        let snapshot = ledger
            .apply(&fill(OrderSide::Sell, 110.0, 1.0, 0.11, 1))
            .unwrap();
        // entry = 100.1; (110 − 100.1) × 1 − 0.11 = 9.79
        assert!((snapshot.realized_pnl - 9.79).abs() < 1e-9);
        assert!(ledger.position().is_flat());
        assert_eq!(snapshot.unrealized_pnl, 0.0);
    }

    #[test]
    fn realized_pnl_is_additive_over_trades() {
        let mut ledger = Ledger::new(1_000.0);
        ledger.apply(&fill(OrderSide::Buy, 100.0, 1.0, 0.0, 0)).unwrap();
        ledger.apply(&fill(OrderSide::Sell, 105.0, 1.0, 0.0, 1)).unwrap();
        ledger.apply(&fill(OrderSide::Buy, 103.0, 2.0, 0.0, 2)).unwrap();
        ledger.apply(&fill(OrderSide::Sell, 101.0, 2.0, 0.0, 3)).unwrap();

        let per_trade: f64 = ledger.closed_trades().iter().map(|t| t.pnl).sum();
        assert!((ledger.realized_pnl() - per_trade).abs() < 1e-9);
        assert!((ledger.realized_pnl() - 1.0).abs() < 1e-9); // +5 − 4
    }

    #[test]
    fn sell_while_flat_is_an_invariant_violation() {
        let mut ledger = Ledger::new(1_000.0);
        let err = ledger
            .apply(&fill(OrderSide::Sell, 100.0, 1.0, 0.0, 0))
            .unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
        // The impossible fill must not have been recorded.
        assert!(ledger.fills().is_empty());
        assert!(ledger.position().is_flat());
    }

    #[test]
    fn buy_while_long_is_an_invariant_violation() {
        let mut ledger = Ledger::new(1_000.0);
        ledger.apply(&fill(OrderSide::Buy, 100.0, 1.0, 0.0, 0)).unwrap();
        let err = ledger
            .apply(&fill(OrderSide::Buy, 101.0, 1.0, 0.0, 1))
            .unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
        assert_eq!(ledger.fills().len(), 1);
    }

    #[test]
    fn mark_tracks_open_long() {
        let mut ledger = Ledger::new(1_000.0);
        ledger.apply(&fill(OrderSide::Buy, 100.0, 2.0, 0.0, 0)).unwrap();
        assert!((ledger.mark(110.0) - 20.0).abs() < 1e-9);
        assert!((ledger.mark(95.0) + 10.0).abs() < 1e-9);
    }

    #[test]
    fn equity_tracks_realized_pnl() {
        let mut ledger = Ledger::new(500.0);
        assert!((ledger.equity() - 500.0).abs() < 1e-9);
        ledger.apply(&fill(OrderSide::Buy, 100.0, 1.0, 0.0, 0)).unwrap();
        ledger.apply(&fill(OrderSide::Sell, 120.0, 1.0, 0.0, 1)).unwrap();
        assert!((ledger.equity() - 520.0).abs() < 1e-9);
    }
}
