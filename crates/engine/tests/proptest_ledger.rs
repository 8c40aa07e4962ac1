use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use common::{Fill, OrderSide};
use engine::Ledger;

fn fill(side: OrderSide, price: f64, quantity: f64, fee: f64, seq: i64) -> Fill {
    Fill {
        order_id: format!("order-{seq}"),
        pair: "TESTUSDT".into(),
        side,
        price,
        quantity,
        fee,
        timestamp: Utc.timestamp_opt(1_700_000_000 + seq * 60, 0).unwrap(),
    }
}

proptest! {
    /// Any alternating buy/sell sequence applies cleanly, keeps realized
    /// PnL equal to the sum of per-trade PnL, and leaves unrealized at zero
    /// whenever the position is flat.
    #[test]
    fn ledger_books_balance_over_round_trips(
        prices in proptest::collection::vec((0.0001f64..1_000_000.0f64, 0.0001f64..1_000_000.0f64), 1..20),
        quantity in 0.0001f64..1000.0f64,
        fee_rate in 0.0f64..0.01f64,
        mark in 0.0001f64..1_000_000.0f64,
    ) {
        let mut ledger = Ledger::new(10_000.0);
        let mut seq = 0;
        for (buy_price, sell_price) in prices {
            let buy_fee = buy_price * quantity * fee_rate;
            ledger.apply(&fill(OrderSide::Buy, buy_price, quantity, buy_fee, seq)).unwrap();
            prop_assert!(!ledger.position().is_flat());

            let sell_fee = sell_price * quantity * fee_rate;
            ledger.apply(&fill(OrderSide::Sell, sell_price, quantity, sell_fee, seq + 1)).unwrap();
            prop_assert!(ledger.position().is_flat());
            prop_assert_eq!(ledger.mark(mark), 0.0);
            seq += 2;
        }

        let per_trade: f64 = ledger.closed_trades().iter().map(|t| t.pnl).sum();
        let tolerance = 1e-9 * (1.0 + ledger.realized_pnl().abs());
        prop_assert!((ledger.realized_pnl() - per_trade).abs() <= tolerance);
        prop_assert_eq!(ledger.fills().len(), ledger.closed_trades().len() * 2);
    }

    /// A sell can never be the first applied fill, whatever its shape.
    #[test]
    fn sell_into_flat_always_fails(
        price in 0.0001f64..1_000_000.0f64,
        quantity in 0.0001f64..1000.0f64,
    ) {
        let mut ledger = Ledger::new(10_000.0);
        let result = ledger.apply(&fill(OrderSide::Sell, price, quantity, 0.0, 0));
        prop_assert!(matches!(result, Err(common::Error::InvariantViolation(_))));
        prop_assert!(ledger.fills().is_empty());
    }
}
