// property tests for the round-trip/idempotence properties the simulation
// kernel is expected to hold: repeat-run determinism, a degenerate
// single-combination grid search matching a direct run, and trade
// serialization round-tripping through serde_json.

use std::sync::Arc;

use chrono::NaiveDateTime;
use proptest::prelude::*;

use btcore::backtest::Backtest;
use btcore::broker::BrokerConfig;
use btcore::error::IndicatorError;
use btcore::ohlc::OhlcSeries;
use btcore::optimizer::{MaxTries, Maximize, Optimizer, ParamAxis, ParamGrid};
use btcore::order::TradeId;
use btcore::strategies::sma::SmaStrategy;
use btcore::strategy::{Strategy, StrategyContext};
use btcore::trade::Trade;

struct BuyOnceThenHold {
    bought: bool,
}

impl Strategy for BuyOnceThenHold {
    fn name(&self) -> &str {
        "BuyOnceThenHold"
    }
    fn init(&mut self, _ctx: &mut StrategyContext) -> Result<(), IndicatorError> {
        Ok(())
    }
    fn next(&mut self, ctx: &mut StrategyContext) {
        if !self.bought {
            let _ = ctx.buy(1.0, None, None, None, None, None);
            self.bought = true;
        }
    }
}

fn flat_series(closes: &[f64]) -> Arc<OhlcSeries> {
    let base = NaiveDateTime::parse_from_str("2020-01-01 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
    let n = closes.len();
    let index = (0..n).map(|i| base + chrono::Duration::days(i as i64)).collect();
    Arc::new(OhlcSeries::new(index, closes.to_vec(), closes.to_vec(), closes.to_vec(), closes.to_vec(), None).unwrap())
}

fn prices() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(50.0f64..200.0, 40..60)
}

proptest! {
    #[test]
    fn repeat_run_is_deterministic(closes in prices()) {
        let data = flat_series(&closes);
        let cfg = BrokerConfig { finalize_trades: true, ..BrokerConfig::default() };
        let mut bt1 = Backtest::new(data.clone(), BuyOnceThenHold { bought: false }, cfg.clone());
        let mut bt2 = Backtest::new(data, BuyOnceThenHold { bought: false }, cfg);
        let r1 = bt1.run().unwrap();
        let r2 = bt2.run().unwrap();
        prop_assert_eq!(r1.equity_curve, r2.equity_curve);
        prop_assert_eq!(r1.stats.num_trades, r2.stats.num_trades);
        prop_assert_eq!(r1.stats.equity_final, r2.stats.equity_final);
    }

    #[test]
    fn singleton_grid_matches_a_direct_run(closes in prices(), fast in 2usize..8) {
        let data = flat_series(&closes);
        let cfg = BrokerConfig { finalize_trades: true, ..BrokerConfig::default() };

        let grid: ParamGrid = vec![("fast_period".to_string(), ParamAxis::Ints(vec![fast as i64]))];
        let opt = Optimizer::new(1, Some(7));
        let result = opt
            .grid_search(
                Arc::clone(&data),
                cfg.clone(),
                &grid,
                None,
                Some(MaxTries::Fraction(1.0)),
                &Maximize::Field("return_pct".to_string()),
                || SmaStrategy::new(fast, 20),
            )
            .unwrap();

        let mut direct = Backtest::new(data, SmaStrategy::new(fast, 20), cfg);
        let direct_result = direct.run().unwrap();

        prop_assert_eq!(result.heatmap.len(), 1);
        prop_assert_eq!(result.best_stats.return_pct, direct_result.stats.return_pct);
        prop_assert_eq!(result.best_stats.num_trades, direct_result.stats.num_trades);
    }

    #[test]
    fn trade_round_trips_through_json(
        id in any::<TradeId>(),
        size in -100i64..100,
        entry_price in 1.0f64..10_000.0,
        entry_bar in 0usize..10_000,
        has_exit in any::<bool>(),
        exit_price in 1.0f64..10_000.0,
        exit_bar in 0usize..10_000,
        tag in prop::option::of("[a-z]{1,12}"),
    ) {
        prop_assume!(size != 0);
        let trade = Trade {
            id,
            size,
            entry_price,
            entry_bar,
            exit_price: has_exit.then_some(exit_price),
            exit_bar: has_exit.then_some(exit_bar),
            sl: None,
            tp: None,
            tag,
        };
        let json = serde_json::to_string(&trade).unwrap();
        let back: Trade = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back.id, trade.id);
        prop_assert_eq!(back.size, trade.size);
        prop_assert_eq!(back.entry_price, trade.entry_price);
        prop_assert_eq!(back.entry_bar, trade.entry_bar);
        prop_assert_eq!(back.exit_price, trade.exit_price);
        prop_assert_eq!(back.exit_bar, trade.exit_bar);
        prop_assert_eq!(back.tag, trade.tag);
    }
}
