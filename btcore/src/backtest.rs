// the simulation loop: drives the broker and a strategy bar by bar over a
// revealed prefix of the data, then reduces the run to a statistics record.

use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};

use crate::broker::{Broker, BrokerConfig};
use crate::error::{BacktestError, ConfigError};
use crate::indicator::Indicator;
use crate::ohlc::{DataWindow, OhlcSeries};
use crate::stats::{compute_stats, Stats};
use crate::strategy::{Strategy, StrategyContext};
use crate::trade::Trade;

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub stats: Stats,
    pub equity_curve: Vec<f64>,
    pub closed_trades: Vec<Trade>,
    pub indicators: Vec<Indicator>,
}

pub struct Backtest<S: Strategy> {
    data: Arc<OhlcSeries>,
    strategy: S,
    broker_config: BrokerConfig,
    risk_free_rate: f64,
}

impl<S: Strategy> Backtest<S> {
    pub fn new(data: Arc<OhlcSeries>, strategy: S, broker_config: BrokerConfig) -> Self {
        Backtest { data, strategy, broker_config, risk_free_rate: 0.0 }
    }

    pub fn with_risk_free_rate(mut self, rate: f64) -> Self {
        self.risk_free_rate = rate;
        self
    }

    pub fn strategy_mut(&mut self) -> &mut S {
        &mut self.strategy
    }

    /// runs the full simulation: `init` sees the whole series so indicators
    /// can be precomputed, then `next` is called once per bar starting at
    /// the warm-up boundary (1 + the longest indicator's leading-NaN run).
    pub fn run(&mut self) -> Result<BacktestResult, BacktestError> {
        let n = self.data.len();
        if n == 0 {
            return Err(ConfigError::EmptyData.into());
        }

        let mut broker = Broker::new(self.broker_config.clone(), Arc::clone(&self.data));
        let mut indicators: Vec<Indicator> = Vec::new();

        {
            let window = DataWindow::full(Arc::clone(&self.data));
            let mut ctx = StrategyContext { broker: &mut broker, indicators: &mut indicators, data: window, bar: n - 1 };
            self.strategy.init(&mut ctx)?;
        }

        let warmup_bars = indicators.iter().map(|i| i.warmup_nbars()).max().unwrap_or(0);
        let start = (1 + warmup_bars).min(n - 1).max(1);

        let mut window = DataWindow::full(Arc::clone(&self.data));
        let mut aborted_at: Option<usize> = None;

        let pb = ProgressBar::new((n - start) as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{desc:.green} {bar:40.white} {percentage:>3}% | {pos:>7}/{len:7} [{elapsed_precise}<{eta_precise}] {msg}")
                .unwrap()
                .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        pb.set_message("running backtest...");

        for bar in start..n {
            window.reveal(bar + 1);
            if broker.on_bar(bar).is_err() {
                aborted_at = Some(bar);
                break;
            }
            let mut ctx = StrategyContext {
                broker: &mut broker,
                indicators: &mut indicators,
                data: window.clone(),
                bar,
            };
            self.strategy.next(&mut ctx);
            pb.inc(1);
        }
        pb.finish_with_message("");

        match aborted_at {
            Some(bar) => broker.backfill_equity_from(bar),
            None => broker.finalize(),
        }

        let stats = compute_stats(broker.closed_trades(), broker.equity_history(), &self.data, self.risk_free_rate);

        Ok(BacktestResult {
            stats,
            equity_curve: broker.equity_history().to_vec(),
            closed_trades: broker.closed_trades().to_vec(),
            indicators,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    struct BuyAndHold;

    impl Strategy for BuyAndHold {
        fn name(&self) -> &str {
            "BuyAndHold"
        }

        fn init(&mut self, _ctx: &mut StrategyContext) -> Result<(), crate::error::IndicatorError> {
            Ok(())
        }

        fn next(&mut self, ctx: &mut StrategyContext) {
            if ctx.position().size == 0 {
                let _ = ctx.buy(crate::strategy::FULL_EQUITY, None, None, None, None, None);
            }
        }
    }

    fn data(closes: &[f64]) -> Arc<OhlcSeries> {
        let base = NaiveDateTime::parse_from_str("2020-01-01 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let n = closes.len();
        let index = (0..n).map(|i| base + chrono::Duration::days(i as i64)).collect();
        Arc::new(OhlcSeries::new(index, closes.to_vec(), closes.to_vec(), closes.to_vec(), closes.to_vec(), None).unwrap())
    }

    #[test]
    fn buy_and_hold_tracks_price_appreciation() {
        let series = data(&[100.0, 101.0, 102.0, 103.0, 104.0, 105.0]);
        let mut bt = Backtest::new(series, BuyAndHold, BrokerConfig { finalize_trades: true, ..BrokerConfig::default() });
        let result = bt.run().unwrap();
        assert!(result.stats.return_pct > 0.0);
        assert_eq!(result.stats.num_trades, 1);
    }

    #[test]
    fn empty_data_is_rejected() {
        let base = NaiveDateTime::parse_from_str("2020-01-01 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let _ = base;
        let series = Arc::new(OhlcSeries::new(vec![], vec![], vec![], vec![], vec![], None));
        assert!(series.is_err());
    }
}
