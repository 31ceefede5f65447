// classic two-moving-average crossover: long on a bullish cross, flat on a
// bearish cross.

use crate::error::IndicatorError;
use crate::strategy::{IndicatorHandle, Strategy, StrategyContext, FULL_EQUITY};

fn sma(close: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; close.len()];
    if period == 0 || close.len() < period {
        return out;
    }
    let mut sum: f64 = close[..period].iter().sum();
    out[period - 1] = sum / period as f64;
    for i in period..close.len() {
        sum += close[i] - close[i - period];
        out[i] = sum / period as f64;
    }
    out
}

pub struct SmaStrategy {
    fast_period: usize,
    slow_period: usize,
    fast: Option<IndicatorHandle>,
    slow: Option<IndicatorHandle>,
}

impl SmaStrategy {
    pub fn new(fast_period: usize, slow_period: usize) -> Self {
        SmaStrategy { fast_period, slow_period, fast: None, slow: None }
    }
}

impl Default for SmaStrategy {
    fn default() -> Self {
        SmaStrategy::new(10, 20)
    }
}

impl Strategy for SmaStrategy {
    fn name(&self) -> &str {
        "SmaStrategy"
    }

    fn init(&mut self, ctx: &mut StrategyContext) -> Result<(), IndicatorError> {
        let close = ctx.data().full_series().close.clone();
        let fast_values = sma(&close, self.fast_period);
        let slow_values = sma(&close, self.slow_period);
        self.fast = Some(ctx.add_indicator(format!("sma{}", self.fast_period), fast_values, true, Some(true), None, false)?);
        self.slow = Some(ctx.add_indicator(format!("sma{}", self.slow_period), slow_values, true, Some(true), None, false)?);
        Ok(())
    }

    fn next(&mut self, ctx: &mut StrategyContext) {
        let fast = ctx.indicator(self.fast.unwrap());
        let slow = ctx.indicator(self.slow.unwrap());
        let n = fast.len();
        if n < 2 || slow.len() < 2 {
            return;
        }
        let curr_diff = fast[n - 1] - slow[n - 1];
        let prev_diff = fast[n - 2] - slow[n - 2];
        if curr_diff.is_nan() || prev_diff.is_nan() {
            return;
        }

        if prev_diff <= 0.0 && curr_diff > 0.0 && ctx.position().size == 0 {
            if let Err(e) = ctx.buy(FULL_EQUITY, None, None, None, None, None) {
                log::warn!("SmaStrategy: buy rejected: {e}");
            }
        } else if prev_diff >= 0.0 && curr_diff < 0.0 && ctx.position().size > 0 {
            ctx.close_position(1.0);
        }
    }

    fn set_param(&mut self, key: &str, value: f64) -> Result<(), crate::error::ConfigError> {
        match key {
            "fast_period" => {
                self.fast_period = value.round().max(1.0) as usize;
                Ok(())
            }
            "slow_period" => {
                self.slow_period = value.round().max(1.0) as usize;
                Ok(())
            }
            _ => Err(crate::error::ConfigError::UnknownParameter {
                strategy: self.name().to_string(),
                param: key.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_has_leading_nans_equal_to_period_minus_one() {
        let close = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let out = sma(&close, 3);
        assert!(out[0].is_nan() && out[1].is_nan());
        assert!((out[2] - 2.0).abs() < 1e-9);
        assert!((out[4] - 4.0).abs() < 1e-9);
    }
}
