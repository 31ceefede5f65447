// performance statistics computed from a finished run's equity curve and
// closed trades.

use std::fmt;

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::ohlc::OhlcSeries;
use crate::trade::Trade;

/// geometric mean of a return series; non-positive factors make the result
/// undefined, so we return 0.0 rather than NaN propagating everywhere.
pub fn geometric_mean(returns: &[f64]) -> f64 {
    if returns.is_empty() || returns.iter().any(|&r| r <= -1.0) {
        return 0.0;
    }
    let sum_logs: f64 = returns.iter().map(|&r| (1.0 + r).ln()).sum();
    (sum_logs / returns.len() as f64).exp() - 1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub start_date: String,
    pub end_date: String,
    pub duration_bars: usize,
    pub exposure_time_pct: f64,
    pub equity_final: f64,
    pub equity_peak: f64,
    pub return_pct: f64,
    pub buy_hold_return_pct: f64,
    pub return_ann_pct: f64,
    pub volatility_ann_pct: f64,
    pub cagr_pct: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub alpha_pct: f64,
    pub beta: f64,
    pub max_drawdown_pct: f64,
    pub avg_drawdown_pct: f64,
    pub max_drawdown_duration: usize,
    pub avg_drawdown_duration: usize,
    pub num_trades: usize,
    pub win_rate_pct: f64,
    pub best_trade_pct: f64,
    pub worst_trade_pct: f64,
    pub avg_trade_pct: f64,
    pub max_trade_duration: usize,
    pub avg_trade_duration: usize,
    pub profit_factor: f64,
    pub expectancy_pct: f64,
    pub sqn: f64,
    pub kelly_criterion: f64,
    /// per-bar drawdown percentage, aligned to the equity curve.
    pub drawdown_pct: Vec<f64>,
    /// per-bar running drawdown duration in bars, aligned to the equity curve.
    pub drawdown_duration: Vec<usize>,
}

struct DrawdownSeries {
    pct: Vec<f64>,
    duration: Vec<usize>,
    max_pct: f64,
    avg_pct: f64,
    max_duration: usize,
    avg_duration: usize,
}

fn drawdown_series(equity: &[f64]) -> DrawdownSeries {
    let mut pct = Vec::with_capacity(equity.len());
    let mut duration = Vec::with_capacity(equity.len());
    let mut peak = equity[0];
    let mut since_peak = 0usize;
    let mut troughs: Vec<f64> = Vec::new();
    let mut trough_durations: Vec<usize> = Vec::new();
    let mut cur_trough = 0.0f64;
    let mut in_drawdown = false;

    for &v in equity {
        if v >= peak {
            if in_drawdown {
                troughs.push(cur_trough);
                trough_durations.push(since_peak);
            }
            peak = v;
            since_peak = 0;
            in_drawdown = false;
            cur_trough = 0.0;
        } else {
            since_peak += 1;
            in_drawdown = true;
            let dd = (v - peak) / peak * 100.0;
            cur_trough = cur_trough.min(dd);
        }
        pct.push(if peak > 0.0 { (v - peak) / peak * 100.0 } else { 0.0 });
        duration.push(since_peak);
    }
    if in_drawdown {
        troughs.push(cur_trough);
        trough_durations.push(since_peak);
    }

    let max_pct = troughs.iter().cloned().fold(0.0f64, |a, b| a.min(b));
    let avg_pct = if troughs.is_empty() { 0.0 } else { troughs.iter().sum::<f64>() / troughs.len() as f64 };
    let max_duration = trough_durations.iter().cloned().max().unwrap_or(0);
    let avg_duration = if trough_durations.is_empty() {
        0
    } else {
        trough_durations.iter().sum::<usize>() / trough_durations.len()
    };

    DrawdownSeries { pct, duration, max_pct, avg_pct, max_duration, avg_duration }
}

fn covariance_beta(equity_returns: &[f64], market_returns: &[f64]) -> f64 {
    let n = equity_returns.len() as f64;
    if n < 2.0 {
        return 0.0;
    }
    let eq_mean = equity_returns.iter().sum::<f64>() / n;
    let mkt_mean = market_returns.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_m = 0.0;
    for i in 0..equity_returns.len() {
        cov += (equity_returns[i] - eq_mean) * (market_returns[i] - mkt_mean);
        var_m += (market_returns[i] - mkt_mean).powi(2);
    }
    if var_m == 0.0 {
        return 0.0;
    }
    cov / var_m
}

/// computes the full statistics record from the run's artifacts.
/// `risk_free_rate` is a fraction (e.g. 0.0), annualized the same way as
/// `return_ann_pct`. `periods_per_year` falls back to 252 for a
/// non-temporal or single-bar index.
pub fn compute_stats(trades: &[Trade], equity: &[f64], data: &OhlcSeries, risk_free_rate: f64) -> Stats {
    let start = 0;
    let end = equity.len() - 1;
    let duration_bars = end - start;

    let start_date = data.index[start].to_string();
    let end_date = data.index[end].to_string();

    let equity_final = equity[end];
    let equity_peak = equity.iter().cloned().fold(equity[0], f64::max);
    let return_pct = (equity_final - equity[0]) / equity[0] * 100.0;
    let buy_hold_return_pct = (data.close[data.close.len() - 1] - data.close[0]) / data.close[0] * 100.0;

    let periods_per_year = data.median_bar_seconds().map(|s| (365.25 * 24.0 * 3600.0) / s).unwrap_or(252.0);
    let years = duration_bars as f64 / periods_per_year;

    let return_ann_pct = if years > 0.0 {
        ((1.0 + return_pct / 100.0).powf(1.0 / years) - 1.0) * 100.0
    } else {
        0.0
    };
    let cagr_pct = return_ann_pct;

    let period_returns: Vec<f64> = equity.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect();
    let mean_return = if period_returns.is_empty() { 0.0 } else { period_returns.clone().mean() };
    let std_return = if period_returns.len() > 1 {
        let s = period_returns.clone().std_dev();
        if s.is_nan() { 0.0 } else { s }
    } else {
        0.0
    };
    let downside_std = if period_returns.len() > 1 {
        let downside: Vec<f64> = period_returns.iter().cloned().filter(|&r| r < 0.0).collect();
        if downside.is_empty() {
            0.0
        } else {
            (downside.iter().map(|r| r.powi(2)).sum::<f64>() / downside.len() as f64).sqrt()
        }
    } else {
        0.0
    };

    let volatility_ann_pct = std_return * periods_per_year.sqrt() * 100.0;

    let dd = drawdown_series(equity);
    let max_drawdown_pct = dd.max_pct;
    let avg_drawdown_pct = dd.avg_pct;

    let calmar_ratio = if max_drawdown_pct.abs() > 0.0 { return_ann_pct.abs() / max_drawdown_pct.abs() } else { 0.0 };
    let sharpe_ratio = if std_return != 0.0 {
        (mean_return * periods_per_year - risk_free_rate) / (std_return * periods_per_year.sqrt())
    } else {
        0.0
    };
    let sortino_ratio = if downside_std != 0.0 {
        (mean_return * periods_per_year - risk_free_rate) / (downside_std * periods_per_year.sqrt())
    } else {
        0.0
    };

    let num_trades = trades.len();
    let returns_pct: Vec<f64> = trades.iter().map(|t| t.pl_pct(t.exit_price.unwrap_or(t.entry_price)) * 100.0).collect();
    let pnls: Vec<f64> = trades.iter().map(|t| t.pl(t.exit_price.unwrap_or(t.entry_price))).collect();

    let num_wins = pnls.iter().filter(|&&p| p > 0.0).count();
    let win_rate_pct = if num_trades > 0 { num_wins as f64 / num_trades as f64 * 100.0 } else { 0.0 };

    let best_trade_pct = returns_pct.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let best_trade_pct = if best_trade_pct.is_finite() { best_trade_pct } else { 0.0 };
    let worst_trade_pct = returns_pct.iter().cloned().fold(f64::INFINITY, f64::min);
    let worst_trade_pct = if worst_trade_pct.is_finite() { worst_trade_pct } else { 0.0 };
    let avg_trade_pct = if returns_pct.is_empty() { 0.0 } else { returns_pct.iter().sum::<f64>() / returns_pct.len() as f64 };

    let durations: Vec<usize> = trades.iter().map(|t| t.duration(t.exit_bar.unwrap_or(t.entry_bar))).collect();
    let max_trade_duration = durations.iter().cloned().max().unwrap_or(0);
    let avg_trade_duration = if durations.is_empty() { 0 } else { durations.iter().sum::<usize>() / durations.len() };

    let profits: f64 = pnls.iter().cloned().filter(|&p| p > 0.0).sum();
    let losses: f64 = pnls.iter().cloned().filter(|&p| p < 0.0).sum();
    let profit_factor = if losses.abs() > 0.0 { profits / losses.abs() } else { f64::NAN };
    let expectancy_pct = avg_trade_pct;

    let sqn = if returns_pct.len() > 1 {
        let mean = returns_pct.iter().sum::<f64>() / returns_pct.len() as f64;
        let var = returns_pct.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns_pct.len() as f64 - 1.0);
        let std = var.sqrt();
        if std > 0.0 { mean / std * (returns_pct.len() as f64).sqrt() } else { 0.0 }
    } else {
        0.0
    };

    let num_losses = num_trades - num_wins;
    let kelly_criterion = if num_trades > 0 && num_losses > 0 {
        let avg_win_ret = pnls.iter().cloned().filter(|&p| p > 0.0).sum::<f64>() / num_wins.max(1) as f64;
        let avg_loss_ret = pnls.iter().cloned().filter(|&p| p < 0.0).sum::<f64>().abs() / num_losses as f64;
        let w = win_rate_pct / 100.0;
        if avg_loss_ret > 0.0 {
            let payoff = avg_win_ret / avg_loss_ret;
            w - (1.0 - w) / payoff
        } else {
            0.0
        }
    } else {
        0.0
    };

    let total_ticks = equity.len();
    let mut occupied = vec![false; total_ticks];
    for t in trades {
        let s = t.entry_bar;
        let e = t.exit_bar.unwrap_or(total_ticks - 1).min(total_ticks - 1);
        for tick in s..=e {
            occupied[tick] = true;
        }
    }
    let exposure_time_pct = occupied.iter().filter(|&&b| b).count() as f64 / total_ticks as f64 * 100.0;

    let market_returns: Vec<f64> = data.close.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect();
    let beta = covariance_beta(&period_returns, &market_returns[..period_returns.len().min(market_returns.len())]);
    let alpha_pct = return_pct - buy_hold_return_pct;

    Stats {
        start_date,
        end_date,
        duration_bars,
        exposure_time_pct,
        equity_final,
        equity_peak,
        return_pct,
        buy_hold_return_pct,
        return_ann_pct,
        volatility_ann_pct,
        cagr_pct,
        sharpe_ratio,
        sortino_ratio,
        calmar_ratio,
        alpha_pct,
        beta,
        max_drawdown_pct,
        avg_drawdown_pct,
        max_drawdown_duration: dd.max_duration,
        avg_drawdown_duration: dd.avg_duration,
        num_trades,
        win_rate_pct,
        best_trade_pct,
        worst_trade_pct,
        avg_trade_pct,
        max_trade_duration,
        avg_trade_duration,
        profit_factor,
        expectancy_pct,
        sqn,
        kelly_criterion,
        drawdown_pct: dd.pct,
        drawdown_duration: dd.duration,
    }
}

impl Stats {
    /// looks up a scalar field by name, used by the optimizer's `maximize`
    /// key and by heatmap reporting.
    pub fn field(&self, name: &str) -> Option<f64> {
        Some(match name {
            "equity_final" => self.equity_final,
            "equity_peak" => self.equity_peak,
            "return_pct" => self.return_pct,
            "buy_hold_return_pct" => self.buy_hold_return_pct,
            "return_ann_pct" => self.return_ann_pct,
            "volatility_ann_pct" => self.volatility_ann_pct,
            "cagr_pct" => self.cagr_pct,
            "sharpe_ratio" => self.sharpe_ratio,
            "sortino_ratio" => self.sortino_ratio,
            "calmar_ratio" => self.calmar_ratio,
            "alpha_pct" => self.alpha_pct,
            "beta" => self.beta,
            "max_drawdown_pct" => self.max_drawdown_pct,
            "avg_drawdown_pct" => self.avg_drawdown_pct,
            "win_rate_pct" => self.win_rate_pct,
            "best_trade_pct" => self.best_trade_pct,
            "worst_trade_pct" => self.worst_trade_pct,
            "avg_trade_pct" => self.avg_trade_pct,
            "profit_factor" => self.profit_factor,
            "expectancy_pct" => self.expectancy_pct,
            "sqn" => self.sqn,
            "kelly_criterion" => self.kelly_criterion,
            "exposure_time_pct" => self.exposure_time_pct,
            "num_trades" => self.num_trades as f64,
            _ => return None,
        })
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n\nBacktest Statistics:")?;
        writeln!(f, "====================")?;
        writeln!(f, "{:<35} {:>15}", "Start", self.start_date)?;
        writeln!(f, "{:<35} {:>15}", "End", self.end_date)?;
        writeln!(f, "{:<35} {:>15}", "Duration [bars]", self.duration_bars)?;
        writeln!(f, "{:<35} {:>15.2}", "Exposure Time [%]", self.exposure_time_pct)?;
        writeln!(f, "{:<35} {:>15.2}", "Equity Final [$]", self.equity_final)?;
        writeln!(f, "{:<35} {:>15.2}", "Equity Peak [$]", self.equity_peak)?;
        writeln!(f, "{:<35} {:>15.2}", "Return [%]", self.return_pct)?;
        writeln!(f, "{:<35} {:>15.2}", "Buy & Hold Return [%]", self.buy_hold_return_pct)?;
        writeln!(f, "{:<35} {:>15.2}", "Return (Ann.) [%]", self.return_ann_pct)?;
        writeln!(f, "{:<35} {:>15.2}", "Volatility (Ann.) [%]", self.volatility_ann_pct)?;
        writeln!(f, "{:<35} {:>15.2}", "CAGR [%]", self.cagr_pct)?;
        writeln!(f, "{:<35} {:>15.2}", "Sharpe Ratio", self.sharpe_ratio)?;
        writeln!(f, "{:<35} {:>15.2}", "Sortino Ratio", self.sortino_ratio)?;
        writeln!(f, "{:<35} {:>15.2}", "Calmar Ratio", self.calmar_ratio)?;
        writeln!(f, "{:<35} {:>15.2}", "Alpha [%]", self.alpha_pct)?;
        writeln!(f, "{:<35} {:>15.2}", "Beta", self.beta)?;
        writeln!(f, "{:<35} {:>15.2}", "Max. Drawdown [%]", self.max_drawdown_pct)?;
        writeln!(f, "{:<35} {:>15.2}", "Avg. Drawdown [%]", self.avg_drawdown_pct)?;
        writeln!(f, "{:<35} {:>15}", "Max. Drawdown Duration", self.max_drawdown_duration)?;
        writeln!(f, "{:<35} {:>15}", "Avg. Drawdown Duration", self.avg_drawdown_duration)?;
        writeln!(f, "{:<35} {:>15}", "# Trades", self.num_trades)?;
        writeln!(f, "{:<35} {:>15.2}", "Win Rate [%]", self.win_rate_pct)?;
        writeln!(f, "{:<35} {:>15.2}", "Best Trade [%]", self.best_trade_pct)?;
        writeln!(f, "{:<35} {:>15.2}", "Worst Trade [%]", self.worst_trade_pct)?;
        writeln!(f, "{:<35} {:>15.2}", "Avg. Trade [%]", self.avg_trade_pct)?;
        writeln!(f, "{:<35} {:>15}", "Max. Trade Duration", self.max_trade_duration)?;
        writeln!(f, "{:<35} {:>15}", "Avg. Trade Duration", self.avg_trade_duration)?;
        writeln!(f, "{:<35} {:>15.2}", "Profit Factor", self.profit_factor)?;
        writeln!(f, "{:<35} {:>15.2}", "Expectancy [%]", self.expectancy_pct)?;
        writeln!(f, "{:<35} {:>15.2}", "SQN", self.sqn)?;
        writeln!(f, "{:<35} {:>15.2}", "Kelly Criterion", self.kelly_criterion)?;
        write!(f, "====================")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn data(n: usize, close: f64) -> OhlcSeries {
        let base = NaiveDateTime::parse_from_str("2020-01-01 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let index = (0..n).map(|i| base + chrono::Duration::days(i as i64)).collect();
        OhlcSeries::new(index, vec![close; n], vec![close; n], vec![close; n], vec![close; n], None).unwrap()
    }

    #[test]
    fn flat_equity_has_zero_drawdown() {
        let equity = vec![1000.0; 10];
        let dd = drawdown_series(&equity);
        assert_eq!(dd.max_pct, 0.0);
        assert_eq!(dd.max_duration, 0);
    }

    #[test]
    fn drawdown_recovers_after_new_peak() {
        let equity = vec![100.0, 90.0, 80.0, 95.0, 110.0];
        let dd = drawdown_series(&equity);
        assert!(dd.max_pct < 0.0);
        assert_eq!(dd.duration[4], 0);
    }

    #[test]
    fn no_trades_gives_nan_profit_factor() {
        let d = data(5, 100.0);
        let equity = vec![1000.0; 5];
        let stats = compute_stats(&[], &equity, &d, 0.0);
        assert!(stats.profit_factor.is_nan());
        assert_eq!(stats.num_trades, 0);
    }
}
