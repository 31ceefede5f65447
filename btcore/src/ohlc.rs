// the data window: owns the full bar series and exposes a prefix view that
// grows one bar at a time as the simulation progresses.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::error::ConfigError;

/// full OHLCV bar series plus any opaque pass-through columns.
#[derive(Clone, Debug)]
pub struct OhlcSeries {
    pub index: Vec<NaiveDateTime>,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Option<Vec<f64>>,
    pub extra: HashMap<String, Vec<f64>>,
    pip: f64,
}

impl OhlcSeries {
    pub fn new(
        index: Vec<NaiveDateTime>,
        open: Vec<f64>,
        high: Vec<f64>,
        low: Vec<f64>,
        close: Vec<f64>,
        volume: Option<Vec<f64>>,
    ) -> Result<Self, ConfigError> {
        if index.is_empty() {
            return Err(ConfigError::EmptyData);
        }
        let n = index.len();
        if open.len() != n || high.len() != n || low.len() != n || close.len() != n {
            return Err(ConfigError::MissingColumns);
        }
        if open.iter().chain(&high).chain(&low).chain(&close).any(|v| !v.is_finite()) {
            return Err(ConfigError::NullOhlc);
        }
        let pip = infer_pip(&open, &high, &low, &close);
        Ok(OhlcSeries { index, open, high, low, close, volume, extra: HashMap::new(), pip })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn pip(&self) -> f64 {
        self.pip
    }

    /// true if the index is strictly increasing.
    pub fn is_monotonic_increasing(&self) -> bool {
        self.index.windows(2).all(|w| w[0] < w[1])
    }

    /// sorts all columns in place by index; used when the caller's data
    /// arrived unsorted (a runtime data warning, not a configuration error).
    pub fn sort_by_index(&mut self) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by_key(|&i| self.index[i]);
        self.index = order.iter().map(|&i| self.index[i]).collect();
        self.open = order.iter().map(|&i| self.open[i]).collect();
        self.high = order.iter().map(|&i| self.high[i]).collect();
        self.low = order.iter().map(|&i| self.low[i]).collect();
        self.close = order.iter().map(|&i| self.close[i]).collect();
        if let Some(v) = &self.volume {
            self.volume = Some(order.iter().map(|&i| v[i]).collect());
        }
        for col in self.extra.values_mut() {
            *col = order.iter().map(|&i| col[i]).collect();
        }
    }

    /// median inter-bar gap in seconds, used to infer bars-per-year.
    pub fn median_bar_seconds(&self) -> Option<f64> {
        if self.len() < 2 {
            return None;
        }
        let mut deltas: Vec<f64> = self
            .index
            .windows(2)
            .map(|w| (w[1] - w[0]).num_seconds() as f64)
            .collect();
        deltas.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let mid = deltas.len() / 2;
        Some(if deltas.len() % 2 == 0 {
            (deltas[mid - 1] + deltas[mid]) / 2.0
        } else {
            deltas[mid]
        })
    }
}

fn infer_pip(open: &[f64], high: &[f64], low: &[f64], close: &[f64]) -> f64 {
    let mut max_decimals = 0u32;
    for &v in open.iter().chain(high).chain(low).chain(close) {
        max_decimals = max_decimals.max(decimal_places(v));
    }
    10f64.powi(-(max_decimals as i32))
}

fn decimal_places(v: f64) -> u32 {
    let s = format!("{v}");
    match s.split_once('.') {
        Some((_, frac)) => frac.trim_end_matches('0').len() as u32,
        None => 0,
    }
}

/// prefix view: the bars visible to the strategy at a given point of
/// simulated "now". the last element along any column is always the most
/// recent bar. never owns the series; just a shared pointer plus a length.
#[derive(Clone)]
pub struct DataWindow {
    series: Arc<OhlcSeries>,
    len: usize,
}

impl DataWindow {
    pub fn full(series: Arc<OhlcSeries>) -> Self {
        let len = series.len();
        DataWindow { series, len }
    }

    pub fn reveal(&mut self, len: usize) {
        self.len = len.min(self.series.len());
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn index(&self) -> &[NaiveDateTime] {
        &self.series.index[..self.len]
    }

    pub fn open(&self) -> &[f64] {
        &self.series.open[..self.len]
    }

    pub fn high(&self) -> &[f64] {
        &self.series.high[..self.len]
    }

    pub fn low(&self) -> &[f64] {
        &self.series.low[..self.len]
    }

    pub fn close(&self) -> &[f64] {
        &self.series.close[..self.len]
    }

    pub fn volume(&self) -> Option<&[f64]> {
        self.series.volume.as_deref().map(|v| &v[..self.len])
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.series.extra.get(name).map(|v| &v[..self.len])
    }

    pub fn pip(&self) -> f64 {
        self.series.pip()
    }

    pub fn full_series(&self) -> &OhlcSeries {
        &self.series
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(n: usize) -> OhlcSeries {
        let base = NaiveDateTime::parse_from_str("2020-01-01 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let index = (0..n).map(|i| base + chrono::Duration::days(i as i64)).collect();
        OhlcSeries::new(index, vec![100.0; n], vec![100.0; n], vec![100.0; n], vec![100.0; n], None).unwrap()
    }

    #[test]
    fn prefix_view_grows_without_copy() {
        let series = Arc::new(make(10));
        let mut view = DataWindow::full(series);
        view.reveal(3);
        assert_eq!(view.close().len(), 3);
        view.reveal(7);
        assert_eq!(view.close().len(), 7);
    }

    #[test]
    fn pip_inferred_from_fractional_digits() {
        let base = NaiveDateTime::parse_from_str("2020-01-01 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let index = vec![base, base + chrono::Duration::days(1)];
        let series = OhlcSeries::new(
            index,
            vec![100.123, 100.1],
            vec![100.456, 100.2],
            vec![99.0, 99.1],
            vec![100.12, 100.15],
            None,
        )
        .unwrap();
        assert!((series.pip() - 0.001).abs() < 1e-12);
    }

    #[test]
    fn empty_data_is_config_error() {
        let err = OhlcSeries::new(vec![], vec![], vec![], vec![], vec![], None).unwrap_err();
        assert_eq!(err, ConfigError::EmptyData);
    }
}
