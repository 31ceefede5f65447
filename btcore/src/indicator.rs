// a pre-computed, aligned numeric array declared during `Strategy::init`
// and lazily sliced to the visible prefix during `Strategy::next`.

#[derive(Debug, Clone)]
pub struct Indicator {
    pub name: String,
    pub values: Vec<f64>,
    pub plot: bool,
    pub overlay: bool,
    pub color: Option<String>,
    pub scatter: bool,
}

impl Indicator {
    /// the indicator's values restricted to the visible prefix `0..len`.
    /// no data is copied; this is a plain slice.
    pub fn prefix(&self, len: usize) -> &[f64] {
        &self.values[..len.min(self.values.len())]
    }

    /// count of leading NaNs: the warm-up contributed by this indicator.
    pub fn warmup_nbars(&self) -> usize {
        self.values.iter().take_while(|v| v.is_nan()).count()
    }

    /// default overlay heuristic: an indicator whose values mostly sit
    /// within 60%-140% of Close is drawn over the candlestick chart.
    pub fn infer_overlay(values: &[f64], close: &[f64]) -> bool {
        if values.len() != close.len() || values.is_empty() {
            return false;
        }
        let in_band = values
            .iter()
            .zip(close)
            .filter(|(v, c)| {
                if !v.is_finite() || **c == 0.0 {
                    return false;
                }
                let ratio = *v / **c;
                ratio < 1.4 && ratio > 0.6
            })
            .count();
        (in_band as f64 / values.len() as f64) > 0.6
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warmup_counts_leading_nans_only() {
        let ind = Indicator {
            name: "sma".into(),
            values: vec![f64::NAN, f64::NAN, 1.0, 2.0, f64::NAN],
            plot: true,
            overlay: false,
            color: None,
            scatter: false,
        };
        assert_eq!(ind.warmup_nbars(), 2);
    }

    #[test]
    fn overlay_heuristic_detects_price_scale_indicators() {
        let close = vec![100.0; 10];
        let sma = vec![101.0; 10];
        assert!(Indicator::infer_overlay(&sma, &close));

        let rsi = vec![55.0; 10];
        assert!(!Indicator::infer_overlay(&rsi, &close));
    }
}
