// a realized or open slice of the position

use serde::{Deserialize, Serialize};

use crate::order::TradeId;

/// contingent sl/tp live directly on the trade (mutating them re-prices the
/// trigger) rather than as separate addressable orders; the broker evaluates
/// them against each bar's range directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    /// signed integer unit count; positive = long, negative = short.
    pub size: i64,
    pub entry_price: f64,
    pub entry_bar: usize,
    pub exit_price: Option<f64>,
    pub exit_bar: Option<usize>,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    pub tag: Option<String>,
}

impl Trade {
    pub fn is_long(&self) -> bool {
        self.size > 0
    }

    pub fn is_open(&self) -> bool {
        self.exit_price.is_none()
    }

    /// profit in account currency given `price` (current close for open
    /// trades, the realized exit price for closed ones).
    pub fn pl(&self, price: f64) -> f64 {
        let exit = self.exit_price.unwrap_or(price);
        self.size as f64 * (exit - self.entry_price)
    }

    pub fn pl_pct(&self, price: f64) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        let exit = self.exit_price.unwrap_or(price);
        (exit / self.entry_price - 1.0) * self.size.signum() as f64
    }

    pub fn value(&self, price: f64) -> f64 {
        self.size as f64 * price
    }

    pub fn duration(&self, current_bar: usize) -> usize {
        self.exit_bar.unwrap_or(current_bar).saturating_sub(self.entry_bar)
    }

    pub(crate) fn close(&mut self, bar: usize, price: f64) {
        self.exit_price = Some(price);
        self.exit_bar = Some(bar);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(size: i64, entry: f64) -> Trade {
        Trade {
            id: 0,
            size,
            entry_price: entry,
            entry_bar: 0,
            exit_price: None,
            exit_bar: None,
            sl: None,
            tp: None,
            tag: None,
        }
    }

    #[test]
    fn long_pl_is_positive_on_price_increase() {
        let t = trade(10, 100.0);
        assert_eq!(t.pl(110.0), 100.0);
        assert!((t.pl_pct(110.0) - 0.10).abs() < 1e-12);
    }

    #[test]
    fn short_pl_is_positive_on_price_decrease() {
        let t = trade(-10, 100.0);
        assert_eq!(t.pl(90.0), 100.0);
        assert!((t.pl_pct(90.0) - 0.10).abs() < 1e-12);
    }

    #[test]
    fn closed_trade_uses_exit_price_not_current_price() {
        let mut t = trade(10, 100.0);
        t.close(5, 105.0);
        assert_eq!(t.pl(999.0), 50.0);
    }
}
