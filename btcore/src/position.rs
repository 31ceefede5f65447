// the aggregate over all open trades on the single instrument

use crate::trade::Trade;

/// a read-only snapshot of the aggregate open position. does not own the
/// trades; `Broker` is the source of truth and is what actually closes
/// trades when `StrategyContext::close_position` is invoked.
#[derive(Debug, Clone, Copy, Default)]
pub struct Position {
    pub size: i64,
    pub pl: f64,
    pub pl_pct: f64,
}

impl Position {
    pub fn from_trades(trades: &[Trade], price: f64) -> Self {
        let size: i64 = trades.iter().map(|t| t.size).sum();
        let pl: f64 = trades.iter().map(|t| t.pl(price)).sum();
        let cost: f64 = trades.iter().map(|t| t.size.unsigned_abs() as f64 * t.entry_price).sum();
        let pl_pct = if cost > 0.0 { pl / cost } else { 0.0 };
        Position { size, pl, pl_pct }
    }

    pub fn is_long(&self) -> bool {
        self.size > 0
    }

    pub fn is_short(&self) -> bool {
        self.size < 0
    }
}

/// number of units of `trade_size` to close for a `portion` close, rounded
/// to an integer with a floor of 1 unit when `portion > 0`.
pub fn close_units(trade_size: i64, portion: f64) -> i64 {
    if portion <= 0.0 {
        return 0;
    }
    let units = (trade_size.unsigned_abs() as f64 * portion).round() as i64;
    units.max(1).min(trade_size.unsigned_abs() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::Trade;

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
    fn position_size_is_signed_sum() {
        let trades = vec![trade(3, 100.0), trade(-1, 100.0)];
        assert_eq!(Position::from_trades(&trades, 100.0).size, 2);
    }

    #[test]
    fn partial_close_floors_to_at_least_one_unit() {
        assert_eq!(close_units(1, 0.5), 1);
        assert_eq!(close_units(10, 0.3), 3);
        assert_eq!(close_units(10, 1.0), 10);
        assert_eq!(close_units(10, 0.0), 0);
    }
}
