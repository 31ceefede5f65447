// order matching, fills, margin accounting and equity tracking for a
// single-instrument account.

use std::sync::Arc;

use log::warn;

use crate::commission::Commission;
use crate::error::{ConfigError, OutOfMoney};
use crate::ohlc::OhlcSeries;
use crate::order::{Order, OrderId, TradeId};
use crate::trade::Trade;

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub cash: f64,
    pub spread: f64,
    pub commission: Commission,
    pub margin: f64,
    pub trade_on_close: bool,
    pub hedging: bool,
    pub exclusive_orders: bool,
    pub finalize_trades: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            cash: 10_000.0,
            spread: 0.0,
            commission: Commission::default(),
            margin: 1.0,
            trade_on_close: false,
            hedging: false,
            exclusive_orders: false,
            finalize_trades: false,
        }
    }
}

pub struct Broker {
    data: Arc<OhlcSeries>,
    cash: f64,
    spread: f64,
    commission: Commission,
    margin: f64,
    trade_on_close: bool,
    hedging: bool,
    exclusive_orders: bool,
    finalize_trades: bool,
    orders: Vec<Order>,
    trades: Vec<Trade>,
    closed_trades: Vec<Trade>,
    equity: Vec<f64>,
    next_order_id: OrderId,
    next_trade_id: TradeId,
}

impl Broker {
    pub fn new(config: BrokerConfig, data: Arc<OhlcSeries>) -> Self {
        let n = data.len();
        Broker {
            data,
            cash: config.cash,
            spread: config.spread,
            commission: config.commission,
            margin: config.margin,
            trade_on_close: config.trade_on_close,
            hedging: config.hedging,
            exclusive_orders: config.exclusive_orders,
            finalize_trades: config.finalize_trades,
            orders: Vec::new(),
            trades: Vec::new(),
            closed_trades: Vec::new(),
            equity: vec![config.cash; n],
            next_order_id: 0,
            next_trade_id: 0,
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn closed_trades(&self) -> &[Trade] {
        &self.closed_trades
    }

    pub fn equity_history(&self) -> &[f64] {
        &self.equity
    }

    /// mark-to-market account value: cash plus unrealized p/l of open trades.
    pub fn equity_now(&self, price: f64) -> f64 {
        self.cash + self.trades.iter().map(|t| t.pl(price)).sum::<f64>()
    }

    fn margin_used_sum(&self) -> f64 {
        self.trades
            .iter()
            .map(|t| t.size.unsigned_abs() as f64 * t.entry_price * self.margin)
            .sum()
    }

    pub fn margin_available(&self, price: f64) -> f64 {
        self.equity_now(price) * self.margin - self.margin_used_sum()
    }

    /// the price a fill actually executes at once spread and the relative
    /// commission component are applied; `size` only needs the right sign.
    pub fn adjusted_price(&self, size: f64, price: f64) -> f64 {
        let half_spread = self.spread / 2.0;
        let rel = self.commission.relative();
        if size > 0.0 {
            price * (1.0 + half_spread) * (1.0 + rel)
        } else if size < 0.0 {
            price * (1.0 - half_spread) * (1.0 - rel)
        } else {
            price
        }
    }

    /// queues (or, for an unconditional market order under `trade_on_close`,
    /// immediately fills) a new order. `bar` is the bar the strategy is
    /// reacting to; a plain market order normally fills at the *next* bar's
    /// open, unless `trade_on_close` is set, in which case it fills right
    /// away at this bar's close.
    pub fn submit_order(&mut self, mut order: Order, bar: usize) -> Result<OrderId, ConfigError> {
        let ref_price = self.data.close[bar];
        order.validate(ref_price)?;
        order.id = self.next_order_id;
        self.next_order_id += 1;
        let id = order.id;

        if order.is_market() && self.trade_on_close {
            self.fill_order(order, bar, ref_price);
            return Ok(id);
        }

        self.orders.push(order);
        Ok(id)
    }

    pub fn cancel_order(&mut self, id: OrderId) {
        self.orders.retain(|o| o.id != id);
    }

    /// re-prices the sl/tp of an open trade. contingent orders are not
    /// materialized separately, so this is a direct field update.
    pub fn set_trade_sl(&mut self, trade_id: TradeId, sl: Option<f64>) -> Result<(), ConfigError> {
        let t = self
            .trades
            .iter_mut()
            .find(|t| t.id == trade_id)
            .ok_or(ConfigError::ParentTradeClosed)?;
        t.sl = sl;
        Ok(())
    }

    pub fn set_trade_tp(&mut self, trade_id: TradeId, tp: Option<f64>) -> Result<(), ConfigError> {
        let t = self
            .trades
            .iter_mut()
            .find(|t| t.id == trade_id)
            .ok_or(ConfigError::ParentTradeClosed)?;
        t.tp = tp;
        Ok(())
    }

    /// closes `portion` (0,1] of an open trade's units, at least one unit.
    pub fn close_trade_portion(&mut self, trade_id: TradeId, bar: usize, portion: f64) {
        let price = self.data.close[bar];
        let total = match self.trades.iter().find(|t| t.id == trade_id) {
            Some(t) => t.size.unsigned_abs() as i64,
            None => return,
        };
        let units = crate::position::close_units(total, portion);
        if units > 0 {
            self.close_units_of_trade(trade_id, bar, price, units);
        }
    }

    pub fn close_all_trades(&mut self, bar: usize) {
        let ids: Vec<TradeId> = self.trades.iter().map(|t| t.id).collect();
        let price = self.data.close[bar];
        for id in ids {
            if let Some(t) = self.trades.iter().find(|t| t.id == id) {
                let total = t.size.unsigned_abs() as i64;
                self.close_units_of_trade(id, bar, price, total);
            }
        }
        self.orders.retain(|o| o.is_contingent());
    }

    /// runs one bar of the matching engine: contingent sl/tp for
    /// pre-existing trades, then pending order processing, then records
    /// equity. returns `Err(OutOfMoney)` if equity drops to or below zero.
    pub fn on_bar(&mut self, bar: usize) -> Result<(), OutOfMoney> {
        self.check_contingent_exits(bar);
        self.process_pending_orders(bar);

        let price = self.data.close[bar];
        let equity = self.equity_now(price);
        self.equity[bar] = equity;
        if equity <= 0.0 {
            return Err(OutOfMoney);
        }
        Ok(())
    }

    /// checks stop-loss/take-profit for trades that were already open
    /// *before* this bar. a trade opened during this same bar (at this
    /// bar's open) is checked separately, right after it is created, against
    /// the remainder of the bar's range.
    fn check_contingent_exits(&mut self, bar: usize) {
        let open = self.data.open[bar];
        let mut hits: Vec<(TradeId, f64)> = Vec::new();
        for t in &self.trades {
            if t.entry_bar == bar {
                continue;
            }
            if let Some(exit) = contingent_exit(t, open, self.data.high[bar], self.data.low[bar]) {
                hits.push((t.id, exit));
            }
        }
        for (id, raw_price) in hits {
            if let Some(t) = self.trades.iter().find(|t| t.id == id) {
                let units = t.size.unsigned_abs() as i64;
                self.close_units_of_trade(id, bar, raw_price, units);
            }
        }
    }

    /// checks a trade that was just opened this bar against the remainder
    /// of the bar's high/low. skipped for `trade_on_close` fills, which
    /// enter at the bar's close and so have no remaining range to trigger in.
    fn check_same_bar_contingent(&mut self, trade_id: TradeId, bar: usize) {
        if self.trade_on_close {
            return;
        }
        let open = self.data.open[bar];
        let high = self.data.high[bar];
        let low = self.data.low[bar];
        let exit = match self.trades.iter().find(|t| t.id == trade_id) {
            Some(t) => contingent_exit(t, open, high, low),
            None => None,
        };
        if let Some(raw_price) = exit {
            let units = self
                .trades
                .iter()
                .find(|t| t.id == trade_id)
                .map(|t| t.size.unsigned_abs() as i64)
                .unwrap_or(0);
            if units > 0 {
                self.close_units_of_trade(trade_id, bar, raw_price, units);
            }
        }
    }

    /// walks pending orders in submission order: stops degenerate to
    /// limit/market on crossing, limits fill at the limit (or a better
    /// open), and markets fill at open (or close, under `trade_on_close`).
    fn process_pending_orders(&mut self, bar: usize) {
        let open = self.data.open[bar];
        let high = self.data.high[bar];
        let low = self.data.low[bar];
        let close = self.data.close[bar];

        let mut i = 0;
        while i < self.orders.len() {
            if self.orders[i].is_contingent() {
                i += 1;
                continue;
            }
            let mut order = self.orders[i].clone();

            if let Some(stop) = order.stop {
                let crossed = if order.is_long() { high >= stop } else { low <= stop };
                if !crossed {
                    i += 1;
                    continue;
                }
                order.stop = None;
            }

            let fill_price = if let Some(limit) = order.limit {
                let reachable = if order.is_long() { low <= limit } else { high >= limit };
                if !reachable {
                    i += 1;
                    continue;
                }
                if order.is_long() {
                    if open <= limit { open } else { limit }
                } else if open >= limit {
                    open
                } else {
                    limit
                }
            } else if self.trade_on_close {
                close
            } else {
                open
            };

            self.orders.remove(i);
            self.fill_order(order, bar, fill_price);
        }
    }

    /// converts a filled order into trade(s): resolves fractional sizing,
    /// closes the opposing position first when `exclusive_orders`, nets
    /// FIFO against opposite trades unless `hedging`, and opens a new trade
    /// for any residual size.
    fn fill_order(&mut self, order: Order, bar: usize, raw_price: f64) {
        let price_for_sizing = self.adjusted_price(order.size, raw_price);
        let equity = self.equity_now(self.data.close[bar]);
        let mag = order.size.abs();
        let units: i64 = if mag < 1.0 {
            ((mag * equity) / price_for_sizing).floor() as i64
        } else {
            mag.round() as i64
        };
        if units == 0 {
            warn!("order resolved to 0 units at bar {bar}; cancelled");
            return;
        }
        let mut remaining = if order.is_long() { units } else { -units };

        if self.exclusive_orders {
            self.close_all_trades(bar);
        }

        if !self.hedging {
            let opposite: Vec<TradeId> = self
                .trades
                .iter()
                .filter(|t| (t.size > 0) != (remaining > 0))
                .map(|t| t.id)
                .collect();
            for tid in opposite {
                if remaining == 0 {
                    break;
                }
                let t_units = match self.trades.iter().find(|t| t.id == tid) {
                    Some(t) => t.size.unsigned_abs() as i64,
                    None => continue,
                };
                let close_amount = t_units.min(remaining.abs());
                self.close_units_of_trade(tid, bar, raw_price, close_amount);
                remaining -= close_amount * remaining.signum();
            }
        }

        if remaining != 0 {
            let adjusted = self.adjusted_price(remaining as f64, raw_price);
            let margin_needed = remaining.unsigned_abs() as f64 * adjusted * self.margin;
            if margin_needed > self.margin_available(self.data.close[bar]) {
                warn!("order at bar {bar} exceeds available margin; cancelled");
                return;
            }
            self.open_trade(remaining, bar, adjusted, order.sl, order.tp, order.tag);
        }
    }

    fn open_trade(
        &mut self,
        size: i64,
        bar: usize,
        adjusted_price: f64,
        sl: Option<f64>,
        tp: Option<f64>,
        tag: Option<String>,
    ) -> TradeId {
        let id = self.next_trade_id;
        self.next_trade_id += 1;
        let fee = self.commission.flat_fee(size as f64, adjusted_price);
        self.cash -= fee;
        self.trades.push(Trade {
            id,
            size,
            entry_price: adjusted_price,
            entry_bar: bar,
            exit_price: None,
            exit_bar: None,
            sl,
            tp,
            tag,
        });
        self.check_same_bar_contingent(id, bar);
        id
    }

    /// closes `units` (<= the trade's total size) of a trade at `raw_price`,
    /// adjusted for spread/commission on the exit side. if `units` is less
    /// than the trade's full size the remainder stays open under the same
    /// id, so any outstanding sl/tp keep applying to it.
    fn close_units_of_trade(&mut self, trade_id: TradeId, bar: usize, raw_price: f64, units: i64) {
        let idx = match self.trades.iter().position(|t| t.id == trade_id) {
            Some(i) => i,
            None => return,
        };
        let trade = self.trades[idx].clone();
        let total = trade.size.unsigned_abs() as i64;
        let units = units.min(total);
        if units <= 0 {
            return;
        }
        let closing_size = if trade.size > 0 { units } else { -units };
        let exit_sign = -(closing_size.signum() as f64);
        let adjusted_exit = self.adjusted_price(exit_sign, raw_price);
        let fee = self.commission.flat_fee(-(closing_size as f64), adjusted_exit);

        self.cash += closing_size as f64 * (adjusted_exit - trade.entry_price) - fee;

        let mut closed_slice = trade.clone();
        closed_slice.size = closing_size;
        closed_slice.close(bar, adjusted_exit);
        self.closed_trades.push(closed_slice);

        if units == total {
            self.trades.remove(idx);
        } else {
            self.trades[idx].size -= closing_size;
        }
    }

    /// end-of-run cleanup: closes every still-open trade at the final bar's
    /// close, re-running the matching engine once more so the closure is
    /// reflected in the final equity point. only active when configured.
    /// fills the equity curve from `from` to the end with the last bar's
    /// value, used when the simulation aborts early on an out-of-money tick.
    pub fn backfill_equity_from(&mut self, from: usize) {
        if from == 0 {
            return;
        }
        let last = self.equity[from - 1];
        for e in &mut self.equity[from..] {
            *e = last;
        }
    }

    pub fn finalize(&mut self) {
        if !self.finalize_trades || self.trades.is_empty() {
            return;
        }
        let last = self.data.len() - 1;
        self.close_all_trades(last);
        let price = self.data.close[last];
        self.equity[last] = self.equity_now(price);
    }
}

/// the exit price a trade's sl/tp would fill at against this bar's range,
/// or `None` if neither is reached. stop-loss wins ties; both fills use
/// gap-through pricing (`min`/`max` against the bar's open).
fn contingent_exit(t: &Trade, open: f64, high: f64, low: f64) -> Option<f64> {
    if t.sl.is_none() && t.tp.is_none() {
        return None;
    }
    if t.is_long() {
        if let Some(sl) = t.sl {
            if low <= sl {
                return Some(sl.min(open));
            }
        }
        if let Some(tp) = t.tp {
            if high >= tp {
                return Some(tp.max(open));
            }
        }
    } else {
        if let Some(sl) = t.sl {
            if high >= sl {
                return Some(sl.max(open));
            }
        }
        if let Some(tp) = t.tp {
            if low <= tp {
                return Some(tp.min(open));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn series(n: usize, open: f64, high: f64, low: f64, close: f64) -> Arc<OhlcSeries> {
        let base = NaiveDateTime::parse_from_str("2020-01-01 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let index = (0..n).map(|i| base + chrono::Duration::days(i as i64)).collect();
        Arc::new(
            OhlcSeries::new(
                index,
                vec![open; n],
                vec![high; n],
                vec![low; n],
                vec![close; n],
                None,
            )
            .unwrap(),
        )
    }

    fn order(size: f64) -> Order {
        Order {
            id: 0,
            size,
            limit: None,
            stop: None,
            sl: None,
            tp: None,
            tag: None,
            parent_trade: None,
            state: crate::order::OrderState::Pending,
        }
    }

    #[test]
    fn market_order_fills_at_next_open_by_default() {
        let data = series(3, 100.0, 105.0, 95.0, 102.0);
        let mut b = Broker::new(BrokerConfig::default(), data);
        b.submit_order(order(1.0), 0).unwrap();
        assert!(b.trades().is_empty());
        b.on_bar(1).unwrap();
        assert_eq!(b.trades().len(), 1);
        assert_eq!(b.trades()[0].entry_price, 100.0);
    }

    #[test]
    fn trade_on_close_market_order_fills_immediately() {
        let mut cfg = BrokerConfig::default();
        cfg.trade_on_close = true;
        let data = series(3, 100.0, 105.0, 95.0, 102.0);
        let mut b = Broker::new(cfg, data);
        b.submit_order(order(1.0), 0).unwrap();
        assert_eq!(b.trades().len(), 1);
        assert_eq!(b.trades()[0].entry_bar, 0);
        assert_eq!(b.trades()[0].entry_price, 102.0);
    }

    #[test]
    fn stop_loss_wins_tie_against_take_profit() {
        let data = series(2, 100.0, 110.0, 90.0, 100.0);
        let mut b = Broker::new(BrokerConfig::default(), data.clone());
        b.open_trade(10, 0, 100.0, Some(95.0), Some(108.0), None);
        b.on_bar(1).unwrap();
        assert!(b.trades().is_empty());
        assert_eq!(b.closed_trades()[0].exit_price, Some(90.0f64.min(100.0)));
    }

    #[test]
    fn hedging_false_nets_opposite_trades_fifo() {
        let data = series(3, 100.0, 100.0, 100.0, 100.0);
        let mut b = Broker::new(BrokerConfig::default(), data);
        b.open_trade(5, 0, 100.0, None, None, None);
        b.submit_order(
            Order { size: -5.0, ..order(-5.0) },
            1,
        )
        .unwrap();
        b.on_bar(1).unwrap();
        assert!(b.trades().is_empty());
        assert_eq!(b.closed_trades().len(), 1);
    }

    #[test]
    fn zero_size_fractional_order_is_cancelled_not_fatal() {
        let data = series(2, 100.0, 100.0, 100.0, 100.0);
        let mut cfg = BrokerConfig::default();
        cfg.cash = 1.0;
        let mut b = Broker::new(cfg, data);
        b.submit_order(order(0.5), 0).unwrap();
        b.on_bar(1).unwrap();
        assert!(b.trades().is_empty());
    }
}
