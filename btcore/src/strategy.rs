// the strategy seam: a trait implemented by concrete strategies, and the
// context object handed to them each bar.

use crate::broker::Broker;
use crate::error::{ConfigError, IndicatorError};
use crate::indicator::Indicator;
use crate::ohlc::DataWindow;
use crate::order::{Order, OrderId, OrderState, TradeId};
use crate::position::Position;
use crate::trade::Trade;

/// a size just under 1.0: "use (almost) all available equity". kept strictly
/// below 1 so floor-based unit sizing never rounds up past what cash allows.
pub const FULL_EQUITY: f64 = 1.0 - f64::EPSILON;

/// a handle to an indicator declared in `Strategy::init`, used to read its
/// value in `Strategy::next` without re-touching the underlying `Vec`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorHandle(usize);

pub trait Strategy: Send {
    /// the strategy's name, used in error messages and reports.
    fn name(&self) -> &str;

    /// called once before the first bar. declare indicators here via
    /// `ctx.add_indicator`, which fails if a declared array isn't aligned
    /// to the data series.
    fn init(&mut self, ctx: &mut StrategyContext) -> Result<(), IndicatorError>;

    /// called once per bar after warm-up.
    fn next(&mut self, ctx: &mut StrategyContext);

    /// overrides a named parameter, used by the optimizer between runs.
    /// concrete strategies override this to match a field; the default
    /// rejects every key.
    fn set_param(&mut self, key: &str, _value: f64) -> Result<(), ConfigError> {
        Err(ConfigError::UnknownParameter {
            strategy: self.name().to_string(),
            param: key.to_string(),
        })
    }
}

pub struct StrategyContext<'a> {
    pub(crate) broker: &'a mut Broker,
    pub(crate) indicators: &'a mut Vec<Indicator>,
    pub(crate) data: DataWindow,
    pub(crate) bar: usize,
}

impl<'a> StrategyContext<'a> {
    pub fn data(&self) -> &DataWindow {
        &self.data
    }

    pub fn bar(&self) -> usize {
        self.bar
    }

    pub fn cash(&self) -> f64 {
        self.broker.cash()
    }

    pub fn equity(&self) -> f64 {
        self.broker.equity_now(self.data.close()[self.data.len() - 1])
    }

    pub fn position(&self) -> Position {
        let price = self.data.close()[self.data.len() - 1];
        Position::from_trades(self.broker.trades(), price)
    }

    pub fn orders(&self) -> &[Order] {
        self.broker.orders()
    }

    pub fn trades(&self) -> &[Trade] {
        self.broker.trades()
    }

    pub fn closed_trades(&self) -> &[Trade] {
        self.broker.closed_trades()
    }

    /// registers an aligned indicator array. `overlay`, when `None`, is
    /// inferred from how closely the values track price. fails if `values`
    /// isn't the same length as the full data series.
    pub fn add_indicator(
        &mut self,
        name: impl Into<String>,
        values: Vec<f64>,
        plot: bool,
        overlay: Option<bool>,
        color: Option<String>,
        scatter: bool,
    ) -> Result<IndicatorHandle, IndicatorError> {
        let name = name.into();
        let expected = self.data.full_series().len();
        if values.len() != expected {
            return Err(IndicatorError {
                name,
                source: format!("expected {expected} values aligned to the data series, got {}", values.len()).into(),
            });
        }
        let close = &self.data.full_series().close;
        let overlay = overlay.unwrap_or_else(|| Indicator::infer_overlay(&values, close));
        let handle = IndicatorHandle(self.indicators.len());
        self.indicators.push(Indicator { name, values, plot, overlay, color, scatter });
        Ok(handle)
    }

    /// the indicator's values up to (and including) the current bar.
    pub fn indicator(&self, handle: IndicatorHandle) -> &[f64] {
        self.indicators[handle.0].prefix(self.data.len())
    }

    fn submit(
        &mut self,
        size: f64,
        limit: Option<f64>,
        stop: Option<f64>,
        sl: Option<f64>,
        tp: Option<f64>,
        tag: Option<String>,
    ) -> Result<OrderId, ConfigError> {
        let order = Order {
            id: 0,
            size,
            limit,
            stop,
            sl,
            tp,
            tag,
            parent_trade: None,
            state: OrderState::Pending,
        };
        self.broker.submit_order(order, self.bar)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn buy(
        &mut self,
        size: f64,
        limit: Option<f64>,
        stop: Option<f64>,
        sl: Option<f64>,
        tp: Option<f64>,
        tag: Option<String>,
    ) -> Result<OrderId, ConfigError> {
        self.submit(size.abs(), limit, stop, sl, tp, tag)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn sell(
        &mut self,
        size: f64,
        limit: Option<f64>,
        stop: Option<f64>,
        sl: Option<f64>,
        tp: Option<f64>,
        tag: Option<String>,
    ) -> Result<OrderId, ConfigError> {
        self.submit(-size.abs(), limit, stop, sl, tp, tag)
    }

    /// closes `portion` (0,1] of every open trade, at least one unit each.
    pub fn close_position(&mut self, portion: f64) {
        let ids: Vec<TradeId> = self.broker.trades().iter().map(|t| t.id).collect();
        for id in ids {
            self.broker.close_trade_portion(id, self.bar, portion);
        }
    }

    pub fn cancel_order(&mut self, id: OrderId) {
        self.broker.cancel_order(id);
    }

    /// cancels every pending (non-contingent) order.
    pub fn cancel_all_orders(&mut self) {
        let ids: Vec<OrderId> = self.broker.orders().iter().filter(|o| !o.is_contingent()).map(|o| o.id).collect();
        for id in ids {
            self.broker.cancel_order(id);
        }
    }

    pub fn set_trade_sl(&mut self, trade_id: TradeId, sl: Option<f64>) -> Result<(), ConfigError> {
        self.broker.set_trade_sl(trade_id, sl)
    }

    pub fn set_trade_tp(&mut self, trade_id: TradeId, tp: Option<f64>) -> Result<(), ConfigError> {
        self.broker.set_trade_tp(trade_id, tp)
    }
}
