// order value type and submission-time validity checks

use crate::error::ConfigError;

pub type OrderId = u64;
pub type TradeId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    Pending,
    Filled,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct Order {
    pub id: OrderId,
    /// signed; positive = long, negative = short. In (-1,0) or (0,1) it is a
    /// fraction of current equity; outside that range it must be an integer
    /// unit count.
    pub size: f64,
    pub limit: Option<f64>,
    pub stop: Option<f64>,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    pub tag: Option<String>,
    /// set for SL/TP orders: the trade they are contingent on.
    pub parent_trade: Option<TradeId>,
    pub state: OrderState,
}

impl Order {
    pub fn is_long(&self) -> bool {
        self.size > 0.0
    }

    pub fn is_contingent(&self) -> bool {
        self.parent_trade.is_some()
    }

    pub fn is_market(&self) -> bool {
        self.limit.is_none() && self.stop.is_none()
    }

    /// validates size shape, sl/tp ordering around the reference price, and
    /// stop placement, per §3. `price` is the reference price (current
    /// close) used to evaluate sl/tp/stop ordering.
    pub fn validate(&self, price: f64) -> Result<(), ConfigError> {
        let mag = self.size.abs();
        let is_fraction = mag > 0.0 && mag < 1.0;
        let is_unit_count = mag >= 1.0 && (mag - mag.round()).abs() < 1e-9;
        if !is_fraction && !is_unit_count {
            return Err(ConfigError::InvalidOrderSize(self.size));
        }

        if self.is_long() {
            let sl_ok = self.sl.map_or(true, |sl| sl < price);
            let tp_ok = self.tp.map_or(true, |tp| tp > price);
            if !sl_ok || !tp_ok {
                return Err(ConfigError::InvalidLongSlTp { price, sl: self.sl, tp: self.tp });
            }
        } else {
            let sl_ok = self.sl.map_or(true, |sl| sl > price);
            let tp_ok = self.tp.map_or(true, |tp| tp < price);
            if !sl_ok || !tp_ok {
                return Err(ConfigError::InvalidShortSlTp { price, sl: self.sl, tp: self.tp });
            }
        }

        if let Some(stop) = self.stop {
            let ok = if self.is_long() { stop > price } else { stop < price };
            if !ok {
                return Err(ConfigError::InvalidStop { stop, price, size: self.size });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(size: f64) -> Order {
        Order {
            id: 0,
            size,
            limit: None,
            stop: None,
            sl: None,
            tp: None,
            tag: None,
            parent_trade: None,
            state: OrderState::Pending,
        }
    }

    #[test]
    fn long_requires_sl_below_and_tp_above() {
        let mut o = base(1.0);
        o.sl = Some(101.0);
        o.tp = Some(110.0);
        assert!(o.validate(100.0).is_err());

        o.sl = Some(95.0);
        assert!(o.validate(100.0).is_ok());
    }

    #[test]
    fn short_requires_mirrored_sl_tp() {
        let mut o = base(-1.0);
        o.sl = Some(95.0);
        o.tp = Some(90.0);
        assert!(o.validate(100.0).is_err());

        o.sl = Some(105.0);
        o.tp = Some(90.0);
        assert!(o.validate(100.0).is_ok());
    }

    #[test]
    fn stop_must_be_on_entry_side() {
        let mut o = base(1.0);
        o.stop = Some(99.0);
        assert!(o.validate(100.0).is_err());
        o.stop = Some(101.0);
        assert!(o.validate(100.0).is_ok());
    }

    #[test]
    fn fractional_and_integer_sizes_are_valid_shapes() {
        assert!(base(0.5).validate(100.0).is_ok());
        assert!(base(3.0).validate(100.0).is_ok());
        assert!(base(0.0).validate(100.0).is_err());
        assert!(base(1.5).validate(100.0).is_err());
    }
}
