// commission models: a scalar fraction, a (fixed, relative) pair, or a
// user function `(size, price) -> fee`. negative fees are rebates.

use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub enum Commission {
    Relative(f64),
    FixedRelative { fixed: f64, relative: f64 },
    Function(Arc<dyn Fn(f64, f64) -> f64 + Send + Sync>),
}

impl fmt::Debug for Commission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Commission::Relative(r) => write!(f, "Commission::Relative({r})"),
            Commission::FixedRelative { fixed, relative } => {
                write!(f, "Commission::FixedRelative {{ fixed: {fixed}, relative: {relative} }}")
            }
            Commission::Function(_) => write!(f, "Commission::Function(..)"),
        }
    }
}

impl Default for Commission {
    fn default() -> Self {
        Commission::Relative(0.0)
    }
}

impl Commission {
    /// the relative (price-scaling) component, used by `Broker::adjusted_price`.
    pub fn relative(&self) -> f64 {
        match self {
            Commission::Relative(r) => *r,
            Commission::FixedRelative { relative, .. } => *relative,
            Commission::Function(_) => 0.0,
        }
    }

    /// the flat dollar fee charged on a fill, on top of the relative
    /// component already baked into the adjusted price.
    pub fn flat_fee(&self, size: f64, price: f64) -> f64 {
        match self {
            Commission::Relative(_) => 0.0,
            Commission::FixedRelative { fixed, .. } => *fixed,
            Commission::Function(f) => f(size, price),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_extracts_from_each_variant() {
        assert_eq!(Commission::Relative(0.01).relative(), 0.01);
        assert_eq!(Commission::FixedRelative { fixed: 100.0, relative: 0.01 }.relative(), 0.01);
        assert_eq!(Commission::Function(Arc::new(|_, _| 1.0)).relative(), 0.0);
    }

    #[test]
    fn function_fee_can_be_negative_rebate() {
        let c = Commission::Function(Arc::new(|size: f64, price: f64| -0.1 * size.abs() * price));
        assert!(c.flat_fee(10.0, 100.0) < 0.0);
    }
}
