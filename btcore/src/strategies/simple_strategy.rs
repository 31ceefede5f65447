// buys with (almost) all equity on the first bar, holds to the end.

use crate::error::IndicatorError;
use crate::strategy::{Strategy, StrategyContext, FULL_EQUITY};

#[derive(Default)]
pub struct SimpleStrategy;

impl SimpleStrategy {
    pub fn new() -> Self {
        SimpleStrategy
    }
}

impl Strategy for SimpleStrategy {
    fn name(&self) -> &str {
        "SimpleStrategy"
    }

    fn init(&mut self, _ctx: &mut StrategyContext) -> Result<(), IndicatorError> {
        Ok(())
    }

    fn next(&mut self, ctx: &mut StrategyContext) {
        if ctx.position().size == 0 {
            if let Err(e) = ctx.buy(FULL_EQUITY, None, None, None, None, None) {
                log::warn!("SimpleStrategy: buy rejected: {e}");
            }
        } else if ctx.bar() == ctx.data().full_series().len() - 1 {
            ctx.close_position(1.0);
        }
    }
}
