// error taxonomy for the backtesting kernel
//
// out-of-money is deliberately not part of this taxonomy: it is an internal
// sentinel caught inside the simulation loop and never escapes to callers.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("OHLC data is empty")]
    EmptyData,
    #[error("data must have columns Open, High, Low, Close")]
    MissingColumns,
    #[error("OHLC values contain NaN or missing entries")]
    NullOhlc,
    #[error("order size must be a positive fraction in (0,1) or an integer >= 1 (got {0})")]
    InvalidOrderSize(f64),
    #[error("invalid sl/tp for a long order at price {price}: sl={sl:?} tp={tp:?} (need sl < price < tp)")]
    InvalidLongSlTp { price: f64, sl: Option<f64>, tp: Option<f64> },
    #[error("invalid sl/tp for a short order at price {price}: sl={sl:?} tp={tp:?} (need tp < price < sl)")]
    InvalidShortSlTp { price: f64, sl: Option<f64>, tp: Option<f64> },
    #[error("stop price {stop} is not on the entry side of reference price {price} for size {size}")]
    InvalidStop { stop: f64, price: f64, size: f64 },
    #[error("strategy '{strategy}' has no parameter '{param}'")]
    UnknownParameter { strategy: String, param: String },
    #[error("contingent order cannot be modified: parent trade is no longer open")]
    ParentTradeClosed,
    #[error("`commission` must be a scalar fraction, a (fixed, relative) pair, or a callable")]
    InvalidCommission,
}

#[derive(Error, Debug)]
#[error("indicator \"{name}\" error: {source}")]
pub struct IndicatorError {
    pub name: String,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizerError {
    #[error("optimization variable '{0}' was passed no values")]
    EmptyAxis(String),
    #[error("no admissible parameter combinations to test")]
    NoAdmissibleCombinations,
    #[error("need at least one strategy parameter to optimize")]
    NoParameters,
    #[error("`maximize`, if a string, must name a field of the results record")]
    UnknownMaximizeKey(String),
}

/// internal sentinel: equity dropped to zero or below inside a broker tick.
/// caught exactly in the simulation loop, never exposed to user code.
#[derive(Debug, Clone, Copy)]
pub(crate) struct OutOfMoney;

/// a full backtest run fails either on a configuration problem (empty data,
/// a rejected order) or on an indicator registered with bad values; this
/// wraps both so `Backtest::run` has one error type.
#[derive(Error, Debug)]
pub enum BacktestError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Indicator(#[from] IndicatorError),
}
