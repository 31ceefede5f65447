// parameter sweeps over independent backtests. the simulation kernel itself
// stays sequential; this is the crate's only parallel surface.

use std::collections::HashMap;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use log::warn;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::backtest::Backtest;
use crate::broker::BrokerConfig;
use crate::error::OptimizerError;
use crate::ohlc::OhlcSeries;
use crate::stats::Stats;
use crate::strategy::Strategy;

/// one parameter's candidate values. categorical choices are carried as
/// their list index, which concrete strategies interpret in `set_param`.
#[derive(Debug, Clone)]
pub enum ParamAxis {
    Ints(Vec<i64>),
    Floats(Vec<f64>),
    Categorical(Vec<String>),
}

impl ParamAxis {
    fn len(&self) -> usize {
        match self {
            ParamAxis::Ints(v) => v.len(),
            ParamAxis::Floats(v) => v.len(),
            ParamAxis::Categorical(v) => v.len(),
        }
    }

    fn value_at(&self, i: usize) -> f64 {
        match self {
            ParamAxis::Ints(v) => v[i] as f64,
            ParamAxis::Floats(v) => v[i],
            ParamAxis::Categorical(_) => i as f64,
        }
    }
}

pub type ParamGrid = Vec<(String, ParamAxis)>;
pub type ParamSet = HashMap<String, f64>;

pub enum Maximize {
    Field(String),
    Custom(Box<dyn Fn(&Stats) -> f64 + Send + Sync>),
}

impl Maximize {
    fn score(&self, stats: &Stats) -> Result<f64, OptimizerError> {
        match self {
            Maximize::Field(name) => stats.field(name).ok_or_else(|| OptimizerError::UnknownMaximizeKey(name.clone())),
            Maximize::Custom(f) => Ok(f(stats)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum MaxTries {
    Fraction(f64),
    Count(usize),
}

pub struct OptimizeResult {
    pub best_params: ParamSet,
    pub best_stats: Stats,
    pub heatmap: Vec<(ParamSet, f64)>,
}

pub struct Optimizer {
    pool: rayon::ThreadPool,
    seed: Option<u64>,
}

impl Optimizer {
    pub fn new(num_threads: usize, seed: Option<u64>) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads.max(1))
            .build()
            .expect("failed to start optimizer thread pool");
        Optimizer { pool, seed }
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        }
    }

    /// exhaustive search over the Cartesian product of `grid`, optionally
    /// filtered by `admissible` and sub-sampled to `max_tries`. runs execute
    /// across the thread pool; a run that fails to construct (a rejected
    /// parameter) is logged and skipped rather than aborting the sweep.
    pub fn grid_search<S, F>(
        &self,
        data: Arc<OhlcSeries>,
        broker_config: BrokerConfig,
        grid: &ParamGrid,
        admissible: Option<&(dyn Fn(&ParamSet) -> bool + Sync)>,
        max_tries: Option<MaxTries>,
        maximize: &Maximize,
        make_strategy: F,
    ) -> Result<OptimizeResult, OptimizerError>
    where
        S: Strategy,
        F: Fn() -> S + Sync,
    {
        if grid.is_empty() {
            return Err(OptimizerError::NoParameters);
        }
        for (name, axis) in grid {
            if axis.len() == 0 {
                return Err(OptimizerError::EmptyAxis(name.clone()));
            }
        }

        let mut combos = cartesian_product(grid);
        if let Some(pred) = admissible {
            combos.retain(pred);
        }
        if combos.is_empty() {
            return Err(OptimizerError::NoAdmissibleCombinations);
        }

        if let Some(mt) = max_tries {
            let cap = match mt {
                MaxTries::Fraction(f) => ((combos.len() as f64) * f).ceil().max(1.0) as usize,
                MaxTries::Count(n) => n,
            };
            if cap < combos.len() {
                let mut rng = self.rng();
                combos.shuffle(&mut rng);
                combos.truncate(cap);
            }
        }

        let pb = ProgressBar::new(combos.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{desc:.green} {bar:40.white} {percentage:>3}% | {pos:>7}/{len:7} [{elapsed_precise}<{eta_precise}] {msg}")
                .unwrap()
                .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        pb.set_message("running grid search...");

        let outcomes: Vec<Option<(ParamSet, Stats)>> = self.pool.install(|| {
            combos
                .par_iter()
                .map(|combo| {
                    let outcome = run_one(&data, &broker_config, combo, &make_strategy);
                    pb.inc(1);
                    outcome
                })
                .collect()
        });
        pb.finish_with_message("");

        reduce_outcomes(outcomes, maximize)
    }

    /// seeded random/coordinate-descent local search over the same axis
    /// bounds, standing in for a sequential model-based optimizer (no
    /// Bayesian-optimization crate is available in this stack). results are
    /// memoized by parameter tuple so repeated neighbours are free.
    pub fn local_search<S, F>(
        &self,
        data: Arc<OhlcSeries>,
        broker_config: BrokerConfig,
        grid: &ParamGrid,
        maximize: &Maximize,
        iterations: usize,
        make_strategy: F,
    ) -> Result<OptimizeResult, OptimizerError>
    where
        S: Strategy,
        F: Fn() -> S + Sync,
    {
        if grid.is_empty() {
            return Err(OptimizerError::NoParameters);
        }
        for (name, axis) in grid {
            if axis.len() == 0 {
                return Err(OptimizerError::EmptyAxis(name.clone()));
            }
        }

        let mut rng = self.rng();
        let mut indices: Vec<usize> = grid.iter().map(|(_, axis)| rng.gen_range(0..axis.len())).collect();
        let mut memo: HashMap<Vec<usize>, Option<Stats>> = HashMap::new();
        let mut heatmap: Vec<(ParamSet, f64)> = Vec::new();

        let eval = |indices: &[usize], memo: &mut HashMap<Vec<usize>, Option<Stats>>| -> Option<Stats> {
            if let Some(cached) = memo.get(indices) {
                return cached.clone();
            }
            let combo: ParamSet = grid.iter().zip(indices).map(|((name, axis), &i)| (name.clone(), axis.value_at(i))).collect();
            let outcome = run_one(&data, &broker_config, &combo, &make_strategy).map(|(_, stats)| stats);
            memo.insert(indices.to_vec(), outcome.clone());
            outcome
        };

        let mut best_indices = indices.clone();
        let mut best_stats = eval(&indices, &mut memo);
        let mut best_score = best_stats.as_ref().and_then(|s| maximize.score(s).ok()).unwrap_or(f64::NEG_INFINITY);
        if let Some(stats) = &best_stats {
            let combo: ParamSet = grid.iter().zip(&indices).map(|((name, axis), &i)| (name.clone(), axis.value_at(i))).collect();
            heatmap.push((combo, best_score));
            let _ = stats;
        }

        for _ in 0..iterations {
            let axis_i = rng.gen_range(0..grid.len());
            let axis_len = grid[axis_i].1.len();
            if axis_len < 2 {
                continue;
            }
            let mut candidate = indices.clone();
            candidate[axis_i] = rng.gen_range(0..axis_len);

            if let Some(stats) = eval(&candidate, &mut memo) {
                let score = maximize.score(&stats)?;
                let combo: ParamSet = grid.iter().zip(&candidate).map(|((name, axis), &i)| (name.clone(), axis.value_at(i))).collect();
                heatmap.push((combo.clone(), score));
                if score > best_score {
                    best_score = score;
                    best_indices = candidate.clone();
                    best_stats = Some(stats);
                    indices = candidate;
                }
            } else {
                warn!("local search: candidate parameter set rejected, skipped");
            }
        }

        let best_stats = best_stats.ok_or(OptimizerError::NoAdmissibleCombinations)?;
        let best_params: ParamSet = grid.iter().zip(&best_indices).map(|((name, axis), &i)| (name.clone(), axis.value_at(i))).collect();
        Ok(OptimizeResult { best_params, best_stats, heatmap })
    }
}

fn run_one<S, F>(data: &Arc<OhlcSeries>, broker_config: &BrokerConfig, combo: &ParamSet, make_strategy: &F) -> Option<(ParamSet, Stats)>
where
    S: Strategy,
    F: Fn() -> S,
{
    let mut strategy = make_strategy();
    for (key, value) in combo {
        if let Err(e) = strategy.set_param(key, *value) {
            warn!("optimizer: {e}; skipping combination {combo:?}");
            return None;
        }
    }
    let mut bt = Backtest::new(Arc::clone(data), strategy, broker_config.clone());
    match bt.run() {
        Ok(result) => Some((combo.clone(), result.stats)),
        Err(e) => {
            warn!("optimizer: run failed for {combo:?}: {e}");
            None
        }
    }
}

fn reduce_outcomes(outcomes: Vec<Option<(ParamSet, Stats)>>, maximize: &Maximize) -> Result<OptimizeResult, OptimizerError> {
    let mut heatmap = Vec::new();
    let mut best: Option<(ParamSet, Stats, f64)> = None;
    for outcome in outcomes.into_iter().flatten() {
        let (combo, stats) = outcome;
        let score = maximize.score(&stats)?;
        heatmap.push((combo.clone(), score));
        if best.as_ref().map_or(true, |(_, _, b)| score > *b) {
            best = Some((combo, stats, score));
        }
    }
    let (best_params, best_stats, _) = best.ok_or(OptimizerError::NoAdmissibleCombinations)?;
    Ok(OptimizeResult { best_params, best_stats, heatmap })
}

fn cartesian_product(grid: &ParamGrid) -> Vec<ParamSet> {
    let mut combos: Vec<ParamSet> = vec![HashMap::new()];
    for (name, axis) in grid {
        let mut next = Vec::with_capacity(combos.len() * axis.len());
        for combo in &combos {
            for i in 0..axis.len() {
                let mut c = combo.clone();
                c.insert(name.clone(), axis.value_at(i));
                next.push(c);
            }
        }
        combos = next;
    }
    combos
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::StrategyContext;
    use chrono::NaiveDateTime;

    struct Threshold {
        level: f64,
    }

    impl Strategy for Threshold {
        fn name(&self) -> &str {
            "Threshold"
        }
        fn init(&mut self, _ctx: &mut StrategyContext) -> Result<(), crate::error::IndicatorError> {
            Ok(())
        }
        fn next(&mut self, ctx: &mut StrategyContext) {
            let price = ctx.data().close()[ctx.data().len() - 1];
            if price > self.level && ctx.position().size == 0 {
                let _ = ctx.buy(crate::strategy::FULL_EQUITY, None, None, None, None, None);
            }
        }
        fn set_param(&mut self, key: &str, value: f64) -> Result<(), crate::error::ConfigError> {
            if key == "level" {
                self.level = value;
                Ok(())
            } else {
                Err(crate::error::ConfigError::UnknownParameter { strategy: self.name().to_string(), param: key.to_string() })
            }
        }
    }

    fn data() -> Arc<OhlcSeries> {
        let base = NaiveDateTime::parse_from_str("2020-01-01 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let closes = vec![100.0, 101.0, 102.0, 103.0, 104.0, 105.0, 106.0];
        let n = closes.len();
        let index = (0..n).map(|i| base + chrono::Duration::days(i as i64)).collect();
        Arc::new(OhlcSeries::new(index, closes.clone(), closes.clone(), closes.clone(), closes, None).unwrap())
    }

    #[test]
    fn grid_search_finds_best_threshold() {
        let opt = Optimizer::new(2, Some(7));
        let grid: ParamGrid = vec![("level".to_string(), ParamAxis::Floats(vec![99.0, 101.0, 105.0]))];
        let result = opt
            .grid_search(
                data(),
                BrokerConfig { finalize_trades: true, ..BrokerConfig::default() },
                &grid,
                None,
                None,
                &Maximize::Field("return_pct".to_string()),
                || Threshold { level: 100.0 },
            )
            .unwrap();
        assert_eq!(result.heatmap.len(), 3);
        assert!(result.best_params.contains_key("level"));
    }

    #[test]
    fn empty_grid_is_rejected() {
        let opt = Optimizer::new(1, None);
        let grid: ParamGrid = vec![];
        let err = opt
            .grid_search(
                data(),
                BrokerConfig::default(),
                &grid,
                None,
                None,
                &Maximize::Field("return_pct".to_string()),
                || Threshold { level: 100.0 },
            )
            .unwrap_err();
        assert!(matches!(err, OptimizerError::NoParameters));
    }

    #[test]
    fn max_tries_caps_combination_count() {
        let opt = Optimizer::new(2, Some(1));
        let grid: ParamGrid = vec![("level".to_string(), ParamAxis::Floats(vec![90.0, 95.0, 100.0, 103.0, 108.0]))];
        let result = opt
            .grid_search(
                data(),
                BrokerConfig { finalize_trades: true, ..BrokerConfig::default() },
                &grid,
                None,
                Some(MaxTries::Count(2)),
                &Maximize::Field("return_pct".to_string()),
                || Threshold { level: 100.0 },
            )
            .unwrap();
        assert_eq!(result.heatmap.len(), 2);
    }
}
