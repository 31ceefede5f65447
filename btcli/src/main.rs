use std::time::Instant;

use btcore::backtest::Backtest;
use btcore::broker::BrokerConfig;
use btcore::commission::Commission;
use btcore::data_handler::load_csv;
use btcore::optimizer::{Maximize, Optimizer, ParamAxis, ParamGrid};
use btcore::strategies::simple_strategy::SimpleStrategy;
use btcore::strategies::sma::SmaStrategy;
use clap::Parser;

#[derive(Parser)]
#[command(name = "btcli", about = "Run a backtest over an OHLC(V) CSV file")]
struct Cli {
    /// path to a CSV with Date, Open, High, Low, Close[, Volume] columns
    csv: String,

    /// which bundled strategy to run
    #[arg(long, default_value = "sma")]
    strategy: String,

    #[arg(long, default_value_t = 100_000.0)]
    cash: f64,

    /// commission as a fraction, e.g. 0.001 for 10 bps
    #[arg(long, default_value_t = 0.0)]
    commission: f64,

    #[arg(long, default_value_t = 0.0)]
    spread: f64,

    /// 1/leverage, in (0, 1]
    #[arg(long, default_value_t = 1.0)]
    margin: f64,

    #[arg(long)]
    trade_on_close: bool,

    #[arg(long)]
    hedging: bool,

    #[arg(long)]
    exclusive_orders: bool,

    #[arg(long, default_value_t = 0.0)]
    risk_free_rate: f64,

    /// grid-search the strategy's parameters instead of a single run
    #[arg(long)]
    optimize: bool,

    /// write an equity-curve plot to this path
    #[arg(long)]
    plot: Option<String>,
}

fn broker_config(cli: &Cli) -> BrokerConfig {
    BrokerConfig {
        cash: cli.cash,
        spread: cli.spread,
        commission: Commission::Relative(cli.commission),
        margin: cli.margin,
        trade_on_close: cli.trade_on_close,
        hedging: cli.hedging,
        exclusive_orders: cli.exclusive_orders,
        finalize_trades: true,
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let start = Instant::now();

    let data = match load_csv(&cli.csv) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("failed to load {}: {e}", cli.csv);
            std::process::exit(1);
        }
    };

    match cli.strategy.as_str() {
        "simple" => {
            if cli.optimize {
                eprintln!("SimpleStrategy has no parameters to optimize");
                std::process::exit(1);
            }
            let mut bt = Backtest::new(data.clone(), SimpleStrategy::new(), broker_config(&cli)).with_risk_free_rate(cli.risk_free_rate);
            run_and_report(&mut bt, &data, cli.plot.as_deref());
        }
        _ => {
            if cli.optimize {
                let optimizer = Optimizer::new(num_cpus(), Some(42));
                let grid: ParamGrid = vec![
                    ("fast_period".to_string(), ParamAxis::Ints(vec![5, 10, 15, 20])),
                    ("slow_period".to_string(), ParamAxis::Ints(vec![20, 30, 50, 100])),
                ];
                let admissible = |params: &std::collections::HashMap<String, f64>| {
                    params["fast_period"] < params["slow_period"]
                };
                match optimizer.grid_search(
                    data.clone(),
                    broker_config(&cli),
                    &grid,
                    Some(&admissible),
                    None,
                    &Maximize::Field("sharpe_ratio".to_string()),
                    || SmaStrategy::default(),
                ) {
                    Ok(result) => {
                        println!("best params: {:?}", result.best_params);
                        println!("{}", result.best_stats);
                    }
                    Err(e) => eprintln!("optimization failed: {e}"),
                }
            } else {
                let mut bt =
                    Backtest::new(data.clone(), SmaStrategy::default(), broker_config(&cli)).with_risk_free_rate(cli.risk_free_rate);
                run_and_report(&mut bt, &data, cli.plot.as_deref());
            }
        }
    }

    println!("time taken: {:?}", start.elapsed());
}

fn run_and_report<S: btcore::strategy::Strategy>(
    bt: &mut Backtest<S>,
    data: &std::sync::Arc<btcore::ohlc::OhlcSeries>,
    plot_path: Option<&str>,
) {
    match bt.run() {
        Ok(result) => {
            println!("{}", result.stats);
            if let Some(path) = plot_path {
                let series: Vec<(chrono::NaiveDateTime, f64)> = data.index.iter().cloned().zip(result.equity_curve.iter().cloned()).collect();
                if let Err(e) = btcore::plot::plot_equity(&series, path) {
                    eprintln!("error generating plot: {e}");
                }
            }
        }
        Err(e) => eprintln!("backtest failed: {e}"),
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}
