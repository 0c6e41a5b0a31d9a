use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use candlebt::prelude::*;

/// Runs the SMA crossover strategy over a CSV file of candles.
#[derive(Parser)]
#[command(name = "candlebt", about = "Event-driven OHLCV backtester", version)]
#[command(after_help = "Examples:\n  candlebt --data prices.csv --fast 10 --slow 30\n  candlebt --data prices.csv --config bt.toml --benchmark index.csv --plot run.svg\n")]
struct Cli {
    /// Candle CSV: timestamp, open, high, low, close, volume (header row required).
    #[arg(long)]
    data: PathBuf,
    /// Field delimiter of the CSV files.
    #[arg(long, default_value_t = ',')]
    delimiter: char,
    /// TOML configuration; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Initial cash.
    #[arg(long)]
    money: Option<f64>,
    /// Half-spread charged on every fill.
    #[arg(long)]
    spread: Option<f64>,
    /// Relative commission rate (e.g. 0.001 for 0.1%).
    #[arg(long)]
    commission: Option<f64>,
    /// Fast moving average period.
    #[arg(long, default_value_t = 10)]
    fast: usize,
    /// Slow moving average period.
    #[arg(long, default_value_t = 30)]
    slow: usize,
    /// Units bought on every entry.
    #[arg(long, default_value_t = 1)]
    size: u64,
    /// Benchmark CSV used for alpha and beta.
    #[arg(long)]
    benchmark: Option<PathBuf>,
    /// Chart output (.svg or .png).
    #[cfg(feature = "draws")]
    #[arg(long)]
    plot: Option<PathBuf>,
    /// Default log level when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to init logging: {}", e))?;

    Ok(())
}

fn load_config(cli: &Cli) -> Result<BacktestConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            toml::from_str::<BacktestConfig>(&raw).with_context(|| format!("parsing {}", path.display()))?
        }
        None => BacktestConfig::default(),
    };

    if let Some(money) = cli.money {
        config = config.with_money(money);
    }
    if let Some(spread) = cli.spread {
        config = config.with_spread(spread);
    }
    if let Some(rate) = cli.commission {
        config = config.with_commission(Commission::Relative { rate });
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let delimiter = u8::try_from(cli.delimiter).context("the delimiter must be an ASCII character")?;
    let config = load_config(&cli)?;

    let data = Data::from_csv(&cli.data, delimiter).with_context(|| format!("loading {}", cli.data.display()))?;
    let mut backtest = Backtest::new(data, config)?;
    if let Some(path) = &cli.benchmark {
        let benchmark = Data::from_csv(path, delimiter).with_context(|| format!("loading {}", path.display()))?;
        backtest = backtest.with_benchmark(benchmark);
    }

    let mut strategy = SmaCross::new(cli.fast, cli.slow, cli.size)?;
    backtest.run(&mut strategy)?;
    println!("{}", backtest.statistics());

    #[cfg(feature = "draws")]
    if let Some(path) = cli.plot {
        let options = DrawOptions::default()
            .title(format!("SMA {} / {}", cli.fast, cli.slow))
            .draw_output(DrawOutput::from_path(path))
            .show_volume(true)
            .show_equity(true);
        Draw::with_backtest(&backtest).with_options(options).plot()?;
    }

    Ok(())
}
