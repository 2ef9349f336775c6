//! Run a market-clearing scenario: one hub solving consensus against
//! price-responsive peers on an in-process broker.

use clap::{Parser, Subcommand, ValueEnum};
use gridclear_sim::{Scenario, SimRunner};
use gridclear_types::{GridClearError, MarketKind};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gridclear-sim", version, about = "Distributed market clearing simulator")]
struct Cli {
    /// Log every solver step
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Clear one window of a scenario file or built-in scenario
    Run {
        /// Path to a scenario JSON file, or a built-in scenario name
        scenario: String,

        #[arg(short, long, value_enum, default_value_t = Market::Rt)]
        market: Market,

        /// Directory for convergence diagnostics and the failure log
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Print a built-in scenario as JSON
    Example {
        #[arg(default_value = "single_microgrid")]
        name: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Market {
    Da,
    Rt,
}

impl From<Market> for MarketKind {
    fn from(market: Market) -> Self {
        match market {
            Market::Da => MarketKind::DayAhead,
            Market::Rt => MarketKind::RealTime,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli.command) {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

/// Returns whether the scenario met its expectations
fn run(command: Command) -> Result<bool, GridClearError> {
    match command {
        Command::Run { scenario, market, out } => {
            let scenario = match Scenario::builtin(&scenario) {
                Some(builtin) => builtin,
                None => Scenario::load(&scenario)?,
            };
            let runner = match out {
                Some(dir) => SimRunner::with_output(dir),
                None => SimRunner::new(),
            };
            let result = runner.run_scenario(&scenario, market.into())?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(result.passed)
        }
        Command::Example { name } => {
            let scenario = Scenario::builtin(&name).ok_or_else(|| {
                GridClearError::InvalidConfig(format!(
                    "unknown scenario {name}, expected one of {}",
                    Scenario::builtin_names().join(", ")
                ))
            })?;
            println!("{}", scenario.to_json()?);
            Ok(true)
        }
    }
}
