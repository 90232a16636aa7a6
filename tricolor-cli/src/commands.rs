//! CLI command implementations

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Args, Subcommand};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::info;
use tricolor_core::{
    BufferMode, Color, Exchange, ExchangeConfig, ExchangeSnapshot, SimulationConfig, Transfer,
};
use tricolor_sim::{ScenarioRunner, SimulatedTransit, scenarios};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the exchange headless in real time
    Run(RunArgs),
    /// Run a canned scenario on a simulated clock and print its report
    Scenario {
        /// Scenario name, see `tricolor scenarios`
        name: String,
        /// Seed for every random draw
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List canned scenarios
    Scenarios,
}

/// Options of `tricolor run`. Unset values fall back to `TRICOLOR_*`
/// environment overrides, then to defaults.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Seconds to run; runs until Ctrl-C when omitted
    #[arg(long)]
    pub duration: Option<u64>,
    /// Buffer layout: shared or separate
    #[arg(long)]
    pub mode: Option<BufferMode>,
    /// Buffer capacity, total in shared mode or per color in separate mode
    #[arg(long)]
    pub capacity: Option<usize>,
    /// Emission rate of one terminal in tokens per second, as COLOR=RATE
    #[arg(long = "rate", value_name = "COLOR=RATE", value_parser = parse_color_value)]
    pub rates: Vec<(Color, f64)>,
    /// Probability of a terminal's first color, as COLOR=RATIO
    #[arg(long = "ratio", value_name = "COLOR=RATIO", value_parser = parse_color_value)]
    pub ratios: Vec<(Color, f64)>,
    /// Seed terminal draws and simulated transit
    #[arg(long)]
    pub seed: Option<u64>,
    /// Probability that a transit leg loses its token
    #[arg(long)]
    pub fault_rate: Option<f64>,
    /// Milliseconds between status lines
    #[arg(long, default_value_t = 1000)]
    pub report_every: u64,
    /// Print snapshots as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    /// Applies the command-line overrides on top of `config`.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidRate` - A rate is negative, non-finite or above the maximum
    /// - `ConfigError::InvalidRatio` - A ratio lies outside `0..=1`
    /// - `ConfigError::InvalidFaultRate` - The fault rate lies outside `0..=1`
    fn apply(&self, mut config: ExchangeConfig) -> anyhow::Result<ExchangeConfig> {
        if let Some(mode) = self.mode {
            config.buffer.mode = mode;
        }
        if let Some(capacity) = self.capacity {
            config.buffer.capacity = capacity;
        }
        for &(color, rate) in &self.rates {
            let schedule = config.terminals.schedule_mut(color);
            *schedule = schedule.with_rate(rate)?;
        }
        for &(color, ratio) in &self.ratios {
            let schedule = config.terminals.schedule_mut(color);
            *schedule = schedule.with_ratio(ratio)?;
        }
        if let Some(seed) = self.seed {
            config.simulation.deterministic_seed = Some(seed);
        }
        if let Some(fault_rate) = self.fault_rate {
            config.simulation.fault_rate = fault_rate;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Dispatch a parsed CLI command
///
/// # Errors
///
/// - `anyhow::Error` - The command failed or a scenario violated invariants
pub async fn run_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Run(args) => run_exchange(args).await,
        Commands::Scenario { name, seed, json } => run_scenario(&name, seed, json).await,
        Commands::Scenarios => {
            list_scenarios();
            Ok(())
        }
    }
}

/// Run the exchange until the duration elapses or Ctrl-C arrives
///
/// # Errors
///
/// - `ConfigError` - Environment or command-line overrides are invalid
/// - `ExchangeError::Runtime` - The exchange could not start
pub async fn run_exchange(args: RunArgs) -> anyhow::Result<()> {
    let env_config = ExchangeConfig::from_env().context("Invalid TRICOLOR_* environment")?;
    let config = args.apply(env_config)?;

    let transit = uses_simulated_transit(&config.simulation)
        .then(|| Arc::new(SimulatedTransit::from_config(&config.simulation)));
    let mut builder = Exchange::builder(config);
    if let Some(transit) = &transit {
        let transfer: Arc<dyn Transfer> = transit.clone();
        builder = builder.transfer(transfer);
    }
    let exchange = builder.build()?;

    exchange.start()?;
    info!(
        mode = %exchange.config().buffer.mode,
        capacity = exchange.config().buffer.capacity,
        "Exchange running"
    );

    let deadline = args
        .duration
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut ticker = tokio::time::interval(Duration::from_millis(args.report_every.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => print_status(&exchange.snapshot(), args.json)?,
            _ = wait_until(deadline) => break,
            _ = tokio::signal::ctrl_c() => {
                println!("Interrupted, settling tokens in flight...");
                break;
            }
        }
    }

    exchange.stop().await;
    exchange.drain().await;

    let snapshot = exchange.snapshot();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!("Final state");
        println!("{:-<60}", "");
        print_summary(&snapshot);
        if let Some(transit) = &transit {
            let stats = transit.stats();
            println!(
                "  Transit:   {} legs completed, {} tokens lost",
                stats.completed, stats.faulted
            );
        }
    }

    Ok(())
}

/// Run a canned scenario and print its report
///
/// # Errors
///
/// - `SimulationError::UnknownScenario` - No scenario has that name
/// - `anyhow::Error` - The scenario violated at least one invariant
pub async fn run_scenario(name: &str, seed: u64, json: bool) -> anyhow::Result<()> {
    let scenario = scenarios::find(name)?;
    let runner = ScenarioRunner::new(seed);

    let report = tokio::task::spawn_blocking(move || runner.run_paused(&scenario))
        .await
        .context("Scenario task panicked")??;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }

    if !report.passed() {
        bail!(
            "Scenario '{}' failed with {} invariant violations",
            report.scenario,
            report.violation_count
        );
    }
    Ok(())
}

/// List canned scenarios with their descriptions
pub fn list_scenarios() {
    println!("Available scenarios");
    println!("{:-<60}", "");
    for info in scenarios::catalog() {
        println!("  {:<20} {}", info.name, info.description);
    }
}

/// A seed, token loss or jitter from any source selects simulated transit.
fn uses_simulated_transit(simulation: &SimulationConfig) -> bool {
    simulation.deterministic_seed.is_some()
        || simulation.fault_rate > 0.0
        || !simulation.jitter.is_zero()
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn print_status(snapshot: &ExchangeSnapshot, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
    } else {
        println!("{snapshot}");
    }
    Ok(())
}

fn print_summary(snapshot: &ExchangeSnapshot) {
    let stats = &snapshot.black_box;
    println!("  Mode:      {} (capacity {})", snapshot.mode, snapshot.capacity);
    println!(
        "  Buffer:    {} queued ({})",
        snapshot.current_buffer_count(),
        snapshot.buffer
    );
    println!(
        "  Black box: {} received, {} sent, {} overflowed ({})",
        stats.received, stats.sent, stats.overflow_total, stats.overflow
    );
    for color in Color::ALL {
        let terminal = snapshot.terminal(color);
        println!(
            "  {:<10} sent {} received {} at {:.2}/s",
            format!("{color}:"),
            terminal.sent,
            terminal.received,
            terminal.schedule.rate()
        );
    }
}

/// Parses `COLOR=VALUE`, e.g. `red=2.5`. Ranges are checked by [`RunArgs::apply`].
fn parse_color_value(raw: &str) -> Result<(Color, f64), String> {
    let (color, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected COLOR=VALUE, got '{raw}'"))?;
    let color: Color = color.parse().map_err(|e| format!("{e}"))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{value}' is not a number"))?;
    Ok((color, value))
}
