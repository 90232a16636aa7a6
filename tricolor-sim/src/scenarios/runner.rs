//! Scenario execution and report collection.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};
use tricolor_core::{Exchange, ExchangeSnapshot, Transfer};

use super::{Scenario, TimedAction};
use crate::SimulationError;
use crate::invariants::{Invariant, InvariantViolation, default_invariants};
use crate::rng::boxed_terminal_rng;
use crate::transit::{SimulatedTransit, TransitStats};

/// Violations kept verbatim in a report; later ones are only counted.
const MAX_RECORDED_VIOLATIONS: usize = 32;

/// Outcome of one scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    /// Scenario name
    pub scenario: String,
    /// Seed of every random draw in the run
    pub seed: u64,
    /// Wall-clock start of the run
    pub started_at: DateTime<Utc>,
    /// Wall-clock end of the run
    pub finished_at: DateTime<Utc>,
    /// Simulated run length in milliseconds, drain included
    pub simulated_ms: u64,
    /// Control actions applied
    pub actions_applied: usize,
    /// Snapshots checked against the invariants
    pub checks: usize,
    /// Total violations detected
    pub violation_count: usize,
    /// First violations detected
    pub violations: Vec<InvariantViolation>,
    /// Legs carried by the simulated transit
    pub transit: TransitStats,
    /// State after every in-flight token settled
    pub final_snapshot: ExchangeSnapshot,
}

impl ScenarioReport {
    /// Whether no invariant was violated.
    pub fn passed(&self) -> bool {
        self.violation_count == 0
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Scenario '{}' (seed {}): {}",
            self.scenario,
            self.seed,
            if self.passed() { "PASSED" } else { "FAILED" }
        )?;
        writeln!(
            f,
            "  simulated {:.1}s, {} actions, {} checks, {} legs completed, {} faulted",
            self.simulated_ms as f64 / 1000.0,
            self.actions_applied,
            self.checks,
            self.transit.completed,
            self.transit.faulted
        )?;
        writeln!(f, "  final: {}", self.final_snapshot)?;
        for violation in &self.violations {
            writeln!(f, "  {violation}")?;
        }
        if self.violation_count > self.violations.len() {
            writeln!(
                f,
                "  ... and {} more violations",
                self.violation_count - self.violations.len()
            )?;
        }
        Ok(())
    }
}

/// Collects violations, keeping only the first few verbatim.
#[derive(Default)]
struct ViolationLog {
    count: usize,
    recorded: Vec<InvariantViolation>,
}

impl ViolationLog {
    fn check(&mut self, invariants: &[Box<dyn Invariant>], snapshot: &ExchangeSnapshot) {
        for invariant in invariants {
            if let Err(violation) = invariant.check(snapshot) {
                warn!(%violation, "Invariant violated");
                self.count += 1;
                if self.recorded.len() < MAX_RECORDED_VIOLATIONS {
                    self.recorded.push(violation);
                }
            }
        }
    }
}

/// Runs scenarios with seeded randomness.
pub struct ScenarioRunner {
    seed: u64,
}

impl ScenarioRunner {
    /// Creates new runner with specified seed.
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Returns the seed of every run.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Runs `scenario` on the current runtime.
    ///
    /// Takes the scenario's duration in runtime time; under a paused clock
    /// this completes as fast as the work allows.
    ///
    /// # Errors
    ///
    /// - `SimulationError::Exchange` - Invalid scenario configuration or no running runtime
    pub async fn run(&self, scenario: &Scenario) -> Result<ScenarioReport, SimulationError> {
        let mut config = scenario.config.clone();
        config.simulation.deterministic_seed = Some(self.seed);

        let transit = Arc::new(SimulatedTransit::from_config(&config.simulation));
        let transfer: Arc<dyn Transfer> = transit.clone();
        let seed = self.seed;
        let exchange = Exchange::builder(config)
            .transfer(transfer)
            .terminal_rngs(move |color| boxed_terminal_rng(seed, color))
            .build()?;

        let invariants = default_invariants();
        let mut violations = ViolationLog::default();
        let mut checks = 0;
        let mut actions_applied = 0;
        let mut pending: &[TimedAction] = &scenario.timeline;

        info!(scenario = %scenario.name, seed, "Scenario started");
        let started_at = Utc::now();
        let start = Instant::now();
        exchange.start()?;

        let step = scenario.check_every.max(Duration::from_millis(1));
        let mut next_check = start;
        let deadline = start + scenario.duration;
        while next_check < deadline {
            next_check = (next_check + step).min(deadline);
            tokio::time::sleep_until(next_check).await;

            let elapsed = start.elapsed();
            while let Some((timed, rest)) = pending.split_first() {
                if timed.at > elapsed {
                    break;
                }
                timed.action.apply(&exchange)?;
                actions_applied += 1;
                pending = rest;
            }

            violations.check(&invariants, &exchange.snapshot());
            checks += 1;
        }

        exchange.stop().await;
        exchange.drain().await;

        let final_snapshot = exchange.snapshot();
        violations.check(&invariants, &final_snapshot);
        checks += 1;

        let report = ScenarioReport {
            scenario: scenario.name.clone(),
            seed,
            started_at,
            finished_at: Utc::now(),
            simulated_ms: duration_ms(start.elapsed()),
            actions_applied,
            checks,
            violation_count: violations.count,
            violations: violations.recorded,
            transit: transit.stats(),
            final_snapshot,
        };
        info!(
            scenario = %scenario.name,
            passed = report.passed(),
            checks,
            "Scenario finished"
        );
        Ok(report)
    }

    /// Runs `scenario` on a fresh single-threaded runtime with a paused
    /// clock, so simulated time advances as fast as the work allows and
    /// task interleaving is reproducible.
    ///
    /// Must not be called from within an async context; use
    /// `tokio::task::spawn_blocking` there.
    ///
    /// # Errors
    ///
    /// - `SimulationError::Runtime` - The runtime could not be built
    /// - `SimulationError::Exchange` - The scenario configuration is invalid
    pub fn run_paused(&self, scenario: &Scenario) -> Result<ScenarioReport, SimulationError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .map_err(|e| SimulationError::Runtime {
                reason: e.to_string(),
            })?;
        runtime.block_on(self.run(scenario))
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
