//! Tricolor Simulation Framework - Reproducible runs of the token exchange.

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
//!
//! This crate drives a [`tricolor_core::Exchange`] under controlled,
//! reproducible conditions and checks that its accounting holds.
//!
//! # Features
//!
//! - **Deterministic Execution**: Same seed always produces identical color draws and faults
//! - **Paused Clock**: Scenarios run on a paused tokio clock, so a minute of exchange time
//!   takes milliseconds
//! - **Transit Simulation**: Configurable jitter and token loss on every leg
//! - **Invariant Checking**: Capacity, accounting and monotonicity validated during execution
//! - **Scenario Library**: Canned runs for overflow, isolation, idling, loss and mode flips
//!
//! # Example
//!
//! ```rust,no_run
//! use tricolor_sim::{ScenarioRunner, scenarios};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let scenario = scenarios::find("overflow_storm")?;
//! let report = ScenarioRunner::new(12345).run_paused(&scenario)?;
//!
//! println!("{report}");
//! assert!(report.passed());
//! # Ok(())
//! # }
//! ```

use tricolor_core::ExchangeError;

pub mod invariants;
pub mod rng;
pub mod scenarios;
pub mod transit;

pub use invariants::{
    AccountingInvariant, CapacityInvariant, ForeignColorInvariant, Invariant, InvariantViolation,
    MonotonicCountersInvariant, OverflowTotalInvariant, default_invariants,
};
pub use rng::{DeterministicRng, boxed_terminal_rng, terminal_rng};
pub use scenarios::{Action, Scenario, ScenarioBuilder, ScenarioReport, ScenarioRunner};
pub use transit::{SimulatedTransit, SimulatedTransitBuilder, TransitStats};

/// Errors that can occur while preparing or running a simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// No canned scenario has the requested name
    #[error("Unknown scenario '{name}'. Run `tricolor scenarios` to list them")]
    UnknownScenario {
        /// Requested name
        name: String,
    },

    /// The exchange refused the scenario's configuration or failed to start
    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    /// The simulation runtime could not be created
    #[error("Simulation runtime error: {reason}")]
    Runtime {
        /// Failure description
        reason: String,
    },
}
