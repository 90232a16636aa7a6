//! Reproducible exchange scenarios.
//!
//! A [`Scenario`] is a configuration, a run length and a timeline of
//! control actions (mode switches, capacity and rate changes) applied while
//! the exchange runs. [`ScenarioRunner`] executes it with seeded randomness
//! and checks invariants along the way.

pub mod catalog;
pub mod runner;

use std::time::Duration;

use serde::Serialize;
use tricolor_core::{BufferMode, Color, Exchange, ExchangeConfig};

pub use catalog::{ScenarioInfo, catalog, find};
pub use runner::{ScenarioReport, ScenarioRunner};

/// Control input applied to a running exchange.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Clears the buffer and switches its layout
    SwitchMode {
        /// Layout after the switch
        mode: BufferMode,
    },
    /// Changes capacity without eviction
    UpdateCapacity {
        /// New capacity
        capacity: usize,
    },
    /// Changes one terminal's rate
    UpdateRate {
        /// Terminal to change
        color: Color,
        /// Tokens per second
        rate: f64,
    },
    /// Changes one terminal's color split
    UpdateRatio {
        /// Terminal to change
        color: Color,
        /// Probability of the first color of the pair
        ratio: f64,
    },
}

impl Action {
    /// Applies the action to `exchange`.
    ///
    /// # Errors
    ///
    /// - `ExchangeError::Configuration` - Rate or ratio out of range
    pub fn apply(&self, exchange: &Exchange) -> tricolor_core::Result<()> {
        match *self {
            Action::SwitchMode { mode } => exchange.switch_mode(mode),
            Action::UpdateCapacity { capacity } => exchange.update_capacity(capacity),
            Action::UpdateRate { color, rate } => exchange.update_rate(color, rate)?,
            Action::UpdateRatio { color, ratio } => exchange.update_ratio(color, ratio)?,
        }
        Ok(())
    }
}

/// An action scheduled at an offset from the start of the run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedAction {
    /// Offset from the start of the run
    pub at: Duration,
    /// What to do
    pub action: Action,
}

/// A named, reproducible exchange run.
#[derive(Debug, Clone)]
pub struct Scenario {
    /// Short identifier used on the command line
    pub name: String,
    /// One-line description
    pub description: String,
    /// Exchange configuration at the start of the run
    pub config: ExchangeConfig,
    /// Simulated run length
    pub duration: Duration,
    /// Interval between invariant checks
    pub check_every: Duration,
    /// Control actions, ordered by offset
    pub timeline: Vec<TimedAction>,
}

impl Scenario {
    /// Returns builder for a scenario named `name`.
    pub fn builder(name: impl Into<String>) -> ScenarioBuilder {
        ScenarioBuilder::new(name.into())
    }
}

/// Builder for custom scenarios.
pub struct ScenarioBuilder {
    scenario: Scenario,
}

impl ScenarioBuilder {
    fn new(name: String) -> Self {
        Self {
            scenario: Scenario {
                name,
                description: String::new(),
                config: ExchangeConfig::default(),
                duration: Duration::from_secs(30),
                check_every: Duration::from_millis(250),
                timeline: Vec::new(),
            },
        }
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.scenario.description = description.into();
        self
    }

    /// Sets the starting configuration.
    pub fn config(mut self, config: ExchangeConfig) -> Self {
        self.scenario.config = config;
        self
    }

    /// Sets the simulated run length.
    pub fn duration(mut self, duration: Duration) -> Self {
        self.scenario.duration = duration;
        self
    }

    /// Sets the interval between invariant checks.
    pub fn check_every(mut self, interval: Duration) -> Self {
        self.scenario.check_every = interval;
        self
    }

    /// Schedules `action` at offset `at`.
    pub fn at(mut self, at: Duration, action: Action) -> Self {
        self.scenario.timeline.push(TimedAction { at, action });
        self
    }

    /// Creates the scenario with its timeline sorted by offset.
    pub fn build(mut self) -> Scenario {
        self.scenario.timeline.sort_by_key(|timed| timed.at);
        self.scenario
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sorts_timeline() {
        let scenario = Scenario::builder("custom")
            .at(
                Duration::from_secs(5),
                Action::UpdateCapacity { capacity: 2 },
            )
            .at(
                Duration::from_secs(1),
                Action::SwitchMode {
                    mode: BufferMode::Separate,
                },
            )
            .build();

        let offsets: Vec<u64> = scenario.timeline.iter().map(|t| t.at.as_secs()).collect();
        assert_eq!(offsets, vec![1, 5]);
        assert_eq!(scenario.name, "custom");
    }

    #[test]
    fn test_action_validation() {
        let exchange = Exchange::new(ExchangeConfig::for_testing()).unwrap();

        let result = Action::UpdateRate {
            color: Color::Red,
            rate: -3.0,
        }
        .apply(&exchange);
        assert!(result.is_err());

        Action::UpdateCapacity { capacity: 4 }.apply(&exchange).unwrap();
        assert_eq!(exchange.snapshot().capacity, 4);
    }
}
