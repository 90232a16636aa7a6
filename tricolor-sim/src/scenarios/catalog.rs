//! Canned scenarios.

use std::time::Duration;

use tricolor_core::{
    BufferMode, Color, ExchangeConfig, RateSchedule, SimulationConfig, TerminalConfig,
};

use super::{Action, Scenario};
use crate::SimulationError;

/// Catalog entry of a canned scenario.
#[derive(Debug, Clone, Copy)]
pub struct ScenarioInfo {
    /// Identifier accepted by [`find`]
    pub name: &'static str,
    /// One-line description
    pub description: &'static str,
    build: fn() -> Scenario,
}

impl ScenarioInfo {
    /// Builds the scenario.
    pub fn scenario(&self) -> Scenario {
        let mut scenario = (self.build)();
        scenario.name = self.name.to_string();
        scenario.description = self.description.to_string();
        scenario
    }
}

const CATALOG: &[ScenarioInfo] = &[
    ScenarioInfo {
        name: "steady_state",
        description: "Default exchange: shared buffer of 10, every terminal at 1 token/s",
        build: steady_state,
    },
    ScenarioInfo {
        name: "overflow_storm",
        description: "Blue and yellow flood red tokens into a shared buffer of 2",
        build: overflow_storm,
    },
    ScenarioInfo {
        name: "separate_isolation",
        description: "Separate queues of 2 with red idle: only the red queue fills and overflows",
        build: separate_isolation,
    },
    ScenarioInfo {
        name: "idle_terminal",
        description: "Blue terminal at rate 0 never emits and never receives",
        build: idle_terminal,
    },
    ScenarioInfo {
        name: "lossy_transit",
        description: "Jittery transit losing 5% of legs; lost tokens are never counted",
        build: lossy_transit,
    },
    ScenarioInfo {
        name: "mode_flip",
        description: "Mode switches, capacity and schedule changes while tokens are in flight",
        build: mode_flip,
    },
    ScenarioInfo {
        name: "pause_resume",
        description: "All terminals drop to rate 0 mid-run, then resume at a higher rate",
        build: pause_resume,
    },
];

/// All canned scenarios, in presentation order.
pub fn catalog() -> &'static [ScenarioInfo] {
    CATALOG
}

/// Builds the canned scenario called `name`.
///
/// # Errors
///
/// - `SimulationError::UnknownScenario` - No scenario has that name
pub fn find(name: &str) -> Result<Scenario, SimulationError> {
    CATALOG
        .iter()
        .find(|info| info.name == name)
        .map(ScenarioInfo::scenario)
        .ok_or_else(|| SimulationError::UnknownScenario {
            name: name.to_string(),
        })
}

fn schedule(rate: f64, ratio: f64) -> RateSchedule {
    // Catalog values are constants within range.
    RateSchedule::new(rate, ratio).unwrap_or_default()
}

fn steady_state() -> Scenario {
    Scenario::builder("steady_state")
        .duration(Duration::from_secs(60))
        .build()
}

fn overflow_storm() -> Scenario {
    let mut config = ExchangeConfig::default();
    config.buffer.capacity = 2;
    config.terminals = TerminalConfig {
        red: schedule(6.0, 0.5),
        // Red is the first color of both pairs.
        blue: schedule(6.0, 1.0),
        yellow: schedule(6.0, 1.0),
    };

    Scenario::builder("overflow_storm")
        .config(config)
        .duration(Duration::from_secs(30))
        .build()
}

fn separate_isolation() -> Scenario {
    let mut config = ExchangeConfig::default();
    config.buffer.mode = BufferMode::Separate;
    config.buffer.capacity = 2;
    config.terminals.red = schedule(0.0, 0.5);

    Scenario::builder("separate_isolation")
        .config(config)
        .duration(Duration::from_secs(30))
        .build()
}

fn idle_terminal() -> Scenario {
    let mut config = ExchangeConfig::default();
    config.terminals.blue = schedule(0.0, 0.5);

    Scenario::builder("idle_terminal")
        .config(config)
        .duration(Duration::from_secs(30))
        .build()
}

fn lossy_transit() -> Scenario {
    let config = ExchangeConfig {
        simulation: SimulationConfig::lossy(0),
        ..ExchangeConfig::default()
    };

    Scenario::builder("lossy_transit")
        .config(config)
        .duration(Duration::from_secs(60))
        .build()
}

fn mode_flip() -> Scenario {
    Scenario::builder("mode_flip")
        .config(ExchangeConfig {
            terminals: TerminalConfig::uniform(schedule(3.0, 0.5)),
            ..ExchangeConfig::default()
        })
        .duration(Duration::from_secs(30))
        .at(
            Duration::from_secs(5),
            Action::SwitchMode {
                mode: BufferMode::Separate,
            },
        )
        .at(
            Duration::from_secs(10),
            Action::UpdateCapacity { capacity: 14 },
        )
        .at(
            Duration::from_secs(15),
            Action::SwitchMode {
                mode: BufferMode::Shared,
            },
        )
        .at(
            Duration::from_secs(18),
            Action::UpdateCapacity { capacity: 4 },
        )
        .at(
            Duration::from_secs(18),
            Action::SwitchMode {
                mode: BufferMode::Shared,
            },
        )
        .at(
            Duration::from_secs(20),
            Action::UpdateRate {
                color: Color::Red,
                rate: 8.0,
            },
        )
        .at(
            Duration::from_secs(22),
            Action::UpdateRatio {
                color: Color::Blue,
                ratio: 0.1,
            },
        )
        .at(
            Duration::from_secs(25),
            Action::SwitchMode {
                mode: BufferMode::Separate,
            },
        )
        .build()
}

fn pause_resume() -> Scenario {
    let mut builder = Scenario::builder("pause_resume").duration(Duration::from_secs(40));
    for color in Color::ALL {
        builder = builder
            .at(
                Duration::from_secs(10),
                Action::UpdateRate { color, rate: 0.0 },
            )
            .at(
                Duration::from_secs(20),
                Action::UpdateRate { color, rate: 2.0 },
            );
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_names_are_unique_and_resolvable() {
        let mut names: Vec<&str> = catalog().iter().map(|info| info.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), catalog().len());

        for info in catalog() {
            let scenario = find(info.name).unwrap();
            assert_eq!(scenario.name, info.name);
            assert!(!scenario.description.is_empty());
            assert!(scenario.config.validate().is_ok());
        }
    }

    #[test]
    fn test_unknown_scenario() {
        assert!(matches!(
            find("tidal_wave"),
            Err(SimulationError::UnknownScenario { .. })
        ));
    }

    #[test]
    fn test_overflow_storm_floods_red() {
        let scenario = find("overflow_storm").unwrap();
        let pair = Color::Blue.emission_pair();
        assert_eq!(scenario.config.terminals.blue.pick(pair, 0.99), Color::Red);
        let pair = Color::Yellow.emission_pair();
        assert_eq!(scenario.config.terminals.yellow.pick(pair, 0.99), Color::Red);
    }
}
