//! Centralized configuration for the exchange.
//!
//! All tunable parameters are defined here to avoid hard-coded values
//! scattered throughout the codebase. Defaults: a shared buffer of ten, one
//! token per second per terminal with an even color split, and a 2.6s
//! inbound / 1s outbound trip.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::ConfigError;
use crate::buffer::{BufferMode, DEFAULT_CAPACITY};
use crate::schedule::RateSchedule;
use crate::token::Color;

/// Central configuration for every exchange component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExchangeConfig {
    pub buffer: BufferConfig,
    pub terminals: TerminalConfig,
    pub transit: TransitConfig,
    pub simulation: SimulationConfig,
}

/// Black-box storage settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferConfig {
    /// Layout of the store at startup and after a reset
    pub mode: BufferMode,
    /// Tokens per queue (per color in separate mode)
    pub capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            mode: BufferMode::Shared,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Startup schedule of each terminal; also what a reset restores.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TerminalConfig {
    pub red: RateSchedule,
    pub blue: RateSchedule,
    pub yellow: RateSchedule,
}

impl TerminalConfig {
    /// Uses the same schedule for all three terminals.
    pub fn uniform(schedule: RateSchedule) -> Self {
        Self {
            red: schedule,
            blue: schedule,
            yellow: schedule,
        }
    }

    pub fn schedule(&self, color: Color) -> RateSchedule {
        match color {
            Color::Red => self.red,
            Color::Blue => self.blue,
            Color::Yellow => self.yellow,
        }
    }

    pub fn schedule_mut(&mut self, color: Color) -> &mut RateSchedule {
        match color {
            Color::Red => &mut self.red,
            Color::Blue => &mut self.blue,
            Color::Yellow => &mut self.yellow,
        }
    }
}

/// Durations of the legs a token travels.
///
/// Inbound trips take two legs (terminal to black-box port, then port to
/// buffer); the token only arrives once both are done. Outbound trips take
/// one leg from the buffer to the receiving terminal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitConfig {
    /// Terminal port to black-box port
    pub approach: Duration,
    /// Black-box port down into the buffer
    pub settle: Duration,
    /// Buffer out to the receiving terminal
    pub outbound: Duration,
}

impl Default for TransitConfig {
    fn default() -> Self {
        Self {
            approach: Duration::from_millis(1000),
            settle: Duration::from_millis(1600), // 400 + 500 + 400 + 300 in-box hops
            outbound: Duration::from_millis(1000),
        }
    }
}

impl TransitConfig {
    /// Trips that complete without any delay.
    pub fn instant() -> Self {
        Self {
            approach: Duration::ZERO,
            settle: Duration::ZERO,
            outbound: Duration::ZERO,
        }
    }

    /// Total time from leaving a terminal to arriving in the buffer.
    pub fn inbound(&self) -> Duration {
        self.approach + self.settle
    }

    /// Longest single trip, inbound or outbound.
    pub fn longest_trip(&self) -> Duration {
        self.inbound().max(self.outbound)
    }
}

/// Simulation parameters for seeded and lossy runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationConfig {
    /// Deterministic seed for reproducible color draws and faults
    pub deterministic_seed: Option<u64>,
    /// Probability that a single transfer leg faults (0.0 to 1.0)
    pub fault_rate: f64,
    /// Maximum extra delay added to every leg
    pub jitter: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            deterministic_seed: None,
            fault_rate: 0.0,
            jitter: Duration::ZERO,
        }
    }
}

impl SimulationConfig {
    /// Creates a configuration for deterministic testing.
    pub fn deterministic_testing() -> Self {
        Self {
            deterministic_seed: Some(42), // Fixed seed for reproducible tests
            fault_rate: 0.0,
            jitter: Duration::ZERO,
        }
    }

    /// Creates a configuration with lossy, jittery transit.
    pub fn lossy(seed: u64) -> Self {
        Self {
            deterministic_seed: Some(seed),
            fault_rate: 0.05,
            jitter: Duration::from_millis(250),
        }
    }
}

impl ExchangeConfig {
    /// Creates configuration with `TRICOLOR_*` environment overrides.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidEnvironment` - A variable is set but does not parse
    /// - `ConfigError::InvalidRate` - A rate override is out of range
    /// - `ConfigError::InvalidRatio` - A ratio override is out of range
    /// - `ConfigError::InvalidFaultRate` - The fault rate override is out of range
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from defaults plus overrides found by `lookup`.
    ///
    /// Recognised keys: `TRICOLOR_MODE`, `TRICOLOR_CAPACITY`,
    /// `TRICOLOR_RATE_<COLOR>`, `TRICOLOR_RATIO_<COLOR>`, `TRICOLOR_SEED`,
    /// `TRICOLOR_FAULT_RATE`.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidEnvironment` - A value is present but does not parse
    /// - `ConfigError::InvalidRate` - A rate override is out of range
    /// - `ConfigError::InvalidRatio` - A ratio override is out of range
    /// - `ConfigError::InvalidFaultRate` - The fault rate override is out of range
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup("TRICOLOR_MODE") {
            config.buffer.mode = parse_value("TRICOLOR_MODE", value)?;
        }

        if let Some(value) = lookup("TRICOLOR_CAPACITY") {
            config.buffer.capacity = parse_value("TRICOLOR_CAPACITY", value)?;
        }

        for color in Color::ALL {
            let suffix = color.as_str().to_uppercase();

            let key = format!("TRICOLOR_RATE_{suffix}");
            if let Some(value) = lookup(&key) {
                let rate: f64 = parse_value(&key, value)?;
                let schedule = config.terminals.schedule_mut(color);
                *schedule = schedule.with_rate(rate)?;
            }

            let key = format!("TRICOLOR_RATIO_{suffix}");
            if let Some(value) = lookup(&key) {
                let ratio: f64 = parse_value(&key, value)?;
                let schedule = config.terminals.schedule_mut(color);
                *schedule = schedule.with_ratio(ratio)?;
            }
        }

        if let Some(value) = lookup("TRICOLOR_SEED") {
            config.simulation.deterministic_seed = Some(parse_value("TRICOLOR_SEED", value)?);
        }

        if let Some(value) = lookup("TRICOLOR_FAULT_RATE") {
            config.simulation.fault_rate = parse_value("TRICOLOR_FAULT_RATE", value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Creates a configuration optimized for testing: instant trips, fixed
    /// seed, no faults.
    pub fn for_testing() -> Self {
        Self {
            transit: TransitConfig::instant(),
            simulation: SimulationConfig::deterministic_testing(),
            ..Default::default()
        }
    }

    /// Checks values that cannot be enforced by construction.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidFaultRate` - Fault rate lies outside `0..=1`
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rate = self.simulation.fault_rate;
        if !(0.0..=1.0).contains(&rate) {
            return Err(ConfigError::InvalidFaultRate { rate });
        }
        Ok(())
    }
}

fn parse_value<T>(variable: &str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match value.trim().parse::<T>() {
        Ok(parsed) => Ok(parsed),
        Err(e) => Err(ConfigError::InvalidEnvironment {
            variable: variable.to_string(),
            reason: e.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_values() {
        let config = ExchangeConfig::default();

        assert_eq!(config.buffer.mode, BufferMode::Shared);
        assert_eq!(config.buffer.capacity, 10);
        for color in Color::ALL {
            assert_eq!(config.terminals.schedule(color), RateSchedule::default());
        }
        assert_eq!(config.transit.inbound(), Duration::from_millis(2600));
        assert_eq!(config.transit.longest_trip(), Duration::from_millis(2600));
        assert_eq!(config.simulation.deterministic_seed, None);
        assert_eq!(config.simulation.fault_rate, 0.0);
    }

    #[test]
    fn test_config_presets() {
        let testing = ExchangeConfig::for_testing();
        assert_eq!(testing.transit, TransitConfig::instant());
        assert_eq!(testing.simulation.deterministic_seed, Some(42));

        let lossy = SimulationConfig::lossy(7);
        assert_eq!(lossy.deterministic_seed, Some(7));
        assert!(lossy.fault_rate > 0.0);
        assert!(lossy.jitter > Duration::ZERO);
    }

    #[test]
    fn test_lookup_overrides() {
        let config = ExchangeConfig::from_lookup(lookup_from(&[
            ("TRICOLOR_MODE", "separate"),
            ("TRICOLOR_CAPACITY", "3"),
            ("TRICOLOR_RATE_BLUE", "2.5"),
            ("TRICOLOR_RATIO_YELLOW", "0.8"),
            ("TRICOLOR_SEED", "12345"),
            ("TRICOLOR_FAULT_RATE", "0.1"),
        ]))
        .unwrap();

        assert_eq!(config.buffer.mode, BufferMode::Separate);
        assert_eq!(config.buffer.capacity, 3);
        assert_eq!(config.terminals.blue.rate(), 2.5);
        assert_eq!(config.terminals.yellow.ratio(), 0.8);
        assert_eq!(config.terminals.red, RateSchedule::default());
        assert_eq!(config.simulation.deterministic_seed, Some(12345));
        assert_eq!(config.simulation.fault_rate, 0.1);
    }

    #[test]
    fn test_malformed_overrides_are_refused() {
        let result = ExchangeConfig::from_lookup(lookup_from(&[("TRICOLOR_CAPACITY", "-1")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidEnvironment { ref variable, .. }) if variable == "TRICOLOR_CAPACITY"
        ));

        let result = ExchangeConfig::from_lookup(lookup_from(&[("TRICOLOR_RATE_RED", "-2")]));
        assert!(matches!(result, Err(ConfigError::InvalidRate { .. })));

        let result = ExchangeConfig::from_lookup(lookup_from(&[("TRICOLOR_MODE", "mixed")]));
        assert!(matches!(result, Err(ConfigError::InvalidEnvironment { .. })));

        let result = ExchangeConfig::from_lookup(lookup_from(&[("TRICOLOR_FAULT_RATE", "1.5")]));
        assert!(matches!(result, Err(ConfigError::InvalidFaultRate { .. })));
    }
}
