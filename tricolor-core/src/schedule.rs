//! Emission rate and color split for a single terminal.

use std::time::Duration;

use serde::Serialize;

use crate::ConfigError;
use crate::token::Color;

/// Default emission rate in tokens per second.
pub const DEFAULT_RATE: f64 = 1.0;
/// Default probability of picking the first color of a terminal's pair.
pub const DEFAULT_RATIO: f64 = 0.5;
/// Highest accepted rate; keeps the tick interval at or above one millisecond.
pub const MAX_RATE: f64 = 1000.0;

/// Rate and ratio governing one terminal.
///
/// The same schedule paces both the terminal's emissions and the black box's
/// output of that terminal's color. A rate of zero means nothing is
/// scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateSchedule {
    rate: f64,
    ratio: f64,
}

impl Default for RateSchedule {
    fn default() -> Self {
        Self {
            rate: DEFAULT_RATE,
            ratio: DEFAULT_RATIO,
        }
    }
}

impl RateSchedule {
    /// Creates a validated schedule.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidRate` - Rate is negative, not finite or above `MAX_RATE`
    /// - `ConfigError::InvalidRatio` - Ratio lies outside `0..=1`
    pub fn new(rate: f64, ratio: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            rate: validate_rate(rate)?,
            ratio: validate_ratio(ratio)?,
        })
    }

    /// Tokens per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Whether this schedule produces no ticks at all.
    ///
    /// Rates so small that their interval does not fit a `Duration` count
    /// as idle.
    pub fn is_idle(&self) -> bool {
        self.interval().is_none()
    }

    /// Time between two ticks, or `None` for an idle schedule.
    pub fn interval(&self) -> Option<Duration> {
        if self.rate == 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(1.0 / self.rate).ok()
    }

    /// Returns a copy with a different rate.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidRate` - Rate is negative, not finite or above `MAX_RATE`
    pub fn with_rate(self, rate: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            rate: validate_rate(rate)?,
            ..self
        })
    }

    /// Returns a copy with a different ratio.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidRatio` - Ratio lies outside `0..=1`
    pub fn with_ratio(self, ratio: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            ratio: validate_ratio(ratio)?,
            ..self
        })
    }

    /// Chooses between the two colors of `pair` for a uniform draw in `[0, 1)`.
    pub fn pick(&self, pair: (Color, Color), draw: f64) -> Color {
        if draw < self.ratio { pair.0 } else { pair.1 }
    }
}

fn validate_rate(rate: f64) -> Result<f64, ConfigError> {
    if rate.is_finite() && (0.0..=MAX_RATE).contains(&rate) {
        Ok(rate)
    } else {
        Err(ConfigError::InvalidRate {
            rate,
            max: MAX_RATE,
        })
    }
}

fn validate_ratio(ratio: f64) -> Result<f64, ConfigError> {
    if (0.0..=1.0).contains(&ratio) {
        Ok(ratio)
    } else {
        Err(ConfigError::InvalidRatio { ratio })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let schedule = RateSchedule::default();
        assert_eq!(schedule.rate(), 1.0);
        assert_eq!(schedule.ratio(), 0.5);
        assert_eq!(schedule.interval(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_interval_derived_from_rate() {
        let schedule = RateSchedule::new(4.0, 0.5).unwrap();
        assert_eq!(schedule.interval(), Some(Duration::from_millis(250)));

        let idle = RateSchedule::new(0.0, 0.5).unwrap();
        assert!(idle.is_idle());
        assert_eq!(idle.interval(), None);
    }

    #[test]
    fn test_vanishing_rate_is_idle() {
        for rate in [1e-20, f64::MIN_POSITIVE, 5e-324] {
            let schedule = RateSchedule::new(rate, 0.5).unwrap();
            assert_eq!(schedule.interval(), None, "rate {rate}");
            assert!(schedule.is_idle());
        }

        let slow = RateSchedule::new(1.0 / 1024.0, 0.5).unwrap();
        assert_eq!(slow.interval(), Some(Duration::from_secs(1024)));
        assert!(!slow.is_idle());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            RateSchedule::new(-1.0, 0.5),
            Err(ConfigError::InvalidRate { .. })
        ));
        assert!(matches!(
            RateSchedule::new(f64::NAN, 0.5),
            Err(ConfigError::InvalidRate { .. })
        ));
        assert!(matches!(
            RateSchedule::new(MAX_RATE + 1.0, 0.5),
            Err(ConfigError::InvalidRate { .. })
        ));
        assert!(matches!(
            RateSchedule::new(1.0, 1.01),
            Err(ConfigError::InvalidRatio { .. })
        ));
        assert!(matches!(
            RateSchedule::default().with_ratio(f64::NAN),
            Err(ConfigError::InvalidRatio { .. })
        ));
    }

    #[test]
    fn test_pick_uses_ratio_threshold() {
        let pair = Color::Red.emission_pair();
        let schedule = RateSchedule::new(1.0, 0.3).unwrap();

        assert_eq!(schedule.pick(pair, 0.0), Color::Yellow);
        assert_eq!(schedule.pick(pair, 0.29), Color::Yellow);
        assert_eq!(schedule.pick(pair, 0.3), Color::Blue);
        assert_eq!(schedule.pick(pair, 0.99), Color::Blue);

        let all_high = schedule.with_ratio(0.0).unwrap();
        assert_eq!(all_high.pick(pair, 0.0), Color::Blue);

        let all_low = schedule.with_ratio(1.0).unwrap();
        assert_eq!(all_low.pick(pair, 0.999), Color::Yellow);
    }
}
