//! Tricolor Core - bounded-buffer exchange between three terminals
//!
//! Three colored terminals emit tokens of the two foreign colors into a
//! central black box, which buffers them (one shared queue or one queue per
//! color) and hands each color back to its own terminal at that terminal's
//! rate. Admission is capacity-checked at arrival; a full buffer rejects the
//! token as overflow.
//!
//! The crate exposes the building blocks (tokens, schedules, terminals, the
//! buffer store, the black box) and the [`Exchange`] driver that runs six
//! periodic tasks on top of them.

pub mod black_box;
pub mod buffer;
pub mod config;
pub mod counters;
pub mod exchange;
pub mod schedule;
pub mod snapshot;
pub mod terminal;
pub mod token;
pub mod tracing_setup;
pub mod transfer;

pub use black_box::{BlackBox, OutputOutcome, Parcel};
pub use buffer::{Admission, BufferMode, BufferOccupancy, BufferStore};
pub use config::{BufferConfig, ExchangeConfig, SimulationConfig, TerminalConfig, TransitConfig};
pub use counters::ColorCounts;
pub use exchange::{Exchange, ExchangeBuilder, InFlight, InFlightGuard};
pub use schedule::RateSchedule;
pub use snapshot::{BlackBoxStats, ExchangeSnapshot, TerminalStats};
pub use terminal::{EmitOutcome, Terminal};
pub use token::{Color, Token};
pub use transfer::{Endpoint, TimedTransfer, Transfer, TransferFault};

/// Configuration values rejected at the boundary before they reach a
/// running exchange.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid rate {rate}: must be finite and within 0..={max}")]
    InvalidRate { rate: f64, max: f64 },

    #[error("Invalid ratio {ratio}: must be within 0..=1")]
    InvalidRatio { ratio: f64 },

    #[error("Invalid fault rate {rate}: must be within 0..=1")]
    InvalidFaultRate { rate: f64 },

    #[error("Invalid value {value:?} for {variable}: {reason}")]
    InvalidEnvironment {
        variable: String,
        value: String,
        reason: String,
    },

    #[error("Unknown color '{value}'. Valid options are: red, blue, yellow")]
    UnknownColor { value: String },

    #[error("Unknown buffer mode '{value}'. Valid options are: shared, separate")]
    UnknownMode { value: String },
}

/// Errors that can surface from the exchange engine.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Runtime error: {reason}")]
    Runtime { reason: String },
}

impl ExchangeError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            ExchangeError::Configuration(e) => match e {
                ConfigError::InvalidRate { rate, .. } => {
                    format!("Emission rate {rate} is out of range")
                }
                ConfigError::InvalidRatio { ratio } => {
                    format!("Color ratio {ratio} must be between 0 and 1")
                }
                ConfigError::UnknownColor { value } => format!("No terminal named '{value}'"),
                _ => "Configuration error occurred".to_string(),
            },
            ExchangeError::Runtime { .. } => "Exchange could not be started".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(self, ExchangeError::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, ExchangeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors_are_user_errors() {
        let error = ExchangeError::from(ConfigError::InvalidRatio { ratio: 1.5 });
        assert!(error.is_user_error());
        assert_eq!(error.user_message(), "Color ratio 1.5 must be between 0 and 1");

        let error = ExchangeError::Runtime {
            reason: "no reactor".to_string(),
        };
        assert!(!error.is_user_error());
    }
}
