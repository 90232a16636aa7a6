//! Movement of tokens between endpoints.
//!
//! The exchange never moves a token itself; it asks a [`Transfer`]
//! implementation to carry the token from one endpoint to another and awaits
//! the outcome. A front end can animate the trip, a simulation can add jitter
//! and faults, and tests can make it instantaneous.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::token::{Color, Token};

/// A place a token can travel between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "color", rename_all = "lowercase")]
pub enum Endpoint {
    /// The I/O port of a terminal.
    Terminal(Color),
    /// The black-box port facing the terminal of that color.
    Port(Color),
    /// The storage area inside the black box.
    Buffer,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Terminal(color) => write!(f, "{color} terminal"),
            Endpoint::Port(color) => write!(f, "{color} port"),
            Endpoint::Buffer => write!(f, "buffer"),
        }
    }
}

/// A trip that did not complete.
///
/// The token is lost; the exchange drops it without touching any counter and
/// never retries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferFault {
    #[error("Token {token} vanished between {from} and {to}")]
    Vanished {
        token: String,
        from: Endpoint,
        to: Endpoint,
    },

    #[error("Transfer interrupted: {reason}")]
    Interrupted { reason: String },
}

/// Carries tokens between endpoints.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Moves `token` from `from` to `to`, suspending the caller for roughly
    /// `duration`.
    ///
    /// # Errors
    ///
    /// - `TransferFault::Vanished` - The token was lost on the way
    /// - `TransferFault::Interrupted` - The trip was aborted before arriving
    async fn transfer(
        &self,
        token: &Token,
        from: Endpoint,
        to: Endpoint,
        duration: Duration,
    ) -> Result<(), TransferFault>;
}

/// Transfer that simply waits out the trip duration and always succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimedTransfer;

#[async_trait]
impl Transfer for TimedTransfer {
    async fn transfer(
        &self,
        _token: &Token,
        _from: Endpoint,
        _to: Endpoint,
        duration: Duration,
    ) -> Result<(), TransferFault> {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timed_transfer_waits_for_duration() {
        let token = Token::new(Color::Blue, Color::Red, 0);
        let start = tokio::time::Instant::now();

        TimedTransfer
            .transfer(
                &token,
                Endpoint::Terminal(Color::Red),
                Endpoint::Port(Color::Red),
                Duration::from_millis(1000),
            )
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[test]
    fn test_endpoint_display() {
        assert_eq!(Endpoint::Terminal(Color::Yellow).to_string(), "yellow terminal");
        assert_eq!(Endpoint::Port(Color::Red).to_string(), "red port");
        assert_eq!(Endpoint::Buffer.to_string(), "buffer");
    }
}
