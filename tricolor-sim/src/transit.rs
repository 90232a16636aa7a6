//! Transit condition simulation
//!
//! [`SimulatedTransit`] stands in for the animation layer of an interactive
//! front end: every leg takes its nominal duration plus random jitter, and
//! may fail outright with a configured probability.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::trace;
use tricolor_core::{Endpoint, SimulationConfig, Token, Transfer, TransferFault};

use crate::rng::DeterministicRng;

/// Seed used when none is configured.
const DEFAULT_SEED: u64 = 0x5EED;

/// Counts of legs carried by a [`SimulatedTransit`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransitStats {
    /// Legs that completed
    pub completed: u64,
    /// Legs that lost their token
    pub faulted: u64,
}

/// Simulates trips with latency jitter and token loss.
#[derive(Debug)]
pub struct SimulatedTransit {
    jitter: Duration,
    fault_rate: f64,
    rng: Mutex<DeterministicRng>,
    completed: AtomicU64,
    faulted: AtomicU64,
}

impl Default for SimulatedTransit {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SimulatedTransit {
    /// Returns builder for customizing transit conditions.
    pub fn builder() -> SimulatedTransitBuilder {
        SimulatedTransitBuilder::new()
    }

    /// Creates transit with the jitter, fault rate and seed of `config`.
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::builder()
            .seed(config.deterministic_seed.unwrap_or(DEFAULT_SEED))
            .jitter(config.jitter)
            .fault_rate(config.fault_rate)
            .build()
    }

    /// Legs carried so far.
    pub fn stats(&self) -> TransitStats {
        TransitStats {
            completed: self.completed.load(Ordering::Relaxed),
            faulted: self.faulted.load(Ordering::Relaxed),
        }
    }

    /// Draws the delay of one leg and whether it loses its token.
    fn plan_leg(&self, nominal: Duration) -> (Duration, bool) {
        let mut rng = self.rng.lock();
        let delay = nominal + rng.random_fraction_of(self.jitter);
        let lost = rng.random_bool(self.fault_rate);
        (delay, lost)
    }
}

#[async_trait]
impl Transfer for SimulatedTransit {
    async fn transfer(
        &self,
        token: &Token,
        from: Endpoint,
        to: Endpoint,
        duration: Duration,
    ) -> Result<(), TransferFault> {
        let (delay, lost) = self.plan_leg(duration);

        if lost {
            // A lost token disappears halfway.
            tokio::time::sleep(delay / 2).await;
            self.faulted.fetch_add(1, Ordering::Relaxed);
            return Err(TransferFault::Vanished {
                token: token.to_string(),
                from,
                to,
            });
        }

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.completed.fetch_add(1, Ordering::Relaxed);
        trace!(%token, %from, %to, ?delay, "Leg completed");
        Ok(())
    }
}

/// Builder for configuring transit simulation parameters.
pub struct SimulatedTransitBuilder {
    seed: u64,
    jitter: Duration,
    fault_rate: f64,
}

impl SimulatedTransitBuilder {
    fn new() -> Self {
        Self {
            seed: DEFAULT_SEED,
            jitter: Duration::ZERO,
            fault_rate: 0.0,
        }
    }

    /// Sets the seed of the jitter and fault draws.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the maximum extra delay added to each leg.
    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Sets the probability (0.0-1.0) that a leg loses its token.
    pub fn fault_rate(mut self, rate: f64) -> Self {
        self.fault_rate = rate;
        self
    }

    /// Creates transit with configured settings.
    pub fn build(self) -> SimulatedTransit {
        SimulatedTransit {
            jitter: self.jitter,
            fault_rate: self.fault_rate,
            rng: Mutex::new(DeterministicRng::from_seed(self.seed)),
            completed: AtomicU64::new(0),
            faulted: AtomicU64::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use tricolor_core::Color;

    use super::*;

    fn token() -> Token {
        Token::new(Color::Blue, Color::Red, 0)
    }

    fn leg() -> (Endpoint, Endpoint) {
        (Endpoint::Terminal(Color::Red), Endpoint::Port(Color::Red))
    }

    #[tokio::test(start_paused = true)]
    async fn test_jitter_stays_within_bounds() {
        let transit = SimulatedTransit::builder()
            .seed(3)
            .jitter(Duration::from_millis(200))
            .build();
        let (from, to) = leg();

        for _ in 0..20 {
            let start = tokio::time::Instant::now();
            transit
                .transfer(&token(), from, to, Duration::from_millis(1000))
                .await
                .unwrap();
            let elapsed = start.elapsed();
            assert!(elapsed >= Duration::from_millis(1000));
            assert!(elapsed <= Duration::from_millis(1201));
        }
        assert_eq!(transit.stats().completed, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_loss() {
        let transit = SimulatedTransit::builder().fault_rate(1.0).build();
        let (from, to) = leg();

        for _ in 0..10 {
            let result = transit.transfer(&token(), from, to, Duration::ZERO).await;
            assert!(matches!(result, Err(TransferFault::Vanished { .. })));
        }
        assert_eq!(
            transit.stats(),
            TransitStats {
                completed: 0,
                faulted: 10
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_loss_by_default() {
        let transit = SimulatedTransit::default();
        let (from, to) = leg();

        for _ in 0..50 {
            transit
                .transfer(&token(), from, to, Duration::from_millis(10))
                .await
                .unwrap();
        }
        assert_eq!(transit.stats().faulted, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_seed_same_faults() {
        let config = SimulationConfig {
            deterministic_seed: Some(99),
            fault_rate: 0.3,
            jitter: Duration::from_millis(50),
        };
        let first = SimulatedTransit::from_config(&config);
        let second = SimulatedTransit::from_config(&config);
        let (from, to) = leg();

        for _ in 0..40 {
            let a = first.transfer(&token(), from, to, Duration::ZERO).await.is_ok();
            let b = second.transfer(&token(), from, to, Duration::ZERO).await.is_ok();
            assert_eq!(a, b);
        }
        assert_eq!(first.stats(), second.stats());
    }
}
