//! Colored producer/consumer endpoints.
//!
//! A [`Terminal`] emits tokens of its two foreign colors into the black box
//! and receives tokens of its own color back. Its [`RateSchedule`] lives in a
//! `watch` channel so the periodic tasks driving it notice rate changes
//! without polling.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::ConfigError;
use crate::black_box::BlackBox;
use crate::buffer::Admission;
use crate::config::TransitConfig;
use crate::counters::ColorTally;
use crate::schedule::RateSchedule;
use crate::snapshot::TerminalStats;
use crate::token::{Color, Token};
use crate::transfer::{Endpoint, Transfer};

/// What became of one emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    /// The token of this color was stored in the buffer.
    Admitted(Color),
    /// The buffer was full; the token of this color was destroyed.
    Overflowed(Color),
    /// The token was lost on the way to the black box.
    Faulted,
    /// The buffer was cleared while the token travelled.
    Discarded,
}

/// One of the three endpoints around the black box.
pub struct Terminal {
    color: Color,
    schedule: watch::Sender<RateSchedule>,
    rng: Mutex<Box<dyn RngCore + Send>>,
    sent: ColorTally,
    received: AtomicU64,
}

impl std::fmt::Debug for Terminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terminal")
            .field("color", &self.color)
            .field("schedule", &self.schedule())
            .field("sent", &self.sent.load())
            .field("received", &self.received.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Terminal {
    /// Creates a terminal drawing colors from an OS-seeded generator.
    pub fn new(color: Color, schedule: RateSchedule) -> Self {
        Self::with_rng(color, schedule, Box::new(StdRng::from_os_rng()))
    }

    /// Creates a terminal drawing colors from `rng`.
    pub fn with_rng(color: Color, schedule: RateSchedule, rng: Box<dyn RngCore + Send>) -> Self {
        let (schedule, _) = watch::channel(schedule);
        Self {
            color,
            schedule,
            rng: Mutex::new(rng),
            sent: ColorTally::default(),
            received: AtomicU64::new(0),
        }
    }

    pub fn color(&self) -> Color {
        self.color
    }

    /// Current schedule.
    pub fn schedule(&self) -> RateSchedule {
        *self.schedule.borrow()
    }

    /// Receiver notified whenever the schedule actually changes.
    pub fn subscribe_schedule(&self) -> watch::Receiver<RateSchedule> {
        self.schedule.subscribe()
    }

    /// Changes the emission rate; also paces output of this terminal's color.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidRate` - Rate is negative, not finite or too high
    pub fn update_rate(&self, rate: f64) -> Result<(), ConfigError> {
        self.modify_schedule(|schedule| schedule.with_rate(rate))
    }

    /// Changes the probability of emitting the first color of the pair.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidRatio` - Ratio lies outside `0..=1`
    pub fn update_ratio(&self, ratio: f64) -> Result<(), ConfigError> {
        self.modify_schedule(|schedule| schedule.with_ratio(ratio))
    }

    /// Replaces the whole schedule with an already validated one.
    pub fn replace_schedule(&self, schedule: RateSchedule) {
        self.schedule.send_if_modified(|current| {
            let changed = *current != schedule;
            *current = schedule;
            changed
        });
    }

    fn modify_schedule(
        &self,
        modify: impl FnOnce(RateSchedule) -> Result<RateSchedule, ConfigError>,
    ) -> Result<(), ConfigError> {
        let mut outcome = Ok(());
        self.schedule.send_if_modified(|current| match modify(*current) {
            Ok(next) => {
                let changed = next != *current;
                *current = next;
                changed
            }
            Err(e) => {
                outcome = Err(e);
                false
            }
        });
        outcome
    }

    /// Draws the color of the next token from the terminal's pair.
    pub fn next_color(&self) -> Color {
        let draw: f64 = self.rng.lock().random();
        self.schedule().pick(self.color.emission_pair(), draw)
    }

    /// Emits one token and carries it into the black box.
    ///
    /// The token travels to this terminal's black-box port and then down
    /// into the buffer; it is offered for admission only once both legs
    /// completed. A faulted leg drops the token without counting it.
    pub async fn emit(
        &self,
        black_box: &BlackBox,
        transfer: &dyn Transfer,
        transit: &TransitConfig,
    ) -> EmitOutcome {
        let generation = black_box.generation();
        let token = Token::new(self.next_color(), self.color, black_box.next_serial());
        debug!(%token, "Token emitted");

        let legs = [
            (
                Endpoint::Terminal(self.color),
                Endpoint::Port(self.color),
                transit.approach,
            ),
            (Endpoint::Port(self.color), Endpoint::Buffer, transit.settle),
        ];
        for (from, to, duration) in legs {
            if let Err(fault) = transfer.transfer(&token, from, to, duration).await {
                warn!(%token, %fault, "Inbound transfer failed, token dropped");
                return EmitOutcome::Faulted;
            }
        }

        let color = token.color();
        match black_box.receive_from(self.color, token, generation) {
            Some(Admission::Accepted) => EmitOutcome::Admitted(color),
            Some(Admission::Rejected) => EmitOutcome::Overflowed(color),
            None => EmitOutcome::Discarded,
        }
    }

    /// Counts a token of `color` admitted on behalf of this terminal.
    pub(crate) fn record_accepted(&self, color: Color) {
        self.sent.increment(color);
    }

    /// Takes delivery of a token. There is no rejection path.
    pub fn receive(&self, token: Token) {
        let received = self.received.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(terminal = %self.color, %token, received, "Token delivered");
    }

    pub fn stats(&self) -> TerminalStats {
        TerminalStats {
            color: self.color,
            schedule: self.schedule(),
            sent: self.sent.load(),
            received: self.received.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn reset_counters(&self) {
        self.sent.clear();
        self.received.store(0, Ordering::Relaxed);
    }
}
