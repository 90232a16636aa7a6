//! The central buffering stage.
//!
//! [`BlackBox`] owns the buffer store, the three terminals and its own
//! counters. Everything that mutates the store or a counter runs inside one
//! `parking_lot` mutex, so admission, overflow accounting, delivery and
//! snapshots are linearizable with respect to each other. Transfers never
//! run under the lock.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, info, warn};

use crate::buffer::{Admission, BufferMode, BufferStore};
use crate::config::{ExchangeConfig, TransitConfig};
use crate::counters::ColorCounts;
use crate::snapshot::{BlackBoxStats, ExchangeSnapshot};
use crate::terminal::Terminal;
use crate::token::{Color, Token};
use crate::transfer::{Endpoint, Transfer};

/// A token taken out of the store, together with the store generation it
/// was taken from.
#[derive(Debug)]
pub struct Parcel {
    token: Token,
    generation: u64,
}

impl Parcel {
    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// What became of one output tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputOutcome {
    /// No token of the requested color was stored.
    Empty,
    /// The token reached its terminal.
    Delivered,
    /// The token was lost on the way out.
    Faulted,
    /// The buffer was cleared while the token travelled.
    Discarded,
}

#[derive(Debug, Default)]
struct Ledger {
    store: BufferStore,
    received: u64,
    sent: u64,
    overflow: ColorCounts,
    overflow_total: u64,
}

impl Ledger {
    fn clear_counters(&mut self) {
        self.received = 0;
        self.sent = 0;
        self.overflow = ColorCounts::default();
        self.overflow_total = 0;
    }
}

/// Buffering stage between the three terminals.
#[derive(Debug)]
pub struct BlackBox {
    ledger: Mutex<Ledger>,
    terminals: [Terminal; 3],
    serial: AtomicU64,
}

impl BlackBox {
    /// Creates a black box from `config`.
    ///
    /// Terminals draw from generators seeded with the configured
    /// deterministic seed, or from the OS when there is none.
    pub fn new(config: &ExchangeConfig) -> Self {
        let seed = config.simulation.deterministic_seed;
        Self::with_rngs(config, |color| -> Box<dyn RngCore + Send> {
            match seed {
                Some(seed) => Box::new(StdRng::seed_from_u64(
                    seed.wrapping_add(color.index() as u64),
                )),
                None => Box::new(StdRng::from_os_rng()),
            }
        })
    }

    /// Creates a black box whose terminals draw from the generators returned
    /// by `rng_for`.
    pub fn with_rngs(
        config: &ExchangeConfig,
        mut rng_for: impl FnMut(Color) -> Box<dyn RngCore + Send>,
    ) -> Self {
        let terminals = Color::ALL.map(|color| {
            Terminal::with_rng(color, config.terminals.schedule(color), rng_for(color))
        });

        Self {
            ledger: Mutex::new(Ledger {
                store: BufferStore::new(config.buffer.mode, config.buffer.capacity),
                ..Ledger::default()
            }),
            terminals,
            serial: AtomicU64::new(0),
        }
    }

    pub fn terminal(&self, color: Color) -> &Terminal {
        &self.terminals[color.index()]
    }

    pub fn terminals(&self) -> &[Terminal; 3] {
        &self.terminals
    }

    /// Current store generation; see [`BufferStore::generation`].
    pub fn generation(&self) -> u64 {
        self.ledger.lock().store.generation()
    }

    /// Next diagnostic serial for a freshly emitted token.
    pub fn next_serial(&self) -> u64 {
        self.serial.fetch_add(1, Ordering::Relaxed)
    }

    pub fn mode(&self) -> BufferMode {
        self.ledger.lock().store.mode()
    }

    pub fn capacity(&self) -> usize {
        self.ledger.lock().store.capacity()
    }

    /// Takes in a token that arrived from the `origin` terminal.
    ///
    /// The arrival is counted, then the token is offered to the store. An
    /// accepted token counts as sent by its origin terminal; a rejected one
    /// counts as overflow of its color and is destroyed.
    ///
    /// Returns `None` without counting anything when the store was cleared
    /// after the token left its terminal at `generation`.
    pub fn receive_from(&self, origin: Color, token: Token, generation: u64) -> Option<Admission> {
        let mut ledger = self.ledger.lock();
        if ledger.store.generation() != generation {
            debug!(%token, generation, "Token left before the buffer was cleared, discarding");
            return None;
        }

        ledger.received += 1;
        let color = token.color();
        let serial = token.serial();
        let admission = ledger.store.enqueue(token);
        match admission {
            Admission::Accepted => {
                self.terminal(origin).record_accepted(color);
                debug!(%color, serial, %origin, stored = ledger.store.len(), "Token admitted");
            }
            Admission::Rejected => {
                ledger.overflow[color] += 1;
                ledger.overflow_total += 1;
                debug!(%color, serial, %origin, "Token overflowed");
            }
        }
        Some(admission)
    }

    /// Removes the oldest stored token of `color` for delivery.
    pub fn take_for_output(&self, color: Color) -> Option<Parcel> {
        let mut ledger = self.ledger.lock();
        let generation = ledger.store.generation();
        ledger
            .store
            .dequeue_by_color(color)
            .map(|token| Parcel { token, generation })
    }

    /// Carries a taken token to its terminal and counts the delivery.
    pub async fn dispatch(
        &self,
        parcel: Parcel,
        transfer: &dyn Transfer,
        transit: &TransitConfig,
    ) -> OutputOutcome {
        let Parcel { token, generation } = parcel;
        let color = token.color();

        if let Err(fault) = transfer
            .transfer(
                &token,
                Endpoint::Buffer,
                Endpoint::Terminal(color),
                transit.outbound,
            )
            .await
        {
            warn!(%token, %fault, "Outbound transfer failed, token dropped");
            return OutputOutcome::Faulted;
        }

        let mut ledger = self.ledger.lock();
        if ledger.store.generation() != generation {
            debug!(%token, generation, "Buffer was cleared during delivery, discarding");
            return OutputOutcome::Discarded;
        }
        self.terminal(color).receive(token);
        ledger.sent += 1;
        OutputOutcome::Delivered
    }

    /// Outputs one token of `color`, if any is stored.
    pub async fn output(
        &self,
        color: Color,
        transfer: &dyn Transfer,
        transit: &TransitConfig,
    ) -> OutputOutcome {
        match self.take_for_output(color) {
            Some(parcel) => self.dispatch(parcel, transfer, transit).await,
            None => OutputOutcome::Empty,
        }
    }

    /// Clears the store and switches it to `mode`. Counters persist.
    pub fn switch_mode(&self, mode: BufferMode) {
        self.ledger.lock().store.switch_mode(mode);
        info!(%mode, "Buffer mode switched");
    }

    /// Changes capacity without evicting stored tokens.
    pub fn update_capacity(&self, capacity: usize) {
        self.ledger.lock().store.update_capacity(capacity);
        info!(capacity, "Buffer capacity updated");
    }

    /// Clears the store in its current mode, zeroes every counter and
    /// restores the capacity and schedules of `defaults`.
    pub fn reset(&self, defaults: &ExchangeConfig) {
        let mut ledger = self.ledger.lock();
        let mode = ledger.store.mode();
        ledger.store.switch_mode(mode);
        ledger.store.update_capacity(defaults.buffer.capacity);
        ledger.clear_counters();

        for terminal in &self.terminals {
            terminal.reset_counters();
            terminal.replace_schedule(defaults.terminals.schedule(terminal.color()));
        }
        info!(%mode, capacity = defaults.buffer.capacity, "Black box reset");
    }

    /// Consistent view of every counter and of the store.
    ///
    /// Taken under the store lock, so `received` always equals tokens
    /// admitted plus overflow, and `sent` always equals tokens delivered.
    pub fn snapshot(&self) -> ExchangeSnapshot {
        let ledger = self.ledger.lock();
        ExchangeSnapshot {
            mode: ledger.store.mode(),
            capacity: ledger.store.capacity(),
            generation: ledger.store.generation(),
            buffer: ledger.store.occupancy(),
            black_box: BlackBoxStats {
                received: ledger.received,
                sent: ledger.sent,
                overflow: ledger.overflow,
                overflow_total: ledger.overflow_total,
            },
            terminals: self.terminals.each_ref().map(Terminal::stats),
            in_flight: 0,
            running: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::EmitOutcome;
    use crate::transfer::{TimedTransfer, TransferFault};

    fn black_box(mode: BufferMode, capacity: usize) -> BlackBox {
        let mut config = ExchangeConfig::for_testing();
        config.buffer.mode = mode;
        config.buffer.capacity = capacity;
        BlackBox::new(&config)
    }

    fn offer(black_box: &BlackBox, color: Color, origin: Color) -> Option<Admission> {
        let token = Token::new(color, origin, black_box.next_serial());
        black_box.receive_from(origin, token, black_box.generation())
    }

    struct BrokenTransfer;

    #[async_trait]
    impl Transfer for BrokenTransfer {
        async fn transfer(
            &self,
            token: &Token,
            from: Endpoint,
            to: Endpoint,
            _duration: Duration,
        ) -> Result<(), TransferFault> {
            Err(TransferFault::Vanished {
                token: token.to_string(),
                from,
                to,
            })
        }
    }

    #[test]
    fn test_shared_overflow_accounting() {
        let black_box = black_box(BufferMode::Shared, 2);

        assert_eq!(offer(&black_box, Color::Red, Color::Blue), Some(Admission::Accepted));
        assert_eq!(offer(&black_box, Color::Blue, Color::Red), Some(Admission::Accepted));
        assert_eq!(offer(&black_box, Color::Yellow, Color::Red), Some(Admission::Rejected));

        let snapshot = black_box.snapshot();
        assert_eq!(snapshot.black_box.received, 3);
        assert_eq!(snapshot.black_box.overflow_total, 1);
        assert_eq!(snapshot.black_box.overflow[Color::Yellow], 1);
        assert_eq!(snapshot.terminal(Color::Red).sent[Color::Blue], 1);
        assert_eq!(snapshot.terminal(Color::Red).sent[Color::Yellow], 0);
        assert_eq!(snapshot.terminal(Color::Blue).sent[Color::Red], 1);
        assert!(snapshot.is_balanced());

        let parcel = black_box.take_for_output(Color::Red).unwrap();
        assert_eq!(parcel.token().color(), Color::Red);
        assert_eq!(black_box.snapshot().current_buffer_count(), 1);
    }

    #[test]
    fn test_separate_overflow_is_per_color() {
        let black_box = black_box(BufferMode::Separate, 1);

        assert_eq!(offer(&black_box, Color::Red, Color::Blue), Some(Admission::Accepted));
        assert_eq!(offer(&black_box, Color::Red, Color::Yellow), Some(Admission::Rejected));
        assert_eq!(offer(&black_box, Color::Blue, Color::Red), Some(Admission::Accepted));

        let snapshot = black_box.snapshot();
        assert_eq!(snapshot.black_box.overflow[Color::Red], 1);
        assert_eq!(snapshot.black_box.overflow_total, 1);
        assert_eq!(snapshot.buffer.to_string(), "2 (1-1-0)");
    }

    #[test]
    fn test_switch_mode_keeps_counters() {
        let black_box = black_box(BufferMode::Shared, 5);
        let _ = offer(&black_box, Color::Blue, Color::Red);
        let _ = offer(&black_box, Color::Yellow, Color::Red);

        black_box.switch_mode(BufferMode::Shared);

        let snapshot = black_box.snapshot();
        assert_eq!(snapshot.current_buffer_count(), 0);
        assert_eq!(snapshot.black_box.received, 2);
        assert_eq!(snapshot.terminal(Color::Red).sent.total(), 2);
        assert_eq!(snapshot.generation, 1);
    }

    #[test]
    fn test_stale_arrivals_are_discarded_uncounted() {
        let black_box = black_box(BufferMode::Shared, 5);
        let generation = black_box.generation();

        black_box.switch_mode(BufferMode::Separate);
        let token = Token::new(Color::Red, Color::Blue, 0);
        assert_eq!(black_box.receive_from(Color::Blue, token, generation), None);
        assert_eq!(black_box.snapshot().black_box.received, 0);
    }

    #[tokio::test]
    async fn test_output_delivers_and_counts() {
        let black_box = black_box(BufferMode::Shared, 5);
        let transit = TransitConfig::instant();
        let _ = offer(&black_box, Color::Yellow, Color::Blue);

        let outcome = black_box.output(Color::Yellow, &TimedTransfer, &transit).await;
        assert_eq!(outcome, OutputOutcome::Delivered);

        let outcome = black_box.output(Color::Yellow, &TimedTransfer, &transit).await;
        assert_eq!(outcome, OutputOutcome::Empty);

        let snapshot = black_box.snapshot();
        assert_eq!(snapshot.black_box.sent, 1);
        assert_eq!(snapshot.terminal(Color::Yellow).received, 1);
        assert!(snapshot.is_balanced());
    }

    #[tokio::test]
    async fn test_faulted_output_counts_nothing() {
        let black_box = black_box(BufferMode::Shared, 5);
        let _ = offer(&black_box, Color::Red, Color::Blue);

        let outcome = black_box
            .output(Color::Red, &BrokenTransfer, &TransitConfig::instant())
            .await;
        assert_eq!(outcome, OutputOutcome::Faulted);

        let snapshot = black_box.snapshot();
        assert_eq!(snapshot.black_box.sent, 0);
        assert_eq!(snapshot.terminal(Color::Red).received, 0);
        assert_eq!(snapshot.current_buffer_count(), 0);
    }

    #[tokio::test]
    async fn test_delivery_after_reset_is_discarded() {
        let black_box = black_box(BufferMode::Shared, 5);
        let _ = offer(&black_box, Color::Blue, Color::Red);
        let parcel = black_box.take_for_output(Color::Blue).unwrap();

        black_box.reset(&ExchangeConfig::for_testing());
        let outcome = black_box
            .dispatch(parcel, &TimedTransfer, &TransitConfig::instant())
            .await;
        assert_eq!(outcome, OutputOutcome::Discarded);
        assert_eq!(black_box.snapshot().black_box.sent, 0);
    }

    #[tokio::test]
    async fn test_emit_through_black_box() {
        let black_box = black_box(BufferMode::Separate, 10);
        let transit = TransitConfig::instant();

        let outcome = black_box
            .terminal(Color::Red)
            .emit(&black_box, &TimedTransfer, &transit)
            .await;
        let color = match outcome {
            EmitOutcome::Admitted(color) => color,
            other => panic!("unexpected outcome {other:?}"),
        };
        assert_ne!(color, Color::Red);

        let faulted = black_box
            .terminal(Color::Red)
            .emit(&black_box, &BrokenTransfer, &transit)
            .await;
        assert_eq!(faulted, EmitOutcome::Faulted);

        let snapshot = black_box.snapshot();
        assert_eq!(snapshot.black_box.received, 1);
        assert_eq!(snapshot.terminal(Color::Red).sent[color], 1);
        assert_eq!(snapshot.terminal(Color::Red).sent.total(), 1);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let black_box = black_box(BufferMode::Separate, 3);
        let _ = offer(&black_box, Color::Red, Color::Blue);
        black_box.update_capacity(1);
        black_box.terminal(Color::Blue).update_rate(4.0).unwrap();

        let defaults = ExchangeConfig::for_testing();
        black_box.reset(&defaults);

        let snapshot = black_box.snapshot();
        assert_eq!(snapshot.mode, BufferMode::Separate);
        assert_eq!(snapshot.capacity, 10);
        assert_eq!(snapshot.current_buffer_count(), 0);
        assert_eq!(snapshot.black_box, BlackBoxStats::default());
        assert_eq!(snapshot.terminal(Color::Blue).sent.total(), 0);
        assert_eq!(snapshot.terminal(Color::Blue).schedule.rate(), 1.0);
    }
}
