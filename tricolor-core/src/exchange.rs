//! Driver running the exchange on the tokio runtime.
//!
//! While running, [`Exchange`] keeps six periodic tasks alive: one emission
//! loop and one output loop per color, both paced by that color's terminal
//! schedule. Each tick hands its transfer to a separately spawned task, so a
//! slow trip never delays the next tick. Stopping cancels the loops; trips
//! already under way still complete.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use rand::RngCore;
use tokio::runtime::Handle;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::black_box::BlackBox;
use crate::buffer::BufferMode;
use crate::config::{ExchangeConfig, TransitConfig};
use crate::schedule::RateSchedule;
use crate::snapshot::ExchangeSnapshot;
use crate::token::Color;
use crate::transfer::{TimedTransfer, Transfer};
use crate::{ExchangeError, Result};

/// Number of transfers currently under way.
#[derive(Debug, Default)]
pub struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Registers one transfer; it counts until the guard drops.
    pub fn enter(self: &Arc<Self>) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            in_flight: Arc::clone(self),
        }
    }

    /// Waits until no transfer is under way.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Keeps one transfer registered in an [`InFlight`] gauge.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.in_flight.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.in_flight.idle.notify_waiters();
        }
    }
}

struct Run {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

/// Builder for exchanges with custom transfer or random sources.
pub struct ExchangeBuilder {
    config: ExchangeConfig,
    transfer: Arc<dyn Transfer>,
    rngs: Option<Box<dyn FnMut(Color) -> Box<dyn RngCore + Send>>>,
}

impl ExchangeBuilder {
    pub fn new(config: ExchangeConfig) -> Self {
        Self {
            config,
            transfer: Arc::new(TimedTransfer),
            rngs: None,
        }
    }

    /// Carries tokens through `transfer` instead of plain timed trips.
    pub fn transfer(mut self, transfer: Arc<dyn Transfer>) -> Self {
        self.transfer = transfer;
        self
    }

    /// Draws each terminal's colors from the generator `rng_for` returns.
    pub fn terminal_rngs(
        mut self,
        rng_for: impl FnMut(Color) -> Box<dyn RngCore + Send> + 'static,
    ) -> Self {
        self.rngs = Some(Box::new(rng_for));
        self
    }

    /// Builds the exchange.
    ///
    /// # Errors
    ///
    /// - `ExchangeError::Configuration` - The configuration does not validate
    pub fn build(self) -> Result<Exchange> {
        self.config.validate()?;

        let black_box = match self.rngs {
            Some(rng_for) => BlackBox::with_rngs(&self.config, rng_for),
            None => BlackBox::new(&self.config),
        };

        Ok(Exchange {
            black_box: Arc::new(black_box),
            transfer: self.transfer,
            config: self.config,
            in_flight: Arc::new(InFlight::default()),
            run: Mutex::new(None),
        })
    }
}

/// Three terminals and a black box, driven by periodic tasks.
pub struct Exchange {
    black_box: Arc<BlackBox>,
    transfer: Arc<dyn Transfer>,
    config: ExchangeConfig,
    in_flight: Arc<InFlight>,
    run: Mutex<Option<Run>>,
}

impl std::fmt::Debug for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("black_box", &self.black_box)
            .field("config", &self.config)
            .field("in_flight", &self.in_flight.count())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Exchange {
    /// Creates an exchange with timed transfers.
    ///
    /// # Errors
    ///
    /// - `ExchangeError::Configuration` - The configuration does not validate
    pub fn new(config: ExchangeConfig) -> Result<Self> {
        ExchangeBuilder::new(config).build()
    }

    pub fn builder(config: ExchangeConfig) -> ExchangeBuilder {
        ExchangeBuilder::new(config)
    }

    pub fn black_box(&self) -> &Arc<BlackBox> {
        &self.black_box
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.count()
    }

    pub fn is_running(&self) -> bool {
        self.run.lock().is_some()
    }

    /// Spawns the emission and output loops.
    ///
    /// Returns `false` when the exchange was already running.
    ///
    /// # Errors
    ///
    /// - `ExchangeError::Runtime` - Called outside a tokio runtime
    pub fn start(&self) -> Result<bool> {
        let runtime = Handle::try_current().map_err(|e| ExchangeError::Runtime {
            reason: e.to_string(),
        })?;

        let mut run = self.run.lock();
        if run.is_some() {
            debug!("Exchange already running");
            return Ok(false);
        }

        let (shutdown, _) = watch::channel(false);
        let mut tasks = Vec::with_capacity(Color::ALL.len() * 2);
        for color in Color::ALL {
            let schedule = self.black_box.terminal(color).subscribe_schedule();
            tasks.push(runtime.spawn(tick_loop(
                schedule.clone(),
                shutdown.subscribe(),
                self.emission_tick(color),
            )));
            tasks.push(runtime.spawn(tick_loop(
                schedule,
                shutdown.subscribe(),
                self.output_tick(color),
            )));
        }

        *run = Some(Run { shutdown, tasks });
        info!(
            mode = %self.black_box.mode(),
            capacity = self.black_box.capacity(),
            "Exchange started"
        );
        Ok(true)
    }

    fn emission_tick(&self, color: Color) -> impl FnMut() + Send + 'static {
        let black_box = Arc::clone(&self.black_box);
        let transfer = Arc::clone(&self.transfer);
        let in_flight = Arc::clone(&self.in_flight);
        let transit = self.config.transit;

        move || {
            let guard = in_flight.enter();
            let black_box = Arc::clone(&black_box);
            let transfer = Arc::clone(&transfer);
            tokio::spawn(async move {
                let outcome = black_box
                    .terminal(color)
                    .emit(&black_box, transfer.as_ref(), &transit)
                    .await;
                debug!(terminal = %color, ?outcome, "Emission finished");
                drop(guard);
            });
        }
    }

    fn output_tick(&self, color: Color) -> impl FnMut() + Send + 'static {
        let black_box = Arc::clone(&self.black_box);
        let transfer = Arc::clone(&self.transfer);
        let in_flight = Arc::clone(&self.in_flight);
        let transit: TransitConfig = self.config.transit;

        move || {
            let Some(parcel) = black_box.take_for_output(color) else {
                return;
            };
            let guard = in_flight.enter();
            let black_box = Arc::clone(&black_box);
            let transfer = Arc::clone(&transfer);
            tokio::spawn(async move {
                let outcome = black_box
                    .dispatch(parcel, transfer.as_ref(), &transit)
                    .await;
                debug!(%color, ?outcome, "Output finished");
                drop(guard);
            });
        }
    }

    /// Cancels the periodic loops and waits for them to exit.
    ///
    /// Transfers already under way keep running; see [`Exchange::drain`].
    /// Returns `false` when the exchange was not running.
    pub async fn stop(&self) -> bool {
        let run = self.run.lock().take();
        let Some(run) = run else {
            return false;
        };

        run.shutdown.send_replace(true);
        for task in run.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Exchange loop ended abnormally");
            }
        }
        info!(in_flight = self.in_flight.count(), "Exchange stopped");
        true
    }

    /// Stops the loops, wipes the buffer, zeroes every counter and restores
    /// the configured capacity and schedules.
    ///
    /// Transfers still under way are discarded when they arrive.
    pub async fn reset(&self) {
        self.stop().await;
        self.black_box.reset(&self.config);
    }

    /// Waits until no transfer is under way.
    pub async fn drain(&self) {
        self.in_flight.wait_idle().await;
    }

    /// # Errors
    ///
    /// - `ExchangeError::Configuration` - Rate is negative, not finite or too high
    pub fn update_rate(&self, color: Color, rate: f64) -> Result<()> {
        self.black_box.terminal(color).update_rate(rate)?;
        info!(terminal = %color, rate, "Rate updated");
        Ok(())
    }

    /// # Errors
    ///
    /// - `ExchangeError::Configuration` - Ratio lies outside `0..=1`
    pub fn update_ratio(&self, color: Color, ratio: f64) -> Result<()> {
        self.black_box.terminal(color).update_ratio(ratio)?;
        info!(terminal = %color, ratio, "Ratio updated");
        Ok(())
    }

    pub fn schedule(&self, color: Color) -> RateSchedule {
        self.black_box.terminal(color).schedule()
    }

    /// Clears the buffer and switches its layout. Counters persist.
    pub fn switch_mode(&self, mode: BufferMode) {
        self.black_box.switch_mode(mode);
    }

    pub fn update_capacity(&self, capacity: usize) {
        self.black_box.update_capacity(capacity);
    }

    pub fn snapshot(&self) -> ExchangeSnapshot {
        ExchangeSnapshot {
            in_flight: self.in_flight.count(),
            running: self.is_running(),
            ..self.black_box.snapshot()
        }
    }
}

/// Calls `on_tick` once per schedule interval until shutdown.
///
/// The schedule is re-read before every wait; a change restarts the wait
/// with the new interval. An idle schedule parks the loop until the rate
/// changes or shutdown is signalled.
async fn tick_loop(
    mut schedule: watch::Receiver<RateSchedule>,
    mut shutdown: watch::Receiver<bool>,
    mut on_tick: impl FnMut() + Send,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let interval = schedule.borrow_and_update().interval();
        match interval {
            Some(interval) => {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    changed = schedule.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    () = tokio::time::sleep(interval) => on_tick(),
                }
            }
            None => {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    changed = schedule.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn exchange(config: ExchangeConfig) -> Exchange {
        Exchange::new(config).unwrap()
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let exchange = exchange(ExchangeConfig::for_testing());
        assert!(matches!(
            exchange.start(),
            Err(ExchangeError::Runtime { .. })
        ));
        assert!(!exchange.is_running());
    }

    #[test]
    fn test_invalid_config_is_refused() {
        let mut config = ExchangeConfig::for_testing();
        config.simulation.fault_rate = 2.0;
        assert!(matches!(
            Exchange::new(config),
            Err(ExchangeError::Configuration(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_lifecycle() {
        let exchange = exchange(ExchangeConfig::for_testing());

        assert!(exchange.start().unwrap());
        assert!(!exchange.start().unwrap());
        assert!(exchange.snapshot().running);

        tokio::time::sleep(Duration::from_millis(3500)).await;

        assert!(exchange.stop().await);
        assert!(!exchange.stop().await);
        exchange.drain().await;

        let snapshot = exchange.snapshot();
        assert!(!snapshot.running);
        assert_eq!(snapshot.in_flight, 0);
        assert!(snapshot.black_box.received > 0);
        assert!(snapshot.is_balanced());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_terminal_sends_nothing() {
        let mut config = ExchangeConfig::for_testing();
        config.terminals.blue = RateSchedule::new(0.0, 0.5).unwrap();
        let exchange = exchange(config);

        exchange.start().unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        exchange.stop().await;
        exchange.drain().await;

        let snapshot = exchange.snapshot();
        assert_eq!(snapshot.terminal(Color::Blue).sent.total(), 0);
        assert_eq!(snapshot.terminal(Color::Blue).received, 0);
        assert!(snapshot.terminal(Color::Red).sent.total() > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parked_loop_resumes_on_rate_change() {
        let mut config = ExchangeConfig::for_testing();
        config.terminals = crate::TerminalConfig::uniform(RateSchedule::new(0.0, 0.5).unwrap());
        let exchange = exchange(config);

        exchange.start().unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(exchange.snapshot().black_box.received, 0);

        exchange.update_rate(Color::Yellow, 2.0).unwrap();
        tokio::time::sleep(Duration::from_millis(2100)).await;
        exchange.stop().await;
        exchange.drain().await;

        let snapshot = exchange.snapshot();
        assert!(snapshot.terminal(Color::Yellow).sent.total() >= 3);
        assert_eq!(snapshot.terminal(Color::Red).sent.total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_trips_complete_after_stop() {
        let mut config = ExchangeConfig::default();
        config.simulation.deterministic_seed = Some(7);
        let exchange = exchange(config);

        exchange.start().unwrap();
        // First emissions tick at 1s and are still travelling at 1.5s.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        exchange.stop().await;
        assert_eq!(exchange.in_flight(), 3);
        assert_eq!(exchange.snapshot().black_box.received, 0);

        exchange.drain().await;
        let snapshot = exchange.snapshot();
        assert_eq!(snapshot.black_box.received, 3);
        assert_eq!(snapshot.in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_discards_in_flight_and_restores_defaults() {
        let mut config = ExchangeConfig::default();
        config.simulation.deterministic_seed = Some(7);
        let exchange = exchange(config);

        exchange.update_capacity(3);
        exchange.update_rate(Color::Red, 5.0).unwrap();
        exchange.start().unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        exchange.reset().await;
        exchange.drain().await;

        let snapshot = exchange.snapshot();
        assert_eq!(snapshot.black_box.received, 0);
        assert_eq!(snapshot.capacity, 10);
        assert_eq!(snapshot.terminal(Color::Red).schedule, RateSchedule::default());
        assert_eq!(snapshot.current_buffer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_validation() {
        let exchange = exchange(ExchangeConfig::for_testing());

        assert!(exchange.update_rate(Color::Red, -0.5).is_err());
        assert!(exchange.update_rate(Color::Red, f64::INFINITY).is_err());
        assert!(exchange.update_ratio(Color::Blue, 1.5).is_err());
        assert_eq!(exchange.schedule(Color::Red), RateSchedule::default());

        exchange.update_ratio(Color::Blue, 0.25).unwrap();
        assert_eq!(exchange.schedule(Color::Blue).ratio(), 0.25);
    }

    #[tokio::test]
    async fn test_in_flight_gauge() {
        let in_flight = Arc::new(InFlight::default());
        let first = in_flight.enter();
        let second = in_flight.enter();
        assert_eq!(in_flight.count(), 2);

        let waiter = {
            let in_flight = Arc::clone(&in_flight);
            tokio::spawn(async move { in_flight.wait_idle().await })
        };

        drop(first);
        assert_eq!(in_flight.count(), 1);
        drop(second);
        waiter.await.unwrap();
        assert_eq!(in_flight.count(), 0);
    }
}
