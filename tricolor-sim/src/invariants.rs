//! Invariant checking framework for exchange validation.

use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tricolor_core::{BufferOccupancy, Color, ExchangeSnapshot};

/// Violation of an exchange invariant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvariantViolation {
    /// Name of the violated invariant
    pub invariant: String,
    /// Detailed description of the violation
    pub description: String,
    /// When the violation was detected
    pub timestamp: DateTime<Utc>,
}

impl InvariantViolation {
    fn new(invariant: &dyn Invariant, description: String) -> Self {
        Self {
            invariant: invariant.name().to_string(),
            description,
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invariant '{}' violated at {}: {}",
            self.invariant,
            self.timestamp.format("%H:%M:%S%.3f"),
            self.description
        )
    }
}

/// Trait for checking exchange invariants against snapshots.
pub trait Invariant: Send + Sync {
    /// Checks if invariant holds for the snapshot.
    ///
    /// # Errors
    ///
    /// - `InvariantViolation` - The invariant condition is not met
    fn check(&self, snapshot: &ExchangeSnapshot) -> Result<(), InvariantViolation>;

    /// Returns name of this invariant.
    fn name(&self) -> &str;
}

/// Ensures stored tokens never exceed capacity.
///
/// Lowering capacity never evicts, so this only holds for runs that do not
/// lower capacity below the current occupancy.
pub struct CapacityInvariant;

impl Invariant for CapacityInvariant {
    fn check(&self, snapshot: &ExchangeSnapshot) -> Result<(), InvariantViolation> {
        let capacity = snapshot.capacity as u64;
        match snapshot.buffer {
            BufferOccupancy::Shared { total } if total as u64 > capacity => {
                Err(InvariantViolation::new(
                    self,
                    format!("Shared queue holds {total} tokens, capacity {capacity}"),
                ))
            }
            BufferOccupancy::Separate { by_color } => {
                match Color::ALL.into_iter().find(|&c| by_color[c] > capacity) {
                    Some(color) => Err(InvariantViolation::new(
                        self,
                        format!(
                            "{color} queue holds {} tokens, capacity {capacity}",
                            by_color[color]
                        ),
                    )),
                    None => Ok(()),
                }
            }
            BufferOccupancy::Shared { .. } => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "Capacity"
    }
}

/// Ensures every arrival ended as admitted or overflowed, and every output
/// as a delivery.
pub struct AccountingInvariant;

impl Invariant for AccountingInvariant {
    fn check(&self, snapshot: &ExchangeSnapshot) -> Result<(), InvariantViolation> {
        let stats = &snapshot.black_box;
        let admitted = snapshot.admitted_total();
        if stats.received != admitted + stats.overflow_total {
            return Err(InvariantViolation::new(
                self,
                format!(
                    "Received {} but admitted {admitted} plus overflow {}",
                    stats.received, stats.overflow_total
                ),
            ));
        }

        let delivered = snapshot.delivered_total();
        if stats.sent != delivered {
            return Err(InvariantViolation::new(
                self,
                format!("Sent {} but terminals received {delivered}", stats.sent),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Accounting"
    }
}

/// Ensures the overflow total matches the per-color overflow counts.
pub struct OverflowTotalInvariant;

impl Invariant for OverflowTotalInvariant {
    fn check(&self, snapshot: &ExchangeSnapshot) -> Result<(), InvariantViolation> {
        let stats = &snapshot.black_box;
        if stats.overflow_total != stats.overflow.total() {
            return Err(InvariantViolation::new(
                self,
                format!(
                    "Overflow total {} differs from per-color {}",
                    stats.overflow_total, stats.overflow
                ),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "OverflowTotal"
    }
}

/// Ensures no terminal is credited with tokens of its own color.
pub struct ForeignColorInvariant;

impl Invariant for ForeignColorInvariant {
    fn check(&self, snapshot: &ExchangeSnapshot) -> Result<(), InvariantViolation> {
        for terminal in &snapshot.terminals {
            let own = terminal.sent[terminal.color];
            if own != 0 {
                return Err(InvariantViolation::new(
                    self,
                    format!("{} terminal sent {own} tokens of its own color", terminal.color),
                ));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "ForeignColor"
    }
}

/// Ensures counters never decrease between consecutive checks.
///
/// Only meaningful for runs without a reset.
#[derive(Default)]
pub struct MonotonicCountersInvariant {
    previous: Mutex<Option<ExchangeSnapshot>>,
}

impl MonotonicCountersInvariant {
    /// Creates invariant with no prior observation.
    pub fn new() -> Self {
        Self::default()
    }
}

fn counters(snapshot: &ExchangeSnapshot) -> Vec<(String, u64)> {
    let stats = &snapshot.black_box;
    let mut counters = vec![
        ("black box received".to_string(), stats.received),
        ("black box sent".to_string(), stats.sent),
        ("overflow total".to_string(), stats.overflow_total),
    ];
    for color in Color::ALL {
        counters.push((format!("{color} overflow"), stats.overflow[color]));
    }
    for terminal in &snapshot.terminals {
        counters.push((format!("{} received", terminal.color), terminal.received));
        for color in Color::ALL {
            counters.push((
                format!("{} sent {color}", terminal.color),
                terminal.sent[color],
            ));
        }
    }
    counters
}

impl Invariant for MonotonicCountersInvariant {
    fn check(&self, snapshot: &ExchangeSnapshot) -> Result<(), InvariantViolation> {
        let mut previous = self.previous.lock();
        let decreased = previous.as_ref().and_then(|before| {
            counters(before)
                .into_iter()
                .zip(counters(snapshot))
                .find(|((_, old), (_, new))| new < old)
        });
        *previous = Some(snapshot.clone());

        match decreased {
            Some(((name, old), (_, new))) => Err(InvariantViolation::new(
                self,
                format!("Counter '{name}' went from {old} to {new}"),
            )),
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "MonotonicCounters"
    }
}

/// Standard invariant set checked during scenario runs.
pub fn default_invariants() -> Vec<Box<dyn Invariant>> {
    vec![
        Box::new(CapacityInvariant),
        Box::new(AccountingInvariant),
        Box::new(OverflowTotalInvariant),
        Box::new(ForeignColorInvariant),
        Box::new(MonotonicCountersInvariant::new()),
    ]
}

#[cfg(test)]
mod tests {
    use tricolor_core::{Admission, BlackBox, BufferMode, ExchangeConfig, Token};

    use super::*;

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

    fn check_all(snapshot: &ExchangeSnapshot) -> Vec<InvariantViolation> {
        default_invariants()
            .iter()
            .filter_map(|invariant| invariant.check(snapshot).err())
            .collect()
    }

    #[test]
    fn test_real_snapshots_pass() {
        let black_box = black_box(BufferMode::Shared, 2);
        for (color, origin) in [
            (Color::Red, Color::Blue),
            (Color::Blue, Color::Yellow),
            (Color::Yellow, Color::Red),
        ] {
            let _ = offer(&black_box, color, origin);
        }
        let _ = black_box.take_for_output(Color::Red);

        assert!(check_all(&black_box.snapshot()).is_empty());
    }

    #[test]
    fn test_capacity_violation_detected() {
        let black_box = black_box(BufferMode::Separate, 3);
        for _ in 0..3 {
            let _ = offer(&black_box, Color::Blue, Color::Red);
        }
        black_box.update_capacity(1);

        let violation = CapacityInvariant.check(&black_box.snapshot()).unwrap_err();
        assert_eq!(violation.invariant, "Capacity");
        assert!(violation.description.contains("blue"));
    }

    #[test]
    fn test_accounting_violation_detected() {
        let black_box = black_box(BufferMode::Shared, 5);
        let _ = offer(&black_box, Color::Red, Color::Yellow);

        let mut snapshot = black_box.snapshot();
        snapshot.black_box.received += 1;
        assert!(AccountingInvariant.check(&snapshot).is_err());

        let mut snapshot = black_box.snapshot();
        snapshot.black_box.overflow_total = 4;
        assert!(OverflowTotalInvariant.check(&snapshot).is_err());
    }

    #[test]
    fn test_foreign_color_violation_detected() {
        let black_box = black_box(BufferMode::Shared, 5);
        let mut snapshot = black_box.snapshot();
        snapshot.terminals[Color::Yellow.index()].sent[Color::Yellow] = 1;

        let violation = ForeignColorInvariant.check(&snapshot).unwrap_err();
        assert!(violation.to_string().contains("ForeignColor"));
    }

    #[test]
    fn test_counters_must_not_decrease() {
        let black_box = black_box(BufferMode::Shared, 5);
        let invariant = MonotonicCountersInvariant::new();

        let _ = offer(&black_box, Color::Blue, Color::Red);
        invariant.check(&black_box.snapshot()).unwrap();
        let _ = offer(&black_box, Color::Blue, Color::Red);
        invariant.check(&black_box.snapshot()).unwrap();

        black_box.reset(&ExchangeConfig::for_testing());
        let violation = invariant.check(&black_box.snapshot()).unwrap_err();
        assert!(violation.description.contains("black box received"));
    }
}
