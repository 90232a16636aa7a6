//! Read-only views of exchange state.

use std::fmt;

use serde::Serialize;

use crate::buffer::{BufferMode, BufferOccupancy};
use crate::counters::ColorCounts;
use crate::schedule::RateSchedule;
use crate::token::Color;

/// Counters owned by the black box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BlackBoxStats {
    /// Tokens that completed their inbound trip
    pub received: u64,
    /// Tokens delivered back to a terminal
    pub sent: u64,
    pub overflow: ColorCounts,
    pub overflow_total: u64,
}

/// Counters and schedule of one terminal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TerminalStats {
    pub color: Color,
    pub schedule: RateSchedule,
    /// Admitted tokens per color. The own color's slot is structurally zero:
    /// `Color::emission_pair` never yields the emitting terminal's color.
    pub sent: ColorCounts,
    pub received: u64,
}

/// Consistent picture of the whole exchange at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeSnapshot {
    pub mode: BufferMode,
    pub capacity: usize,
    pub generation: u64,
    pub buffer: BufferOccupancy,
    pub black_box: BlackBoxStats,
    /// Indexed by [`Color::index`]
    pub terminals: [TerminalStats; 3],
    pub in_flight: usize,
    pub running: bool,
}

impl ExchangeSnapshot {
    pub fn terminal(&self, color: Color) -> &TerminalStats {
        &self.terminals[color.index()]
    }

    pub fn current_buffer_count(&self) -> usize {
        self.buffer.total()
    }

    /// Tokens admitted into the buffer since the last reset.
    pub fn admitted_total(&self) -> u64 {
        self.terminals.iter().map(|t| t.sent.total()).sum()
    }

    /// Tokens received by terminals since the last reset.
    pub fn delivered_total(&self) -> u64 {
        self.terminals.iter().map(|t| t.received).sum()
    }

    /// Whether every arrival is accounted for as admitted or overflowed, and
    /// every output as delivered.
    pub fn is_balanced(&self) -> bool {
        self.black_box.received == self.admitted_total() + self.black_box.overflow_total
            && self.black_box.sent == self.delivered_total()
    }
}

/// One-line status in the form
/// `shared cap 10 | buffer 3 | in 12 out 7 overflow 2 (0-1-1) | red 0-2-3/4 ...`
/// where each terminal shows sent per color (red-blue-yellow) and received.
impl fmt::Display for ExchangeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cap {} | buffer {} | in {} out {} overflow {} ({})",
            self.mode,
            self.capacity,
            self.buffer,
            self.black_box.received,
            self.black_box.sent,
            self.black_box.overflow_total,
            self.black_box.overflow,
        )?;
        for terminal in &self.terminals {
            write!(
                f,
                " | {} {}/{}",
                terminal.color, terminal.sent, terminal.received
            )?;
        }
        if self.in_flight > 0 {
            write!(f, " | {} in flight", self.in_flight)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terminal(color: Color, sent: ColorCounts, received: u64) -> TerminalStats {
        TerminalStats {
            color,
            schedule: RateSchedule::default(),
            sent,
            received,
        }
    }

    fn snapshot() -> ExchangeSnapshot {
        ExchangeSnapshot {
            mode: BufferMode::Separate,
            capacity: 4,
            generation: 0,
            buffer: BufferOccupancy::Separate {
                by_color: ColorCounts {
                    red: 1,
                    blue: 0,
                    yellow: 1,
                },
            },
            black_box: BlackBoxStats {
                received: 5,
                sent: 1,
                overflow: ColorCounts {
                    red: 0,
                    blue: 1,
                    yellow: 0,
                },
                overflow_total: 1,
            },
            terminals: [
                terminal(Color::Red, ColorCounts { red: 0, blue: 1, yellow: 1 }, 0),
                terminal(Color::Blue, ColorCounts { red: 1, blue: 0, yellow: 0 }, 1),
                terminal(Color::Yellow, ColorCounts { red: 1, blue: 0, yellow: 0 }, 0),
            ],
            in_flight: 2,
            running: true,
        }
    }

    #[test]
    fn test_balance_holds_for_consistent_counts() {
        let snapshot = snapshot();
        assert_eq!(snapshot.admitted_total(), 4);
        assert_eq!(snapshot.delivered_total(), 1);
        assert!(snapshot.is_balanced());

        let mut broken = snapshot;
        broken.black_box.sent = 2;
        assert!(!broken.is_balanced());
    }

    #[test]
    fn test_status_line() {
        assert_eq!(
            snapshot().to_string(),
            "separate cap 4 | buffer 2 (1-0-1) | in 5 out 1 overflow 1 (0-1-0) \
             | red 0-1-1/0 | blue 1-0-0/1 | yellow 1-0-0/0 | 2 in flight"
        );
    }

    #[test]
    fn test_snapshot_serializes_to_json() {
        let json = serde_json::to_value(snapshot()).unwrap();
        assert_eq!(json["mode"], "separate");
        assert_eq!(json["buffer"]["mode"], "separate");
        assert_eq!(json["buffer"]["by_color"]["yellow"], 1);
        assert_eq!(json["terminals"][1]["color"], "blue");
        assert_eq!(json["black_box"]["overflow_total"], 1);
    }
}
