//! Per-color counters.

use std::fmt;
use std::ops::{Index, IndexMut};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::token::Color;

/// Plain per-color counts, as read out of a [`ColorTally`] or a buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ColorCounts {
    pub red: u64,
    pub blue: u64,
    pub yellow: u64,
}

impl ColorCounts {
    pub fn total(&self) -> u64 {
        self.red + self.blue + self.yellow
    }
}

impl Index<Color> for ColorCounts {
    type Output = u64;

    fn index(&self, color: Color) -> &u64 {
        match color {
            Color::Red => &self.red,
            Color::Blue => &self.blue,
            Color::Yellow => &self.yellow,
        }
    }
}

impl IndexMut<Color> for ColorCounts {
    fn index_mut(&mut self, color: Color) -> &mut u64 {
        match color {
            Color::Red => &mut self.red,
            Color::Blue => &mut self.blue,
            Color::Yellow => &mut self.yellow,
        }
    }
}

/// Renders as `red-blue-yellow`, e.g. `1-0-3`.
impl fmt::Display for ColorCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.red, self.blue, self.yellow)
    }
}

/// Lock-free per-color counter.
#[derive(Debug, Default)]
pub(crate) struct ColorTally {
    slots: [AtomicU64; 3],
}

impl ColorTally {
    pub(crate) fn increment(&self, color: Color) {
        self.slots[color.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn load(&self) -> ColorCounts {
        let mut counts = ColorCounts::default();
        for color in Color::ALL {
            counts[color] = self.slots[color.index()].load(Ordering::Relaxed);
        }
        counts
    }

    pub(crate) fn clear(&self) {
        for slot in &self.slots {
            slot.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_counts_per_color() {
        let tally = ColorTally::default();
        tally.increment(Color::Blue);
        tally.increment(Color::Blue);
        tally.increment(Color::Yellow);

        let counts = tally.load();
        assert_eq!(counts[Color::Red], 0);
        assert_eq!(counts[Color::Blue], 2);
        assert_eq!(counts[Color::Yellow], 1);
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.to_string(), "0-2-1");

        tally.clear();
        assert_eq!(tally.load(), ColorCounts::default());
    }
}
