//! Capacity-bounded token storage inside the black box.
//!
//! [`BufferStore`] holds either a [`SharedQueue`] or [`SeparateQueues`],
//! depending on the current [`BufferMode`]. Every mutation takes `&mut self`;
//! the black box keeps the store behind a single mutex, so check-then-insert
//! and scan-then-remove are never observed half done.
//!
//! Capacity is enforced lazily: lowering it never evicts tokens, it only
//! makes later enqueues fail until the queues drain below the new value.

mod mode;
mod separate;
mod shared;

use std::fmt;

use serde::Serialize;
use tracing::debug;

pub use mode::BufferMode;
pub use separate::SeparateQueues;
pub use shared::SharedQueue;

use crate::counters::ColorCounts;
use crate::token::{Color, Token};

/// Default number of tokens a queue may hold.
pub const DEFAULT_CAPACITY: usize = 10;

/// Outcome of offering a token to the store.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The token now belongs to the store.
    Accepted,
    /// The relevant queue was full; the token was destroyed.
    Rejected,
}

impl Admission {
    pub fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Number of tokens currently stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum BufferOccupancy {
    Shared { total: usize },
    Separate { by_color: ColorCounts },
}

impl BufferOccupancy {
    pub fn total(&self) -> usize {
        match self {
            Self::Shared { total } => *total,
            Self::Separate { by_color } => by_color.total() as usize,
        }
    }
}

/// `3` in shared mode, `3 (1-0-2)` (red-blue-yellow) in separate mode.
impl fmt::Display for BufferOccupancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared { total } => write!(f, "{total}"),
            Self::Separate { by_color } => write!(f, "{} ({by_color})", by_color.total()),
        }
    }
}

#[derive(Debug)]
enum Queues {
    Shared(SharedQueue),
    Separate(SeparateQueues),
}

impl Queues {
    fn empty(mode: BufferMode) -> Self {
        match mode {
            BufferMode::Shared => Self::Shared(SharedQueue::new()),
            BufferMode::Separate => Self::Separate(SeparateQueues::new()),
        }
    }
}

/// Token storage of a black box.
#[derive(Debug)]
pub struct BufferStore {
    queues: Queues,
    capacity: usize,
    generation: u64,
}

impl Default for BufferStore {
    fn default() -> Self {
        Self::new(BufferMode::default(), DEFAULT_CAPACITY)
    }
}

impl BufferStore {
    pub fn new(mode: BufferMode, capacity: usize) -> Self {
        Self {
            queues: Queues::empty(mode),
            capacity,
            generation: 0,
        }
    }

    pub fn mode(&self) -> BufferMode {
        match self.queues {
            Queues::Shared(_) => BufferMode::Shared,
            Queues::Separate(_) => BufferMode::Separate,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Counter bumped every time the store is wiped.
    ///
    /// Tokens that left a terminal before a wipe carry an older generation
    /// and must not be admitted after it.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Admits `token` if its queue is below capacity, destroying it otherwise.
    pub fn enqueue(&mut self, token: Token) -> Admission {
        let color = token.color();
        let capacity = self.capacity;
        let has_room = match &self.queues {
            Queues::Shared(queue) => queue.has_room(color, capacity),
            Queues::Separate(queues) => queues.has_room(color, capacity),
        };

        if !has_room {
            debug!(%token, capacity, "Buffer full, rejecting token");
            return Admission::Rejected;
        }

        match &mut self.queues {
            Queues::Shared(queue) => queue.push(token),
            Queues::Separate(queues) => queues.push(token),
        }
        Admission::Accepted
    }

    /// Removes the oldest stored token of `color`, if any.
    pub fn dequeue_by_color(&mut self, color: Color) -> Option<Token> {
        match &mut self.queues {
            Queues::Shared(queue) => queue.take(color),
            Queues::Separate(queues) => queues.take(color),
        }
    }

    /// Discards every stored token and switches to `mode`.
    ///
    /// Switching to the mode already in effect still wipes the content.
    pub fn switch_mode(&mut self, mode: BufferMode) {
        let discarded = self.len();
        self.queues = Queues::empty(mode);
        self.generation += 1;
        debug!(
            %mode,
            discarded,
            generation = self.generation,
            "Buffer cleared"
        );
    }

    /// Changes the capacity without touching stored tokens.
    pub fn update_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    pub fn len(&self) -> usize {
        match &self.queues {
            Queues::Shared(queue) => queue.len(),
            Queues::Separate(queues) => queues.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.queues {
            Queues::Shared(queue) => queue.is_empty(),
            Queues::Separate(queues) => queues.is_empty(),
        }
    }

    pub fn occupancy(&self) -> BufferOccupancy {
        match &self.queues {
            Queues::Shared(queue) => BufferOccupancy::Shared { total: queue.len() },
            Queues::Separate(queues) => BufferOccupancy::Separate {
                by_color: queues.counts(),
            },
        }
    }

    /// Stored tokens per color, regardless of mode.
    pub fn counts(&self) -> ColorCounts {
        match &self.queues {
            Queues::Shared(queue) => queue.counts(),
            Queues::Separate(queues) => queues.counts(),
        }
    }
}
