//! One queue per color.

use std::collections::VecDeque;

use crate::counters::ColorCounts;
use crate::token::{Color, Token};

/// Three independent FIFOs, each bounded by the capacity on its own.
#[derive(Debug, Default)]
pub struct SeparateQueues {
    queues: [VecDeque<Token>; 3],
}

impl SeparateQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_room(&self, color: Color, capacity: usize) -> bool {
        self.queues[color.index()].len() < capacity
    }

    /// Appends to the queue of the token's own color.
    pub fn push(&mut self, token: Token) {
        self.queues[token.color().index()].push_back(token);
    }

    pub fn take(&mut self, color: Color) -> Option<Token> {
        self.queues[color.index()].pop_front()
    }

    pub fn len(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(VecDeque::is_empty)
    }

    pub fn len_of(&self, color: Color) -> usize {
        self.queues[color.index()].len()
    }

    pub fn counts(&self) -> ColorCounts {
        let mut counts = ColorCounts::default();
        for color in Color::ALL {
            counts[color] = self.len_of(color) as u64;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queues_are_independent() {
        let mut queues = SeparateQueues::new();
        queues.push(Token::new(Color::Red, Color::Blue, 0));
        queues.push(Token::new(Color::Red, Color::Yellow, 1));

        assert!(!queues.has_room(Color::Red, 2));
        assert!(queues.has_room(Color::Blue, 2));
        assert_eq!(queues.len(), 2);
        assert_eq!(queues.counts().to_string(), "2-0-0");
    }

    #[test]
    fn test_take_is_fifo_per_color() {
        let mut queues = SeparateQueues::new();
        queues.push(Token::new(Color::Yellow, Color::Red, 0));
        queues.push(Token::new(Color::Blue, Color::Red, 1));
        queues.push(Token::new(Color::Yellow, Color::Blue, 2));

        assert_eq!(queues.take(Color::Yellow).map(|t| t.serial()), Some(0));
        assert_eq!(queues.take(Color::Yellow).map(|t| t.serial()), Some(2));
        assert!(queues.take(Color::Yellow).is_none());
        assert_eq!(queues.len_of(Color::Blue), 1);
    }
}
