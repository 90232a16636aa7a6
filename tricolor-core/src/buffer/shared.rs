//! Single queue holding every color.

use std::collections::VecDeque;

use crate::counters::ColorCounts;
use crate::token::{Color, Token};

/// FIFO of tokens of any color, bounded as a whole.
#[derive(Debug, Default)]
pub struct SharedQueue {
    tokens: VecDeque<Token>,
}

impl SharedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether one more token of `_color` fits under `capacity`.
    ///
    /// Color does not matter here; every token competes for the same room.
    pub fn has_room(&self, _color: Color, capacity: usize) -> bool {
        self.tokens.len() < capacity
    }

    pub fn push(&mut self, token: Token) {
        self.tokens.push_back(token);
    }

    /// Removes the oldest token of `color`, keeping the relative order of
    /// everything left behind.
    pub fn take(&mut self, color: Color) -> Option<Token> {
        let index = self.tokens.iter().position(|t| t.color() == color)?;
        self.tokens.remove(index)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn counts(&self) -> ColorCounts {
        let mut counts = ColorCounts::default();
        for token in &self.tokens {
            counts[token.color()] += 1;
        }
        counts
    }

    /// Colors in queue order, oldest first.
    #[cfg(test)]
    fn colors(&self) -> Vec<Color> {
        self.tokens.iter().map(Token::color).collect()
    }
}
