//! Colors and the tokens that carry them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// One of the three terminal identities, and the color of the tokens that
/// terminal receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Blue,
    Yellow,
}

impl Color {
    /// All colors in display order.
    pub const ALL: [Color; 3] = [Color::Red, Color::Blue, Color::Yellow];

    /// Position of this color in per-color arrays.
    pub fn index(self) -> usize {
        match self {
            Color::Red => 0,
            Color::Blue => 1,
            Color::Yellow => 2,
        }
    }

    /// The two foreign colors a terminal of this color emits, as `(low, high)`.
    ///
    /// A draw below the terminal's ratio picks `low`, any other draw picks
    /// `high`. The pairing is fixed per terminal and deliberately not
    /// symmetric across terminals.
    pub fn emission_pair(self) -> (Color, Color) {
        match self {
            Color::Red => (Color::Yellow, Color::Blue),
            Color::Blue => (Color::Red, Color::Yellow),
            Color::Yellow => (Color::Red, Color::Blue),
        }
    }

    /// Lowercase name, as used on the command line and in environment keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Color::Red => "red",
            Color::Blue => "blue",
            Color::Yellow => "yellow",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Color {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "red" | "r" => Ok(Color::Red),
            "blue" | "b" => Ok(Color::Blue),
            "yellow" | "y" => Ok(Color::Yellow),
            _ => Err(ConfigError::UnknownColor {
                value: s.to_string(),
            }),
        }
    }
}

/// A single colored unit of transfer.
///
/// Tokens are deliberately neither `Clone` nor `Copy`: whoever holds one owns
/// it, and handing it to a queue or a terminal moves it.
#[derive(Debug, PartialEq, Eq)]
pub struct Token {
    color: Color,
    origin: Color,
    serial: u64,
}

impl Token {
    /// Creates a token of `color` emitted by the `origin` terminal.
    ///
    /// `serial` is only used to tell tokens apart in diagnostics.
    pub fn new(color: Color, origin: Color, serial: u64) -> Self {
        Self {
            color,
            origin,
            serial,
        }
    }

    pub fn color(&self) -> Color {
        self.color
    }

    /// Terminal that emitted this token.
    pub fn origin(&self) -> Color {
        self.origin
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.color, self.serial, self.origin)
    }
}
