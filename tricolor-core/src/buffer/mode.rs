//! Buffering mode of the black box.

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// How the black box lays out its storage.
///
/// Switching mode always wipes queued content; it never migrates tokens
/// between layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BufferMode {
    /// One queue holding tokens of any color, bounded by the capacity as a whole.
    #[default]
    Shared,
    /// One queue per color, each bounded by the capacity on its own.
    Separate,
}

impl BufferMode {
    /// Check if all colors share one queue.
    pub fn is_shared(self) -> bool {
        matches!(self, Self::Shared)
    }

    /// Check if every color has its own queue.
    pub fn is_separate(self) -> bool {
        matches!(self, Self::Separate)
    }
}

impl std::fmt::Display for BufferMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shared => write!(f, "shared"),
            Self::Separate => write!(f, "separate"),
        }
    }
}

impl std::str::FromStr for BufferMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "shared" | "common" => Ok(Self::Shared),
            "separate" | "independent" | "per-color" => Ok(Self::Separate),
            _ => Err(ConfigError::UnknownMode {
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_round_trips_through_text() {
        for mode in [BufferMode::Shared, BufferMode::Separate] {
            assert_eq!(mode.to_string().parse::<BufferMode>(), Ok(mode));
        }
        assert_eq!("per-color".parse::<BufferMode>(), Ok(BufferMode::Separate));
        assert!("both".parse::<BufferMode>().is_err());
    }

    #[test]
    fn test_default_mode_is_shared() {
        assert!(BufferMode::default().is_shared());
        assert!(!BufferMode::default().is_separate());
    }
}
