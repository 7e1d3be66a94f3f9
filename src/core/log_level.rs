//! Log level definitions
//!
//! Levels are plain integers: lower is more verbose. The named constants
//! leave room for custom levels in between (e.g. `Level::new(3500)`).

use super::error::LoggerError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Level(i32);

impl Level {
    pub const ALL: Level = Level(i32::MIN);
    pub const TRACE: Level = Level(1000);
    pub const DEBUG: Level = Level(2000);
    pub const INFO: Level = Level(3000);
    pub const WARN: Level = Level(4000);
    pub const ERROR: Level = Level(5000);
    pub const FATAL: Level = Level(6000);
    pub const OFF: Level = Level(i32::MAX);

    #[must_use]
    pub const fn new(value: i32) -> Self {
        Level(value)
    }

    #[must_use]
    pub const fn value(self) -> i32 {
        self.0
    }

    /// Lower-case bucket name; levels between the named constants round up.
    pub fn to_str(&self) -> &'static str {
        match self.0 {
            i32::MIN..=1000 => "trace",
            1001..=2000 => "debug",
            2001..=3000 => "info",
            3001..=4000 => "warn",
            4001..=5000 => "error",
            _ => "fatal",
        }
    }

    pub fn color_code(&self) -> colored::Color {
        use colored::Color::*;
        match self.0 {
            i32::MIN..=1000 => BrightBlack,
            1001..=2000 => Blue,
            2001..=3000 => Green,
            3001..=4000 => Yellow,
            4001..=5000 => Red,
            _ => BrightRed,
        }
    }
}

impl Default for Level {
    fn default() -> Self {
        Level::DEBUG
    }
}

impl From<i32> for Level {
    fn from(value: i32) -> Self {
        Level(value)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Level::ALL => write!(f, "ALL"),
            Level::TRACE => write!(f, "TRACE"),
            Level::DEBUG => write!(f, "DEBUG"),
            Level::INFO => write!(f, "INFO"),
            Level::WARN => write!(f, "WARN"),
            Level::ERROR => write!(f, "ERROR"),
            Level::FATAL => write!(f, "FATAL"),
            Level::OFF => write!(f, "OFF"),
            Level(other) => write!(f, "{}", other),
        }
    }
}

impl FromStr for Level {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_uppercase().as_str() {
            "ALL" => Ok(Level::ALL),
            "TRACE" => Ok(Level::TRACE),
            "DEBUG" => Ok(Level::DEBUG),
            "INFO" => Ok(Level::INFO),
            "WARN" | "WARNING" => Ok(Level::WARN),
            "ERROR" => Ok(Level::ERROR),
            "FATAL" => Ok(Level::FATAL),
            "OFF" => Ok(Level::OFF),
            _ => trimmed
                .parse::<i32>()
                .map(Level)
                .map_err(|_| LoggerError::InvalidLevel(s.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(i32),
            Name(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(Level(value)),
            Repr::Name(name) => name.parse().map_err(serde::de::Error::custom),
        }
    }
}
