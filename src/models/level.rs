use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Upstream price level classification, ordered from cheapest to most expensive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceLevel {
    VeryCheap,
    Cheap,
    Normal,
    Expensive,
    VeryExpensive,
}

impl PriceLevel {
    pub const ALL: [PriceLevel; 5] = [
        PriceLevel::VeryCheap,
        PriceLevel::Cheap,
        PriceLevel::Normal,
        PriceLevel::Expensive,
        PriceLevel::VeryExpensive,
    ];

    /// Signed ordinal, `Normal` is zero.
    pub fn ordinal(self) -> i8 {
        match self {
            PriceLevel::VeryCheap => -2,
            PriceLevel::Cheap => -1,
            PriceLevel::Normal => 0,
            PriceLevel::Expensive => 1,
            PriceLevel::VeryExpensive => 2,
        }
    }

    pub fn from_ordinal(ordinal: i8) -> Option<PriceLevel> {
        Self::ALL.iter().copied().find(|l| l.ordinal() == ordinal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriceLevel::VeryCheap => "very_cheap",
            PriceLevel::Cheap => "cheap",
            PriceLevel::Normal => "normal",
            PriceLevel::Expensive => "expensive",
            PriceLevel::VeryExpensive => "very_expensive",
        }
    }
}

impl fmt::Display for PriceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PriceLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "very_cheap" => Ok(PriceLevel::VeryCheap),
            "cheap" => Ok(PriceLevel::Cheap),
            "normal" => Ok(PriceLevel::Normal),
            "expensive" => Ok(PriceLevel::Expensive),
            "very_expensive" => Ok(PriceLevel::VeryExpensive),
            _ => Err(ConfigError::UnknownLevel(s.to_string())),
        }
    }
}

/// Upstream rating relative to the trailing average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceRating {
    Low,
    Normal,
    High,
}

impl PriceRating {
    pub fn ordinal(self) -> i8 {
        match self {
            PriceRating::Low => -1,
            PriceRating::Normal => 0,
            PriceRating::High => 1,
        }
    }

    pub fn from_ordinal(ordinal: i8) -> Option<PriceRating> {
        match ordinal {
            -1 => Some(PriceRating::Low),
            0 => Some(PriceRating::Normal),
            1 => Some(PriceRating::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriceRating::Low => "low",
            PriceRating::Normal => "normal",
            PriceRating::High => "high",
        }
    }
}

impl fmt::Display for PriceRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PriceRating {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(PriceRating::Low),
            "normal" => Ok(PriceRating::Normal),
            "high" => Ok(PriceRating::High),
            _ => Err(ConfigError::UnknownLevel(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityLevel {
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl fmt::Display for VolatilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolatilityLevel::Low => write!(f, "low"),
            VolatilityLevel::Moderate => write!(f, "moderate"),
            VolatilityLevel::High => write!(f, "high"),
            VolatilityLevel::VeryHigh => write!(f, "very_high"),
        }
    }
}

/// Level threshold applied during qualification. `Any` disables the check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelFilter {
    Any,
    Level(PriceLevel),
}

impl Default for LevelFilter {
    fn default() -> Self {
        LevelFilter::Any
    }
}

impl fmt::Display for LevelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelFilter::Any => write!(f, "any"),
            LevelFilter::Level(level) => write!(f, "{}", level),
        }
    }
}

impl FromStr for LevelFilter {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "any" | "disabled" | "off" => Ok(LevelFilter::Any),
            other => other.parse().map(LevelFilter::Level),
        }
    }
}
