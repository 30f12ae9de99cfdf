use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::models::PriceLevel;

/// Which end of the price curve a detection pass is looking for.
///
/// Every direction-dependent comparison in the pipeline goes through this
/// type, so thresholds are always stored as magnitudes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodMode {
    /// Best price: cheap windows anchored on the daily minimum.
    Cheapest,
    /// Peak price: expensive windows anchored on the daily maximum.
    MostExpensive,
}

impl fmt::Display for PeriodMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PeriodMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cheapest" | "best" | "best_price" => Ok(PeriodMode::Cheapest),
            "most_expensive" | "peak" | "peak_price" => Ok(PeriodMode::MostExpensive),
            _ => Err(ConfigError::invalid_value("mode", s)),
        }
    }
}

impl PeriodMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodMode::Cheapest => "best_price",
            PeriodMode::MostExpensive => "peak_price",
        }
    }

    /// Pick the reference out of a day's (min, max).
    pub fn reference(self, min: f64, max: f64) -> f64 {
        match self {
            PeriodMode::Cheapest => min,
            PeriodMode::MostExpensive => max,
        }
    }

    /// `diff` is the signed relative deviation from the reference.
    pub fn within_flex(self, diff: f64, flex: f64) -> bool {
        match self {
            PeriodMode::Cheapest => diff <= flex,
            PeriodMode::MostExpensive => diff >= -flex,
        }
    }

    /// Distance from the daily average in the favourable direction, percent.
    /// Positive means the price sits on the side this mode is looking for.
    pub fn distance_from_average(self, price: f64, average: f64) -> f64 {
        if average == 0.0 {
            return 0.0;
        }
        let raw = match self {
            PeriodMode::Cheapest => average - price,
            PeriodMode::MostExpensive => price - average,
        };
        raw / average.abs() * 100.0
    }

    /// Whether `level` satisfies the configured threshold for this mode.
    pub fn meets_level(self, level: PriceLevel, threshold: PriceLevel) -> bool {
        match self {
            PeriodMode::Cheapest => level <= threshold,
            PeriodMode::MostExpensive => level >= threshold,
        }
    }

    /// Number of ordinal steps `level` lies past the threshold in the wrong
    /// direction; zero when the threshold is met.
    pub fn level_overshoot(self, level: PriceLevel, threshold: PriceLevel) -> i8 {
        let diff = level.ordinal() - threshold.ordinal();
        match self {
            PeriodMode::Cheapest => diff.max(0),
            PeriodMode::MostExpensive => (-diff).max(0),
        }
    }
}
