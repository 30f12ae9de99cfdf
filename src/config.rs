use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

use crate::error::ConfigError;
use crate::models::{LevelFilter, PeriodMode};

/// Hard ceiling for the flex magnitude (50%).
pub const MAX_FLEX: f64 = 0.50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelaxationConfig {
    pub enabled: bool,
    /// Periods each day should end up with.
    pub min_periods: usize,
    pub max_attempts: u32,
}

impl Default for RelaxationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_periods: 2,
            max_attempts: 11,
        }
    }
}

/// Detection settings for one mode. `flex` and `min_distance_from_avg` are
/// magnitudes; the mode supplies the direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodConfig {
    /// Allowed deviation from the daily reference, as a ratio (0.15 = 15%).
    pub flex: f64,
    /// Required distance from the daily average, percent.
    pub min_distance_from_avg: f64,
    pub min_period_length_minutes: u32,
    pub level_filter: LevelFilter,
    /// Consecutive one-step-off-level intervals tolerated inside a run.
    pub gap_count: u32,
    pub relaxation: RelaxationConfig,
}

impl PeriodConfig {
    pub fn best_price() -> Self {
        Self {
            flex: 0.15,
            min_distance_from_avg: 5.0,
            min_period_length_minutes: 60,
            level_filter: LevelFilter::Any,
            gap_count: 0,
            relaxation: RelaxationConfig::default(),
        }
    }

    pub fn peak_price() -> Self {
        Self {
            flex: 0.20,
            min_distance_from_avg: 5.0,
            min_period_length_minutes: 30,
            level_filter: LevelFilter::Any,
            gap_count: 0,
            relaxation: RelaxationConfig::default(),
        }
    }

    /// Magnitudes only, flex clamped to [`MAX_FLEX`].
    pub fn normalized(&self) -> Self {
        let mut out = self.clone();
        out.flex = clamp_flex(self.flex);
        out.min_distance_from_avg = self.min_distance_from_avg.abs();
        out
    }

    /// Interval count a period must reach.
    pub fn min_period_intervals(&self, interval_minutes: u32) -> usize {
        let interval_minutes = interval_minutes.max(1);
        let count = self.min_period_length_minutes.div_ceil(interval_minutes);
        count.max(1) as usize
    }
}

/// Clamp a configured flex to a magnitude within the hard ceiling.
pub fn clamp_flex(flex: f64) -> f64 {
    let magnitude = flex.abs();
    if !magnitude.is_finite() {
        warn!("Non-finite flex {} replaced by {:.0}%", flex, MAX_FLEX * 100.0);
        return MAX_FLEX;
    }
    if magnitude > MAX_FLEX {
        warn!(
            "Flex {:.1}% exceeds the {:.0}% ceiling, clamping",
            magnitude * 100.0,
            MAX_FLEX * 100.0
        );
        return MAX_FLEX;
    }
    magnitude
}

/// Rating difference thresholds, percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingThresholds {
    pub low: f64,
    pub high: f64,
}

impl Default for RatingThresholds {
    fn default() -> Self {
        Self {
            low: -10.0,
            high: 10.0,
        }
    }
}

/// Coefficient of variation thresholds, percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityThresholds {
    pub moderate: f64,
    pub high: f64,
    pub very_high: f64,
}

impl Default for VolatilityThresholds {
    fn default() -> Self {
        Self {
            moderate: 15.0,
            high: 30.0,
            very_high: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub best: PeriodConfig,
    pub peak: PeriodConfig,
    pub interval_minutes: u32,
    pub rating_thresholds: RatingThresholds,
    pub volatility_thresholds: VolatilityThresholds,
    /// IANA timezone used for calendar-day boundaries.
    pub timezone: String,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            best: PeriodConfig::best_price(),
            peak: PeriodConfig::peak_price(),
            interval_minutes: 15,
            rating_thresholds: RatingThresholds::default(),
            volatility_thresholds: VolatilityThresholds::default(),
            timezone: "Europe/Berlin".to_string(),
            log_level: "INFO".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let env = |key: &str| -> Option<String> { std::env::var(key).ok() };
        let defaults = EngineConfig::default();

        let cfg = EngineConfig {
            best: period_from_env("BEST", &defaults.best)?,
            peak: period_from_env("PEAK", &defaults.peak)?,
            interval_minutes: env("INTERVAL_MINUTES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.interval_minutes),
            rating_thresholds: defaults.rating_thresholds,
            volatility_thresholds: defaults.volatility_thresholds,
            timezone: env("PRICE_TIMEZONE").unwrap_or(defaults.timezone),
            log_level: env("LOG_LEVEL").unwrap_or(defaults.log_level),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn period(&self, mode: PeriodMode) -> &PeriodConfig {
        match mode {
            PeriodMode::Cheapest => &self.best,
            PeriodMode::MostExpensive => &self.peak,
        }
    }

    pub fn tz(&self) -> Result<Tz, ConfigError> {
        Tz::from_str(&self.timezone).map_err(|_| ConfigError::UnknownTimezone(self.timezone.clone()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_minutes == 0 {
            return Err(ConfigError::Invalid("interval_minutes must be positive".into()));
        }
        for (name, period) in [("best", &self.best), ("peak", &self.peak)] {
            if period.min_period_length_minutes == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{} min_period_length_minutes must be positive",
                    name
                )));
            }
            if !period.flex.is_finite() || !period.min_distance_from_avg.is_finite() {
                return Err(ConfigError::Invalid(format!("{} thresholds must be finite", name)));
            }
        }
        let r = &self.rating_thresholds;
        if r.low >= r.high {
            return Err(ConfigError::Invalid(format!(
                "rating thresholds out of order: low {} >= high {}",
                r.low, r.high
            )));
        }
        let v = &self.volatility_thresholds;
        if !(v.moderate < v.high && v.high < v.very_high) {
            return Err(ConfigError::Invalid(format!(
                "volatility thresholds out of order: {} / {} / {}",
                v.moderate, v.high, v.very_high
            )));
        }
        self.tz()?;
        Ok(())
    }
}

fn period_from_env(prefix: &str, defaults: &PeriodConfig) -> Result<PeriodConfig, ConfigError> {
    let env = |key: &str| -> Option<String> { std::env::var(format!("{}_{}", prefix, key)).ok() };

    let level_filter = match env("LEVEL_FILTER") {
        Some(raw) => raw.parse()?,
        None => defaults.level_filter,
    };
    let enabled = match env("RELAXATION") {
        Some(raw) => parse_bool(&format!("{}_RELAXATION", prefix), &raw)?,
        None => defaults.relaxation.enabled,
    };

    Ok(PeriodConfig {
        flex: env("FLEX")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.flex),
        min_distance_from_avg: env("MIN_DISTANCE")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.min_distance_from_avg),
        min_period_length_minutes: env("MIN_PERIOD_LENGTH")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.min_period_length_minutes),
        level_filter,
        gap_count: env("GAP_COUNT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.gap_count),
        relaxation: RelaxationConfig {
            enabled,
            min_periods: env("MIN_PERIODS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.relaxation.min_periods),
            max_attempts: env("MAX_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.relaxation.max_attempts),
        },
    })
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid_value(key, raw)),
    }
}
