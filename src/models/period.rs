use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{PriceLevel, PriceRating, VolatilityLevel};

/// An interval as recorded inside a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodInterval {
    pub start: DateTime<Utc>,
    /// Stamped by the post processor.
    pub end: Option<DateTime<Utc>>,
    /// Price before smoothing.
    pub price: f64,
    /// Price the qualification test actually saw.
    pub qualified_price: f64,
    pub level: PriceLevel,
    pub rating: PriceRating,
    pub rating_difference: Option<f64>,
    pub smoothed: bool,
    /// Whether the unsmoothed price would have been judged differently.
    pub smoothing_changed_outcome: bool,
    /// Kept only through level gap tolerance.
    #[serde(default)]
    pub level_gap: bool,
}

/// Why a period was accepted. Set once by the phase that produced it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RelaxationMarkers {
    pub relaxation_active: bool,
    pub relaxation_level: Option<String>,
    pub relaxation_threshold_original_pct: f64,
    pub relaxation_threshold_applied_pct: f64,
}

impl RelaxationMarkers {
    pub fn baseline(flex: f64) -> Self {
        let pct = round1(flex * 100.0);
        Self {
            relaxation_active: false,
            relaxation_level: None,
            relaxation_threshold_original_pct: pct,
            relaxation_threshold_applied_pct: pct,
        }
    }

    pub fn relaxed(original_flex: f64, applied_flex: f64, label: String) -> Self {
        Self {
            relaxation_active: true,
            relaxation_level: Some(label),
            relaxation_threshold_original_pct: round1(original_flex * 100.0),
            relaxation_threshold_applied_pct: round1(applied_flex * 100.0),
        }
    }

    /// Copy the fields a more relaxed record overrides on merge.
    pub fn override_from(&mut self, other: &RelaxationMarkers) {
        self.relaxation_active = other.relaxation_active;
        self.relaxation_level = other.relaxation_level.clone();
        self.relaxation_threshold_applied_pct = other.relaxation_threshold_applied_pct;
    }
}

/// A contiguous run of qualifying intervals plus the markers of the phase
/// that accepted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub intervals: Vec<PeriodInterval>,
    pub markers: RelaxationMarkers,
}

impl Period {
    pub fn new(intervals: Vec<PeriodInterval>, markers: RelaxationMarkers) -> Self {
        Self { intervals, markers }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.intervals
            .first()
            .map(|i| i.start)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.intervals
            .last()
            .map(|i| i.end.unwrap_or(i.start))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn overlaps_or_touches(&self, other: &Period) -> bool {
        self.start() <= other.end() && other.start() <= self.end()
    }
}

/// The externally returned description of one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: i64,
    pub interval_count: usize,
    pub level: PriceLevel,
    pub rating: PriceRating,
    pub rating_difference_pct: Option<f64>,
    /// Prices in minor currency units.
    pub price_avg: f64,
    pub price_min: f64,
    pub price_max: f64,
    pub price_spread: f64,
    pub price_median: f64,
    pub volatility: VolatilityLevel,
    pub coefficient_of_variation: f64,
    pub period_position: usize,
    pub periods_total: usize,
    pub periods_remaining: usize,
    pub smoothed_interval_count: usize,
    pub relaxation_active: bool,
    pub relaxation_level: Option<String>,
    pub relaxation_threshold_original_pct: f64,
    pub relaxation_threshold_applied_pct: f64,
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}
