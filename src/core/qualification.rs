use serde::{Deserialize, Serialize};

use crate::config::MAX_FLEX;
use crate::models::{LevelFilter, PeriodMode, PriceLevel};

/// Above this flex the distance requirement starts to shrink.
const DISTANCE_SCALING_START: f64 = 0.20;
/// Fraction of the configured distance left at the flex ceiling.
const DISTANCE_SCALING_FLOOR: f64 = 0.25;
/// Runs shorter than this must match the level exactly.
pub const MIN_INTERVALS_FOR_GAP_TOLERANCE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalCriteria {
    pub reference: f64,
    pub average: f64,
    /// Magnitude, already clamped.
    pub flex: f64,
    /// Percent, magnitude.
    pub min_distance_from_avg: f64,
    pub mode: PeriodMode,
}

impl IntervalCriteria {
    pub fn new(reference: f64, average: f64, flex: f64, min_distance_from_avg: f64, mode: PeriodMode) -> Self {
        Self {
            reference,
            average,
            flex: flex.abs().min(MAX_FLEX),
            min_distance_from_avg: min_distance_from_avg.abs(),
            mode,
        }
    }
}

/// Signed relative deviation from the reference; 0 for a zero reference.
pub fn percent_diff(price: f64, reference: f64) -> f64 {
    if reference == 0.0 {
        return 0.0;
    }
    (price - reference) / reference.abs()
}

/// Within the flex band on the mode's side. There is no bound on the far
/// side: a price beyond the reference itself still qualifies.
pub fn check_flex(price: f64, criteria: &IntervalCriteria) -> bool {
    criteria
        .mode
        .within_flex(percent_diff(price, criteria.reference), criteria.flex)
}

/// Distance requirement after scaling for wide flex bands.
pub fn effective_min_distance(min_distance: f64, flex: f64) -> f64 {
    let flex = flex.abs().min(MAX_FLEX);
    if flex <= DISTANCE_SCALING_START {
        return min_distance;
    }
    let progress = (flex - DISTANCE_SCALING_START) / (MAX_FLEX - DISTANCE_SCALING_START);
    let factor = 1.0 - (1.0 - DISTANCE_SCALING_FLOOR) * progress;
    min_distance * factor.max(DISTANCE_SCALING_FLOOR)
}

pub fn check_distance(price: f64, criteria: &IntervalCriteria) -> bool {
    let required = effective_min_distance(criteria.min_distance_from_avg, criteria.flex);
    if required <= 0.0 {
        return true;
    }
    criteria.mode.distance_from_average(price, criteria.average) >= required
}

/// Level settings for a pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelCheck {
    pub filter: LevelFilter,
    pub gap_count: u32,
    pub mode: PeriodMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelOutcome {
    /// Threshold met (or filter disabled). Resets the gap counter.
    Match,
    /// One step off, kept via gap tolerance.
    Gap,
    Fail,
}

impl LevelOutcome {
    pub fn passes(self) -> bool {
        !matches!(self, LevelOutcome::Fail)
    }
}

/// `run_len` is the length of the run this interval would extend and
/// `consecutive_gaps` the gaps directly before it.
pub fn check_level(level: PriceLevel, check: &LevelCheck, run_len: usize, consecutive_gaps: u32) -> LevelOutcome {
    let threshold = match check.filter {
        LevelFilter::Any => return LevelOutcome::Match,
        LevelFilter::Level(threshold) => threshold,
    };

    if check.mode.meets_level(level, threshold) {
        return LevelOutcome::Match;
    }

    let tolerant = check.gap_count > 0 && run_len >= MIN_INTERVALS_FOR_GAP_TOLERANCE;
    if tolerant
        && check.mode.level_overshoot(level, threshold) == 1
        && consecutive_gaps < check.gap_count
    {
        return LevelOutcome::Gap;
    }
    LevelOutcome::Fail
}
