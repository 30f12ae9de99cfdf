use chrono::Duration;
use tracing::debug;

use crate::config::{RatingThresholds, VolatilityThresholds};
use crate::core::calendar::TimeContext;
use crate::core::period_builder::RawPeriod;
use crate::core::statistics::{coefficient_of_variation, mean, median, round2};
use crate::models::{
    Period, PeriodSummary, PriceLevel, PriceRating, RelaxationMarkers, VolatilityLevel,
};

/// Major to minor currency units.
const MINOR_UNITS: f64 = 100.0;

/// Steps 1-3 of post-processing: minimum length, end stamping, relevance.
/// Survivors become [`Period`]s carrying `markers`.
pub fn finalize_runs(
    raws: Vec<RawPeriod>,
    min_intervals: usize,
    interval_length: Duration,
    ctx: &TimeContext,
    markers: &RelaxationMarkers,
) -> Vec<Period> {
    let total = raws.len();
    let long_enough = filter_min_length(raws, min_intervals);
    let kept = long_enough.len();
    let stamped = stamp_ends(long_enough, interval_length);
    let relevant = filter_relevant(stamped, ctx);

    debug!(
        "Post-processing: {} raw, {} long enough (>= {} intervals), {} relevant",
        total,
        kept,
        min_intervals,
        relevant.len()
    );

    relevant
        .into_iter()
        .map(|raw| Period::new(raw.intervals, markers.clone()))
        .collect()
}

pub fn filter_min_length(raws: Vec<RawPeriod>, min_intervals: usize) -> Vec<RawPeriod> {
    raws.into_iter().filter(|r| r.len() >= min_intervals).collect()
}

pub fn stamp_ends(mut raws: Vec<RawPeriod>, interval_length: Duration) -> Vec<RawPeriod> {
    for raw in &mut raws {
        for interval in &mut raw.intervals {
            interval.end = Some(interval.start + interval_length);
        }
    }
    raws
}

/// Drops runs that ended before today's local midnight. A run that started
/// yesterday but reaches into today stays.
pub fn filter_relevant(raws: Vec<RawPeriod>, ctx: &TimeContext) -> Vec<RawPeriod> {
    let midnight = ctx.start_of_today();
    raws.into_iter()
        .filter(|r| {
            r.intervals
                .last()
                .and_then(|i| i.end)
                .map_or(false, |end| end >= midnight)
        })
        .collect()
}

/// Ordinal median, taking the upper-middle element on even counts.
pub fn aggregate_level(levels: &[PriceLevel]) -> Option<PriceLevel> {
    if levels.is_empty() {
        return None;
    }
    let mut ordinals: Vec<i8> = levels.iter().map(|l| l.ordinal()).collect();
    ordinals.sort_unstable();
    PriceLevel::from_ordinal(ordinals[ordinals.len() / 2])
}

/// Threshold classification of the mean rating difference. Falls back to
/// the ordinal median of the ratings when no difference is known.
pub fn aggregate_rating(
    ratings: &[PriceRating],
    differences: &[f64],
    thresholds: &RatingThresholds,
) -> Option<(PriceRating, Option<f64>)> {
    if let Some(avg) = mean(differences) {
        let rating = if avg <= thresholds.low {
            PriceRating::Low
        } else if avg >= thresholds.high {
            PriceRating::High
        } else {
            PriceRating::Normal
        };
        return Some((rating, Some(round2(avg))));
    }
    if ratings.is_empty() {
        return None;
    }
    let mut ordinals: Vec<i8> = ratings.iter().map(|r| r.ordinal()).collect();
    ordinals.sort_unstable();
    PriceRating::from_ordinal(ordinals[ordinals.len() / 2]).map(|r| (r, None))
}

pub fn classify_volatility(cv: f64, thresholds: &VolatilityThresholds) -> VolatilityLevel {
    if cv >= thresholds.very_high {
        VolatilityLevel::VeryHigh
    } else if cv >= thresholds.high {
        VolatilityLevel::High
    } else if cv >= thresholds.moderate {
        VolatilityLevel::Moderate
    } else {
        VolatilityLevel::Low
    }
}

/// Step 4: one summary per period, in chronological order, with position
/// counters filled in.
pub fn summarize(
    periods: &[Period],
    rating_thresholds: &RatingThresholds,
    volatility_thresholds: &VolatilityThresholds,
    ctx: &TimeContext,
) -> Vec<PeriodSummary> {
    let mut sorted: Vec<&Period> = periods.iter().filter(|p| !p.is_empty()).collect();
    sorted.sort_by_key(|p| p.start());

    let total = sorted.len();
    let remaining = sorted.iter().filter(|p| p.end() > ctx.now).count();

    sorted
        .iter()
        .enumerate()
        .filter_map(|(idx, period)| {
            summarize_one(period, rating_thresholds, volatility_thresholds).map(|mut s| {
                s.period_position = idx + 1;
                s.periods_total = total;
                s.periods_remaining = remaining;
                s
            })
        })
        .collect()
}

fn summarize_one(
    period: &Period,
    rating_thresholds: &RatingThresholds,
    volatility_thresholds: &VolatilityThresholds,
) -> Option<PeriodSummary> {
    let prices: Vec<f64> = period.intervals.iter().map(|i| i.price * MINOR_UNITS).collect();
    let levels: Vec<PriceLevel> = period.intervals.iter().map(|i| i.level).collect();
    let ratings: Vec<PriceRating> = period.intervals.iter().map(|i| i.rating).collect();
    let differences: Vec<f64> = period
        .intervals
        .iter()
        .filter_map(|i| i.rating_difference)
        .collect();

    let level = aggregate_level(&levels)?;
    let (rating, rating_difference_pct) = aggregate_rating(&ratings, &differences, rating_thresholds)?;

    let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
    let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let avg = mean(&prices)?;
    let cv = coefficient_of_variation(&prices)?;

    let start = period.start();
    let end = period.end();
    let markers = &period.markers;

    Some(PeriodSummary {
        start,
        end,
        duration_minutes: (end - start).num_minutes(),
        interval_count: period.len(),
        level,
        rating,
        rating_difference_pct,
        price_avg: round2(avg),
        price_min: round2(min),
        price_max: round2(max),
        price_spread: round2(max - min),
        price_median: round2(median(&prices)?),
        volatility: classify_volatility(cv, volatility_thresholds),
        coefficient_of_variation: round2(cv),
        period_position: 0,
        periods_total: 0,
        periods_remaining: 0,
        smoothed_interval_count: period.intervals.iter().filter(|i| i.smoothed).count(),
        relaxation_active: markers.relaxation_active,
        relaxation_level: markers.relaxation_level.clone(),
        relaxation_threshold_original_pct: markers.relaxation_threshold_original_pct,
        relaxation_threshold_applied_pct: markers.relaxation_threshold_applied_pct,
    })
}
