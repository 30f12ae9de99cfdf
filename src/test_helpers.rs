use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Europe::Berlin;

use crate::config::EngineConfig;
use crate::core::calendar::TimeContext;
use crate::core::period_builder::RawPeriod;
use crate::models::{
    Interval, IntervalSeries, Period, PeriodInterval, PriceLevel, PriceRating, RelaxationMarkers,
};

/// Local midnight of Monday 2025-03-10 in Berlin (UTC+1).
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 9, 23, 0, 0).unwrap()
}

pub fn ctx_at(now: DateTime<Utc>) -> TimeContext {
    TimeContext::new(now, Berlin)
}

pub fn test_config() -> EngineConfig {
    EngineConfig::default()
}

/// 15-minute intervals starting at `start`, all Normal level and rating.
pub fn make_intervals_from(start: DateTime<Utc>, prices: &[f64]) -> Vec<Interval> {
    prices
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            Interval::new(
                start + Duration::minutes(15 * i as i64),
                p,
                PriceLevel::Normal,
                PriceRating::Normal,
            )
        })
        .collect()
}

pub fn make_intervals(prices: &[f64]) -> IntervalSeries {
    IntervalSeries::new(make_intervals_from(base_time(), prices))
}

/// One day of 96 prices at 3.0 with 1.0 valleys at the given
/// (first index, length) positions.
pub fn valley_day(valleys: &[(usize, usize)]) -> Vec<f64> {
    let mut prices = vec![3.0; 96];
    for &(start, len) in valleys {
        for p in &mut prices[start..start + len] {
            *p = 1.0;
        }
    }
    prices
}

fn period_interval(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> PeriodInterval {
    PeriodInterval {
        start,
        end,
        price: 0.10,
        qualified_price: 0.10,
        level: PriceLevel::Cheap,
        rating: PriceRating::Low,
        rating_difference: None,
        smoothed: false,
        smoothing_changed_outcome: false,
        level_gap: false,
    }
}

/// A raw run of `n` 15-minute intervals without end stamps.
pub fn raw_run(start: DateTime<Utc>, n: usize) -> RawPeriod {
    RawPeriod {
        date: start.with_timezone(&Berlin).date_naive(),
        intervals: (0..n)
            .map(|i| period_interval(start + Duration::minutes(15 * i as i64), None))
            .collect(),
    }
}

/// A finished period of `n` stamped 15-minute intervals with baseline markers.
pub fn period_at(start: DateTime<Utc>, n: usize, flex: f64) -> Period {
    let intervals = (0..n)
        .map(|i| {
            let s = start + Duration::minutes(15 * i as i64);
            period_interval(s, Some(s + Duration::minutes(15)))
        })
        .collect();
    Period::new(intervals, RelaxationMarkers::baseline(flex))
}
