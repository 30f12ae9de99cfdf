#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};

use price_periods::config::EngineConfig;
use price_periods::models::{Interval, IntervalSeries, PriceLevel, PriceRating};

/// Local midnight of Monday 2025-03-10 in Berlin.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 9, 23, 0, 0).unwrap()
}

pub fn test_config() -> EngineConfig {
    EngineConfig::default()
}

/// 15-minute intervals from `start`, Normal level and rating.
pub fn intervals_from(start: DateTime<Utc>, prices: &[f64]) -> Vec<Interval> {
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

pub fn series(prices: &[f64]) -> IntervalSeries {
    IntervalSeries::new(intervals_from(base_time(), prices))
}

/// 96 prices at 3.0 with 1.0 valleys at (first index, length).
pub fn valley_day(valleys: &[(usize, usize)]) -> Vec<f64> {
    let mut prices = vec![3.0; 96];
    for &(start, len) in valleys {
        for p in &mut prices[start..start + len] {
            *p = 1.0;
        }
    }
    prices
}

/// Today: a deep valley plus a shallow one at 1.2. Tomorrow: three deep valleys.
pub fn two_day_prices() -> Vec<f64> {
    let mut today = valley_day(&[(8, 6)]);
    for p in &mut today[60..66] {
        *p = 1.2;
    }
    today.extend(valley_day(&[(8, 6), (40, 6), (72, 6)]));
    today
}
