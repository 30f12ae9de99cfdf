use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::calendar::TimeContext;
use crate::models::{Interval, PeriodMode};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DayStats {
    pub min: f64,
    pub max: f64,
    pub average: f64,
    pub count: usize,
}

/// Reference and average price for one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyReference {
    pub reference: f64,
    pub average: f64,
}

/// Min/max/average per local day, always over unsmoothed prices.
pub fn day_stats(intervals: &[Interval], ctx: &TimeContext) -> BTreeMap<NaiveDate, DayStats> {
    let mut acc: BTreeMap<NaiveDate, (f64, f64, f64, usize)> = BTreeMap::new();
    for interval in intervals {
        let price = interval.unsmoothed_price();
        if !price.is_finite() {
            continue;
        }
        let entry = acc
            .entry(ctx.local_date(interval.start))
            .or_insert((f64::INFINITY, f64::NEG_INFINITY, 0.0, 0));
        entry.0 = entry.0.min(price);
        entry.1 = entry.1.max(price);
        entry.2 += price;
        entry.3 += 1;
    }

    acc.into_iter()
        .map(|(date, (min, max, sum, count))| {
            (
                date,
                DayStats {
                    min,
                    max,
                    average: sum / count as f64,
                    count,
                },
            )
        })
        .collect()
}

/// Per-day references for `mode`. Computed once per pass and never updated.
pub fn daily_references(
    stats: &BTreeMap<NaiveDate, DayStats>,
    mode: PeriodMode,
) -> BTreeMap<NaiveDate, DailyReference> {
    stats
        .iter()
        .map(|(date, s)| {
            (
                *date,
                DailyReference {
                    reference: mode.reference(s.min, s.max),
                    average: s.average,
                },
            )
        })
        .collect()
}
