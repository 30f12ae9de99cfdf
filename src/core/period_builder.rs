use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

use crate::core::calendar::TimeContext;
use crate::core::qualification::{
    check_distance, check_flex, check_level, IntervalCriteria, LevelCheck, LevelOutcome,
};
use crate::core::reference::DailyReference;
use crate::models::{Interval, PeriodInterval, PeriodMode};

/// A contiguous run of qualifying intervals inside one calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPeriod {
    pub date: NaiveDate,
    pub intervals: Vec<PeriodInterval>,
}

impl RawPeriod {
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn gap_count(&self) -> usize {
        self.intervals.iter().filter(|i| i.level_gap).count()
    }
}

/// Thresholds shared by every interval of one pass.
#[derive(Debug, Clone, Copy)]
pub struct BuildParams {
    pub mode: PeriodMode,
    pub flex: f64,
    pub min_distance_from_avg: f64,
    pub level: LevelCheck,
}

/// Accumulator threaded through the scan. Lives for a single pass.
#[derive(Debug, Default)]
struct ScanState {
    current: Vec<PeriodInterval>,
    current_date: Option<NaiveDate>,
    consecutive_gaps: u32,
    finished: Vec<RawPeriod>,
}

impl ScanState {
    fn close(mut self) -> Self {
        // A run never ends on a tolerated gap.
        while self.current.last().map_or(false, |i| i.level_gap) {
            self.current.pop();
        }
        if let (Some(date), false) = (self.current_date, self.current.is_empty()) {
            self.finished.push(RawPeriod {
                date,
                intervals: std::mem::take(&mut self.current),
            });
        }
        self.current.clear();
        self.current_date = None;
        self.consecutive_gaps = 0;
        self
    }

    fn step(
        self,
        interval: &Interval,
        references: &BTreeMap<NaiveDate, DailyReference>,
        params: &BuildParams,
        ctx: &TimeContext,
    ) -> Self {
        let date = ctx.local_date(interval.start);

        // Calendar day change always ends the run.
        let mut state = if self.current_date.is_some() && self.current_date != Some(date) {
            self.close()
        } else {
            self
        };

        let reference = match references.get(&date) {
            Some(r) => r,
            None => return state.close(),
        };
        let criteria = IntervalCriteria::new(
            reference.reference,
            reference.average,
            params.flex,
            params.min_distance_from_avg,
            params.mode,
        );

        let price_ok = |price: f64| check_flex(price, &criteria) && check_distance(price, &criteria);
        let qualifies = price_ok(interval.price);
        if !qualifies {
            return state.close();
        }

        let outcome = check_level(
            interval.level,
            &params.level,
            state.current.len(),
            state.consecutive_gaps,
        );
        if outcome == LevelOutcome::Fail {
            return state.close();
        }

        let original = interval.unsmoothed_price();
        let changed = interval.smoothed && price_ok(original) != qualifies;

        state.consecutive_gaps = match outcome {
            LevelOutcome::Gap => state.consecutive_gaps + 1,
            _ => 0,
        };
        state.current_date = Some(date);
        state.current.push(PeriodInterval {
            start: interval.start,
            end: None,
            price: original,
            qualified_price: interval.price,
            level: interval.level,
            rating: interval.rating,
            rating_difference: interval.rating_difference,
            smoothed: interval.smoothed,
            smoothing_changed_outcome: changed,
            level_gap: outcome == LevelOutcome::Gap,
        });
        state
    }
}

/// Scan a sorted (and possibly smoothed) series into raw runs.
pub fn build_periods(
    intervals: &[Interval],
    references: &BTreeMap<NaiveDate, DailyReference>,
    params: &BuildParams,
    ctx: &TimeContext,
) -> Vec<RawPeriod> {
    let periods = intervals
        .iter()
        .fold(ScanState::default(), |state, interval| {
            state.step(interval, references, params, ctx)
        })
        .close()
        .finished;

    debug!(
        "{}: built {} raw periods at flex {:.1}% (level {})",
        params.mode,
        periods.len(),
        params.flex * 100.0,
        params.level.filter
    );
    periods
}
