use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::config::{PeriodConfig, MAX_FLEX};
use crate::core::calendar::TimeContext;
use crate::core::outlier_filter::OutlierFilter;
use crate::core::overlap::{join_at_midnight, resolve};
use crate::core::period_builder::{build_periods, BuildParams};
use crate::core::post_process::finalize_runs;
use crate::core::qualification::LevelCheck;
use crate::core::reference::DailyReference;
use crate::models::{
    DayRelaxation, Interval, LevelFilter, Period, PeriodMode, RelaxationMarkers,
    RelaxationMetadata, RelaxationState,
};

/// Flex added per attempt (3 percentage points).
pub const FLEX_STEP: f64 = 0.03;
const FLEX_EPSILON: f64 = 1e-9;

pub fn relaxation_label(flex: f64) -> String {
    format!("price_diff_{:.1}%+level_any", flex * 100.0)
}

/// Flex for attempt `attempt` (1-based). The first step past the ceiling is
/// clamped to it; `None` after that.
pub fn attempt_flex(base_flex: f64, attempt: u32) -> Option<f64> {
    let step = |n: u32| base_flex.abs() + n as f64 * FLEX_STEP;
    let flex = step(attempt);
    if flex <= MAX_FLEX + FLEX_EPSILON {
        return Some(flex.min(MAX_FLEX));
    }
    if step(attempt.saturating_sub(1)) < MAX_FLEX - FLEX_EPSILON {
        Some(MAX_FLEX)
    } else {
        None
    }
}

/// Everything one detection pass needs besides the thresholds.
pub struct DetectionPass<'a> {
    pub intervals: &'a [Interval],
    pub references: &'a BTreeMap<NaiveDate, DailyReference>,
    pub mode: PeriodMode,
    /// Normalised configuration.
    pub config: &'a PeriodConfig,
    pub interval_minutes: u32,
    pub ctx: &'a TimeContext,
}

impl DetectionPass<'_> {
    /// Smoothing, building and post-processing at the given thresholds.
    pub fn run(&self, flex: f64, level_filter: LevelFilter, markers: &RelaxationMarkers) -> Vec<Period> {
        let smoothed = OutlierFilter::new(flex).smooth(self.intervals, self.ctx);
        let params = BuildParams {
            mode: self.mode,
            flex,
            min_distance_from_avg: self.config.min_distance_from_avg,
            level: LevelCheck {
                filter: level_filter,
                gap_count: self.config.gap_count,
                mode: self.mode,
            },
        };
        let raws = build_periods(&smoothed, self.references, &params, self.ctx);
        finalize_runs(
            raws,
            self.config.min_period_intervals(self.interval_minutes),
            Duration::minutes(self.interval_minutes as i64),
            self.ctx,
            markers,
        )
    }

    pub fn day_of(&self, period: &Period) -> NaiveDate {
        self.ctx.local_date(period.start())
    }
}

#[derive(Debug, Clone)]
pub struct RelaxationOutcome {
    pub periods: Vec<Period>,
    pub metadata: Option<RelaxationMetadata>,
}

pub struct RelaxationEngine<'a> {
    pass: DetectionPass<'a>,
}

impl<'a> RelaxationEngine<'a> {
    pub fn new(pass: DetectionPass<'a>) -> Self {
        Self { pass }
    }

    pub fn run(&self) -> RelaxationOutcome {
        let cfg = self.pass.config;
        let relax = &cfg.relaxation;

        if self.pass.intervals.is_empty() {
            return RelaxationOutcome {
                periods: Vec::new(),
                metadata: None,
            };
        }

        let today = self.pass.ctx.today();
        let days: Vec<NaiveDate> = self
            .pass
            .references
            .keys()
            .copied()
            .filter(|d| *d >= today)
            .collect();

        if days.is_empty() {
            debug!("{}: no price data for {} or later", self.pass.mode, today);
            return RelaxationOutcome {
                periods: Vec::new(),
                metadata: Some(RelaxationMetadata {
                    relaxation_attempted: false,
                    min_periods_requested: relax.min_periods,
                    ..Default::default()
                }),
            };
        }

        let baseline = join_at_midnight(
            self.pass.run(cfg.flex, cfg.level_filter, &RelaxationMarkers::baseline(cfg.flex)),
            self.pass.ctx,
        );

        let mut tracks: BTreeMap<NaiveDate, DayRelaxation> = days
            .iter()
            .map(|&date| {
                let count = baseline.iter().filter(|p| self.pass.day_of(p) == date).count();
                let state = if count >= relax.min_periods {
                    RelaxationState::Satisfied
                } else {
                    RelaxationState::Baseline
                };
                (
                    date,
                    DayRelaxation {
                        date,
                        baseline_count: count,
                        period_count: count,
                        attempts_used: 0,
                        applied_flex: Vec::new(),
                        state,
                    },
                )
            })
            .collect();

        let needs_relaxation = tracks.values().any(|t| !t.state.is_final());
        if !relax.enabled || !needs_relaxation {
            debug!(
                "{}: baseline found {} periods, relaxation {}",
                self.pass.mode,
                baseline.len(),
                if relax.enabled { "not needed" } else { "disabled" }
            );
            let metadata = self.metadata(&baseline, &tracks, Vec::new(), false);
            return RelaxationOutcome {
                periods: baseline,
                metadata: Some(metadata),
            };
        }

        let mut accepted = baseline;
        let mut phases_used = Vec::new();

        for attempt in 1..=relax.max_attempts {
            let flex = match attempt_flex(cfg.flex, attempt) {
                Some(f) => f,
                None => {
                    debug!(
                        "{}: flex ceiling reached after {} attempts",
                        self.pass.mode,
                        attempt - 1
                    );
                    break;
                }
            };

            let open: BTreeSet<NaiveDate> = tracks
                .values()
                .filter(|t| !t.state.is_final())
                .map(|t| t.date)
                .collect();
            if open.is_empty() {
                break;
            }

            let label = relaxation_label(flex);
            phases_used.push(label.clone());
            for date in &open {
                if let Some(track) = tracks.get_mut(date) {
                    track.state = RelaxationState::Relaxing(attempt);
                    track.attempts_used = attempt;
                    track.applied_flex.push(flex);
                }
            }

            let markers = RelaxationMarkers::relaxed(cfg.flex, flex, label);
            let found = self.pass.run(flex, LevelFilter::Any, &markers);
            accepted = self.merge_open_days(accepted, found, &open, &mut tracks);

            for date in &open {
                if let Some(track) = tracks.get_mut(date) {
                    if track.period_count >= relax.min_periods {
                        track.state = RelaxationState::Satisfied;
                    }
                }
            }

            debug!(
                "{}: attempt {} at flex {:.1}%: {} periods, {} days still short",
                self.pass.mode,
                attempt,
                flex * 100.0,
                accepted.len(),
                tracks.values().filter(|t| !t.state.is_final()).count()
            );
        }

        for track in tracks.values_mut() {
            if !track.state.is_final() {
                track.state = RelaxationState::Exhausted;
            }
        }

        let metadata = self.metadata(&accepted, &tracks, phases_used, true);
        if metadata.relaxation_incomplete {
            warn!(
                "{}: relaxation incomplete, {}/{} days reached {} periods",
                self.pass.mode,
                metadata.days_meeting_requirement,
                metadata.days_processed,
                relax.min_periods
            );
        } else {
            info!(
                "{}: relaxation satisfied all {} days with {} phases",
                self.pass.mode,
                metadata.days_processed,
                metadata.phases_used.len()
            );
        }

        RelaxationOutcome {
            periods: accepted,
            metadata: Some(metadata),
        }
    }

    /// Merge `found` into `accepted`, restricted to the still-open days.
    fn merge_open_days(
        &self,
        accepted: Vec<Period>,
        found: Vec<Period>,
        open: &BTreeSet<NaiveDate>,
        tracks: &mut BTreeMap<NaiveDate, DayRelaxation>,
    ) -> Vec<Period> {
        let (in_scope, fixed): (Vec<Period>, Vec<Period>) = accepted
            .into_iter()
            .partition(|p| open.contains(&self.pass.day_of(p)));

        // A candidate may not reach into a period owned by a closed day.
        let candidates: Vec<Period> = found
            .into_iter()
            .filter(|c| open.contains(&self.pass.day_of(c)))
            .filter(|c| !fixed.iter().any(|f| c.start() < f.end() && f.start() < c.end()))
            .collect();

        let outcome = resolve(&in_scope, &candidates);
        for start in &outcome.new_period_starts {
            let date = self.pass.ctx.local_date(*start);
            if let Some(track) = tracks.get_mut(&date) {
                track.period_count += 1;
            }
        }

        // Midnight joins consolidate; they never change a day's count.
        let mut merged = fixed;
        merged.extend(outcome.periods);
        join_at_midnight(merged, self.pass.ctx)
    }

    fn metadata(
        &self,
        periods: &[Period],
        tracks: &BTreeMap<NaiveDate, DayRelaxation>,
        phases_used: Vec<String>,
        attempted: bool,
    ) -> RelaxationMetadata {
        let min_periods = self.pass.config.relaxation.min_periods;
        let per_day: Vec<DayRelaxation> = tracks.values().cloned().collect();
        let meeting = per_day.iter().filter(|t| t.period_count >= min_periods).count();

        RelaxationMetadata {
            relaxation_active: periods.iter().any(|p| p.markers.relaxation_active),
            relaxation_attempted: attempted,
            min_periods_requested: min_periods,
            periods_found: periods.len(),
            phases_used,
            days_processed: per_day.len(),
            days_meeting_requirement: meeting,
            relaxation_incomplete: per_day
                .iter()
                .any(|t| t.state == RelaxationState::Exhausted),
            per_day,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reference::{daily_references, day_stats};
    use crate::test_helpers::{base_time, ctx_at, make_intervals_from, valley_day};

    fn run(
        intervals: &[Interval],
        config: &PeriodConfig,
        ctx: &TimeContext,
    ) -> RelaxationOutcome {
        let refs = daily_references(&day_stats(intervals, ctx), PeriodMode::Cheapest);
        let cfg = config.normalized();
        let pass = DetectionPass {
            intervals,
            references: &refs,
            mode: PeriodMode::Cheapest,
            config: &cfg,
            interval_minutes: 15,
            ctx,
        };
        RelaxationEngine::new(pass).run()
    }

    fn strict_config(min_periods: usize) -> PeriodConfig {
        let mut cfg = PeriodConfig::best_price();
        cfg.flex = 0.05;
        cfg.min_distance_from_avg = 0.0;
        cfg.min_period_length_minutes = 30;
        cfg.relaxation.min_periods = min_periods;
        cfg
    }

    #[test]
    fn attempt_flex_steps_and_stops_at_ceiling() {
        assert!((attempt_flex(0.15, 1).unwrap() - 0.18).abs() < 1e-12);
        assert!((attempt_flex(-0.15, 2).unwrap() - 0.21).abs() < 1e-12);
        assert!((attempt_flex(0.44, 2).unwrap() - 0.50).abs() < 1e-12);
        // off the step grid: one last attempt at the ceiling
        assert_eq!(attempt_flex(0.45, 2), Some(MAX_FLEX));
        assert!(attempt_flex(0.45, 3).is_none());
        assert!(attempt_flex(0.50, 1).is_none());
    }

    #[test]
    fn label_format() {
        assert_eq!(relaxation_label(0.18), "price_diff_18.0%+level_any");
    }

    #[test]
    fn empty_input_has_no_metadata() {
        let ctx = ctx_at(base_time());
        let out = run(&[], &strict_config(2), &ctx);
        assert!(out.periods.is_empty());
        assert!(out.metadata.is_none());
    }

    #[test]
    fn no_data_for_today_returns_unattempted() {
        let intervals = make_intervals_from(base_time(), &[1.0; 96]);
        let ctx = ctx_at(base_time() + Duration::days(2));
        let out = run(&intervals, &strict_config(2), &ctx);
        assert!(out.periods.is_empty());
        let meta = out.metadata.unwrap();
        assert!(!meta.relaxation_attempted);
        assert_eq!(meta.days_processed, 0);
    }

    #[test]
    fn satisfied_baseline_is_untouched() {
        let prices = valley_day(&[(8, 3), (40, 3)]);
        let intervals = make_intervals_from(base_time(), &prices);
        let ctx = ctx_at(base_time());
        let out = run(&intervals, &strict_config(2), &ctx);
        let meta = out.metadata.unwrap();
        assert!(!meta.relaxation_attempted);
        assert!(!meta.relaxation_active);
        assert!(meta.phases_used.is_empty());
        assert_eq!(out.periods.len(), 2);
        assert!(out.periods.iter().all(|p| !p.markers.relaxation_active));
    }

    #[test]
    fn relaxation_finds_shallower_valley() {
        // one deep valley at 1.0 and one shallower at 1.2
        let mut prices = vec![3.0; 96];
        for p in &mut prices[8..12] {
            *p = 1.0;
        }
        for p in &mut prices[60..64] {
            *p = 1.2;
        }
        let intervals = make_intervals_from(base_time(), &prices);
        let ctx = ctx_at(base_time());
        let out = run(&intervals, &strict_config(2), &ctx);
        let meta = out.metadata.unwrap();

        assert!(meta.relaxation_attempted);
        assert!(meta.relaxation_active);
        assert!(!meta.relaxation_incomplete);
        assert_eq!(out.periods.len(), 2);
        // 1.2 is 20% above 1.0: needs flex 0.20, reached at attempt 5
        assert_eq!(meta.phases_used.len(), 5);
        let day = &meta.per_day[0];
        assert_eq!(day.state, RelaxationState::Satisfied);
        assert_eq!(day.baseline_count, 1);
        assert_eq!(day.period_count, 2);
        for pair in day.applied_flex.windows(2) {
            assert!(pair[1] > pair[0]);
        }
        assert!(out.periods[1].markers.relaxation_active);
        assert!(!out.periods[0].markers.relaxation_active);
    }

    #[test]
    fn exhausted_when_ceiling_hit() {
        // a single valley; nothing else can ever qualify
        let mut prices = vec![10.0; 96];
        for p in &mut prices[20..24] {
            *p = 1.0;
        }
        let intervals = make_intervals_from(base_time(), &prices);
        let ctx = ctx_at(base_time());
        let mut cfg = strict_config(2);
        cfg.relaxation.max_attempts = 50;
        let out = run(&intervals, &cfg, &ctx);
        let meta = out.metadata.unwrap();
        assert!(meta.relaxation_incomplete);
        assert_eq!(meta.per_day[0].state, RelaxationState::Exhausted);
        // 0.05 + 15 * 0.03 = 0.50 is the last allowed step
        assert_eq!(meta.phases_used.len(), 15);
        assert_eq!(out.periods.len(), 1);
    }

    #[test]
    fn disabled_relaxation_reports_baseline() {
        let mut prices = vec![3.0; 96];
        for p in &mut prices[8..12] {
            *p = 1.0;
        }
        let intervals = make_intervals_from(base_time(), &prices);
        let ctx = ctx_at(base_time());
        let mut cfg = strict_config(2);
        cfg.relaxation.enabled = false;
        let out = run(&intervals, &cfg, &ctx);
        let meta = out.metadata.unwrap();
        assert!(!meta.relaxation_attempted);
        assert_eq!(meta.days_meeting_requirement, 0);
        assert_eq!(out.periods.len(), 1);
    }

    #[test]
    fn satisfied_day_is_left_alone() {
        // today: one valley; tomorrow: three valleys
        let mut today = vec![3.0; 96];
        for p in &mut today[8..12] {
            *p = 1.0;
        }
        for p in &mut today[60..64] {
            *p = 1.2;
        }
        let tomorrow = valley_day(&[(8, 3), (40, 3), (72, 3)]);
        let mut prices = today;
        prices.extend(tomorrow);

        let intervals = make_intervals_from(base_time(), &prices);
        let ctx = ctx_at(base_time());
        let out = run(&intervals, &strict_config(2), &ctx);
        let meta = out.metadata.unwrap();

        let tomorrow_date = ctx.today() + Duration::days(1);
        let tomorrow_track = meta.per_day.iter().find(|t| t.date == tomorrow_date).unwrap();
        assert_eq!(tomorrow_track.baseline_count, 3);
        assert_eq!(tomorrow_track.attempts_used, 0);
        assert!(tomorrow_track.applied_flex.is_empty());

        let tomorrow_periods: Vec<&Period> = out
            .periods
            .iter()
            .filter(|p| ctx.local_date(p.start()) == tomorrow_date)
            .collect();
        assert_eq!(tomorrow_periods.len(), 3);
        assert!(tomorrow_periods.iter().all(|p| !p.markers.relaxation_active));

        let today_track = meta.per_day.iter().find(|t| t.date == ctx.today()).unwrap();
        assert!(today_track.attempts_used > 0);
        assert_eq!(today_track.state, RelaxationState::Satisfied);
    }

    #[test]
    fn ceiling_attempt_is_tried() {
        // the second valley needs exactly 50%
        let mut prices = vec![3.0; 96];
        for p in &mut prices[8..12] {
            *p = 1.0;
        }
        for p in &mut prices[60..64] {
            *p = 1.5;
        }
        let intervals = make_intervals_from(base_time(), &prices);
        let ctx = ctx_at(base_time());
        let mut cfg = strict_config(2);
        cfg.flex = 0.45;
        let out = run(&intervals, &cfg, &ctx);
        let meta = out.metadata.unwrap();

        assert_eq!(
            meta.phases_used,
            vec!["price_diff_48.0%+level_any", "price_diff_50.0%+level_any"]
        );
        assert!(!meta.relaxation_incomplete);
        assert_eq!(meta.per_day[0].state, RelaxationState::Satisfied);
        assert_eq!(out.periods.len(), 2);
    }

    #[test]
    fn relaxed_evening_joins_satisfied_next_morning() {
        // today: one deep valley plus a shallow last hour; tomorrow opens cheap
        let mut prices = vec![3.0; 96];
        for p in &mut prices[8..12] {
            *p = 1.0;
        }
        for p in &mut prices[92..96] {
            *p = 1.2;
        }
        prices.extend(valley_day(&[(0, 4), (40, 4), (72, 4)]));

        let intervals = make_intervals_from(base_time(), &prices);
        let ctx = ctx_at(base_time());
        let out = run(&intervals, &strict_config(2), &ctx);
        let meta = out.metadata.unwrap();

        assert_eq!(out.periods.len(), 4);
        let joined = &out.periods[1];
        assert_eq!(joined.start(), base_time() + Duration::hours(23));
        assert_eq!(joined.end(), base_time() + Duration::hours(25));
        assert_eq!(joined.len(), 8);
        assert!(joined.markers.relaxation_active);

        let today = meta.per_day.iter().find(|d| d.date == ctx.today()).unwrap();
        assert_eq!(today.state, RelaxationState::Satisfied);
        assert_eq!(today.period_count, 2);
        let tomorrow = meta
            .per_day
            .iter()
            .find(|d| d.date == ctx.today() + Duration::days(1))
            .unwrap();
        assert_eq!(tomorrow.baseline_count, 3);
        assert_eq!(tomorrow.attempts_used, 0);
    }
}
