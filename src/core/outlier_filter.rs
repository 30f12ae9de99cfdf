use tracing::debug;

use crate::core::calendar::TimeContext;
use crate::core::reference::day_stats;
use crate::core::statistics::{direction_reversals, linear_fit, mean, std_dev};
use crate::models::Interval;

/// Spike detection never runs wider than this, whatever the period flex.
pub const MAX_OUTLIER_FLEX: f64 = 0.25;

/// Neighbours required on each side of a candidate.
const CONTEXT_SIDE: usize = 3;
/// Future intervals needed to judge whether the context is stable.
const TAIL_WINDOW: usize = 6;
/// Residual must exceed this many context standard deviations.
const SPIKE_SIGMA: f64 = 2.0;
const SYMMETRY_SIGMA: f64 = 1.5;
const ZIGZAG_HALF_WINDOW: usize = 2;
const ZIGZAG_MAX_REL_STD: f64 = 0.15;
const ZIGZAG_MAX_REVERSALS: usize = 2;
/// Local window std may not exceed this multiple of the surrounding std.
const CLUSTER_VOLATILITY_RATIO: f64 = 2.0;
const SURROUNDING_SIDE: usize = 6;
/// Within 0.1% of a daily extreme counts as the extreme.
const EXTREME_TOLERANCE: f64 = 0.001;
const MIN_STD: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Verdict {
    Smooth(f64),
    NoSpike,
    Protected,
    NotEnoughContext,
    UnstableContext,
    Asymmetric,
    Volatile,
}

pub struct OutlierFilter {
    flex: f64,
}

impl OutlierFilter {
    /// `flex` is the period flex; it is capped at [`MAX_OUTLIER_FLEX`].
    pub fn new(flex: f64) -> Self {
        let flex = if flex.is_finite() { flex.abs() } else { MAX_OUTLIER_FLEX };
        Self {
            flex: flex.min(MAX_OUTLIER_FLEX),
        }
    }

    pub fn flex(&self) -> f64 {
        self.flex
    }

    /// Returns a same-length copy with isolated spikes replaced.
    ///
    /// Every decision is made against the unmodified input, so smoothing one
    /// interval never influences the verdict for its neighbour.
    pub fn smooth(&self, intervals: &[Interval], ctx: &TimeContext) -> Vec<Interval> {
        let stats = day_stats(intervals, ctx);
        let prices: Vec<f64> = intervals.iter().map(|i| i.unsmoothed_price()).collect();

        let mut out = intervals.to_vec();
        let mut smoothed = 0usize;

        for (idx, interval) in intervals.iter().enumerate() {
            let protected = stats
                .get(&ctx.local_date(interval.start))
                .map(|s| is_near(prices[idx], s.min) || is_near(prices[idx], s.max))
                .unwrap_or(false);

            match self.evaluate(&prices, idx, protected) {
                Verdict::Smooth(predicted) => {
                    debug!(
                        "Smoothing spike at {}: {:.4} -> {:.4}",
                        interval.start, prices[idx], predicted
                    );
                    let target = &mut out[idx];
                    target.original_price = Some(prices[idx]);
                    target.price = predicted;
                    target.smoothed = true;
                    smoothed += 1;
                }
                Verdict::Protected => {}
                other => {
                    if other != Verdict::NoSpike && other != Verdict::NotEnoughContext {
                        debug!("Spike candidate at {} kept: {:?}", interval.start, other);
                    }
                }
            }
        }

        if smoothed > 0 {
            debug!(
                "Outlier filter smoothed {} of {} intervals (flex {:.1}%)",
                smoothed,
                intervals.len(),
                self.flex * 100.0
            );
        }
        out
    }

    fn evaluate(&self, prices: &[f64], idx: usize, protected: bool) -> Verdict {
        let price = prices[idx];
        if !price.is_finite() {
            return Verdict::NotEnoughContext;
        }
        if idx < CONTEXT_SIDE || idx + CONTEXT_SIDE >= prices.len() {
            return Verdict::NotEnoughContext;
        }

        let before = &prices[idx - CONTEXT_SIDE..idx];
        let after = &prices[idx + 1..=idx + CONTEXT_SIDE];
        if before.iter().chain(after).any(|p| !p.is_finite()) {
            return Verdict::NotEnoughContext;
        }

        let points: Vec<(f64, f64)> = before
            .iter()
            .enumerate()
            .map(|(k, &p)| (k as f64 - CONTEXT_SIDE as f64, p))
            .chain(after.iter().enumerate().map(|(k, &p)| ((k + 1) as f64, p)))
            .collect();
        let context: Vec<f64> = points.iter().map(|p| p.1).collect();

        let (_, predicted) = match linear_fit(&points) {
            Some(fit) => fit,
            None => return Verdict::NotEnoughContext,
        };
        let context_std = std_dev(&context).unwrap_or(0.0);
        let residual = (price - predicted).abs();
        if residual <= SPIKE_SIGMA * context_std.max(MIN_STD) {
            return Verdict::NoSpike;
        }

        if protected {
            return Verdict::Protected;
        }

        // Stability: without a full tail window the whole check is skipped.
        let future = prices.len() - idx - 1;
        if future < TAIL_WINDOW {
            return Verdict::NotEnoughContext;
        }
        let tail = &prices[idx + 1..=idx + TAIL_WINDOW];
        if tail.iter().any(|p| !p.is_finite()) {
            return Verdict::NotEnoughContext;
        }
        let before_mean = mean(before).unwrap_or(0.0);
        let tail_mean = mean(tail).unwrap_or(0.0);
        if (tail_mean - before_mean).abs() / before_mean.abs().max(MIN_STD) > self.flex {
            return Verdict::UnstableContext;
        }

        let after_mean = mean(after).unwrap_or(0.0);
        if (before_mean - after_mean).abs() > SYMMETRY_SIGMA * context_std {
            return Verdict::Asymmetric;
        }

        if self.is_volatile(prices, idx, predicted) {
            return Verdict::Volatile;
        }

        Verdict::Smooth(predicted)
    }

    /// Zigzag / cluster check on the five-interval window around `idx`, with
    /// the candidate replaced by its prediction.
    fn is_volatile(&self, prices: &[f64], idx: usize, predicted: f64) -> bool {
        let window: Vec<f64> = (idx - ZIGZAG_HALF_WINDOW..=idx + ZIGZAG_HALF_WINDOW)
            .map(|j| if j == idx { predicted } else { prices[j] })
            .collect();

        let window_mean = mean(&window).unwrap_or(0.0);
        let window_std = std_dev(&window).unwrap_or(0.0);
        if window_std / window_mean.abs().max(MIN_STD) > ZIGZAG_MAX_REL_STD {
            return true;
        }
        if direction_reversals(&window) > ZIGZAG_MAX_REVERSALS {
            return true;
        }

        let lo = idx.saturating_sub(SURROUNDING_SIDE);
        let hi = (idx + SURROUNDING_SIDE).min(prices.len() - 1);
        let surrounding: Vec<f64> = (lo..=hi)
            .filter(|&j| j != idx && prices[j].is_finite())
            .map(|j| prices[j])
            .collect();
        let surrounding_std = std_dev(&surrounding).unwrap_or(0.0);
        window_std > CLUSTER_VOLATILITY_RATIO * surrounding_std.max(MIN_STD)
    }
}

fn is_near(price: f64, extreme: f64) -> bool {
    (price - extreme).abs() <= extreme.abs() * EXTREME_TOLERANCE
}
