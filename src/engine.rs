use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::core::calendar::TimeContext;
use crate::core::post_process::summarize;
use crate::core::reference::{daily_references, day_stats};
use crate::core::relaxation::{DetectionPass, RelaxationEngine};
use crate::error::ConfigError;
use crate::models::{DetectionMetadata, IntervalSeries, PeriodDetection, PeriodMode, PriceWindows};

/// Stateless period detector. Every call recomputes from its inputs.
pub struct PeriodEngine {
    config: EngineConfig,
    tz: Tz,
}

impl PeriodEngine {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let tz = config.tz()?;
        Ok(Self { config, tz })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Time context for `now` in the configured zone.
    pub fn context(&self, now: DateTime<Utc>) -> TimeContext {
        TimeContext::new(now, self.tz)
    }

    pub fn detect(&self, intervals: &IntervalSeries, mode: PeriodMode, ctx: &TimeContext) -> PeriodDetection {
        let period_config = self.config.period(mode).normalized();
        if intervals.is_empty() {
            debug!("{}: no intervals, nothing to detect", mode);
            return PeriodDetection::empty(mode, period_config);
        }

        let stats = day_stats(intervals.as_slice(), ctx);
        let references = daily_references(&stats, mode);

        let pass = DetectionPass {
            intervals: intervals.as_slice(),
            references: &references,
            mode,
            config: &period_config,
            interval_minutes: self.config.interval_minutes,
            ctx,
        };
        let outcome = RelaxationEngine::new(pass).run();

        let periods = summarize(
            &outcome.periods,
            &self.config.rating_thresholds,
            &self.config.volatility_thresholds,
            ctx,
        );

        info!(
            "{}: {} periods over {} intervals ({} days)",
            mode,
            periods.len(),
            intervals.len(),
            references.len()
        );

        let reference_prices: BTreeMap<NaiveDate, f64> =
            references.iter().map(|(d, r)| (*d, r.reference)).collect();
        let average_prices: BTreeMap<NaiveDate, f64> =
            references.iter().map(|(d, r)| (*d, r.average)).collect();

        PeriodDetection {
            metadata: DetectionMetadata {
                mode,
                total_periods: periods.len(),
                config: period_config,
                reference_prices,
                average_prices,
            },
            periods,
            relaxation: outcome.metadata,
        }
    }

    /// Best-price and peak-price detection over the same input.
    pub fn detect_all(&self, intervals: &IntervalSeries, ctx: &TimeContext) -> PriceWindows {
        PriceWindows {
            best: self.detect(intervals, PeriodMode::Cheapest, ctx),
            peak: self.detect(intervals, PeriodMode::MostExpensive, ctx),
        }
    }
}

/// Caller-owned memo of the last result per mode.
///
/// The key covers the interval data, the mode's configuration and the
/// local date of `now`. Position counters (`periods_remaining`) are not
/// refreshed within a day; call [`DetectionCache::invalidate`] when they
/// must be.
#[derive(Debug, Default)]
pub struct DetectionCache {
    entries: HashMap<PeriodMode, (u64, PeriodDetection)>,
}

impl DetectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_detect(
        &mut self,
        engine: &PeriodEngine,
        intervals: &IntervalSeries,
        mode: PeriodMode,
        ctx: &TimeContext,
    ) -> PeriodDetection {
        let key = cache_key(engine, intervals, mode, ctx);
        if let Some((cached_key, detection)) = self.entries.get(&mode) {
            if *cached_key == key {
                debug!("{}: cache hit", mode);
                return detection.clone();
            }
        }
        let detection = engine.detect(intervals, mode, ctx);
        self.entries.insert(mode, (key, detection.clone()));
        detection
    }

    pub fn invalidate(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn cache_key(engine: &PeriodEngine, intervals: &IntervalSeries, mode: PeriodMode, ctx: &TimeContext) -> u64 {
    let mut hasher = DefaultHasher::new();
    mode.hash(&mut hasher);
    ctx.today().hash(&mut hasher);
    for interval in intervals.iter() {
        interval.start.hash(&mut hasher);
        interval.price.to_bits().hash(&mut hasher);
        interval.level.hash(&mut hasher);
        interval.rating.hash(&mut hasher);
        interval.rating_difference.map(f64::to_bits).hash(&mut hasher);
    }
    serde_json::to_string(&engine.config.period(mode).normalized())
        .unwrap_or_default()
        .hash(&mut hasher);
    engine.config.interval_minutes.hash(&mut hasher);
    hasher.finish()
}
