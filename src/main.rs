use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use price_periods::config::EngineConfig;
use price_periods::engine::PeriodEngine;
use price_periods::models::{Interval, IntervalSeries};

fn main() -> Result<()> {
    let cfg = EngineConfig::from_env()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    // Usage: price-periods <intervals.json> [now as RFC 3339]
    let args: Vec<String> = std::env::args().collect();
    let path = match args.get(1) {
        Some(p) => p,
        None => bail!("usage: price-periods <intervals.json> [now]"),
    };
    let now: DateTime<Utc> = match args.get(2) {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("invalid timestamp {:?}", raw))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
    let intervals: Vec<Interval> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path))?;
    let series = IntervalSeries::new(intervals);

    info!(
        "Detecting periods over {} intervals ({} zone, now {})",
        series.len(),
        cfg.timezone,
        now
    );

    let engine = PeriodEngine::new(cfg)?;
    let ctx = engine.context(now);
    let windows = engine.detect_all(&series, &ctx);

    println!("{}", serde_json::to_string_pretty(&windows)?);
    Ok(())
}
