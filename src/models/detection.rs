use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::PeriodConfig;
use crate::models::{PeriodMode, PeriodSummary};

/// Per-day relaxation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "attempt")]
pub enum RelaxationState {
    Baseline,
    Relaxing(u32),
    Satisfied,
    Exhausted,
}

impl RelaxationState {
    pub fn is_final(&self) -> bool {
        matches!(self, RelaxationState::Satisfied | RelaxationState::Exhausted)
    }
}

impl fmt::Display for RelaxationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelaxationState::Baseline => write!(f, "baseline"),
            RelaxationState::Relaxing(n) => write!(f, "relaxing({})", n),
            RelaxationState::Satisfied => write!(f, "satisfied"),
            RelaxationState::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// How relaxation went for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayRelaxation {
    pub date: NaiveDate,
    pub baseline_count: usize,
    pub period_count: usize,
    pub attempts_used: u32,
    /// Flex ratios tried for this day, in order.
    pub applied_flex: Vec<f64>,
    pub state: RelaxationState,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RelaxationMetadata {
    pub relaxation_active: bool,
    pub relaxation_attempted: bool,
    pub min_periods_requested: usize,
    pub periods_found: usize,
    pub phases_used: Vec<String>,
    pub days_processed: usize,
    pub days_meeting_requirement: usize,
    pub relaxation_incomplete: bool,
    pub per_day: Vec<DayRelaxation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionMetadata {
    pub mode: PeriodMode,
    pub total_periods: usize,
    /// Configuration after clamping.
    pub config: PeriodConfig,
    pub reference_prices: BTreeMap<NaiveDate, f64>,
    pub average_prices: BTreeMap<NaiveDate, f64>,
}

/// Output of one detection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodDetection {
    pub periods: Vec<PeriodSummary>,
    pub metadata: DetectionMetadata,
    /// Absent when there was nothing to relax over.
    pub relaxation: Option<RelaxationMetadata>,
}

impl PeriodDetection {
    pub fn empty(mode: PeriodMode, config: PeriodConfig) -> Self {
        Self {
            periods: Vec::new(),
            metadata: DetectionMetadata {
                mode,
                total_periods: 0,
                config,
                reference_prices: BTreeMap::new(),
                average_prices: BTreeMap::new(),
            },
            relaxation: None,
        }
    }
}

/// Best-price and peak-price results side by side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceWindows {
    pub best: PeriodDetection,
    pub peak: PeriodDetection,
}
