use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{PriceLevel, PriceRating};

/// One fixed-length price sample, already classified upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub price: f64,
    pub level: PriceLevel,
    pub rating: PriceRating,
    /// Percent difference to the trailing average the rating was derived from.
    #[serde(default)]
    pub rating_difference: Option<f64>,
    #[serde(default)]
    pub smoothed: bool,
    /// Price before outlier smoothing replaced it.
    #[serde(default)]
    pub original_price: Option<f64>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, price: f64, level: PriceLevel, rating: PriceRating) -> Self {
        Self {
            start,
            price,
            level,
            rating,
            rating_difference: None,
            smoothed: false,
            original_price: None,
        }
    }

    pub fn with_rating_difference(mut self, difference: f64) -> Self {
        self.rating_difference = Some(difference);
        self
    }

    /// The price as delivered, ignoring any smoothing.
    pub fn unsmoothed_price(&self) -> f64 {
        self.original_price.unwrap_or(self.price)
    }

    pub fn end(&self, length: Duration) -> DateTime<Utc> {
        self.start + length
    }
}

/// Chronologically sorted interval list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntervalSeries {
    intervals: Vec<Interval>,
}

impl IntervalSeries {
    /// Sorts by start and drops duplicate starts (first occurrence wins).
    pub fn new(mut intervals: Vec<Interval>) -> Self {
        intervals.sort_by_key(|i| i.start);
        intervals.dedup_by_key(|i| i.start);
        Self { intervals }
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Interval> {
        self.intervals.iter()
    }

    pub fn as_slice(&self) -> &[Interval] {
        &self.intervals
    }
}

impl std::ops::Index<usize> for IntervalSeries {
    type Output = Interval;
    fn index(&self, index: usize) -> &Self::Output {
        &self.intervals[index]
    }
}

impl From<Vec<Interval>> for IntervalSeries {
    fn from(intervals: Vec<Interval>) -> Self {
        Self::new(intervals)
    }
}

impl IntoIterator for IntervalSeries {
    type Item = Interval;
    type IntoIter = std::vec::IntoIter<Interval>;
    fn into_iter(self) -> Self::IntoIter {
        self.intervals.into_iter()
    }
}

impl<'a> IntoIterator for &'a IntervalSeries {
    type Item = &'a Interval;
    type IntoIter = std::slice::Iter<'a, Interval>;
    fn into_iter(self) -> Self::IntoIter {
        self.intervals.iter()
    }
}
