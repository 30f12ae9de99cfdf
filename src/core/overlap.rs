use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use tracing::debug;

use crate::core::calendar::TimeContext;
use crate::models::{Period, PeriodInterval};

/// Start and end both within this distance means "same period".
pub const DUPLICATE_TOLERANCE_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// Non-overlapping, sorted by start.
    pub periods: Vec<Period>,
    /// Start of every genuinely new period (a component without any
    /// previously accepted member).
    pub new_period_starts: Vec<DateTime<Utc>>,
    pub duplicates_skipped: usize,
    /// Components that absorbed at least one accepted period.
    pub extensions: usize,
}

impl MergeOutcome {
    pub fn new_count(&self) -> usize {
        self.new_period_starts.len()
    }
}

pub fn is_duplicate(a: &Period, b: &Period) -> bool {
    let tolerance = Duration::seconds(DUPLICATE_TOLERANCE_SECS);
    (a.start() - b.start()).abs() <= tolerance && (a.end() - b.end()).abs() <= tolerance
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // keep the lower index as root for a stable grouping
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

/// Merge `candidates` into `accepted`.
pub fn resolve(accepted: &[Period], candidates: &[Period]) -> MergeOutcome {
    let fresh: Vec<&Period> = candidates
        .iter()
        .filter(|c| !c.is_empty())
        .filter(|c| !accepted.iter().any(|a| is_duplicate(a, c)))
        .collect();
    let duplicates_skipped = candidates.iter().filter(|c| !c.is_empty()).count() - fresh.len();

    // Nodes 0..n_acc are accepted periods, the rest candidates.
    let n_acc = accepted.len();
    let nodes: Vec<&Period> = accepted.iter().chain(fresh.iter().copied()).collect();
    let mut set = DisjointSet::new(nodes.len());

    for c in n_acc..nodes.len() {
        for other in 0..nodes.len() {
            if other != c && nodes[c].overlaps_or_touches(nodes[other]) {
                set.union(c, other);
            }
        }
    }

    let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for idx in 0..nodes.len() {
        let root = set.find(idx);
        components.entry(root).or_default().push(idx);
    }

    let mut periods = Vec::with_capacity(components.len());
    let mut new_period_starts = Vec::new();
    let mut extensions = 0;

    for members in components.values() {
        let has_candidate = members.iter().any(|&m| m >= n_acc);
        if !has_candidate {
            // untouched accepted period
            periods.extend(members.iter().map(|&m| nodes[m].clone()));
            continue;
        }

        let merged = merge_members(members, &nodes, n_acc);
        if members.iter().any(|&m| m < n_acc) {
            extensions += 1;
        } else {
            new_period_starts.push(merged.start());
        }
        periods.push(merged);
    }

    periods.sort_by_key(|p| p.start());

    debug!(
        "Merge: {} accepted + {} candidates -> {} periods ({} new, {} extended, {} duplicates)",
        accepted.len(),
        candidates.len(),
        periods.len(),
        new_period_starts.len(),
        extensions,
        duplicates_skipped
    );

    MergeOutcome {
        periods,
        new_period_starts,
        duplicates_skipped,
        extensions,
    }
}

/// Re-joins periods split at a local day boundary: one ends exactly at
/// local midnight and the next starts there.
pub fn join_at_midnight(periods: Vec<Period>, ctx: &TimeContext) -> Vec<Period> {
    let mut sorted = periods;
    sorted.sort_by_key(|p| p.start());

    let mut joined: Vec<Period> = Vec::with_capacity(sorted.len());
    for period in sorted {
        if let Some(prev) = joined.last_mut() {
            let boundary = period.start();
            if prev.end() == boundary && ctx.start_of_day(ctx.local_date(boundary)) == boundary {
                if period.markers.relaxation_threshold_applied_pct
                    > prev.markers.relaxation_threshold_applied_pct
                {
                    prev.markers.override_from(&period.markers);
                }
                prev.intervals.extend(period.intervals);
                continue;
            }
        }
        joined.push(period);
    }
    joined
}

/// Union of all member intervals; candidates overwrite accepted intervals
/// with the same start. Markers come from the most relaxed member.
fn merge_members(members: &[usize], nodes: &[&Period], n_acc: usize) -> Period {
    let mut intervals: BTreeMap<DateTime<Utc>, PeriodInterval> = BTreeMap::new();
    // accepted first so candidates win on identical starts
    let mut ordered: Vec<usize> = members.to_vec();
    ordered.sort_by_key(|&m| (m >= n_acc, m));
    for &m in &ordered {
        for interval in &nodes[m].intervals {
            intervals.insert(interval.start, interval.clone());
        }
    }

    let winner = ordered
        .iter()
        .copied()
        .max_by(|&a, &b| {
            let pa = nodes[a].markers.relaxation_threshold_applied_pct;
            let pb = nodes[b].markers.relaxation_threshold_applied_pct;
            pa.total_cmp(&pb).then((a >= n_acc).cmp(&(b >= n_acc)))
        })
        .unwrap_or(ordered[0]);

    let mut markers = nodes[ordered[0]].markers.clone();
    markers.override_from(&nodes[winner].markers);

    Period::new(intervals.into_values().collect(), markers)
}
