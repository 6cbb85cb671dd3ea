//! Shared search types: frontier nodes, run statistics and outcomes.

use planner_core::Calendar;

/// One unexpanded search node: a calendar waiting for a decision on `day`.
#[derive(Debug, Clone)]
pub struct FrontierNode {
    pub day: i64,
    pub calendar: Calendar,
}

/// How frontier work is spread over the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Expand in-line on the driving task.
    Sequential,
    /// Slice the frontier and expand one level per dispatch.
    Shallow,
    /// Hand each node's whole subtree to one worker.
    Deep,
}

/// Counters accumulated over a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimStats {
    pub nodes_expanded: u64,
    pub cache_hits: u64,
    pub leaves_seen: u64,
    pub subtrees_dispatched: u64,
    pub worker_faults: u64,
    /// The memory monitor tripped and the run returned early.
    pub aborted: bool,
}

impl SimStats {
    pub fn merge(&mut self, other: &SimStats) {
        self.nodes_expanded += other.nodes_expanded;
        self.cache_hits += other.cache_hits;
        self.leaves_seen += other.leaves_seen;
        self.subtrees_dispatched += other.subtrees_dispatched;
        self.worker_faults += other.worker_faults;
        self.aborted |= other.aborted;
    }
}

/// Result of a finished (or aborted) search.
#[derive(Debug, Clone)]
pub struct SimOutcome {
    pub best_wealth: f64,
    pub best_calendar: Calendar,
    pub stats: SimStats,
}

/// Two-level cost estimate for longest-processing-time-first dispatch.
///
/// Primary: how many decision points the subtree still has. Secondary: how
/// early those points sit in the season (earlier days leave more room to
/// branch). Heavier subtrees go out first so the tail of a dispatch round
/// does not dominate the wall clock.
pub fn subtree_cost(node: &FrontierNode) -> (u64, u64) {
    let season_len = node.calendar.season_len();
    let mut count = 0u64;
    let mut weight = 0u64;
    for day in node.calendar.days_of_interest_from(node.day) {
        count += 1;
        weight += (season_len - day + 1).max(0) as u64;
    }
    (count, weight)
}
