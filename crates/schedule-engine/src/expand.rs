//! Single-node expansion, shared by the sequential loop and every worker.

use std::sync::Arc;

use planner_core::{plant, Calendar, Crop, EngineConfig, RunParams, Tiles};

use crate::models::FrontierNode;

/// Everything a search loop needs to expand nodes: the branching crop set,
/// the run's starting conditions (the pruning floors are relative to them),
/// and the engine tunables.
#[derive(Debug, Clone)]
pub struct ExpandContext {
    pub config: EngineConfig,
    pub params: RunParams,
    pub shortlist: Vec<Arc<Crop>>,
    cheapest_buy: f64,
}

impl ExpandContext {
    pub fn new(shortlist: Vec<Arc<Crop>>, config: EngineConfig, params: RunParams) -> ExpandContext {
        let cheapest_buy = shortlist
            .iter()
            .map(|c| c.buy_price)
            .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap_or(f64::INFINITY);
        ExpandContext {
            config,
            params,
            shortlist,
            cheapest_buy,
        }
    }

    /// First day from `from` onwards where another planting decision is
    /// worth making. A day qualifies when it can afford the cheapest crop,
    /// has a free tile, and the branch has not burned through the gold and
    /// tile floors that keep the search away from scorched-earth schedules.
    pub fn next_decision_day(&self, cal: &Calendar, from: i64) -> Option<i64> {
        let gold_floor = self.params.starting_gold * self.config.gold_floor_fraction;
        let tile_floor = match self.params.starting_tiles {
            Tiles::Finite(n) => Some(n as f64 * self.config.tile_floor_fraction),
            Tiles::Infinite => None,
        };
        for day in from.max(1)..=cal.season_len() {
            let state = cal.day(day);
            if state.wallet < self.cheapest_buy {
                continue;
            }
            if state.wallet < gold_floor {
                continue;
            }
            match state.free_tiles {
                Tiles::Infinite => {}
                Tiles::Finite(free) => {
                    if free <= 0 {
                        continue;
                    }
                    if let Some(floor) = tile_floor {
                        if (free as f64) <= floor {
                            continue;
                        }
                    }
                }
            }
            return Some(day);
        }
        None
    }
}

/// Successors and finished schedules produced by one expansion.
#[derive(Debug, Default)]
pub struct Expansion {
    pub successors: Vec<FrontierNode>,
    pub leaves: Vec<Calendar>,
}

/// Branch a node over the shortlist, one successor per crop.
///
/// A plantable crop yields one successor (re-entering the same day in
/// multi-crop mode, the next admissible day otherwise); a branch with no
/// admissible follow-up day is a finished schedule and surfaces as a leaf.
/// A crop that cannot be planted here leaves the calendar untouched, so its
/// successor resumes at the next admissible day; those no-op branches are
/// all identical and only the first is kept.
pub fn expand(node: &FrontierNode, ctx: &ExpandContext) -> Expansion {
    let mut out = Expansion::default();
    let delta = ctx.config.payday_delay;
    let release_asap = ctx.config.return_tiles_asap;
    let mut noop_emitted = false;

    for crop in &ctx.shortlist {
        let mut cal = node.calendar.clone();
        if plant(&mut cal, node.day, crop, delta, release_asap).is_none() {
            // Nothing was planted, so `cal` is still the input calendar.
            if noop_emitted {
                continue;
            }
            noop_emitted = true;
            match ctx.next_decision_day(&cal, node.day + 1) {
                Some(day) => out.successors.push(FrontierNode { day, calendar: cal }),
                None => out.leaves.push(cal),
            }
            continue;
        }
        let from = if ctx.config.multi_crop {
            node.day
        } else {
            node.day + 1
        };
        match ctx.next_decision_day(&cal, from) {
            Some(day) => out.successors.push(FrontierNode { day, calendar: cal }),
            None => out.leaves.push(cal),
        }
    }

    out
}
