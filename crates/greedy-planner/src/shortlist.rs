//! Crop-stripping outer loops around the greedy pass.
//!
//! Re-running the greedy scheduler with its favourite crops removed explores
//! the parts of the catalog a single pass would shadow. Two removal orders
//! are used: stripping only the day-1 pick each round, and stripping every
//! crop the previous round planted. The best pass over both orders is the
//! wealth floor the full search has to beat, and the visit order of the
//! second gives the small crop set the search is allowed to branch over.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use planner_core::{Calendar, Crop, EngineConfig, Tiles};

use crate::ppi::{run_greedy, GreedyRun};

/// Floor and branching set handed to the full search.
#[derive(Debug, Clone)]
pub struct GreedyResult {
    pub best_wealth: f64,
    pub best_calendar: Calendar,
    pub shortlist: Vec<Arc<Crop>>,
}

/// How many crop types the search may branch over, from the tile-to-gold
/// ratio of the starting conditions. Gold-limited farms can afford wide
/// branching; tile-rich farms explode combinatorially and get clamped.
pub fn shortlist_cap(tiles: Tiles, wallet: f64, ceiling: usize) -> usize {
    let cap = match tiles {
        Tiles::Infinite => 5,
        Tiles::Finite(n) => {
            let ratio = n as f64 / wallet.max(1.0);
            if ratio <= 0.1 {
                5
            } else if ratio <= 0.2 {
                4
            } else if ratio <= 0.4 {
                3
            } else {
                2
            }
        }
    };
    cap.min(ceiling).max(1)
}

fn remaining(crops: &[Arc<Crop>], stripped: &HashSet<String>) -> Vec<Arc<Crop>> {
    crops
        .iter()
        .filter(|c| !stripped.contains(&c.name))
        .map(Arc::clone)
        .collect()
}

fn better(best: &mut Option<GreedyRun>, candidate: GreedyRun) {
    let replace = match best {
        // Ties keep the earlier pass.
        Some(current) => candidate.wealth() > current.wealth(),
        None => true,
    };
    if replace {
        *best = Some(candidate);
    }
}

/// Run both stripping loops and assemble the floor and the shortlist.
pub fn greedy_floor_and_shortlist(
    root: &Calendar,
    crops: &[Arc<Crop>],
    config: &EngineConfig,
) -> GreedyResult {
    let mut best: Option<GreedyRun> = None;

    // Strip the day-1 favourite each round: uncovers schedules where the
    // headline crop crowds out a better season.
    let mut stripped: HashSet<String> = HashSet::new();
    loop {
        let candidates = remaining(crops, &stripped);
        if candidates.is_empty() {
            break;
        }
        let run = run_greedy(root, &candidates, config);
        let day1 = run
            .planted
            .iter()
            .find(|b| b.plant_day == 1)
            .map(|b| b.crop.name.clone());
        better(&mut best, run);
        match day1 {
            Some(name) => {
                stripped.insert(name);
            }
            None => break,
        }
    }

    // Strip everything the previous round touched: sweeps the catalog in
    // bands and yields the visit order for the shortlist.
    let mut visit_order: Vec<Arc<Crop>> = Vec::new();
    let mut stripped: HashSet<String> = HashSet::new();
    loop {
        let candidates = remaining(crops, &stripped);
        if candidates.is_empty() {
            break;
        }
        let run = run_greedy(root, &candidates, config);
        if run.planted.is_empty() {
            break;
        }
        for batch in &run.planted {
            if !visit_order.iter().any(|c| c.name == batch.crop.name) {
                visit_order.push(Arc::clone(&batch.crop));
            }
            stripped.insert(batch.crop.name.clone());
        }
        better(&mut best, run);
    }

    let start = root.day(1);
    let cap = shortlist_cap(start.free_tiles, start.wallet, config.max_num_crop_types);
    visit_order.truncate(cap);

    let (best_wealth, best_calendar) = match best {
        Some(run) => (run.wealth(), run.calendar),
        None => (root.wealth(), root.clone()),
    };
    debug!(
        floor = best_wealth,
        shortlist = visit_order.len(),
        "greedy floor computed"
    );

    GreedyResult {
        best_wealth,
        best_calendar,
        shortlist: visit_order,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crop(name: &str, buy: f64, sell: f64, grow: i64, regrow: i64) -> Arc<Crop> {
        Arc::new(Crop {
            name: name.to_string(),
            buy_price: buy,
            sell_price: sell,
            grow_days: grow,
            regrow_days: regrow,
            season: "spring".to_string(),
            second_season: None,
            enabled: true,
        })
    }

    fn classic_crops() -> Vec<Arc<Crop>> {
        vec![
            crop("blueberry", 80.0, 150.0, 13, 4),
            crop("hot pepper", 40.0, 40.0, 5, 3),
            crop("melon", 80.0, 250.0, 12, 0),
            crop("hops", 60.0, 25.0, 11, 1),
            crop("tomato", 50.0, 60.0, 11, 4),
            crop("radish", 40.0, 90.0, 6, 0),
            crop("starfruit", 400.0, 750.0, 13, 0),
        ]
    }

    #[test]
    fn test_cap_follows_tile_to_gold_ratio() {
        assert_eq!(shortlist_cap(Tiles::Finite(100), 5000.0, 5), 5); // 0.02
        assert_eq!(shortlist_cap(Tiles::Finite(500), 5000.0, 5), 5); // 0.1
        assert_eq!(shortlist_cap(Tiles::Finite(1000), 5000.0, 5), 4); // 0.2
        assert_eq!(shortlist_cap(Tiles::Finite(1500), 5000.0, 5), 3); // 0.3
        assert_eq!(shortlist_cap(Tiles::Finite(2500), 5000.0, 5), 2); // 0.5
        assert_eq!(shortlist_cap(Tiles::Infinite, 5000.0, 5), 5);
    }

    #[test]
    fn test_cap_respects_ceiling() {
        assert_eq!(shortlist_cap(Tiles::Finite(100), 5000.0, 3), 3);
        assert_eq!(shortlist_cap(Tiles::Finite(2500), 5000.0, 1), 1);
    }

    #[test]
    fn test_shortlist_starts_with_greedy_favourite() {
        let root = Calendar::new(28, 5000.0, Tiles::Finite(100));
        let result = greedy_floor_and_shortlist(&root, &classic_crops(), &EngineConfig::default());
        assert!(!result.shortlist.is_empty());
        assert_eq!(result.shortlist[0].name, "blueberry");
        assert!(result.shortlist.len() <= 5);
        // Distinct entries only.
        let mut names: Vec<&str> = result.shortlist.iter().map(|c| c.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), result.shortlist.len());
    }

    #[test]
    fn test_floor_beats_or_matches_plain_pass() {
        let root = Calendar::new(28, 5000.0, Tiles::Finite(100));
        let config = EngineConfig::default();
        let plain = run_greedy(&root, &classic_crops(), &config);
        let result = greedy_floor_and_shortlist(&root, &classic_crops(), &config);
        assert!(result.best_wealth >= plain.wealth());
        result.best_calendar.validate(0, false).unwrap();
    }

    #[test]
    fn test_empty_catalog_returns_root() {
        let root = Calendar::new(28, 5000.0, Tiles::Finite(100));
        let result = greedy_floor_and_shortlist(&root, &[], &EngineConfig::default());
        assert_eq!(result.best_wealth, 5000.0);
        assert!(result.shortlist.is_empty());
    }
}
