//! Day-by-day greedy scheduler: on every day of interest, plant the crop
//! with the best per-tile profitability, then jump to the next payday.

use std::sync::Arc;

use planner_core::{plant, Calendar, Crop, EngineConfig, PlantBatch};

/// One finished greedy pass.
#[derive(Debug, Clone)]
pub struct GreedyRun {
    pub calendar: Calendar,
    /// Batches in planting order.
    pub planted: Vec<Arc<PlantBatch>>,
}

impl GreedyRun {
    pub fn wealth(&self) -> f64 {
        self.calendar.wealth()
    }
}

/// Score a candidate planting: total gold the whole planting would bring in
/// over the rest of the season. Non-positive scores are never planted.
fn score(crop: &Crop, day: i64, cal: &Calendar, config: &EngineConfig) -> f64 {
    let state = cal.day(day);
    let units = crop.units_plantable(state.free_tiles, state.wallet);
    if units <= 0 || !crop.worth_planting(day, cal.season_len()) {
        return f64::NEG_INFINITY;
    }
    units as f64 * crop.profit_index(day, cal.season_len(), config.payday_delay)
}

/// Walk the season from day 1, planting the best-scoring crop on each day of
/// interest. In multi-crop mode the day is re-evaluated until no candidate
/// scores positive, so leftover gold and tiles get soaked up by cheaper
/// crops; otherwise one planting per day.
pub fn run_greedy(root: &Calendar, crops: &[Arc<Crop>], config: &EngineConfig) -> GreedyRun {
    let mut cal = root.clone();
    let mut planted = Vec::new();
    let mut day = 1;

    while day <= cal.season_len() {
        loop {
            let best = crops
                .iter()
                .map(|c| (c, score(c, day, &cal, config)))
                .filter(|(_, s)| *s > 0.0)
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            let Some((crop, _)) = best else {
                break;
            };
            let crop = Arc::clone(crop);
            match plant(
                &mut cal,
                day,
                &crop,
                config.payday_delay,
                config.return_tiles_asap,
            ) {
                Some(batch) => planted.push(batch),
                None => break,
            }
            if !config.multi_crop {
                break;
            }
        }
        match cal.next_day_of_interest_after(day) {
            Some(next) if next <= cal.season_len() => day = next,
            _ => break,
        }
    }

    GreedyRun {
        calendar: cal,
        planted,
    }
}
