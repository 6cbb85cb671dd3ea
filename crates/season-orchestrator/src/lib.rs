//! Season planning facade.
//!
//! Takes the raw planning request (season bounds, starting gold and tiles,
//! crop catalog), computes a greedy wealth floor and branching shortlist,
//! runs the full schedule search, and reports whichever schedule came out
//! richer. Unbounded farms and empty wallets are normalised to synthetic
//! values on the way in; seasons that start mid-way are planned on a
//! shortened calendar and shifted back out.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use greedy_planner::greedy_floor_and_shortlist;
use planner_core::{Calendar, Crop, CropBook, EngineConfig, PlannerError, RunParams, Tiles};
use schedule_engine::{SimEngine, SimStats};

/// Stand-in wallet for "unlimited gold" requests; the reported value is the
/// profit over it.
pub const SYNTHETIC_WALLET: f64 = 1e8;

/// Reported value when a run is cut short by the memory ceiling.
pub const MEMORY_EXCEEDED_VALUE: f64 = -2.0;

/// One planning request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    pub season_len: i64,
    /// First plantable day, `1..season_len`.
    pub start_day: i64,
    /// Plantable tiles; zero or negative means unbounded.
    pub tiles: i64,
    /// Starting gold; zero or negative means unlimited (profit mode).
    pub wallet: f64,
    pub crops: Vec<Crop>,
    #[serde(default)]
    pub config: EngineConfig,
}

/// The planner's answer.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub run_id: Uuid,
    /// Final wealth, or profit in unlimited-gold mode, or the
    /// memory-exceeded sentinel.
    pub value: f64,
    pub calendar: Calendar,
    pub greedy_wealth: f64,
    pub sim_wealth: f64,
    pub stats: SimStats,
    pub memory_exceeded: bool,
    pub infinite_gold: bool,
}

#[derive(Debug, Default)]
pub struct SeasonPlanner;

impl SeasonPlanner {
    pub fn new() -> SeasonPlanner {
        SeasonPlanner
    }

    /// Validate, normalise, and plan one season.
    pub async fn plan(&self, request: PlanRequest) -> Result<PlanOutcome, PlannerError> {
        let run_id = Uuid::new_v4();
        validate(&request)?;

        let tiles = if request.tiles <= 0 {
            Tiles::Infinite
        } else {
            Tiles::Finite(request.tiles)
        };
        let infinite_gold = request.wallet <= 0.0;
        let wallet = if infinite_gold {
            SYNTHETIC_WALLET
        } else {
            request.wallet
        };

        // Plan on the shortened calendar; shift back at the end.
        let shift = request.start_day - 1;
        let inner_len = request.season_len - shift;
        let root = Calendar::new(inner_len, wallet, tiles);
        let book = CropBook::new(request.crops.clone());
        let enabled: Vec<Arc<Crop>> = book.enabled().map(Arc::clone).collect();

        info!(
            %run_id,
            season_len = request.season_len,
            start_day = request.start_day,
            wallet,
            tiles = %tiles,
            crops = enabled.len(),
            "planning season"
        );

        let greedy = greedy_floor_and_shortlist(&root, &enabled, &request.config);
        info!(
            %run_id,
            floor = greedy.best_wealth,
            shortlist = greedy.shortlist.len(),
            "greedy floor ready"
        );

        let params = RunParams {
            season_len: inner_len,
            starting_gold: wallet,
            starting_tiles: tiles,
        };
        let engine = SimEngine::new(
            book,
            greedy.shortlist.clone(),
            params,
            request.config.clone(),
        );
        let sim = engine.run(root).await?;

        if sim.stats.aborted {
            warn!(%run_id, "run hit the memory ceiling, reporting the sentinel");
            return Ok(PlanOutcome {
                run_id,
                value: MEMORY_EXCEEDED_VALUE,
                calendar: Calendar::empty(),
                greedy_wealth: greedy.best_wealth,
                sim_wealth: sim.best_wealth,
                stats: sim.stats,
                memory_exceeded: true,
                infinite_gold,
            });
        }

        // Ties favour the greedy schedule.
        let (wealth, calendar) = if greedy.best_wealth >= sim.best_wealth {
            (greedy.best_wealth, greedy.best_calendar)
        } else {
            (sim.best_wealth, sim.best_calendar.clone())
        };

        let value = if infinite_gold {
            wealth - SYNTHETIC_WALLET
        } else {
            wealth
        };
        let calendar = if shift > 0 {
            calendar.shift(shift)
        } else {
            calendar
        };

        info!(
            %run_id,
            value,
            greedy = greedy.best_wealth,
            simulated = sim.best_wealth,
            "season planned"
        );
        Ok(PlanOutcome {
            run_id,
            value,
            calendar,
            greedy_wealth: greedy.best_wealth,
            sim_wealth: sim.best_wealth,
            stats: sim.stats,
            memory_exceeded: false,
            infinite_gold,
        })
    }
}

fn validate(request: &PlanRequest) -> Result<(), PlannerError> {
    if request.season_len < 2 {
        return Err(PlannerError::InvalidInput(format!(
            "season length {} is too short to plan",
            request.season_len
        )));
    }
    if request.start_day < 1 || request.start_day >= request.season_len {
        return Err(PlannerError::InvalidInput(format!(
            "start day {} outside 1..{}",
            request.start_day, request.season_len
        )));
    }
    if !request.crops.iter().any(|c| c.enabled) {
        return Err(PlannerError::InvalidInput(
            "no enabled crops in the catalog".to_string(),
        ));
    }
    for crop in &request.crops {
        if crop.grow_days < 1 {
            return Err(PlannerError::InvalidInput(format!(
                "crop {:?} has a non-positive growing time",
                crop.name
            )));
        }
        if crop.buy_price < 0.0 || crop.sell_price < 0.0 {
            return Err(PlannerError::InvalidInput(format!(
                "crop {:?} has a negative price",
                crop.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
