//! The planting transition: applying one crop choice to a calendar and
//! propagating its costs, occupancy and paydays through the season suffix.

use std::sync::Arc;

use tracing::warn;

use crate::calendar::{Calendar, PlantBatch};
use crate::crop::Crop;

/// Wallets saturate here instead of running away on degenerate inputs.
const WALLET_CEILING: f64 = 1e15;

/// Plant as many units of `crop` as the state on `day` affords.
///
/// Returns the batch that was planted, or `None` when nothing could be
/// (no gold, no tiles, nothing would mature, or a lone harvest priced at a
/// loss). On success the whole suffix `[day, season_len + 1]` is updated:
/// the purchase is debited, tiles are held while the batch occupies them,
/// every payday is credited, and the affected days are flagged as days of
/// interest.
///
/// `release_on_harvest` picks the tile-release policy for single-harvest
/// crops: tiles free up the day the harvest comes in, or only once the sale
/// settles `payday_delay` days later.
pub fn plant(
    cal: &mut Calendar,
    day: i64,
    crop: &Arc<Crop>,
    payday_delay: i64,
    release_on_harvest: bool,
) -> Option<Arc<PlantBatch>> {
    let season_len = cal.season_len();
    if !crop.worth_planting(day, season_len) {
        return None;
    }
    let state = cal.day(day);
    let units = crop.units_plantable(state.free_tiles, state.wallet);
    if units <= 0 {
        return None;
    }

    let id = cal.alloc_batch_id();
    let batch = Arc::new(PlantBatch::new(
        id,
        Arc::clone(crop),
        units,
        day,
        season_len,
    ));
    let cost = units as f64 * crop.buy_price;
    let revenue = units as f64 * crop.sell_price;
    let last = cal.last_day();
    let last_occupied = batch.last_occupied_day(payday_delay, release_on_harvest);

    for j in day..=last {
        let s = cal.day_mut(j);
        s.wallet -= cost;
        if j <= last_occupied {
            s.free_tiles = s.free_tiles.take(units);
            s.plants.push(Arc::clone(&batch));
        }
    }

    for payday in batch.paydays(payday_delay) {
        for j in payday..=last {
            let s = cal.day_mut(j);
            let before = s.wallet;
            s.wallet += revenue;
            if s.wallet > WALLET_CEILING {
                if before <= WALLET_CEILING {
                    warn!(
                        crop = %crop.name,
                        day = j,
                        "wallet saturated at ceiling, clamping"
                    );
                }
                s.wallet = WALLET_CEILING;
            }
        }
        cal.day_mut(payday).day_of_interest = true;
    }

    cal.day_mut(day).day_of_interest = true;
    if let Some(release) = batch.release_day(payday_delay, release_on_harvest) {
        if release <= last {
            cal.day_mut(release).day_of_interest = true;
        }
    }

    Some(batch)
}
