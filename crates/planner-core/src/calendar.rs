//! Season calendar: per-day farm state, shared plant batches, and the
//! whole-season bookkeeping the planners mutate and compare.

use std::collections::HashMap;
use std::sync::Arc;

use crate::crop::{Crop, Tiles};

/// A single planting action: `count` tiles of one crop planted on one day.
///
/// Batches are immutable once constructed and shared by reference between
/// day states and calendar clones. The id only has to be unique within one
/// calendar; it exists so a planting sequence can be reconstructed.
#[derive(Debug)]
pub struct PlantBatch {
    pub id: u64,
    pub crop: Arc<Crop>,
    pub count: i64,
    pub plant_day: i64,
    /// Season length the batch was planted under; harvest days derive from it.
    pub num_days: i64,
    /// Cached harvest-day set, ordered, clipped to the season.
    pub harvest_days: Vec<i64>,
}

impl PlantBatch {
    pub fn new(id: u64, crop: Arc<Crop>, count: i64, plant_day: i64, num_days: i64) -> PlantBatch {
        let harvest_days = crop.harvest_days(plant_day, num_days);
        PlantBatch {
            id,
            crop,
            count,
            plant_day,
            num_days,
            harvest_days,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.crop.is_persistent(self.num_days)
    }

    /// Days the wallet is credited, clipped to the terminal accounting day.
    pub fn paydays(&self, payday_delay: i64) -> Vec<i64> {
        self.harvest_days
            .iter()
            .map(|h| h + payday_delay)
            .filter(|p| *p <= self.num_days + 1)
            .collect()
    }

    /// Day the tiles come back to the free pool, for single-harvest batches.
    /// Persistent batches hold their tiles through the end of the season.
    pub fn release_day(&self, payday_delay: i64, release_on_harvest: bool) -> Option<i64> {
        if self.is_persistent() {
            return None;
        }
        let first = *self.harvest_days.first()?;
        Some(if release_on_harvest {
            first
        } else {
            first + payday_delay
        })
    }

    /// Last day this batch still occupies its tiles.
    pub fn last_occupied_day(&self, payday_delay: i64, release_on_harvest: bool) -> i64 {
        match self.release_day(payday_delay, release_on_harvest) {
            Some(release) => (release - 1).min(self.num_days + 1),
            None => self.num_days + 1,
        }
    }

    pub fn occupies(&self, day: i64, payday_delay: i64, release_on_harvest: bool) -> bool {
        day >= self.plant_day && day <= self.last_occupied_day(payday_delay, release_on_harvest)
    }

    /// Wire form: `name;count;plant_day;num_days`.
    pub fn to_wire(&self) -> String {
        format!(
            "{};{};{};{}",
            self.crop.name, self.count, self.plant_day, self.num_days
        )
    }
}

/// Farm state for a single day: gold on hand, free tiles, and the batches
/// occupying tiles that day. `day_of_interest` marks days where the wallet
/// or the tile count moves; the planners only ever make decisions there.
#[derive(Debug, Clone)]
pub struct DayState {
    pub wallet: f64,
    pub free_tiles: Tiles,
    pub plants: Vec<Arc<PlantBatch>>,
    pub day_of_interest: bool,
}

impl DayState {
    pub fn new(wallet: f64, free_tiles: Tiles) -> DayState {
        DayState {
            wallet,
            free_tiles,
            plants: Vec::new(),
            day_of_interest: false,
        }
    }

    fn blank() -> DayState {
        DayState::new(0.0, Tiles::Finite(0))
    }
}

/// A whole season of day states, days `1..=season_len + 1`.
///
/// The day past the season end is kept explicitly: a harvest on the last day
/// pays there when the payday delay is 1, and the season's final wealth is
/// read from it.
///
/// Day states are stored behind `Arc` so cloning a calendar is cheap and a
/// mutation at day `d` only materialises private copies of the days it
/// touches; the untouched prefix stays shared with the parent calendar.
#[derive(Debug, Clone)]
pub struct Calendar {
    season_len: i64,
    /// Index 0 is unused; days are 1-based.
    days: Vec<Arc<DayState>>,
    next_batch_id: u64,
}

impl Calendar {
    pub fn new(season_len: i64, wallet: f64, free_tiles: Tiles) -> Calendar {
        debug_assert!(season_len >= 1);
        let template = Arc::new(DayState::new(wallet, free_tiles));
        let mut days = vec![Arc::new(DayState::blank())];
        for _ in 1..=season_len {
            days.push(Arc::clone(&template));
        }
        // Terminal accounting day: always a day of interest.
        let mut last = DayState::new(wallet, free_tiles);
        last.day_of_interest = true;
        days.push(Arc::new(last));
        Calendar {
            season_len,
            days,
            next_batch_id: 0,
        }
    }

    /// The sentinel calendar returned when a run fails softly.
    pub fn empty() -> Calendar {
        Calendar {
            season_len: 0,
            days: Vec::new(),
            next_batch_id: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn season_len(&self) -> i64 {
        self.season_len
    }

    /// The terminal accounting day, `season_len + 1`.
    pub fn last_day(&self) -> i64 {
        self.season_len + 1
    }

    pub fn day(&self, day: i64) -> &DayState {
        &self.days[day as usize]
    }

    /// Mutable view of one day; materialises a private copy if the day is
    /// still shared with another calendar.
    pub fn day_mut(&mut self, day: i64) -> &mut DayState {
        Arc::make_mut(&mut self.days[day as usize])
    }

    pub fn alloc_batch_id(&mut self) -> u64 {
        let id = self.next_batch_id;
        self.next_batch_id += 1;
        id
    }

    /// Final wealth: gold on hand on the terminal accounting day.
    pub fn wealth(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.day(self.last_day()).wallet
    }

    pub fn days_of_interest_from(&self, from_day: i64) -> Vec<i64> {
        (from_day.max(1)..=self.last_day())
            .filter(|d| self.day(*d).day_of_interest)
            .collect()
    }

    pub fn next_day_of_interest_after(&self, day: i64) -> Option<i64> {
        ((day + 1)..=self.last_day()).find(|d| self.day(*d).day_of_interest)
    }

    /// Every batch in the calendar, deduplicated, in planting order.
    pub fn batches(&self) -> Vec<Arc<PlantBatch>> {
        let mut seen: HashMap<u64, Arc<PlantBatch>> = HashMap::new();
        for day in 1..self.days.len() {
            for batch in &self.days[day].plants {
                seen.entry(batch.id).or_insert_with(|| Arc::clone(batch));
            }
        }
        let mut all: Vec<Arc<PlantBatch>> = seen.into_values().collect();
        all.sort_by_key(|b| (b.plant_day, b.id));
        all
    }

    /// Earliest day with a planting, if any.
    pub fn first_planted_day(&self) -> Option<i64> {
        self.batches().first().map(|b| b.plant_day)
    }

    /// Shift the whole calendar forward by `shift` days: the state at `d`
    /// moves to `d + shift`, batch plant days and season lengths move with
    /// it, and the vacated leading days are left blank. A negative shift
    /// drops leading days instead (they must be blank).
    pub fn shift(&self, shift: i64) -> Calendar {
        if shift == 0 || self.is_empty() {
            return self.clone();
        }
        let new_len = self.season_len + shift;
        debug_assert!(new_len >= 1);

        // Rebuild each batch once, preserving sharing across days.
        let mut moved: HashMap<u64, Arc<PlantBatch>> = HashMap::new();
        for batch in self.batches() {
            moved.insert(
                batch.id,
                Arc::new(PlantBatch::new(
                    batch.id,
                    Arc::clone(&batch.crop),
                    batch.count,
                    batch.plant_day + shift,
                    batch.num_days + shift,
                )),
            );
        }

        let mut days = vec![Arc::new(DayState::blank())];
        for new_day in 1..=(new_len + 1) {
            let old_day = new_day - shift;
            if old_day < 1 {
                days.push(Arc::new(DayState::blank()));
                continue;
            }
            let old = self.day(old_day);
            let mut state = DayState::new(old.wallet, old.free_tiles);
            state.day_of_interest = old.day_of_interest;
            state.plants = old
                .plants
                .iter()
                .map(|b| Arc::clone(&moved[&b.id]))
                .collect();
            days.push(Arc::new(state));
        }
        Calendar {
            season_len: new_len,
            days,
            next_batch_id: self.next_batch_id,
        }
    }

    /// Check the calendar's internal accounting invariants, reconstructing
    /// expectations from the batches it holds. Used by the test suite.
    pub fn validate(&self, payday_delay: i64, release_on_harvest: bool) -> Result<(), String> {
        if self.is_empty() {
            return Ok(());
        }
        let batches = self.batches();
        let last_day = self.last_day();

        for d in 1..=last_day {
            let state = self.day(d);
            if let Tiles::Finite(n) = state.free_tiles {
                if n < 0 {
                    return Err(format!("day {}: negative free tiles ({})", d, n));
                }
            }
            if state.wallet < -1e-6 {
                return Err(format!("day {}: negative wallet ({})", d, state.wallet));
            }
            for batch in &state.plants {
                if batch.plant_day > d {
                    return Err(format!("day {}: batch {} planted later", d, batch.id));
                }
                if d > batch.last_occupied_day(payday_delay, release_on_harvest) {
                    return Err(format!("day {}: batch {} already released", d, batch.id));
                }
            }
        }

        // Days of interest: plantings, paydays, and tile releases.
        let mut expected: Vec<bool> = vec![false; (last_day + 1) as usize];
        for batch in &batches {
            if batch.plant_day >= 1 && batch.plant_day <= last_day {
                expected[batch.plant_day as usize] = true;
            }
            for p in batch.paydays(payday_delay) {
                expected[p as usize] = true;
            }
            if let Some(release) = batch.release_day(payday_delay, release_on_harvest) {
                if release <= last_day {
                    expected[release as usize] = true;
                }
            }
        }
        expected[last_day as usize] = true;
        for d in 1..=last_day {
            if self.day(d).day_of_interest != expected[d as usize] {
                return Err(format!(
                    "day {}: day_of_interest is {}, expected {}",
                    d,
                    self.day(d).day_of_interest,
                    expected[d as usize]
                ));
            }
        }

        // Wallet deltas must be explained entirely by plantings and paydays.
        // Shifted calendars lead with blank days; accounting starts where
        // the season actually does.
        let first_live = (1..=last_day)
            .find(|d| self.day(*d).wallet != 0.0 || !self.day(*d).plants.is_empty())
            .unwrap_or(1);
        for d in first_live..last_day {
            let mut expected_delta = 0.0;
            for batch in &batches {
                if batch.plant_day == d + 1 {
                    expected_delta -= batch.count as f64 * batch.crop.buy_price;
                }
                if batch.paydays(payday_delay).contains(&(d + 1)) {
                    expected_delta += batch.count as f64 * batch.crop.sell_price;
                }
            }
            let actual = self.day(d + 1).wallet - self.day(d).wallet;
            if (actual - expected_delta).abs() > 1e-6 * (1.0 + self.day(d).wallet.abs()) {
                return Err(format!(
                    "day {} -> {}: wallet moved {} but accounting says {}",
                    d,
                    d + 1,
                    actual,
                    expected_delta
                ));
            }
        }

        // No batch that could never pay for itself.
        for batch in &batches {
            if !batch.crop.worth_planting(batch.plant_day, batch.num_days) {
                return Err(format!(
                    "batch {} ({}) planted on day {} can never profit",
                    batch.id, batch.crop.name, batch.plant_day
                ));
            }
        }

        Ok(())
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

    #[test]
    fn test_new_calendar_shape() {
        let cal = Calendar::new(28, 5000.0, Tiles::Finite(100));
        assert_eq!(cal.season_len(), 28);
        assert_eq!(cal.last_day(), 29);
        assert_eq!(cal.day(1).wallet, 5000.0);
        assert_eq!(cal.day(29).wallet, 5000.0);
        assert!(cal.day(29).day_of_interest);
        assert!(!cal.day(1).day_of_interest);
        assert_eq!(cal.wealth(), 5000.0);
    }

    #[test]
    fn test_clone_shares_then_diverges() {
        let mut a = Calendar::new(10, 100.0, Tiles::Finite(5));
        let b = a.clone();
        a.day_mut(3).wallet = 42.0;
        assert_eq!(a.day(3).wallet, 42.0);
        assert_eq!(b.day(3).wallet, 100.0);
        // Untouched days still share storage.
        assert!(Arc::ptr_eq(&a.days[2], &b.days[2]));
    }

    #[test]
    fn test_batch_paydays_clipped_to_terminal_day() {
        let c = crop("late", 10.0, 30.0, 9, 0);
        let batch = PlantBatch::new(0, c, 1, 1, 10);
        // Harvest on day 10; with delay 1 it pays on day 11 (= last day).
        assert_eq!(batch.paydays(1), vec![11]);
        // With delay 2 the payday would fall past the books; it is dropped.
        assert_eq!(batch.paydays(2), Vec::<i64>::new());
    }

    #[test]
    fn test_release_day_policies() {
        let c = crop("melon", 80.0, 250.0, 12, 0);
        let batch = PlantBatch::new(0, c, 3, 1, 28);
        // Harvest day 13. Release-on-harvest frees tiles that day;
        // release-on-payday holds them until the sale settles.
        assert_eq!(batch.release_day(1, true), Some(13));
        assert_eq!(batch.release_day(1, false), Some(14));
        assert!(batch.occupies(12, 1, true));
        assert!(!batch.occupies(13, 1, true));
        assert!(batch.occupies(13, 1, false));
    }

    #[test]
    fn test_persistent_batch_never_releases() {
        let c = crop("blueberry", 80.0, 150.0, 13, 4);
        let batch = PlantBatch::new(0, c, 2, 1, 28);
        assert_eq!(batch.release_day(0, false), None);
        assert!(batch.occupies(29, 0, false));
    }

    #[test]
    fn test_shift_round_trip() {
        let mut cal = Calendar::new(14, 300.0, Tiles::Finite(1));
        let c = crop("mike", 50.0, 150.0, 10, 0);
        let id = cal.alloc_batch_id();
        let batch = Arc::new(PlantBatch::new(id, c, 1, 1, 14));
        {
            let state = cal.day_mut(1);
            state.wallet = 250.0;
            state.plants.push(Arc::clone(&batch));
            state.day_of_interest = true;
        }
        let shifted = cal.shift(14);
        assert_eq!(shifted.season_len(), 28);
        assert_eq!(shifted.day(15).wallet, 250.0);
        assert_eq!(shifted.day(15).plants[0].plant_day, 15);
        assert_eq!(shifted.day(15).plants[0].num_days, 28);
        for d in 1..=14 {
            assert!(shifted.day(d).plants.is_empty());
            assert!(!shifted.day(d).day_of_interest);
        }

        let back = shifted.shift(-14);
        assert_eq!(back.season_len(), 14);
        assert_eq!(back.day(1).wallet, 250.0);
        assert_eq!(back.day(1).plants[0].plant_day, 1);
        assert_eq!(back.day(1).plants[0].num_days, 14);
    }

    #[test]
    fn test_batches_dedup_and_order() {
        let mut cal = Calendar::new(10, 100.0, Tiles::Finite(10));
        let c = crop("a", 5.0, 10.0, 2, 1);
        let id0 = cal.alloc_batch_id();
        let id1 = cal.alloc_batch_id();
        let b0 = Arc::new(PlantBatch::new(id0, Arc::clone(&c), 1, 3, 10));
        let b1 = Arc::new(PlantBatch::new(id1, c, 1, 1, 10));
        for d in 3..=5 {
            cal.day_mut(d).plants.push(Arc::clone(&b0));
        }
        for d in 1..=5 {
            cal.day_mut(d).plants.push(Arc::clone(&b1));
        }
        let batches = cal.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].id, id1); // planted day 1 first
        assert_eq!(batches[1].id, id0);
    }

    #[test]
    fn test_empty_calendar() {
        let cal = Calendar::empty();
        assert!(cal.is_empty());
        assert_eq!(cal.wealth(), 0.0);
        assert!(cal.validate(0, false).is_ok());
    }
}
