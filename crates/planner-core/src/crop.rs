//! Crop economics: immutable per-crop data and the derived per-tile queries
//! the planners evaluate on every decision day.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PlannerError;

/// A tile count. Farms may be effectively unbounded, in which case planting
/// is limited by gold alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tiles {
    Finite(i64),
    Infinite,
}

impl Tiles {
    pub fn is_infinite(&self) -> bool {
        matches!(self, Tiles::Infinite)
    }

    /// Finite count, if any.
    pub fn count(&self) -> Option<i64> {
        match self {
            Tiles::Finite(n) => Some(*n),
            Tiles::Infinite => None,
        }
    }

    /// Remove `n` tiles from the free pool. Infinite pools are unaffected.
    pub fn take(&self, n: i64) -> Tiles {
        match self {
            Tiles::Finite(have) => Tiles::Finite(have - n),
            Tiles::Infinite => Tiles::Infinite,
        }
    }

    /// Wire encoding: infinite pools are written as `-1`.
    pub fn to_wire(&self) -> i64 {
        match self {
            Tiles::Finite(n) => *n,
            Tiles::Infinite => -1,
        }
    }

    pub fn from_wire(raw: i64) -> Tiles {
        if raw < 0 {
            Tiles::Infinite
        } else {
            Tiles::Finite(raw)
        }
    }
}

impl fmt::Display for Tiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tiles::Finite(n) => write!(f, "{}", n),
            Tiles::Infinite => write!(f, "inf"),
        }
    }
}

/// One plantable crop and its per-tile economics.
///
/// `regrow_days` inside `[1, season_len)` marks the crop persistent: one
/// planting keeps producing every `regrow_days` days after the first harvest.
/// Any other value means a single harvest, after which the tile is released.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Crop {
    pub name: String,
    pub buy_price: f64,
    pub sell_price: f64,
    /// Days from planting to the first harvest.
    pub grow_days: i64,
    /// Regrow cadence; values outside `[1, season_len)` mean no regrowth.
    pub regrow_days: i64,
    pub season: String,
    pub second_season: Option<String>,
    pub enabled: bool,
}

impl Crop {
    pub fn is_persistent(&self, season_len: i64) -> bool {
        self.regrow_days >= 1 && self.regrow_days < season_len
    }

    /// Ordered harvest days for a planting on `plant_day`, clipped to the
    /// season. Empty when the first harvest would land past the last day.
    pub fn harvest_days(&self, plant_day: i64, season_len: i64) -> Vec<i64> {
        let first = plant_day + self.grow_days;
        if first > season_len {
            return Vec::new();
        }
        if !self.is_persistent(season_len) {
            return vec![first];
        }
        let mut days = Vec::new();
        let mut day = first;
        while day <= season_len {
            days.push(day);
            day += self.regrow_days;
        }
        days
    }

    pub fn num_harvests(&self, plant_day: i64, season_len: i64) -> usize {
        let first = plant_day + self.grow_days;
        if first > season_len {
            return 0;
        }
        if !self.is_persistent(season_len) {
            return 1;
        }
        ((season_len - first) / self.regrow_days + 1) as usize
    }

    /// Per-tile gold gained by planting this crop on `plant_day` and working
    /// it for the rest of the season.
    ///
    /// Persistent crops pay every harvest from a single purchase.
    /// Single-harvest crops are assumed to be replanted each time the
    /// proceeds come back, so a full cycle costs `grow_days + payday_delay`
    /// days; the trailing partial cycle earns nothing.
    pub fn profit_index(&self, plant_day: i64, season_len: i64, payday_delay: i64) -> f64 {
        let first = plant_day + self.grow_days;
        if first > season_len {
            return -self.buy_price;
        }
        if self.is_persistent(season_len) {
            let n = self.num_harvests(plant_day, season_len) as f64;
            return n * self.sell_price - self.buy_price;
        }
        let cycle = self.grow_days + payday_delay;
        let cycles = (season_len - plant_day) / cycle;
        cycles as f64 * (self.sell_price - self.buy_price)
    }

    /// How many tiles worth of this crop can be bought right now.
    ///
    /// An unbounded farm makes planting gold-limited only; a free crop on an
    /// unbounded farm would plant without limit and is refused outright.
    pub fn units_plantable(&self, free_tiles: Tiles, wallet: f64) -> i64 {
        if self.buy_price <= 0.0 {
            return match free_tiles {
                Tiles::Finite(n) => n.max(0),
                Tiles::Infinite => 0,
            };
        }
        let by_gold = (wallet / self.buy_price).floor() as i64;
        match free_tiles {
            Tiles::Finite(n) => by_gold.min(n.max(0)),
            Tiles::Infinite => by_gold,
        }
    }

    /// False for plantings that can never pay for themselves: nothing to
    /// harvest, or a lone harvest sold at or below cost.
    pub fn worth_planting(&self, plant_day: i64, season_len: i64) -> bool {
        match self.num_harvests(plant_day, season_len) {
            0 => false,
            1 => self.sell_price > self.buy_price,
            _ => true,
        }
    }

    /// Wire form: `name;buy;sell;grow;regrow;season;second_season;enabled`.
    pub fn to_wire(&self) -> String {
        format!(
            "{};{};{};{};{};{};{};{}",
            self.name,
            self.buy_price,
            self.sell_price,
            self.grow_days,
            self.regrow_days,
            self.season,
            self.second_season.as_deref().unwrap_or(""),
            self.enabled,
        )
    }

    pub fn from_wire(line: &str) -> Result<Crop, PlannerError> {
        let parts: Vec<&str> = line.split(';').collect();
        if parts.len() != 8 {
            return Err(PlannerError::Serialization(format!(
                "crop line has {} fields, expected 8: {:?}",
                parts.len(),
                line
            )));
        }
        let parse_f = |s: &str, field: &str| {
            s.parse::<f64>().map_err(|e| {
                PlannerError::Serialization(format!("bad crop {}: {:?} ({})", field, s, e))
            })
        };
        let parse_i = |s: &str, field: &str| {
            s.parse::<i64>().map_err(|e| {
                PlannerError::Serialization(format!("bad crop {}: {:?} ({})", field, s, e))
            })
        };
        Ok(Crop {
            name: parts[0].to_string(),
            buy_price: parse_f(parts[1], "buy price")?,
            sell_price: parse_f(parts[2], "sell price")?,
            grow_days: parse_i(parts[3], "grow days")?,
            regrow_days: parse_i(parts[4], "regrow days")?,
            season: parts[5].to_string(),
            second_season: if parts[6].is_empty() {
                None
            } else {
                Some(parts[6].to_string())
            },
            enabled: parts[7].parse::<bool>().map_err(|e| {
                PlannerError::Serialization(format!("bad crop enabled flag: {:?} ({})", parts[7], e))
            })?,
        })
    }
}

impl fmt::Display for Crop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// The crop catalog a run works against. Lookup by name is needed when
/// calendars come back off the wire.
#[derive(Debug, Clone, Default)]
pub struct CropBook {
    crops: Vec<Arc<Crop>>,
}

impl CropBook {
    pub fn new(crops: Vec<Crop>) -> CropBook {
        CropBook {
            crops: crops.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.crops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.crops.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Crop>> {
        self.crops.iter()
    }

    pub fn enabled(&self) -> impl Iterator<Item = &Arc<Crop>> {
        self.crops.iter().filter(|c| c.enabled)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Crop>> {
        self.crops.iter().find(|c| c.name == name)
    }

    /// Cheapest buy price among enabled crops; what a decision day must be
    /// able to afford for the search to keep branching.
    pub fn cheapest_buy(&self) -> Option<f64> {
        self.enabled()
            .map(|c| c.buy_price)
            .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// One crop per line, in catalog order.
    pub fn to_wire(&self) -> String {
        self.crops
            .iter()
            .map(|c| c.to_wire())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn from_wire(blob: &str) -> Result<CropBook, PlannerError> {
        let mut crops = Vec::new();
        for line in blob.lines() {
            if line.is_empty() {
                continue;
            }
            crops.push(Crop::from_wire(line)?);
        }
        Ok(CropBook::new(crops))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crop(name: &str, buy: f64, sell: f64, grow: i64, regrow: i64) -> Crop {
        Crop {
            name: name.to_string(),
            buy_price: buy,
            sell_price: sell,
            grow_days: grow,
            regrow_days: regrow,
            season: "spring".to_string(),
            second_season: None,
            enabled: true,
        }
    }

    #[test]
    fn test_harvest_days_persistent() {
        let c = crop("blueberry", 80.0, 150.0, 13, 4);
        assert_eq!(c.harvest_days(1, 28), vec![14, 18, 22, 26]);
        assert_eq!(c.num_harvests(1, 28), 4);
    }

    #[test]
    fn test_harvest_days_single() {
        let c = crop("melon", 80.0, 250.0, 12, 0);
        assert_eq!(c.harvest_days(1, 28), vec![13]);
        assert_eq!(c.num_harvests(1, 28), 1);
        // Too late to mature.
        assert!(c.harvest_days(17, 28).is_empty());
        assert_eq!(c.num_harvests(17, 28), 0);
    }

    #[test]
    fn test_regrow_outside_season_is_single_harvest() {
        // A cadence of 30 in a 28-day season never regrows.
        let c = crop("odd", 10.0, 20.0, 5, 30);
        assert!(!c.is_persistent(28));
        assert_eq!(c.harvest_days(1, 28), vec![6]);
    }

    #[test]
    fn test_profit_index_persistent() {
        let c = crop("blueberry", 80.0, 150.0, 13, 4);
        // 4 harvests * 150 - 80
        assert_eq!(c.profit_index(1, 28, 0), 520.0);
    }

    #[test]
    fn test_profit_index_replant_cycles() {
        let c = crop("melon", 80.0, 250.0, 12, 0);
        // floor(27 / 12) = 2 cycles of 170
        assert_eq!(c.profit_index(1, 28, 0), 340.0);
        // A payday delay lengthens the cycle: floor(27 / 13) = 2 still.
        assert_eq!(c.profit_index(1, 28, 1), 340.0);
        // Nothing fits: the seed cost is sunk.
        assert_eq!(c.profit_index(20, 28, 0), -80.0);
    }

    #[test]
    fn test_units_plantable() {
        let c = crop("blueberry", 80.0, 150.0, 13, 4);
        assert_eq!(c.units_plantable(Tiles::Finite(100), 5000.0), 62);
        assert_eq!(c.units_plantable(Tiles::Finite(10), 5000.0), 10);
        assert_eq!(c.units_plantable(Tiles::Infinite, 5000.0), 62);
        assert_eq!(c.units_plantable(Tiles::Finite(10), 0.0), 0);
    }

    #[test]
    fn test_free_crop_on_unbounded_farm_refused() {
        let c = crop("weed", 0.0, 5.0, 3, 0);
        assert_eq!(c.units_plantable(Tiles::Infinite, 1000.0), 0);
        assert_eq!(c.units_plantable(Tiles::Finite(7), 1000.0), 7);
    }

    #[test]
    fn test_worth_planting() {
        let hops = crop("hops", 60.0, 25.0, 11, 1);
        // Persistent: many cheap harvests still add up.
        assert!(hops.worth_planting(1, 28));
        // Single harvest at a loss: never.
        let bad = crop("bad", 60.0, 25.0, 11, 0);
        assert!(!bad.worth_planting(1, 28));
        // Nothing matures: never.
        assert!(!hops.worth_planting(27, 28));
    }

    #[test]
    fn test_crop_wire_round_trip() {
        let mut c = crop("Hot Pepper", 40.0, 40.0, 5, 3);
        c.second_season = Some("summer".to_string());
        let line = c.to_wire();
        let back = Crop::from_wire(&line).unwrap();
        assert_eq!(back.name, "Hot Pepper");
        assert_eq!(back.buy_price, 40.0);
        assert_eq!(back.regrow_days, 3);
        assert_eq!(back.second_season.as_deref(), Some("summer"));
        assert_eq!(back.to_wire(), line);
    }

    #[test]
    fn test_crop_wire_rejects_malformed() {
        assert!(Crop::from_wire("too;few;fields").is_err());
        assert!(Crop::from_wire("x;nan-ish;1;2;3;s;;maybe").is_err());
    }

    #[test]
    fn test_book_cheapest_buy_ignores_disabled() {
        let mut cheap = crop("cheap", 10.0, 25.0, 4, 0);
        cheap.enabled = false;
        let book = CropBook::new(vec![cheap, crop("mike", 50.0, 150.0, 10, 0)]);
        assert_eq!(book.cheapest_buy(), Some(50.0));
    }

    #[test]
    fn test_book_wire_round_trip() {
        let book = CropBook::new(vec![
            crop("a", 1.0, 2.0, 3, 0),
            crop("b", 4.0, 5.0, 6, 2),
        ]);
        let blob = book.to_wire();
        let back = CropBook::from_wire(&blob).unwrap();
        assert_eq!(back.len(), 2);
        assert!(back.get("b").is_some());
        assert_eq!(back.to_wire(), blob);
    }

    #[test]
    fn test_tiles_wire() {
        assert_eq!(Tiles::Infinite.to_wire(), -1);
        assert_eq!(Tiles::from_wire(-1), Tiles::Infinite);
        assert_eq!(Tiles::from_wire(12), Tiles::Finite(12));
    }
}
