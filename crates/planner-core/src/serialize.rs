//! Canonical line-oriented calendar forms.
//!
//! Two blobs share one grammar: the cache key (wallet and tiles bucketed to
//! a small number of significant figures, no plant detail) and the wire form
//! (raw integer values, plant batches appended) used to hand calendars to
//! worker threads. Each line is
//!
//! ```text
//! <day>_<wallet>_<free_tiles>[_<plants>]
//! ```
//!
//! with `plants` a `-`-joined list of `name;count;plant_day;num_days`
//! entries. Lines appear only for days of interest, plus the first and last
//! day of the serialized range; an unbounded tile pool is written as `-1`.
//! Crop names must not contain `_`, `-` or `;` (they are the separators).

use std::collections::HashMap;
use std::sync::Arc;

use crate::calendar::{Calendar, DayState, PlantBatch};
use crate::crop::{CropBook, Tiles};
use crate::error::PlannerError;

/// Round `x` to `sig` significant figures, then scrub the scaling noise so
/// repeated rounding is a fixed point. Zero stays zero.
pub fn round_sig(x: f64, sig: u32) -> f64 {
    if x == 0.0 || !x.is_finite() {
        return x;
    }
    let sig = sig.max(1);
    let k = x.abs().log10().floor() as i32 - (sig as i32 - 1);
    let scale = 10f64.powi(k);
    let rounded = (x / scale).round() * scale;
    if k < 0 {
        let places = 10f64.powi(-k);
        (rounded * places).round() / places
    } else {
        rounded
    }
}

fn emit_line(out: &mut String, day: i64, wallet: i64, tiles: i64, plants: Option<String>) {
    out.push_str(&day.to_string());
    out.push('_');
    out.push_str(&wallet.to_string());
    out.push('_');
    out.push_str(&tiles.to_string());
    if let Some(p) = plants {
        out.push('_');
        out.push_str(&p);
    }
    out.push('\n');
}

/// Cache key for the future of `cal` from `from_day` on. Wallet and tile
/// counts are bucketed so calendars whose remaining futures only differ by
/// rounding noise collapse onto one key. Plants never participate.
pub fn cache_key(cal: &Calendar, from_day: i64, sig_digits: u32) -> String {
    let mut out = String::new();
    let last = cal.last_day();
    for day in from_day.max(1)..=last {
        let state = cal.day(day);
        if !(state.day_of_interest || day == from_day || day == last) {
            continue;
        }
        let wallet = round_sig(state.wallet, sig_digits).round() as i64;
        let tiles = match state.free_tiles {
            Tiles::Infinite => -1,
            Tiles::Finite(n) => round_sig(n as f64, sig_digits).round() as i64,
        };
        emit_line(&mut out, day, wallet, tiles, None);
    }
    out
}

/// Full-range wire form of `cal`: every day of interest plus the first and
/// last day, raw values, plant batches included.
pub fn to_wire(cal: &Calendar) -> String {
    let mut out = String::new();
    if cal.is_empty() {
        return out;
    }
    let last = cal.last_day();
    for day in 1..=last {
        let state = cal.day(day);
        if !(state.day_of_interest || day == 1 || day == last) {
            continue;
        }
        let plants = if state.plants.is_empty() {
            None
        } else {
            Some(
                state
                    .plants
                    .iter()
                    .map(|b| b.to_wire())
                    .collect::<Vec<_>>()
                    .join("-"),
            )
        };
        emit_line(
            &mut out,
            day,
            state.wallet.round() as i64,
            state.free_tiles.to_wire(),
            plants,
        );
    }
    out
}

struct WireLine {
    day: i64,
    wallet: f64,
    tiles: Tiles,
    /// (name, count, plant_day, num_days)
    plants: Vec<(String, i64, i64, i64)>,
}

fn parse_line(line: &str) -> Result<WireLine, PlannerError> {
    let mut parts = line.splitn(4, '_');
    let bad = |what: &str| PlannerError::Serialization(format!("bad {} in line {:?}", what, line));
    let day = parts
        .next()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| bad("day"))?;
    let wallet = parts
        .next()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| bad("wallet"))?;
    let tiles_raw = parts
        .next()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| bad("tiles"))?;
    let mut plants = Vec::new();
    if let Some(rest) = parts.next() {
        for entry in rest.split('-') {
            let fields: Vec<&str> = entry.split(';').collect();
            if fields.len() != 4 {
                return Err(bad("plant batch"));
            }
            let count = fields[1].parse::<i64>().map_err(|_| bad("batch count"))?;
            let plant_day = fields[2].parse::<i64>().map_err(|_| bad("batch day"))?;
            let num_days = fields[3].parse::<i64>().map_err(|_| bad("batch span"))?;
            plants.push((fields[0].to_string(), count, plant_day, num_days));
        }
    }
    Ok(WireLine {
        day,
        wallet,
        tiles: Tiles::from_wire(tiles_raw),
        plants,
    })
}

/// Rebuild a calendar from its wire form.
///
/// Days between emitted lines carry the last snapshot forward (nothing moves
/// between days of interest); day-of-interest flags are recomputed from the
/// reconstructed batches under the given payday delay and release policy.
pub fn from_wire(
    blob: &str,
    book: &CropBook,
    payday_delay: i64,
    release_on_harvest: bool,
) -> Result<Calendar, PlannerError> {
    let mut lines = Vec::new();
    for raw in blob.lines() {
        if raw.is_empty() {
            continue;
        }
        lines.push(parse_line(raw)?);
    }
    if lines.is_empty() {
        return Err(PlannerError::Serialization(
            "empty calendar blob".to_string(),
        ));
    }
    lines.sort_by_key(|l| l.day);
    let last_day = lines.last().map(|l| l.day).unwrap_or(0);
    if last_day < 2 {
        return Err(PlannerError::Serialization(format!(
            "calendar blob ends on day {}, expected at least 2",
            last_day
        )));
    }
    let season_len = last_day - 1;

    // One batch instance per (name, plant day), shared across every day that
    // lists it.
    let mut batch_instances: HashMap<(String, i64), Arc<PlantBatch>> = HashMap::new();
    let mut next_id = 0u64;
    for line in &lines {
        for (name, count, plant_day, num_days) in &line.plants {
            let key = (name.clone(), *plant_day);
            if batch_instances.contains_key(&key) {
                continue;
            }
            let crop = book.get(name).ok_or_else(|| {
                PlannerError::Serialization(format!("unknown crop {:?} in calendar blob", name))
            })?;
            batch_instances.insert(
                key,
                Arc::new(PlantBatch::new(
                    next_id,
                    Arc::clone(crop),
                    *count,
                    *plant_day,
                    *num_days,
                )),
            );
            next_id += 1;
        }
    }

    let mut cal = Calendar::new(season_len, lines[0].wallet, lines[0].tiles);
    for _ in 0..next_id {
        cal.alloc_batch_id();
    }

    let mut snapshot = 0usize;
    for day in 1..=last_day {
        while snapshot + 1 < lines.len() && lines[snapshot + 1].day <= day {
            snapshot += 1;
        }
        let src = &lines[snapshot.min(lines.len() - 1)];
        let effective = if src.day <= day { src } else { &lines[0] };
        let mut state = DayState::new(effective.wallet, effective.tiles);
        state.plants = effective
            .plants
            .iter()
            .map(|(name, _, plant_day, _)| {
                Arc::clone(&batch_instances[&(name.clone(), *plant_day)])
            })
            .collect();
        *cal.day_mut(day) = state;
    }

    // Interest flags come from the batches, not the line set.
    for batch in batch_instances.values() {
        if batch.plant_day >= 1 && batch.plant_day <= last_day {
            cal.day_mut(batch.plant_day).day_of_interest = true;
        }
        for p in batch.paydays(payday_delay) {
            cal.day_mut(p).day_of_interest = true;
        }
        if let Some(release) = batch.release_day(payday_delay, release_on_harvest) {
            if release <= last_day {
                cal.day_mut(release).day_of_interest = true;
            }
        }
    }
    cal.day_mut(last_day).day_of_interest = true;

    Ok(cal)
}
