//! Engine configuration and the per-run parameters shared with workers.

use serde::{Deserialize, Serialize};

use crate::crop::Tiles;

/// Tunables for a schedule search. All fields have defaults; embedding hosts
/// usually only touch a couple of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ceiling on how many crop types the search may consider; the
    /// tile-to-currency ratio can only shrink it further.
    pub max_num_crop_types: usize,
    /// Release tiles the day a harvest comes in instead of when the sale
    /// settles.
    pub return_tiles_asap: bool,
    /// Allow several crops to be planted on the same decision day.
    pub multi_crop: bool,
    /// Deduplicate equivalent futures through the canonical cache.
    pub use_cache: bool,
    /// Frontier size at which the search hands subtrees to the worker pool.
    pub deep_seeds: usize,
    /// Process-memory ceiling; the run aborts softly at or above it.
    pub memory_threshold_gb: f64,
    /// Days between a harvest and the wallet credit.
    pub payday_delay: i64,
    /// A branch must keep at least this fraction of the starting gold to be
    /// expanded further.
    pub gold_floor_fraction: f64,
    /// A branch must keep at least this fraction of the starting tiles free
    /// to be expanded further.
    pub tile_floor_fraction: f64,
    /// Significant figures for cache-key bucketing.
    pub cache_sig_digits: u32,
    /// Worker-thread count override; `None` probes the host.
    pub worker_threads: Option<usize>,
    /// Expand the frontier one level at a time across the pool instead of
    /// handing out whole subtrees.
    pub shallow_dispatch: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_num_crop_types: 5,
            return_tiles_asap: false,
            multi_crop: true,
            use_cache: true,
            deep_seeds: 120,
            memory_threshold_gb: 1.38,
            payday_delay: 0,
            gold_floor_fraction: 0.5,
            tile_floor_fraction: 0.07,
            cache_sig_digits: 2,
            worker_threads: None,
            shallow_dispatch: false,
        }
    }
}

/// Starting conditions of one run, installed into every worker alongside the
/// crop catalog and referenced by the pruning floors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RunParams {
    pub season_len: i64,
    pub starting_gold: f64,
    pub starting_tiles: Tiles,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.max_num_crop_types, 5);
        assert!(!cfg.return_tiles_asap);
        assert!(cfg.multi_crop);
        assert!(cfg.use_cache);
        assert_eq!(cfg.deep_seeds, 120);
        assert_eq!(cfg.memory_threshold_gb, 1.38);
        assert_eq!(cfg.payday_delay, 0);
        assert_eq!(cfg.gold_floor_fraction, 0.5);
        assert_eq!(cfg.tile_floor_fraction, 0.07);
        assert_eq!(cfg.cache_sig_digits, 2);
        assert!(cfg.worker_threads.is_none());
        assert!(!cfg.shallow_dispatch);
    }

    #[test]
    fn test_partial_config_json_fills_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"payday_delay": 1, "use_cache": false}"#).unwrap();
        assert_eq!(cfg.payday_delay, 1);
        assert!(!cfg.use_cache);
        assert_eq!(cfg.deep_seeds, 120);
    }
}
