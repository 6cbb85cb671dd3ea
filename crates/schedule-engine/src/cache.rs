//! Canonical-key node cache.
//!
//! Two calendars whose remaining futures agree after bucketing hash to the
//! same key; the second one to show up is dropped instead of expanded. The
//! cache is a plain presence set: it is only ever owned by one search loop
//! or one worker, never shared.

use std::collections::HashSet;

use planner_core::{cache_key, Calendar};

#[derive(Debug)]
pub struct NodeCache {
    enabled: bool,
    sig_digits: u32,
    seen: HashSet<String>,
    hits: u64,
}

impl NodeCache {
    pub fn new(enabled: bool, sig_digits: u32) -> NodeCache {
        NodeCache {
            enabled,
            sig_digits,
            seen: HashSet::new(),
            hits: 0,
        }
    }

    /// True when this future was already explored. Unseen futures are
    /// recorded on the way through. Disabled caches see nothing.
    pub fn check_and_insert(&mut self, cal: &Calendar, from_day: i64) -> bool {
        if !self.enabled {
            return false;
        }
        let key = cache_key(cal, from_day, self.sig_digits);
        if self.seen.insert(key) {
            false
        } else {
            self.hits += 1;
            true
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planner_core::Tiles;

    #[test]
    fn test_repeat_future_hits() {
        let mut cache = NodeCache::new(true, 2);
        let cal = Calendar::new(10, 500.0, Tiles::Finite(5));
        assert!(!cache.check_and_insert(&cal, 1));
        assert!(cache.check_and_insert(&cal, 1));
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_different_entry_day_is_different_future() {
        let mut cache = NodeCache::new(true, 2);
        let cal = Calendar::new(10, 500.0, Tiles::Finite(5));
        assert!(!cache.check_and_insert(&cal, 1));
        assert!(!cache.check_and_insert(&cal, 2));
    }

    #[test]
    fn test_bucketed_wallets_collide() {
        let mut cache = NodeCache::new(true, 2);
        let a = Calendar::new(10, 5003.0, Tiles::Finite(5));
        let b = Calendar::new(10, 5021.0, Tiles::Finite(5));
        assert!(!cache.check_and_insert(&a, 1));
        assert!(cache.check_and_insert(&b, 1));
    }

    #[test]
    fn test_disabled_cache_never_hits() {
        let mut cache = NodeCache::new(false, 2);
        let cal = Calendar::new(10, 500.0, Tiles::Finite(5));
        assert!(!cache.check_and_insert(&cal, 1));
        assert!(!cache.check_and_insert(&cal, 1));
        assert_eq!(cache.hits(), 0);
        assert!(cache.is_empty());
    }
}
