//! Telegram update deduplication cache

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default dedup TTL (5 minutes)
const DEDUP_TTL_SECS: u64 = 300;

/// Maximum dedup cache entries
const DEDUP_MAX_ENTRIES: usize = 2000;

/// Telegram update deduplication cache
///
/// Keeps a redelivered update from producing a second exchange, and with it
/// a second pair of transcript records. Uses TTL eviction with a hard cap on
/// entries.
#[derive(Debug)]
pub struct UpdateDedup {
    cache: HashMap<i64, Instant>,
    ttl: Duration,
    max_entries: usize,
}

impl Default for UpdateDedup {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEDUP_TTL_SECS), DEDUP_MAX_ENTRIES)
    }
}

impl UpdateDedup {
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            cache: HashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Check whether an update id was seen within the TTL
    ///
    /// Returns `false` on first sight and records the id.
    pub fn is_duplicate(&mut self, update_id: i64) -> bool {
        let now = Instant::now();

        if let Some(ts) = self.cache.get(&update_id)
            && now.duration_since(*ts) < self.ttl
        {
            return true;
        }

        if self.cache.len() >= self.max_entries {
            self.cache.retain(|_, ts| now.duration_since(*ts) < self.ttl);
        }

        if self.cache.len() >= self.max_entries
            && let Some(oldest) = self
                .cache
                .iter()
                .min_by_key(|(_, ts)| **ts)
                .map(|(id, _)| *id)
        {
            self.cache.remove(&oldest);
        }

        self.cache.insert(update_id, now);
        false
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sight_is_not_duplicate() {
        let mut dedup = UpdateDedup::default();
        assert!(!dedup.is_duplicate(1));
        assert!(dedup.is_duplicate(1));
        assert!(!dedup.is_duplicate(2));
    }

    #[test]
    fn expired_entries_are_forgotten() {
        let mut dedup = UpdateDedup::new(Duration::ZERO, 10);
        assert!(!dedup.is_duplicate(1));
        assert!(!dedup.is_duplicate(1));
    }

    #[test]
    fn capacity_is_bounded() {
        let mut dedup = UpdateDedup::new(Duration::from_secs(60), 3);
        for id in 0..10 {
            dedup.is_duplicate(id);
        }
        assert!(dedup.len() <= 3);
        assert!(dedup.is_duplicate(9));
    }
}
