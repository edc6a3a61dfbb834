//! Bounded per-search "already surfaced" memory.
//!
//! Keys are `(search_id, fingerprint)`. The cache is capacity-bounded and
//! evicts idle entries, so memory stays flat over long process lifetimes.
//! An evicted fingerprint that reappears is caught by the store's unique
//! `(search_id, fingerprint)` constraint instead.

use std::time::Duration;

use moka::sync::Cache;
use uuid::Uuid;

use crate::models::Fingerprint;

#[derive(Debug, Clone)]
pub struct DedupConfig {
    pub max_entries: u64,
    /// Entries untouched for this long are evicted.
    pub idle_ttl: Duration,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            max_entries: 100_000,
            idle_ttl: Duration::from_secs(14 * 24 * 60 * 60),
        }
    }
}

#[derive(Clone)]
pub struct Deduplicator {
    seen: Cache<(Uuid, Fingerprint), ()>,
    warmed: Cache<Uuid, ()>,
}

impl Deduplicator {
    pub fn new(config: &DedupConfig) -> Self {
        Self {
            seen: Cache::builder()
                .max_capacity(config.max_entries)
                .time_to_idle(config.idle_ttl)
                .build(),
            warmed: Cache::builder()
                .max_capacity(config.max_entries)
                .time_to_idle(config.idle_ttl)
                .build(),
        }
    }

    /// A sighting of a known fingerprint refreshes its idle timer.
    pub fn is_new(&self, search_id: Uuid, fingerprint: &Fingerprint) -> bool {
        self.seen.get(&(search_id, fingerprint.clone())).is_none()
    }

    /// Call only after the listing has been persisted.
    pub fn mark_seen(&self, search_id: Uuid, fingerprint: &Fingerprint) {
        self.seen.insert((search_id, fingerprint.clone()), ());
    }

    /// Seed state for a search from persisted fingerprints.
    pub fn warm(&self, search_id: Uuid, fingerprints: impl IntoIterator<Item = Fingerprint>) {
        for fp in fingerprints {
            self.seen.insert((search_id, fp), ());
        }
        self.warmed.insert(search_id, ());
    }

    pub fn is_warmed(&self, search_id: Uuid) -> bool {
        self.warmed.contains_key(&search_id)
    }

    pub fn entry_count(&self) -> u64 {
        self.seen.run_pending_tasks();
        self.seen.entry_count()
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(&DedupConfig::default())
    }
}
