//! Bounded read-through cache for note listings.

use driftsync_protocol::LocalNote;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Cache key: the owner filter a listing was computed for.
pub type ListingKey = Option<String>;

struct CacheEntry {
    notes: Vec<LocalNote>,
    inserted_at: Instant,
}

/// A bounded, time-limited cache of note listings.
///
/// The store invalidates the whole cache on every write. Invalidation is
/// deliberately conservative: readers never observe stale data past a
/// write they triggered themselves, at the cost of extra cache misses.
pub struct ListingCache {
    entries: RwLock<HashMap<ListingKey, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
}

impl ListingCache {
    /// Creates a cache with the given entry bound and time-to-live.
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            max_entries,
        }
    }

    /// Returns the cached listing for the key, if present and fresh.
    pub fn get(&self, key: &ListingKey) -> Option<Vec<LocalNote>> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.inserted_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.notes.clone())
    }

    /// Stores a listing, evicting the oldest entry when full.
    pub fn insert(&self, key: ListingKey, notes: Vec<LocalNote>) {
        let mut entries = self.entries.write();
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key,
            CacheEntry {
                notes,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drops every cached listing.
    pub fn invalidate_all(&self) {
        self.entries.write().clear();
    }

    /// Returns the number of cached listings.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftsync_protocol::{NoteDraft, LocalNote};

    fn note(title: &str) -> LocalNote {
        LocalNote::from_draft(
            NoteDraft {
                title: title.into(),
                content: "c".into(),
                ..NoteDraft::default()
            },
            "user-1",
        )
    }

    #[test]
    fn get_returns_fresh_entry() {
        let cache = ListingCache::new(4, Duration::from_secs(60));
        cache.insert(None, vec![note("a")]);

        let hit = cache.get(&None).unwrap();
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].title, "a");
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = ListingCache::new(4, Duration::ZERO);
        cache.insert(None, vec![note("a")]);
        assert!(cache.get(&None).is_none());
    }

    #[test]
    fn invalidate_all_clears_everything() {
        let cache = ListingCache::new(4, Duration::from_secs(60));
        cache.insert(None, vec![note("a")]);
        cache.insert(Some("user-1".into()), vec![note("b")]);

        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn bounded_size_evicts_oldest() {
        let cache = ListingCache::new(2, Duration::from_secs(60));
        cache.insert(Some("u1".into()), vec![]);
        cache.insert(Some("u2".into()), vec![]);
        cache.insert(Some("u3".into()), vec![]);

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&Some("u3".into())).is_some());
    }
}
