use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::ops::compute::{CompResult, Op};
use tokio::time::Instant;

/// A price that was fetched from the underlying service at some point in time.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    /// The fetched price.
    pub price: f64,
    /// When the price was obtained from the service.
    pub fetched_at: Instant,
    /// Identifies this exact write, so that a newer entry for the same item is never mistaken
    /// for this one.
    generation: u64,
}

impl Entry {
    /// The time that passed since this price was fetched.
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    /// Whether this entry may still be served for the given `max_age`.
    ///
    /// An entry is fresh as long as strictly less than `max_age` has passed since it was fetched.
    pub fn is_fresh(&self, max_age: Duration) -> bool {
        self.age() < max_age
    }
}

/// Concurrent mapping of item codes to the latest fetched [`Entry`].
///
/// There is at most one entry per item code, and the last write wins. Entries are always replaced
/// as a whole, so a reader never sees a price together with the fetch time of another write.
///
/// The store is unbounded and never evicts entries on its own.
pub struct EntryStore {
    entries: moka::sync::Cache<String, Entry>,
    next_generation: AtomicU64,
}

impl std::fmt::Debug for EntryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryStore")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

impl Default for EntryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntryStore {
    pub fn new() -> Self {
        let entries = moka::sync::Cache::builder().name("prices").build();
        Self {
            entries,
            next_generation: AtomicU64::new(0),
        }
    }

    /// Returns the current entry for `item_code`, regardless of its age.
    pub fn lookup(&self, item_code: &str) -> Option<Entry> {
        self.entries.get(item_code)
    }

    /// Stores a price for `item_code`, replacing any previous entry.
    ///
    /// Returns the stored entry, which can later be passed to [`remove_entry`](Self::remove_entry).
    pub fn put(&self, item_code: &str, price: f64, fetched_at: Instant) -> Entry {
        let entry = Entry {
            price,
            fetched_at,
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
        };
        // must hold the same per-key lock as `remove_entry`
        self.entries
            .entry_by_ref(item_code)
            .and_upsert_with(|_| entry.clone());
        entry
    }

    /// Removes whatever entry is stored for `item_code`.
    pub fn remove(&self, item_code: &str) {
        self.entries.invalidate(item_code);
    }

    /// Removes the entry for `item_code` only if it still is the given `entry`.
    ///
    /// Returns `true` if the entry was removed. If the item was overwritten since `entry` was
    /// stored, or is already gone, nothing happens.
    pub fn remove_entry(&self, item_code: &str, entry: &Entry) -> bool {
        let result = self
            .entries
            .entry_by_ref(item_code)
            .and_compute_with(|current| match current {
                Some(current) if current.value().generation == entry.generation => Op::Remove,
                _ => Op::Nop,
            });

        matches!(result, CompResult::Removed(_))
    }

    /// The number of stored entries.
    pub fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};

    use super::*;

    #[test]
    fn test_lookup_missing() {
        let store = EntryStore::new();
        assert_eq!(store.lookup("A"), None);
        assert_eq!(store.entry_count(), 0);
    }

    #[test]
    fn test_put_replaces_entry() {
        let store = EntryStore::new();
        let first = store.put("A", 10.0, Instant::now());
        let second = store.put("A", 12.5, Instant::now());

        assert_ne!(first, second);
        assert_eq!(store.lookup("A"), Some(second));
        assert_eq!(store.entry_count(), 1);
    }

    #[test]
    fn test_remove() {
        let store = EntryStore::new();
        store.put("A", 10.0, Instant::now());
        store.put("B", 20.0, Instant::now());

        store.remove("A");
        // removing an absent item is fine
        store.remove("A");
        store.remove("C");

        assert_eq!(store.lookup("A"), None);
        assert_eq!(store.lookup("B").map(|e| e.price), Some(20.0));
    }

    #[test]
    fn test_remove_entry_keeps_newer_entry() {
        let store = EntryStore::new();
        let old = store.put("A", 10.0, Instant::now());
        let new = store.put("A", 11.0, Instant::now());

        assert!(!store.remove_entry("A", &old));
        assert_eq!(store.lookup("A"), Some(new.clone()));

        assert!(store.remove_entry("A", &new));
        assert_eq!(store.lookup("A"), None);

        // already gone
        assert!(!store.remove_entry("A", &new));
    }

    #[tokio::test(start_paused = true)]
    async fn test_freshness() {
        let store = EntryStore::new();
        let max_age = Duration::from_secs(1);
        let entry = store.put("A", 10.0, Instant::now());
        assert!(entry.is_fresh(max_age));

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(entry.is_fresh(max_age));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!entry.is_fresh(max_age));
        assert!(!entry.is_fresh(Duration::ZERO));
    }

    #[test]
    fn test_remove_entry_racing_put() {
        let store = Arc::new(EntryStore::new());

        for round in 0..2000 {
            let old = store.put("A", 1.0, Instant::now());
            let barrier = Arc::new(Barrier::new(2));

            let remover = {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    store.remove_entry("A", &old)
                })
            };
            let writer = {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    store.put("A", 2.0, Instant::now())
                })
            };

            remover.join().unwrap();
            let newer = writer.join().unwrap();
            assert_eq!(store.lookup("A"), Some(newer), "round {round}");
        }
    }

    #[test]
    fn test_concurrent_writers() {
        let store = Arc::new(EntryStore::new());
        let fetched_at = Instant::now();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for j in 0..100 {
                        let price = (i * 1000 + j) as f64;
                        store.put("A", price, fetched_at + Duration::from_millis(price as u64));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let entry = store.lookup("A").unwrap();
        assert_eq!(
            entry.fetched_at,
            fetched_at + Duration::from_millis(entry.price as u64)
        );
    }
}
