use super::ExpiringStore;
use crate::common::time::{Clock, Instant};

use dashmap::DashMap;
use std::{
    collections::hash_map::RandomState,
    fmt,
    hash::{BuildHasher, Hash},
    sync::Arc,
    time::Duration,
};

struct StoredValue<V> {
    value: V,
    expires_at: Instant,
}

impl<V> StoredValue<V> {
    #[inline]
    fn has_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// The default [`ExpiringStore`][store-trait]: a thread-safe in-memory map
/// where every entry carries its own time-to-live.
///
/// Expired entries are never returned. They are removed lazily, when a `get`
/// for the same key finds them expired, or when they are overwritten by `put`.
/// `MemoryStore` is unbounded; it has no maximum capacity and no eviction
/// policy.
///
/// # Examples
///
/// ```rust
/// use keyed_lock_cache::store::{ExpiringStore, MemoryStore};
/// use std::{sync::Arc, time::Duration};
///
/// let store = MemoryStore::new();
/// store.put(Arc::new("a"), "alice", Duration::from_secs(60));
/// assert_eq!(store.get(&"a"), Some("alice"));
///
/// // A zero time-to-live expires immediately.
/// store.put(Arc::new("b"), "bob", Duration::ZERO);
/// assert_eq!(store.get(&"b"), None);
/// ```
///
/// [store-trait]: ./trait.ExpiringStore.html
pub struct MemoryStore<K, V, S = RandomState> {
    entries: DashMap<Arc<K>, StoredValue<V>, S>,
    clock: Clock,
}

impl<K, V, S> fmt::Debug for MemoryStore<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entry_count", &self.entries.len())
            .finish()
    }
}

impl<K, V> MemoryStore<K, V, RandomState>
where
    K: Hash + Eq,
{
    /// Constructs a new, empty `MemoryStore<K, V>`.
    pub fn new() -> Self {
        Self::with_hasher(RandomState::default())
    }
}

impl<K, V> Default for MemoryStore<K, V, RandomState>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> MemoryStore<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Clone,
{
    /// Constructs a new, empty `MemoryStore<K, V, S>` which will use the given
    /// hash builder to hash keys.
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            entries: DashMap::with_hasher(hasher),
            clock: Clock::default(),
        }
    }

    /// Returns the number of entries held by this store, including expired
    /// entries that have not been removed yet.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Removes every expired entry.
    pub fn remove_expired(&self) {
        let now = self.clock.now();
        self.entries.retain(|_k, v| !v.has_expired(now));
    }

    #[cfg(test)]
    pub(crate) fn set_clock(&mut self, clock: Clock) {
        self.clock = clock;
    }
}

impl<K, V, S> ExpiringStore<K, V> for MemoryStore<K, V, S>
where
    K: Hash + Eq + Send + Sync,
    V: Clone + Send + Sync,
    S: BuildHasher + Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();

        match self.entries.get(key) {
            Some(entry) if !entry.has_expired(now) => return Some(entry.value.clone()),
            Some(_) => (),
            None => return None,
        }

        // The shard read guard has been dropped at the end of the match above, so
        // taking the write guard here will not deadlock. Only remove the entry if
        // it is still expired; another thread may have replaced it in between.
        self.entries.remove_if(key, |_k, v| v.has_expired(now));
        None
    }

    fn put(&self, key: Arc<K>, value: V, time_to_live: Duration) {
        let expires_at = self.clock.now().saturating_add(time_to_live);
        self.entries.insert(key, StoredValue { value, expires_at });
    }

    fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;
    use crate::{common::time::Clock, store::ExpiringStore};

    use std::{sync::Arc, time::Duration};

    #[test]
    fn basic_single_thread() {
        let store = MemoryStore::new();

        store.put(Arc::new("a"), "alice", Duration::from_secs(10));
        store.put(Arc::new("b"), "bob", Duration::from_secs(10));
        assert_eq!(store.get(&"a"), Some("alice"));
        assert_eq!(store.get(&"b"), Some("bob"));
        assert_eq!(store.get(&"c"), None);

        store.put(Arc::new("b"), "bill", Duration::from_secs(10));
        assert_eq!(store.get(&"b"), Some("bill"));

        store.invalidate(&"a");
        assert_eq!(store.get(&"a"), None);
        // Invalidating a missing key is a no-op.
        store.invalidate(&"z");
        assert_eq!(store.entry_count(), 1);
    }

    #[test]
    fn time_to_live() {
        let mut store = MemoryStore::new();
        let (clock, mock) = Clock::mock();
        store.set_clock(clock);

        // Make the store exterior immutable.
        let store = store;

        store.put(Arc::new("a"), "alice", Duration::from_secs(10));
        store.put(Arc::new("b"), "bob", Duration::from_secs(20));

        mock.increment(Duration::from_secs(5)); // 5 secs from the start.
        assert_eq!(store.get(&"a"), Some("alice"));
        assert_eq!(store.get(&"b"), Some("bob"));

        mock.increment(Duration::from_secs(5)); // 10 secs.
        assert_eq!(store.get(&"a"), None);
        assert_eq!(store.get(&"b"), Some("bob"));
        // The expired entry was removed by the get above.
        assert_eq!(store.entry_count(), 1);

        // Re-inserting an expired key starts a new time-to-live.
        store.put(Arc::new("a"), "alex", Duration::from_secs(10));
        mock.increment(Duration::from_secs(9)); // 19 secs.
        assert_eq!(store.get(&"a"), Some("alex"));
        assert_eq!(store.get(&"b"), Some("bob"));

        mock.increment(Duration::from_secs(1)); // 20 secs.
        // Both entries expire at exactly 20 secs.
        assert_eq!(store.get(&"b"), None);
        assert_eq!(store.get(&"a"), None);
        assert_eq!(store.entry_count(), 0);
    }

    #[test]
    fn zero_and_huge_time_to_live() {
        let mut store = MemoryStore::new();
        let (clock, mock) = Clock::mock();
        store.set_clock(clock);
        let store = store;

        store.put(Arc::new(0), "zero", Duration::ZERO);
        assert_eq!(store.get(&0), None);

        store.put(Arc::new(1), "max", Duration::MAX);
        mock.increment(Duration::from_secs(365 * 24 * 3600));
        assert_eq!(store.get(&1), Some("max"));
    }

    #[test]
    fn remove_expired() {
        let mut store = MemoryStore::new();
        let (clock, mock) = Clock::mock();
        store.set_clock(clock);
        let store = store;

        for i in 0..10_u32 {
            store.put(Arc::new(i), i, Duration::from_secs(u64::from(i) + 1));
        }
        assert_eq!(store.entry_count(), 10);

        mock.increment(Duration::from_secs(5));
        store.remove_expired();
        assert_eq!(store.entry_count(), 5);
        assert_eq!(store.get(&4), None);
        assert_eq!(store.get(&5), Some(5));
    }
}
