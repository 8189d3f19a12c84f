//! The expiring key-value store that a [`CoalescingCache`][cache-struct] reads
//! through.
//!
//! [cache-struct]: ../sync/struct.CoalescingCache.html

mod memory;

pub use memory::MemoryStore;

use std::{sync::Arc, time::Duration};

/// An expiring key-value store.
///
/// The cache only decides _who_ populates a missing key. Keeping and expiring
/// the entries is entirely up to the store. Implementations must be safe to
/// share across threads; the cache calls them concurrently and without any
/// external locking.
pub trait ExpiringStore<K, V>: Send + Sync {
    /// Returns a _clone_ of the value stored for the key, or `None` if there is
    /// no entry or the entry has expired.
    fn get(&self, key: &K) -> Option<V>;

    /// Stores the value for the key. The entry must stop being returned by
    /// [`get`](#tymethod.get) once `time_to_live` has elapsed.
    ///
    /// If the store has this key present, the value is replaced.
    fn put(&self, key: Arc<K>, value: V, time_to_live: Duration);

    /// Discards any stored value for the key.
    fn invalidate(&self, key: &K);
}

impl<K, V, T> ExpiringStore<K, V> for Arc<T>
where
    T: ExpiringStore<K, V> + ?Sized,
{
    fn get(&self, key: &K) -> Option<V> {
        (**self).get(key)
    }

    fn put(&self, key: Arc<K>, value: V, time_to_live: Duration) {
        (**self).put(key, value, time_to_live)
    }

    fn invalidate(&self, key: &K) {
        (**self).invalidate(key)
    }
}
