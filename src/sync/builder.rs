use super::{CoalescingCache, KeyedLockRegistry, LockRegistry};
use crate::{
    policy::{CachePolicy, DefaultPolicy},
    store::{ExpiringStore, MemoryStore},
};

use std::{
    collections::hash_map::RandomState,
    hash::{BuildHasher, Hash},
    sync::Arc,
};

/// Builds a [`CoalescingCache`][cache-struct] with various configuration knobs.
///
/// Every knob is optional. By default, the cache is backed by an unbounded
/// [`MemoryStore`][memory-store] and a [`KeyedLockRegistry`][keyed-lock-registry],
/// and uses the [`DefaultPolicy`][default-policy].
///
/// # Examples
///
/// ```rust
/// use keyed_lock_cache::{
///     policy::AlwaysUseCache,
///     store::MemoryStore,
///     sync::CacheBuilder,
/// };
///
/// use std::{sync::Arc, time::Duration};
///
/// // Keep a handle to the store to inspect it later.
/// let store = Arc::new(MemoryStore::new());
///
/// let cache = CacheBuilder::new()
///     .name("users")
///     .store(Arc::clone(&store))
///     // Coalesce calls even when they ask for a zero expiry.
///     .cache_policy(AlwaysUseCache)
///     .build();
///
/// cache.get_with(42, Duration::from_secs(30), || "alice");
/// assert_eq!(store.entry_count(), 1);
/// assert_eq!(cache.name(), Some("users"));
/// ```
///
/// [cache-struct]: ./struct.CoalescingCache.html
/// [memory-store]: ../store/struct.MemoryStore.html
/// [keyed-lock-registry]: ./struct.KeyedLockRegistry.html
/// [default-policy]: ../policy/struct.DefaultPolicy.html
pub struct CacheBuilder<K, V> {
    name: Option<String>,
    store: Option<Arc<dyn ExpiringStore<K, V>>>,
    lock_registry: Option<Arc<dyn LockRegistry<K, V>>>,
    cache_policy: Option<Arc<dyn CachePolicy>>,
}

impl<K, V> Default for CacheBuilder<K, V> {
    fn default() -> Self {
        Self {
            name: None,
            store: None,
            lock_registry: None,
            cache_policy: None,
        }
    }
}

impl<K, V> CacheBuilder<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Construct a new `CacheBuilder` that will be used to build a
    /// `CoalescingCache`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name of the cache. Currently the name is used for identification
    /// only in logging messages.
    pub fn name(self, name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..self
        }
    }

    /// Sets the expiring store the cache reads through.
    ///
    /// Pass an `Arc` of the store to keep your own handle to it.
    pub fn store(self, store: impl ExpiringStore<K, V> + 'static) -> Self {
        Self {
            store: Some(Arc::new(store)),
            ..self
        }
    }

    /// Sets the lock registry used to coalesce concurrent misses.
    ///
    /// A cache built with a registry shared with another cache coalesces its
    /// calls with that cache too.
    pub fn lock_registry(self, registry: impl LockRegistry<K, V> + 'static) -> Self {
        Self {
            lock_registry: Some(Arc::new(registry)),
            ..self
        }
    }

    /// Sets the policy deciding which expiries go through the cache.
    pub fn cache_policy(self, policy: impl CachePolicy + 'static) -> Self {
        Self {
            cache_policy: Some(Arc::new(policy)),
            ..self
        }
    }

    /// Builds a `CoalescingCache<K, V>`.
    pub fn build(self) -> CoalescingCache<K, V> {
        self.build_with_hasher(RandomState::default())
    }

    /// Builds a `CoalescingCache<K, V>`, whose default store and lock registry
    /// will use the given `hasher`.
    ///
    /// The `hasher` is not used by a store or a lock registry given to this
    /// builder.
    pub fn build_with_hasher<S>(self, hasher: S) -> CoalescingCache<K, V>
    where
        S: BuildHasher + Clone + Send + Sync + 'static,
    {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::with_hasher(hasher.clone())));
        let lock_registry = self
            .lock_registry
            .unwrap_or_else(|| Arc::new(KeyedLockRegistry::with_hasher(hasher)));
        let cache_policy = self
            .cache_policy
            .unwrap_or_else(|| Arc::new(DefaultPolicy));

        CoalescingCache::with_everything(self.name, store, lock_registry, cache_policy)
    }
}
