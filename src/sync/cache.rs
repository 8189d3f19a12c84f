use super::{
    value_initializer::{InitResult, ValueInitializer},
    CacheBuilder, LockRegistry,
};
use crate::{policy::CachePolicy, store::ExpiringStore};

use std::{fmt, hash::Hash, sync::Arc, time::Duration};

/// A thread-safe, read-through cache that coalesces concurrent misses on the
/// same key.
///
/// `CoalescingCache` reads values from an [`ExpiringStore`][store-trait]. When a
/// value is missing, it is populated by the `init` closure given to
/// [`get_with`](#method.get_with), [`try_get_with`](#method.try_get_with) or
/// [`optionally_get_with`](#method.optionally_get_with), and stored with the
/// requested expiry.
///
/// When many threads miss on the same key at the same time, only one of them (the
/// _leader_) evaluates its `init` closure. The others (the _followers_) block
/// until the leader finishes, and then return the leader's value, or the leader's
/// error. Calls on different keys never wait for each other. A cache hit takes no
/// lock at all.
///
/// # Examples
///
/// ```rust
/// use keyed_lock_cache::sync::CoalescingCache;
///
/// use std::{
///     sync::{
///         atomic::{AtomicUsize, Ordering},
///         Arc,
///     },
///     thread,
///     time::Duration,
/// };
///
/// const NUM_THREADS: usize = 16;
///
/// let cache = CoalescingCache::new();
/// let calls = Arc::new(AtomicUsize::default());
///
/// let threads: Vec<_> = (0..NUM_THREADS)
///     .map(|_| {
///         // To share the same cache across the threads, clone it.
///         // This is a cheap operation.
///         let my_cache = cache.clone();
///         let my_calls = Arc::clone(&calls);
///         thread::spawn(move || {
///             my_cache.get_with("user:42", Duration::from_secs(60), || {
///                 // An expensive lookup, e.g. a database query.
///                 my_calls.fetch_add(1, Ordering::AcqRel);
///                 thread::sleep(Duration::from_millis(100));
///                 Arc::new("alice".to_string())
///             })
///         })
///     })
///     .collect();
///
/// for t in threads {
///     assert_eq!(*t.join().expect("Failed"), "alice");
/// }
///
/// // All sixteen calls were served by a single evaluation.
/// assert_eq!(calls.load(Ordering::Acquire), 1);
/// assert!(cache.lock_registry().is_empty());
/// ```
///
/// # Zero expiry
///
/// By default, a call with a zero `expiry` skips the cache altogether and returns
/// the result of its `init` closure. Use
/// [`AlwaysUseCache`][always-use-cache] to coalesce such calls too.
///
/// # Sharing a cache across threads
///
/// Cloning is a cheap operation for `CoalescingCache` as it only creates
/// thread-safe reference-counted pointers to the store, the lock registry and the
/// policy.
///
/// [store-trait]: ../store/trait.ExpiringStore.html
/// [always-use-cache]: ../policy/struct.AlwaysUseCache.html
pub struct CoalescingCache<K, V> {
    name: Option<Arc<str>>,
    store: Arc<dyn ExpiringStore<K, V>>,
    policy: Arc<dyn CachePolicy>,
    value_initializer: Arc<ValueInitializer<K, V>>,
}

impl<K, V> Clone for CoalescingCache<K, V> {
    /// Makes a clone of this shared cache.
    ///
    /// This operation is cheap as it only creates thread-safe reference counted
    /// pointers to the shared internal data structures.
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            store: Arc::clone(&self.store),
            policy: Arc::clone(&self.policy),
            value_initializer: Arc::clone(&self.value_initializer),
        }
    }
}

impl<K, V> fmt::Debug for CoalescingCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoalescingCache")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<K, V> CoalescingCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Constructs a new `CoalescingCache<K, V>` backed by an unbounded
    /// [`MemoryStore`][memory-store], with the default cache policy.
    ///
    /// To use another store, lock registry or policy, use the
    /// [`CacheBuilder`][builder-struct].
    ///
    /// [memory-store]: ../store/struct.MemoryStore.html
    /// [builder-struct]: ./struct.CacheBuilder.html
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Returns a [`CacheBuilder`][builder-struct], which can build a
    /// `CoalescingCache` with various configuration knobs.
    ///
    /// [builder-struct]: ./struct.CacheBuilder.html
    pub fn builder() -> CacheBuilder<K, V> {
        CacheBuilder::default()
    }

    pub(crate) fn with_everything(
        name: Option<String>,
        store: Arc<dyn ExpiringStore<K, V>>,
        lock_registry: Arc<dyn LockRegistry<K, V>>,
        policy: Arc<dyn CachePolicy>,
    ) -> Self {
        Self {
            name: name.as_deref().map(Arc::from),
            store,
            policy,
            value_initializer: Arc::new(ValueInitializer::new(lock_registry, name)),
        }
    }
}

impl<K, V> Default for CoalescingCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> CoalescingCache<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    /// Returns the name of this cache, if it was given one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the lock registry that arbitrates who populates a missing key.
    ///
    /// Once every in-flight `*get_with` call has returned, the registry is
    /// empty.
    pub fn lock_registry(&self) -> &dyn LockRegistry<K, V> {
        self.value_initializer.registry()
    }

    /// Returns `true` if a call with the given `expiry` goes through the cache,
    /// as decided by the [`CachePolicy`][cache-policy] of this cache.
    ///
    /// [cache-policy]: ../policy/trait.CachePolicy.html
    pub fn should_use_cache(&self, expiry: Duration) -> bool {
        self.policy.should_use_cache(expiry)
    }

    /// Returns a _clone_ of the value stored for the key, without populating it
    /// on a miss.
    ///
    /// If you want to store values that will be expensive to clone, wrap them by
    /// `std::sync::Arc` before storing in a cache. [`Arc`][rustdoc-std-arc] is a
    /// thread-safe reference-counted pointer and its `clone()` method is cheap.
    ///
    /// [rustdoc-std-arc]: https://doc.rust-lang.org/stable/std/sync/struct.Arc.html
    pub fn get(&self, key: &K) -> Option<V> {
        self.store.get(key)
    }

    /// Returns a _clone_ of the value for the key. If the value is missing, this
    /// method evaluates the `init` closure and stores the returned value with the
    /// given `expiry`.
    ///
    /// This method prevents to evaluate the `init` closure multiple times on the
    /// same key even if the method is concurrently called by many threads; only
    /// one of the calls evaluates its closure, and other calls wait for that
    /// closure to complete.
    ///
    /// If the [`CachePolicy`][cache-policy] rejects `expiry` (by default, a zero
    /// expiry), this method returns the result of `init` without reading or
    /// writing the cache.
    ///
    /// # Example
    ///
    /// ```rust
    /// use keyed_lock_cache::sync::CoalescingCache;
    /// use std::time::Duration;
    ///
    /// let cache = CoalescingCache::new();
    /// let expiry = Duration::from_secs(1000);
    ///
    /// assert_eq!(cache.get_with(0, expiry, || "zero"), "zero");
    /// // The stored value is returned, the closure is not evaluated.
    /// assert_eq!(cache.get_with(0, expiry, || "ZERO"), "zero");
    ///
    /// // A zero expiry skips the cache.
    /// assert_eq!(cache.get_with(0, Duration::ZERO, || "bypassed"), "bypassed");
    /// assert_eq!(cache.get(&0), Some("zero"));
    /// ```
    ///
    /// # Panics
    ///
    /// This method panics when the `init` closure has been panicked. When it
    /// happens, only the caller whose `init` closure panicked will get the panic.
    /// If there are other calls in progress on the same key, they will restart and
    /// one of them will evaluate its own `init` closure.
    ///
    /// [cache-policy]: ../policy/trait.CachePolicy.html
    pub fn get_with(&self, key: K, expiry: Duration, init: impl FnOnce() -> V) -> V {
        if !self.should_use_cache(expiry) {
            return init();
        }

        let key = Arc::new(key);
        if let Some(v) = self.store.get(&*key) {
            return v;
        }

        let get = || self.store.get(&*key);
        let insert = |v: V| self.store.put(Arc::clone(&key), v, expiry);

        match self
            .value_initializer
            .init_or_read(&key, get, init, insert)
        {
            InitResult::Initialized(v) | InitResult::ReadExisting(v) => v,
            InitResult::InitErr(_) => unreachable!(),
        }
    }

    /// Try to ensure the value of the key exists by storing an `Ok` result of the
    /// `init` closure with the given `expiry` if not exist, and returns a _clone_
    /// of the value or the `Err` returned by the closure.
    ///
    /// This method prevents to evaluate the `init` closure multiple times on the
    /// same key even if the method is concurrently called by many threads; only
    /// one of the calls evaluates its closure (as long as these closures return
    /// the same error type), and other calls wait for that closure to complete.
    ///
    /// When the closure returns an `Err`, nothing is stored, and the very same
    /// error (the same `Arc`) is returned to every call that was waiting for it.
    /// A later call will evaluate its closure again.
    ///
    /// # Example
    ///
    /// ```rust
    /// use keyed_lock_cache::sync::CoalescingCache;
    /// use std::{sync::Arc, time::Duration};
    ///
    /// #[derive(Debug)]
    /// struct DbError(&'static str);
    ///
    /// let cache: CoalescingCache<&str, u64> = CoalescingCache::new();
    /// let expiry = Duration::from_secs(60);
    ///
    /// let r = cache.try_get_with("count", expiry, || Err(DbError("timed out")));
    /// assert_eq!(r.unwrap_err().0, "timed out");
    /// assert_eq!(cache.get(&"count"), None);
    ///
    /// let r: Result<_, Arc<DbError>> = cache.try_get_with("count", expiry, || Ok(3));
    /// assert_eq!(r.unwrap(), 3);
    /// assert_eq!(cache.get(&"count"), Some(3));
    /// ```
    ///
    /// # Panics
    ///
    /// This method panics when the `init` closure has been panicked. When it
    /// happens, only the caller whose `init` closure panicked will get the panic.
    /// If there are other calls in progress on the same key, they will restart and
    /// one of them will evaluate its own `init` closure.
    pub fn try_get_with<F, E>(&self, key: K, expiry: Duration, init: F) -> Result<V, Arc<E>>
    where
        F: FnOnce() -> Result<V, E>,
        E: Send + Sync + 'static,
    {
        if !self.should_use_cache(expiry) {
            return init().map_err(Arc::new);
        }

        let key = Arc::new(key);
        if let Some(v) = self.store.get(&*key) {
            return Ok(v);
        }

        let get = || self.store.get(&*key);
        let insert = |v: V| self.store.put(Arc::clone(&key), v, expiry);

        match self
            .value_initializer
            .try_init_or_read(&key, get, init, insert)
        {
            InitResult::Initialized(v) | InitResult::ReadExisting(v) => Ok(v),
            InitResult::InitErr(e) => Err(e),
        }
    }

    /// Try to ensure the value of the key exists by storing a `Some` result of the
    /// `init` closure with the given `expiry` if not exist, and returns a _clone_
    /// of the value, or `None` if the closure returned `None`.
    ///
    /// Concurrent calls on the same key are coalesced like
    /// [`try_get_with`](#method.try_get_with) does: when the leader's closure
    /// returns `None`, nothing is stored and every waiting call returns `None`.
    ///
    /// # Panics
    ///
    /// This method panics when the `init` closure has been panicked. When it
    /// happens, only the caller whose `init` closure panicked will get the panic.
    pub fn optionally_get_with<F>(&self, key: K, expiry: Duration, init: F) -> Option<V>
    where
        F: FnOnce() -> Option<V>,
    {
        if !self.should_use_cache(expiry) {
            return init();
        }

        let key = Arc::new(key);
        if let Some(v) = self.store.get(&*key) {
            return Some(v);
        }

        let get = || self.store.get(&*key);
        let insert = |v: V| self.store.put(Arc::clone(&key), v, expiry);

        match self
            .value_initializer
            .optionally_init_or_read(&key, get, init, insert)
        {
            InitResult::Initialized(v) | InitResult::ReadExisting(v) => Some(v),
            InitResult::InitErr(_) => None,
        }
    }

    /// Stores the value for the key with the given `expiry`, replacing any stored
    /// value. Does nothing if the [`CachePolicy`][cache-policy] rejects `expiry`.
    ///
    /// This does not wait for, nor interrupt, a population in flight for the
    /// same key; whichever write happens last wins.
    ///
    /// [cache-policy]: ../policy/trait.CachePolicy.html
    pub fn insert(&self, key: K, value: V, expiry: Duration) {
        if self.should_use_cache(expiry) {
            self.store.put(Arc::new(key), value, expiry);
        }
    }

    /// Discards any stored value for the key.
    pub fn invalidate(&self, key: &K) {
        self.store.invalidate(key);
    }
}
