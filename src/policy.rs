use std::time::Duration;

/// Decides whether a `*get_with` call goes through the cache at all.
///
/// When [`should_use_cache`](#method.should_use_cache) returns `false` for the
/// requested expiry, the call bypasses both the store and the lock registry,
/// and simply returns the result of its `init` closure. Nothing is stored and
/// the call is not coalesced with any other call.
///
/// # Examples
///
/// ```rust
/// use keyed_lock_cache::{policy::CachePolicy, sync::CoalescingCache};
/// use std::time::Duration;
///
/// /// Only cache values which are expected to stay fresh for a while.
/// struct AtLeastOneSecond;
///
/// impl CachePolicy for AtLeastOneSecond {
///     fn should_use_cache(&self, expiry: Duration) -> bool {
///         expiry >= Duration::from_secs(1)
///     }
/// }
///
/// let cache = CoalescingCache::builder()
///     .cache_policy(AtLeastOneSecond)
///     .build();
///
/// let v = cache.get_with("a", Duration::from_millis(10), || "alice");
/// assert_eq!(v, "alice");
/// assert_eq!(cache.get(&"a"), None);
/// ```
pub trait CachePolicy: Send + Sync {
    /// Returns `true` if a value populated with the given `expiry` should be read
    /// from and stored into the cache.
    ///
    /// The default implementation returns `true` iff `expiry` is not zero, as
    /// there is no reason to touch the store and the lock registry for a value
    /// that would expire immediately.
    fn should_use_cache(&self, expiry: Duration) -> bool {
        !expiry.is_zero()
    }
}

/// The default [`CachePolicy`][cache-policy]: uses the cache for any non-zero
/// expiry.
///
/// [cache-policy]: ./trait.CachePolicy.html
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultPolicy;

impl CachePolicy for DefaultPolicy {}

/// A [`CachePolicy`][cache-policy] that uses the cache even for a zero expiry.
///
/// With this policy, a zero expiry value is stored already expired, so later
/// calls populate again. Concurrent calls on the same key are still coalesced
/// onto a single `init` evaluation.
///
/// [cache-policy]: ./trait.CachePolicy.html
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysUseCache;

impl CachePolicy for AlwaysUseCache {
    fn should_use_cache(&self, _expiry: Duration) -> bool {
        true
    }
}
