use crate::common::concurrent::constants::LOCK_REGISTRY_NUM_SHARDS;

use dashmap::DashMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::{
    any::Any,
    collections::hash_map::RandomState,
    fmt,
    hash::{BuildHasher, Hash},
    sync::Arc,
};
use triomphe::Arc as TrioArc;

pub(crate) type ErrorObject = Arc<dyn Any + Send + Sync + 'static>;

// `None` while the population is in progress (or after the leader panicked).
// `Some` once the leader recorded its result or its error; it is never reset.
pub(crate) type SlotValue<V> = Option<Result<V, ErrorObject>>;

/// A population slot: the coordination record of one in-flight population of a
/// key.
///
/// The caller whose slot gets registered first (the leader) holds the slot's
/// exclusive access for as long as its `init` closure runs. Every other caller
/// of the same key (a follower) blocks acquiring shared access, and then reads
/// the leader's result or error.
///
/// Cloning a `Slot` is cheap; clones refer to the same record.
pub struct Slot<V> {
    value: TrioArc<RwLock<SlotValue<V>>>,
}

impl<V> Slot<V> {
    /// Creates a new, empty (not done) slot.
    pub fn new() -> Self {
        Self {
            value: TrioArc::new(RwLock::new(None)),
        }
    }

    /// Returns `true` if a result or an error has been recorded in this slot.
    ///
    /// Returns `false` without blocking while a leader holds the slot.
    pub fn is_done(&self) -> bool {
        self.value
            .try_read()
            .map_or(false, |value| value.is_some())
    }

    /// Returns `true` if both slots refer to the same record.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        TrioArc::ptr_eq(&self.value, &other.value)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, SlotValue<V>> {
        self.value.write()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, SlotValue<V>> {
        self.value.read()
    }
}

impl<V> Clone for Slot<V> {
    fn clone(&self) -> Self {
        Self {
            value: TrioArc::clone(&self.value),
        }
    }
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for Slot<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("done", &self.is_done())
            .finish()
    }
}

/// A concurrent mapping from keys to their in-flight population
/// [`Slot`][slot-struct]s.
///
/// A [`CoalescingCache`][cache-struct] uses it to arbitrate who populates a
/// missing key. A key is registered only while a population for it is in flight,
/// so once all in-flight populations finish the registry is empty again.
///
/// [`KeyedLockRegistry`][keyed-lock-registry] is the default implementation. A
/// wrapper around it can be given to
/// [`CacheBuilder::lock_registry`][builder-lock-registry] to observe the
/// protocol, e.g. to count how many callers reached slot acquisition.
///
/// [slot-struct]: ./struct.Slot.html
/// [cache-struct]: ./struct.CoalescingCache.html
/// [keyed-lock-registry]: ./struct.KeyedLockRegistry.html
/// [builder-lock-registry]: ./struct.CacheBuilder.html#method.lock_registry
pub trait LockRegistry<K, V>: Send + Sync {
    /// Returns the slot registered for the key if there is one. Otherwise,
    /// registers `new_slot` and returns it.
    ///
    /// This must be a single atomic step: when many callers race on the same
    /// key, all of them must get back the same slot.
    fn get_or_create(&self, key: &Arc<K>, new_slot: Slot<V>) -> Slot<V>;

    /// Removes the slot registered for the key. Does nothing if there is none.
    fn remove(&self, key: &K);

    /// Returns `true` if a slot is registered for the key.
    fn contains(&self, key: &K) -> bool;

    /// Returns `true` if no slot is registered.
    fn is_empty(&self) -> bool;
}

impl<K, V, T> LockRegistry<K, V> for Arc<T>
where
    T: LockRegistry<K, V> + ?Sized,
{
    fn get_or_create(&self, key: &Arc<K>, new_slot: Slot<V>) -> Slot<V> {
        (**self).get_or_create(key, new_slot)
    }

    fn remove(&self, key: &K) {
        (**self).remove(key)
    }

    fn contains(&self, key: &K) -> bool {
        (**self).contains(key)
    }

    fn is_empty(&self) -> bool {
        (**self).is_empty()
    }
}

/// The default [`LockRegistry`][lock-registry], backed by a sharded concurrent
/// hash map.
///
/// `get_or_create` holds the write lock of the key's shard while it looks up and
/// inserts, so it is atomic. Keys in different shards never contend.
///
/// [lock-registry]: ./trait.LockRegistry.html
pub struct KeyedLockRegistry<K, V, S = RandomState> {
    slots: DashMap<Arc<K>, Slot<V>, S>,
}

impl<K, V> KeyedLockRegistry<K, V, RandomState>
where
    K: Hash + Eq,
{
    pub fn new() -> Self {
        Self::with_hasher(RandomState::default())
    }
}

impl<K, V> Default for KeyedLockRegistry<K, V, RandomState>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> KeyedLockRegistry<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Clone,
{
    /// Constructs a new, empty `KeyedLockRegistry` which will use the given hash
    /// builder to hash keys.
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            slots: DashMap::with_hasher_and_shard_amount(hasher, LOCK_REGISTRY_NUM_SHARDS),
        }
    }

    /// Returns the number of registered slots, i.e. the number of keys being
    /// populated right now.
    pub fn len(&self) -> usize {
        self.slots.len()
    }
}

impl<K, V, S> LockRegistry<K, V> for KeyedLockRegistry<K, V, S>
where
    K: Hash + Eq + Send + Sync,
    V: Send + Sync,
    S: BuildHasher + Clone + Send + Sync,
{
    fn get_or_create(&self, key: &Arc<K>, new_slot: Slot<V>) -> Slot<V> {
        let slot = self.slots.entry(Arc::clone(key)).or_insert(new_slot);
        Slot::clone(&slot)
    }

    fn remove(&self, key: &K) {
        self.slots.remove(key);
    }

    fn contains(&self, key: &K) -> bool {
        self.slots.contains_key(key)
    }

    fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<K, V, S> fmt::Debug for KeyedLockRegistry<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedLockRegistry")
            .field("len", &self.slots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{KeyedLockRegistry, LockRegistry, Slot};
    use crate::common::available_parallelism;

    use std::{
        sync::{Arc, Barrier},
        thread,
    };

    #[test]
    fn get_or_create_returns_the_registered_slot() {
        let registry = KeyedLockRegistry::<&str, u32>::new();
        let key = Arc::new("a");
        assert!(registry.is_empty());

        let first = Slot::new();
        let slot = registry.get_or_create(&key, first.clone());
        assert!(slot.ptr_eq(&first));
        assert!(registry.contains(&"a"));
        assert!(!registry.contains(&"b"));

        // A second call on the same key returns the first slot and drops the new
        // one.
        let second = Slot::new();
        let slot = registry.get_or_create(&key, second.clone());
        assert!(slot.ptr_eq(&first));
        assert!(!slot.ptr_eq(&second));
        assert_eq!(registry.len(), 1);

        registry.remove(&"a");
        assert!(!registry.contains(&"a"));
        assert!(registry.is_empty());

        // After removal, a new slot is registered.
        let slot = registry.get_or_create(&key, second.clone());
        assert!(slot.ptr_eq(&second));
    }

    #[test]
    fn remove_missing_key_is_noop() {
        let registry = KeyedLockRegistry::<u32, u32>::new();
        registry.remove(&0);
        assert!(registry.is_empty());

        registry.get_or_create(&Arc::new(1), Slot::new());
        registry.remove(&0);
        registry.remove(&1);
        registry.remove(&1);
        assert!(registry.is_empty());
    }

    #[test]
    fn slot_is_done() {
        let slot = Slot::<u32>::new();
        assert!(!slot.is_done());
        {
            let mut value = slot.write();
            *value = Some(Ok(7));
            // The slot is held by its leader.
            assert!(!slot.is_done());
        }
        assert!(slot.is_done());

        let clone = slot.clone();
        assert!(clone.ptr_eq(&slot));
        assert!(clone.is_done());
        assert!(matches!(&*clone.read(), Some(Ok(7))));
    }

    #[test]
    fn racing_get_or_create_agree_on_one_slot() {
        let num_threads = available_parallelism().max(4) * 4;
        let registry = Arc::new(KeyedLockRegistry::<String, u32>::new());
        let barrier = Arc::new(Barrier::new(num_threads));

        let handles = (0..num_threads)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let key = Arc::new("key1".to_string());
                    barrier.wait();
                    registry.get_or_create(&key, Slot::new())
                })
            })
            .collect::<Vec<_>>();

        let slots = handles
            .into_iter()
            .map(|h| h.join().expect("Failed"))
            .collect::<Vec<_>>();

        assert!(slots.iter().all(|s| s.ptr_eq(&slots[0])));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn distinct_keys_get_distinct_slots() {
        let registry = KeyedLockRegistry::<u32, u32>::new();
        let a = registry.get_or_create(&Arc::new(1), Slot::new());
        let b = registry.get_or_create(&Arc::new(2), Slot::new());
        assert!(!a.ptr_eq(&b));
        assert_eq!(registry.len(), 2);

        registry.remove(&1);
        assert!(registry.contains(&2));
        registry.remove(&2);
        assert!(registry.is_empty());
    }
}
