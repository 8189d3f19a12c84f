//! Provides a thread-safe, request-coalescing read-through cache.

mod builder;
mod cache;
mod key_lock;
mod value_initializer;

pub use {
    builder::CacheBuilder,
    cache::CoalescingCache,
    key_lock::{KeyedLockRegistry, LockRegistry, Slot},
};

// Empty struct to be used in `InitResult::InitErr` to represent the Option None.
pub(crate) struct OptionallyNone;
