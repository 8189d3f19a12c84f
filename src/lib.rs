#![warn(clippy::all)]
#![warn(rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! `keyed_lock_cache` is a read-through cache which prevents cache stampedes.
//!
//! When many threads miss on the same key at the same time, only one of them
//! evaluates the (expensive) closure populating that key. The other threads
//! block until it finishes, then return its value, or its error. Threads asking
//! for other keys are not blocked, and cache hits take no lock at all.
//!
//! The values themselves are kept by an [`ExpiringStore`][store-trait]. The
//! crate ships an unbounded in-memory [`MemoryStore`][memory-store], and any
//! thread-safe store with per-entry time-to-live can be plugged in instead.
//!
//! # Examples
//!
//! ```rust
//! use keyed_lock_cache::sync::CoalescingCache;
//! use std::time::Duration;
//!
//! #[derive(Debug)]
//! struct NotFound;
//!
//! fn load_user(id: u32) -> Result<String, NotFound> {
//!     // e.g. a database query.
//!     if id == 42 { Ok("alice".into()) } else { Err(NotFound) }
//! }
//!
//! let cache = CoalescingCache::new();
//! let expiry = Duration::from_secs(30);
//!
//! assert_eq!(cache.try_get_with(42, expiry, || load_user(42)).unwrap(), "alice");
//! assert!(cache.try_get_with(7, expiry, || load_user(7)).is_err());
//! ```
//!
//! # Minimum Supported Rust Versions
//!
//! This crate's minimum supported Rust versions (MSRV) is 1.65.
//!
//! [store-trait]: ./store/trait.ExpiringStore.html
//! [memory-store]: ./store/struct.MemoryStore.html

pub(crate) mod common;
pub mod policy;
pub mod store;
pub mod sync;

pub use policy::CachePolicy;
