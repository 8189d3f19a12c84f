// Share one cache across threads which all miss on the same few keys at once.
use keyed_lock_cache::sync::CoalescingCache;
use once_cell::sync::Lazy;

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    thread,
    time::{Duration, Instant},
};

static CACHE: Lazy<CoalescingCache<usize, String>> = Lazy::new(CoalescingCache::new);
static QUERIES: AtomicUsize = AtomicUsize::new(0);

// Pretends to be a slow query.
fn query(key: usize) -> String {
    QUERIES.fetch_add(1, Ordering::AcqRel);
    thread::sleep(Duration::from_millis(100));
    format!("value {key}")
}

fn main() {
    const NUM_THREADS: usize = 32;
    const NUM_KEYS: usize = 4;
    let expiry = Duration::from_secs(60);

    let start = Instant::now();

    let threads: Vec<_> = (0..NUM_THREADS)
        .map(|i| {
            thread::spawn(move || {
                let key = i % NUM_KEYS;
                let value = CACHE.get_with(key, expiry, || query(key));
                assert_eq!(value, format!("value {key}"));
            })
        })
        .collect();

    // Wait for all threads to complete.
    threads.into_iter().for_each(|t| t.join().expect("Failed"));

    // Only one query per key was made, and they ran in parallel.
    assert_eq!(QUERIES.load(Ordering::Acquire), NUM_KEYS);
    println!(
        "{NUM_THREADS} reads, {} queries, took {:?}",
        QUERIES.load(Ordering::Acquire),
        start.elapsed()
    );

    // An expiry of zero bypasses the cache and always queries.
    let fresh = CACHE.get_with(0, Duration::ZERO, || query(0));
    assert_eq!(fresh, "value 0");
    assert_eq!(QUERIES.load(Ordering::Acquire), NUM_KEYS + 1);
    assert!(CACHE.lock_registry().is_empty());
}
