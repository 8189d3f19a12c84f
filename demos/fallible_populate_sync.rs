//! This example demonstrates how the error returned by a failing populate closure
//! is shared with every thread that was waiting for it. It uses the
//! `try_get_with` method of `CoalescingCache`.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use keyed_lock_cache::sync::CoalescingCache;

#[derive(Debug, thiserror::Error)]
enum FetchError {
    #[error("upstream returned status {0}")]
    Status(u16),
}

// Fails until the upstream is marked as healthy.
fn fetch(healthy: &AtomicBool, key: &str) -> Result<String, FetchError> {
    thread::sleep(Duration::from_millis(200));
    if healthy.load(Ordering::Acquire) {
        Ok(format!("<html>{key}</html>"))
    } else {
        Err(FetchError::Status(503))
    }
}

fn main() {
    let cache: CoalescingCache<String, String> = CoalescingCache::builder()
        .name("pages")
        .build();
    let healthy = Arc::new(AtomicBool::new(false));
    let expiry = Duration::from_secs(30);

    let threads: Vec<_> = (0..8)
        .map(|_| {
            let my_cache = cache.clone();
            let healthy = Arc::clone(&healthy);
            thread::spawn(move || {
                my_cache.try_get_with("/index".to_string(), expiry, || {
                    fetch(&healthy, "/index")
                })
            })
        })
        .collect();

    let results: Vec<_> = threads
        .into_iter()
        .map(|t| t.join().expect("Failed"))
        .collect();

    // Every thread got an error. The threads which waited for the leader got
    // the leader's error, the very same `Arc`.
    for r in &results {
        match r {
            Ok(_) => panic!("Expected an error"),
            Err(e) => println!("error: {e}"),
        }
    }

    // Errors are not cached, so the next call tries again.
    healthy.store(true, Ordering::Release);
    let page = cache
        .try_get_with("/index".to_string(), expiry, || fetch(&healthy, "/index"))
        .expect("Upstream is healthy");
    assert_eq!(page, "<html>/index</html>");
    assert_eq!(cache.get(&"/index".to_string()), Some(page));
}
