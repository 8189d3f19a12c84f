/// The number of shards of the lock registry map. Must be a power of two.
pub(crate) const LOCK_REGISTRY_NUM_SHARDS: usize = 64;

/// How many times a follower restarts the coalescing protocol after observing a
/// slot that its leader left unfinished (panicked `init`, or an error of another
/// type). Exceeding it panics.
pub(crate) const MAX_INIT_RETRIES: usize = 200;
