pub(crate) mod concurrent;
pub(crate) mod time;

#[cfg(test)]
pub(crate) mod test_utils;

#[cfg(test)]
pub(crate) fn available_parallelism() -> usize {
    use std::{num::NonZeroUsize, thread::available_parallelism};
    available_parallelism().map(NonZeroUsize::get).unwrap_or(1)
}
