use std::time::Duration;

pub(crate) const MAX_NANOS: u64 = u64::MAX;

/// `Instant` represents a point in time since the `Clock` was created. It has
/// nanosecond precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Instant {
    elapsed_ns: u64,
}

impl Instant {
    pub(crate) fn from_nanos(nanos: u64) -> Instant {
        Instant { elapsed_ns: nanos }
    }

    pub(crate) fn from_duration_since_clock_start(duration: Duration) -> Instant {
        Instant::from_nanos(Self::duration_to_saturating_nanoseconds(duration))
    }

    /// Converts a `std::time::Duration` to nanoseconds, saturating to
    /// `u64::MAX` if the duration is too large. (`Duration::as_nanos` returns
    /// `u128`)
    ///
    /// A saturated expiry is roughly 584 years after the clock start, which is
    /// treated as "never expires".
    pub(crate) fn duration_to_saturating_nanoseconds(duration: Duration) -> u64 {
        u64::try_from(duration.as_nanos()).unwrap_or(MAX_NANOS)
    }

    pub(crate) fn saturating_add(&self, duration: Duration) -> Instant {
        let dur_ns = Self::duration_to_saturating_nanoseconds(duration);
        Instant::from_nanos(self.elapsed_ns.saturating_add(dur_ns))
    }
}
