//! Monotonic time sources.
//!
//! A [`TokenBucket`](crate::TokenBucket) never reads the system clock directly; it asks
//! its [`Clock`]. Production code uses [`MonotonicClock`]. Tests drive time explicitly
//! with [`ManualClock`].

use std::{
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
    time::{Duration, Instant},
};

/// A source of monotonic time points.
///
/// Implementations should never run backward. The bucket tolerates ones that do by
/// treating a regression as zero elapsed time.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> Instant;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// The process monotonic clock, [`Instant::now`].
#[derive(Clone, Copy, Debug, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a test can hand one clone to the bucket and keep
/// another to advance it.
///
/// ```
/// use std::time::Duration;
/// use tokenbucket::{Clock, ManualClock};
///
/// let clock = ManualClock::new();
/// let t0 = clock.now();
/// clock.advance(Duration::from_millis(250));
/// assert_eq!(clock.now() - t0, Duration::from_millis(250));
/// ```
#[derive(Clone, Debug)]
pub struct ManualClock {
    base: Instant,
    offset_nanos: Arc<AtomicI64>,
}

impl ManualClock {
    // Room to rewind below the starting point without underflowing `Instant`.
    const REWIND_HEADROOM: Duration = Duration::from_secs(3600);

    /// Create a clock frozen at an arbitrary starting point.
    pub fn new() -> Self {
        let now = Instant::now();
        let base = now.checked_add(Self::REWIND_HEADROOM).unwrap_or(now);

        Self {
            base,
            offset_nanos: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        self.offset_nanos
            .fetch_add(duration_to_nanos(by), Ordering::AcqRel);
    }

    /// Move time backward, simulating a misbehaving time source.
    ///
    /// Time never goes more than an hour behind the clock's starting point; rewinding
    /// further stops there.
    pub fn rewind(&self, by: Duration) {
        self.offset_nanos
            .fetch_sub(duration_to_nanos(by), Ordering::AcqRel);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.offset_nanos.load(Ordering::Acquire);
        let magnitude = Duration::from_nanos(offset.unsigned_abs());

        if offset >= 0 {
            self.base.checked_add(magnitude).unwrap_or(self.base)
        } else {
            let magnitude = magnitude.min(Self::REWIND_HEADROOM);
            self.base.checked_sub(magnitude).unwrap_or(self.base)
        }
    }
}

pub(crate) fn duration_to_nanos(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX)
}
