//! Wall-clock abstraction for timestamping history entries, events and
//! snapshots.
//!
//! The engine never reads the system time itself. Hosts inject a [`Clock`];
//! tests use [`ManualClock`] for deterministic timestamps.

use crate::Timestamp;
use std::cell::Cell;

/// Source of epoch-millisecond timestamps.
pub trait Clock {
    /// Current time in milliseconds since the Unix epoch.
    fn now(&self) -> Timestamp;
}

impl<F> Clock for F
where
    F: Fn() -> Timestamp,
{
    fn now(&self) -> Timestamp {
        self()
    }
}

/// A clock whose time only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Timestamp>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    /// Jump to an absolute time. Moving backwards is allowed.
    pub fn set(&self, now: Timestamp) {
        self.now.set(now);
    }

    /// Advance by `millis` and return the new time.
    pub fn advance(&self, millis: Timestamp) -> Timestamp {
        let next = self.now.get().saturating_add(millis);
        self.now.set(next);
        next
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.get()
    }
}

/// Wraps another clock so readings never go backwards.
///
/// Wall clocks can step back (NTP adjustments, manual changes). Snapshot
/// timestamps feed last-writer-wins comparisons, so a reading lower than a
/// previous one is clamped to the previous reading.
#[derive(Debug)]
pub struct MonotonicClock<C> {
    inner: C,
    last: Cell<Timestamp>,
}

impl<C: Clock> MonotonicClock<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            last: Cell::new(0),
        }
    }

    /// Highest timestamp handed out so far.
    pub fn last(&self) -> Timestamp {
        self.last.get()
    }
}

impl<C: Clock> Clock for MonotonicClock<C> {
    fn now(&self) -> Timestamp {
        let next = self.inner.now().max(self.last.get());
        self.last.set(next);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_starts_where_told() {
        let clock = ManualClock::new(1000);
        assert_eq!(clock.now(), 1000);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1000);
        assert_eq!(clock.advance(5), 1005);
        assert_eq!(clock.now(), 1005);
        clock.set(10);
        assert_eq!(clock.now(), 10);
    }

    #[test]
    fn closure_is_a_clock() {
        let clock = || 42u64;
        assert_eq!(Clock::now(&clock), 42);
    }

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new(ManualClock::new(2000));
        assert_eq!(clock.now(), 2000);

        clock.inner.set(1500);
        assert_eq!(clock.now(), 2000);

        clock.inner.set(2500);
        assert_eq!(clock.now(), 2500);
        assert_eq!(clock.last(), 2500);
    }
}
