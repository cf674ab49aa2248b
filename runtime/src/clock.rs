//! Wall clock for stores.

use std::rc::Rc;

use tabstore_engine::{Clock, MonotonicClock, Timestamp};

/// Milliseconds since the Unix epoch from the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp_millis().max(0) as Timestamp
    }
}

/// System clock that never runs backwards, shared by every store of a tab.
pub fn system_clock() -> Rc<dyn Clock> {
    Rc::new(MonotonicClock::new(SystemClock))
}
