use chrono::{Duration, Utc};
use hermes_core::Timestamp;
use hermes_ports::Clock;
use std::sync::{Arc, Mutex, PoisonError};

/// Clock frozen at a point in time, moved only by [`advance`](ManualClock::advance)
/// or [`set_time`](ManualClock::set_time)
pub struct ManualClock {
    current: Mutex<Timestamp>,
}

impl ManualClock {
    /// Create a manual clock at the given time
    pub fn new(initial_time: Timestamp) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(initial_time),
        })
    }

    /// Create a manual clock at the current wall time
    pub fn starting_now() -> Arc<Self> {
        Self::new(Utc::now())
    }

    /// Move time forward by a duration
    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *current += duration;
    }

    /// Explicitly set the time
    ///
    /// Warning: this can move time backwards.
    pub fn set_time(&self, time: Timestamp) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = time;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn name(&self) -> &str {
        "ManualClock"
    }
}
