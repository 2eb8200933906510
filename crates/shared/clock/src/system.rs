use chrono::Utc;
use hermes_core::Timestamp;
use hermes_ports::Clock;
use std::sync::Arc;

/// Wall-clock time, used by the running bridge
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }

    /// Shared handle, the form most components take a clock in
    pub fn shared() -> Arc<dyn Clock> {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }

    fn name(&self) -> &str {
        "SystemClock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_tracks_wall_time() {
        let clock = SystemClock::shared();
        let before = Utc::now();
        let seen = clock.now();
        let after = Utc::now();

        assert!(before <= seen && seen <= after);
        assert_eq!(clock.name(), "SystemClock");
    }
}
