//! Order id generation

use std::sync::atomic::{AtomicI64, Ordering};

use hermes_core::{OrderId, Timestamp};

/// Issues `order_{millis}` ids from submission time
///
/// Ids strictly increase: two submissions within the same millisecond get
/// consecutive values instead of colliding.
#[derive(Debug, Default)]
pub struct OrderIdGenerator {
    last_millis: AtomicI64,
}

impl OrderIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, now: Timestamp) -> OrderId {
        let millis = now.timestamp_millis();
        let mut previous = self.last_millis.load(Ordering::Acquire);
        loop {
            let candidate = millis.max(previous + 1);
            match self.last_millis.compare_exchange_weak(
                previous,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return OrderId::new(format!("order_{candidate}")),
                Err(actual) => previous = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_id_from_submission_time() {
        let ids = OrderIdGenerator::new();
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(ids.next(at).as_str(), "order_1700000000123");
    }

    #[test]
    fn test_same_millisecond_stays_unique() {
        let ids = OrderIdGenerator::new();
        let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();

        let first = ids.next(at);
        let second = ids.next(at);
        assert_eq!(first.as_str(), "order_1700000000000");
        assert_eq!(second.as_str(), "order_1700000000001");
    }

    #[test]
    fn test_clock_going_backwards_stays_monotonic() {
        let ids = OrderIdGenerator::new();
        let later = Utc.timestamp_millis_opt(2_000).unwrap();
        let earlier = Utc.timestamp_millis_opt(1_000).unwrap();

        ids.next(later);
        assert_eq!(ids.next(earlier).as_str(), "order_2001");
    }
}
