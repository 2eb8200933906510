//! Pending / Active / History buckets
//!
//! Pure state with no I/O. The ledger wraps it in a mutex and calls into it
//! from both the submission path and the dispatch path.

use std::collections::HashMap;

use hermes_core::{Order, OrderId, Timestamp};
use serde_json::{Map, Value};

/// Where an order record currently lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Pending,
    Active,
    History,
}

/// Outcome of applying one order response
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub order_id: OrderId,
    /// Bucket the order ended up in
    pub bucket: Bucket,
    /// Copy of the merged record
    pub order: Order,
}

#[derive(Debug, Default)]
pub struct LedgerBook {
    pending: HashMap<OrderId, Order>,
    active: HashMap<OrderId, Order>,
    history: Vec<Order>,
}

impl LedgerBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_pending(&mut self, order: Order) {
        self.pending.insert(order.id.clone(), order);
    }

    /// Drop a pending order whose send failed
    pub fn remove_pending(&mut self, id: &OrderId) -> Option<Order> {
        self.pending.remove(id)
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    /// Apply an `order_response` payload
    ///
    /// Only ids still pending are considered; anything else is `None`.
    /// Filled and partially filled orders move to Active, rejected and
    /// canceled ones to History. Other statuses update the record in place.
    pub fn apply_response(&mut self, data: &Map<String, Value>, at: Timestamp) -> Option<Transition> {
        let id = data.get("order_id").and_then(Value::as_str)?;
        let mut order = self.pending.remove(id)?;
        order.merge_response(data, at);

        let bucket = if order.status.is_live() {
            self.active.insert(order.id.clone(), order.clone());
            Bucket::Active
        } else if order.status.is_terminal() {
            self.history.push(order.clone());
            Bucket::History
        } else {
            self.pending.insert(order.id.clone(), order.clone());
            Bucket::Pending
        };

        Some(Transition {
            order_id: order.id.clone(),
            bucket,
            order,
        })
    }

    /// Find an order, checking Active, then Pending, then History
    pub fn lookup(&self, id: &str) -> Option<(Bucket, &Order)> {
        if let Some(order) = self.active.get(id) {
            return Some((Bucket::Active, order));
        }
        if let Some(order) = self.pending.get(id) {
            return Some((Bucket::Pending, order));
        }
        self.history
            .iter()
            .rev()
            .find(|order| order.id.as_str() == id)
            .map(|order| (Bucket::History, order))
    }

    pub fn pending(&self) -> impl Iterator<Item = &Order> {
        self.pending.values()
    }

    pub fn active(&self) -> impl Iterator<Item = &Order> {
        self.active.values()
    }

    /// Terminal orders, oldest first
    pub fn history(&self) -> &[Order] {
        &self.history
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn history_count(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hermes_core::{OrderSpec, OrderStatus, Side};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn pending_order(id: &str) -> Order {
        let spec = OrderSpec::limit("EURUSD", Side::Buy, dec!(1.1000), dec!(0.1));
        Order::from_spec(OrderId::new(id), spec, Utc::now())
    }

    fn response(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_filled_moves_to_active() {
        let mut book = LedgerBook::new();
        book.insert_pending(pending_order("order_1"));

        let transition = book
            .apply_response(
                &response(json!({"order_id": "order_1", "status": "filled", "fill_price": 1.1001})),
                Utc::now(),
            )
            .unwrap();

        assert_eq!(transition.bucket, Bucket::Active);
        assert_eq!(transition.order.status, OrderStatus::Filled);
        assert_eq!(transition.order.peer_fields["fill_price"], json!(1.1001));
        assert_eq!(book.pending_count(), 0);
        assert_eq!(book.active_count(), 1);
    }

    #[test]
    fn test_duplicate_response_is_noop() {
        let mut book = LedgerBook::new();
        book.insert_pending(pending_order("order_1"));
        let filled = response(json!({"order_id": "order_1", "status": "filled"}));

        assert!(book.apply_response(&filled, Utc::now()).is_some());
        assert!(book.apply_response(&filled, Utc::now()).is_none());
        assert_eq!(book.active_count(), 1);
    }

    #[test]
    fn test_rejected_moves_to_history() {
        let mut book = LedgerBook::new();
        book.insert_pending(pending_order("order_1"));

        let transition = book
            .apply_response(
                &response(json!({"order_id": "order_1", "status": "rejected", "reason": "no money"})),
                Utc::now(),
            )
            .unwrap();

        assert_eq!(transition.bucket, Bucket::History);
        assert!(!book.is_pending("order_1"));
        assert_eq!(book.active_count(), 0);
        assert_eq!(book.history()[0].peer_fields["reason"], "no money");
    }

    #[test]
    fn test_unrecognized_status_stays_pending() {
        let mut book = LedgerBook::new();
        book.insert_pending(pending_order("order_1"));

        let transition = book
            .apply_response(
                &response(json!({"order_id": "order_1", "status": "placed", "ticket": 42})),
                Utc::now(),
            )
            .unwrap();

        assert_eq!(transition.bucket, Bucket::Pending);
        assert_eq!(transition.order.status, OrderStatus::Unknown);
        assert!(book.is_pending("order_1"));
    }

    #[test]
    fn test_unknown_or_missing_id_ignored() {
        let mut book = LedgerBook::new();
        book.insert_pending(pending_order("order_1"));

        assert!(book
            .apply_response(&response(json!({"order_id": "order_9", "status": "filled"})), Utc::now())
            .is_none());
        assert!(book
            .apply_response(&response(json!({"status": "filled"})), Utc::now())
            .is_none());
        assert_eq!(book.pending_count(), 1);
    }

    #[test]
    fn test_lookup_order() {
        let mut book = LedgerBook::new();
        book.insert_pending(pending_order("order_1"));
        book.insert_pending(pending_order("order_2"));
        book.insert_pending(pending_order("order_3"));
        book.apply_response(&response(json!({"order_id": "order_2", "status": "filled"})), Utc::now());
        book.apply_response(&response(json!({"order_id": "order_3", "status": "canceled"})), Utc::now());

        assert_eq!(book.lookup("order_1").unwrap().0, Bucket::Pending);
        assert_eq!(book.lookup("order_2").unwrap().0, Bucket::Active);
        assert_eq!(book.lookup("order_3").unwrap().0, Bucket::History);
        assert!(book.lookup("order_4").is_none());
    }
}
