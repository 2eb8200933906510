//! Order Ledger service
//!
//! Submission and cancellation publish `order_request` envelopes; state only
//! changes when the platform answers with an `order_response`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use hermes_core::{MarketData, Order, OrderId, OrderSpec, Timestamp};
use hermes_gateway::{
    CallbackList, Envelope, MessageKind, Publisher, SubscriptionId, Subscriptions,
};
use hermes_ports::Clock;
use log::{debug, error, info, warn};
use serde_json::{Map, Value};

use crate::book::{Bucket, LedgerBook, Transition};
use crate::error::{LedgerError, Result};
use crate::ids::OrderIdGenerator;

pub type OrderCallback = dyn Fn(&OrderId, &Order) + Send + Sync;
pub type MarketDataCallback = dyn Fn(&str, &MarketData) + Send + Sync;
pub type PlatformErrorCallback = dyn Fn(&PlatformError) + Send + Sync;

/// An `error` event pushed by the platform
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformError {
    pub message: String,
    pub data: Map<String, Value>,
    pub received_at: Timestamp,
}

pub struct OrderLedger {
    publisher: Arc<dyn Publisher<Envelope>>,
    clock: Arc<dyn Clock>,
    ids: OrderIdGenerator,
    book: Mutex<LedgerBook>,
    market_data: DashMap<String, MarketData>,
    order_listeners: CallbackList<OrderCallback>,
    market_listeners: CallbackList<MarketDataCallback>,
    error_listeners: CallbackList<PlatformErrorCallback>,
}

impl OrderLedger {
    pub fn new(publisher: Arc<dyn Publisher<Envelope>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            publisher,
            clock,
            ids: OrderIdGenerator::new(),
            book: Mutex::new(LedgerBook::new()),
            market_data: DashMap::new(),
            order_listeners: CallbackList::new(),
            market_listeners: CallbackList::new(),
            error_listeners: CallbackList::new(),
        }
    }

    /// Route dispatched order responses, market data and errors here
    pub fn attach(self: &Arc<Self>, subscriptions: &Subscriptions) -> Vec<SubscriptionId> {
        let orders = Arc::clone(self);
        let market = Arc::clone(self);
        let errors = Arc::clone(self);
        vec![
            subscriptions.subscribe(MessageKind::OrderResponse, move |env| {
                orders.on_order_response(env);
            }),
            subscriptions.subscribe(MessageKind::MarketData, move |env| {
                market.on_market_data(env);
            }),
            subscriptions.subscribe(MessageKind::Error, move |env| {
                errors.on_error(env);
            }),
        ]
    }

    fn book(&self) -> MutexGuard<'_, LedgerBook> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Place an order
    ///
    /// The order is Pending before the request leaves. If the send fails it
    /// is removed again and never reaches Active or History.
    pub async fn submit(&self, spec: OrderSpec) -> Result<OrderId> {
        spec.validate().map_err(LedgerError::InvalidOrder)?;

        let now = self.clock.now();
        let id = self.ids.next(now);
        let order = Order::from_spec(id.clone(), spec, now);
        let request = Envelope::at(MessageKind::OrderRequest, now, order.to_request_payload());
        info!(
            "Submitting {} {} {} {} @ {}",
            id, order.direction, order.volume, order.symbol, order.price
        );
        self.book().insert_pending(order);

        if let Err(e) = self.publisher.publish(&request).await {
            self.book().remove_pending(&id);
            warn!("Order {} not sent: {}", id, e);
            return Err(LedgerError::SendFailed {
                order_id: id,
                reason: e.to_string(),
            });
        }
        Ok(id)
    }

    /// Ask the platform to cancel a pending order
    ///
    /// Returns false without sending when the order is not pending, or when
    /// the request could not be sent. Ledger state is left to the response.
    pub async fn cancel(&self, id: &OrderId) -> bool {
        if !self.book().is_pending(id.as_str()) {
            debug!("Cancel ignored, {} is not pending", id);
            return false;
        }

        let mut data = Map::new();
        data.insert("order_id".to_string(), Value::from(id.as_str()));
        data.insert("action".to_string(), Value::from("cancel"));
        let request = Envelope::at(MessageKind::OrderRequest, self.clock.now(), data);

        match self.publisher.publish(&request).await {
            Ok(()) => {
                info!("Cancel requested for {}", id);
                true
            }
            Err(e) => {
                warn!("Cancel for {} not sent: {}", id, e);
                false
            }
        }
    }

    /// Apply an `order_response` envelope
    ///
    /// Returns the transition when the id was pending. Subscribers are
    /// notified once per applied response, outside the ledger lock.
    pub fn on_order_response(&self, envelope: &Envelope) -> Option<Transition> {
        let applied = self.book().apply_response(&envelope.data, self.clock.now());
        let Some(transition) = applied else {
            debug!(
                "Ignoring response for unknown order {}",
                envelope.data_str("order_id").unwrap_or("<missing>")
            );
            return None;
        };

        match transition.bucket {
            Bucket::Active => info!("Order {} {}", transition.order_id, transition.order.status),
            Bucket::History => warn!("Order {} {}", transition.order_id, transition.order.status),
            Bucket::Pending => debug!(
                "Order {} still pending ({})",
                transition.order_id, transition.order.status
            ),
        }

        for callback in self.order_listeners.snapshot() {
            callback(&transition.order_id, &transition.order);
        }
        Some(transition)
    }

    /// Cache a `market_data` envelope by symbol
    pub fn on_market_data(&self, envelope: &Envelope) {
        if envelope.data_str("symbol").is_none() {
            debug!("Market data without symbol dropped");
            return;
        }
        let data = match MarketData::from_value(&Value::Object(envelope.data.clone())) {
            Ok(data) => data,
            Err(e) => {
                warn!("Malformed market data: {}", e);
                return;
            }
        };

        let symbol = data.symbol.clone();
        self.market_data.insert(symbol.clone(), data.clone());
        for callback in self.market_listeners.snapshot() {
            callback(&symbol, &data);
        }
    }

    /// Record an `error` envelope pushed by the platform
    pub fn on_error(&self, envelope: &Envelope) {
        let error = PlatformError {
            message: envelope
                .data_str("message")
                .unwrap_or("Unknown error")
                .to_string(),
            data: envelope.data.clone(),
            received_at: self.clock.now(),
        };
        error!("Error from platform: {}", error.message);
        for callback in self.error_listeners.snapshot() {
            callback(&error);
        }
    }

    /// Find an order, checking Active, then Pending, then History
    pub fn lookup(&self, id: &str) -> Result<Order> {
        self.book()
            .lookup(id)
            .map(|(_, order)| order.clone())
            .ok_or_else(|| LedgerError::UnknownOrder(OrderId::from(id)))
    }

    pub fn bucket_of(&self, id: &str) -> Option<Bucket> {
        self.book().lookup(id).map(|(bucket, _)| bucket)
    }

    pub fn pending_orders(&self) -> Vec<Order> {
        self.book().pending().cloned().collect()
    }

    pub fn active_orders(&self) -> Vec<Order> {
        self.book().active().cloned().collect()
    }

    pub fn order_history(&self) -> Vec<Order> {
        self.book().history().to_vec()
    }

    /// (pending, active, history) sizes
    pub fn counts(&self) -> (usize, usize, usize) {
        let book = self.book();
        (book.pending_count(), book.active_count(), book.history_count())
    }

    pub fn market_data(&self, symbol: &str) -> Option<MarketData> {
        self.market_data.get(symbol).map(|entry| entry.value().clone())
    }

    pub fn symbols(&self) -> Vec<String> {
        self.market_data.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn on_order_update<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&OrderId, &Order) + Send + Sync + 'static,
    {
        self.order_listeners.add(Arc::new(callback))
    }

    pub fn on_market_data_update<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&str, &MarketData) + Send + Sync + 'static,
    {
        self.market_listeners.add(Arc::new(callback))
    }

    pub fn on_platform_error<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&PlatformError) + Send + Sync + 'static,
    {
        self.error_listeners.add(Arc::new(callback))
    }

    /// Remove a listener registered with any of the `on_*` methods
    pub fn remove_listener(&self, id: SubscriptionId) -> bool {
        self.order_listeners.remove(id)
            || self.market_listeners.remove(id)
            || self.error_listeners.remove(id)
    }
}
