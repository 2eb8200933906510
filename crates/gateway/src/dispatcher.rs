//! Inbound event dispatch
//!
//! The [`Dispatcher`] owns the read side of the inbound pipe. Each frame is
//! decoded into an [`Envelope`] and handed to every callback registered for
//! its [`MessageKind`], in registration order. A callback may subscribe or
//! unsubscribe while being invoked; the change applies from the next envelope.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::watch;

use crate::codec::{self, Frame, MAX_FRAME_LEN};
use crate::error::ChannelError;
use crate::heartbeat::{ActivityTracker, LinkHealth};
use crate::messages::{Envelope, MessageKind};
use crate::transport::{Channel, Transport};

/// Pause after an unexpected read error before reading again
const READ_ERROR_BACKOFF: Duration = Duration::from_secs(1);

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Handle returned by a registration, unique across every registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Ordered callbacks that can change while they are being invoked
pub struct CallbackList<F: ?Sized> {
    entries: RwLock<Vec<(SubscriptionId, Arc<F>)>>,
}

impl<F: ?Sized> Default for CallbackList<F> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl<F: ?Sized> CallbackList<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, callback: Arc<F>) -> SubscriptionId {
        let id = SubscriptionId::next();
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback));
        id
    }

    pub fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(entry, _)| *entry != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Callbacks registered right now, cloned out of the lock
    pub fn snapshot(&self) -> Vec<Arc<F>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect()
    }
}

pub type EnvelopeCallback = dyn Fn(&Envelope) + Send + Sync;

/// Callback registry keyed by message kind
pub struct Subscriptions {
    by_kind: RwLock<HashMap<MessageKind, Vec<(SubscriptionId, Arc<EnvelopeCallback>)>>>,
}

impl Default for Subscriptions {
    fn default() -> Self {
        Self::new()
    }
}

impl Subscriptions {
    pub fn new() -> Self {
        let by_kind = MessageKind::ALL
            .into_iter()
            .map(|kind| (kind, Vec::new()))
            .collect();
        Self {
            by_kind: RwLock::new(by_kind),
        }
    }

    pub fn subscribe<F>(&self, kind: MessageKind, callback: F) -> SubscriptionId
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        let id = SubscriptionId::next();
        self.by_kind
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push((id, Arc::new(callback)));
        debug!("Subscribed {:?} to {}", id, kind);
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut by_kind = self.by_kind.write().unwrap_or_else(PoisonError::into_inner);
        for entries in by_kind.values_mut() {
            let before = entries.len();
            entries.retain(|(entry, _)| *entry != id);
            if entries.len() != before {
                return true;
            }
        }
        false
    }

    pub fn subscriber_count(&self, kind: MessageKind) -> usize {
        self.by_kind
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Invoke every callback registered for the envelope's kind
    ///
    /// Returns how many callbacks ran. A panicking callback is logged and
    /// does not stop the others.
    pub fn notify(&self, envelope: &Envelope) -> usize {
        let callbacks: Vec<Arc<EnvelopeCallback>> = self
            .by_kind
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&envelope.kind)
            .map(|entries| entries.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();

        for callback in &callbacks {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(envelope)));
            if outcome.is_err() {
                error!("Subscriber for {} panicked", envelope.kind);
            }
        }
        callbacks.len()
    }
}

/// Why [`Dispatcher::run`] returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchExit {
    /// The peer went away; the link needs reconnecting
    Broken(String),
    /// The channel was closed locally
    Closed,
    /// Shutdown was requested
    Shutdown,
}

pub struct Dispatcher<T: Transport> {
    channel: Arc<Channel<T>>,
    subscriptions: Arc<Subscriptions>,
    activity: Arc<ActivityTracker>,
    health: Arc<LinkHealth>,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(
        channel: Arc<Channel<T>>,
        subscriptions: Arc<Subscriptions>,
        activity: Arc<ActivityTracker>,
        health: Arc<LinkHealth>,
    ) -> Self {
        Self {
            channel,
            subscriptions,
            activity,
            health,
        }
    }

    pub fn subscriptions(&self) -> &Arc<Subscriptions> {
        &self.subscriptions
    }

    /// Read and dispatch until the link breaks, closes or shutdown flips
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> DispatchExit {
        info!("Dispatcher reading {}", self.channel.name());
        loop {
            if *shutdown.borrow() {
                return DispatchExit::Shutdown;
            }
            let read = tokio::select! {
                read = self.channel.read(MAX_FRAME_LEN) => read,
                _ = shutdown.changed() => return DispatchExit::Shutdown,
            };

            match read {
                Ok(frame) => {
                    self.handle_frame(&frame);
                }
                Err(ChannelError::Broken(reason)) => {
                    if self.health.mark_unhealthy(format!("inbound pipe broken: {reason}")) {
                        warn!("Inbound pipe {} broken: {}", self.channel.name(), reason);
                    }
                    return DispatchExit::Broken(reason);
                }
                Err(ChannelError::Closed) | Err(ChannelError::NotConnected) => {
                    info!("Dispatcher stopped, {} not connected", self.channel.name());
                    return DispatchExit::Closed;
                }
                Err(ChannelError::FrameTooLarge { len, limit }) => {
                    warn!("Dropping {} byte frame (limit {})", len, limit);
                }
                Err(e) => {
                    error!("Error reading from {}: {}", self.channel.name(), e);
                    tokio::time::sleep(READ_ERROR_BACKOFF).await;
                }
            }
        }
    }

    /// Decode one frame and fan it out; returns the kind dispatched
    pub fn handle_frame(&self, frame: &[u8]) -> Option<MessageKind> {
        match codec::decode(frame) {
            Ok(Frame::Event(envelope)) => {
                self.activity.touch();
                let delivered = self.subscriptions.notify(&envelope);
                debug!("Dispatched {} to {} subscribers", envelope.kind, delivered);
                Some(envelope.kind)
            }
            Ok(Frame::Response(response)) => {
                warn!(
                    "Unexpected command response on {} (status {:?}), dropped",
                    self.channel.name(),
                    response.status
                );
                None
            }
            Err(e) => {
                warn!(
                    "Dropping malformed frame on {}: {} raw={}",
                    self.channel.name(),
                    e,
                    e.raw_lossy().unwrap_or_default()
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelRole;
    use crate::transport::memory::MemoryTransport;
    use hermes_clock::ManualClock;
    use serde_json::{Map, json};
    use std::sync::Mutex;

    fn envelope(kind: MessageKind) -> Envelope {
        Envelope::new(kind, Map::new())
    }

    #[test]
    fn test_notify_in_registration_order() {
        let subs = Subscriptions::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            subs.subscribe(MessageKind::MarketData, move |_| seen.lock().unwrap().push(tag));
        }

        assert_eq!(subs.notify(&envelope(MessageKind::MarketData)), 2);
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_other_kinds_not_notified() {
        let subs = Subscriptions::new();
        subs.subscribe(MessageKind::OrderResponse, |_| panic!("wrong kind"));
        assert_eq!(subs.notify(&envelope(MessageKind::Heartbeat)), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let subs = Subscriptions::new();
        let id = subs.subscribe(MessageKind::Error, |_| {});
        assert_eq!(subs.subscriber_count(MessageKind::Error), 1);

        assert!(subs.unsubscribe(id));
        assert!(!subs.unsubscribe(id));
        assert_eq!(subs.subscriber_count(MessageKind::Error), 0);
    }

    #[test]
    fn test_subscribe_from_callback_applies_next_time() {
        let subs = Arc::new(Subscriptions::new());
        let calls = Arc::new(AtomicU64::new(0));
        {
            let inner = Arc::clone(&subs);
            let calls = Arc::clone(&calls);
            subs.subscribe(MessageKind::Heartbeat, move |_| {
                let calls = Arc::clone(&calls);
                inner.subscribe(MessageKind::Heartbeat, move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                });
            });
        }

        assert_eq!(subs.notify(&envelope(MessageKind::Heartbeat)), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(subs.notify(&envelope(MessageKind::Heartbeat)), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_callback_does_not_stop_others() {
        let subs = Subscriptions::new();
        let reached = Arc::new(AtomicU64::new(0));
        subs.subscribe(MessageKind::Error, |_| panic!("boom"));
        {
            let reached = Arc::clone(&reached);
            subs.subscribe(MessageKind::Error, move |_| {
                reached.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(subs.notify(&envelope(MessageKind::Error)), 2);
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_list() {
        let list: CallbackList<dyn Fn(u32) -> u32 + Send + Sync> = CallbackList::new();
        let id = list.add(Arc::new(|x: u32| x + 1));
        list.add(Arc::new(|x: u32| x * 2));

        let results: Vec<u32> = list.snapshot().iter().map(|cb| cb(3)).collect();
        assert_eq!(results, vec![4, 6]);

        assert!(list.remove(id));
        assert_eq!(list.len(), 1);
    }

    #[tokio::test]
    async fn test_run_dispatches_and_survives_garbage() {
        let (transport, peer) = MemoryTransport::new();
        let remote = peer.attach().await.unwrap();
        let channel = Arc::new(Channel::new("inbound", ChannelRole::Serve, transport));
        channel.connect(None).await.unwrap();

        let clock = ManualClock::starting_now();
        let health = Arc::new(LinkHealth::new());
        health.mark_healthy();
        let subs = Arc::new(Subscriptions::new());
        let dispatcher = Dispatcher::new(
            Arc::clone(&channel),
            Arc::clone(&subs),
            Arc::new(ActivityTracker::new(clock)),
            Arc::clone(&health),
        );

        let received = Arc::new(Mutex::new(Vec::new()));
        {
            let received = Arc::clone(&received);
            subs.subscribe(MessageKind::MarketData, move |env| {
                received
                    .lock()
                    .unwrap()
                    .push(env.data_str("symbol").unwrap_or_default().to_string());
            });
        }

        remote.send(b"{garbage").await.unwrap();
        remote
            .send_json(&json!({"status": "success", "data": {}}))
            .await
            .unwrap();
        remote
            .send_json(&json!({
                "type": "market_data",
                "timestamp": 1_700_000_000.0,
                "data": {"symbol": "EURUSD", "bid": 1.1, "ask": 1.2}
            }))
            .await
            .unwrap();
        drop(remote);

        let (_tx, rx) = watch::channel(false);
        let exit = dispatcher.run(rx).await;

        assert!(matches!(exit, DispatchExit::Broken(_)));
        assert_eq!(*received.lock().unwrap(), vec!["EURUSD".to_string()]);
        assert!(!health.is_healthy());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (transport, peer) = MemoryTransport::new();
        let _remote = peer.attach().await.unwrap();
        let channel = Arc::new(Channel::new("inbound", ChannelRole::Serve, transport));
        channel.connect(None).await.unwrap();

        let dispatcher = Dispatcher::new(
            channel,
            Arc::new(Subscriptions::new()),
            Arc::new(ActivityTracker::new(ManualClock::starting_now())),
            Arc::new(LinkHealth::new()),
        );

        let (tx, rx) = watch::channel(false);
        let run = tokio::spawn(async move { dispatcher.run(rx).await });
        tx.send(true).unwrap();

        assert_eq!(run.await.unwrap(), DispatchExit::Shutdown);
    }
}
