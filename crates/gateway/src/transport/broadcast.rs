//! Local fan-out of bridge state
//!
//! Refresh snapshots are state, not a stream: the publisher keeps the most
//! recent one, and a subscriber that joins late receives it before anything
//! newer. Slow subscribers skip ahead and count what they missed. The ledger
//! tests use the same pair to capture outbound envelopes.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{ChannelError, GatewayError};
use crate::transport::{Publisher, Subscriber};
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::broadcast;

/// Publisher that remembers its last message
pub struct BroadcastPublisher<M> {
    tx: broadcast::Sender<M>,
    latest: Arc<Mutex<Option<M>>>,
}

impl<M> Clone for BroadcastPublisher<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            latest: Arc::clone(&self.latest),
        }
    }
}

impl<M: Clone> BroadcastPublisher<M> {
    /// Publisher with no subscribers yet
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            latest: Arc::new(Mutex::new(None)),
        }
    }

    /// Publisher and its first subscriber
    pub fn pair(capacity: usize) -> (Self, BroadcastSubscriber<M>) {
        let publisher = Self::new(capacity);
        let subscriber = publisher.subscribe();
        (publisher, subscriber)
    }

    /// New subscriber, primed with the latest message if there is one
    pub fn subscribe(&self) -> BroadcastSubscriber<M> {
        // Held across subscribe so a concurrent publish lands in exactly one of the two
        let latest = self.lock_latest();
        BroadcastSubscriber {
            replay: latest.clone(),
            rx: self.tx.subscribe(),
            _tx: self.tx.clone(),
            skipped: 0,
        }
    }

    /// Most recently published message
    pub fn latest(&self) -> Option<M> {
        self.lock_latest().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn lock_latest(&self) -> MutexGuard<'_, Option<M>> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<M> Publisher<M> for BroadcastPublisher<M>
where
    M: Serialize + Clone + Send + Sync + 'static,
{
    async fn publish(&self, msg: &M) -> Result<(), GatewayError> {
        let mut latest = self.lock_latest();
        *latest = Some(msg.clone());
        match self.tx.send(msg.clone()) {
            Ok(receivers) => debug!("Published to {} local subscribers", receivers),
            Err(_) => debug!("Published with no local subscribers"),
        }
        Ok(())
    }
}

/// Receiving end of a [`BroadcastPublisher`]
pub struct BroadcastSubscriber<M> {
    replay: Option<M>,
    rx: broadcast::Receiver<M>,
    // Keeps the channel open while a subscriber exists
    _tx: broadcast::Sender<M>,
    skipped: u64,
}

impl<M> BroadcastSubscriber<M> {
    /// Messages dropped because this subscriber fell behind
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn record_lag(&mut self, missed: u64) {
        self.skipped += missed;
        warn!("Local subscriber fell behind, skipped {} messages", missed);
    }
}

#[async_trait]
impl<M> Subscriber<M> for BroadcastSubscriber<M>
where
    M: DeserializeOwned + Clone + Send + 'static,
{
    async fn next(&mut self) -> Result<M, GatewayError> {
        if let Some(msg) = self.replay.take() {
            return Ok(msg);
        }
        loop {
            match self.rx.recv().await {
                Ok(msg) => return Ok(msg),
                Err(broadcast::error::RecvError::Lagged(missed)) => self.record_lag(missed),
                Err(broadcast::error::RecvError::Closed) => return Err(ChannelError::Closed.into()),
            }
        }
    }

    fn try_next(&mut self) -> Result<Option<M>, GatewayError> {
        if let Some(msg) = self.replay.take() {
            return Ok(Some(msg));
        }
        loop {
            match self.rx.try_recv() {
                Ok(msg) => return Ok(Some(msg)),
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => self.record_lag(missed),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(ChannelError::Closed.into());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let (publisher, mut first) = BroadcastPublisher::<i32>::pair(10);
        let mut second = publisher.subscribe();

        publisher.publish(&42).await.unwrap();

        assert_eq!(first.next().await.unwrap(), 42);
        assert_eq!(second.next().await.unwrap(), 42);
        assert_eq!(first.try_next().unwrap(), None);
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_latest_first() {
        let publisher = BroadcastPublisher::<String>::new(10);
        assert_eq!(publisher.latest(), None);

        publisher.publish(&"stale".to_string()).await.unwrap();
        publisher.publish(&"current".to_string()).await.unwrap();
        assert_eq!(publisher.latest().as_deref(), Some("current"));

        let mut late = publisher.subscribe();
        assert_eq!(late.next().await.unwrap(), "current");
        assert_eq!(late.try_next().unwrap(), None);

        publisher.publish(&"newer".to_string()).await.unwrap();
        assert_eq!(late.next().await.unwrap(), "newer");
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_ahead() {
        let (publisher, mut slow) = BroadcastPublisher::<i32>::pair(2);
        for n in 0..5 {
            publisher.publish(&n).await.unwrap();
        }

        assert_eq!(slow.try_next().unwrap(), Some(3));
        assert_eq!(slow.skipped(), 3);
        assert_eq!(slow.next().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let publisher = BroadcastPublisher::<i32>::new(4);
        assert_eq!(publisher.subscriber_count(), 0);
        assert!(publisher.publish(&1).await.is_ok());
        assert_eq!(publisher.latest(), Some(1));
    }
}
