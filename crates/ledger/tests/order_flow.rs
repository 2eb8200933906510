//! Order Ledger integration tests
//!
//! Orders leave through a real pipe publisher and responses come back
//! through the dispatcher, both over in-process pipes.

use std::sync::{Arc, Mutex};

use hermes_clock::ManualClock;
use hermes_core::{OrderId, OrderSpec, OrderStatus, Side};
use hermes_gateway::{
    ActivityTracker, Channel, ChannelError, ChannelRole, Dispatcher, LinkHealth, MAX_FRAME_LEN,
    MemoryTransport, PeerLink, PipePublisher, Subscriptions,
};
use hermes_ledger::{Bucket, LedgerError, OrderLedger};
use rust_decimal_macros::dec;
use serde_json::json;

struct Harness {
    ledger: Arc<OrderLedger>,
    inbound: Arc<Channel<MemoryTransport>>,
    dispatcher: Dispatcher<MemoryTransport>,
    platform_out: PeerLink,
    platform_in: PeerLink,
}

async fn harness() -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();
    let clock = ManualClock::starting_now();

    let (out_transport, out_peer) = MemoryTransport::new();
    let platform_in = out_peer.attach().await.unwrap();
    let outbound = Arc::new(Channel::new("python_to_mt5", ChannelRole::Dial, out_transport));
    outbound.connect(None).await.unwrap();

    let (in_transport, in_peer) = MemoryTransport::new();
    let platform_out = in_peer.attach().await.unwrap();
    let inbound = Arc::new(Channel::new("mt5_to_python", ChannelRole::Serve, in_transport));
    inbound.connect(None).await.unwrap();

    let subscriptions = Arc::new(Subscriptions::new());
    let ledger = Arc::new(OrderLedger::new(
        Arc::new(PipePublisher::new(outbound)),
        clock.clone(),
    ));
    ledger.attach(&subscriptions);

    let dispatcher = Dispatcher::new(
        Arc::clone(&inbound),
        subscriptions,
        Arc::new(ActivityTracker::new(clock)),
        Arc::new(LinkHealth::new()),
    );

    Harness {
        ledger,
        inbound,
        dispatcher,
        platform_out,
        platform_in,
    }
}

impl Harness {
    /// Push one frame from the platform and dispatch it
    async fn push(&self, value: serde_json::Value) {
        self.platform_out.send_json(&value).await.unwrap();
        let frame = self.inbound.read(MAX_FRAME_LEN).await.unwrap();
        self.dispatcher.handle_frame(&frame);
    }
}

fn eurusd_buy() -> OrderSpec {
    OrderSpec::limit("EURUSD", Side::Buy, dec!(1.1000), dec!(0.1))
}

fn order_response(id: &OrderId, status: &str) -> serde_json::Value {
    json!({
        "type": "order_response",
        "timestamp": 1_700_000_000.0,
        "data": {"order_id": id.as_str(), "status": status, "ticket": 1234}
    })
}

#[tokio::test]
async fn test_fill_moves_order_to_active_once() {
    let mut h = harness().await;
    let updates = Arc::new(Mutex::new(Vec::new()));
    {
        let updates = Arc::clone(&updates);
        h.ledger.on_order_update(move |id, order| {
            updates.lock().unwrap().push((id.clone(), order.status));
        });
    }

    let id = h.ledger.submit(eurusd_buy()).await.unwrap();
    assert_eq!(h.ledger.counts(), (1, 0, 0));

    let request = h.platform_in.recv_json().await.unwrap();
    assert_eq!(request["type"], "order_request");
    assert_eq!(request["data"]["order_id"], id.as_str());
    assert_eq!(request["data"]["symbol"], "EURUSD");
    assert_eq!(request["data"]["price"], json!(1.1));
    assert_eq!(request["data"]["volume"], json!(0.1));

    // The same fill arrives twice
    h.push(order_response(&id, "filled")).await;
    h.push(order_response(&id, "filled")).await;

    assert_eq!(h.ledger.counts(), (0, 1, 0));
    assert_eq!(*updates.lock().unwrap(), vec![(id.clone(), OrderStatus::Filled)]);

    let order = h.ledger.lookup(id.as_str()).unwrap();
    assert_eq!(order.status, OrderStatus::Filled);
    assert_eq!(order.peer_fields["ticket"], json!(1234));
}

#[tokio::test]
async fn test_rejection_lands_in_history() {
    let mut h = harness().await;
    let id = h.ledger.submit(eurusd_buy()).await.unwrap();
    h.platform_in.recv().await.unwrap();

    h.push(order_response(&id, "rejected")).await;

    assert_eq!(h.ledger.counts(), (0, 0, 1));
    assert_eq!(h.ledger.bucket_of(id.as_str()), Some(Bucket::History));
    assert!(h.ledger.active_orders().is_empty());
    assert!(h.ledger.pending_orders().is_empty());
}

#[tokio::test]
async fn test_failed_send_leaves_no_trace() {
    let h = harness().await;
    drop(h.platform_in);

    let err = h.ledger.submit(eurusd_buy()).await.unwrap_err();
    let order_id = match err {
        LedgerError::SendFailed { order_id, .. } => order_id,
        other => panic!("expected a send failure, got {other:?}"),
    };

    assert_eq!(h.ledger.counts(), (0, 0, 0));
    assert!(h.ledger.lookup(order_id.as_str()).is_err());

    // Later submissions see a broken pipe as not connected
    let err = h.ledger.submit(eurusd_buy()).await.unwrap_err();
    assert!(matches!(err, LedgerError::SendFailed { .. }));
    assert_eq!(h.ledger.counts(), (0, 0, 0));
}

#[tokio::test]
async fn test_unknown_order_response_ignored() {
    let h = harness().await;
    let updates = Arc::new(Mutex::new(0));
    {
        let updates = Arc::clone(&updates);
        h.ledger.on_order_update(move |_, _| *updates.lock().unwrap() += 1);
    }

    h.push(order_response(&OrderId::from("order_42"), "filled")).await;

    assert_eq!(h.ledger.counts(), (0, 0, 0));
    assert_eq!(*updates.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_publisher_error_is_reported() {
    let (transport, _peer) = MemoryTransport::new();
    let never_connected = Arc::new(Channel::new("python_to_mt5", ChannelRole::Dial, transport));
    let ledger = OrderLedger::new(
        Arc::new(PipePublisher::new(never_connected)),
        ManualClock::starting_now(),
    );

    let err = ledger.submit(eurusd_buy()).await.unwrap_err();
    let reason = match err {
        LedgerError::SendFailed { reason, .. } => reason,
        other => panic!("expected a send failure, got {other:?}"),
    };
    assert_eq!(reason, ChannelError::NotConnected.to_string());
    assert_eq!(ledger.counts(), (0, 0, 0));
}
