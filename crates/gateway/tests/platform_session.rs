//! End-to-end session against an in-process platform peer
//!
//! Drives the command pipe and both event pipes at once and checks that
//! responses and pushed events never cross.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use hermes_clock::ManualClock;
use hermes_gateway::{
    ActivityTracker, Channel, ChannelRole, ConnectionConfig, ConnectionManager, DispatchExit,
    Dispatcher, Envelope, LinkHealth, MemoryTransport, MessageKind, PipePublisher, Publisher,
    Subscriptions,
};
use serde_json::{Map, json};
use tokio::sync::watch;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[tokio::test]
async fn test_commands_and_events_stay_separate() {
    init_logging();

    // Command pipe
    let (cmd_transport, cmd_peer) = MemoryTransport::new();
    let mut cmd_remote = cmd_peer.attach().await.unwrap();
    let manager = ConnectionManager::new(
        ConnectionConfig::new("command").with_retry(Duration::from_millis(10), 1),
        cmd_transport,
    );

    // Inbound events
    let (in_transport, in_peer) = MemoryTransport::new();
    let in_remote = in_peer.attach().await.unwrap();
    let inbound = Arc::new(Channel::new("inbound", ChannelRole::Serve, in_transport));
    inbound.connect(None).await.unwrap();

    // Outbound orders
    let (out_transport, out_peer) = MemoryTransport::new();
    let mut out_remote = out_peer.attach().await.unwrap();
    let outbound = Arc::new(Channel::new("outbound", ChannelRole::Dial, out_transport));
    outbound.connect(None).await.unwrap();

    let clock = ManualClock::starting_now();
    let activity = Arc::new(ActivityTracker::new(clock.clone()));
    let health = Arc::new(LinkHealth::new());
    health.mark_healthy();
    let subscriptions = Arc::new(Subscriptions::new());
    let dispatcher = Dispatcher::new(
        Arc::clone(&inbound),
        Arc::clone(&subscriptions),
        Arc::clone(&activity),
        Arc::clone(&health),
    );

    let kinds = Arc::new(Mutex::new(Vec::new()));
    for kind in MessageKind::ALL {
        let kinds = Arc::clone(&kinds);
        subscriptions.subscribe(kind, move |env| kinds.lock().unwrap().push(env.kind));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatch = tokio::spawn(async move { dispatcher.run(shutdown_rx).await });

    // Platform pushes events while answering a command
    let platform = tokio::spawn(async move {
        in_remote
            .send_json(&json!({"type": "heartbeat", "timestamp": 1.0, "data": {}}))
            .await
            .unwrap();
        let cmd = cmd_remote.recv_json().await.unwrap();
        in_remote
            .send_json(&json!({
                "type": "market_data",
                "timestamp": 2.0,
                "data": {"symbol": "EURUSD", "bid": 1.0850, "ask": 1.0852}
            }))
            .await
            .unwrap();
        cmd_remote
            .send_json(&json!({"status": "success", "data": {"command": cmd["command"]}}))
            .await
            .unwrap();
        (cmd_remote, in_remote)
    });

    let response = manager.refresh().await;
    assert!(response.is_success());
    assert_eq!(response.data["command"], "refresh");
    let _remotes = platform.await.unwrap();

    // Orders leave on the outbound pipe
    let publisher = PipePublisher::new(Arc::clone(&outbound));
    let mut data = Map::new();
    data.insert("order_id".to_string(), json!("order_1"));
    publisher
        .publish(&Envelope::new(MessageKind::OrderRequest, data))
        .await
        .unwrap();
    let sent = out_remote.recv_json().await.unwrap();
    assert_eq!(sent["type"], "order_request");
    assert_eq!(sent["data"]["order_id"], "order_1");

    tokio::time::sleep(Duration::from_millis(20)).await;
    shutdown_tx.send(true).unwrap();
    assert_eq!(dispatch.await.unwrap(), DispatchExit::Shutdown);

    assert_eq!(
        *kinds.lock().unwrap(),
        vec![MessageKind::Heartbeat, MessageKind::MarketData]
    );
    assert!(health.is_healthy());
}

#[tokio::test]
async fn test_inbound_disconnect_marks_link_unhealthy() {
    init_logging();

    let (transport, peer) = MemoryTransport::new();
    let remote = peer.attach().await.unwrap();
    let inbound = Arc::new(Channel::new("inbound", ChannelRole::Serve, transport));
    inbound.connect(None).await.unwrap();

    let health = Arc::new(LinkHealth::new());
    health.mark_healthy();
    let dispatcher = Dispatcher::new(
        Arc::clone(&inbound),
        Arc::new(Subscriptions::new()),
        Arc::new(ActivityTracker::new(ManualClock::starting_now())),
        Arc::clone(&health),
    );

    remote.disconnect();
    let (_tx, rx) = watch::channel(false);
    let exit = dispatcher.run(rx).await;

    assert!(matches!(exit, DispatchExit::Broken(_)));
    assert!(health.wait_unhealthy().await.contains("inbound pipe broken"));
}
