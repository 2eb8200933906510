//! Bridge supervisor
//!
//! Owns the three pipes and every long-running task:
//!
//! - command link upkeep: reconnects the command pipe while it is down
//! - event link: attaches both event pipes, runs the dispatcher and starts
//!   over when the link breaks or goes stale
//! - heartbeat monitor
//! - auto-refresh: periodic `refresh` whose snapshots are broadcast locally
//!
//! All tasks watch one shutdown flag and stop together.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use hermes_clock::SystemClock;
use hermes_core::RefreshSnapshot;
use hermes_gateway::{
    ActivityTracker, BroadcastPublisher, BroadcastSubscriber, Channel, ChannelError, ChannelRole,
    ConnectionManager, DispatchExit, Dispatcher, GatewayError, HeartbeatMonitor, LinkHealth,
    PipePublisher, PlatformTransport, Publisher, Subscriptions, Transport,
};
use hermes_ledger::OrderLedger;
use hermes_ports::Clock;
use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::BridgeConfig;
use crate::error::{Result, RunnerError};

/// How often the command link is checked while disconnected
pub const CONNECTION_CHECK_INTERVAL: Duration = Duration::from_secs(1);

const SNAPSHOT_CAPACITY: usize = 16;

/// One transport per pipe
pub struct BridgeTransports<T> {
    pub command: T,
    pub inbound: T,
    pub outbound: T,
}

pub struct Bridge<T: Transport> {
    config: BridgeConfig,
    connection: Arc<ConnectionManager<T>>,
    inbound: Arc<Channel<T>>,
    outbound: Arc<Channel<T>>,
    subscriptions: Arc<Subscriptions>,
    activity: Arc<ActivityTracker>,
    health: Arc<LinkHealth>,
    ledger: Arc<OrderLedger>,
    snapshots: BroadcastPublisher<RefreshSnapshot>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Bridge<PlatformTransport> {
    /// Bridge over the host's pipes with wall-clock time
    pub fn from_config(config: BridgeConfig) -> Self {
        let transports = BridgeTransports {
            command: PlatformTransport::default(),
            inbound: PlatformTransport::default(),
            outbound: PlatformTransport::default(),
        };
        Self::new(config, transports, SystemClock::shared())
    }
}

impl<T: Transport> Bridge<T> {
    pub fn new(config: BridgeConfig, transports: BridgeTransports<T>, clock: Arc<dyn Clock>) -> Self {
        let connection = Arc::new(ConnectionManager::new(
            config.connection_config(),
            transports.command,
        ));
        let inbound = Arc::new(Channel::new(
            config.inbound_pipe.clone(),
            ChannelRole::Serve,
            transports.inbound,
        ));
        let outbound = Arc::new(Channel::new(
            config.outbound_pipe.clone(),
            ChannelRole::Dial,
            transports.outbound,
        ));

        let subscriptions = Arc::new(Subscriptions::new());
        let ledger = Arc::new(OrderLedger::new(
            Arc::new(PipePublisher::new(Arc::clone(&outbound))),
            Arc::clone(&clock),
        ));
        ledger.attach(&subscriptions);

        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            connection,
            inbound,
            outbound,
            subscriptions,
            activity: Arc::new(ActivityTracker::new(clock)),
            health: Arc::new(LinkHealth::new()),
            ledger,
            snapshots: BroadcastPublisher::new(SNAPSHOT_CAPACITY),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn connection(&self) -> &Arc<ConnectionManager<T>> {
        &self.connection
    }

    pub fn inbound(&self) -> &Arc<Channel<T>> {
        &self.inbound
    }

    pub fn outbound(&self) -> &Arc<Channel<T>> {
        &self.outbound
    }

    pub fn ledger(&self) -> &Arc<OrderLedger> {
        &self.ledger
    }

    pub fn subscriptions(&self) -> &Arc<Subscriptions> {
        &self.subscriptions
    }

    pub fn health(&self) -> &Arc<LinkHealth> {
        &self.health
    }

    pub fn activity(&self) -> &Arc<ActivityTracker> {
        &self.activity
    }

    /// Snapshots from every successful refresh, manual or automatic
    pub fn subscribe_snapshots(&self) -> BroadcastSubscriber<RefreshSnapshot> {
        self.snapshots.subscribe()
    }

    /// Last snapshot a refresh produced, if any
    pub fn latest_snapshot(&self) -> Option<RefreshSnapshot> {
        self.snapshots.latest()
    }

    pub fn is_running(&self) -> bool {
        !*self.shutdown.borrow() && !self.lock_tasks().is_empty()
    }

    /// Spawn the supervisor tasks
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut tasks = self.lock_tasks();
        if !tasks.is_empty() || *self.shutdown.borrow() {
            return Err(RunnerError::AlreadyStarted);
        }

        tasks.push(tokio::spawn(
            Arc::clone(self).maintain_command_link(self.shutdown.subscribe()),
        ));
        tasks.push(tokio::spawn(
            Arc::clone(self).run_event_link(self.shutdown.subscribe()),
        ));

        let monitor = HeartbeatMonitor::new(
            self.config.heartbeat_config(),
            Arc::clone(&self.activity),
            Arc::clone(&self.health),
        );
        let shutdown = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move { monitor.run(shutdown).await }));

        match self.config.refresh_interval() {
            Some(period) => tasks.push(tokio::spawn(
                Arc::clone(self).auto_refresh(period, self.shutdown.subscribe()),
            )),
            None => info!("Auto-refresh disabled"),
        }

        info!(
            "Bridge started (command {}, events {} / {})",
            self.config.pipe_name, self.config.inbound_pipe, self.config.outbound_pipe
        );
        Ok(())
    }

    /// Stop every task and release all pipes
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        self.connection.disconnect().await;
        self.inbound.close().await;
        self.outbound.close().await;

        let tasks: Vec<_> = self.lock_tasks().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                error!("Bridge task ended abnormally: {}", e);
            }
        }
        info!("Bridge stopped");
    }

    /// Run `refresh` and broadcast the parsed snapshot
    pub async fn refresh_snapshot(&self) -> std::result::Result<RefreshSnapshot, GatewayError> {
        let snapshot = self.connection.refresh_snapshot().await?;
        self.snapshots.publish(&snapshot).await?;
        Ok(snapshot)
    }

    async fn maintain_command_link(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(CONNECTION_CHECK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if self.connection.is_connected() {
                continue;
            }

            debug!("Waiting for platform on {}", self.config.pipe_name);
            let attempt = tokio::select! {
                attempt = self.connection.connect() => attempt,
                _ = shutdown.changed() => break,
            };
            if let Err(e) = attempt {
                warn!("Failed to connect to platform: {}", e);
            }
        }
        debug!("Command link upkeep stopped");
    }

    async fn run_event_link(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.inbound),
            Arc::clone(&self.subscriptions),
            Arc::clone(&self.activity),
            Arc::clone(&self.health),
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let attached = tokio::select! {
                attached = self.connect_event_link() => attached,
                _ = shutdown.changed() => break,
            };

            match attached {
                Ok(()) => {
                    // Grace period restarts with every new link
                    self.activity.touch();
                    self.health.mark_healthy();
                    info!("Event link established");

                    let exit = tokio::select! {
                        exit = dispatcher.run(shutdown.clone()) => exit,
                        reason = self.health.wait_unhealthy() => {
                            warn!("Event link unhealthy ({}), reconnecting", reason);
                            DispatchExit::Broken(reason)
                        }
                    };
                    if exit == DispatchExit::Shutdown {
                        break;
                    }
                }
                Err(e) => warn!("Event link not established: {}", e),
            }

            self.health.mark_unhealthy("event link down");
            self.inbound.close().await;
            self.outbound.close().await;

            tokio::select! {
                _ = tokio::time::sleep(self.config.retry_interval()) => {}
                _ = shutdown.changed() => break,
            }
        }
        debug!("Event link supervision stopped");
    }

    async fn connect_event_link(&self) -> std::result::Result<(), ChannelError> {
        let timeout = self.config.connect_timeout();
        self.inbound.connect(timeout).await?;
        self.outbound.connect(timeout).await?;
        Ok(())
    }

    async fn auto_refresh(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if !self.connection.is_connected() {
                continue;
            }

            let refreshed = tokio::select! {
                refreshed = self.refresh_snapshot() => refreshed,
                _ = shutdown.changed() => break,
            };
            match refreshed {
                Ok(snapshot) => debug!("Auto-refresh: {}", snapshot.summary_lines().join(", ")),
                Err(e) => error!("Auto-refresh error: {}", e),
            }
        }
        debug!("Auto-refresh stopped");
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
