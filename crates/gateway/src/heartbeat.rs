//! Liveness tracking
//!
//! Every inbound envelope touches the [`ActivityTracker`]. The
//! [`HeartbeatMonitor`] samples it on a fixed period and flags the event link
//! unhealthy once nothing arrived for longer than the threshold. Whoever owns
//! the link watches [`LinkHealth`] and reconnects.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use hermes_core::Timestamp;
use hermes_ports::Clock;
use log::{debug, info, warn};
use tokio::sync::watch;

/// Last time anything arrived from the platform
pub struct ActivityTracker {
    clock: Arc<dyn Clock>,
    last_nanos: AtomicI64,
}

// Full clock resolution so idle time compares exactly against the threshold
fn to_nanos(at: Timestamp) -> i64 {
    at.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

impl ActivityTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let now = to_nanos(clock.now());
        Self {
            clock,
            last_nanos: AtomicI64::new(now),
        }
    }

    pub fn touch(&self) {
        self.last_nanos
            .store(to_nanos(self.clock.now()), Ordering::Release);
    }

    pub fn last_activity(&self) -> Timestamp {
        DateTime::<Utc>::from_timestamp_nanos(self.last_nanos.load(Ordering::Acquire))
    }

    /// Time since the last touch, never negative
    pub fn idle(&self) -> chrono::Duration {
        let idle = self.clock.now() - self.last_activity();
        idle.max(chrono::Duration::zero())
    }
}

/// Health of the event link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Unhealthy(String),
}

impl Health {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Health::Healthy)
    }
}

/// Shared health flag, set unhealthy by the monitor or the dispatcher
pub struct LinkHealth {
    state: watch::Sender<Health>,
}

impl Default for LinkHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkHealth {
    /// Starts unhealthy until the link is first established
    pub fn new() -> Self {
        let (state, _) = watch::channel(Health::Unhealthy("not connected".to_string()));
        Self { state }
    }

    pub fn current(&self) -> Health {
        self.state.borrow().clone()
    }

    pub fn is_healthy(&self) -> bool {
        self.state.borrow().is_healthy()
    }

    /// Returns true when this call changed the state
    pub fn mark_healthy(&self) -> bool {
        self.state.send_if_modified(|health| {
            if health.is_healthy() {
                false
            } else {
                *health = Health::Healthy;
                true
            }
        })
    }

    /// Returns true on the healthy → unhealthy transition only
    pub fn mark_unhealthy(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        self.state.send_if_modified(|health| {
            if health.is_healthy() {
                *health = Health::Unhealthy(reason);
                true
            } else {
                false
            }
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<Health> {
        self.state.subscribe()
    }

    /// Resolves with the reason once the link is unhealthy
    pub async fn wait_unhealthy(&self) -> String {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|health| !health.is_healthy()).await {
            Ok(health) => match &*health {
                Health::Unhealthy(reason) => reason.clone(),
                Health::Healthy => String::new(),
            },
            Err(_) => "health channel closed".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Sampling period
    pub interval: Duration,
    /// Silence longer than this marks the link unhealthy
    pub threshold: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            threshold: Duration::from_secs(30),
        }
    }
}

/// Result of one liveness sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Stale(chrono::Duration),
}

pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    activity: Arc<ActivityTracker>,
    health: Arc<LinkHealth>,
}

impl HeartbeatMonitor {
    pub fn new(config: HeartbeatConfig, activity: Arc<ActivityTracker>, health: Arc<LinkHealth>) -> Self {
        Self {
            config,
            activity,
            health,
        }
    }

    /// Sample liveness without side effects
    pub fn check(&self) -> Liveness {
        let threshold =
            chrono::Duration::from_std(self.config.threshold).unwrap_or(chrono::Duration::MAX);
        let idle = self.activity.idle();
        if idle > threshold {
            Liveness::Stale(idle)
        } else {
            Liveness::Alive
        }
    }

    /// Sample liveness and flag the link when it went stale
    pub fn poll(&self) -> Liveness {
        let liveness = self.check();
        if let Liveness::Stale(idle) = liveness {
            let reason = format!("no activity for {}s", idle.num_seconds());
            if self.health.mark_unhealthy(reason) {
                warn!(
                    "No message received for {}s, marking connection unhealthy",
                    idle.num_seconds()
                );
            } else {
                debug!("Link still silent after {}s", idle.num_seconds());
            }
        }
        liveness
    }

    /// Sample every `interval` until shutdown flips
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Heartbeat monitor started (every {:?}, threshold {:?})",
            self.config.interval, self.config.threshold
        );
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll();
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("Heartbeat monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_clock::ManualClock;

    fn monitor() -> (Arc<ManualClock>, Arc<ActivityTracker>, Arc<LinkHealth>, HeartbeatMonitor) {
        let clock = ManualClock::starting_now();
        let activity = Arc::new(ActivityTracker::new(clock.clone()));
        let health = Arc::new(LinkHealth::new());
        health.mark_healthy();
        let monitor = HeartbeatMonitor::new(
            HeartbeatConfig::default(),
            Arc::clone(&activity),
            Arc::clone(&health),
        );
        (clock, activity, health, monitor)
    }

    #[test]
    fn test_alive_within_threshold() {
        let (clock, _activity, _health, monitor) = monitor();
        clock.advance(chrono::Duration::seconds(30));
        assert_eq!(monitor.check(), Liveness::Alive);
    }

    #[test]
    fn test_stale_past_threshold() {
        let (clock, _activity, health, monitor) = monitor();
        clock.advance(chrono::Duration::seconds(31));

        assert_eq!(
            monitor.check(),
            Liveness::Stale(chrono::Duration::seconds(31))
        );
        // check() alone does not flag the link
        assert!(health.is_healthy());

        monitor.poll();
        assert_eq!(
            health.current(),
            Health::Unhealthy("no activity for 31s".to_string())
        );
    }

    #[test]
    fn test_threshold_boundary_with_sub_microsecond_clock() {
        let start = DateTime::<Utc>::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        let clock = ManualClock::new(start);
        let activity = Arc::new(ActivityTracker::new(clock.clone()));
        let monitor = HeartbeatMonitor::new(
            HeartbeatConfig::default(),
            Arc::clone(&activity),
            Arc::new(LinkHealth::new()),
        );
        assert_eq!(activity.last_activity(), start);

        clock.advance(chrono::Duration::seconds(30));
        assert_eq!(activity.idle(), chrono::Duration::seconds(30));
        assert_eq!(monitor.check(), Liveness::Alive);

        clock.advance(chrono::Duration::nanoseconds(1));
        assert_eq!(
            monitor.check(),
            Liveness::Stale(chrono::Duration::seconds(30) + chrono::Duration::nanoseconds(1))
        );
    }

    #[test]
    fn test_touch_resets_idle() {
        let (clock, activity, _health, monitor) = monitor();
        clock.advance(chrono::Duration::seconds(29));
        activity.touch();
        clock.advance(chrono::Duration::seconds(29));

        assert_eq!(monitor.check(), Liveness::Alive);
        assert_eq!(activity.idle(), chrono::Duration::seconds(29));
    }

    #[test]
    fn test_unhealthy_transition_reported_once() {
        let health = LinkHealth::new();
        assert!(!health.is_healthy());
        assert!(!health.mark_unhealthy("again"));

        assert!(health.mark_healthy());
        assert!(health.mark_unhealthy("stale"));
        assert!(!health.mark_unhealthy("stale"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_flags_stale_link() {
        let (clock, _activity, health, monitor) = monitor();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let monitor = Arc::new(monitor);
        let task = {
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move { monitor.run(shutdown_rx).await })
        };

        clock.advance(chrono::Duration::seconds(45));
        let reason = tokio::time::timeout(Duration::from_secs(10), health.wait_unhealthy())
            .await
            .unwrap();
        assert!(reason.starts_with("no activity"));

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
