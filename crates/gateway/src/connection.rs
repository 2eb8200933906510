//! Command connection with bounded retry
//!
//! [`ConnectionManager::request`] writes one [`Command`] to the command pipe
//! and reads exactly one [`Response`] back. Requests are serialized, so a
//! response always belongs to the command written just before it.
//!
//! Retry policy: when the channel is down at entry, one connect is attempted
//! and a failure is reported straight away. Once a write or read fails the
//! channel is closed, the manager sleeps `retry_interval`, reconnects and
//! resubmits the same command, up to `max_retries` more times.

use std::sync::Arc;
use std::time::Duration;

use hermes_core::{RefreshSnapshot, Side};
use log::{debug, error, info, warn};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, watch};

use crate::codec::{self, MAX_FRAME_LEN};
use crate::error::{ChannelError, GatewayError, ProtocolError};
use crate::messages::{Command, Response};
use crate::transport::{Channel, ChannelRole, ChannelState, Transport};

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub pipe_name: String,
    pub role: ChannelRole,
    /// Pause between a failed exchange and the reconnect
    pub retry_interval: Duration,
    /// Resubmissions after the first failed exchange
    pub max_retries: u32,
    /// Bound on waiting for the peer; `None` waits forever
    pub connect_timeout: Option<Duration>,
    /// Bound on waiting for a response; `None` waits forever
    pub request_timeout: Option<Duration>,
}

impl ConnectionConfig {
    pub fn new(pipe_name: impl Into<String>) -> Self {
        Self {
            pipe_name: pipe_name.into(),
            role: ChannelRole::Serve,
            retry_interval: Duration::from_secs(5),
            max_retries: 3,
            connect_timeout: Some(Duration::from_secs(30)),
            request_timeout: Some(Duration::from_secs(10)),
        }
    }

    pub fn with_role(mut self, role: ChannelRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_retry(mut self, retry_interval: Duration, max_retries: u32) -> Self {
        self.retry_interval = retry_interval;
        self.max_retries = max_retries;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Connection state as seen by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Created,
    Connecting,
    Connected,
    Broken,
}

impl From<ChannelState> for ConnectionState {
    fn from(state: ChannelState) -> Self {
        match state {
            ChannelState::Uninitialized | ChannelState::Closed => ConnectionState::Disconnected,
            ChannelState::Created => ConnectionState::Created,
            ChannelState::Connecting => ConnectionState::Connecting,
            ChannelState::Connected => ConnectionState::Connected,
            ChannelState::Broken => ConnectionState::Broken,
        }
    }
}

pub struct ConnectionManager<T: Transport> {
    channel: Arc<Channel<T>>,
    config: ConnectionConfig,
    // Held across write + read so responses pair with their command
    request_lock: Mutex<()>,
    connect_lock: Mutex<()>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(config: ConnectionConfig, transport: T) -> Self {
        let channel = Arc::new(Channel::new(config.pipe_name.clone(), config.role, transport));
        Self::with_channel(config, channel)
    }

    pub fn with_channel(config: ConnectionConfig, channel: Arc<Channel<T>>) -> Self {
        Self {
            channel,
            config,
            request_lock: Mutex::new(()),
            connect_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn channel(&self) -> &Arc<Channel<T>> {
        &self.channel
    }

    pub fn state(&self) -> ConnectionState {
        self.channel.state().into()
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.channel.subscribe_state()
    }

    /// Open the endpoint and wait for the peer
    ///
    /// A failed attempt closes the channel so the next one starts clean.
    pub async fn connect(&self) -> Result<(), ChannelError> {
        let _guard = self.connect_lock.lock().await;
        if self.channel.is_connected() {
            return Ok(());
        }
        if self.channel.state() == ChannelState::Broken {
            self.channel.close().await;
        }
        match self.channel.connect(self.config.connect_timeout).await {
            Ok(()) => {
                info!("Connected to platform on {}", self.config.pipe_name);
                Ok(())
            }
            Err(e) => {
                self.channel.close().await;
                Err(e)
            }
        }
    }

    pub async fn disconnect(&self) {
        self.channel.close().await;
        info!("Disconnected from {}", self.config.pipe_name);
    }

    /// Send a command and wait for its response
    ///
    /// Never fails: transport and protocol problems come back as an error
    /// [`Response`]. With `retry` false a failed exchange is reported without
    /// reconnecting.
    pub async fn request(&self, command: &Command, retry: bool) -> Response {
        let _serial = self.request_lock.lock().await;

        if !self.is_connected() {
            if let Err(e) = self.connect().await {
                warn!("Command {} not sent: {}", command.kind, e);
                return Response::error(format!("not connected: {e}"));
            }
        }

        let mut retries: u32 = 0;
        let mut outcome = self.exchange(command).await;
        loop {
            let failure = match outcome {
                Ok(response) => {
                    debug!("Command {} answered with {:?}", command.kind, response.status);
                    return response;
                }
                Err(e) => e,
            };

            error!("Error during {} exchange: {}", command.kind, failure);
            self.channel.close().await;
            if !retry || retries >= self.config.max_retries {
                return Response::error(failure.to_string());
            }
            retries += 1;
            info!(
                "Retrying {} ({}/{}) in {:?}",
                command.kind, retries, self.config.max_retries, self.config.retry_interval
            );
            tokio::time::sleep(self.config.retry_interval).await;

            // A failed reconnect is this attempt's failure
            outcome = match self.connect().await {
                Ok(()) => self.exchange(command).await,
                Err(e) => {
                    warn!("Reconnect failed: {}", e);
                    Err(e.into())
                }
            };
        }
    }

    async fn exchange(&self, command: &Command) -> Result<Response, GatewayError> {
        let frame = codec::encode(command)?;
        self.channel.write(&frame).await?;

        let read = self.channel.read(MAX_FRAME_LEN);
        let reply = match self.config.request_timeout {
            Some(limit) => tokio::time::timeout(limit, read).await.map_err(|_| {
                ChannelError::Timeout(format!("response to {} after {:?}", command.kind, limit))
            })??,
            None => read.await?,
        };
        Ok(codec::decode_response(&reply)?)
    }

    pub async fn refresh(&self) -> Response {
        self.request(&Command::refresh(), true).await
    }

    /// Refresh and parse the snapshot, surfacing error responses
    pub async fn refresh_snapshot(&self) -> Result<RefreshSnapshot, GatewayError> {
        let data = self.refresh().await.into_result()?;
        RefreshSnapshot::from_data(&data).map_err(|e| {
            GatewayError::from(ProtocolError::Decode {
                reason: format!("invalid refresh snapshot: {e}"),
                raw: serde_json::to_vec(&data).unwrap_or_default(),
            })
        })
    }

    pub async fn set_algo(&self, range: Decimal, active: bool) -> Response {
        self.request(&Command::algo(range, active), true).await
    }

    pub async fn place_limit(&self, price: Decimal, size: Decimal) -> Response {
        self.request(&Command::limit(price, size), true).await
    }

    pub async fn place_mid_price(&self, size: Decimal, side: Side) -> Response {
        self.request(&Command::mid_price(size, side), true).await
    }
}
