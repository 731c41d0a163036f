//! Per-channel connection state machine.
//!
//! ```text
//! Disconnected -> Connecting -> Connected
//!                     |             |
//!                     +--> Error <--+
//!                            |
//!                            +--(backoff)--> Connecting
//! ```
//!
//! [`ChannelState`] holds the pure transitions; [`ChannelDriver`] runs them
//! against a live transport inside one tokio task and publishes every change
//! through a `watch` channel. Aborting that task is the teardown: it drops
//! the transport stream and any pending reconnect sleep together.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

use super::backoff::Backoff;
use super::credentials::CredentialStore;
use super::decoder::SseEvent;
use super::transport::{Transport, TransportEvent};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Why a channel entered `Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelFault {
    /// No credential was available at connect time. Not retried.
    MissingCredential,
    /// The configured endpoint is not a valid URL. Not retried.
    InvalidEndpoint(String),
    /// The transport reported an error.
    Transport(String),
    /// The server ended the stream.
    Closed,
}

impl ChannelFault {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChannelFault::Transport(_) | ChannelFault::Closed)
    }
}

/// Observable state of one channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelState {
    pub status: ConnectionStatus,
    /// Latest decoded payload; `None` until the first event arrives.
    pub latest: Option<Value>,
    /// Consecutive failures since the last successful open.
    pub retry_count: u32,
    /// Delay of the pending reconnect, if one is scheduled.
    pub reconnect_in: Option<Duration>,
    pub fault: Option<ChannelFault>,
    pub last_event_at: Option<DateTime<Utc>>,
}

impl ChannelState {
    pub fn begin_connect(&mut self) {
        self.status = ConnectionStatus::Connecting;
        self.reconnect_in = None;
    }

    pub fn on_open(&mut self) {
        self.status = ConnectionStatus::Connected;
        self.retry_count = 0;
        self.reconnect_in = None;
        self.fault = None;
    }

    /// Applies a decoded event. Returns `false` if the payload was not JSON
    /// and the state is unchanged.
    ///
    /// Events named in `field_events` replace only their own key of the
    /// top-level object. Everything else is merged into the top-level object
    /// when both sides are objects and replaces it otherwise.
    pub fn on_message(&mut self, event: &SseEvent, field_events: &[String]) -> bool {
        let value: Value = match serde_json::from_str(&event.data) {
            Ok(value) => value,
            Err(e) => {
                warn!(event = ?event.event, "dropping undecodable message: {e}");
                return false;
            }
        };

        match event.event.as_deref() {
            Some(name) if field_events.iter().any(|f| f == name) => {
                if !matches!(self.latest, Some(Value::Object(_))) {
                    self.latest = Some(Value::Object(Map::new()));
                }
                if let Some(Value::Object(fields)) = self.latest.as_mut() {
                    fields.insert(name.to_string(), value);
                }
            }
            _ => match (&mut self.latest, value) {
                (Some(Value::Object(current)), Value::Object(update)) => current.extend(update),
                (slot, value) => *slot = Some(value),
            },
        }

        self.last_event_at = Some(Utc::now());
        true
    }

    /// Records a fault. For retryable faults returns the delay before the
    /// next attempt and bumps the retry counter; otherwise parks the channel.
    pub fn on_fault(&mut self, fault: ChannelFault, backoff: &Backoff) -> Option<Duration> {
        self.status = ConnectionStatus::Error;

        let delay = fault.is_retryable().then(|| {
            let delay = backoff.delay(self.retry_count);
            self.retry_count = self.retry_count.saturating_add(1);
            delay
        });

        self.reconnect_in = delay;
        self.fault = Some(fault);
        delay
    }
}

/// Behaviour shared by every channel of a set.
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    pub backoff: Backoff,
    pub field_events: Vec<String>,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            backoff: Backoff::default(),
            field_events: vec!["status".to_string()],
        }
    }
}

/// Appends `token` to `endpoint` as the `token` query parameter.
pub fn endpoint_with_token(endpoint: &str, token: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(endpoint)?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}

/// Runs one channel until it is parked by a non-retryable fault or its task
/// is aborted.
pub struct ChannelDriver {
    pub key: String,
    pub endpoint: String,
    pub transport: Arc<dyn Transport>,
    pub credentials: Arc<dyn CredentialStore>,
    pub options: ChannelOptions,
    pub state: watch::Sender<ChannelState>,
}

impl ChannelDriver {
    pub async fn run(self) {
        loop {
            let fault = self.connect_once().await;
            let mut delay = None;
            self.state
                .send_modify(|s| delay = s.on_fault(fault.clone(), &self.options.backoff));

            match delay {
                Some(delay) => {
                    info!(
                        channel = %self.key,
                        "connection lost ({fault:?}), reconnecting in {}ms",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    warn!(channel = %self.key, "channel parked: {fault:?}");
                    return;
                }
            }
        }
    }

    /// Opens the transport and pumps it until it fails or closes.
    async fn connect_once(&self) -> ChannelFault {
        let Some(token) = self.credentials.token() else {
            return ChannelFault::MissingCredential;
        };
        let url = match endpoint_with_token(&self.endpoint, &token) {
            Ok(url) => url,
            Err(e) => return ChannelFault::InvalidEndpoint(e.to_string()),
        };

        self.state.send_modify(ChannelState::begin_connect);
        debug!(channel = %self.key, endpoint = %self.endpoint, "connecting");

        let mut events = self.transport.open(url.as_str());
        while let Some(item) = events.next().await {
            match item {
                Ok(TransportEvent::Open) => {
                    self.state.send_modify(ChannelState::on_open);
                    info!(channel = %self.key, "connected");
                }
                Ok(TransportEvent::Message(event)) => {
                    self.state
                        .send_if_modified(|s| s.on_message(&event, &self.options.field_events));
                }
                Err(e) => return ChannelFault::Transport(e.to_string()),
            }
        }

        ChannelFault::Closed
    }
}
