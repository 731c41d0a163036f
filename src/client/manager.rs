//! Multi-channel orchestration.
//!
//! A [`ChannelSet`] owns one task per observed channel. Tasks are aborted
//! when their channel is replaced or disconnected, when the observed set
//! changes, and when the set itself is dropped, so no transport or reconnect
//! timer outlives its owner.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use super::channel::{ChannelDriver, ChannelOptions, ChannelState};
use super::credentials::CredentialStore;
use super::transport::Transport;

struct ChannelHandle {
    endpoint: String,
    state: watch::Receiver<ChannelState>,
    task: JoinHandle<()>,
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct ChannelSet {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialStore>,
    options: ChannelOptions,
    channels: HashMap<String, ChannelHandle>,
}

impl ChannelSet {
    pub fn new(transport: Arc<dyn Transport>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            transport,
            credentials,
            options: ChannelOptions::default(),
            channels: HashMap::new(),
        }
    }

    pub fn with_options(mut self, options: ChannelOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the observed channels with `mapping` (channel key to
    /// endpoint). Every existing channel is torn down first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn observe<I, K, V>(&mut self, mapping: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.teardown();
        for (key, endpoint) in mapping {
            self.connect(key, endpoint);
        }
    }

    /// Starts (or restarts) a single channel and returns a receiver for its
    /// state. A previous channel under the same key is torn down.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(
        &mut self,
        key: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> watch::Receiver<ChannelState> {
        let key = key.into();
        let endpoint = endpoint.into();
        let (tx, rx) = watch::channel(ChannelState::default());

        let driver = ChannelDriver {
            key: key.clone(),
            endpoint: endpoint.clone(),
            transport: self.transport.clone(),
            credentials: self.credentials.clone(),
            options: self.options.clone(),
            state: tx,
        };
        let task = tokio::spawn(driver.run());

        debug!(channel = %key, %endpoint, "channel started");
        self.channels.insert(
            key,
            ChannelHandle {
                endpoint,
                state: rx.clone(),
                task,
            },
        );
        rx
    }

    /// Tears down one channel. Returns `false` if it was not observed.
    pub fn disconnect(&mut self, key: &str) -> bool {
        self.channels.remove(key).is_some()
    }

    /// Tears down every channel.
    pub fn teardown(&mut self) {
        if !self.channels.is_empty() {
            debug!("tearing down {} channel(s)", self.channels.len());
        }
        self.channels.clear();
    }

    pub fn snapshot(&self, key: &str) -> Option<ChannelState> {
        self.channels
            .get(key)
            .map(|handle| handle.state.borrow().clone())
    }

    pub fn watch(&self, key: &str) -> Option<watch::Receiver<ChannelState>> {
        self.channels.get(key).map(|handle| handle.state.clone())
    }

    pub fn endpoint(&self, key: &str) -> Option<&str> {
        self.channels.get(key).map(|handle| handle.endpoint.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl Drop for ChannelSet {
    fn drop(&mut self) {
        self.teardown();
    }
}
