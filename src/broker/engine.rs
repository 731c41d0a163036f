//! Broker engine
//!
//! This module contains the in-memory registry responsible for:
//! - managing topics and their subscriber streams
//! - fanning published events out to every stream of a topic
//! - dropping streams whose writes fail
//! - reaping dead streams on quiet topics via keep-alive frames
//!
//! Concurrency and usage notes:
//! - The public API is synchronous and designed to be held behind a lock
//!   (`Arc<parking_lot::Mutex<Broker>>`) by the transport layer. Writes only
//!   queue frames on unbounded channels, so no call here suspends and the
//!   lock is never held across I/O.
//! - A subscriber lives under exactly one topic. Topics disappear as soon as
//!   their last subscriber is removed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::message::{EventFrame, KEEPALIVE_FRAME};
use super::subscriber::{Subscriber, SubscriberId};
use super::topic::Topic;

#[derive(Debug, Default)]
pub struct Broker {
    pub(crate) topics: HashMap<String, Topic>,
    /// Reverse index used to enforce one topic per subscriber.
    pub(crate) index: HashMap<SubscriberId, String>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `subscriber` under `topic`, creating the topic if needed.
    ///
    /// A subscriber already registered under another topic is moved.
    pub fn subscribe(&mut self, topic: &str, subscriber: Subscriber) {
        let id = subscriber.id.clone();

        if let Some(previous) = self.index.get(&id).cloned() {
            if previous != topic {
                debug!(%id, from = %previous, to = %topic, "moving subscriber");
                self.detach(&previous, &id);
            }
        }

        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic))
            .subscribe(subscriber);
        self.index.insert(id.clone(), topic.to_string());

        debug!(%id, %topic, "subscribed");
    }

    /// Removes `id` from `topic`. Unknown topics and ids are a no-op.
    ///
    /// Returns `true` if a subscriber was removed.
    pub fn unsubscribe(&mut self, topic: &str, id: &SubscriberId) -> bool {
        let removed = self.detach(topic, id);
        if removed {
            self.index.remove(id);
            debug!(%id, %topic, "unsubscribed");
        }
        removed
    }

    /// Removes `id` from whichever topic it is registered under.
    pub fn remove_subscriber(&mut self, id: &SubscriberId) -> bool {
        match self.index.get(id).cloned() {
            Some(topic) => self.unsubscribe(&topic, id),
            None => false,
        }
    }

    /// Publishes `payload` as event `event` to every subscriber of `topic`.
    ///
    /// Subscribers whose write fails are removed; the rest still receive the
    /// frame. Returns the number of successful writes.
    pub fn publish(&mut self, topic: &str, event: &str, payload: &Value) -> usize {
        let Some(entry) = self.topics.get(topic) else {
            debug!(%topic, %event, "no subscribers, dropping event");
            return 0;
        };

        let frame = EventFrame::new(event, payload).encode();
        let mut delivered = 0;
        let mut failed = Vec::new();

        for (id, subscriber) in &entry.subscribers {
            match subscriber.write(&frame) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(%id, %topic, "write failed, dropping subscriber: {e}");
                    failed.push(id.clone());
                }
            }
        }

        for id in &failed {
            self.unsubscribe(topic, id);
        }

        delivered
    }

    /// Publishes to every known topic. Ordering across topics is unspecified.
    pub fn publish_all(&mut self, event: &str, payload: &Value) -> usize {
        let topics: Vec<String> = self.topics.keys().cloned().collect();
        topics
            .iter()
            .map(|topic| self.publish(topic, event, payload))
            .sum()
    }

    /// Writes a keep-alive comment to every subscriber and removes the ones
    /// whose stream has gone away. Returns the number removed.
    pub fn heartbeat(&mut self) -> usize {
        let dead: Vec<(String, SubscriberId)> = self
            .topics
            .iter()
            .flat_map(|(name, topic)| {
                topic
                    .subscribers
                    .iter()
                    .filter(|(_, subscriber)| subscriber.write(KEEPALIVE_FRAME).is_err())
                    .map(move |(id, _)| (name.clone(), id.clone()))
            })
            .collect();

        for (topic, id) in &dead {
            self.unsubscribe(topic, id);
        }

        if !dead.is_empty() {
            info!("Reaped {} closed subscriber(s)", dead.len());
        }

        dead.len()
    }

    /// Drops every subscriber handle, ending all open streams. Used on
    /// shutdown so long-lived responses do not hold the server open.
    pub fn close_all(&mut self) -> usize {
        let closed = self.index.len();
        self.topics.clear();
        self.index.clear();
        closed
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, Topic::len)
    }

    pub fn total_subscribers(&self) -> usize {
        self.index.len()
    }

    pub fn is_subscribed(&self, topic: &str, id: &SubscriberId) -> bool {
        self.topics.get(topic).is_some_and(|t| t.contains(id))
    }

    /// Runs `heartbeat` every `interval` until the task is dropped.
    pub async fn start_keepalive_loop(broker: Arc<Mutex<Broker>>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            broker.lock().heartbeat();
        }
    }

    fn detach(&mut self, topic: &str, id: &SubscriberId) -> bool {
        let Some(entry) = self.topics.get_mut(topic) else {
            return false;
        };

        let removed = entry.unsubscribe(id).is_some();
        if entry.is_empty() {
            self.topics.remove(topic);
            debug!(%topic, "topic emptied, removed");
        }
        removed
    }
}
