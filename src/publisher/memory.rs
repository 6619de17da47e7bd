//! In-process transport for dry runs and tests
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;

use super::{Delivery, OutboundMessage, SendError, Transport};

#[derive(Default)]
struct State {
    sent: Vec<OutboundMessage>,
    attempts: usize,
    offsets: HashMap<String, i64>,
}

/// MemoryTransport keeps every delivered message in memory and logs it.
/// Failures can be injected per topic or per (topic, key).
#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<State>,
    failing_keys: HashMap<(String, String), String>,
    failing_topics: HashMap<String, String>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends of `key` to `topic` fail with `reason`.
    pub fn fail_key(mut self, topic: &str, key: &str, reason: &str) -> Self {
        self.failing_keys
            .insert((topic.to_owned(), key.to_owned()), reason.to_owned());
        self
    }

    /// Every send to `topic` fails with `reason`.
    pub fn fail_topic(mut self, topic: &str, reason: &str) -> Self {
        self.failing_topics
            .insert(topic.to_owned(), reason.to_owned());
        self
    }

    /// Delivered messages, in delivery order.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.lock().sent.clone()
    }

    pub fn sent_to(&self, topic: &str) -> Vec<OutboundMessage> {
        self.lock()
            .sent
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Number of sends attempted, successful or not.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, message: OutboundMessage) -> Result<Delivery, SendError> {
        let mut state = self.lock();
        state.attempts += 1;

        let failure = self
            .failing_topics
            .get(&message.topic)
            .or_else(|| {
                self.failing_keys
                    .get(&(message.topic.clone(), message.key.clone()))
            });
        if let Some(reason) = failure {
            return Err(SendError(reason.clone()));
        }

        let offset = state.offsets.entry(message.topic.clone()).or_insert(0);
        let delivery = Delivery {
            partition: 0,
            offset: *offset,
        };
        *offset += 1;
        tracing::debug!(
            topic = %message.topic,
            key = %message.key,
            bytes = message.payload.len(),
            "stored message in memory"
        );
        state.sent.push(message);
        Ok(delivery)
    }
}
