//! Batch publishing of keyed records with per-record dead-letter fallback
pub mod dead_letter;
pub mod kafka;
pub mod memory;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::{
    error::IngestError,
    metrics::IngestMetrics,
    settings::TopicRoute,
    telemetry::{RequestContext, TIMESTAMP_HEADER, TRACE_ID_HEADER},
};

pub use dead_letter::DeadLetterForwarder;

/// Message as handed to the bus client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

impl OutboundMessage {
    /// Builds a message carrying the request's trace id and the send timestamp.
    pub fn new(ctx: &RequestContext, topic: &str, key: &str, payload: Vec<u8>) -> Self {
        OutboundMessage {
            topic: topic.to_owned(),
            key: key.to_owned(),
            payload,
            headers: vec![
                (String::from(TRACE_ID_HEADER), ctx.trace_id.clone()),
                (
                    String::from(TIMESTAMP_HEADER),
                    chrono::Utc::now().timestamp_millis().to_string(),
                ),
            ],
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Broker acknowledgement of a single message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub partition: i32,
    pub offset: i64,
}

/// Transport-level failure text, as reported by the bus client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SendError(pub String);

/// Transport sends one message and resolves once the broker has answered
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: OutboundMessage) -> Result<Delivery, SendError>;
}

/// What happened to one record of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Delivered {
        key: String,
        delivery: Delivery,
    },
    /// send failed, dead-letter event was delivered
    DeadLettered { key: String, error: String },
    /// send failed and so did the dead-letter event
    Lost {
        key: String,
        error: String,
        dead_letter_error: String,
    },
}

impl RecordOutcome {
    pub fn key(&self) -> &str {
        match self {
            RecordOutcome::Delivered { key, .. }
            | RecordOutcome::DeadLettered { key, .. }
            | RecordOutcome::Lost { key, .. } => key,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, RecordOutcome::Delivered { .. })
    }
}

/// Outcomes of a whole batch, in input order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub topic: String,
    pub outcomes: Vec<RecordOutcome>,
}

impl BatchReport {
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_delivered()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.delivered()
    }

    pub fn lost(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, RecordOutcome::Lost { .. }))
            .count()
    }
}

/// Handle on a batch whose sends have all been issued.
/// Dropping it leaves the sends running in the background.
pub struct BatchHandle {
    issued: usize,
    handle: JoinHandle<BatchReport>,
}

impl BatchHandle {
    pub fn issued(&self) -> usize {
        self.issued
    }

    /// Waits for every send (and dead-letter forward) of the batch to finish.
    pub async fn completed(self) -> Result<BatchReport, IngestError> {
        self.handle
            .await
            .map_err(|e| IngestError::Internal(anyhow::anyhow!("batch task failed: {e}")))
    }
}

/// BatchPublisher issues one send per record and recovers failures locally.
/// Clones share the set of batches still in flight.
#[derive(Clone)]
pub struct BatchPublisher {
    transport: Arc<dyn Transport>,
    dead_letters: DeadLetterForwarder,
    metrics: Arc<IngestMetrics>,
    in_flight: TaskTracker,
}

impl BatchPublisher {
    pub fn new(transport: Arc<dyn Transport>, metrics: Arc<IngestMetrics>) -> Self {
        BatchPublisher {
            dead_letters: DeadLetterForwarder::new(transport.clone(), metrics.clone()),
            transport,
            metrics,
            in_flight: TaskTracker::new(),
        }
    }

    /// Waits until every batch issued so far, including detached ones, has finished
    /// its sends and dead-letter forwards. Returns false if `timeout` expired first.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.in_flight.close();
        let drained = tokio::time::timeout(timeout, self.in_flight.wait())
            .await
            .is_ok();
        self.in_flight.reopen();
        drained
    }

    /// Spawns one send per record and returns without waiting for them.
    /// A failed send is forwarded to `route.error_topic` and never retried.
    pub fn publish_batch(
        &self,
        ctx: &RequestContext,
        route: &TopicRoute,
        records: Vec<(String, serde_json::Value)>,
    ) -> BatchHandle {
        let issued = records.len();
        let keys: Vec<String> = records.iter().map(|(key, _)| key.clone()).collect();
        let mut sends = JoinSet::new();
        for (index, (key, record)) in records.into_iter().enumerate() {
            let publisher = self.clone();
            let ctx = ctx.clone();
            let route = route.clone();
            let span = tracing::info_span!(
                "publish",
                trace_id = %ctx.trace_id,
                topic = %route.topic,
                key = %key,
            );
            sends.spawn(
                async move { (index, publisher.publish_one(&ctx, &route, key, record).await) }
                    .instrument(span),
            );
        }
        tracing::info!(
            trace_id = %ctx.trace_id,
            topic = %route.topic,
            records = issued,
            "batch issued"
        );

        let topic = route.topic.clone();
        let handle = self.in_flight.spawn(async move {
            let mut outcomes: Vec<Option<RecordOutcome>> = vec![None; issued];
            while let Some(joined) = sends.join_next().await {
                match joined {
                    Ok((index, outcome)) => outcomes[index] = Some(outcome),
                    Err(e) => tracing::error!("publish task aborted: {e}"),
                }
            }
            // a task that died took its outcome with it
            let outcomes = outcomes
                .into_iter()
                .zip(keys)
                .map(|(outcome, key)| {
                    outcome.unwrap_or_else(|| RecordOutcome::Lost {
                        key,
                        error: String::from("publish task aborted"),
                        dead_letter_error: String::from("not attempted"),
                    })
                })
                .collect();
            BatchReport { topic, outcomes }
        });
        BatchHandle { issued, handle }
    }

    async fn publish_one(
        &self,
        ctx: &RequestContext,
        route: &TopicRoute,
        key: String,
        record: serde_json::Value,
    ) -> RecordOutcome {
        let sent = match serde_json::to_vec(&record) {
            Ok(payload) => {
                tracing::debug!("sending record");
                self.transport
                    .send(OutboundMessage::new(ctx, &route.topic, &key, payload))
                    .await
            }
            Err(e) => Err(SendError(format!("serializing record: {e}"))),
        };

        match sent {
            Ok(delivery) => {
                self.metrics.record_send(&route.topic, true);
                tracing::info!(
                    partition = delivery.partition,
                    offset = delivery.offset,
                    "record delivered"
                );
                RecordOutcome::Delivered { key, delivery }
            }
            Err(SendError(reason)) => {
                self.metrics.record_send(&route.topic, false);
                let err = IngestError::Publish {
                    topic: route.topic.clone(),
                    key: key.clone(),
                    reason: reason.clone(),
                };
                tracing::error!("{err}");
                match self
                    .dead_letters
                    .forward(ctx, &route.error_topic, &key, record, &route.topic, &reason)
                    .await
                {
                    Ok(_) => RecordOutcome::DeadLettered { key, error: reason },
                    Err(dl) => RecordOutcome::Lost {
                        key,
                        error: reason,
                        dead_letter_error: dl.to_string(),
                    },
                }
            }
        }
    }
}
