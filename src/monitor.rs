//! Consumer-group reader that logs what lands on the inventory and product topics
use std::future::Future;

use anyhow::Context;
use rdkafka::{
    config::ClientConfig,
    consumer::{CommitMode, Consumer, StreamConsumer},
    message::{BorrowedMessage, Headers},
    Message,
};

use crate::{
    decoder::decode_record,
    error::{IngestError, FILE_EMPTY},
    model::{Record, RecordKind},
    settings::Settings,
    telemetry::TRACE_ID_HEADER,
};

/// One decoded record as seen on a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observed {
    pub kind: RecordKind,
    pub key: Option<String>,
    pub trace_id: Option<String>,
    pub record: Record,
}

pub struct Monitor {
    consumer: StreamConsumer,
    settings: Settings,
}

impl Monitor {
    pub fn new(settings: &Settings) -> Result<Monitor, anyhow::Error> {
        let group = settings
            .kafka
            .consumer_group
            .as_deref()
            .unwrap_or("warehouse-data-ingestion");
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &settings.kafka.brokers)
            .set("group.id", group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .context("creating kafka consumer")?;
        let topics = [
            settings.topics.inventory.as_str(),
            settings.topics.product.as_str(),
        ];
        consumer
            .subscribe(&topics)
            .with_context(|| format!("subscribing to {topics:?}"))?;
        tracing::info!(group, ?topics, "topic monitor subscribed");
        Ok(Monitor {
            consumer,
            settings: settings.clone(),
        })
    }

    /// Consumes until `shutdown` resolves. Offsets are committed after each message
    /// is handled, including messages that could not be decoded.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("topic monitor stopping");
                    return;
                }
                received = self.consumer.recv() => match received {
                    Err(e) => tracing::error!("error receiving message: {e}"),
                    Ok(msg) => {
                        self.handle(&msg);
                        if let Err(e) = self.consumer.commit_message(&msg, CommitMode::Async) {
                            tracing::error!("failed to commit offsets: {e}");
                        }
                    }
                },
            }
        }
    }

    fn handle(&self, msg: &BorrowedMessage<'_>) {
        let headers: Vec<(String, String)> = msg
            .headers()
            .map(|h| {
                h.iter()
                    .map(|header| {
                        (
                            header.key.to_owned(),
                            String::from_utf8_lossy(header.value.unwrap_or_default()).into_owned(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        match Self::inspect(&self.settings, msg.topic(), msg.key(), msg.payload(), &headers) {
            Ok(seen) => log_observed(msg.topic(), msg.partition(), msg.offset(), &seen),
            Err(e) => tracing::warn!(
                topic = msg.topic(),
                partition = msg.partition(),
                offset = msg.offset(),
                "skipping message: {e}"
            ),
        }
    }

    /// Decodes one consumed message by the topic it arrived on.
    pub fn inspect(
        settings: &Settings,
        topic: &str,
        key: Option<&[u8]>,
        payload: Option<&[u8]>,
        headers: &[(String, String)],
    ) -> Result<Observed, IngestError> {
        let kind = settings
            .kind_of(topic)
            .ok_or_else(|| IngestError::InvalidInput(format!("unexpected topic '{topic}'")))?;
        let payload = payload.ok_or_else(|| IngestError::EmptyInput(String::from(FILE_EMPTY)))?;
        let record = decode_record(kind, payload)?;
        let trace_id = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(TRACE_ID_HEADER))
            .map(|(_, v)| v.clone());
        Ok(Observed {
            kind,
            key: key.map(|k| String::from_utf8_lossy(k).into_owned()),
            trace_id,
            record,
        })
    }
}

fn log_observed(topic: &str, partition: i32, offset: i64, seen: &Observed) {
    let trace_id = seen.trace_id.as_deref().unwrap_or("-");
    let key = seen.key.as_deref().unwrap_or("-");
    match &seen.record {
        Record::Inventory(item) => tracing::info!(
            topic,
            partition,
            offset,
            trace_id,
            key,
            "received inventory article {} '{}' with stock {}",
            item.art_id,
            item.name,
            item.stock
        ),
        Record::Product(product) => tracing::info!(
            topic,
            partition,
            offset,
            trace_id,
            key,
            "received product '{}' with {} articles",
            product.name,
            product.contain_articles.len()
        ),
    }
}
