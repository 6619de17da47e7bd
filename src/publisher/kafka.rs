use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    message::{Header, OwnedHeaders},
    producer::{FutureProducer, FutureRecord, Producer},
};

use crate::settings;

use super::{Delivery, OutboundMessage, SendError, Transport};

/// Transport backed by an rdkafka [FutureProducer]
pub struct KafkaTransport {
    producer: FutureProducer,
    queue_timeout: Duration,
}

impl KafkaTransport {
    pub fn new(cfg: &settings::Kafka) -> Result<KafkaTransport, anyhow::Error> {
        let producer: FutureProducer = client_config(cfg)
            .create()
            .with_context(|| format!("creating kafka producer for {}", cfg.brokers))?;
        tracing::info!(brokers = %cfg.brokers, "kafka producer configured");
        Ok(KafkaTransport {
            producer,
            queue_timeout: Duration::from_millis(cfg.message_timeout_ms.unwrap_or(5000)),
        })
    }

    /// Blocks until every queued message has been acknowledged or `timeout` expires.
    pub fn flush(&self, timeout: Duration) -> Result<(), anyhow::Error> {
        self.producer
            .flush(timeout)
            .context("flushing kafka producer")
    }
}

/// Producer properties. Retries, ordering and backpressure are left to librdkafka.
pub fn client_config(cfg: &settings::Kafka) -> ClientConfig {
    let mut client = ClientConfig::new();
    client
        .set("bootstrap.servers", &cfg.brokers)
        .set(
            "message.timeout.ms",
            cfg.message_timeout_ms.unwrap_or(5000).to_string(),
        )
        .set("acks", cfg.acks.as_deref().unwrap_or("all"))
        .set("retries", cfg.retries.unwrap_or(3).to_string())
        .set("linger.ms", cfg.linger_ms.unwrap_or(1).to_string())
        .set("batch.size", cfg.batch_size.unwrap_or(16384).to_string())
        .set(
            "queue.buffering.max.kbytes",
            cfg.queue_buffering_max_kbytes.unwrap_or(32768).to_string(),
        )
        .set(
            "enable.idempotence",
            cfg.enable_idempotence.unwrap_or(true).to_string(),
        )
        .set(
            "max.in.flight.requests.per.connection",
            cfg.max_in_flight.unwrap_or(5).to_string(),
        );
    for (k, v) in &cfg.extra {
        client.set(k, v);
    }
    client
}

#[async_trait]
impl Transport for KafkaTransport {
    async fn send(&self, message: OutboundMessage) -> Result<Delivery, SendError> {
        let headers = message
            .headers
            .iter()
            .fold(OwnedHeaders::new(), |headers, (key, value)| {
                headers.insert(Header {
                    key,
                    value: Some(value.as_bytes()),
                })
            });
        let record = FutureRecord::to(&message.topic)
            .key(&message.key)
            .payload(&message.payload)
            .headers(headers);

        match self.producer.send(record, self.queue_timeout).await {
            Ok((partition, offset)) => Ok(Delivery { partition, offset }),
            Err((e, _)) => Err(SendError(e.to_string())),
        }
    }
}
