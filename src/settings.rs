//! Application config
use std::collections::HashMap;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::model::RecordKind;

/// HTTP listener configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Http {
    /// address to bind (default: 0.0.0.0:8080)
    pub listen: Option<String>,
    /// request body limit in bytes (default: 10 MiB)
    pub max_body_bytes: Option<usize>,
}

/// Kafka client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Kafka {
    /// comma-separated bootstrap brokers
    pub brokers: String,
    /// consumer group of the topic monitor (default: warehouse-data-ingestion)
    pub consumer_group: Option<String>,
    /// delivery timeout per message (default: 5000)
    pub message_timeout_ms: Option<u64>,
    /// default: all
    pub acks: Option<String>,
    /// default: 3
    pub retries: Option<u32>,
    /// default: 1
    pub linger_ms: Option<u64>,
    /// default: 16384
    pub batch_size: Option<u32>,
    /// default: 32768
    pub queue_buffering_max_kbytes: Option<u32>,
    /// default: true
    pub enable_idempotence: Option<bool>,
    /// max in-flight requests per connection (default: 5)
    pub max_in_flight: Option<u32>,
    /// additional librdkafka properties, passed through verbatim
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

/// Topic names. Error topics default to `<topic>-error`.
#[derive(Debug, Clone, Deserialize)]
pub struct Topics {
    pub inventory: String,
    pub inventory_error: Option<String>,
    pub product: String,
    pub product_error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Monitor {
    /// consume the inventory and product topics and log what arrives
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub http: Http,
    pub kafka: Kafka,
    pub topics: Topics,
    #[serde(default)]
    pub monitor: Monitor,
}

/// Destination of one kind of record plus its dead-letter topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRoute {
    pub topic: String,
    pub error_topic: String,
}

impl Settings {
    pub fn new(cfgfile: &str) -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(cfgfile).required(true))
            .add_source(Environment::with_prefix("WAREHOUSE_INGEST").separator("__"))
            .build()?;
        Self::from_config(cfg)
    }

    /// Deserializes and fills in every default left unset.
    pub fn from_config(cfg: Config) -> Result<Self, ConfigError> {
        let mut settings: Settings = cfg.try_deserialize()?;
        if settings.kafka.brokers.trim().is_empty() {
            return Err(ConfigError::Message(String::from(
                "kafka.brokers must not be empty",
            )));
        }

        let http = &mut settings.http;
        http.listen.get_or_insert_with(|| String::from("0.0.0.0:8080"));
        http.max_body_bytes.get_or_insert(10 * 1024 * 1024);

        let kafka = &mut settings.kafka;
        kafka
            .consumer_group
            .get_or_insert_with(|| String::from("warehouse-data-ingestion"));
        kafka.message_timeout_ms.get_or_insert(5000);
        kafka.acks.get_or_insert_with(|| String::from("all"));
        kafka.retries.get_or_insert(3);
        kafka.linger_ms.get_or_insert(1);
        kafka.batch_size.get_or_insert(16384);
        kafka.queue_buffering_max_kbytes.get_or_insert(32768);
        kafka.enable_idempotence.get_or_insert(true);
        kafka.max_in_flight.get_or_insert(5);

        let topics = &mut settings.topics;
        if topics.inventory_error.is_none() {
            topics.inventory_error = Some(format!("{}-error", topics.inventory));
        }
        if topics.product_error.is_none() {
            topics.product_error = Some(format!("{}-error", topics.product));
        }
        Ok(settings)
    }

    pub fn listen(&self) -> &str {
        self.http.listen.as_deref().unwrap_or("0.0.0.0:8080")
    }

    pub fn max_body_bytes(&self) -> usize {
        self.http.max_body_bytes.unwrap_or(10 * 1024 * 1024)
    }

    pub fn route(&self, kind: RecordKind) -> TopicRoute {
        let (topic, error_topic) = match kind {
            RecordKind::Inventory => (&self.topics.inventory, &self.topics.inventory_error),
            RecordKind::Product => (&self.topics.product, &self.topics.product_error),
        };
        TopicRoute {
            topic: topic.clone(),
            error_topic: error_topic
                .clone()
                .unwrap_or_else(|| format!("{topic}-error")),
        }
    }

    /// Maps a topic name back to the kind of record published on it.
    pub fn kind_of(&self, topic: &str) -> Option<RecordKind> {
        if topic == self.topics.inventory {
            Some(RecordKind::Inventory)
        } else if topic == self.topics.product {
            Some(RecordKind::Product)
        } else {
            None
        }
    }
}
