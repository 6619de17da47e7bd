//! ## warehouse-ingest
//! Service that accepts warehouse inventory and product documents over HTTP
//! and republishes every record, keyed by its natural id, onto Kafka topics.
//!
//! ## Installation
//! Just use cargo.
//!
//! ## Configuration
//! Example config:
//! ```toml
//! [http]
//! listen = "0.0.0.0:8080"
//! max_body_bytes = 10485760
//!
//! [kafka]
//! brokers = "localhost:9092"
//! acks = "all"                       # producer defaults favour durability
//! extra = { "compression.type" = "lz4" }
//!
//! [topics]
//! inventory = "inventory"            # error topic defaults to "inventory-error"
//! product = "product"
//!
//! [monitor]
//! enabled = true                     # log whatever lands on the topics
//! ```
//! Any value can be overridden from the environment, e.g. `WAREHOUSE_INGEST__KAFKA__BROKERS`.
//!
//! ## Documents
//! Inventory documents look like `{"inventory": [{"art_id": "1", "name": "leg", "stock": "12"}]}`
//! and are keyed by `art_id`. Product documents look like
//! `{"products": [{"name": "Dining Chair", "contain_articles": [{"art_id": "1", "amount_of": "4"}]}]}`
//! and are keyed by `name`. Both are handled by a [Decoder].
//!
//! ## Delivery
//! A request is answered as soon as its records are handed to the [BatchPublisher];
//! sends complete in the background. A record that cannot be delivered is wrapped
//! into a [DeadLetterEvent] and sent to the error topic of its kind, once.
//! Retries, ordering and backpressure are left to the Kafka client.
//!
//! [Decoder]: decoder::Decoder
//! [BatchPublisher]: publisher::BatchPublisher
//! [DeadLetterEvent]: model::DeadLetterEvent

pub mod decoder;
pub mod error;
pub mod ingester;
pub mod metrics;
pub mod model;
pub mod monitor;
pub mod publisher;
pub mod server;
pub mod settings;
pub mod telemetry;
