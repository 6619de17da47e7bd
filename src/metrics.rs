//! Prometheus counters for uploads, published records and dead letters
use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

const DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Metrics owns its registry, so independent instances never collide.
pub struct IngestMetrics {
    uploads_total: IntCounterVec,
    items_processed_total: IntCounterVec,
    kafka_messages_total: IntCounterVec,
    dead_letters_total: IntCounterVec,
    processing_active: IntGauge,
    request_duration: HistogramVec,
    registry: Registry,
}

impl IngestMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let uploads_total = IntCounterVec::new(
            Opts::new("warehouse_uploads_total", "Ingestion requests by outcome"),
            &["type", "outcome", "error_type"],
        )?;
        let items_processed_total = IntCounterVec::new(
            Opts::new("warehouse_items_processed_total", "Records accepted for publishing"),
            &["type"],
        )?;
        let kafka_messages_total = IntCounterVec::new(
            Opts::new("warehouse_kafka_messages_total", "Kafka sends by outcome"),
            &["topic", "outcome"],
        )?;
        let dead_letters_total = IntCounterVec::new(
            Opts::new("warehouse_dead_letters_total", "Dead-letter events by outcome"),
            &["topic", "outcome"],
        )?;
        let processing_active = IntGauge::new(
            "warehouse_processing_active",
            "Ingestion requests currently being processed",
        )?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "warehouse_request_duration_seconds",
                "Time spent decoding and dispatching a request",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["type"],
        )?;

        registry.register(Box::new(uploads_total.clone()))?;
        registry.register(Box::new(items_processed_total.clone()))?;
        registry.register(Box::new(kafka_messages_total.clone()))?;
        registry.register(Box::new(dead_letters_total.clone()))?;
        registry.register(Box::new(processing_active.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(IngestMetrics {
            uploads_total,
            items_processed_total,
            kafka_messages_total,
            dead_letters_total,
            processing_active,
            request_duration,
            registry,
        })
    }

    pub fn record_accepted(&self, kind: &str, items: usize) {
        self.uploads_total
            .with_label_values(&[kind, "success", ""])
            .inc();
        self.items_processed_total
            .with_label_values(&[kind])
            .inc_by(items as u64);
    }

    pub fn record_rejected(&self, kind: &str, error_type: &str) {
        self.uploads_total
            .with_label_values(&[kind, "error", error_type])
            .inc();
    }

    pub fn record_send(&self, topic: &str, ok: bool) {
        let outcome = if ok { "success" } else { "error" };
        self.kafka_messages_total
            .with_label_values(&[topic, outcome])
            .inc();
    }

    pub fn record_dead_letter(&self, topic: &str, ok: bool) {
        let outcome = if ok { "forwarded" } else { "lost" };
        self.dead_letters_total
            .with_label_values(&[topic, outcome])
            .inc();
    }

    pub fn record_duration(&self, kind: &str, elapsed: Duration) {
        self.request_duration
            .with_label_values(&[kind])
            .observe(elapsed.as_secs_f64());
    }

    /// Tracks one in-flight request until the returned guard is dropped.
    pub fn start_processing(&self) -> ActiveGuard {
        self.processing_active.inc();
        ActiveGuard {
            gauge: self.processing_active.clone(),
        }
    }

    pub fn sends(&self, topic: &str, outcome: &str) -> u64 {
        self.kafka_messages_total
            .with_label_values(&[topic, outcome])
            .get()
    }

    pub fn dead_letters(&self, topic: &str, outcome: &str) -> u64 {
        self.dead_letters_total
            .with_label_values(&[topic, outcome])
            .get()
    }

    pub fn active(&self) -> i64 {
        self.processing_active.get()
    }

    /// Text exposition of all registered metrics.
    pub fn gather(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("encoding metrics: {e}");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

pub struct ActiveGuard {
    gauge: IntGauge,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}
