use std::sync::Arc;

use crate::{
    error::IngestError, metrics::IngestMetrics, model::DeadLetterEvent,
    telemetry::RequestContext,
};

use super::{Delivery, OutboundMessage, Transport};

/// Republishes failed records as [DeadLetterEvent]s.
/// Delivery of the event is best-effort: a failure here is logged and reported, never re-forwarded.
#[derive(Clone)]
pub struct DeadLetterForwarder {
    transport: Arc<dyn Transport>,
    metrics: Arc<IngestMetrics>,
}

impl DeadLetterForwarder {
    pub fn new(transport: Arc<dyn Transport>, metrics: Arc<IngestMetrics>) -> Self {
        DeadLetterForwarder { transport, metrics }
    }

    pub async fn forward(
        &self,
        ctx: &RequestContext,
        error_topic: &str,
        key: &str,
        original_message: serde_json::Value,
        original_topic: &str,
        error: &str,
    ) -> Result<Delivery, IngestError> {
        let event = DeadLetterEvent {
            key: key.to_owned(),
            original_message,
            original_topic: original_topic.to_owned(),
            error_message: error.to_owned(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        let lost = |reason: String| IngestError::DeadLetterPublish {
            topic: error_topic.to_owned(),
            key: key.to_owned(),
            reason,
        };

        let result = match serde_json::to_vec(&event) {
            Ok(payload) => self
                .transport
                .send(OutboundMessage::new(ctx, error_topic, key, payload))
                .await
                .map_err(|e| lost(e.0)),
            Err(e) => Err(lost(format!("serializing dead-letter event: {e}"))),
        };

        match result {
            Ok(delivery) => {
                self.metrics.record_dead_letter(error_topic, true);
                tracing::info!(
                    trace_id = %ctx.trace_id,
                    error_topic,
                    key,
                    "sent dead-letter event"
                );
                Ok(delivery)
            }
            Err(err) => {
                self.metrics.record_dead_letter(error_topic, false);
                tracing::error!(trace_id = %ctx.trace_id, "{err}");
                Err(err)
            }
        }
    }
}
