use std::{sync::Arc, time::Instant};

use crate::{
    decoder::{get_decoder, Payload},
    error::{IngestError, INVALID_INVENTORY_DATA, INVALID_PRODUCTS_DATA, NO_FILES_PROVIDED},
    metrics::IngestMetrics,
    model::{Batch, IngestSummary, InventoryData, ProductsData, RecordKind},
    publisher::{BatchHandle, BatchPublisher},
    settings::{Settings, TopicRoute},
    telemetry::RequestContext,
};

pub const STATUS_INGESTED: &str = "INGESTED";

/// Request accepted for publishing
pub struct Accepted {
    pub kind: RecordKind,
    pub count: usize,
    /// sends are in flight; drop to leave them running unobserved
    pub batch: BatchHandle,
}

/// Ingester validates incoming documents and hands them to the publisher.
/// Every accepted collection results in exactly one publish batch.
#[derive(Clone)]
pub struct Ingester {
    publisher: BatchPublisher,
    inventory: TopicRoute,
    product: TopicRoute,
    metrics: Arc<IngestMetrics>,
}

impl Ingester {
    pub fn new(
        publisher: BatchPublisher,
        inventory: TopicRoute,
        product: TopicRoute,
        metrics: Arc<IngestMetrics>,
    ) -> Ingester {
        Ingester {
            publisher,
            inventory,
            product,
            metrics,
        }
    }

    pub fn from_settings(
        settings: &Settings,
        publisher: BatchPublisher,
        metrics: Arc<IngestMetrics>,
    ) -> Ingester {
        Self::new(
            publisher,
            settings.route(RecordKind::Inventory),
            settings.route(RecordKind::Product),
            metrics,
        )
    }

    pub fn metrics(&self) -> &IngestMetrics {
        &self.metrics
    }

    fn route(&self, kind: RecordKind) -> &TopicRoute {
        match kind {
            RecordKind::Inventory => &self.inventory,
            RecordKind::Product => &self.product,
        }
    }

    /// Uploaded file: missing or empty bytes are rejected before decoding.
    pub fn ingest_upload(
        &self,
        ctx: &RequestContext,
        kind: RecordKind,
        file: Option<&[u8]>,
    ) -> Result<Accepted, IngestError> {
        self.observe(kind.as_str(), || {
            let batch = decode_upload(kind, file)?;
            self.dispatch(ctx, batch)
        })
    }

    /// Already-parsed `{"inventory": [...]}` body.
    pub fn ingest_inventory(
        &self,
        ctx: &RequestContext,
        data: InventoryData,
    ) -> Result<Accepted, IngestError> {
        self.observe(RecordKind::Inventory.as_str(), || {
            let batch = validate(Payload::Inventory(data))?;
            self.dispatch(ctx, batch)
        })
    }

    /// Already-parsed `{"products": [...]}` body.
    pub fn ingest_products(
        &self,
        ctx: &RequestContext,
        data: ProductsData,
    ) -> Result<Accepted, IngestError> {
        self.observe(RecordKind::Product.as_str(), || {
            let batch = validate(Payload::Products(data))?;
            self.dispatch(ctx, batch)
        })
    }

    /// Combined upload with optional inventory and products parts.
    /// Both parts are decoded before anything is published, so a bad part publishes nothing.
    /// A part whose collection is empty counts as zero and is not published.
    pub fn ingest_files(
        &self,
        ctx: &RequestContext,
        inventory: Option<&[u8]>,
        products: Option<&[u8]>,
    ) -> Result<(IngestSummary, Vec<BatchHandle>), IngestError> {
        self.observe("files", || {
            let inventory = inventory.filter(|bytes| !is_blank(bytes));
            let products = products.filter(|bytes| !is_blank(bytes));
            if inventory.is_none() && products.is_none() {
                return Err(IngestError::EmptyInput(String::from(NO_FILES_PROVIDED)));
            }

            let mut batches = Vec::new();
            for (kind, part) in [
                (RecordKind::Inventory, inventory),
                (RecordKind::Product, products),
            ] {
                if let Some(bytes) = part {
                    match decode_upload(kind, Some(bytes)) {
                        Ok(batch) => batches.push(batch),
                        Err(IngestError::EmptyInput(_)) => {}
                        Err(e) => return Err(e),
                    }
                }
            }

            let mut summary = IngestSummary {
                inventory_count: 0,
                product_count: 0,
                status: String::from(STATUS_INGESTED),
            };
            let mut handles = Vec::with_capacity(batches.len());
            for batch in batches {
                let accepted = self.dispatch(ctx, batch)?;
                match accepted.kind {
                    RecordKind::Inventory => summary.inventory_count = accepted.count,
                    RecordKind::Product => summary.product_count = accepted.count,
                }
                handles.push(accepted.batch);
            }
            Ok((summary, handles))
        })
    }

    fn dispatch(&self, ctx: &RequestContext, batch: Batch) -> Result<Accepted, IngestError> {
        let kind = batch.kind();
        let count = batch.len();
        let records = batch
            .into_keyed()
            .map_err(|e| IngestError::Internal(anyhow::anyhow!("re-encoding {kind} records: {e}")))?;
        let route = self.route(kind);
        let handle = self.publisher.publish_batch(ctx, route, records);
        tracing::info!(
            trace_id = %ctx.trace_id,
            kind = %kind,
            count,
            topic = %route.topic,
            "accepted records"
        );
        Ok(Accepted {
            kind,
            count,
            batch: handle,
        })
    }

    fn observe<T>(
        &self,
        kind: &str,
        f: impl FnOnce() -> Result<T, IngestError>,
    ) -> Result<T, IngestError>
    where
        T: Counted,
    {
        let _active = self.metrics.start_processing();
        let started = Instant::now();
        let result = f();
        self.metrics.record_duration(kind, started.elapsed());
        match &result {
            Ok(done) => self.metrics.record_accepted(kind, done.counted()),
            Err(e) => {
                self.metrics.record_rejected(kind, e.metric_label());
                if e.is_client_error() {
                    tracing::warn!(kind, "rejected request: {e}");
                } else {
                    tracing::error!(kind, "request failed: {e}");
                }
            }
        }
        result
    }
}

/// Number of records a successful call accepted, for metrics.
trait Counted {
    fn counted(&self) -> usize;
}

impl Counted for Accepted {
    fn counted(&self) -> usize {
        self.count
    }
}

impl Counted for (IngestSummary, Vec<BatchHandle>) {
    fn counted(&self) -> usize {
        self.0.inventory_count + self.0.product_count
    }
}

/// Empty or whitespace-only part, treated as not supplied.
fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

fn decode_upload(kind: RecordKind, file: Option<&[u8]>) -> Result<Batch, IngestError> {
    let bytes = file.unwrap_or_default();
    let decoder = get_decoder(kind);
    tracing::debug!(decoder = %decoder.get_name(), bytes = bytes.len(), "decoding upload");
    validate(decoder.decode(bytes)?)
}

/// Rejects absent or empty collections.
pub fn validate(payload: Payload) -> Result<Batch, IngestError> {
    match payload {
        Payload::Inventory(InventoryData { inventory: None }) => {
            Err(IngestError::InvalidInput(String::from(INVALID_INVENTORY_DATA)))
        }
        Payload::Products(ProductsData { products: None }) => {
            Err(IngestError::InvalidInput(String::from(INVALID_PRODUCTS_DATA)))
        }
        Payload::Inventory(InventoryData {
            inventory: Some(items),
        }) => {
            if items.is_empty() {
                return Err(IngestError::EmptyInput(String::from(
                    "inventory must not be empty",
                )));
            }
            Ok(Batch::Inventory(items))
        }
        Payload::Products(ProductsData {
            products: Some(products),
        }) => {
            if products.is_empty() {
                return Err(IngestError::EmptyInput(String::from(
                    "products must not be empty",
                )));
            }
            Ok(Batch::Products(products))
        }
    }
}
