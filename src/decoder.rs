//! Turns raw JSON documents into typed warehouse payloads
pub mod inventory;
pub mod products;

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::{
    error::{IngestError, FILE_EMPTY},
    model::{InventoryData, InventoryItem, Product, ProductsData, Record, RecordKind},
};

/// Decoded document, tagged by the decoder that produced it.
/// The collection is not validated yet: it may be absent or empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Inventory(InventoryData),
    Products(ProductsData),
}

/// Decoder converts an uploaded document into a typed payload
pub trait Decoder {
    fn get_name(&self) -> String;
    fn decode(&self, message: &[u8]) -> Result<Payload, IngestError>;
}

/// Returns the decoder for documents of the given kind.
pub fn get_decoder(kind: RecordKind) -> Arc<dyn Decoder + Send + Sync> {
    match kind {
        RecordKind::Inventory => Arc::new(inventory::Decoder {}),
        RecordKind::Product => Arc::new(products::Decoder {}),
    }
}

/// Decodes a single record as published on an inventory or product topic.
pub fn decode_record(kind: RecordKind, message: &[u8]) -> Result<Record, IngestError> {
    match kind {
        RecordKind::Inventory => {
            parse::<InventoryItem>(message, "inventory record").map(Record::Inventory)
        }
        RecordKind::Product => parse::<Product>(message, "product record").map(Record::Product),
    }
}

/// Empty or whitespace-only input is rejected before any parsing happens.
fn parse<T: DeserializeOwned>(message: &[u8], context: &str) -> Result<T, IngestError> {
    if message.iter().all(u8::is_ascii_whitespace) {
        return Err(IngestError::EmptyInput(String::from(FILE_EMPTY)));
    }
    serde_json::from_slice(message).map_err(|e| IngestError::decode(context, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_decoding_dispatches_on_kind() {
        let rec = decode_record(
            RecordKind::Inventory,
            br#"{"art_id":"1","name":"leg","stock":"12"}"#,
        )
        .unwrap();
        assert!(matches!(rec, Record::Inventory(ref i) if i.art_id == "1"));

        let err = decode_record(
            RecordKind::Product,
            br#"{"art_id":"1","name":"leg","stock":"12"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::Decode { .. }));
    }

    #[test]
    fn blank_input_is_empty_not_malformed() {
        let err = decode_record(RecordKind::Inventory, b"  \n").unwrap_err();
        assert!(matches!(err, IngestError::EmptyInput(_)));
    }

    #[test]
    fn decoders_are_named_after_their_kind() {
        assert_eq!(get_decoder(RecordKind::Inventory).get_name(), "inventory");
        assert_eq!(get_decoder(RecordKind::Product).get_name(), "products");
    }
}
