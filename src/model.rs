//! Domain records and the envelopes they travel in
use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Stock line for a single article
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct InventoryItem {
    pub art_id: String,
    pub name: String,
    pub stock: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ArticleAmount {
    pub art_id: String,
    pub amount_of: String,
}

/// Product definition and the articles it is assembled from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub name: String,
    pub contain_articles: Vec<ArticleAmount>,
}

/// `{"inventory": [...]}` document. The collection is optional so that an
/// absent collection can be told apart from a malformed document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct InventoryData {
    #[serde(default)]
    pub inventory: Option<Vec<InventoryItem>>,
}

/// `{"products": [...]}` document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProductsData {
    #[serde(default)]
    pub products: Option<Vec<Product>>,
}

/// Which family of records a batch, topic or decoder deals with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Inventory,
    Product,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Inventory => "inventory",
            RecordKind::Product => "product",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded collection, tagged once at the ingestion boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Batch {
    Inventory(Vec<InventoryItem>),
    Products(Vec<Product>),
}

impl Batch {
    pub fn kind(&self) -> RecordKind {
        match self {
            Batch::Inventory(_) => RecordKind::Inventory,
            Batch::Products(_) => RecordKind::Product,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Batch::Inventory(items) => items.len(),
            Batch::Products(products) => products.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pairs every record with its natural key (article id or product name).
    /// Order is preserved and duplicate keys are kept as separate entries.
    pub fn into_keyed(self) -> Result<Vec<(String, serde_json::Value)>, serde_json::Error> {
        match self {
            Batch::Inventory(items) => items
                .into_iter()
                .map(|item| Ok((item.art_id.clone(), serde_json::to_value(item)?)))
                .collect(),
            Batch::Products(products) => products
                .into_iter()
                .map(|product| Ok((product.name.clone(), serde_json::to_value(product)?)))
                .collect(),
        }
    }
}

/// Single record as it appears on an inventory or product topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Inventory(InventoryItem),
    Product(Product),
}

/// Structured description of a failed publish, sent to the error topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterEvent {
    pub key: String,
    pub original_message: serde_json::Value,
    pub original_topic: String,
    pub error_message: String,
    /// epoch millis
    pub timestamp: i64,
}

/// Response of the combined file ingestion endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub inventory_count: usize,
    pub product_count: usize,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str) -> InventoryItem {
        InventoryItem {
            art_id: id.into(),
            name: "leg".into(),
            stock: "12".into(),
        }
    }

    #[test]
    fn keyed_inventory_keeps_duplicates_in_order() {
        let keyed = Batch::Inventory(vec![item("1"), item("2"), item("1")])
            .into_keyed()
            .unwrap();
        let keys: Vec<&str> = keyed.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["1", "2", "1"]);
        assert_eq!(keyed[1].1["stock"], "12");
    }

    #[test]
    fn products_are_keyed_by_name() {
        let batch = Batch::Products(vec![Product {
            name: "Dining Chair".into(),
            contain_articles: vec![ArticleAmount {
                art_id: "1".into(),
                amount_of: "4".into(),
            }],
        }]);
        assert_eq!(batch.kind(), RecordKind::Product);
        let keyed = batch.into_keyed().unwrap();
        assert_eq!(keyed[0].0, "Dining Chair");
        assert_eq!(keyed[0].1["contain_articles"][0]["amount_of"], "4");
    }

    #[test]
    fn dead_letter_event_uses_camel_case() {
        let event = DeadLetterEvent {
            key: "2".into(),
            original_message: serde_json::json!({"art_id": "2"}),
            original_topic: "inventory".into(),
            error_message: "timeout".into(),
            timestamp: 1_700_000_000_000,
        };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["originalTopic"], "inventory");
        assert_eq!(v["errorMessage"], "timeout");
        assert_eq!(v["originalMessage"]["art_id"], "2");
        assert_eq!(v["timestamp"], 1_700_000_000_000i64);
    }
}
