use crate::{error::IngestError, model::ProductsData};

use super::Payload;

pub struct Decoder;

impl super::Decoder for Decoder {
    fn get_name(&self) -> String {
        String::from("products")
    }
    fn decode(&self, message: &[u8]) -> Result<Payload, IngestError> {
        let data: ProductsData = super::parse(message, "products document")?;
        Ok(Payload::Products(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Decoder as _;

    #[test]
    fn decodes_products_with_articles() {
        let doc = br#"{"products":[
            {"name":"Dining Chair","contain_articles":[{"art_id":"1","amount_of":"4"},{"art_id":"2","amount_of":"8"}]},
            {"name":"Dinning Table","contain_articles":[{"art_id":"4","amount_of":"1"}]}
        ]}"#;
        let Payload::Products(data) = Decoder.decode(doc).unwrap() else {
            panic!("expected products payload");
        };
        let products = data.products.unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].contain_articles[1].amount_of, "8");
    }

    #[test]
    fn empty_collection_is_kept_for_validation() {
        let Payload::Products(data) = Decoder.decode(br#"{"products":[]}"#).unwrap() else {
            panic!("expected products payload");
        };
        assert_eq!(data.products, Some(vec![]));
    }

    #[test]
    fn product_without_articles_is_malformed() {
        let err = Decoder
            .decode(br#"{"products":[{"name":"Chair"}]}"#)
            .unwrap_err();
        assert!(matches!(err, IngestError::Decode { .. }));
    }
}
