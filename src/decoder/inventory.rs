use crate::{error::IngestError, model::InventoryData};

use super::Payload;

pub struct Decoder;

impl super::Decoder for Decoder {
    fn get_name(&self) -> String {
        String::from("inventory")
    }
    fn decode(&self, message: &[u8]) -> Result<Payload, IngestError> {
        let data: InventoryData = super::parse(message, "inventory document")?;
        Ok(Payload::Inventory(data))
    }
}
