//! Error taxonomy shared by the decoder, publisher and HTTP layers
use axum::http::StatusCode;
use thiserror::Error;

pub const FILE_EMPTY: &str = "File is empty";
pub const INVALID_INVENTORY_DATA: &str = "Invalid inventory data provided";
pub const INVALID_PRODUCTS_DATA: &str = "Invalid products data provided";
pub const NO_FILES_PROVIDED: &str = "At least one file (inventory or products) must be provided";

#[derive(Debug, Error)]
pub enum IngestError {
    /// no file or payload supplied, or the supplied collection is empty
    #[error("{0}")]
    EmptyInput(String),
    /// collection missing from an otherwise well-formed payload
    #[error("{0}")]
    InvalidInput(String),
    /// malformed JSON or a document of the wrong shape
    #[error("{context}: {reason}")]
    Decode { context: String, reason: String },
    #[error("{0}")]
    UnsupportedMediaType(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    /// transport failure for a single record
    #[error("sending key '{key}' to topic '{topic}': {reason}")]
    Publish {
        topic: String,
        key: String,
        reason: String,
    },
    /// the dead-letter event itself could not be delivered
    #[error("forwarding dead-letter event for key '{key}' to topic '{topic}': {reason}")]
    DeadLetterPublish {
        topic: String,
        key: String,
        reason: String,
    },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IngestError {
    pub fn decode(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        IngestError::Decode {
            context: context.into(),
            reason: err.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            IngestError::EmptyInput(_)
            | IngestError::InvalidInput(_)
            | IngestError::Decode { .. } => StatusCode::BAD_REQUEST,
            IngestError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            IngestError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            IngestError::Publish { .. }
            | IngestError::DeadLetterPublish { .. }
            | IngestError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code, reported as `error` in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::EmptyInput(_) => "FILE_PROCESSING_ERROR",
            IngestError::InvalidInput(_) => "INVALID_INPUT",
            IngestError::Decode { .. } => "JSON_PROCESSING_ERROR",
            IngestError::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
            IngestError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            IngestError::Publish { .. } | IngestError::DeadLetterPublish { .. } => {
                "PUBLISH_ERROR"
            }
            IngestError::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Short label used as the `error_type` metric dimension.
    pub fn metric_label(&self) -> &'static str {
        match self {
            IngestError::EmptyInput(_) => "empty_input",
            IngestError::InvalidInput(_) => "invalid_data",
            IngestError::Decode { .. } => "decode_error",
            IngestError::UnsupportedMediaType(_) => "unsupported_media_type",
            IngestError::PayloadTooLarge(_) => "payload_too_large",
            IngestError::Publish { .. } => "publish_error",
            IngestError::DeadLetterPublish { .. } => "dead_letter_error",
            IngestError::Internal(_) => "internal_error",
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }

    /// Message that is safe to hand back to a caller.
    /// Server-side failures never leak their internal detail.
    pub fn public_message(&self) -> String {
        if self.is_client_error() {
            self.to_string()
        } else {
            String::from("An unexpected error occurred")
        }
    }
}
