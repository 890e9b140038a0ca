use async_trait::async_trait;
use serde_json::Value;

use crate::error::EngineError;
use crate::models::document::ExtractionUnit;
use crate::models::schema::DocumentType;

/// One generation call.
#[derive(Debug, Clone, Copy)]
pub struct EngineRequest<'a> {
    /// System instruction for the document profile.
    pub instructions: &'a str,
    /// User turn accompanying the content.
    pub prompt: &'a str,
    pub content: &'a ExtractionUnit,
    /// Requested output structure.
    pub output_schema: &'a Value,
}

/// What the engine returned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineResponse {
    pub raw_text: String,
    /// Tokens the call consumed, when the engine reports it.
    pub token_usage: Option<u64>,
    /// Document type the engine reported outside the body, if any.
    pub classification_hint: Option<DocumentType>,
}

/// The external generative extraction engine.
#[async_trait]
pub trait ExtractionEngine: Send + Sync {
    async fn generate(&self, request: EngineRequest<'_>) -> Result<EngineResponse, EngineError>;
}
