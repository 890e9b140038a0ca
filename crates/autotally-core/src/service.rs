//! The request boundary: credential check, pipeline run, uniform response.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::auth::CredentialValidator;
use crate::error::{ErrorInfo, Result};
use crate::models::document::RawDocument;
use crate::models::schema::{DocumentSchema, DocumentType};
use crate::pipeline::{BulkOrchestrator, BulkResult, DocumentProcessor, ProcessOptions, ProcessingMetadata};
use crate::quota::UsageSnapshot;

/// One processing request.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub document: RawDocument,
    /// Raw `Authorization` header value.
    pub authorization: Option<String>,
    pub options: ProcessOptions,
}

/// The response returned for every request, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type: Option<DocumentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<DocumentSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<UsageSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ProcessingMetadata>,
}

impl ProcessResponse {
    fn failure(error: ErrorInfo, token_usage: Option<UsageSnapshot>) -> Self {
        Self {
            success: false,
            document_type: None,
            data: None,
            error: Some(error),
            token_usage,
            metadata: None,
        }
    }
}

/// Authenticated front door to the pipeline.
pub struct ExtractionService {
    validator: CredentialValidator,
    processor: Arc<DocumentProcessor>,
}

impl ExtractionService {
    pub fn new(validator: CredentialValidator, processor: Arc<DocumentProcessor>) -> Self {
        Self {
            validator,
            processor,
        }
    }

    /// Handle one request. Never fails: errors are carried in the response.
    pub async fn handle(&self, request: ProcessRequest) -> ProcessResponse {
        if let Err(e) = self.validator.validate(request.authorization.as_deref()) {
            debug!("Rejected request: {}", e);
            return ProcessResponse::failure(ErrorInfo::from(&e), None);
        }

        match self.processor.process(request.document, &request.options).await {
            Ok(processed) => ProcessResponse {
                success: true,
                document_type: Some(processed.schema.document_type()),
                data: Some(processed.schema),
                error: None,
                token_usage: Some(processed.usage),
                metadata: Some(processed.metadata),
            },
            Err(e) => {
                let usage = match self.processor.ledger().snapshot() {
                    Ok(usage) => Some(usage),
                    Err(snapshot_err) => {
                        warn!("Could not read usage for the error response: {}", snapshot_err);
                        None
                    }
                };
                ProcessResponse::failure(ErrorInfo::from(&e), usage)
            }
        }
    }

    /// Authenticate once, then run an ordered batch.
    pub async fn handle_batch(
        &self,
        authorization: Option<&str>,
        documents: Vec<RawDocument>,
        options: &ProcessOptions,
    ) -> Result<BulkResult> {
        self.validator.validate(authorization)?;
        let bulk = BulkOrchestrator::new(Arc::clone(&self.processor));
        Ok(bulk.run(documents, options).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AutoTallyError, ErrorKind};
    use crate::models::config::{AutoTallyConfig, QuotaConfig};
    use crate::quota::{MemoryLedgerStore, QuotaLedger};
    use crate::testing::{invoice_reply, text_pdf, ManualClock, ScriptedEngine};

    fn service(engine: ScriptedEngine) -> (ExtractionService, Arc<ScriptedEngine>) {
        let ledger = QuotaLedger::new(MemoryLedgerStore::new(), ManualClock::new("2025-08"), &QuotaConfig::default());
        let engine = Arc::new(engine);
        let processor = DocumentProcessor::new(&AutoTallyConfig::default(), engine.clone(), ledger).with_ocr(None);
        (
            ExtractionService::new(CredentialValidator::from_list("secret"), Arc::new(processor)),
            engine,
        )
    }

    fn request(authorization: Option<&str>) -> ProcessRequest {
        ProcessRequest {
            document: RawDocument::new(text_pdf(&[
                "TAX INVOICE Tech Solutions Pvt Ltd GSTIN 27ABCDE1234F1Z0 Invoice INV-9",
            ])),
            authorization: authorization.map(str::to_string),
            options: ProcessOptions::default(),
        }
    }

    #[tokio::test]
    async fn test_success_response() {
        let (service, _) = service(ScriptedEngine::new().reply(&invoice_reply("INV-9"), Some(700)));
        let response = service.handle(request(Some("Bearer secret"))).await;

        assert!(response.success);
        assert_eq!(response.document_type, Some(DocumentType::Invoice));
        assert_eq!(response.token_usage.as_ref().unwrap().used, 700);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["documentType"], "INVOICE");
        assert_eq!(json["data"]["invoiceNumber"], "INV-9");
        assert_eq!(json["tokenUsage"]["limit"], 50_000);
        assert!(json.get("error").is_none());
    }

    #[tokio::test]
    async fn test_bad_credential_never_reaches_pipeline() {
        let (service, engine) = service(ScriptedEngine::new());
        let response = service.handle(request(Some("Bearer wrong"))).await;

        assert!(!response.success);
        let error = response.error.unwrap();
        assert_eq!(error.kind, ErrorKind::InvalidCredential);
        assert!(error.message.contains("Invalid API key"));
        assert_eq!(response.token_usage, None);
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_pipeline_failure_carries_usage() {
        let (service, _) = service(ScriptedEngine::new().reply(r#"{"documentType":"INVALID"}"#, Some(40)));
        let response = service.handle(request(Some("Bearer secret"))).await;

        assert!(!response.success);
        assert_eq!(response.error.unwrap().kind, ErrorKind::ExtractionFailed);
        assert_eq!(response.token_usage.unwrap().used, 40);
    }

    #[tokio::test]
    async fn test_batch_requires_credential() {
        let (service, _) = service(ScriptedEngine::new());
        let err = service
            .handle_batch(None, Vec::new(), &ProcessOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AutoTallyError::InvalidCredential(_)));

        let result = service
            .handle_batch(Some("Bearer secret"), Vec::new(), &ProcessOptions::default())
            .await
            .unwrap();
        assert_eq!(result.items.len(), 0);
    }
}
