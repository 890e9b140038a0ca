//! Ordered batch processing.
//!
//! A bad file only fails its own slot. Quota exhaustion, local or upstream,
//! stops the batch: nothing after it could be dispatched anyway.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::processor::{DocumentProcessor, ProcessOptions, ProcessedDocument};
use crate::error::ErrorInfo;
use crate::models::document::RawDocument;

/// Result of one batch item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum ItemOutcome {
    Success(Box<ProcessedDocument>),
    Failure(ErrorInfo),
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Success(_))
    }
}

/// One slot in the batch result, in input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkItemResult {
    /// Position in the input batch.
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub outcome: ItemOutcome,
}

/// Outcome of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResult {
    pub items: Vec<BulkItemResult>,
    pub successful: usize,
    pub failed: usize,
    /// The quota error that stopped the batch early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted_by: Option<ErrorInfo>,
    /// Items never attempted because the batch was aborted.
    pub not_processed: usize,
}

impl BulkResult {
    pub fn was_aborted(&self) -> bool {
        self.aborted_by.is_some()
    }

    fn push(&mut self, item: BulkItemResult) {
        if item.outcome.is_success() {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        self.items.push(item);
    }
}

/// Runs a batch through a shared [`DocumentProcessor`], one document at a time.
#[derive(Clone)]
pub struct BulkOrchestrator {
    processor: Arc<DocumentProcessor>,
}

impl BulkOrchestrator {
    pub fn new(processor: Arc<DocumentProcessor>) -> Self {
        Self { processor }
    }

    pub async fn run(&self, documents: Vec<RawDocument>, options: &ProcessOptions) -> BulkResult {
        self.run_with_progress(documents, options, |_| {}).await
    }

    /// Like [`run`](Self::run), calling `progress` after every item.
    pub async fn run_with_progress<F>(
        &self,
        documents: Vec<RawDocument>,
        options: &ProcessOptions,
        mut progress: F,
    ) -> BulkResult
    where
        F: FnMut(&BulkItemResult),
    {
        let total = documents.len();
        let mut result = BulkResult::default();
        info!("Starting batch of {} documents", total);

        for (index, document) in documents.into_iter().enumerate() {
            let name = document.name().map(str::to_string);
            let outcome = self.processor.process(document, options).await;

            let abort = match &outcome {
                Err(e) if e.is_quota_exhaustion() => {
                    warn!("Quota exhausted at item {} of {}, aborting batch: {}", index + 1, total, e);
                    Some(ErrorInfo::from(e))
                }
                Err(e) => {
                    warn!(
                        "Item {} ({}) failed: {}",
                        index + 1,
                        name.as_deref().unwrap_or("unnamed"),
                        e
                    );
                    None
                }
                Ok(_) => None,
            };

            let item = BulkItemResult {
                index,
                name,
                outcome: match outcome {
                    Ok(processed) => ItemOutcome::Success(Box::new(processed)),
                    Err(e) => ItemOutcome::Failure(ErrorInfo::from(&e)),
                },
            };
            progress(&item);
            result.push(item);

            if abort.is_some() {
                result.aborted_by = abort;
                result.not_processed = total - index - 1;
                break;
            }
        }

        info!(
            "Batch finished: {} succeeded, {} failed, {} not processed",
            result.successful, result.failed, result.not_processed
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::{EngineError, ErrorKind};
    use crate::models::config::{AutoTallyConfig, QuotaConfig};
    use crate::quota::{MemoryLedgerStore, QuotaLedger};
    use crate::testing::{invoice_reply, text_pdf, ManualClock, ScriptedEngine};

    fn good(name: &str, number: &str) -> RawDocument {
        let text = format!("TAX INVOICE Tech Solutions Pvt Ltd GSTIN 27ABCDE1234F1Z0 Invoice No {number} Laptop");
        RawDocument::new(text_pdf(&[&text])).with_name(name)
    }

    fn orchestrator(engine: ScriptedEngine, limit: u64) -> (BulkOrchestrator, Arc<ScriptedEngine>) {
        let mut quota = QuotaConfig::default();
        quota.limits.bronze = limit;
        let ledger = QuotaLedger::new(MemoryLedgerStore::new(), ManualClock::new("2025-08"), &quota);
        let engine = Arc::new(engine);
        let processor = DocumentProcessor::new(&AutoTallyConfig::default(), engine.clone(), ledger).with_ocr(None);
        (BulkOrchestrator::new(Arc::new(processor)), engine)
    }

    #[tokio::test]
    async fn test_bad_file_does_not_abort() {
        let (bulk, engine) = orchestrator(
            ScriptedEngine::new()
                .reply(&invoice_reply("INV-1"), Some(100))
                .reply(&invoice_reply("INV-2"), Some(100)),
            50_000,
        );
        let documents = vec![
            good("good.pdf", "INV-1"),
            RawDocument::new(b"%PDF-1.7\n this is not a pdf".to_vec()).with_name("corrupt.pdf"),
            good("good2.pdf", "INV-2"),
        ];

        let mut seen = Vec::new();
        let result = bulk
            .run_with_progress(documents, &ProcessOptions::default(), |item| seen.push(item.index))
            .await;

        assert_eq!(result.successful, 2);
        assert_eq!(result.failed, 1);
        assert!(!result.was_aborted());
        assert_eq!(seen, vec![0, 1, 2]);

        let names: Vec<_> = result.items.iter().map(|i| i.name.clone().unwrap()).collect();
        assert_eq!(names, vec!["good.pdf", "corrupt.pdf", "good2.pdf"]);
        assert!(!result.items[1].outcome.is_success());
        assert_eq!(engine.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_local_quota_aborts_remaining_batch() {
        // The first document uses the whole ceiling.
        let (bulk, engine) = orchestrator(
            ScriptedEngine::new().reply(&invoice_reply("INV-1"), Some(1000)),
            1000,
        );
        let documents = vec![
            good("good.pdf", "INV-1"),
            good("quota_exhausted_trigger.pdf", "INV-2"),
            good("good2.pdf", "INV-3"),
        ];

        let result = bulk.run(documents, &ProcessOptions::default()).await;

        assert_eq!(result.items.len(), 2);
        assert_eq!(result.successful, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.not_processed, 1);
        let aborted_by = result.aborted_by.unwrap();
        assert_eq!(aborted_by.kind, ErrorKind::QuotaExceeded);
        assert_eq!(aborted_by.quota.unwrap().limit, 1000);
        assert_eq!(engine.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_upstream_quota_aborts_remaining_batch() {
        let (bulk, engine) = orchestrator(
            ScriptedEngine::new()
                .reply(&invoice_reply("INV-1"), Some(100))
                .fail(EngineError::UpstreamQuotaExceeded("RESOURCE_EXHAUSTED".into())),
            50_000,
        );
        let documents = vec![
            good("a.pdf", "INV-1"),
            good("b.pdf", "INV-2"),
            good("c.pdf", "INV-3"),
        ];

        let result = bulk.run(documents, &ProcessOptions::default()).await;

        assert_eq!(result.items.len(), 2);
        assert_eq!(result.aborted_by.unwrap().kind, ErrorKind::UpstreamQuotaExceeded);
        assert_eq!(engine.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_serializes_with_status_tags() {
        let (bulk, _) = orchestrator(ScriptedEngine::new(), 50_000);
        let result = bulk
            .run(
                vec![RawDocument::new(b"plain text".to_vec()).with_name("notes.txt")],
                &ProcessOptions::default(),
            )
            .await;

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["failed"], 1);
        assert_eq!(json["items"][0]["outcome"]["status"], "failure");
        assert_eq!(json["items"][0]["outcome"]["result"]["kind"], "UNSUPPORTED_DOCUMENT");
    }
}
