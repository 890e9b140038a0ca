//! Single-document pipeline: normalize, extract, select, bound, meter,
//! dispatch, persist.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::payload::{PayloadBounder, TruncationInfo};
use super::strategy::{AttemptNote, EncryptionContext, Selection, StrategyKind, StrategySelector, DEFAULT_ORDER};
use crate::error::{AutoTallyError, ExtractionError, Result};
use crate::extraction::{Dispatcher, ExtractionEngine};
use crate::models::config::{AutoTallyConfig, PdfConfig};
use crate::models::document::{DocumentProfile, RawDocument};
use crate::models::schema::DocumentSchema;
use crate::ocr::OcrBackend;
use crate::pdf::{extract_text, normalize, PageRasterizer, Rasterizer};
use crate::quota::{QuotaLedger, UsageSnapshot};
use crate::store::DocumentStore;

/// Per-request options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOptions {
    /// Which schema profile to extract with.
    pub profile: DocumentProfile,
    /// The caller vouches that the document is not password-protected, so a
    /// total extraction failure is reported as unsupported rather than as a
    /// suspected password.
    pub confirmed_unencrypted: bool,
}

impl ProcessOptions {
    pub fn new(profile: DocumentProfile) -> Self {
        Self {
            profile,
            confirmed_unencrypted: false,
        }
    }
}

/// How a document was processed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingMetadata {
    pub strategy: StrategyKind,
    pub page_count: u32,
    pub was_decrypted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncation: Option<TruncationInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub passed_over: Vec<AttemptNote>,
    /// Review notes from the bookkeeping rules.
    pub warnings: Vec<String>,
    pub token_usage: u64,
    pub processing_time_ms: u64,
    /// SHA-256 of the uploaded bytes, lowercase hex.
    pub content_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_id: Option<String>,
}

/// A successfully extracted document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedDocument {
    pub schema: DocumentSchema,
    pub metadata: ProcessingMetadata,
    /// Ledger state after this document's usage was recorded.
    pub usage: UsageSnapshot,
}

/// What the blocking stage hands back to the async stage.
struct Prepared {
    page_count: u32,
    was_decrypted: bool,
    selection: Selection,
}

/// Runs documents through the pipeline. Cheap to share behind an `Arc`.
pub struct DocumentProcessor {
    pdf: PdfConfig,
    order: Vec<StrategyKind>,
    rasterizer: Arc<dyn PageRasterizer>,
    ocr: Option<Arc<dyn OcrBackend>>,
    bounder: PayloadBounder,
    dispatcher: Dispatcher,
    ledger: QuotaLedger,
    store: Option<Arc<dyn DocumentStore>>,
    engine_timeout: Duration,
}

impl DocumentProcessor {
    pub fn new(config: &AutoTallyConfig, engine: Arc<dyn ExtractionEngine>, ledger: QuotaLedger) -> Self {
        #[cfg(feature = "native")]
        let ocr = crate::ocr::create_engine_from_dir(&config.ocr);
        #[cfg(not(feature = "native"))]
        let ocr = None;

        Self {
            pdf: config.pdf.clone(),
            order: DEFAULT_ORDER.to_vec(),
            rasterizer: Arc::new(Rasterizer::with_default_renderers(config.pdf.clone())),
            ocr,
            bounder: PayloadBounder::new(config.payload.clone()),
            dispatcher: Dispatcher::new(engine),
            ledger,
            store: None,
            engine_timeout: Duration::from_secs(config.engine.timeout_secs),
        }
    }

    /// Check and record content hashes in `store`.
    pub fn with_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    /// Replace (or disable, with `None`) the OCR backend.
    pub fn with_ocr(mut self, ocr: Option<Arc<dyn OcrBackend>>) -> Self {
        self.ocr = ocr;
        self
    }

    pub fn with_strategy_order(mut self, order: Vec<StrategyKind>) -> Self {
        self.order = order;
        self
    }

    pub fn ledger(&self) -> &QuotaLedger {
        &self.ledger
    }

    /// Process one document.
    ///
    /// Usage is recorded for every engine call that completes, including
    /// calls whose output fails to decode. Failures before or during the call
    /// (quota, timeout, transport, cancellation) record nothing.
    pub async fn process(&self, raw: RawDocument, options: &ProcessOptions) -> Result<ProcessedDocument> {
        let started = Instant::now();
        let content_hash = content_hash(raw.bytes());
        let label = raw.name().unwrap_or("document").to_string();
        info!("Processing {} ({} bytes, sha256 {})", label, raw.bytes().len(), &content_hash[..12]);

        if let Some(store) = &self.store {
            if store.exists(&content_hash)? {
                info!("{} was already processed", label);
                return Err(AutoTallyError::Duplicate { hash: content_hash });
            }
        }

        let prepared = self.prepare(raw, options).await?;
        let (unit, truncation) = self.bounder.bound(prepared.selection.unit, options.profile);

        let reservation = self.ledger.check_and_reserve()?;
        let dispatched = match tokio::time::timeout(
            self.engine_timeout,
            self.dispatcher.dispatch(&unit, options.profile),
        )
        .await
        {
            Ok(Ok(dispatched)) => dispatched,
            Ok(Err(e)) => {
                warn!("Extraction engine failed for {}: {}", label, e);
                return Err(e.into());
            }
            Err(_) => {
                warn!("Extraction engine timed out after {:?} for {}", self.engine_timeout, label);
                return Err(ExtractionError::Timeout(self.engine_timeout).into());
            }
        };

        let usage = self.ledger.commit_usage(reservation, dispatched.token_usage)?;
        let extracted = dispatched.outcome?;

        let store_id = match &self.store {
            Some(store) => Some(store.save(&content_hash, &extracted.schema)?),
            None => None,
        };

        let processing_time_ms = started.elapsed().as_millis() as u64;
        info!(
            "Extracted {} from {} via {} in {}ms ({} tokens)",
            extracted.schema.document_type().as_str(),
            label,
            prepared.selection.strategy,
            processing_time_ms,
            dispatched.token_usage
        );

        Ok(ProcessedDocument {
            schema: extracted.schema,
            metadata: ProcessingMetadata {
                strategy: prepared.selection.strategy,
                page_count: prepared.page_count,
                was_decrypted: prepared.was_decrypted,
                truncation,
                passed_over: prepared.selection.passed_over,
                warnings: extracted.warnings,
                token_usage: dispatched.token_usage,
                processing_time_ms,
                content_hash,
                store_id,
            },
            usage,
        })
    }

    /// Normalization, text extraction and strategy selection, off the async
    /// workers.
    async fn prepare(&self, raw: RawDocument, options: &ProcessOptions) -> Result<Prepared> {
        let selector = StrategySelector::new(&self.pdf, Arc::clone(&self.rasterizer), self.ocr.clone())
            .with_order(self.order.clone());
        let encryption = EncryptionContext {
            password_supplied: raw.password().is_some(),
            confirmed_unencrypted: options.confirmed_unencrypted,
        };

        tokio::task::spawn_blocking(move || -> Result<Prepared> {
            let doc = normalize(&raw)?;
            let text = extract_text(&doc);
            debug!("Extracted {} chars from {} pages", text.char_count, doc.page_count());
            let selection = selector.select(&doc, &text, encryption)?;
            Ok(Prepared {
                page_count: doc.page_count(),
                was_decrypted: doc.was_decrypted,
                selection,
            })
        })
        .await
        .map_err(|e| AutoTallyError::Task(e.to_string()))?
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
