//! Core library for AutoTally document extraction.
//!
//! This crate provides:
//! - PDF normalization (password removal), text extraction and page rasterization
//! - OCR fallback for pure scans using PaddleOCR models
//! - Cost-aware strategy selection between text and image payloads
//! - GST invoice and bank statement extraction through a generative engine
//! - Monthly token metering per subscription plan
//! - Ordered batch processing and an authenticated request boundary

pub mod auth;
pub mod error;
pub mod extraction;
pub mod models;
pub mod ocr;
pub mod pdf;
pub mod pipeline;
pub mod quota;
pub mod rules;
pub mod service;
pub mod store;

#[cfg(test)]
mod testing;

pub use auth::CredentialValidator;
pub use error::{AutoTallyError, ErrorInfo, ErrorKind, PasswordHint, Result};
pub use extraction::{ExtractionEngine, GeminiEngine};
pub use models::config::AutoTallyConfig;
pub use models::document::{DocumentProfile, RawDocument};
pub use models::schema::{DocumentSchema, DocumentType};
pub use ocr::{OcrBackend, OcrResult, TextBox};
#[cfg(feature = "native")]
pub use ocr::create_engine_from_dir;
pub use pipeline::{
    BulkOrchestrator, BulkResult, DocumentProcessor, ItemOutcome, ProcessOptions, ProcessedDocument,
    StrategyKind,
};
pub use quota::{Plan, QuotaLedger, UsageSnapshot};
pub use service::{ExtractionService, ProcessRequest, ProcessResponse};
pub use store::{DocumentStore, JsonDirStore, MemoryDocumentStore};
