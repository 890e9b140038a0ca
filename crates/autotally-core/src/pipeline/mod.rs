//! The document pipeline: strategy selection, payload bounds, single-document
//! processing and ordered batches.

pub mod bulk;
pub mod payload;
pub mod processor;
pub mod strategy;

pub use bulk::{BulkItemResult, BulkOrchestrator, BulkResult, ItemOutcome};
pub use payload::{PayloadBounder, TruncationInfo};
pub use processor::{content_hash, DocumentProcessor, ProcessOptions, ProcessedDocument, ProcessingMetadata};
pub use strategy::{AttemptNote, EncryptionContext, Selection, StrategyKind, StrategyOutcome, StrategySelector};
