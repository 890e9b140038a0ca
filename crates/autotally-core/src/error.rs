//! Error types for the autotally-core library.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::quota::Plan;

/// Main error type for the autotally library.
#[derive(Error, Debug)]
pub enum AutoTallyError {
    /// The document is encrypted and could not be opened with what was supplied.
    #[error("password required: {hint}")]
    PasswordRequired { hint: PasswordHint },

    /// Bearer credential missing or not recognised.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// Neither text nor image extraction produced anything usable.
    #[error("unsupported document: {0}")]
    UnsupportedDocument(String),

    /// Local plan ceiling reached for the current billing period.
    #[error("token quota exceeded: {used}/{limit} used on {plan} plan")]
    QuotaExceeded { used: u64, limit: u64, plan: Plan },

    /// Headroom below the ceiling is held by dispatches still in flight.
    #[error("token quota busy: {used} used and {pending} reserved of {limit}, retry shortly")]
    QuotaBusy { used: u64, pending: u64, limit: u64 },

    /// The extraction engine reported its own quota exhaustion.
    #[error("extraction engine quota exhausted, retry later: {0}")]
    UpstreamQuotaExceeded(String),

    /// Engine output could not be turned into a document record.
    #[error("extraction failed: {0}")]
    ExtractionFailed(#[from] ExtractionError),

    /// The document store already holds a document with this content hash.
    #[error("document already processed (sha256 {hash})")]
    Duplicate { hash: String },

    /// PDF processing error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// OCR processing error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Usage ledger persistence error.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Document store error.
    #[error("store error: {0}")]
    Store(String),

    /// Image processing error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A blocking worker task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

/// Why a password is being asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordHint {
    /// The container is encrypted and no password came with the request.
    NotSupplied,
    /// A password was supplied but did not open the container.
    Incorrect,
    /// Every extraction path came back empty; encryption is the likeliest cause
    /// but was not detected directly.
    Suspected,
}

impl std::fmt::Display for PasswordHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PasswordHint::NotSupplied => write!(f, "document is encrypted, resubmit with a password"),
            PasswordHint::Incorrect => write!(f, "the supplied password did not open the document"),
            PasswordHint::Suspected => {
                write!(f, "no content could be read, the document may be password-protected")
            }
        }
    }
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract text from PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// Failed to rasterize pages.
    #[error("failed to rasterize: {0}")]
    Rasterize(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Invalid page number requested.
    #[error("invalid page number: {0}")]
    InvalidPage(u32),
}

/// Errors related to OCR processing.
#[derive(Error, Debug)]
pub enum OcrError {
    /// Failed to load OCR models.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Text recognition failed.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// Invalid image format or dimensions.
    #[error("invalid image: {0}")]
    InvalidImage(String),
}

/// Errors raised by an extraction engine implementation.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// The engine's own rate limit or quota is exhausted.
    #[error("upstream quota exhausted: {0}")]
    UpstreamQuotaExceeded(String),

    /// Network failure or server-side error; may succeed later.
    #[error("transient engine failure: {0}")]
    Transient(String),

    /// The engine answered with something that is not a generation result.
    #[error("invalid engine response: {0}")]
    InvalidResponse(String),
}

/// Errors turning engine output into a document record.
#[derive(Error, Debug, Clone)]
pub enum ExtractionError {
    /// The response text is not valid JSON for the expected structure.
    #[error("could not parse engine output: {0}")]
    Parse(String),

    /// The engine classified the document as neither invoice nor bank statement.
    #[error("document not recognized as an invoice or bank statement")]
    NotRecognized,

    /// The engine call did not complete in time.
    #[error("engine call timed out after {0:?}")]
    Timeout(Duration),

    /// The engine failed in a way that may succeed on a later attempt.
    #[error("{0}")]
    Engine(EngineError),
}

/// Errors related to the usage ledger record.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Reading or writing the ledger file failed.
    #[error("ledger I/O: {0}")]
    Io(#[from] std::io::Error),

    /// The ledger file is not valid JSON for the ledger record.
    #[error("ledger record malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl AutoTallyError {
    /// Quota failures abort further spend in a batch.
    pub fn is_quota_exhaustion(&self) -> bool {
        matches!(
            self,
            AutoTallyError::QuotaExceeded { .. } | AutoTallyError::UpstreamQuotaExceeded(_)
        )
    }

    /// Whether the caller may reasonably resubmit the same request later.
    pub fn is_retryable(&self) -> bool {
        match self {
            AutoTallyError::UpstreamQuotaExceeded(_) | AutoTallyError::QuotaBusy { .. } => true,
            AutoTallyError::ExtractionFailed(e) => {
                matches!(e, ExtractionError::Timeout(_) | ExtractionError::Engine(_))
            }
            _ => false,
        }
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AutoTallyError::PasswordRequired { .. } => ErrorKind::PasswordRequired,
            AutoTallyError::InvalidCredential(_) => ErrorKind::InvalidCredential,
            AutoTallyError::UnsupportedDocument(_) => ErrorKind::UnsupportedDocument,
            AutoTallyError::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            AutoTallyError::QuotaBusy { .. } => ErrorKind::QuotaBusy,
            AutoTallyError::UpstreamQuotaExceeded(_) => ErrorKind::UpstreamQuotaExceeded,
            AutoTallyError::ExtractionFailed(_) => ErrorKind::ExtractionFailed,
            AutoTallyError::Duplicate { .. } => ErrorKind::Duplicate,
            _ => ErrorKind::Internal,
        }
    }
}

impl From<EngineError> for AutoTallyError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::UpstreamQuotaExceeded(msg) => AutoTallyError::UpstreamQuotaExceeded(msg),
            other => AutoTallyError::ExtractionFailed(ExtractionError::Engine(other)),
        }
    }
}

/// Machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    PasswordRequired,
    InvalidCredential,
    UnsupportedDocument,
    QuotaExceeded,
    QuotaBusy,
    UpstreamQuotaExceeded,
    ExtractionFailed,
    Duplicate,
    Internal,
}

/// Quota details attached to a `QuotaExceeded` failure for upgrade prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaDetails {
    pub used: u64,
    pub limit: u64,
    pub plan: Plan,
}

/// Serializable projection of an error for responses and batch results.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_hint: Option<PasswordHint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<QuotaDetails>,
}

impl From<&AutoTallyError> for ErrorInfo {
    fn from(err: &AutoTallyError) -> Self {
        let password_hint = match err {
            AutoTallyError::PasswordRequired { hint } => Some(*hint),
            _ => None,
        };
        let quota = match err {
            AutoTallyError::QuotaExceeded { used, limit, plan } => Some(QuotaDetails {
                used: *used,
                limit: *limit,
                plan: *plan,
            }),
            _ => None,
        };
        Self {
            kind: err.kind(),
            message: err.to_string(),
            retryable: err.is_retryable(),
            password_hint,
            quota,
        }
    }
}

/// Result type for the autotally library.
pub type Result<T> = std::result::Result<T, AutoTallyError>;
