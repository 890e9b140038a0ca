//! Documents as they move through the pipeline: raw upload, normalized
//! container, and the payload finally sent to the extraction engine.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// An uploaded document. The pipeline never mutates it, only derives new buffers.
#[derive(Debug, Clone)]
pub struct RawDocument {
    bytes: Arc<[u8]>,
    media_type: Option<String>,
    password: Option<String>,
    name: Option<String>,
}

impl RawDocument {
    /// Wrap uploaded bytes.
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
            media_type: None,
            password: None,
            name: None,
        }
    }

    /// Declared media type (e.g. `application/pdf`, `image/jpeg`).
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    /// Password for an encrypted container. Empty strings count as absent.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        let password = password.into();
        self.password = (!password.is_empty()).then_some(password);
        self
    }

    /// Display name, usually the file name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// What kind of container the normalized bytes turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    /// A PDF that opens without a password.
    Pdf { page_count: u32 },
    /// Not a document container; treated as a single flat image.
    Flat,
}

/// Decrypted bytes derived from a [`RawDocument`]. Never password-protected.
#[derive(Debug, Clone)]
pub struct NormalizedDocument {
    pub bytes: Arc<[u8]>,
    pub container: ContainerKind,
    /// True when a password had to be applied and the container re-serialized.
    pub was_decrypted: bool,
    /// Media type declared with the upload, if any.
    pub media_type: Option<String>,
}

impl NormalizedDocument {
    /// Page count as seen by the pipeline; flat images count as one page.
    pub fn page_count(&self) -> u32 {
        match self.container {
            ContainerKind::Pdf { page_count } => page_count,
            ContainerKind::Flat => 1,
        }
    }

    pub fn is_pdf(&self) -> bool {
        matches!(self.container, ContainerKind::Pdf { .. })
    }
}

/// Machine-readable text pulled directly out of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedText {
    /// Non-blank lines in original order, joined with newlines.
    pub text: String,
    /// Number of characters (not bytes) in `text`.
    pub char_count: usize,
    pub page_count: u32,
}

impl ExtractedText {
    pub fn new(text: String, page_count: u32) -> Self {
        let char_count = text.chars().count();
        Self {
            text,
            char_count,
            page_count,
        }
    }
}

/// A single page encoded for transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageImage {
    /// 1-indexed page number.
    pub page: u32,
    pub mime_type: String,
    #[serde(skip)]
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Resolution the page was rendered at; `None` for images used as-is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpi: Option<u32>,
}

/// The payload sent to the extraction engine. Exactly one shape per attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionUnit {
    Text { content: String, char_count: usize },
    Images(Vec<PageImage>),
}

impl ExtractionUnit {
    pub fn text(content: String) -> Self {
        let char_count = content.chars().count();
        ExtractionUnit::Text {
            content,
            char_count,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, ExtractionUnit::Text { .. })
    }
}

/// Which schema profile the caller expects; selects instructions and payload bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentProfile {
    #[default]
    Invoice,
    BankStatement,
}

impl std::fmt::Display for DocumentProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentProfile::Invoice => write!(f, "invoice"),
            DocumentProfile::BankStatement => write!(f, "bank statement"),
        }
    }
}
