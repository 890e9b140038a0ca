//! Strategy selection: choose the cheapest payload that still carries the
//! document.
//!
//! Strategies are tried in a fixed order. Each one reports whether it
//! produced a payload, did not apply, or failed; the first payload wins.
//! Text is always cheaper to send than images, so text strategies come first.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{AutoTallyError, PasswordHint, Result};
use crate::models::config::PdfConfig;
use crate::models::document::{ExtractedText, ExtractionUnit, NormalizedDocument, PageImage};
use crate::ocr::{recognize_pages, OcrBackend};
use crate::pdf::decrypt::has_pdf_header;
use crate::pdf::PageRasterizer;

/// A named way of turning a document into an engine payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Machine-readable text embedded in the document.
    EmbeddedText,
    /// Text recognized from rasterized pages of a pure scan.
    OcrText,
    /// The rasterized pages themselves.
    PageImages,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::EmbeddedText => "embedded text",
            StrategyKind::OcrText => "OCR text",
            StrategyKind::PageImages => "page images",
        };
        f.write_str(name)
    }
}

/// Default fallback order.
pub const DEFAULT_ORDER: [StrategyKind; 3] = [
    StrategyKind::EmbeddedText,
    StrategyKind::OcrText,
    StrategyKind::PageImages,
];

/// Result of one strategy attempt.
#[derive(Debug)]
pub enum StrategyOutcome {
    Selected(ExtractionUnit),
    /// The strategy does not apply to this document.
    Skip(String),
    /// The strategy applied but produced nothing usable.
    Fail(String),
}

/// Why an earlier strategy was passed over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptNote {
    pub strategy: StrategyKind,
    pub failed: bool,
    pub reason: String,
}

/// The chosen payload.
#[derive(Debug)]
pub struct Selection {
    pub strategy: StrategyKind,
    pub unit: ExtractionUnit,
    pub passed_over: Vec<AttemptNote>,
}

/// What the caller knows about the document's protection.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncryptionContext {
    /// A password came with the request.
    pub password_supplied: bool,
    /// The caller confirms the document is not password-protected.
    pub confirmed_unencrypted: bool,
}

/// Runs the ordered strategies for one document.
pub struct StrategySelector {
    order: Vec<StrategyKind>,
    min_text_length: usize,
    rasterizer: Arc<dyn PageRasterizer>,
    ocr: Option<Arc<dyn OcrBackend>>,
}

impl StrategySelector {
    pub fn new(
        config: &PdfConfig,
        rasterizer: Arc<dyn PageRasterizer>,
        ocr: Option<Arc<dyn OcrBackend>>,
    ) -> Self {
        Self {
            order: DEFAULT_ORDER.to_vec(),
            min_text_length: config.min_text_length,
            rasterizer,
            ocr,
        }
    }

    /// Replace the fallback order.
    pub fn with_order(mut self, order: Vec<StrategyKind>) -> Self {
        self.order = order;
        self
    }

    /// Pick a payload, or fail with `PasswordRequired`/`UnsupportedDocument`.
    pub fn select(
        &self,
        doc: &NormalizedDocument,
        text: &ExtractedText,
        encryption: EncryptionContext,
    ) -> Result<Selection> {
        let mut pages: Option<std::result::Result<Vec<PageImage>, String>> = None;
        let mut passed_over = Vec::new();

        for kind in &self.order {
            let outcome = match kind {
                StrategyKind::EmbeddedText => self.embedded_text(text),
                StrategyKind::OcrText => self.ocr_text(doc, text, &mut pages),
                StrategyKind::PageImages => self.page_images(doc, &mut pages),
            };

            match outcome {
                StrategyOutcome::Selected(unit) => {
                    info!("Selected {} strategy", kind);
                    return Ok(Selection {
                        strategy: *kind,
                        unit,
                        passed_over,
                    });
                }
                StrategyOutcome::Skip(reason) => {
                    debug!("Skipping {}: {}", kind, reason);
                    passed_over.push(AttemptNote {
                        strategy: *kind,
                        failed: false,
                        reason,
                    });
                }
                StrategyOutcome::Fail(reason) => {
                    warn!("{} failed: {}", kind, reason);
                    passed_over.push(AttemptNote {
                        strategy: *kind,
                        failed: true,
                        reason,
                    });
                }
            }
        }

        Err(self.exhausted(doc, encryption, &passed_over))
    }

    fn embedded_text(&self, text: &ExtractedText) -> StrategyOutcome {
        if text.char_count > self.min_text_length {
            StrategyOutcome::Selected(ExtractionUnit::text(text.text.clone()))
        } else {
            StrategyOutcome::Skip(format!(
                "{} chars of text, need more than {}",
                text.char_count, self.min_text_length
            ))
        }
    }

    fn ocr_text(
        &self,
        doc: &NormalizedDocument,
        text: &ExtractedText,
        pages: &mut Option<std::result::Result<Vec<PageImage>, String>>,
    ) -> StrategyOutcome {
        let Some(ocr) = &self.ocr else {
            return StrategyOutcome::Skip("OCR not available".to_string());
        };
        if text.char_count > 0 {
            return StrategyOutcome::Skip("document has embedded text".to_string());
        }

        let images = match self.rasterized(doc, pages) {
            Ok(images) if !images.is_empty() => images,
            Ok(_) => return StrategyOutcome::Fail("no page images to recognize".to_string()),
            Err(reason) => return StrategyOutcome::Fail(reason.to_string()),
        };

        match recognize_pages(ocr.as_ref(), images) {
            Ok(recognized) => {
                let char_count = recognized.chars().count();
                if char_count > self.min_text_length {
                    StrategyOutcome::Selected(ExtractionUnit::text(recognized))
                } else {
                    StrategyOutcome::Fail(format!("OCR recognized only {} chars", char_count))
                }
            }
            Err(e) => StrategyOutcome::Fail(e.to_string()),
        }
    }

    fn page_images(
        &self,
        doc: &NormalizedDocument,
        pages: &mut Option<std::result::Result<Vec<PageImage>, String>>,
    ) -> StrategyOutcome {
        match self.rasterized(doc, pages) {
            Ok(images) if !images.is_empty() => StrategyOutcome::Selected(ExtractionUnit::Images(images.to_vec())),
            Ok(_) => StrategyOutcome::Fail("no page produced an image".to_string()),
            Err(reason) => StrategyOutcome::Fail(reason.to_string()),
        }
    }

    /// Rasterize once per selection; later strategies reuse the pages.
    fn rasterized<'p>(
        &self,
        doc: &NormalizedDocument,
        pages: &'p mut Option<std::result::Result<Vec<PageImage>, String>>,
    ) -> std::result::Result<&'p [PageImage], &'p str> {
        let cached = pages.get_or_insert_with(|| {
            self.rasterizer.rasterize(doc).map_err(|e| e.to_string())
        });
        match cached {
            Ok(images) => Ok(images.as_slice()),
            Err(reason) => Err(reason.as_str()),
        }
    }

    fn exhausted(
        &self,
        doc: &NormalizedDocument,
        encryption: EncryptionContext,
        passed_over: &[AttemptNote],
    ) -> AutoTallyError {
        let summary = passed_over
            .iter()
            .map(|note| format!("{}: {}", note.strategy, note.reason))
            .collect::<Vec<_>>()
            .join("; ");

        let container = doc.is_pdf() || has_pdf_header(&doc.bytes);
        let may_be_encrypted = container
            && !doc.was_decrypted
            && !encryption.password_supplied
            && !encryption.confirmed_unencrypted;

        if may_be_encrypted {
            info!("No strategy produced a payload, suspecting encryption ({})", summary);
            AutoTallyError::PasswordRequired {
                hint: PasswordHint::Suspected,
            }
        } else {
            AutoTallyError::UnsupportedDocument(summary)
        }
    }
}
