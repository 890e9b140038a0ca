//! Shared fixtures for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use image::{DynamicImage, Rgb, RgbImage};

use crate::error::{EngineError, PdfError};
use crate::extraction::{EngineRequest, EngineResponse, ExtractionEngine};
use crate::models::config::PdfConfig;
use crate::models::document::{ExtractionUnit, NormalizedDocument, PageImage};
use crate::pdf::{EmbeddedImageRenderer, PageRasterizer, PageRenderer, Rasterizer};
use crate::quota::Clock;

/// A PDF with one text page per entry, Helvetica 12pt.
pub fn text_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.4");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let kids: Vec<ObjectId> = pages
        .iter()
        .map(|text| {
            let escaped = text.replace('\\', "\\\\").replace('(', "\\(").replace(')', "\\)");
            let content = format!("BT /F1 12 Tf 72 700 Td ({escaped}) Tj ET");
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
            })
        })
        .collect();

    finish(doc, pages_id, kids)
}

/// A scanned-looking PDF: every page is a single 8x8 DeviceRGB image, no text.
pub fn image_only_pdf(page_count: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.4");
    let pages_id = doc.new_object_id();

    let kids: Vec<ObjectId> = (0..page_count)
        .map(|i| {
            let pixels: Vec<u8> = (0..64u8)
                .flat_map(|p| [p.wrapping_mul(4), (i as u8).wrapping_mul(40), 255 - p])
                .collect();
            let image_id = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => 8,
                    "Height" => 8,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                },
                pixels,
            ));
            let content = b"q 612 0 0 792 0 0 cm /Im1 Do Q".to_vec();
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "XObject" => dictionary! { "Im1" => image_id },
                },
            })
        })
        .collect();

    finish(doc, pages_id, kids)
}

fn finish(mut doc: Document, pages_id: ObjectId, kids: Vec<ObjectId>) -> Vec<u8> {
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids.into_iter().map(Object::Reference).collect::<Vec<_>>(),
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

/// Wraps a rasterizer and counts how often it runs.
pub struct CountingRasterizer<R> {
    inner: R,
    calls: AtomicUsize,
}

impl<R: PageRasterizer> CountingRasterizer<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<R: PageRasterizer> PageRasterizer for CountingRasterizer<R> {
    fn rasterize(&self, doc: &NormalizedDocument) -> crate::error::Result<Vec<PageImage>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.rasterize(doc)
    }
}

/// Rasterizer that only recovers embedded page scans.
pub fn embedded_rasterizer() -> Rasterizer {
    Rasterizer::new(PdfConfig::default(), vec![Arc::new(EmbeddedImageRenderer)])
}

/// Draws every page as a flat grey sheet sized by the requested DPI.
#[derive(Default)]
pub struct StubRenderer {
    failing: Vec<u32>,
    calls: Mutex<Vec<(u32, u32)>>,
}

impl StubRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to draw the given pages.
    pub fn failing_on(pages: &[u32]) -> Self {
        Self {
            failing: pages.to_vec(),
            ..Self::default()
        }
    }

    /// Pixel size of a page drawn at `dpi`.
    pub fn size_at(dpi: u32) -> (u32, u32) {
        (dpi / 10, dpi / 5)
    }

    /// `(page, dpi)` of every render request, in order.
    pub fn calls(&self) -> Vec<(u32, u32)> {
        self.calls.lock().unwrap().clone()
    }
}

impl PageRenderer for StubRenderer {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn render_page(&self, _pdf: &[u8], page: u32, dpi: u32) -> crate::pdf::Result<DynamicImage> {
        self.calls.lock().unwrap().push((page, dpi));
        if self.failing.contains(&page) {
            return Err(PdfError::Rasterize(format!("stub refuses page {page}")));
        }
        let (w, h) = Self::size_at(dpi);
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([240, 240, 240]))))
    }
}

/// A clock whose period is set by the test.
#[derive(Clone)]
pub struct ManualClock {
    period: Arc<Mutex<String>>,
}

impl ManualClock {
    pub fn new(period: &str) -> Self {
        Self {
            period: Arc::new(Mutex::new(period.to_string())),
        }
    }

    pub fn set(&self, period: &str) {
        *self.period.lock().unwrap() = period.to_string();
    }
}

impl Clock for ManualClock {
    fn period(&self) -> String {
        self.period.lock().unwrap().clone()
    }
}

/// What a [`ScriptedEngine`] was asked.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub instructions: String,
    pub prompt: String,
    pub content: ExtractionUnit,
}

/// Extraction engine that answers from a script, in order.
#[derive(Default)]
pub struct ScriptedEngine {
    replies: Mutex<VecDeque<Result<EngineResponse, EngineError>>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, raw_text: &str, token_usage: Option<u64>) -> Self {
        self.replies.lock().unwrap().push_back(Ok(EngineResponse {
            raw_text: raw_text.to_string(),
            token_usage,
            classification_hint: None,
        }));
        self
    }

    pub fn fail(self, err: EngineError) -> Self {
        self.replies.lock().unwrap().push_back(Err(err));
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExtractionEngine for ScriptedEngine {
    async fn generate(&self, request: EngineRequest<'_>) -> Result<EngineResponse, EngineError> {
        self.calls.lock().unwrap().push(RecordedCall {
            instructions: request.instructions.to_string(),
            prompt: request.prompt.to_string(),
            content: request.content.clone(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(EngineError::InvalidResponse("script exhausted".to_string())))
    }
}

/// A scripted invoice reply for `invoice_number`.
pub fn invoice_reply(invoice_number: &str) -> String {
    format!(
        r#"{{"documentType":"INVOICE","supplierName":"Tech Solutions Pvt Ltd","supplierGstin":"27ABCDE1234F1Z0","invoiceNumber":"{invoice_number}","invoiceDate":"15-08-2025","lineItems":[{{"description":"Laptop","hsn":"8471","quantity":1,"rate":45000,"amount":45000,"gstRate":18}}],"grandTotal":53100}}"#
    )
}
