//! Optical character recognition over rasterized pages.
//!
//! OCR is the last text-producing strategy for pure scans. Any backend
//! implementing [`OcrBackend`] can be plugged into the pipeline; the default
//! native backend wraps `pure-onnx-ocr` with PaddleOCR models.

#[cfg(feature = "native")]
mod pure_engine;

#[cfg(feature = "native")]
pub use pure_engine::{create_engine_from_dir, PureOcrEngine};

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::OcrError;
use crate::models::document::PageImage;

/// Pixel rows closer than this are read as one line.
const ROW_TOLERANCE: f32 = 20.0;

/// Text recognition over a single image.
pub trait OcrBackend: Send + Sync {
    fn recognize(&self, image: &DynamicImage) -> Result<OcrResult, OcrError>;
}

/// A detected text box with its coordinates and content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBox {
    /// Bounding box coordinates (x1, y1, x2, y2, x3, y3, x4, y4) for quadrilateral.
    pub bbox: [f32; 8],

    /// Recognized text content.
    pub text: String,

    /// Recognition confidence (0.0 - 1.0).
    pub confidence: f32,
}

impl TextBox {
    /// Get the axis-aligned bounding rectangle.
    pub fn rect(&self) -> (f32, f32, f32, f32) {
        let xs = [self.bbox[0], self.bbox[2], self.bbox[4], self.bbox[6]];
        let ys = [self.bbox[1], self.bbox[3], self.bbox[5], self.bbox[7]];

        let min_x = xs.iter().cloned().fold(f32::INFINITY, f32::min);
        let max_x = xs.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let min_y = ys.iter().cloned().fold(f32::INFINITY, f32::min);
        let max_y = ys.iter().cloned().fold(f32::NEG_INFINITY, f32::max);

        (min_x, min_y, max_x, max_y)
    }
}

/// Result of OCR processing on an image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResult {
    /// Detected and recognized text boxes.
    pub boxes: Vec<TextBox>,

    /// Full text (boxes joined with newlines).
    pub text: String,

    /// Processing time in milliseconds.
    pub processing_time_ms: u64,

    /// Image dimensions (width, height).
    pub image_size: (u32, u32),
}

impl OcrResult {
    /// Build a result from unordered boxes, sorted into reading order.
    pub fn from_boxes(mut boxes: Vec<TextBox>, image_size: (u32, u32), processing_time_ms: u64) -> Self {
        sort_by_reading_order(&mut boxes);
        let text = boxes
            .iter()
            .map(|b| b.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            boxes,
            text,
            processing_time_ms,
            image_size,
        }
    }
}

/// Sort boxes top-to-bottom, then left-to-right within a row.
fn sort_by_reading_order(boxes: &mut [TextBox]) {
    boxes.sort_by(|a, b| {
        let (ax, ay, _, _) = a.rect();
        let (bx, by, _, _) = b.rect();

        let row_a = (ay / ROW_TOLERANCE) as i32;
        let row_b = (by / ROW_TOLERANCE) as i32;

        row_a
            .cmp(&row_b)
            .then(ax.partial_cmp(&bx).unwrap_or(std::cmp::Ordering::Equal))
    });
}

/// OCR every page image and concatenate the text in page order.
pub fn recognize_pages(backend: &dyn OcrBackend, pages: &[PageImage]) -> Result<String, OcrError> {
    let mut texts = Vec::with_capacity(pages.len());
    for page in pages {
        let image = image::load_from_memory(&page.data)
            .map_err(|e| OcrError::InvalidImage(format!("page {}: {}", page.page, e)))?;
        let result = backend.recognize(&image)?;
        debug!(
            "OCR page {}: {} boxes in {}ms",
            page.page,
            result.boxes.len(),
            result.processing_time_ms
        );
        if !result.text.is_empty() {
            texts.push(result.text);
        }
    }
    Ok(texts.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_box(x: f32, y: f32, text: &str) -> TextBox {
        TextBox {
            bbox: [x, y, x + 50.0, y, x + 50.0, y + 10.0, x, y + 10.0],
            text: text.to_string(),
            confidence: 0.9,
        }
    }

    #[test]
    fn test_reading_order() {
        let result = OcrResult::from_boxes(
            vec![
                text_box(200.0, 105.0, "1,180.00"),
                text_box(10.0, 10.0, "TAX INVOICE"),
                text_box(10.0, 100.0, "Grand Total"),
            ],
            (300, 200),
            5,
        );
        assert_eq!(result.text, "TAX INVOICE\nGrand Total\n1,180.00");
    }

    #[test]
    fn test_blank_boxes_are_dropped() {
        let result = OcrResult::from_boxes(
            vec![text_box(0.0, 0.0, "  "), text_box(0.0, 40.0, "GSTIN")],
            (100, 100),
            0,
        );
        assert_eq!(result.text, "GSTIN");
        assert_eq!(result.boxes.len(), 2);
    }

    #[test]
    fn test_recognize_pages_rejects_undecodable_page() {
        struct Never;
        impl OcrBackend for Never {
            fn recognize(&self, _: &DynamicImage) -> Result<OcrResult, OcrError> {
                unreachable!()
            }
        }

        let page = PageImage {
            page: 3,
            mime_type: "image/png".to_string(),
            data: vec![1, 2, 3],
            width: 1,
            height: 1,
            dpi: Some(150),
        };
        let err = recognize_pages(&Never, &[page]).unwrap_err();
        assert!(matches!(err, OcrError::InvalidImage(msg) if msg.starts_with("page 3")));
    }
}
