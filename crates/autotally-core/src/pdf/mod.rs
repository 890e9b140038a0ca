//! PDF processing: decryption, text extraction and page rasterization.

pub mod decrypt;
mod extractor;
#[cfg(feature = "native")]
pub mod pdfium;
pub mod rasterizer;
pub mod render;

pub use decrypt::{is_encrypted_pdf, normalize};
pub use extractor::{extract_text, PdfExtractor};
#[cfg(feature = "native")]
pub use pdfium::PdfiumRenderer;
pub use rasterizer::{PageRasterizer, Rasterizer};
pub use render::{EmbeddedImageRenderer, PageRenderer};

use crate::error::PdfError;
use image::DynamicImage;

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, PdfError>;

/// Trait for PDF processing implementations.
pub trait PdfProcessor {
    /// Load a PDF from bytes. Encrypted documents are rejected.
    fn load(&mut self, data: &[u8]) -> Result<()>;

    /// Get the number of pages in the PDF.
    fn page_count(&self) -> u32;

    /// Extract text page by page, in page order.
    fn extract_page_texts(&self) -> Result<Vec<String>>;

    /// Extract embedded images from a page (1-indexed).
    fn page_images(&self, page: u32) -> Result<Vec<DynamicImage>>;

    /// Page size in points (1/72 inch).
    fn page_size(&self, page: u32) -> Result<(f32, f32)>;
}
