//! Page rasterization with a two-tier resolution scheme.
//!
//! Every page is rendered at the high resolution and PNG-encoded. When an
//! encoded page exceeds the per-image ceiling it is rendered again at the low
//! resolution. Renderers are tried in order per page, so a page that the
//! first renderer cannot draw still gets an image from the next one.

use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, ImageReader};
use tracing::{debug, info, warn};

use super::render::{EmbeddedImageRenderer, PageRenderer};
use crate::error::{PdfError, Result};
use crate::models::config::PdfConfig;
use crate::models::document::{NormalizedDocument, PageImage};

/// Converts a normalized document into ordered page images.
pub trait PageRasterizer: Send + Sync {
    /// Exactly one image per page, in page order, or an error.
    fn rasterize(&self, doc: &NormalizedDocument) -> Result<Vec<PageImage>>;
}

/// Default rasterizer: an ordered chain of page renderers.
#[derive(Clone)]
pub struct Rasterizer {
    config: PdfConfig,
    renderers: Vec<Arc<dyn PageRenderer>>,
}

impl Rasterizer {
    pub fn new(config: PdfConfig, renderers: Vec<Arc<dyn PageRenderer>>) -> Self {
        Self { config, renderers }
    }

    /// PDFium when its library loads, embedded page scans after it.
    pub fn with_default_renderers(config: PdfConfig) -> Self {
        let mut renderers: Vec<Arc<dyn PageRenderer>> = full_page_renderer(&config).into_iter().collect();
        renderers.push(Arc::new(EmbeddedImageRenderer));
        Self::new(config, renderers)
    }

    fn rasterize_pdf(&self, doc: &NormalizedDocument) -> Result<Vec<PageImage>> {
        let mut page_count = doc.page_count();
        if self.config.max_pages > 0 {
            page_count = page_count.min(self.config.max_pages as u32);
        }

        let mut pages = Vec::with_capacity(page_count as usize);
        for page in 1..=page_count {
            pages.push(self.render_page(&doc.bytes, page)?);
        }

        info!("Rasterized {} pages", pages.len());
        Ok(pages)
    }

    /// First renderer that draws the page wins.
    fn render_page(&self, pdf: &[u8], page: u32) -> Result<PageImage> {
        let mut failures = Vec::new();
        for renderer in &self.renderers {
            match self.encode_page(renderer.as_ref(), pdf, page) {
                Ok(image) => return Ok(image),
                Err(e) => {
                    debug!("Renderer {} failed on page {}: {}", renderer.name(), page, e);
                    failures.push(format!("{}: {}", renderer.name(), e));
                }
            }
        }

        if failures.is_empty() {
            failures.push("no renderer configured".to_string());
        }
        Err(PdfError::Rasterize(format!("page {} could not be rendered ({})", page, failures.join("; "))).into())
    }

    /// Encode a page at the high resolution, stepping down once if too large.
    fn encode_page(&self, renderer: &dyn PageRenderer, pdf: &[u8], page: u32) -> Result<PageImage> {
        let high = encode_png(&renderer.render_page(pdf, page, self.config.high_dpi)?)?;
        if high.len() <= self.config.max_image_bytes {
            return Ok(page_image(page, high, self.config.high_dpi));
        }

        debug!(
            "Page {} is {} bytes at {} DPI, retrying at {} DPI",
            page,
            high.len(),
            self.config.high_dpi,
            self.config.low_dpi
        );
        let low = encode_png(&renderer.render_page(pdf, page, self.config.low_dpi)?)?;
        if low.len() > self.config.max_image_bytes {
            warn!(
                "Page {} still {} bytes at {} DPI",
                page,
                low.len(),
                self.config.low_dpi
            );
        }
        Ok(page_image(page, low, self.config.low_dpi))
    }

    fn flat_image(&self, doc: &NormalizedDocument) -> Result<Vec<PageImage>> {
        let bytes = &doc.bytes[..];
        // Signature first; the declared media type covers formats without one.
        let format = image::guess_format(bytes)
            .ok()
            .or_else(|| doc.media_type.as_deref().and_then(ImageFormat::from_mime_type))
            .ok_or_else(|| PdfError::Rasterize("not a recognised image format".to_string()))?;
        let (width, height) = ImageReader::with_format(Cursor::new(bytes), format)
            .into_dimensions()?;

        debug!("Using flat {:?} image {}x{} as-is", format, width, height);
        Ok(vec![PageImage {
            page: 1,
            mime_type: format.to_mime_type().to_string(),
            data: bytes.to_vec(),
            width,
            height,
            dpi: None,
        }])
    }
}

impl PageRasterizer for Rasterizer {
    fn rasterize(&self, doc: &NormalizedDocument) -> Result<Vec<PageImage>> {
        if doc.is_pdf() {
            self.rasterize_pdf(doc)
        } else {
            self.flat_image(doc)
        }
    }
}

#[cfg(feature = "native")]
fn full_page_renderer(config: &PdfConfig) -> Option<Arc<dyn PageRenderer>> {
    match super::pdfium::PdfiumRenderer::new(config.pdfium_library.as_deref()) {
        Ok(pdfium) => Some(Arc::new(pdfium)),
        Err(e) => {
            warn!("Full page rendering unavailable, using embedded scans only: {}", e);
            None
        }
    }
}

#[cfg(not(feature = "native"))]
fn full_page_renderer(_config: &PdfConfig) -> Option<Arc<dyn PageRenderer>> {
    None
}

/// Encoded PNG bytes plus the pixel size they were rendered at.
struct Rendered {
    png: Vec<u8>,
    width: u32,
    height: u32,
}

impl Rendered {
    fn len(&self) -> usize {
        self.png.len()
    }
}

fn encode_png(image: &DynamicImage) -> Result<Rendered> {
    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(Rendered {
        png,
        width: image.width(),
        height: image.height(),
    })
}

fn page_image(page: u32, rendered: Rendered, dpi: u32) -> PageImage {
    PageImage {
        page,
        mime_type: "image/png".to_string(),
        data: rendered.png,
        width: rendered.width,
        height: rendered.height,
        dpi: Some(dpi),
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;
    use crate::error::AutoTallyError;
    use crate::models::document::ContainerKind;
    use crate::testing::{image_only_pdf, text_pdf, StubRenderer};

    fn pdf_doc(bytes: Vec<u8>, page_count: u32) -> NormalizedDocument {
        NormalizedDocument {
            bytes: Arc::from(bytes),
            container: ContainerKind::Pdf { page_count },
            was_decrypted: false,
            media_type: None,
        }
    }

    fn flat_doc(bytes: Vec<u8>, media_type: Option<&str>) -> NormalizedDocument {
        NormalizedDocument {
            bytes: Arc::from(bytes),
            container: ContainerKind::Flat,
            was_decrypted: false,
            media_type: media_type.map(str::to_string),
        }
    }

    fn rasterizer(config: PdfConfig, renderers: Vec<Arc<dyn PageRenderer>>) -> Rasterizer {
        Rasterizer::new(config, renderers)
    }

    #[test]
    fn test_text_only_pages_get_one_image_each() {
        let stub = Arc::new(StubRenderer::new());
        let pages = rasterizer(PdfConfig::default(), vec![stub.clone()])
            .rasterize(&pdf_doc(text_pdf(&["Total 1180", "Thank you"]), 2))
            .unwrap();

        assert_eq!(pages.len(), 2);
        assert_eq!(pages.iter().map(|p| p.page).collect::<Vec<_>>(), vec![1, 2]);
        assert!(pages.iter().all(|p| p.mime_type == "image/png"));
        assert!(pages.iter().all(|p| p.dpi == Some(150)));
        assert_eq!(stub.calls(), vec![(1, 150), (2, 150)]);
    }

    #[test]
    fn test_embedded_scans_one_image_per_page() {
        let pages = rasterizer(PdfConfig::default(), vec![Arc::new(EmbeddedImageRenderer)])
            .rasterize(&pdf_doc(image_only_pdf(3), 3))
            .unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!((pages[2].width, pages[2].height), (8, 8));
    }

    #[test]
    fn test_falls_back_to_next_renderer_per_page() {
        let primary = Arc::new(StubRenderer::failing_on(&[2]));
        let pages = rasterizer(
            PdfConfig::default(),
            vec![primary.clone(), Arc::new(EmbeddedImageRenderer)],
        )
        .rasterize(&pdf_doc(image_only_pdf(3), 3))
        .unwrap();

        assert_eq!(pages.len(), 3);
        // Page 2 came from the embedded scan, the others from the stub.
        assert_eq!((pages[1].width, pages[1].height), (8, 8));
        assert_ne!((pages[0].width, pages[0].height), (8, 8));
    }

    #[test]
    fn test_unrenderable_page_fails_the_document() {
        let err = rasterizer(PdfConfig::default(), vec![Arc::new(EmbeddedImageRenderer)])
            .rasterize(&pdf_doc(text_pdf(&["Total 1180", "Thank you"]), 2))
            .unwrap_err();

        match err {
            AutoTallyError::Pdf(PdfError::Rasterize(msg)) => {
                assert!(msg.contains("page 1"), "{msg}");
                assert!(msg.contains("embedded-image"), "{msg}");
            }
            other => panic!("expected a rasterize error, got {other:?}"),
        }
    }

    #[test]
    fn test_max_pages_limits_output() {
        let config = PdfConfig {
            max_pages: 2,
            ..PdfConfig::default()
        };
        let pages = rasterizer(config, vec![Arc::new(StubRenderer::new())])
            .rasterize(&pdf_doc(text_pdf(&["a", "b", "c", "d"]), 4))
            .unwrap();
        assert_eq!(pages.len(), 2);
    }

    #[test]
    fn test_steps_down_when_over_ceiling() {
        let config = PdfConfig {
            max_image_bytes: 1,
            ..PdfConfig::default()
        };
        let stub = Arc::new(StubRenderer::new());
        let pages = rasterizer(config, vec![stub.clone()])
            .rasterize(&pdf_doc(text_pdf(&["Total 1180"]), 1))
            .unwrap();

        assert_eq!(pages[0].dpi, Some(100));
        assert_eq!(stub.calls(), vec![(1, 150), (1, 100)]);
        assert_eq!((pages[0].width, pages[0].height), StubRenderer::size_at(100));
    }

    #[test]
    fn test_flat_image_used_as_is() {
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(30, 20, Rgb([200, 10, 10])))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let pages = rasterizer(PdfConfig::default(), Vec::new())
            .rasterize(&flat_doc(png.clone(), None))
            .unwrap();

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page, 1);
        assert_eq!(pages[0].data, png);
        assert_eq!(pages[0].mime_type, "image/png");
        assert_eq!((pages[0].width, pages[0].height), (30, 20));
        assert_eq!(pages[0].dpi, None);
    }

    /// Uncompressed 24-bit TGA with a short image ID. TGA has no magic number.
    fn tga(width: u16, height: u16) -> Vec<u8> {
        let [w0, w1] = width.to_le_bytes();
        let [h0, h1] = height.to_le_bytes();
        let mut bytes = vec![3, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, w0, w1, h0, h1, 24, 0x20];
        bytes.extend_from_slice(b"inv");
        bytes.extend(std::iter::repeat_n([10u8, 20, 30], usize::from(width) * usize::from(height)).flatten());
        bytes
    }

    #[test]
    fn test_declared_media_type_identifies_unsigned_images() {
        let rasterizer = rasterizer(PdfConfig::default(), Vec::new());
        assert!(rasterizer.rasterize(&flat_doc(tga(12, 9), None)).is_err());

        let pages = rasterizer
            .rasterize(&flat_doc(tga(12, 9), Some("image/x-tga")))
            .unwrap();
        assert_eq!((pages[0].width, pages[0].height), (12, 9));
        assert_eq!(pages[0].mime_type, "image/x-targa");
    }

    #[test]
    fn test_unknown_flat_bytes_fail() {
        let doc = flat_doc(b"plain text, not an image".to_vec(), Some("text/plain"));
        assert!(rasterizer(PdfConfig::default(), Vec::new()).rasterize(&doc).is_err());
    }
}
