//! Full page rendering through Google PDFium.
//!
//! `PdfiumRenderer` is stateless. The upstream `Pdfium` handle is `!Send`, so
//! each render binds the library again; the OS caches the `dlopen`.

use std::path::Path;

use image::{DynamicImage, RgbaImage};
use pdfium_render::prelude::*;
use tracing::debug;

use super::render::{target_pixels, PageRenderer};
use super::Result;
use crate::error::PdfError;

/// Environment variable naming the PDFium shared library.
pub const PDFIUM_LIBRARY_ENV: &str = "PDFIUM_DYNAMIC_LIB_PATH";

/// Renders any PDF page, vector or scanned, via PDFium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRenderer {
    library: Option<String>,
}

impl PdfiumRenderer {
    /// Bind PDFium once to fail fast when it is missing.
    ///
    /// Lookup order: `library`, then `PDFIUM_DYNAMIC_LIB_PATH`, then the
    /// directory of the running executable, then the system library path.
    pub fn new(library: Option<&Path>) -> Result<Self> {
        let renderer = Self {
            library: library.map(|p| p.to_string_lossy().into_owned()),
        };
        renderer.bind()?;
        Ok(renderer)
    }

    fn bind(&self) -> Result<Pdfium> {
        let explicit = self
            .library
            .clone()
            .or_else(|| std::env::var(PDFIUM_LIBRARY_ENV).ok());
        if let Some(path) = explicit {
            let bindings = Pdfium::bind_to_library(&path)
                .map_err(|e| PdfError::Rasterize(format!("failed to load PDFium from {}: {}", path, e)))?;
            return Ok(Pdfium::new(bindings));
        }

        if let Some(dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            let lib_path = Pdfium::pdfium_platform_library_name_at_path(dir.to_string_lossy().as_ref());
            if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                debug!("Loaded PDFium next to the executable");
                return Ok(Pdfium::new(bindings));
            }
        }

        let bindings = Pdfium::bind_to_system_library().map_err(|e| {
            PdfError::Rasterize(format!(
                "PDFium library not found (set {}): {}",
                PDFIUM_LIBRARY_ENV, e
            ))
        })?;
        Ok(Pdfium::new(bindings))
    }
}

impl PageRenderer for PdfiumRenderer {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    fn render_page(&self, pdf: &[u8], page: u32, dpi: u32) -> Result<DynamicImage> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| PdfError::Rasterize(format!("PDFium could not open the document: {}", e)))?;

        let index = page
            .checked_sub(1)
            .and_then(|i| u16::try_from(i).ok())
            .ok_or(PdfError::InvalidPage(page))?;
        let pages = document.pages();
        let pdf_page = pages.get(index).map_err(|_| PdfError::InvalidPage(page))?;

        let (width, height) = target_pixels((pdf_page.width().value, pdf_page.height().value), dpi);
        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_maximum_height(height as i32);

        let bitmap = pdf_page
            .render_with_config(&config)
            .map_err(|e| PdfError::Rasterize(format!("page {}: {}", page, e)))?;

        // PDFium hands back BGRA
        let (bitmap_w, bitmap_h) = (bitmap.width() as u32, bitmap.height() as u32);
        let rgba: Vec<u8> = bitmap
            .as_raw_bytes()
            .chunks_exact(4)
            .flat_map(|px| [px[2], px[1], px[0], px[3]])
            .collect();

        debug!("Rendered page {} at {} DPI as {}x{}", page, dpi, bitmap_w, bitmap_h);
        RgbaImage::from_raw(bitmap_w, bitmap_h, rgba)
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(|| PdfError::Rasterize(format!("page {}: bitmap size mismatch", page)))
    }
}
