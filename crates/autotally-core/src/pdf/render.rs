//! Page renderers: turn one PDF page into pixels at a requested resolution.

use image::imageops::FilterType;
use image::DynamicImage;
use tracing::debug;

use super::{PdfExtractor, PdfProcessor, Result};
use crate::error::PdfError;

/// Largest width or height of a rendered page, in pixels.
pub const MAX_DIMENSION_PX: u32 = 4096;

/// PDF points per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Renders a single page of a PDF.
pub trait PageRenderer: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Render the 1-indexed `page` of `pdf` at `dpi`.
    fn render_page(&self, pdf: &[u8], page: u32, dpi: u32) -> Result<DynamicImage>;
}

/// Pixel box for a page of `size_pt` points at `dpi`, capped at
/// [`MAX_DIMENSION_PX`] with the aspect ratio kept.
pub fn target_pixels(size_pt: (f32, f32), dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let w = (size_pt.0 * scale).round().max(1.0);
    let h = (size_pt.1 * scale).round().max(1.0);

    let longest = w.max(h);
    if longest > MAX_DIMENSION_PX as f32 {
        let ratio = MAX_DIMENSION_PX as f32 / longest;
        let w = ((w * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        let h = ((h * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        return (w, h);
    }
    (w as u32, h as u32)
}

/// Recovers a page from its largest embedded image.
///
/// Works without any native library but only for scans whose image is stored
/// with a filter lopdf can decode. Pages drawn with vector text fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedImageRenderer;

impl PageRenderer for EmbeddedImageRenderer {
    fn name(&self) -> &'static str {
        "embedded-image"
    }

    fn render_page(&self, pdf: &[u8], page: u32, dpi: u32) -> Result<DynamicImage> {
        let extractor = PdfExtractor::from_bytes(pdf)?;
        // The page scan is the largest image; logos and stamps are smaller.
        let scan = extractor
            .page_images(page)?
            .into_iter()
            .max_by_key(|img| u64::from(img.width()) * u64::from(img.height()))
            .ok_or_else(|| PdfError::Rasterize(format!("page {} has no decodable image", page)))?;

        let (target_w, target_h) = target_pixels(extractor.page_size(page)?, dpi);
        debug!(
            "Page {} scan is {}x{}, target {}x{} at {} DPI",
            page,
            scan.width(),
            scan.height(),
            target_w,
            target_h,
            dpi
        );

        // Never upscale: a scan below the target resolution is used as is.
        if scan.width() > target_w || scan.height() > target_h {
            Ok(scan.resize(target_w, target_h, FilterType::Triangle))
        } else {
            Ok(scan)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{image_only_pdf, text_pdf};

    #[test]
    fn test_target_pixels() {
        assert_eq!(target_pixels((612.0, 792.0), 72), (612, 792));
        assert_eq!(target_pixels((612.0, 792.0), 150), (1275, 1650));
        assert_eq!(target_pixels((0.0, 0.0), 150), (1, 1));
    }

    #[test]
    fn test_target_pixels_capped() {
        let (w, h) = target_pixels((5000.0, 10000.0), 150);
        assert!(h <= MAX_DIMENSION_PX && h + 1 >= MAX_DIMENSION_PX, "height {h}");
        assert!(w.abs_diff(MAX_DIMENSION_PX / 2) <= 1, "width {w}");
    }

    #[test]
    fn test_embedded_scan_is_never_upscaled() {
        let image = EmbeddedImageRenderer
            .render_page(&image_only_pdf(2), 2, 150)
            .unwrap();
        assert_eq!((image.width(), image.height()), (8, 8));
    }

    #[test]
    fn test_embedded_fails_on_vector_page() {
        let err = EmbeddedImageRenderer
            .render_page(&text_pdf(&["Total 1180"]), 1, 150)
            .unwrap_err();
        assert!(matches!(err, PdfError::Rasterize(_)));
    }
}
