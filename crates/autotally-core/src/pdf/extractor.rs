//! PDF text and page-image extraction using lopdf and pdf-extract.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};

use image::{DynamicImage, ImageBuffer, Rgba};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, trace, warn};

use super::{PdfProcessor, Result};
use crate::error::PdfError;
use crate::models::document::{ExtractedText, NormalizedDocument};

/// US Letter, used when a page carries no readable MediaBox.
const DEFAULT_PAGE_SIZE: (f32, f32) = (612.0, 792.0);

/// PDF content extractor using lopdf.
pub struct PdfExtractor {
    document: Option<Document>,
    raw_data: Vec<u8>,
}

impl PdfExtractor {
    /// Create a new PDF extractor.
    pub fn new() -> Self {
        Self {
            document: None,
            raw_data: Vec::new(),
        }
    }

    /// Create an extractor already loaded with `data`.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut extractor = Self::new();
        extractor.load(data)?;
        Ok(extractor)
    }

    fn document(&self) -> Result<&Document> {
        self.document
            .as_ref()
            .ok_or(PdfError::Parse("No document loaded".to_string()))
    }

    /// Extract all images from the entire document
    fn extract_all_images(&self, doc: &Document) -> Vec<DynamicImage> {
        let mut images = Vec::new();
        let mut seen_objects: HashSet<ObjectId> = HashSet::new();

        for (id, object) in doc.objects.iter() {
            if !seen_objects.insert(*id) {
                continue;
            }
            if let Some(img) = self.try_extract_image_from_object(doc, object) {
                images.push(img);
            }
        }

        debug!("Found {} images in document", images.len());
        images
    }

    fn try_extract_image_from_object(&self, doc: &Document, obj: &Object) -> Option<DynamicImage> {
        let Object::Stream(stream) = obj else {
            return None;
        };
        let dict = &stream.dict;

        if dict.get(b"Subtype").ok()?.as_name().ok()? != b"Image" {
            return None;
        }

        let width = dict.get(b"Width").ok()?.as_i64().ok()? as u32;
        let height = dict.get(b"Height").ok()?.as_i64().ok()? as u32;

        trace!("Found image object: {}x{}", width, height);

        if let Ok(filter) = dict.get(b"Filter") {
            let filter_name = match filter {
                Object::Name(name) => Some(name.as_slice()),
                Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
                _ => None,
            };

            match filter_name {
                Some(b"DCTDecode") => {
                    // JPEG data is usable straight from the raw stream
                    return image::load_from_memory_with_format(
                        &stream.content,
                        image::ImageFormat::Jpeg,
                    )
                    .ok();
                }
                Some(b"JPXDecode") | Some(b"CCITTFaxDecode") | Some(b"JBIG2Decode") => {
                    trace!("Skipping image with unsupported filter");
                    return None;
                }
                _ => {}
            }
        }

        let data = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());

        let color_space = dict
            .get(b"ColorSpace")
            .ok()
            .and_then(|o| match o {
                Object::Name(name) => Some(name.as_slice()),
                Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
                Object::Reference(r) => doc.get_object(*r).ok().and_then(|o| o.as_name().ok()),
                _ => None,
            })
            .unwrap_or(b"DeviceRGB");

        let bits = dict
            .get(b"BitsPerComponent")
            .ok()
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(8) as u8;

        create_image_from_raw(&data, width, height, color_space, bits)
    }

    /// Resources dictionary for a page, following `/Parent` inheritance.
    fn page_resources(&self, doc: &Document, node_id: ObjectId) -> Option<Dictionary> {
        inherited_entry(doc, node_id, b"Resources").and_then(|res| match doc.dereference(&res) {
            Ok((_, Object::Dictionary(dict))) => Some(dict.clone()),
            _ => None,
        })
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfProcessor for PdfExtractor {
    fn load(&mut self, data: &[u8]) -> Result<()> {
        let doc = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        // Decryption happens once, up front, in the normalizer.
        if doc.is_encrypted() {
            return Err(PdfError::Encrypted);
        }

        let page_count = doc.get_pages().len();
        if page_count == 0 {
            return Err(PdfError::NoPages);
        }

        debug!("Loaded PDF with {} pages", page_count);
        self.raw_data = data.to_vec();
        self.document = Some(doc);
        Ok(())
    }

    fn page_count(&self) -> u32 {
        self.document
            .as_ref()
            .map(|doc| doc.get_pages().len() as u32)
            .unwrap_or(0)
    }

    fn extract_page_texts(&self) -> Result<Vec<String>> {
        self.document()?;
        // pdf-extract panics on some malformed font programs
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(&self.raw_data)
        }));
        match result {
            Ok(Ok(pages)) => Ok(pages),
            Ok(Err(e)) => Err(PdfError::TextExtraction(e.to_string())),
            Err(_) => Err(PdfError::TextExtraction(
                "text extraction panicked".to_string(),
            )),
        }
    }

    fn page_images(&self, page: u32) -> Result<Vec<DynamicImage>> {
        let doc = self.document()?;

        let pages = doc.get_pages();
        let page_id = pages.get(&page).ok_or(PdfError::InvalidPage(page))?;

        let mut images = Vec::new();

        if let Some(resources) = self.page_resources(doc, *page_id) {
            if let Ok(xobjects) = resources.get(b"XObject") {
                if let Ok((_, Object::Dictionary(xobj_dict))) = doc.dereference(xobjects) {
                    for (_name, obj_ref) in xobj_dict.iter() {
                        if let Ok((_, obj)) = doc.dereference(obj_ref) {
                            if let Some(img) = self.try_extract_image_from_object(doc, obj) {
                                images.push(img);
                            }
                        }
                    }
                }
            }
        }

        // Single-page scans sometimes reference the image from a form XObject
        if images.is_empty() && pages.len() == 1 {
            debug!("No XObject images found on page {}, scanning all objects", page);
            images = self.extract_all_images(doc);
        }

        debug!("Extracted {} images from page {}", images.len(), page);
        Ok(images)
    }

    fn page_size(&self, page: u32) -> Result<(f32, f32)> {
        let doc = self.document()?;
        let page_id = *doc.get_pages().get(&page).ok_or(PdfError::InvalidPage(page))?;

        let size = inherited_entry(doc, page_id, b"MediaBox")
            .and_then(|mb| match doc.dereference(&mb) {
                Ok((_, Object::Array(arr))) if arr.len() == 4 => {
                    let coords: Vec<f32> = arr.iter().filter_map(|o| o.as_float().ok()).collect();
                    (coords.len() == 4)
                        .then(|| ((coords[2] - coords[0]).abs(), (coords[3] - coords[1]).abs()))
                }
                _ => None,
            })
            .filter(|(w, h)| *w > 0.0 && *h > 0.0)
            .unwrap_or(DEFAULT_PAGE_SIZE);

        Ok(size)
    }
}

/// Text extractor: concatenated per-page text with blank lines removed.
///
/// Never fails. A corrupt stream yields empty text and the strategy selector
/// decides what to do next.
pub fn extract_text(doc: &NormalizedDocument) -> ExtractedText {
    let page_count = doc.page_count();
    if !doc.is_pdf() {
        return ExtractedText::new(String::new(), page_count);
    }

    let pages = match PdfExtractor::from_bytes(&doc.bytes).and_then(|e| e.extract_page_texts()) {
        Ok(pages) => pages,
        Err(e) => {
            warn!("Text extraction failed, continuing without text: {}", e);
            return ExtractedText::new(String::new(), page_count);
        }
    };

    let text = join_non_blank_lines(pages.iter().map(String::as_str));
    let extracted = ExtractedText::new(text, page_count);
    debug!(
        "Extracted {} chars of text from {} pages",
        extracted.char_count, page_count
    );
    extracted
}

/// Join the non-blank lines of each page in order, trailing whitespace removed.
pub(crate) fn join_non_blank_lines<'a>(pages: impl Iterator<Item = &'a str>) -> String {
    pages
        .flat_map(str::lines)
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Look up a page-tree entry on `node_id`, walking `/Parent` links.
fn inherited_entry(doc: &Document, node_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = node_id;
    // Page trees are shallow; the bound stops reference cycles.
    for _ in 0..32 {
        let Ok(Object::Dictionary(dict)) = doc.get_object(current) else {
            return None;
        };
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(parent_id)) => current = *parent_id,
            _ => return None,
        }
    }
    None
}

fn create_image_from_raw(
    data: &[u8],
    width: u32,
    height: u32,
    color_space: &[u8],
    bits_per_component: u8,
) -> Option<DynamicImage> {
    if bits_per_component != 8 {
        trace!("Unsupported bits per component: {}", bits_per_component);
        return None;
    }

    let pixels = (width as usize) * (height as usize);
    let channels = match color_space {
        b"DeviceRGB" | b"RGB" => 3,
        b"DeviceGray" | b"G" => 1,
        _ => {
            trace!("Unsupported color space: {:?}", String::from_utf8_lossy(color_space));
            return None;
        }
    };

    if data.len() < pixels * channels {
        trace!(
            "Could not decode image: data_len={}, expected={}",
            data.len(),
            pixels * channels
        );
        return None;
    }

    let mut rgba = Vec::with_capacity(pixels * 4);
    for chunk in data[..pixels * channels].chunks(channels) {
        match chunk {
            [r, g, b] => rgba.extend_from_slice(&[*r, *g, *b, 255]),
            [gray] => rgba.extend_from_slice(&[*gray, *gray, *gray, 255]),
            _ => return None,
        }
    }

    ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, rgba).map(DynamicImage::ImageRgba8)
}
