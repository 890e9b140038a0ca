//! Decryption normalizer: turns an uploaded buffer into bytes that open
//! without a password, or reports that a password is needed.

use lopdf::Document;
use tracing::{debug, info, warn};

use crate::error::{AutoTallyError, PasswordHint, PdfError, Result};
use crate::models::document::{ContainerKind, NormalizedDocument, RawDocument};

/// PDF readers accept the header anywhere in the first kilobyte.
const HEADER_WINDOW: usize = 1024;

/// Normalize a raw upload.
///
/// - unencrypted PDF: bytes returned unchanged
/// - encrypted PDF that opens with the supplied (or empty) password: freshly
///   serialized bytes with the encryption dictionary stripped
/// - encrypted PDF that does not open: [`AutoTallyError::PasswordRequired`]
/// - anything that is not a PDF container: passed through as a flat image
pub fn normalize(raw: &RawDocument) -> Result<NormalizedDocument> {
    let bytes = raw.bytes();

    if !has_pdf_header(bytes) {
        debug!("No PDF header, treating {} bytes as a flat image", bytes.len());
        return Ok(flat(raw));
    }

    let doc = match Document::load_mem(bytes) {
        Ok(doc) => doc,
        Err(e) if is_encryption_error(&e) => {
            return Err(password_required(raw.password().is_some()));
        }
        Err(e) => {
            warn!("PDF header present but container failed to parse ({}), passing through", e);
            return Ok(flat(raw));
        }
    };

    if !doc.is_encrypted() {
        let page_count = doc.get_pages().len() as u32;
        debug!("Loaded unencrypted PDF with {} pages", page_count);
        return Ok(NormalizedDocument {
            bytes: raw.shared_bytes(),
            container: ContainerKind::Pdf { page_count },
            was_decrypted: false,
            media_type: raw.media_type().map(str::to_string),
        });
    }

    let doc = open_encrypted(doc, bytes, raw.password())?;
    let page_count = doc.get_pages().len() as u32;
    let decrypted = reserialize(doc)?;

    info!("Decrypted PDF with {} pages", page_count);
    Ok(NormalizedDocument {
        bytes: decrypted.into(),
        container: ContainerKind::Pdf { page_count },
        was_decrypted: true,
        media_type: raw.media_type().map(str::to_string),
    })
}

/// Whether `bytes` opens as a PDF that still carries an encryption dictionary.
pub fn is_encrypted_pdf(bytes: &[u8]) -> bool {
    Document::load_mem(bytes)
        .map(|doc| doc.is_encrypted())
        .unwrap_or(false)
}

fn open_encrypted(mut doc: Document, bytes: &[u8], password: Option<&str>) -> Result<Document> {
    let Some(password) = password else {
        // Owner-password-only files open with an empty user password.
        return match doc.decrypt("") {
            Ok(()) => {
                debug!("Decrypted PDF with empty password");
                Ok(doc)
            }
            Err(e) => {
                debug!("Empty password rejected: {}", e);
                Err(password_required(false))
            }
        };
    };

    if doc.decrypt(password).is_ok() {
        return Ok(doc);
    }

    // The supplied password may be wrong while the user password is empty.
    let mut retry = Document::load_mem(bytes).map_err(|e| PdfError::Parse(e.to_string()))?;
    match retry.decrypt("") {
        Ok(()) => {
            debug!("Supplied password rejected but empty user password accepted");
            Ok(retry)
        }
        Err(_) => Err(password_required(true)),
    }
}

fn reserialize(mut doc: Document) -> Result<Vec<u8>> {
    doc.trailer.remove(b"Encrypt");

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| PdfError::Parse(format!("failed to save decrypted PDF: {}", e)))?;

    if is_encrypted_pdf(&out) {
        return Err(PdfError::Encrypted.into());
    }
    Ok(out)
}

fn flat(raw: &RawDocument) -> NormalizedDocument {
    NormalizedDocument {
        bytes: raw.shared_bytes(),
        container: ContainerKind::Flat,
        was_decrypted: false,
        media_type: raw.media_type().map(str::to_string),
    }
}

fn password_required(supplied: bool) -> AutoTallyError {
    let hint = if supplied {
        PasswordHint::Incorrect
    } else {
        PasswordHint::NotSupplied
    };
    AutoTallyError::PasswordRequired { hint }
}

pub(crate) fn has_pdf_header(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(HEADER_WINDOW)];
    window.windows(5).any(|w| w == b"%PDF-")
}

fn is_encryption_error(err: &lopdf::Error) -> bool {
    matches!(err, lopdf::Error::Decryption(_))
}
