//! Last-resort document classification, used only when the extraction
//! engine's output does not carry a `documentType`.

use serde_json::Value;

use crate::models::document::DocumentProfile;
use crate::models::schema::DocumentType;

const INVOICE_CUES: &[&str] = &["GSTIN", "TAX INVOICE", "HSN", "INVOICE NO", "PLACE OF SUPPLY"];

const BANK_CUES: &[&str] = &[
    "WITHDRAWAL",
    "DEPOSIT",
    "NARRATION",
    "OPENING BALANCE",
    "CLOSING BALANCE",
    "IFSC",
];

/// Classify engine output by shape, then by cues in the source text, then
/// fall back to the profile the caller asked for.
pub fn classify_value(value: &Value, source_text: Option<&str>, profile: DocumentProfile) -> DocumentType {
    if let Some(kind) = classify_shape(value) {
        return kind;
    }
    if let Some(kind) = source_text.and_then(classify_text) {
        return kind;
    }
    match profile {
        DocumentProfile::Invoice => DocumentType::Invoice,
        DocumentProfile::BankStatement => DocumentType::BankStatement,
    }
}

fn classify_shape(value: &Value) -> Option<DocumentType> {
    let object = value.as_object()?;
    match (object.contains_key("lineItems"), object.contains_key("transactions")) {
        (true, false) => Some(DocumentType::Invoice),
        (false, true) => Some(DocumentType::BankStatement),
        _ => None,
    }
}

/// Classify raw document text by keyword cues. `None` when undecided.
pub fn classify_text(text: &str) -> Option<DocumentType> {
    let upper = text.to_uppercase();
    let score = |cues: &[&str]| cues.iter().filter(|cue| upper.contains(*cue)).count();

    let invoice = score(INVOICE_CUES);
    let bank = score(BANK_CUES);
    match invoice.cmp(&bank) {
        std::cmp::Ordering::Greater => Some(DocumentType::Invoice),
        std::cmp::Ordering::Less => Some(DocumentType::BankStatement),
        std::cmp::Ordering::Equal => None,
    }
}
