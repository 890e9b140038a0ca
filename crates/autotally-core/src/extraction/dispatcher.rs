use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, trace, warn};

use super::engine::{EngineRequest, ExtractionEngine};
use super::prompts;
use crate::error::{EngineError, ExtractionError};
use crate::models::document::{DocumentProfile, ExtractionUnit};
use crate::models::schema::{DocumentSchema, DocumentType};
use crate::rules::{apply_invoice_rules, classify_value};

/// A decoded and post-processed engine result.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub schema: DocumentSchema,
    /// Review notes from the bookkeeping rules (GSTIN, rates, totals).
    pub warnings: Vec<String>,
}

/// Outcome of one completed engine call.
///
/// The call spent tokens whether or not its output decodes, so usage is
/// reported separately from the decode result.
#[derive(Debug)]
pub struct Dispatched {
    pub token_usage: u64,
    pub outcome: Result<Extracted, ExtractionError>,
}

/// Sends payloads to the extraction engine and decodes what comes back.
#[derive(Clone)]
pub struct Dispatcher {
    engine: Arc<dyn ExtractionEngine>,
}

impl Dispatcher {
    pub fn new(engine: Arc<dyn ExtractionEngine>) -> Self {
        Self { engine }
    }

    /// Call the engine once.
    ///
    /// Engine failures (upstream quota, transport) are returned as `Err`; a
    /// completed call always yields `Ok`, carrying its token usage and the
    /// decode outcome.
    pub async fn dispatch(
        &self,
        unit: &ExtractionUnit,
        profile: DocumentProfile,
    ) -> Result<Dispatched, EngineError> {
        let instructions = prompts::for_profile(profile);
        match unit {
            ExtractionUnit::Text { char_count, .. } => {
                info!("Dispatching {} text payload ({} chars)", profile, char_count)
            }
            ExtractionUnit::Images(pages) => {
                info!("Dispatching {} image payload ({} pages)", profile, pages.len())
            }
        }

        let response = self
            .engine
            .generate(EngineRequest {
                instructions: instructions.system,
                prompt: instructions.prompt,
                content: unit,
                output_schema: &instructions.schema,
            })
            .await?;

        let token_usage = response.token_usage.unwrap_or_else(|| {
            warn!("Engine reported no token usage, recording 0");
            0
        });
        trace!("Engine raw response: {}", response.raw_text);

        let source_text = match unit {
            ExtractionUnit::Text { content, .. } => Some(content.as_str()),
            ExtractionUnit::Images(_) => None,
        };
        let outcome = parse_response(
            &response.raw_text,
            profile,
            response.classification_hint,
            source_text,
        );
        match &outcome {
            Ok(extracted) => debug!(
                "Decoded {} with {} warnings",
                extracted.schema.document_type().as_str(),
                extracted.warnings.len()
            ),
            Err(e) => warn!("Engine output rejected: {}", e),
        }

        Ok(Dispatched {
            token_usage,
            outcome,
        })
    }
}

/// Decode raw engine text into a document record.
///
/// A missing `documentType` is filled from the engine's hint, then from the
/// local heuristic. `Invalid` documents are rejected as not recognized.
pub fn parse_response(
    raw: &str,
    profile: DocumentProfile,
    hint: Option<DocumentType>,
    source_text: Option<&str>,
) -> Result<Extracted, ExtractionError> {
    let body = strip_code_fences(raw);
    let mut value: Value =
        serde_json::from_str(body).map_err(|e| ExtractionError::Parse(e.to_string()))?;

    let classified = hint.unwrap_or_else(|| classify_value(&value, source_text, profile));
    let object = value
        .as_object_mut()
        .ok_or_else(|| ExtractionError::Parse("expected a JSON object".to_string()))?;

    let tag = match object.get("documentType").and_then(Value::as_str) {
        Some(tag) => tag.trim().to_ascii_uppercase().replace([' ', '-'], "_"),
        None => {
            debug!("No documentType in engine output, classified as {}", classified.as_str());
            classified.as_str().to_string()
        }
    };
    object.insert("documentType".to_string(), Value::String(tag));

    let schema: DocumentSchema =
        serde_json::from_value(value).map_err(|e| ExtractionError::Parse(e.to_string()))?;

    let (schema, warnings) = match schema {
        DocumentSchema::Invoice(mut invoice) => {
            let warnings = apply_invoice_rules(&mut invoice)?;
            (DocumentSchema::Invoice(invoice), warnings)
        }
        DocumentSchema::BankStatement(mut statement) => {
            statement.normalize();
            (DocumentSchema::BankStatement(statement), Vec::new())
        }
        DocumentSchema::Invalid => return Err(ExtractionError::NotRecognized),
    };

    Ok(Extracted { schema, warnings })
}

/// Remove a markdown code fence around the payload, if there is one.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };

    // Skip the info string (`json`, `JSON`, ...)
    let rest = trimmed[start + 3..].trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    let body = match rest.find("```") {
        Some(end) => &rest[..end],
        None => rest,
    };
    body.trim()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;

    use super::*;
    use crate::models::bank::{BankVoucherType, SUSPENSE_LEDGER};
    use crate::testing::ScriptedEngine;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
        assert_eq!(
            strip_code_fences("Here is the data:\n```JSON\n{\"a\":1}\n```\nDone."),
            "{\"a\":1}"
        );
        assert_eq!(strip_code_fences("```json {\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn test_parse_failure_is_extraction_error() {
        let err = parse_response("I could not read this", DocumentProfile::Invoice, None, None)
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Parse(_)));

        let err = parse_response("[1, 2]", DocumentProfile::Invoice, None, None).unwrap_err();
        assert!(matches!(err, ExtractionError::Parse(_)));
    }

    #[test]
    fn test_invalid_is_not_recognized() {
        let err = parse_response(
            r#"{"documentType":"INVALID"}"#,
            DocumentProfile::Invoice,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ExtractionError::NotRecognized));
    }

    #[test]
    fn test_out_of_range_amount_is_parse_error() {
        let err = parse_response(
            r#"{"documentType":"INVOICE","lineItems":[{"description":"Bogus","amount":"50000000000000000000000000000","gstRate":18}]}"#,
            DocumentProfile::Invoice,
            None,
            None,
        )
        .unwrap_err();
        match err {
            ExtractionError::Parse(msg) => assert!(msg.contains("out of range"), "{msg}"),
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_null_line_items_become_empty() {
        let extracted = parse_response(
            "```json\n{\"documentType\":\"invoice\",\"supplierName\":\"Acme\",\"lineItems\":null}\n```",
            DocumentProfile::Invoice,
            None,
            None,
        )
        .unwrap();
        let invoice = extracted.schema.as_invoice().unwrap();
        assert_eq!(invoice.supplier_name, "Acme");
        assert!(invoice.line_items.is_empty());
    }

    #[test]
    fn test_missing_tag_is_classified() {
        let extracted = parse_response(
            r#"{"bankName":"SBI - 1111","transactions":[]}"#,
            DocumentProfile::Invoice,
            None,
            None,
        )
        .unwrap();
        assert_eq!(extracted.schema.document_type(), DocumentType::BankStatement);

        let extracted = parse_response(
            r#"{"bankName":"SBI - 1111","transactions":[]}"#,
            DocumentProfile::Invoice,
            Some(DocumentType::Invalid),
            None,
        );
        assert!(matches!(extracted, Err(ExtractionError::NotRecognized)));
    }

    #[test]
    fn test_bank_rows_get_voucher_direction() {
        let extracted = parse_response(
            r#"{"documentType":"BANK_STATEMENT","bankName":"HDFC Bank - 4521","transactions":[
                {"date":"01-08-2025","description":"ATM WDL","withdrawal":2000,"deposit":0},
                {"date":"02-08-2025","description":"NEFT CR","withdrawal":0,"deposit":15000}]}"#,
            DocumentProfile::BankStatement,
            None,
            None,
        )
        .unwrap();
        let statement = extracted.schema.as_bank_statement().unwrap();
        assert_eq!(
            statement.transactions[0].voucher_type,
            Some(BankVoucherType::Payment)
        );
        assert_eq!(
            statement.transactions[1].voucher_type,
            Some(BankVoucherType::Receipt)
        );
        assert_eq!(statement.transactions[0].contra_ledger, SUSPENSE_LEDGER);
    }

    #[tokio::test]
    async fn test_dispatch_reports_usage_even_when_decode_fails() {
        let engine = ScriptedEngine::new().reply("not json at all", Some(812));
        let dispatcher = Dispatcher::new(Arc::new(engine));

        let dispatched = dispatcher
            .dispatch(&ExtractionUnit::text("x".repeat(60)), DocumentProfile::Invoice)
            .await
            .unwrap();
        assert_eq!(dispatched.token_usage, 812);
        assert!(matches!(dispatched.outcome, Err(ExtractionError::Parse(_))));
    }

    #[tokio::test]
    async fn test_dispatch_sends_profile_instructions() {
        let engine = Arc::new(ScriptedEngine::new().reply(
            r#"{"documentType":"INVOICE","lineItems":[{"description":"Chair","amount":1000,"gstRate":18}]}"#,
            None,
        ));
        let dispatcher = Dispatcher::new(engine.clone());

        let dispatched = dispatcher
            .dispatch(&ExtractionUnit::text("Tax Invoice".to_string()), DocumentProfile::Invoice)
            .await
            .unwrap();
        assert_eq!(dispatched.token_usage, 0);

        let extracted = dispatched.outcome.unwrap();
        let invoice = extracted.schema.as_invoice().unwrap();
        assert_eq!(invoice.tax.taxable_value, Decimal::from(1000));
        assert_eq!(invoice.line_items[0].ordinal, 1);

        let calls = engine.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].instructions.contains("GST invoice accountant"));
        assert_eq!(calls[0].content, ExtractionUnit::text("Tax Invoice".to_string()));
    }

    #[tokio::test]
    async fn test_upstream_quota_is_engine_error() {
        let engine = ScriptedEngine::new().fail(EngineError::UpstreamQuotaExceeded("429".into()));
        let dispatcher = Dispatcher::new(Arc::new(engine));

        let result = dispatcher
            .dispatch(&ExtractionUnit::text("abc".to_string()), DocumentProfile::Invoice)
            .await;
        assert!(matches!(result, Err(EngineError::UpstreamQuotaExceeded(_))));
    }
}
