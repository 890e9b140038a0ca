//! The tagged document record produced by the extraction dispatcher.

use serde::{Deserialize, Serialize};

use super::bank::BankStatementData;
use super::invoice::InvoiceData;

/// Classification of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    Invoice,
    BankStatement,
    Invalid,
}

impl DocumentType {
    /// Wire tag used in engine output and responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "INVOICE",
            DocumentType::BankStatement => "BANK_STATEMENT",
            DocumentType::Invalid => "INVALID",
        }
    }
}

/// A decoded extraction result, tagged by `documentType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "documentType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentSchema {
    Invoice(InvoiceData),
    BankStatement(BankStatementData),
    Invalid,
}

impl DocumentSchema {
    pub fn document_type(&self) -> DocumentType {
        match self {
            DocumentSchema::Invoice(_) => DocumentType::Invoice,
            DocumentSchema::BankStatement(_) => DocumentType::BankStatement,
            DocumentSchema::Invalid => DocumentType::Invalid,
        }
    }

    pub fn as_invoice(&self) -> Option<&InvoiceData> {
        match self {
            DocumentSchema::Invoice(invoice) => Some(invoice),
            _ => None,
        }
    }

    pub fn as_bank_statement(&self) -> Option<&BankStatementData> {
        match self {
            DocumentSchema::BankStatement(statement) => Some(statement),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_by_tag() {
        let schema: DocumentSchema = serde_json::from_str(
            r#"{"documentType":"BANK_STATEMENT","bankName":"ICICI - 0042","transactions":[]}"#,
        )
        .unwrap();
        assert_eq!(schema.document_type(), DocumentType::BankStatement);
        assert_eq!(schema.as_bank_statement().unwrap().bank_name, "ICICI - 0042");

        let invalid: DocumentSchema =
            serde_json::from_str(r#"{"documentType":"INVALID"}"#).unwrap();
        assert_eq!(invalid, DocumentSchema::Invalid);
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let result = serde_json::from_str::<DocumentSchema>(r#"{"documentType":"RECEIPT"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_serializes_with_tag() {
        let json = serde_json::to_value(DocumentSchema::Invoice(InvoiceData::default())).unwrap();
        assert_eq!(json["documentType"], "INVOICE");
        assert_eq!(json["voucherType"], "Purchase");
    }
}
