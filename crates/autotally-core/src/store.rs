//! Where processed documents are kept.
//!
//! The pipeline needs two things from persistence: whether a content hash
//! was already processed, and a place to save a finished record. Invoices are
//! additionally de-duplicated by supplier GSTIN and invoice number, since the
//! same invoice is often re-scanned or re-exported with different bytes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AutoTallyError, Result};
use crate::models::schema::{DocumentSchema, DocumentType};
use crate::rules::gstin::normalize_gstin;

/// Persistence collaborator.
pub trait DocumentStore: Send + Sync {
    /// Whether a document with this SHA-256 content hash was saved before.
    fn exists(&self, hash: &str) -> Result<bool>;

    /// Save a processed document and return its id.
    ///
    /// Fails with [`AutoTallyError::Duplicate`] when the hash, or the
    /// invoice's (supplier GSTIN, invoice number) pair, is already stored.
    fn save(&self, hash: &str, schema: &DocumentSchema) -> Result<String>;
}

/// One saved document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    pub id: String,
    pub content_hash: String,
    pub document_type: DocumentType,
    pub saved_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_key: Option<InvoiceKey>,
    pub schema: DocumentSchema,
}

/// Identity of an invoice independent of its file bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceKey {
    pub supplier_gstin: String,
    pub invoice_number: String,
}

impl InvoiceKey {
    /// Key for an invoice record. `None` unless both parts are present.
    pub fn of(schema: &DocumentSchema) -> Option<Self> {
        let invoice = schema.as_invoice()?;
        let supplier_gstin = normalize_gstin(&invoice.supplier_gstin);
        let invoice_number = invoice.invoice_number.trim().to_uppercase();
        if supplier_gstin.is_empty() || invoice_number.is_empty() {
            return None;
        }
        Some(Self {
            supplier_gstin,
            invoice_number,
        })
    }
}

fn document_id(hash: &str) -> String {
    format!("doc-{}", &hash[..hash.len().min(16)])
}

fn stored(hash: &str, schema: &DocumentSchema) -> StoredDocument {
    StoredDocument {
        id: document_id(hash),
        content_hash: hash.to_string(),
        document_type: schema.document_type(),
        saved_at: Utc::now(),
        invoice_key: InvoiceKey::of(schema),
        schema: schema.clone(),
    }
}

fn duplicate(hash: &str) -> AutoTallyError {
    AutoTallyError::Duplicate {
        hash: hash.to_string(),
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    documents: Vec<StoredDocument>,
    by_hash: HashMap<String, usize>,
    by_invoice: HashMap<InvoiceKey, usize>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Saved documents in insertion order.
    pub fn documents(&self) -> Vec<StoredDocument> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .documents
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .documents
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn exists(&self, hash: &str) -> Result<bool> {
        Ok(self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_hash
            .contains_key(hash))
    }

    fn save(&self, hash: &str, schema: &DocumentSchema) -> Result<String> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.by_hash.contains_key(hash) {
            return Err(duplicate(hash));
        }

        let record = stored(hash, schema);
        if let Some(key) = &record.invoice_key {
            if inner.by_invoice.contains_key(key) {
                info!(
                    "Invoice {} from {} already stored",
                    key.invoice_number, key.supplier_gstin
                );
                return Err(duplicate(hash));
            }
        }

        let index = inner.documents.len();
        inner.by_hash.insert(hash.to_string(), index);
        if let Some(key) = record.invoice_key.clone() {
            inner.by_invoice.insert(key, index);
        }
        let id = record.id.clone();
        inner.documents.push(record);
        Ok(id)
    }
}

/// One JSON file per document, named by content hash.
#[derive(Debug)]
pub struct JsonDirStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl JsonDirStore {
    /// Open (and create if needed) a store directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("{}.json", hash))
    }

    /// All readable records in the directory.
    pub fn documents(&self) -> Result<Vec<StoredDocument>> {
        let mut documents = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<StoredDocument>(&content) {
                Ok(document) => documents.push(document),
                Err(e) => debug!("Skipping unreadable record {}: {}", path.display(), e),
            }
        }
        documents.sort_by(|a, b| a.saved_at.cmp(&b.saved_at));
        Ok(documents)
    }
}

impl DocumentStore for JsonDirStore {
    fn exists(&self, hash: &str) -> Result<bool> {
        Ok(self.path_for(hash).exists())
    }

    fn save(&self, hash: &str, schema: &DocumentSchema) -> Result<String> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let path = self.path_for(hash);
        if path.exists() {
            return Err(duplicate(hash));
        }

        let record = stored(hash, schema);
        if let Some(key) = &record.invoice_key {
            let clash = self
                .documents()?
                .into_iter()
                .any(|existing| existing.invoice_key.as_ref() == Some(key));
            if clash {
                info!(
                    "Invoice {} from {} already stored",
                    key.invoice_number, key.supplier_gstin
                );
                return Err(duplicate(hash));
            }
        }

        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| AutoTallyError::Store(e.to_string()))?;
        std::fs::write(&path, json)?;
        debug!("Stored {} at {}", record.id, path.display());
        Ok(record.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::bank::BankStatementData;
    use crate::models::invoice::InvoiceData;

    fn invoice(gstin: &str, number: &str) -> DocumentSchema {
        DocumentSchema::Invoice(InvoiceData {
            supplier_gstin: gstin.to_string(),
            invoice_number: number.to_string(),
            ..InvoiceData::default()
        })
    }

    #[test]
    fn test_memory_store_hash_dedup() {
        let store = MemoryDocumentStore::new();
        assert!(!store.exists("abc123").unwrap());

        let id = store.save("abc123", &invoice("27ABCDE1234F1Z0", "INV-1")).unwrap();
        assert_eq!(id, "doc-abc123");
        assert!(store.exists("abc123").unwrap());

        let err = store.save("abc123", &invoice("", "")).unwrap_err();
        assert!(matches!(err, AutoTallyError::Duplicate { .. }));
    }

    #[test]
    fn test_memory_store_invoice_key_dedup() {
        let store = MemoryDocumentStore::new();
        store.save("h1", &invoice("27abcde1234f1z0", "inv-7")).unwrap();

        let err = store.save("h2", &invoice(" 27ABCDE1234F1Z0 ", "INV-7")).unwrap_err();
        assert!(matches!(err, AutoTallyError::Duplicate { .. }));

        // Same number from another supplier is a different invoice.
        store.save("h3", &invoice("29ABCDE1234F1ZW", "INV-7")).unwrap();
        // Without an invoice number there is no key to clash on.
        store.save("h4", &invoice("27ABCDE1234F1Z0", "")).unwrap();
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_bank_statements_have_no_invoice_key() {
        let schema = DocumentSchema::BankStatement(BankStatementData::default());
        assert_eq!(InvoiceKey::of(&schema), None);
    }

    #[test]
    fn test_json_dir_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::open(dir.path().join("documents")).unwrap();

        store.save("feedface", &invoice("27ABCDE1234F1Z0", "A/1")).unwrap();
        assert!(store.exists("feedface").unwrap());
        assert!(!store.exists("deadbeef").unwrap());

        let err = store.save("deadbeef", &invoice("27ABCDE1234F1Z0", "a/1")).unwrap_err();
        assert!(matches!(err, AutoTallyError::Duplicate { .. }));

        let documents = store.documents().unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].document_type, DocumentType::Invoice);
        assert_eq!(documents[0].schema, invoice("27ABCDE1234F1Z0", "A/1"));

        // Reopening sees what was written.
        let reopened = JsonDirStore::open(store.dir()).unwrap();
        assert!(reopened.exists("feedface").unwrap());
    }
}
