//! Persistence for the ledger record.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Plan;
use crate::error::LedgerError;

/// The persisted ledger document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerRecord {
    /// Tokens used in the current period.
    pub used: u64,
    pub plan: Plan,
    /// Period key (`YYYY-MM`) the `used` counter belongs to.
    pub reset_date: String,
    /// Highest usage threshold already reported in this period, 0 for none.
    pub last_notified_threshold: u8,
}

/// Where the ledger record lives.
pub trait LedgerStore: Send + Sync {
    /// `None` when no record has been written yet.
    fn load(&self) -> Result<Option<LedgerRecord>, LedgerError>;

    fn save(&self, record: &LedgerRecord) -> Result<(), LedgerError>;
}

/// A single JSON file, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct JsonFileLedgerStore {
    path: PathBuf,
}

impl JsonFileLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LedgerStore for JsonFileLedgerStore {
    fn load(&self) -> Result<Option<LedgerRecord>, LedgerError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, record: &LedgerRecord) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(record)?)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!("Saved ledger to {}", self.path.display());
        Ok(())
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    record: Mutex<Option<LedgerRecord>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: LedgerRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn load(&self) -> Result<Option<LedgerRecord>, LedgerError> {
        Ok(self
            .record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, record: &LedgerRecord) -> Result<(), LedgerError> {
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = Some(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileLedgerStore::new(dir.path().join("nested/usage.json"));
        assert_eq!(store.load().unwrap(), None);

        let record = LedgerRecord {
            used: 1234,
            plan: Plan::Gold,
            reset_date: "2025-08".to_string(),
            last_notified_threshold: 50,
        };
        store.save(&record).unwrap();
        assert_eq!(store.load().unwrap(), Some(record));
    }

    #[test]
    fn test_reads_external_record_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.json");
        std::fs::write(
            &path,
            r#"{"used": 48000, "plan": "Bronze", "reset_date": "2025-07", "last_notified_threshold": 75}"#,
        )
        .unwrap();

        let record = JsonFileLedgerStore::new(&path).load().unwrap().unwrap();
        assert_eq!(record.used, 48_000);
        assert_eq!(record.reset_date, "2025-07");
        assert_eq!(record.last_notified_threshold, 75);
    }

    #[test]
    fn test_malformed_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            JsonFileLedgerStore::new(&path).load(),
            Err(LedgerError::Malformed(_))
        ));
    }
}
