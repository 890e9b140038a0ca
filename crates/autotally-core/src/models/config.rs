//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::document::DocumentProfile;
use crate::quota::Plan;

/// Main configuration for the autotally pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoTallyConfig {
    /// PDF processing configuration.
    pub pdf: PdfConfig,

    /// OCR configuration.
    pub ocr: OcrConfig,

    /// Payload bounds per document profile.
    pub payload: PayloadConfig,

    /// Extraction engine configuration.
    pub engine: EngineConfig,

    /// Usage ledger configuration.
    pub quota: QuotaConfig,

    /// Request authentication.
    pub auth: AuthConfig,
}

/// PDF processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// Minimum extracted characters for the text strategy (strictly greater than).
    pub min_text_length: usize,

    /// Render resolution tried first.
    pub high_dpi: u32,

    /// Fallback resolution when a page image exceeds `max_image_bytes`.
    pub low_dpi: u32,

    /// Per-image encoded size ceiling in bytes.
    pub max_image_bytes: usize,

    /// Maximum pages to rasterize (0 = unlimited).
    pub max_pages: usize,

    /// PDFium shared library; unset searches the usual locations.
    pub pdfium_library: Option<PathBuf>,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            min_text_length: 50,
            high_dpi: 150,
            low_dpi: 100,
            max_image_bytes: 3_670_016, // 3.5 MiB
            max_pages: 0,
            pdfium_library: None,
        }
    }
}

/// OCR configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Run OCR on rasterized pages before falling back to sending images.
    pub enabled: bool,

    /// Directory containing `det.onnx`, `latin_rec.onnx` and `latin_dict.txt`.
    pub model_dir: PathBuf,

    /// Keep `[UNK]` markers in recognized text instead of replacing them with spaces.
    pub keep_unk: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_dir: PathBuf::from("models"),
            keep_unk: false,
        }
    }
}

/// Character ceilings for text payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadConfig {
    pub invoice_max_chars: usize,
    pub bank_statement_max_chars: usize,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            invoice_max_chars: 15_000,
            bank_statement_max_chars: 100_000,
        }
    }
}

impl PayloadConfig {
    /// Ceiling for the given profile.
    pub fn max_chars(&self, profile: DocumentProfile) -> usize {
        match profile {
            DocumentProfile::Invoice => self.invoice_max_chars,
            DocumentProfile::BankStatement => self.bank_statement_max_chars,
        }
    }
}

/// Extraction engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Model identifier.
    pub model: String,

    /// Base URL of the generative API.
    pub api_base: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Seconds to wait for a single engine call.
    pub timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Usage ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// JSON file holding the persisted ledger record.
    pub ledger_path: PathBuf,

    /// Monthly token ceilings per plan.
    pub limits: PlanLimits,

    /// Usage percentages that trigger a one-time notification per period.
    pub notify_thresholds: Vec<u8>,

    /// Tokens held against the ceiling while a dispatch is in flight.
    pub reservation_estimate: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from("usage.json"),
            limits: PlanLimits::default(),
            notify_thresholds: vec![50, 75, 100],
            reservation_estimate: 2_000,
        }
    }
}

/// Monthly token ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanLimits {
    pub bronze: u64,
    pub gold: u64,
    pub platinum: u64,
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self {
            bronze: 50_000,
            gold: 100_000,
            platinum: 200_000,
        }
    }
}

impl PlanLimits {
    pub fn limit_for(&self, plan: Plan) -> u64 {
        match plan {
            Plan::Bronze => self.bronze,
            Plan::Gold => self.gold,
            Plan::Platinum => self.platinum,
        }
    }
}

/// Request authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Environment variable holding comma-separated accepted API keys.
    pub api_keys_env: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_keys_env: "BACKEND_API_KEY".to_string(),
        }
    }
}

impl AutoTallyConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}
