//! CLI subcommands and the setup they share.

pub mod batch;
pub mod config;
pub mod process;
pub mod usage;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::ValueEnum;
use tracing::debug;

use autotally_core::models::config::AutoTallyConfig;
use autotally_core::{
    DocumentProcessor, DocumentProfile, GeminiEngine, JsonDirStore, QuotaLedger, RawDocument,
};

/// Schema profile selected on the command line.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum ProfileArg {
    /// GST invoice
    #[default]
    Invoice,
    /// Bank statement or passbook
    BankStatement,
}

impl From<ProfileArg> for DocumentProfile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Invoice => DocumentProfile::Invoice,
            ProfileArg::BankStatement => DocumentProfile::BankStatement,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("autotally")
        .join("config.json")
}

/// The config named on the command line, else the default file, else defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<AutoTallyConfig> {
    let mut config = match config_path {
        Some(path) => AutoTallyConfig::from_file(Path::new(path))?,
        None => {
            let path = default_config_path();
            if path.exists() {
                AutoTallyConfig::from_file(&path)?
            } else {
                AutoTallyConfig::default()
            }
        }
    };

    // A relative ledger path lives in the per-user data directory.
    if config.quota.ledger_path.is_relative() {
        if let Some(data_dir) = dirs::data_local_dir() {
            config.quota.ledger_path = data_dir.join("autotally").join(&config.quota.ledger_path);
        }
    }
    debug!("Usage ledger at {}", config.quota.ledger_path.display());
    Ok(config)
}

/// Processor wired to the configured engine, ledger and optional store.
pub fn build_processor(
    config: &AutoTallyConfig,
    store_dir: Option<&Path>,
) -> anyhow::Result<DocumentProcessor> {
    let engine = GeminiEngine::from_env(&config.engine)?;
    let ledger = QuotaLedger::open(&config.quota);
    let mut processor = DocumentProcessor::new(config, Arc::new(engine), ledger);
    if let Some(dir) = store_dir {
        processor = processor.with_store(Arc::new(JsonDirStore::open(dir)?));
    }
    Ok(processor)
}

/// Read a file into a raw document, naming it and guessing its media type.
pub fn read_document(path: &Path, password: Option<&str>) -> anyhow::Result<RawDocument> {
    let bytes = std::fs::read(path)?;
    let mut document = RawDocument::new(bytes);

    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        document = document.with_name(name);
    }
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    let media_type = match extension.as_str() {
        "pdf" => Some("application/pdf"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "tif" | "tiff" => Some("image/tiff"),
        "bmp" => Some("image/bmp"),
        "tga" => Some("image/x-tga"),
        _ => None,
    };
    if let Some(media_type) = media_type {
        document = document.with_media_type(media_type);
    }
    if let Some(password) = password {
        document = document.with_password(password);
    }
    Ok(document)
}
