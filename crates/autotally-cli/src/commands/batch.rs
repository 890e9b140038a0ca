//! Batch processing command for multiple documents.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use autotally_core::{BulkOrchestrator, BulkResult, ItemOutcome, ProcessOptions};

use super::process::{format_document, report_threshold, OutputFormat};
use super::{build_processor, load_config, read_document, ProfileArg};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input files or glob pattern
    #[arg(required = true)]
    input: String,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Document profile to extract with
    #[arg(short, long, value_enum, default_value = "invoice")]
    profile: ProfileArg,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// The documents are known not to be password-protected
    #[arg(long)]
    not_encrypted: bool,

    /// Directory of processed documents, used to skip duplicates
    #[arg(long)]
    store: Option<PathBuf>,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    // Expand glob pattern, in a stable order
    let mut files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| {
            let ext = p.extension().and_then(|e| e.to_str()).unwrap_or("");
            matches!(
                ext.to_lowercase().as_str(),
                "pdf" | "png" | "jpg" | "jpeg" | "webp" | "tif" | "tiff" | "bmp" | "tga"
            )
        })
        .collect();
    files.sort();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    eprintln!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    // Create output directory if specified
    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let documents = files
        .iter()
        .map(|path| read_document(path, None))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let processor = build_processor(&config, args.store.as_deref())?;
    let bulk = BulkOrchestrator::new(Arc::new(processor));
    let options = ProcessOptions {
        profile: args.profile.into(),
        confirmed_unencrypted: args.not_encrypted,
    };

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}")?
            .progress_chars("=>-"),
    );

    let result = bulk
        .run_with_progress(documents, &options, |item| {
            if let ItemOutcome::Success(processed) = &item.outcome {
                report_threshold(&processed.usage);
            }
            pb.set_message(item.name.clone().unwrap_or_default());
            pb.inc(1);
        })
        .await;
    pb.finish_and_clear();

    // Write outputs
    if let Some(output_dir) = &args.output_dir {
        for item in &result.items {
            if let ItemOutcome::Success(processed) = &item.outcome {
                let output_name = Path::new(&files[item.index])
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("output");
                let output_path = output_dir.join(format!("{}.{}", output_name, args.format.extension()));
                fs::write(&output_path, format_document(processed, args.format)?)?;
                debug!("Wrote output to {}", output_path.display());
            }
        }
    }

    // Generate summary if requested
    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &files, &result)?;
        eprintln!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    // Print summary
    eprintln!();
    eprintln!(
        "{} Processed {} of {} files in {:?}",
        style("✓").green(),
        result.items.len(),
        files.len(),
        start.elapsed()
    );
    eprintln!(
        "   {} successful, {} failed",
        style(result.successful).green(),
        style(result.failed).red()
    );

    if result.failed > 0 {
        eprintln!();
        eprintln!("{}", style("Failed files:").red());
        for item in &result.items {
            if let ItemOutcome::Failure(error) = &item.outcome {
                eprintln!("  - {}: {}", files[item.index].display(), error.message);
            }
        }
    }

    if let Some(error) = &result.aborted_by {
        warn!("Batch aborted with {} files left", result.not_processed);
        anyhow::bail!(
            "Batch stopped early, {} files not processed: {}",
            result.not_processed,
            error.message
        );
    }

    Ok(())
}

fn write_summary(path: &Path, files: &[PathBuf], result: &BulkResult) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "file",
        "status",
        "document_type",
        "strategy",
        "tokens",
        "error_kind",
        "error",
    ])?;

    for item in &result.items {
        let file = files[item.index].display().to_string();
        match &item.outcome {
            ItemOutcome::Success(processed) => wtr.write_record([
                file,
                "success".to_string(),
                processed.schema.document_type().as_str().to_string(),
                processed.metadata.strategy.to_string(),
                processed.metadata.token_usage.to_string(),
                String::new(),
                String::new(),
            ])?,
            ItemOutcome::Failure(error) => wtr.write_record([
                file,
                "failure".to_string(),
                String::new(),
                String::new(),
                String::new(),
                format!("{:?}", error.kind),
                error.message.clone(),
            ])?,
        }
    }

    // Files the batch never reached
    for path in files.iter().skip(result.items.len()) {
        wtr.write_record([
            path.display().to_string(),
            "not_processed".to_string(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
