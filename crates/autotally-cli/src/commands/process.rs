//! Process command - extract data from a single document.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use autotally_core::models::bank::BankStatementData;
use autotally_core::models::invoice::InvoiceData;
use autotally_core::{AutoTallyError, DocumentSchema, PasswordHint, ProcessOptions, ProcessedDocument, UsageSnapshot};

use super::{build_processor, load_config, read_document, ProfileArg};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input file (PDF or image)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Document profile to extract with
    #[arg(short, long, value_enum, default_value = "invoice")]
    profile: ProfileArg,

    /// Password for an encrypted PDF
    #[arg(long)]
    password: Option<String>,

    /// The document is known not to be password-protected
    #[arg(long)]
    not_encrypted: bool,

    /// Directory of processed documents, used to skip duplicates
    #[arg(long)]
    store: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output, one row per line item or transaction
    Csv,
    /// Plain text summary
    Text,
    /// XML output
    Xml,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
            OutputFormat::Xml => "xml",
        }
    }
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    // Check input file exists
    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let processor = build_processor(&config, args.store.as_deref())?;
    let document = read_document(&args.input, args.password.as_deref())?;
    let options = ProcessOptions {
        profile: args.profile.into(),
        confirmed_unencrypted: args.not_encrypted,
    };

    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(format!("Extracting {}...", options.profile));

    let result = processor.process(document, &options).await;
    pb.finish_and_clear();

    let processed = match result {
        Ok(processed) => processed,
        Err(e) => return Err(explain(e)),
    };

    let output = format_document(&processed, args.format)?;

    // Write output
    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        eprintln!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    for warning in &processed.metadata.warnings {
        eprintln!("{} {}", style("!").yellow(), warning);
    }
    report_threshold(&processed.usage);

    debug!("Total processing time: {:?}", start.elapsed());
    Ok(())
}

/// Turn pipeline errors into messages that say what to do next.
fn explain(err: AutoTallyError) -> anyhow::Error {
    let hint = match &err {
        AutoTallyError::PasswordRequired {
            hint: PasswordHint::Suspected,
        } => Some("Re-run with --password, or with --not-encrypted if the file is not protected."),
        AutoTallyError::PasswordRequired { .. } => Some("Re-run with --password."),
        AutoTallyError::QuotaExceeded { .. } => {
            Some("Upgrade with 'autotally usage set-plan <plan>' or wait for the next month.")
        }
        e if e.is_retryable() => Some("The request may succeed if retried later."),
        _ => None,
    };
    match hint {
        Some(hint) => anyhow::anyhow!("{}\n{}", err, hint),
        None => err.into(),
    }
}

/// Print a one-time notice when usage crossed a notification threshold.
pub fn report_threshold(usage: &UsageSnapshot) {
    if let Some(threshold) = usage.threshold_crossed {
        let message = format!(
            "Token usage reached {}% of the {} plan ({}/{})",
            threshold, usage.plan, usage.used, usage.limit
        );
        let styled = if threshold >= 100 {
            style(message).red()
        } else {
            style(message).yellow()
        };
        eprintln!("{} {}", style("!").yellow(), styled);
    }
}

pub fn format_document(processed: &ProcessedDocument, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(processed)?),
        OutputFormat::Csv => format_csv(&processed.schema),
        OutputFormat::Text => Ok(format_text(processed)),
        OutputFormat::Xml => Ok(quick_xml::se::to_string_with_root("document", &processed.schema)?),
    }
}

fn format_csv(schema: &DocumentSchema) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    match schema {
        DocumentSchema::Invoice(invoice) => write_invoice_rows(&mut wtr, invoice)?,
        DocumentSchema::BankStatement(statement) => write_bank_rows(&mut wtr, statement)?,
        DocumentSchema::Invalid => anyhow::bail!("Nothing to export for an unrecognized document"),
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn write_invoice_rows(wtr: &mut csv::Writer<Vec<u8>>, invoice: &InvoiceData) -> anyhow::Result<()> {
    wtr.write_record([
        "invoice_number",
        "invoice_date",
        "supplier_name",
        "supplier_gstin",
        "buyer_name",
        "buyer_gstin",
        "line",
        "description",
        "hsn",
        "quantity",
        "rate",
        "amount",
        "gst_rate",
        "tax",
        "grand_total",
    ])?;

    for item in &invoice.line_items {
        wtr.write_record([
            invoice.invoice_number.clone(),
            invoice.invoice_date.clone(),
            invoice.supplier_name.clone(),
            invoice.supplier_gstin.clone(),
            invoice.buyer_name.clone(),
            invoice.buyer_gstin.clone(),
            item.ordinal.to_string(),
            item.description.clone(),
            item.hsn.clone(),
            item.quantity.to_string(),
            item.rate.to_string(),
            item.amount.to_string(),
            item.gst_rate.to_string(),
            item.tax_amount().round_dp(2).to_string(),
            invoice.tax.grand_total.to_string(),
        ])?;
    }
    Ok(())
}

fn write_bank_rows(wtr: &mut csv::Writer<Vec<u8>>, statement: &BankStatementData) -> anyhow::Result<()> {
    wtr.write_record([
        "bank",
        "account",
        "date",
        "description",
        "withdrawal",
        "deposit",
        "balance",
        "voucher_type",
        "contra_ledger",
    ])?;

    for txn in &statement.transactions {
        wtr.write_record([
            statement.bank_name.clone(),
            statement.account_number.clone(),
            txn.date.clone(),
            txn.description.clone(),
            txn.withdrawal.to_string(),
            txn.deposit.to_string(),
            txn.balance.map(|b| b.to_string()).unwrap_or_default(),
            txn.voucher_type.map(|v| format!("{:?}", v)).unwrap_or_default(),
            txn.contra_ledger.clone(),
        ])?;
    }
    Ok(())
}

fn format_text(processed: &ProcessedDocument) -> String {
    let mut output = match &processed.schema {
        DocumentSchema::Invoice(invoice) => invoice_text(invoice),
        DocumentSchema::BankStatement(statement) => statement_text(statement),
        DocumentSchema::Invalid => "Document not recognized\n".to_string(),
    };

    let meta = &processed.metadata;
    output.push('\n');
    output.push_str(&format!("Strategy: {} ({} pages)\n", meta.strategy, meta.page_count));
    if let Some(truncation) = meta.truncation.filter(|t| t.truncated) {
        output.push_str(&format!(
            "Text truncated: {} of {} characters sent\n",
            truncation.final_length, truncation.original_length
        ));
    }
    output.push_str(&format!(
        "Tokens: {} ({} of {} used this month)\n",
        meta.token_usage, processed.usage.used, processed.usage.limit
    ));
    output
}

fn invoice_text(invoice: &InvoiceData) -> String {
    let mut output = String::new();

    output.push_str(&format!("Invoice: {}\n", invoice.invoice_number));
    output.push_str(&format!("Date: {}\n", invoice.invoice_date));
    output.push_str(&format!("Voucher: {:?}\n", invoice.voucher_type));
    output.push('\n');

    output.push_str("Supplier:\n");
    output.push_str(&format!("  {}\n", invoice.supplier_name));
    if !invoice.supplier_gstin.is_empty() {
        output.push_str(&format!("  GSTIN: {}\n", invoice.supplier_gstin));
    }
    output.push('\n');

    output.push_str("Buyer:\n");
    output.push_str(&format!("  {}\n", invoice.buyer_name));
    if !invoice.buyer_gstin.is_empty() {
        output.push_str(&format!("  GSTIN: {}\n", invoice.buyer_gstin));
    }
    output.push('\n');

    output.push_str("Items:\n");
    for item in &invoice.line_items {
        output.push_str(&format!(
            "  {}. {}  {} @ {}% GST\n",
            item.ordinal, item.description, item.amount, item.gst_rate
        ));
    }
    output.push('\n');

    let tax = &invoice.tax;
    output.push_str("Summary:\n");
    output.push_str(&format!("  Taxable: {}\n", tax.taxable_value));
    if tax.inter_state {
        output.push_str(&format!("  IGST:    {}\n", tax.igst));
    } else {
        output.push_str(&format!("  CGST:    {}\n", tax.cgst));
        output.push_str(&format!("  SGST:    {}\n", tax.sgst));
    }
    if !tax.round_off.is_zero() {
        output.push_str(&format!("  Round off: {}\n", tax.round_off));
    }
    output.push_str(&format!("  Total:   {}\n", tax.grand_total));

    output
}

fn statement_text(statement: &BankStatementData) -> String {
    let mut output = String::new();

    output.push_str(&format!("Bank: {}\n", statement.bank_name));
    output.push_str(&format!("Account: {}\n", statement.account_number));
    output.push_str(&format!("Transactions: {}\n\n", statement.transactions.len()));

    for txn in &statement.transactions {
        let (direction, amount) = if txn.withdrawal.is_zero() {
            ("CR", txn.deposit)
        } else {
            ("DR", txn.withdrawal)
        };
        output.push_str(&format!(
            "  {}  {} {:>12}  {} -> {}\n",
            txn.date, direction, amount, txn.description, txn.contra_ledger
        ));
    }

    output
}
