//! GST split and totals for extracted invoices.

use rust_decimal::Decimal;
use tracing::debug;

use super::gstin::{normalize_gstin, state_code, validate_gstin};
use crate::error::ExtractionError;
use crate::models::invoice::{InvoiceData, TaxSummary};

/// GST slabs in use. Anything else is flagged for review.
const KNOWN_RATES: &[Decimal] = &[
    Decimal::ZERO,
    Decimal::from_parts(1, 0, 0, false, 1),   // 0.1
    Decimal::from_parts(25, 0, 0, false, 2),  // 0.25
    Decimal::from_parts(15, 0, 0, false, 1),  // 1.5
    Decimal::from_parts(3, 0, 0, false, 0),
    Decimal::from_parts(5, 0, 0, false, 0),
    Decimal::from_parts(12, 0, 0, false, 0),
    Decimal::from_parts(18, 0, 0, false, 0),
    Decimal::from_parts(28, 0, 0, false, 0),
    Decimal::from_parts(40, 0, 0, false, 0),
];

/// Round-off above one rupee usually means a misread total.
const ROUND_OFF_TOLERANCE: Decimal = Decimal::ONE;

/// Number line items, split GST, compute totals and collect review warnings.
///
/// The printed grand total is authoritative: the difference to the computed
/// total is recorded as round-off rather than corrected. Amounts whose tax or
/// totals do not fit a `Decimal` reject the whole record.
pub fn apply_invoice_rules(invoice: &mut InvoiceData) -> Result<Vec<String>, ExtractionError> {
    let mut warnings = Vec::new();

    invoice.supplier_gstin = normalize_gstin(&invoice.supplier_gstin);
    invoice.buyer_gstin = normalize_gstin(&invoice.buyer_gstin);
    for (label, gstin) in [
        ("supplier", &invoice.supplier_gstin),
        ("buyer", &invoice.buyer_gstin),
    ] {
        if gstin.is_empty() {
            continue;
        }
        if let Err(issue) = validate_gstin(gstin) {
            warnings.push(format!("{} GSTIN {}: {}", label, gstin, issue));
        }
    }

    let inter_state = match (
        state_code(&invoice.supplier_gstin),
        state_code(&invoice.buyer_gstin),
    ) {
        (Some(supplier), Some(buyer)) => supplier != buyer,
        // Unregistered buyers are billed as intra-state supplies.
        _ => false,
    };

    let mut summary = TaxSummary {
        inter_state,
        ..TaxSummary::default()
    };

    for (idx, item) in invoice.line_items.iter_mut().enumerate() {
        item.ordinal = idx as u32 + 1;

        if !KNOWN_RATES.contains(&item.gst_rate.normalize()) {
            warnings.push(format!(
                "line {}: unusual GST rate {}%",
                item.ordinal,
                item.gst_rate.normalize()
            ));
        }

        let line = item.ordinal;
        let tax = item
            .tax_amount()
            .ok_or_else(|| out_of_range(format!("line {} tax", line)))?;
        summary.taxable_value = add(summary.taxable_value, item.amount, "taxable value")?;
        if inter_state || item.is_igst == Some(true) {
            summary.igst = add(summary.igst, tax, "IGST")?;
        } else {
            let half = tax / Decimal::TWO;
            summary.cgst = add(summary.cgst, half, "CGST")?;
            summary.sgst = add(summary.sgst, half, "SGST")?;
        }
    }

    summary.taxable_value = summary.taxable_value.round_dp(2);
    summary.cgst = summary.cgst.round_dp(2);
    summary.sgst = summary.sgst.round_dp(2);
    summary.igst = summary.igst.round_dp(2);
    summary.computed_total = [summary.cgst, summary.sgst, summary.igst]
        .into_iter()
        .try_fold(summary.taxable_value, |total, part| add(total, part, "computed total"))?;
    summary.grand_total = invoice
        .grand_total
        .map(|total| total.round_dp(2))
        .unwrap_or(summary.computed_total);
    summary.round_off = summary
        .grand_total
        .checked_sub(summary.computed_total)
        .ok_or_else(|| out_of_range("round-off"))?;

    if summary.round_off.abs() > ROUND_OFF_TOLERANCE {
        warnings.push(format!(
            "printed grand total {} differs from computed total {} by {}",
            summary.grand_total, summary.computed_total, summary.round_off
        ));
    }

    debug!(
        "Invoice {}: taxable {} cgst {} sgst {} igst {} total {}",
        invoice.invoice_number,
        summary.taxable_value,
        summary.cgst,
        summary.sgst,
        summary.igst,
        summary.grand_total
    );

    invoice.tax = summary;
    Ok(warnings)
}

fn add(total: Decimal, value: Decimal, what: &str) -> Result<Decimal, ExtractionError> {
    total.checked_add(value).ok_or_else(|| out_of_range(what))
}

fn out_of_range(what: impl std::fmt::Display) -> ExtractionError {
    ExtractionError::Parse(format!("{} is out of range", what))
}
