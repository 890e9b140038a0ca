//! GST invoice records as returned by the extraction engine, plus the tax
//! summary computed locally for bookkeeping import.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::de::null_as_default;

/// A GST invoice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceData {
    /// Supplier (seller) legal name.
    #[serde(default, deserialize_with = "null_as_default")]
    pub supplier_name: String,

    /// Supplier GSTIN (15 characters).
    #[serde(default, deserialize_with = "null_as_default")]
    pub supplier_gstin: String,

    /// Buyer legal name.
    #[serde(default, deserialize_with = "null_as_default")]
    pub buyer_name: String,

    /// Buyer GSTIN, empty for unregistered buyers.
    #[serde(default, deserialize_with = "null_as_default")]
    pub buyer_gstin: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub invoice_number: String,

    /// Invoice date as printed (the instructions ask for DD-MM-YYYY).
    #[serde(default, deserialize_with = "null_as_default")]
    pub invoice_date: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub voucher_type: InvoiceVoucherType,

    #[serde(default, deserialize_with = "null_as_default")]
    pub line_items: Vec<LineItem>,

    /// Grand total printed on the document. Authoritative over recomputed sums.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grand_total: Option<Decimal>,

    /// Totals computed locally from the line items.
    #[serde(default, skip_deserializing)]
    pub tax: TaxSummary,
}

/// Voucher type in the bookkeeping system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceVoucherType {
    #[serde(alias = "sales", alias = "SALES")]
    Sales,
    #[default]
    #[serde(alias = "purchase", alias = "PURCHASE")]
    Purchase,
}

/// A single line item on the invoice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    /// Position on the invoice, assigned after extraction (1-indexed).
    #[serde(default, skip_deserializing)]
    pub ordinal: u32,

    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,

    /// HSN/SAC code.
    #[serde(default, deserialize_with = "null_as_default")]
    pub hsn: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub quantity: Decimal,

    /// Unit price before tax.
    #[serde(default, deserialize_with = "null_as_default")]
    pub rate: Decimal,

    /// Taxable value of the line.
    #[serde(default, deserialize_with = "null_as_default")]
    pub amount: Decimal,

    /// Effective GST rate in percent (split CGST+SGST columns already summed).
    #[serde(default, alias = "taxRate", deserialize_with = "null_as_default")]
    pub gst_rate: Decimal,

    /// Unit of measure (Nos, Kg, Box, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// Force IGST for this line even when both GSTINs are in the same state.
    #[serde(default, rename = "isIGST", skip_serializing_if = "Option::is_none")]
    pub is_igst: Option<bool>,
}

impl LineItem {
    /// Tax on this line at its effective rate, `None` when it does not fit a `Decimal`.
    pub fn tax_amount(&self) -> Option<Decimal> {
        self.amount
            .checked_mul(self.gst_rate)?
            .checked_div(Decimal::ONE_HUNDRED)
    }
}

/// Locally computed totals for an invoice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxSummary {
    /// Sum of line amounts.
    pub taxable_value: Decimal,
    pub cgst: Decimal,
    pub sgst: Decimal,
    pub igst: Decimal,
    /// Taxable value plus all tax components.
    pub computed_total: Decimal,
    /// Printed grand total when present, otherwise the computed total.
    pub grand_total: Decimal,
    /// `grand_total - computed_total`.
    pub round_off: Decimal,
    /// Whether the supply was treated as inter-state.
    pub inter_state: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_line_item_defaults_for_nulls() {
        let item: LineItem = serde_json::from_str(
            r#"{"description":"Laptop","hsn":null,"quantity":1,"rate":45000,"amount":45000,"gstRate":null}"#,
        )
        .unwrap();
        assert_eq!(item.hsn, "");
        assert_eq!(item.gst_rate, Decimal::ZERO);
        assert_eq!(item.amount, dec("45000"));
    }

    #[test]
    fn test_line_item_tax_amount() {
        let item = LineItem {
            amount: dec("45000"),
            gst_rate: dec("12"),
            ..LineItem::default()
        };
        assert_eq!(item.tax_amount(), Some(dec("5400")));
    }

    #[test]
    fn test_line_item_tax_amount_overflow() {
        let item = LineItem {
            amount: dec("50000000000000000000000000000"),
            gst_rate: dec("18"),
            ..LineItem::default()
        };
        assert_eq!(item.tax_amount(), None);
    }

    #[test]
    fn test_invoice_accepts_tax_rate_alias_and_igst_flag() {
        let invoice: InvoiceData = serde_json::from_str(
            r#"{"supplierName":"Tech Solutions Pvt Ltd","lineItems":[{"description":"Mouse","amount":9000,"taxRate":18,"isIGST":true}]}"#,
        )
        .unwrap();
        assert_eq!(invoice.voucher_type, InvoiceVoucherType::Purchase);
        assert_eq!(invoice.line_items[0].gst_rate, dec("18"));
        assert_eq!(invoice.line_items[0].is_igst, Some(true));
        assert_eq!(invoice.grand_total, None);
    }
}
