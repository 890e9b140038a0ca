//! Fixed instructions and output schemas per document profile.

use lazy_static::lazy_static;
use serde_json::{json, Value};

use crate::models::document::DocumentProfile;

/// Instruction set sent with every call for one profile.
#[derive(Debug)]
pub struct ProfileInstructions {
    pub system: &'static str,
    pub prompt: &'static str,
    pub schema: Value,
}

const INVOICE_SYSTEM: &str = "\
You are an expert Indian GST invoice accountant extracting data for bookkeeping import.

CLASSIFICATION:
- If the document contains \"GSTIN\" or \"Tax Invoice\", set documentType to INVOICE.
- If the document contains a transaction table with Date, Narration/Description and Withdrawal/Debit columns, set documentType to BANK_STATEMENT.
- Otherwise set documentType to INVALID and leave every other field empty.

EXTRACTION RULES:
1. Dates as DD-MM-YYYY.
2. GST rate per line item is one effective rate. When the document prints split CGST and SGST (or UTGST) rate columns, add them together (9% + 9% = 18).
3. When no rate is printed, derive it from the tax and taxable amounts and round to the nearest slab (0, 0.1, 0.25, 3, 5, 12, 18, 28, 40).
4. amount is the taxable value of the line before tax.
5. grandTotal is the total printed on the document. Copy it exactly, never recompute it.
6. isIGST is true only when the line is taxed as IGST.
7. voucherType is Purchase unless the document is clearly an outward sales invoice.
8. Use empty strings for text fields that are not present. Never invent GSTINs.";

const INVOICE_PROMPT: &str = "Extract this invoice for bookkeeping import.";

const BANK_SYSTEM: &str = "\
You are a bank reconciliation expert extracting statement rows for bookkeeping import.

CLASSIFICATION:
- Set documentType to BANK_STATEMENT for account statements and passbooks.
- If the document is a GST invoice, set documentType to INVOICE.
- Otherwise set documentType to INVALID.

FORMAT:
- bankName: full bank name followed by \" - \" and the last 4 digits of the account number.
- accountNumber: last 4 digits of the account number.
- transactions: every row in order, with date (DD-MM-YYYY), description (full narration), withdrawal, deposit and balance.
- A row has either a withdrawal or a deposit; the other is 0.
- suggestedLedger: a ledger name guessed from the narration (e.g. SWIGGY -> Staff Welfare, salary credit -> Salary).
- voucherType: Contra only for transfers between the holder's own accounts, otherwise omit it.";

const BANK_PROMPT: &str = "Extract all transactions from this bank statement.";

lazy_static! {
    static ref INVOICE: ProfileInstructions = ProfileInstructions {
        system: INVOICE_SYSTEM,
        prompt: INVOICE_PROMPT,
        schema: json!({
            "type": "OBJECT",
            "properties": {
                "documentType": {"type": "STRING", "enum": ["INVOICE", "BANK_STATEMENT", "INVALID"]},
                "supplierName": {"type": "STRING"},
                "supplierGstin": {"type": "STRING"},
                "buyerName": {"type": "STRING"},
                "buyerGstin": {"type": "STRING"},
                "invoiceNumber": {"type": "STRING"},
                "invoiceDate": {"type": "STRING"},
                "voucherType": {"type": "STRING", "enum": ["Sales", "Purchase"]},
                "grandTotal": {"type": "NUMBER"},
                "lineItems": {
                    "type": "ARRAY",
                    "items": {
                        "type": "OBJECT",
                        "properties": {
                            "description": {"type": "STRING"},
                            "hsn": {"type": "STRING"},
                            "quantity": {"type": "NUMBER"},
                            "rate": {"type": "NUMBER"},
                            "amount": {"type": "NUMBER"},
                            "gstRate": {"type": "NUMBER"},
                            "unit": {"type": "STRING"},
                            "isIGST": {"type": "BOOLEAN"}
                        }
                    }
                }
            },
            "required": ["documentType"]
        }),
    };

    static ref BANK_STATEMENT: ProfileInstructions = ProfileInstructions {
        system: BANK_SYSTEM,
        prompt: BANK_PROMPT,
        schema: json!({
            "type": "OBJECT",
            "properties": {
                "documentType": {"type": "STRING", "enum": ["INVOICE", "BANK_STATEMENT", "INVALID"]},
                "bankName": {"type": "STRING"},
                "accountNumber": {"type": "STRING"},
                "transactions": {
                    "type": "ARRAY",
                    "items": {
                        "type": "OBJECT",
                        "properties": {
                            "date": {"type": "STRING"},
                            "description": {"type": "STRING"},
                            "withdrawal": {"type": "NUMBER"},
                            "deposit": {"type": "NUMBER"},
                            "balance": {"type": "NUMBER"},
                            "suggestedLedger": {"type": "STRING"},
                            "voucherType": {"type": "STRING", "enum": ["Payment", "Receipt", "Contra"]}
                        }
                    }
                }
            },
            "required": ["documentType"]
        }),
    };
}

/// Instructions for `profile`.
pub fn for_profile(profile: DocumentProfile) -> &'static ProfileInstructions {
    match profile {
        DocumentProfile::Invoice => &*INVOICE,
        DocumentProfile::BankStatement => &*BANK_STATEMENT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schemas_describe_their_arrays() {
        let invoice = &for_profile(DocumentProfile::Invoice).schema;
        assert_eq!(invoice["properties"]["lineItems"]["type"], "ARRAY");
        assert!(invoice["properties"]["transactions"].is_null());

        let bank = &for_profile(DocumentProfile::BankStatement).schema;
        assert_eq!(bank["properties"]["transactions"]["type"], "ARRAY");
    }

    #[test]
    fn test_invoice_instructions_carry_reconciliation_rules() {
        let system = for_profile(DocumentProfile::Invoice).system;
        assert!(system.contains("add them together"));
        assert!(system.contains("never recompute"));
    }
}
