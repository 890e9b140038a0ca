//! Bank statement records as returned by the extraction engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::de::null_as_default;

/// Contra ledger used when the engine could not suggest one.
pub const SUSPENSE_LEDGER: &str = "Suspense A/c";

/// Account number placeholder when the statement does not show one.
pub const UNKNOWN_ACCOUNT: &str = "0000";

/// A bank statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankStatementData {
    /// Bank name plus last four digits of the account, used as the bank ledger.
    #[serde(default, deserialize_with = "null_as_default")]
    pub bank_name: String,

    /// Last four digits of the account number.
    #[serde(default, deserialize_with = "null_as_default")]
    pub account_number: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub transactions: Vec<BankTransaction>,
}

/// One statement row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankTransaction {
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,

    #[serde(default, alias = "narration", deserialize_with = "null_as_default")]
    pub description: String,

    /// Debit amount.
    #[serde(default, alias = "debit", deserialize_with = "null_as_default")]
    pub withdrawal: Decimal,

    /// Credit amount.
    #[serde(default, alias = "credit", deserialize_with = "null_as_default")]
    pub deposit: Decimal,

    /// Running balance after this row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<Decimal>,

    /// Category label inferred from the narration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_ledger: Option<String>,

    /// Ledger to post the other side of the entry to.
    #[serde(default, deserialize_with = "null_as_default")]
    pub contra_ledger: String,

    /// Voucher direction. Recomputed from the amounts after extraction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voucher_type: Option<BankVoucherType>,
}

/// Voucher direction for a bank row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BankVoucherType {
    #[serde(alias = "payment", alias = "PAYMENT")]
    Payment,
    #[serde(alias = "receipt", alias = "RECEIPT")]
    Receipt,
    #[serde(alias = "contra", alias = "CONTRA")]
    Contra,
}

impl BankTransaction {
    /// Voucher direction implied by the amounts. Money out is a payment,
    /// money in is a receipt; an engine-labelled contra (own-account
    /// transfer) is kept.
    pub fn infer_voucher_type(&self) -> BankVoucherType {
        if self.voucher_type == Some(BankVoucherType::Contra) {
            BankVoucherType::Contra
        } else if self.withdrawal > Decimal::ZERO {
            BankVoucherType::Payment
        } else {
            BankVoucherType::Receipt
        }
    }
}

impl BankStatementData {
    /// Fill derived fields: account placeholder, contra ledger and voucher type.
    pub fn normalize(&mut self) {
        if self.account_number.trim().is_empty() {
            self.account_number = UNKNOWN_ACCOUNT.to_string();
        }
        for txn in &mut self.transactions {
            txn.voucher_type = Some(txn.infer_voucher_type());
            if txn.contra_ledger.trim().is_empty() {
                txn.contra_ledger = txn
                    .suggested_ledger
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .unwrap_or(SUSPENSE_LEDGER)
                    .to_string();
            }
        }
    }
}
