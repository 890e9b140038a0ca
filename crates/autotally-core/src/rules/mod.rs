//! Indian GST bookkeeping rules applied to extracted records.
//!
//! Nothing here talks to the extraction engine. These functions tidy and
//! cross-check what the engine returned; problems become warnings on the
//! result. Only amounts too large to total are rejected.

pub mod classify;
pub mod gstin;
pub mod tax;

pub use classify::{classify_text, classify_value};
pub use gstin::{validate_gstin, GstinIssue};
pub use tax::apply_invoice_rules;
