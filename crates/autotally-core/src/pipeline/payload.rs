//! Payload bounding: keep text payloads under the engine's practical budget.
//!
//! Parties, document numbers and totals sit at the top of invoices and
//! statements, so oversized text is cut from the end. The cut is always
//! recorded.

use serde::Serialize;
use tracing::info;

use crate::models::config::PayloadConfig;
use crate::models::document::{DocumentProfile, ExtractionUnit};

/// Original versus retained length of a text payload, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TruncationInfo {
    pub original_length: usize,
    pub final_length: usize,
    pub truncated: bool,
}

/// Applies the per-profile character ceiling.
#[derive(Debug, Clone, Default)]
pub struct PayloadBounder {
    config: PayloadConfig,
}

impl PayloadBounder {
    pub fn new(config: PayloadConfig) -> Self {
        Self { config }
    }

    /// Bound a unit. Image payloads pass through and report no truncation.
    pub fn bound(
        &self,
        unit: ExtractionUnit,
        profile: DocumentProfile,
    ) -> (ExtractionUnit, Option<TruncationInfo>) {
        match unit {
            ExtractionUnit::Text { content, .. } => {
                let max_chars = self.config.max_chars(profile);
                let (kept, info) = truncate_prefix(&content, max_chars);
                if info.truncated {
                    info!(
                        "Truncated {} text from {} to {} chars",
                        profile, info.original_length, info.final_length
                    );
                }
                (ExtractionUnit::text(kept.to_string()), Some(info))
            }
            images @ ExtractionUnit::Images(_) => (images, None),
        }
    }
}

/// The first `max_chars` characters of `text`, verbatim.
pub fn truncate_prefix(text: &str, max_chars: usize) -> (&str, TruncationInfo) {
    let original_length = text.chars().count();
    if original_length <= max_chars {
        return (
            text,
            TruncationInfo {
                original_length,
                final_length: original_length,
                truncated: false,
            },
        );
    }

    let cut = text
        .char_indices()
        .nth(max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    (
        &text[..cut],
        TruncationInfo {
            original_length,
            final_length: max_chars,
            truncated: true,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_untouched() {
        let (kept, info) = truncate_prefix("Tax Invoice", 100);
        assert_eq!(kept, "Tax Invoice");
        assert!(!info.truncated);
        assert_eq!(info.original_length, info.final_length);
    }

    #[test]
    fn test_keeps_prefix_verbatim() {
        let text = "₹ GSTIN 27ABCDE1234F1Z0 and then a long tail";
        let (kept, info) = truncate_prefix(text, 7);
        assert_eq!(kept, "₹ GSTIN");
        assert!(text.starts_with(kept));
        assert_eq!(
            info,
            TruncationInfo {
                original_length: text.chars().count(),
                final_length: 7,
                truncated: true
            }
        );
    }

    #[test]
    fn test_idempotent() {
        let text = "a".repeat(500);
        let (once, _) = truncate_prefix(&text, 120);
        let (twice, info) = truncate_prefix(once, 120);
        assert_eq!(once, twice);
        assert!(!info.truncated);
    }

    #[test]
    fn test_ceiling_depends_on_profile() {
        let bounder = PayloadBounder::new(PayloadConfig {
            invoice_max_chars: 10,
            bank_statement_max_chars: 20,
        });
        let text = "x".repeat(15);

        let (unit, info) = bounder.bound(ExtractionUnit::text(text.clone()), DocumentProfile::Invoice);
        assert_eq!(unit, ExtractionUnit::text("x".repeat(10)));
        assert!(info.unwrap().truncated);

        let (unit, info) = bounder.bound(ExtractionUnit::text(text.clone()), DocumentProfile::BankStatement);
        assert_eq!(unit, ExtractionUnit::text(text));
        assert!(!info.unwrap().truncated);
    }

    #[test]
    fn test_images_pass_through() {
        let (unit, info) = PayloadBounder::default()
            .bound(ExtractionUnit::Images(Vec::new()), DocumentProfile::Invoice);
        assert_eq!(unit, ExtractionUnit::Images(Vec::new()));
        assert_eq!(info, None);
    }
}
