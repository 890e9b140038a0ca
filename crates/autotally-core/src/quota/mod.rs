//! Token quota accounting per billing period.

mod ledger;
mod store;

pub use ledger::{Clock, QuotaLedger, Reservation, SystemClock};
pub use store::{JsonFileLedgerStore, LedgerRecord, LedgerStore, MemoryLedgerStore};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Subscription plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Plan {
    #[default]
    Bronze,
    Gold,
    Platinum,
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Plan::Bronze => "Bronze",
            Plan::Gold => "Gold",
            Plan::Platinum => "Platinum",
        };
        f.write_str(name)
    }
}

impl FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bronze" => Ok(Plan::Bronze),
            "gold" => Ok(Plan::Gold),
            "platinum" => Ok(Plan::Platinum),
            other => Err(format!("unknown plan '{}' (expected bronze, gold or platinum)", other)),
        }
    }
}

/// Point-in-time view of the ledger for the active period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub used: u64,
    pub limit: u64,
    pub plan: Plan,
    /// Billing period key, `YYYY-MM`.
    pub period: String,
    pub remaining: u64,
    /// Usage threshold (percent) newly crossed by the operation that produced
    /// this snapshot. Reported once per threshold per period.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_crossed: Option<u8>,
}

impl UsageSnapshot {
    /// Whole percent of the plan ceiling consumed.
    pub fn percent_used(&self) -> u64 {
        if self.limit == 0 {
            return 100;
        }
        self.used.saturating_mul(100) / self.limit
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_parsing() {
        assert_eq!("GOLD".parse::<Plan>(), Ok(Plan::Gold));
        assert_eq!(" platinum ".parse::<Plan>(), Ok(Plan::Platinum));
        assert!("silver".parse::<Plan>().is_err());
        assert_eq!(serde_json::to_string(&Plan::Bronze).unwrap(), "\"Bronze\"");
    }

    #[test]
    fn test_percent_used() {
        let snapshot = UsageSnapshot {
            used: 37_500,
            limit: 50_000,
            plan: Plan::Bronze,
            period: "2025-08".to_string(),
            remaining: 12_500,
            threshold_crossed: None,
        };
        assert_eq!(snapshot.percent_used(), 75);
        assert!(!snapshot.is_exhausted());
    }
}
