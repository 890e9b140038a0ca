//! The quota ledger service.
//!
//! One `QuotaLedger` is built at startup and cloned into every request
//! handler. All read-modify-write cycles on the record, including period
//! rollover, happen under a single mutex, so concurrent dispatches cannot
//! both pass the ceiling check on the same headroom.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use super::store::{JsonFileLedgerStore, LedgerRecord, LedgerStore};
use super::{Plan, UsageSnapshot};
use crate::error::{AutoTallyError, Result};
use crate::models::config::{PlanLimits, QuotaConfig};

/// Source of the current billing period key.
pub trait Clock: Send + Sync {
    /// Period key for "now", formatted `YYYY-MM`.
    fn period(&self) -> String;
}

/// Local calendar month.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn period(&self) -> String {
        chrono::Local::now().format("%Y-%m").to_string()
    }
}

/// Shared handle to the process-wide ledger.
#[derive(Clone)]
pub struct QuotaLedger {
    inner: Arc<Inner>,
}

struct Inner {
    store: Box<dyn LedgerStore>,
    clock: Box<dyn Clock>,
    limits: PlanLimits,
    thresholds: Vec<u8>,
    estimate: u64,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    /// Tokens held by reservations whose dispatch has not completed.
    pending: u64,
}

/// Headroom held against the ceiling while one dispatch is in flight.
///
/// Dropping a reservation without committing it releases the hold and leaves
/// recorded usage untouched.
#[must_use = "dropping a reservation releases it immediately"]
pub struct Reservation {
    ledger: QuotaLedger,
    amount: u64,
    released: bool,
}

impl Reservation {
    pub fn amount(&self) -> u64 {
        self.amount
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.released {
            let mut state = self.ledger.lock();
            state.pending = state.pending.saturating_sub(self.amount);
            debug!("Released uncommitted reservation of {} tokens", self.amount);
        }
    }
}

impl QuotaLedger {
    pub fn new(
        store: impl LedgerStore + 'static,
        clock: impl Clock + 'static,
        config: &QuotaConfig,
    ) -> Self {
        let mut thresholds = config.notify_thresholds.clone();
        thresholds.sort_unstable();
        thresholds.dedup();

        Self {
            inner: Arc::new(Inner {
                store: Box::new(store),
                clock: Box::new(clock),
                limits: config.limits,
                thresholds,
                estimate: config.reservation_estimate,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Ledger persisted at `config.ledger_path`, periods from the local calendar.
    pub fn open(config: &QuotaConfig) -> Self {
        Self::new(
            JsonFileLedgerStore::new(&config.ledger_path),
            SystemClock,
            config,
        )
    }

    /// Current usage, rolling the period over first if needed.
    pub fn snapshot(&self) -> Result<UsageSnapshot> {
        let _state = self.lock();
        let record = self.load_current()?;
        Ok(self.build_snapshot(&record, None))
    }

    /// Hold headroom for one dispatch.
    ///
    /// Refuses with `QuotaExceeded` when recorded usage has reached the
    /// ceiling, and with the retryable `QuotaBusy` when the remaining
    /// headroom is only held by dispatches still in flight.
    pub fn check_and_reserve(&self) -> Result<Reservation> {
        let mut state = self.lock();
        let record = self.load_current()?;
        let limit = self.inner.limits.limit_for(record.plan);

        if record.used >= limit {
            info!("Quota exhausted: {} used of {} ({})", record.used, limit, record.plan);
            return Err(AutoTallyError::QuotaExceeded {
                used: record.used,
                limit,
                plan: record.plan,
            });
        }
        if record.used.saturating_add(state.pending) >= limit {
            debug!(
                "Quota headroom held in flight: {} used + {} pending of {}",
                record.used, state.pending, limit
            );
            return Err(AutoTallyError::QuotaBusy {
                used: record.used,
                pending: state.pending,
                limit,
            });
        }

        let amount = self.inner.estimate.min(limit - record.used - state.pending);
        state.pending += amount;
        debug!("Reserved {} tokens ({} pending)", amount, state.pending);

        Ok(Reservation {
            ledger: self.clone(),
            amount,
            released: false,
        })
    }

    /// Record the tokens a completed dispatch actually used.
    pub fn commit_usage(&self, mut reservation: Reservation, tokens: u64) -> Result<UsageSnapshot> {
        reservation.released = true;

        let mut state = self.lock();
        state.pending = state.pending.saturating_sub(reservation.amount);

        let mut record = self.load_current()?;
        record.used = record.used.saturating_add(tokens);

        let limit = self.inner.limits.limit_for(record.plan);
        let crossed = self.newly_crossed(&record, limit);
        if let Some(threshold) = crossed {
            record.last_notified_threshold = threshold;
            warn!(
                "Token usage crossed {}% of the {} plan ({}/{})",
                threshold, record.plan, record.used, limit
            );
        }

        self.inner.store.save(&record)?;
        debug!("Committed {} tokens, {} used this period", tokens, record.used);
        Ok(self.build_snapshot(&record, crossed))
    }

    /// Administrative: change the plan. Usage is kept.
    pub fn set_plan(&self, plan: Plan) -> Result<UsageSnapshot> {
        let _state = self.lock();
        let mut record = self.load_current()?;
        record.plan = plan;
        // Thresholds are relative to the ceiling, which just changed.
        record.last_notified_threshold = 0;
        self.inner.store.save(&record)?;
        info!("Plan set to {}", plan);
        Ok(self.build_snapshot(&record, None))
    }

    /// Administrative: zero usage for the current period.
    pub fn reset_usage(&self) -> Result<UsageSnapshot> {
        let _state = self.lock();
        let mut record = self.load_current()?;
        record.used = 0;
        record.last_notified_threshold = 0;
        self.inner.store.save(&record)?;
        info!("Usage reset for period {}", record.reset_date);
        Ok(self.build_snapshot(&record, None))
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load the record and apply period rollover. Caller holds the lock.
    fn load_current(&self) -> Result<LedgerRecord> {
        let period = self.inner.clock.period();
        let mut record = match self.inner.store.load()? {
            Some(record) => record,
            None => {
                let record = LedgerRecord {
                    reset_date: period.clone(),
                    ..LedgerRecord::default()
                };
                self.inner.store.save(&record)?;
                return Ok(record);
            }
        };

        if record.reset_date != period {
            info!(
                "Billing period rolled over from {} to {}, resetting {} used tokens",
                record.reset_date, period, record.used
            );
            record.used = 0;
            record.last_notified_threshold = 0;
            record.reset_date = period;
            self.inner.store.save(&record)?;
        }
        Ok(record)
    }

    fn newly_crossed(&self, record: &LedgerRecord, limit: u64) -> Option<u8> {
        let percent = if limit == 0 {
            100
        } else {
            record.used.saturating_mul(100) / limit
        };
        self.inner
            .thresholds
            .iter()
            .rev()
            .find(|t| percent >= u64::from(**t))
            .copied()
            .filter(|t| *t > record.last_notified_threshold)
    }

    fn build_snapshot(&self, record: &LedgerRecord, crossed: Option<u8>) -> UsageSnapshot {
        let limit = self.inner.limits.limit_for(record.plan);
        UsageSnapshot {
            used: record.used,
            limit,
            plan: record.plan,
            period: record.reset_date.clone(),
            remaining: limit.saturating_sub(record.used),
            threshold_crossed: crossed,
        }
    }
}
