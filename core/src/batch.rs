//! One day's batch — the fixed execution order of the warehouse load.
//!
//! EXECUTION ORDER (fixed, never reordered):
//!   1. Stage the day's extracts (replace semantics)
//!   2. Reconcile the terminal dimension        (own transaction)
//!   3. Reconcile the passport blacklist        (own transaction; runs
//!      even when terminals failed)
//!   4. Append the day's transaction facts      (own transaction)
//!   5. Build the fraud report — skipped when terminal reconciliation or
//!      the fact append failed, since the rules read both.
//!
//! Days must be processed sequentially, oldest first: fraud windows and
//! the SCD active set depend on the state prior days left behind. A
//! failed entity is logged and left to the caller — never retried here.

use crate::{
    error::EtlResult,
    fraud::FraudEngine,
    passport::PassportBlacklistRecord,
    scd::ScdOutcome,
    store::WarehouseStore,
    terminal::TerminalRecord,
    transaction::TransactionFact,
    types::day_start,
};
use chrono::NaiveDate;

/// Parsed input for one calendar day: full dimension snapshots plus the
/// day's transaction delta.
#[derive(Debug, Clone)]
pub struct DayBatch {
    pub date: NaiveDate,
    pub terminals: Vec<TerminalRecord>,
    pub passports: Vec<PassportBlacklistRecord>,
    pub transactions: Vec<TransactionFact>,
}

/// Per-entity results for one processed day. Committed entities stay
/// committed regardless of what failed after them.
#[derive(Debug)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub terminals: EtlResult<ScdOutcome>,
    pub passports: EtlResult<ScdOutcome>,
    pub facts: EtlResult<usize>,
    /// None when skipped because a dependency failed.
    pub report: Option<EtlResult<usize>>,
}

impl DaySummary {
    pub fn fully_ok(&self) -> bool {
        self.terminals.is_ok()
            && self.passports.is_ok()
            && self.facts.is_ok()
            && matches!(&self.report, Some(Ok(_)))
    }
}

pub struct BatchRunner<'a> {
    store: &'a WarehouseStore,
}

impl<'a> BatchRunner<'a> {
    pub fn new(store: &'a WarehouseStore) -> Self {
        Self { store }
    }

    /// Process one day end to end. The reconciliation timestamp is the
    /// batch date at midnight, so replays of historical days reproduce
    /// the same validity windows.
    pub fn process_day(&self, batch: &DayBatch) -> DaySummary {
        let now = day_start(batch.date);

        let terminals = self.load_terminals(&batch.terminals, batch.date);
        if let Err(e) = &terminals {
            log::error!("terminals reconciliation failed for {}: {e}", batch.date);
        }

        let passports = self.load_passports(&batch.passports, batch.date);
        if let Err(e) = &passports {
            log::error!("passport blacklist reconciliation failed for {}: {e}", batch.date);
        }

        let facts = self.load_facts(&batch.transactions);
        if let Err(e) = &facts {
            log::error!("fact append failed for {}: {e}", batch.date);
        }

        let report = if terminals.is_ok() && facts.is_ok() {
            let result = self.build_report(now);
            if let Err(e) = &result {
                log::error!("fraud report failed for {}: {e}", batch.date);
            }
            Some(result)
        } else {
            log::warn!(
                "fraud report skipped for {}: terminal history or facts unavailable",
                batch.date
            );
            None
        };

        DaySummary {
            date: batch.date,
            terminals,
            passports,
            facts,
            report,
        }
    }

    fn load_terminals(
        &self,
        snapshot: &[TerminalRecord],
        date: NaiveDate,
    ) -> EtlResult<ScdOutcome> {
        self.store.replace_staged_terminals(snapshot)?;
        let staged = self.store.staged_terminals()?;
        let outcome = self.store.reconcile_dimension(&staged, day_start(date))?;
        log::info!(
            "terminals {date}: +{} ~{} -{}",
            outcome.added,
            outcome.changed,
            outcome.removed
        );
        Ok(outcome)
    }

    fn load_passports(
        &self,
        snapshot: &[PassportBlacklistRecord],
        date: NaiveDate,
    ) -> EtlResult<ScdOutcome> {
        self.store.replace_staged_passports(snapshot)?;
        let staged = self.store.staged_passports()?;
        let outcome = self.store.reconcile_dimension(&staged, day_start(date))?;
        log::info!(
            "passport blacklist {date}: +{} ~{} -{}",
            outcome.added,
            outcome.changed,
            outcome.removed
        );
        Ok(outcome)
    }

    fn load_facts(&self, transactions: &[TransactionFact]) -> EtlResult<usize> {
        self.store.replace_staged_transactions(transactions)?;
        let staged = self.store.staged_transactions()?;
        let appended = self.store.append_transactions(&staged)?;
        log::info!("facts: {appended} transactions appended");
        Ok(appended)
    }

    /// Report scope comes from the data, not the wall clock: the latest
    /// transaction day on file. An empty warehouse reports zero events.
    fn build_report(&self, generated_at: chrono::NaiveDateTime) -> EtlResult<usize> {
        match self.store.latest_transaction_day()? {
            Some(day) => FraudEngine::new(self.store).build_report(day, generated_at),
            None => Ok(0),
        }
    }
}
