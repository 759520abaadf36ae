//! Fraud rule engine — classifies the report day's transactions against
//! four independent predicates and appends the flagged ones to the report
//! sink.
//!
//! Each rule contributes one bit to a per-transaction mask, OR-combined:
//!   bit 0 — blacklisted or expired passport
//!   bit 1 — expired account contract
//!   bit 2 — operations in more than one city within an hour
//!   bit 3 — amount probing: two decreasing rejects then a smaller success
//!
//! The engine only reads reconciled state. The report day is an explicit
//! parameter — callers usually derive it from the latest transaction day,
//! never from the wall clock.

use crate::{
    error::EtlResult,
    passport::PassportBlacklistRecord,
    store::{TransactionContextRow, WarehouseStore},
    transaction::{RESULT_REJECT, RESULT_SUCCESS, TYPE_DEPOSIT},
    types::day_start,
};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

pub const FLAG_PASSPORT: u8 = 1 << 0;
pub const FLAG_CONTRACT: u8 = 1 << 1;
pub const FLAG_GEOGRAPHY: u8 = 1 << 2;
pub const FLAG_PROBING: u8 = 1 << 3;

/// Trailing window for the impossible-geography rule. Also the lead
/// loaded before the report day, so windows that start just after
/// midnight still see their predecessors.
fn city_window() -> Duration {
    Duration::hours(1)
}

/// Maximum span of the three probing transactions.
fn probe_span() -> Duration {
    Duration::minutes(20)
}

/// Comma-joined human-readable description for every set bit.
pub fn describe_flags(flags: u8) -> String {
    let mut parts = Vec::new();
    if flags & FLAG_PASSPORT != 0 {
        parts.push("expired or blacklisted passport");
    }
    if flags & FLAG_CONTRACT != 0 {
        parts.push("expired contract");
    }
    if flags & FLAG_GEOGRAPHY != 0 {
        parts.push("operations in different cities within one hour");
    }
    if flags & FLAG_PROBING != 0 {
        parts.push("amount probing pattern");
    }
    parts.join(", ")
}

/// One detection written to the report sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FraudEvent {
    pub trans_id: String,
    pub event_dt: NaiveDateTime,
    pub passport: Option<String>,
    pub fio: String,
    pub event_type: String,
    pub report_dt: NaiveDateTime,
}

pub struct FraudEngine<'a> {
    store: &'a WarehouseStore,
}

impl<'a> FraudEngine<'a> {
    pub fn new(store: &'a WarehouseStore) -> Self {
        Self { store }
    }

    /// Evaluate all rules for `report_day` and append flagged transactions
    /// to the report. Returns the number of newly written events (re-runs
    /// write nothing thanks to the trans_id key).
    pub fn build_report(
        &self,
        report_day: NaiveDate,
        generated_at: NaiveDateTime,
    ) -> EtlResult<usize> {
        let window_start = day_start(report_day);
        let rows = self
            .store
            .transaction_context_since(window_start - city_window())?;
        let blacklist: Vec<PassportBlacklistRecord> =
            self.store.active_dimension_rows(window_start)?;
        let blacklisted: HashSet<&str> =
            blacklist.iter().map(|b| b.passport_num.as_str()).collect();

        let flags = evaluate(&rows, &blacklisted);

        // Emit events only for the report day itself; the lead hour is
        // window context, not report scope.
        let mut events = Vec::new();
        for (row, &mask) in rows.iter().zip(flags.iter()) {
            if mask == 0 || row.trans_date < window_start {
                continue;
            }
            events.push(FraudEvent {
                trans_id: row.trans_id.clone(),
                event_dt: row.trans_date,
                passport: row.passport_num.clone(),
                fio: row.fio.clone(),
                event_type: describe_flags(mask),
                report_dt: generated_at,
            });
        }

        let written = self.store.insert_fraud_events(&events)?;
        log::info!(
            "fraud report {report_day}: {} rows evaluated, {} flagged, {} new",
            rows.len(),
            events.len(),
            written
        );
        Ok(written)
    }
}

/// Per-row bitmask over the evaluation set. `rows` must be ordered by
/// card then time (the store query guarantees it).
fn evaluate(rows: &[TransactionContextRow], blacklisted: &HashSet<&str>) -> Vec<u8> {
    let mut flags = vec![0u8; rows.len()];

    // Row-local rules: passport and contract validity.
    for (i, row) in rows.iter().enumerate() {
        let day = row.trans_date.date();
        if let Some(passport) = &row.passport_num {
            let expired = row.passport_valid_to.map_or(false, |v| day > v);
            if expired || blacklisted.contains(passport.as_str()) {
                flags[i] |= FLAG_PASSPORT;
            }
        }
        if let Some(valid_to) = row.contract_valid_to {
            if day > valid_to {
                flags[i] |= FLAG_CONTRACT;
            }
        }
    }

    // Sequence rules: per-card windows over the time-ordered rows.
    let mut by_card: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        by_card.entry(row.card_num.as_str()).or_default().push(i);
    }

    for idxs in by_card.values() {
        // Impossible geography: when the trailing hour behind any
        // transaction spans more than one distinct terminal city, every
        // city-bearing transaction in that window is flagged, the earliest
        // included.
        for (pos, &i) in idxs.iter().enumerate() {
            let upper = rows[i].trans_date;
            let lower = upper - city_window();
            let mut cities: HashSet<&str> = HashSet::new();
            let mut members: Vec<usize> = Vec::new();
            for &j in &idxs[..=pos] {
                let other = &rows[j];
                if other.trans_date >= lower && other.trans_date <= upper {
                    if let Some(city) = &other.terminal_city {
                        cities.insert(city.as_str());
                        members.push(j);
                    }
                }
            }
            if cities.len() > 1 {
                for &j in &members {
                    flags[j] |= FLAG_GEOGRAPHY;
                }
            }
        }

        // Probing: three consecutive transactions, strictly decreasing
        // amounts, within 20 minutes, REJECT REJECT SUCCESS, no deposits.
        // The success that finally clears is the flagged one.
        for w in idxs.windows(3) {
            let (a, b, c) = (&rows[w[0]], &rows[w[1]], &rows[w[2]]);
            let decreasing = a.amount > b.amount && b.amount > c.amount;
            let span_ok = c.trans_date - a.trans_date <= probe_span();
            let results_ok = a.oper_result == RESULT_REJECT
                && b.oper_result == RESULT_REJECT
                && c.oper_result == RESULT_SUCCESS;
            let no_deposit = a.oper_type != TYPE_DEPOSIT
                && b.oper_type != TYPE_DEPOSIT
                && c.oper_type != TYPE_DEPOSIT;
            if decreasing && span_ok && results_ok && no_deposit {
                flags[w[2]] |= FLAG_PROBING;
            }
        }
    }

    flags
}
