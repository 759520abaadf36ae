//! End-to-end daily batch tests: multi-day sequencing, per-entity
//! isolation, and report gating.

use cardwatch_core::{
    batch::{BatchRunner, DayBatch},
    error::EtlError,
    passport::PassportBlacklistRecord,
    store::{AccountRow, CardRow, ClientRow, WarehouseStore},
    terminal::TerminalRecord,
    transaction::TransactionFact,
    types::{ts_from_text, Money},
};
use chrono::NaiveDate;

fn store_with_reference() -> WarehouseStore {
    let store = WarehouseStore::in_memory().expect("open in-memory store");
    store.migrate().expect("apply migrations");
    store
        .insert_client(&ClientRow {
            client_id: "C1".to_string(),
            last_name: Some("Petrov".to_string()),
            first_name: Some("Petr".to_string()),
            patronymic: None,
            date_of_birth: None,
            passport_num: Some("4510 111111".to_string()),
            passport_valid_to: Some("2030-01-01".to_string()),
            phone: None,
        })
        .expect("insert client");
    store
        .insert_account(&AccountRow {
            account: "40817810C1".to_string(),
            valid_to: Some("2030-01-01".to_string()),
            client: "C1".to_string(),
        })
        .expect("insert account");
    store
        .insert_card(&CardRow {
            card_num: "2200 1111 1111 1111".to_string(),
            account: "40817810C1".to_string(),
        })
        .expect("insert card");
    store
}

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 3, d).expect("valid test date")
}

fn term(id: &str, city: &str) -> TerminalRecord {
    TerminalRecord {
        terminal_id: id.to_string(),
        terminal_type: Some("POS".to_string()),
        terminal_city: Some(city.to_string()),
        terminal_address: None,
    }
}

fn txn(id: &str, ts: &str, amount: &str, terminal: &str) -> TransactionFact {
    TransactionFact {
        trans_id: id.to_string(),
        trans_date: ts_from_text(ts).expect("valid test timestamp"),
        card_num: "2200 1111 1111 1111".to_string(),
        oper_type: "PAYMENT".to_string(),
        amount: amount.parse::<Money>().expect("valid test amount"),
        oper_result: "SUCCESS".to_string(),
        terminal: terminal.to_string(),
    }
}

fn batch(d: u32, terminals: Vec<TerminalRecord>, transactions: Vec<TransactionFact>) -> DayBatch {
    DayBatch {
        date: date(d),
        terminals,
        passports: Vec::new(),
        transactions,
    }
}

/// A clean day loads every entity and produces a report.
#[test]
fn clean_day_runs_all_entities() {
    let store = store_with_reference();
    let runner = BatchRunner::new(&store);

    let summary = runner.process_day(&batch(
        1,
        vec![term("T1", "Moscow")],
        vec![txn("D1", "2021-03-01 10:00:00", "100,00", "T1")],
    ));

    assert!(summary.fully_ok(), "summary: {summary:?}");
    assert_eq!(summary.terminals.as_ref().map(|o| o.added).ok(), Some(1));
    assert_eq!(summary.facts.as_ref().ok(), Some(&1));
    assert!(matches!(summary.report, Some(Ok(0))));
    assert_eq!(store.transaction_count().expect("count facts"), 1);
}

/// Two sequential days: the second day's terminal change versions the
/// dimension and its facts accumulate on top of the first day's.
#[test]
fn sequential_days_accumulate_history() {
    let store = store_with_reference();
    let runner = BatchRunner::new(&store);

    let day1 = runner.process_day(&batch(
        1,
        vec![term("T1", "Moscow")],
        vec![txn("D1", "2021-03-01 10:00:00", "100,00", "T1")],
    ));
    assert!(day1.fully_ok());

    let day2 = runner.process_day(&batch(
        2,
        vec![term("T1", "Kazan")],
        vec![txn("D2", "2021-03-02 11:00:00", "200,00", "T1")],
    ));
    assert!(day2.fully_ok());
    assert_eq!(day2.terminals.as_ref().map(|o| o.changed).ok(), Some(1));

    let history = store
        .dimension_history::<TerminalRecord>("T1")
        .expect("read history");
    assert_eq!(history.len(), 2);
    assert_eq!(store.transaction_count().expect("count facts"), 2);
}

/// A duplicate transaction id fails the whole fact append, the dimensions
/// still commit, and the report is skipped for the day.
#[test]
fn duplicate_fact_blocks_report_but_not_dimensions() {
    let store = store_with_reference();
    let runner = BatchRunner::new(&store);

    let day1 = runner.process_day(&batch(
        1,
        vec![term("T1", "Moscow")],
        vec![txn("D1", "2021-03-01 10:00:00", "100,00", "T1")],
    ));
    assert!(day1.fully_ok());

    let day2 = runner.process_day(&batch(
        2,
        vec![term("T1", "Kazan")],
        vec![
            txn("D2", "2021-03-02 11:00:00", "200,00", "T1"),
            txn("D1", "2021-03-02 12:00:00", "300,00", "T1"), // replayed id
        ],
    ));

    assert!(!day2.fully_ok());
    assert!(day2.terminals.is_ok());
    assert!(day2.passports.is_ok());
    assert!(matches!(
        day2.facts,
        Err(EtlError::DuplicateTransaction { ref trans_id }) if trans_id == "D1"
    ));
    assert!(day2.report.is_none(), "report must be skipped");

    // The failed append rolled back wholesale: D2 is not in the facts.
    assert_eq!(store.transaction_count().expect("count facts"), 1);
    // The dimension change still landed.
    let history = store
        .dimension_history::<TerminalRecord>("T1")
        .expect("read history");
    assert_eq!(history.len(), 2);
}

/// The passport blacklist loads even on a day whose terminal snapshot is
/// fine, and the fraud engine picks up the new entries the same day.
#[test]
fn blacklist_entries_take_effect_same_day() {
    let store = store_with_reference();
    let runner = BatchRunner::new(&store);

    let day1 = runner.process_day(&batch(
        1,
        vec![term("T1", "Moscow")],
        vec![txn("D1", "2021-03-01 10:00:00", "100,00", "T1")],
    ));
    assert!(day1.fully_ok());

    let mut day2_batch = batch(
        2,
        vec![term("T1", "Moscow")],
        vec![txn("D2", "2021-03-02 11:00:00", "200,00", "T1")],
    );
    day2_batch.passports = vec![PassportBlacklistRecord {
        passport_num: "4510 111111".to_string(),
        entry_dt: Some("2021-03-02".to_string()),
    }];
    let day2 = runner.process_day(&day2_batch);

    assert!(day2.fully_ok(), "summary: {day2:?}");
    assert!(matches!(day2.report, Some(Ok(1))));
    let events = store.fraud_events().expect("read report");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].trans_id, "D2");
    assert!(events[0].event_type.contains("passport"));
}

/// An empty day is a valid no-op batch: dimensions tombstone, no facts,
/// and the report covers the latest day already on file.
#[test]
fn empty_snapshot_day_tombstones_terminals() {
    let store = store_with_reference();
    let runner = BatchRunner::new(&store);

    let day1 = runner.process_day(&batch(
        1,
        vec![term("T1", "Moscow")],
        vec![txn("D1", "2021-03-01 10:00:00", "100,00", "T1")],
    ));
    assert!(day1.fully_ok());

    let day2 = runner.process_day(&batch(2, Vec::new(), Vec::new()));
    assert_eq!(day2.terminals.as_ref().map(|o| o.removed).ok(), Some(1));
    assert_eq!(day2.facts.as_ref().ok(), Some(&0));
    // Report still runs, scoped to the latest transaction day (Mar 1).
    assert!(matches!(day2.report, Some(Ok(0))));
}
