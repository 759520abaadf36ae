//! SCD Type 2 history tests — version windows, tombstones, invariants.
//!
//! Every scenario drives the engine through `reconcile_dimension`, the
//! same entry point the daily batch uses.

use cardwatch_core::{
    error::EtlResult,
    passport::PassportBlacklistRecord,
    scd::ScdDimension,
    store::WarehouseStore,
    terminal::TerminalRecord,
    types::{day_start, ts_from_text, OPEN_END},
};
use chrono::{Duration, NaiveDate};

fn store() -> WarehouseStore {
    let store = WarehouseStore::in_memory().expect("open in-memory store");
    store.migrate().expect("apply migrations");
    store
}

fn day(d: u32) -> chrono::NaiveDateTime {
    day_start(NaiveDate::from_ymd_opt(2021, 3, d).expect("valid test date"))
}

fn term(id: &str, city: Option<&str>) -> TerminalRecord {
    TerminalRecord {
        terminal_id: id.to_string(),
        terminal_type: Some("POS".to_string()),
        terminal_city: city.map(str::to_string),
        terminal_address: Some("Main St 1".to_string()),
    }
}

/// A brand-new key opens exactly one active row with the open sentinel.
#[test]
fn new_key_opens_one_active_row() -> EtlResult<()> {
    let store = store();
    let outcome = store.reconcile_dimension(&[term("T1", Some("Moscow"))], day(1))?;
    assert_eq!(outcome.added, 1);
    assert_eq!(outcome.total_writes(), 1);

    let history = store.dimension_history::<TerminalRecord>("T1")?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].effective_from, "2021-03-01 00:00:00");
    assert_eq!(history[0].effective_to, OPEN_END);
    assert_eq!(history[0].deleted_flg, 0);
    Ok(())
}

/// An identical snapshot the next day writes nothing.
#[test]
fn unchanged_snapshot_is_a_no_op() -> EtlResult<()> {
    let store = store();
    let snapshot = [term("T1", Some("Moscow"))];
    store.reconcile_dimension(&snapshot, day(1))?;
    let outcome = store.reconcile_dimension(&snapshot, day(2))?;
    assert_eq!(outcome.total_writes(), 0);
    assert_eq!(store.dimension_history::<TerminalRecord>("T1")?.len(), 1);
    Ok(())
}

/// An attribute change closes the old version one second before the new
/// window and opens a replacement.
#[test]
fn attribute_change_closes_and_reopens() -> EtlResult<()> {
    let store = store();
    store.reconcile_dimension(&[term("T1", Some("Moscow"))], day(1))?;
    let outcome = store.reconcile_dimension(&[term("T1", Some("Kazan"))], day(2))?;
    assert_eq!(outcome.changed, 1);

    let history = store.dimension_history::<TerminalRecord>("T1")?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].effective_to, "2021-03-01 23:59:59");
    assert_eq!(history[1].effective_from, "2021-03-02 00:00:00");
    assert_eq!(history[1].effective_to, OPEN_END);
    assert_eq!(history[1].record.terminal_city.as_deref(), Some("Kazan"));

    let active: Vec<TerminalRecord> = store.active_dimension_rows(day(2))?;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].terminal_city.as_deref(), Some("Kazan"));
    Ok(())
}

/// A key missing from the snapshot gets its row closed and a tombstone
/// carrying the last-known attributes, and drops out of the active set.
#[test]
fn removal_inserts_tombstone() -> EtlResult<()> {
    let store = store();
    store.reconcile_dimension(&[term("T1", Some("Moscow"))], day(1))?;
    let outcome = store.reconcile_dimension::<TerminalRecord>(&[], day(2))?;
    assert_eq!(outcome.removed, 1);

    let history = store.dimension_history::<TerminalRecord>("T1")?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].effective_to, "2021-03-01 23:59:59");
    assert_eq!(history[0].deleted_flg, 0);
    assert_eq!(history[1].deleted_flg, 1);
    assert_eq!(history[1].effective_to, OPEN_END);
    assert_eq!(history[1].record.terminal_city.as_deref(), Some("Moscow"));

    let active: Vec<TerminalRecord> = store.active_dimension_rows(day(2))?;
    assert!(active.is_empty());
    // The old version is still queryable as of its own window.
    let active: Vec<TerminalRecord> = store.active_dimension_rows(day(1))?;
    assert_eq!(active.len(), 1);
    Ok(())
}

/// A key returning after deletion closes its open tombstone so per-key
/// windows stay disjoint, then reopens as active.
#[test]
fn reappearance_closes_the_tombstone() -> EtlResult<()> {
    let store = store();
    store.reconcile_dimension(&[term("T1", Some("Moscow"))], day(1))?;
    store.reconcile_dimension::<TerminalRecord>(&[], day(2))?;
    let outcome = store.reconcile_dimension(&[term("T1", Some("Kazan"))], day(3))?;
    assert_eq!(outcome.added, 1);

    let history = store.dimension_history::<TerminalRecord>("T1")?;
    assert_eq!(history.len(), 3);
    let tombstone = &history[1];
    assert_eq!(tombstone.deleted_flg, 1);
    assert_eq!(tombstone.effective_to, "2021-03-02 23:59:59");
    assert_eq!(history[2].deleted_flg, 0);
    assert_eq!(history[2].effective_from, "2021-03-03 00:00:00");
    assert_eq!(history[2].effective_to, OPEN_END);
    Ok(())
}

/// Across several days of churn: at most one open active row per key and
/// no gaps or overlaps between consecutive versions.
#[test]
fn history_windows_stay_disjoint_and_gapless() -> EtlResult<()> {
    let store = store();
    store.reconcile_dimension(&[term("T1", Some("Moscow")), term("T2", None)], day(1))?;
    store.reconcile_dimension(&[term("T1", Some("Kazan")), term("T2", Some("Omsk"))], day(2))?;
    store.reconcile_dimension(&[term("T2", Some("Omsk"))], day(3))?;
    store.reconcile_dimension(&[term("T1", Some("Tver")), term("T2", Some("Omsk"))], day(4))?;

    assert!(store.scd_invariant_violations::<TerminalRecord>()?.is_empty());

    for key in ["T1", "T2"] {
        let history = store.dimension_history::<TerminalRecord>(key)?;
        for pair in history.windows(2) {
            let closed = ts_from_text(&pair[0].effective_to).expect("closed boundary parses");
            let opened = ts_from_text(&pair[1].effective_from).expect("open boundary parses");
            assert_eq!(
                opened,
                closed + Duration::seconds(1),
                "{key}: window after {closed} must start one second later"
            );
        }
        let last = history.last().expect("history never empty here");
        assert_eq!(last.effective_to, OPEN_END);
    }
    Ok(())
}

/// Replaying the same snapshot at the same timestamp writes nothing new.
#[test]
fn same_day_replay_is_idempotent() -> EtlResult<()> {
    let store = store();
    let snapshot = [term("T1", Some("Moscow")), term("T2", Some("Kazan"))];
    store.reconcile_dimension(&snapshot, day(1))?;
    let outcome = store.reconcile_dimension(&snapshot, day(1))?;
    assert_eq!(outcome.total_writes(), 0);
    assert_eq!(store.dimension_history::<TerminalRecord>("T1")?.len(), 1);
    assert_eq!(store.dimension_history::<TerminalRecord>("T2")?.len(), 1);
    Ok(())
}

/// The passport blacklist runs through the same engine with its own
/// schema: add, remove, and entry-date change all version correctly.
#[test]
fn passport_blacklist_uses_the_same_engine() -> EtlResult<()> {
    let store = store();
    let entry = |p: &str, d: &str| PassportBlacklistRecord {
        passport_num: p.to_string(),
        entry_dt: Some(d.to_string()),
    };

    store.reconcile_dimension(&[entry("4510 111111", "2021-02-28")], day(1))?;
    store.reconcile_dimension(
        &[entry("4510 111111", "2021-03-02"), entry("4510 222222", "2021-03-02")],
        day(2),
    )?;
    store.reconcile_dimension(&[entry("4510 222222", "2021-03-02")], day(3))?;

    let history = store.dimension_history::<PassportBlacklistRecord>("4510 111111")?;
    assert_eq!(history.len(), 3); // original, entry-date change, tombstone
    assert_eq!(history[2].deleted_flg, 1);

    let active: Vec<PassportBlacklistRecord> = store.active_dimension_rows(day(3))?;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].passport_num, "4510 222222");
    assert_eq!(PassportBlacklistRecord::HIST_TABLE, "dwh_dim_passport_blacklist_hist");
    Ok(())
}
