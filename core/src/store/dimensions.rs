//! Versioned dimension access — the store half of the SCD engine.
//!
//! `reconcile_dimension` is the whole per-entity merge: read the active
//! set, partition the snapshot against it, and apply the delta inside one
//! SQLite transaction so a failed step leaves no partial history behind.

use super::WarehouseStore;
use crate::{
    error::EtlResult,
    scd::{self, ScdDelta, ScdDimension, ScdOutcome, VersionedRow},
    types::{ts_to_text, OPEN_END},
};
use chrono::{Duration, NaiveDateTime};
use rusqlite::{params, Statement, ToSql};

impl WarehouseStore {
    /// Rows of the active set: `deleted_flg = 0` and `as_of` inside the
    /// validity window (both boundaries inclusive).
    pub fn active_dimension_rows<D: ScdDimension>(
        &self,
        as_of: NaiveDateTime,
    ) -> EtlResult<Vec<D>> {
        let sql = format!(
            "SELECT {cols} FROM {table}
             WHERE deleted_flg = 0 AND ?1 BETWEEN effective_from AND effective_to",
            cols = select_list::<D>(),
            table = D::HIST_TABLE,
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![ts_to_text(as_of)], |row| D::from_row(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Reconcile a full snapshot against the history table as of `now`.
    pub fn reconcile_dimension<D: ScdDimension>(
        &self,
        snapshot: &[D],
        now: NaiveDateTime,
    ) -> EtlResult<ScdOutcome> {
        let active = self.active_dimension_rows::<D>(now)?;
        let delta = scd::partition(snapshot, &active);
        self.apply_scd_delta(&delta, now)
    }

    /// Apply a reconciliation delta. All closes and inserts commit
    /// together or not at all.
    pub fn apply_scd_delta<D: ScdDimension>(
        &self,
        delta: &ScdDelta<D>,
        now: NaiveDateTime,
    ) -> EtlResult<ScdOutcome> {
        let outcome = ScdOutcome {
            added: delta.added.len(),
            removed: delta.removed.len(),
            changed: delta.changed.len(),
        };
        if delta.is_empty() {
            return Ok(outcome);
        }

        // Windows never overlap: the closed row ends one second before
        // the replacement version begins.
        let closed_at = ts_to_text(now - Duration::seconds(1));
        let now_text = ts_to_text(now);
        let open_text = OPEN_END.to_string();

        let insert_sql = insert_version_sql::<D>();
        let close_sql = format!(
            "UPDATE {table} SET effective_to = ?1
             WHERE {key} = ?2 AND deleted_flg = ?3 AND effective_to = '{OPEN_END}'",
            table = D::HIST_TABLE,
            key = D::KEY_COLUMN,
        );

        let tx = self.conn.unchecked_transaction()?;
        {
            let mut insert = tx.prepare(&insert_sql)?;
            let mut close = tx.prepare(&close_sql)?;
            let active_flg = 0i64;
            let tombstone_flg = 1i64;

            for rec in &delta.added {
                // A key returning after deletion closes its open tombstone
                // first, keeping per-key windows disjoint.
                close.execute(params![closed_at, rec.natural_key(), tombstone_flg])?;
                exec_insert(&mut insert, rec, &now_text, &open_text, &active_flg)?;
            }
            for rec in &delta.changed {
                close.execute(params![closed_at, rec.natural_key(), active_flg])?;
                exec_insert(&mut insert, rec, &now_text, &open_text, &active_flg)?;
            }
            for rec in &delta.removed {
                close.execute(params![closed_at, rec.natural_key(), active_flg])?;
                // Tombstone carries the last-known attribute values.
                exec_insert(&mut insert, rec, &now_text, &open_text, &tombstone_flg)?;
            }
        }
        tx.commit()?;
        Ok(outcome)
    }

    /// Full version history for one natural key, oldest first.
    pub fn dimension_history<D: ScdDimension>(
        &self,
        key: &str,
    ) -> EtlResult<Vec<VersionedRow<D>>> {
        let sql = format!(
            "SELECT {cols}, effective_from, effective_to, deleted_flg
             FROM {table} WHERE {key_col} = ?1
             ORDER BY effective_from ASC, deleted_flg ASC",
            cols = select_list::<D>(),
            table = D::HIST_TABLE,
            key_col = D::KEY_COLUMN,
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let attr_count = 1 + D::ATTR_COLUMNS.len();
        let rows = stmt
            .query_map(params![key], |row| {
                Ok(VersionedRow {
                    record: D::from_row(row)?,
                    effective_from: row.get(attr_count)?,
                    effective_to: row.get(attr_count + 1)?,
                    deleted_flg: row.get(attr_count + 2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Count of open active rows per the SCD invariant check: for any
    /// key at most one row may have `deleted_flg = 0` and the open
    /// sentinel. Returns keys violating that.
    pub fn scd_invariant_violations<D: ScdDimension>(&self) -> EtlResult<Vec<String>> {
        let sql = format!(
            "SELECT {key} FROM {table}
             WHERE deleted_flg = 0 AND effective_to = '{OPEN_END}'
             GROUP BY {key} HAVING COUNT(*) > 1",
            key = D::KEY_COLUMN,
            table = D::HIST_TABLE,
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn select_list<D: ScdDimension>() -> String {
    let mut cols = vec![D::KEY_COLUMN];
    cols.extend_from_slice(D::ATTR_COLUMNS);
    cols.join(", ")
}

fn insert_version_sql<D: ScdDimension>() -> String {
    let n = 1 + D::ATTR_COLUMNS.len() + 3;
    let placeholders = (1..=n)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {table} ({cols}, effective_from, effective_to, deleted_flg)
         VALUES ({placeholders})",
        table = D::HIST_TABLE,
        cols = select_list::<D>(),
    )
}

fn exec_insert<D: ScdDimension>(
    stmt: &mut Statement<'_>,
    rec: &D,
    effective_from: &String,
    effective_to: &String,
    deleted_flg: &i64,
) -> rusqlite::Result<usize> {
    let mut values: Vec<&dyn ToSql> = rec.bind_values();
    values.push(effective_from);
    values.push(effective_to);
    values.push(deleted_flg);
    stmt.execute(values.as_slice())
}
