//! Fraud report sink — append-only, idempotent on trans_id.

use super::WarehouseStore;
use crate::{
    error::{EtlError, EtlResult},
    fraud::FraudEvent,
    types::{ts_from_text, ts_to_text},
};
use rusqlite::params;

impl WarehouseStore {
    /// Insert detections, ignoring transaction ids already reported.
    /// Returns the number of newly written rows.
    pub fn insert_fraud_events(&self, events: &[FraudEvent]) -> EtlResult<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut written = 0usize;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO rep_fraud
                 (trans_id, event_dt, passport, fio, event_type, report_dt)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for ev in events {
                written += stmt.execute(params![
                    ev.trans_id,
                    ts_to_text(ev.event_dt),
                    ev.passport,
                    ev.fio,
                    ev.event_type,
                    ts_to_text(ev.report_dt)
                ])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    pub fn fraud_events(&self) -> EtlResult<Vec<FraudEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT trans_id, event_dt, passport, fio, event_type, report_dt
             FROM rep_fraud ORDER BY event_dt ASC, trans_id ASC",
        )?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let event_text: String = row.get(1)?;
            let report_text: String = row.get(5)?;
            let event_dt = ts_from_text(&event_text).ok_or_else(|| {
                EtlError::Input(format!("bad event_dt '{event_text}' in rep_fraud"))
            })?;
            let report_dt = ts_from_text(&report_text).ok_or_else(|| {
                EtlError::Input(format!("bad report_dt '{report_text}' in rep_fraud"))
            })?;
            out.push(FraudEvent {
                trans_id: row.get(0)?,
                event_dt,
                passport: row.get(2)?,
                fio: row.get(3)?,
                event_type: row.get(4)?,
                report_dt,
            });
        }
        Ok(out)
    }

    pub fn fraud_event_count(&self) -> EtlResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM rep_fraud", [], |row| row.get(0))?;
        Ok(count)
    }
}
