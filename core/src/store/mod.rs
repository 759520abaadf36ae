//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Pipeline modules call store methods — they never execute SQL directly.

mod dimensions;
mod facts;
mod reference;
mod report;

pub use facts::TransactionContextRow;
pub use reference::{AccountRow, CardRow, ClientRow};

use crate::{
    config::StagingMapping,
    error::{EtlError, EtlResult},
    passport::PassportBlacklistRecord,
    terminal::TerminalRecord,
    transaction::TransactionFact,
    types::{ts_from_text, ts_to_text},
};
use rusqlite::{params, Connection};

pub struct WarehouseStore {
    conn: Connection,
    staging: StagingMapping,
}

impl WarehouseStore {
    /// Open (or create) the warehouse database at `path`.
    pub fn open(path: &str, staging: StagingMapping) -> EtlResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (:memory: ignores it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, staging })
    }

    /// Open an in-memory warehouse (used in tests).
    pub fn in_memory() -> EtlResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            staging: StagingMapping::default(),
        })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> EtlResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_warehouse.sql"))?;
        Ok(())
    }

    // ── Staging: transient current-snapshot area ───────────────────────
    //
    // Each loader replaces the prior contents wholesale; staging tables
    // are created on first use under the configured physical names.

    pub fn replace_staged_terminals(&self, rows: &[TerminalRecord]) -> EtlResult<()> {
        let table = &self.staging.terminals;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                 terminal_id      TEXT NOT NULL,
                 terminal_type    TEXT,
                 terminal_city    TEXT,
                 terminal_address TEXT
             );
             DELETE FROM {table};"
        ))?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {table} (terminal_id, terminal_type, terminal_city, terminal_address)
                 VALUES (?1, ?2, ?3, ?4)"
            ))?;
            for r in rows {
                stmt.execute(params![
                    r.terminal_id,
                    r.terminal_type,
                    r.terminal_city,
                    r.terminal_address
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn staged_terminals(&self) -> EtlResult<Vec<TerminalRecord>> {
        let table = &self.staging.terminals;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT terminal_id, terminal_type, terminal_city, terminal_address FROM {table}"
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(TerminalRecord {
                    terminal_id: row.get(0)?,
                    terminal_type: row.get(1)?,
                    terminal_city: row.get(2)?,
                    terminal_address: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn replace_staged_passports(&self, rows: &[PassportBlacklistRecord]) -> EtlResult<()> {
        let table = &self.staging.passport_blacklist;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                 passport_num TEXT NOT NULL,
                 entry_dt     TEXT
             );
             DELETE FROM {table};"
        ))?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {table} (passport_num, entry_dt) VALUES (?1, ?2)"
            ))?;
            for r in rows {
                stmt.execute(params![r.passport_num, r.entry_dt])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn staged_passports(&self) -> EtlResult<Vec<PassportBlacklistRecord>> {
        let table = &self.staging.passport_blacklist;
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT passport_num, entry_dt FROM {table}"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(PassportBlacklistRecord {
                    passport_num: row.get(0)?,
                    entry_dt: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn replace_staged_transactions(&self, rows: &[TransactionFact]) -> EtlResult<()> {
        let table = &self.staging.transactions;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                 trans_id    TEXT NOT NULL,
                 trans_date  TEXT NOT NULL,
                 card_num    TEXT NOT NULL,
                 oper_type   TEXT NOT NULL,
                 amt_minor   INTEGER NOT NULL,
                 oper_result TEXT NOT NULL,
                 terminal    TEXT NOT NULL
             );
             DELETE FROM {table};"
        ))?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {table}
                 (trans_id, trans_date, card_num, oper_type, amt_minor, oper_result, terminal)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ))?;
            for r in rows {
                stmt.execute(params![
                    r.trans_id,
                    ts_to_text(r.trans_date),
                    r.card_num,
                    r.oper_type,
                    r.amount.minor(),
                    r.oper_result,
                    r.terminal
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn staged_transactions(&self) -> EtlResult<Vec<TransactionFact>> {
        let table = &self.staging.transactions;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT trans_id, trans_date, card_num, oper_type, amt_minor, oper_result, terminal
             FROM {table}"
        ))?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let ts_text: String = row.get(1)?;
            let trans_date = ts_from_text(&ts_text).ok_or_else(|| {
                EtlError::Input(format!("bad trans_date '{ts_text}' in staged transactions"))
            })?;
            out.push(TransactionFact {
                trans_id: row.get(0)?,
                trans_date,
                card_num: row.get(2)?,
                oper_type: row.get(3)?,
                amount: crate::types::Money::from_minor(row.get(4)?),
                oper_result: row.get(5)?,
                terminal: row.get(6)?,
            });
        }
        Ok(out)
    }
}
