//! Transaction fact table and the joined context the fraud engine reads.

use super::WarehouseStore;
use crate::{
    error::{EtlError, EtlResult},
    transaction::TransactionFact,
    types::{date_from_text, ts_from_text, ts_to_text, Money},
};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::params;

/// One fully joined evaluation row: fact → card → account → client →
/// terminal version active at the transaction time.
#[derive(Debug, Clone)]
pub struct TransactionContextRow {
    pub trans_id: String,
    pub trans_date: NaiveDateTime,
    /// Whitespace-normalized card number.
    pub card_num: String,
    pub oper_type: String,
    pub amount: Money,
    pub oper_result: String,
    pub terminal: String,
    pub terminal_city: Option<String>,
    pub account: String,
    pub contract_valid_to: Option<NaiveDate>,
    pub passport_num: Option<String>,
    pub passport_valid_to: Option<NaiveDate>,
    /// Client full name, nulls skipped.
    pub fio: String,
}

impl WarehouseStore {
    /// Append one day's transactions. The fact table is append-only and
    /// keyed by trans_id; a duplicate id rolls the whole append back.
    pub fn append_transactions(&self, facts: &[TransactionFact]) -> EtlResult<usize> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO dwh_fact_transactions
                 (trans_id, trans_date, card_num, oper_type, amt_minor, oper_result, terminal)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for f in facts {
                stmt.execute(params![
                    f.trans_id,
                    ts_to_text(f.trans_date),
                    f.card_num,
                    f.oper_type,
                    f.amount.minor(),
                    f.oper_result,
                    f.terminal
                ])
                .map_err(|e| match e {
                    rusqlite::Error::SqliteFailure(err, _)
                        if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        EtlError::DuplicateTransaction {
                            trans_id: f.trans_id.clone(),
                        }
                    }
                    other => EtlError::Database(other),
                })?;
            }
        }
        tx.commit()?;
        Ok(facts.len())
    }

    pub fn transaction_count(&self) -> EtlResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM dwh_fact_transactions",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Day of the most recent transaction, if any. Drives the report
    /// scope instead of the wall clock.
    pub fn latest_transaction_day(&self) -> EtlResult<Option<NaiveDate>> {
        let max: Option<String> = self.conn.query_row(
            "SELECT MAX(trans_date) FROM dwh_fact_transactions",
            [],
            |row| row.get(0),
        )?;
        Ok(max.and_then(|s| ts_from_text(&s)).map(|ts| ts.date()))
    }

    /// Joined evaluation rows for transactions at or after `since`,
    /// ordered by card then time. Inner-join semantics throughout: a
    /// transaction missing any leg (unknown card, account, client, or no
    /// terminal version covering its timestamp) is silently excluded.
    pub fn transaction_context_since(
        &self,
        since: NaiveDateTime,
    ) -> EtlResult<Vec<TransactionContextRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT t1.trans_id,
                    t1.trans_date,
                    REPLACE(t1.card_num, ' ', '') AS card_norm,
                    t1.oper_type,
                    t1.amt_minor,
                    t1.oper_result,
                    t1.terminal,
                    t5.terminal_city,
                    t3.account,
                    t3.valid_to,
                    t4.passport_num,
                    t4.passport_valid_to,
                    t4.last_name, t4.first_name, t4.patronymic
             FROM dwh_fact_transactions t1
             INNER JOIN dwh_dim_cards t2
                ON CAST(REPLACE(t1.card_num, ' ', '') AS INTEGER)
                 = CAST(REPLACE(t2.card_num, ' ', '') AS INTEGER)
             INNER JOIN dwh_dim_accounts t3
                ON t2.account = t3.account
             INNER JOIN dwh_dim_clients t4
                ON LOWER(t3.client) = LOWER(t4.client_id)
             INNER JOIN dwh_dim_terminals_hist t5
                ON t1.terminal = t5.terminal_id
               AND t5.deleted_flg = 0
               AND t1.trans_date BETWEEN t5.effective_from AND t5.effective_to
             WHERE t1.trans_date >= ?1
             ORDER BY card_norm ASC, t1.trans_date ASC, t1.trans_id ASC",
        )?;
        let mut rows = stmt.query(params![ts_to_text(since)])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let ts_text: String = row.get(1)?;
            let trans_date = ts_from_text(&ts_text).ok_or_else(|| {
                EtlError::Input(format!("bad trans_date '{ts_text}' in fact table"))
            })?;
            let valid_to: Option<String> = row.get(9)?;
            let passport_valid_to: Option<String> = row.get(11)?;
            let name_parts: [Option<String>; 3] = [row.get(12)?, row.get(13)?, row.get(14)?];
            let fio = name_parts
                .iter()
                .flatten()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(" ");
            out.push(TransactionContextRow {
                trans_id: row.get(0)?,
                trans_date,
                card_num: row.get(2)?,
                oper_type: row.get(3)?,
                amount: Money::from_minor(row.get(4)?),
                oper_result: row.get(5)?,
                terminal: row.get(6)?,
                terminal_city: row.get(7)?,
                account: row.get(8)?,
                contract_valid_to: valid_to.as_deref().and_then(date_from_text),
                passport_num: row.get(10)?,
                passport_valid_to: passport_valid_to.as_deref().and_then(date_from_text),
                fio,
            });
        }
        Ok(out)
    }
}
