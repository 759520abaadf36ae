//! Client / account / card reference dimensions.
//!
//! Provisioned by the migration, seeded externally (tests, the demo
//! seeder); the fraud joins read them, the pipeline never mutates them.

use super::WarehouseStore;
use crate::error::EtlResult;
use rusqlite::params;

#[derive(Debug, Clone, Default)]
pub struct ClientRow {
    pub client_id: String,
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub patronymic: Option<String>,
    pub date_of_birth: Option<String>,
    pub passport_num: Option<String>,
    pub passport_valid_to: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AccountRow {
    pub account: String,
    pub valid_to: Option<String>,
    pub client: String,
}

#[derive(Debug, Clone)]
pub struct CardRow {
    pub card_num: String,
    pub account: String,
}

impl WarehouseStore {
    pub fn insert_client(&self, c: &ClientRow) -> EtlResult<()> {
        self.conn.execute(
            "INSERT INTO dwh_dim_clients
             (client_id, last_name, first_name, patronymic, date_of_birth,
              passport_num, passport_valid_to, phone)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                c.client_id,
                c.last_name,
                c.first_name,
                c.patronymic,
                c.date_of_birth,
                c.passport_num,
                c.passport_valid_to,
                c.phone
            ],
        )?;
        Ok(())
    }

    pub fn insert_account(&self, a: &AccountRow) -> EtlResult<()> {
        self.conn.execute(
            "INSERT INTO dwh_dim_accounts (account, valid_to, client) VALUES (?1, ?2, ?3)",
            params![a.account, a.valid_to, a.client],
        )?;
        Ok(())
    }

    pub fn insert_card(&self, c: &CardRow) -> EtlResult<()> {
        self.conn.execute(
            "INSERT INTO dwh_dim_cards (card_num, account) VALUES (?1, ?2)",
            params![c.card_num, c.account],
        )?;
        Ok(())
    }

    pub fn client_count(&self) -> EtlResult<i64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM dwh_dim_clients", [], |row| row.get(0))?;
        Ok(count)
    }

    /// All seeded cards. The demo generator draws transaction cards here.
    pub fn cards(&self) -> EtlResult<Vec<CardRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT card_num, account FROM dwh_dim_cards ORDER BY card_num")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CardRow {
                    card_num: row.get(0)?,
                    account: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
