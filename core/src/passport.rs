//! Passport blacklist dimension — versioned history of blacklisted
//! passports. Same SCD engine as terminals, different schema.

use crate::scd::ScdDimension;
use rusqlite::{Row, ToSql};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassportBlacklistRecord {
    pub passport_num: String,
    /// Blacklist entry date as `YYYY-MM-DD` text.
    pub entry_dt: Option<String>,
}

impl ScdDimension for PassportBlacklistRecord {
    const HIST_TABLE: &'static str = "dwh_dim_passport_blacklist_hist";
    const KEY_COLUMN: &'static str = "passport_num";
    const ATTR_COLUMNS: &'static [&'static str] = &["entry_dt"];

    fn natural_key(&self) -> &str {
        &self.passport_num
    }

    fn attrs_eq(&self, other: &Self) -> bool {
        self.entry_dt == other.entry_dt
    }

    fn bind_values(&self) -> Vec<&dyn ToSql> {
        vec![&self.passport_num, &self.entry_dt]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            passport_num: row.get(0)?,
            entry_dt: row.get(1)?,
        })
    }
}
