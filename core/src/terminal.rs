//! Terminal dimension — versioned history of installed payment terminals.

use crate::scd::ScdDimension;
use rusqlite::{Row, ToSql};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalRecord {
    pub terminal_id: String,
    pub terminal_type: Option<String>,
    pub terminal_city: Option<String>,
    pub terminal_address: Option<String>,
}

impl ScdDimension for TerminalRecord {
    const HIST_TABLE: &'static str = "dwh_dim_terminals_hist";
    const KEY_COLUMN: &'static str = "terminal_id";
    const ATTR_COLUMNS: &'static [&'static str] =
        &["terminal_type", "terminal_city", "terminal_address"];

    fn natural_key(&self) -> &str {
        &self.terminal_id
    }

    fn attrs_eq(&self, other: &Self) -> bool {
        self.terminal_type == other.terminal_type
            && self.terminal_city == other.terminal_city
            && self.terminal_address == other.terminal_address
    }

    fn bind_values(&self) -> Vec<&dyn ToSql> {
        vec![
            &self.terminal_id,
            &self.terminal_type,
            &self.terminal_city,
            &self.terminal_address,
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            terminal_id: row.get(0)?,
            terminal_type: row.get(1)?,
            terminal_city: row.get(2)?,
            terminal_address: row.get(3)?,
        })
    }
}
