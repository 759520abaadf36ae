//! Runtime configuration: database target, input directories, and the
//! staging-table mapping.
//!
//! The staging mapping replaces the original loader habit of renaming
//! tables through SQL text substitution — physical staging names are
//! declared here and handed to the store explicitly.

use crate::error::EtlResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_archive_dir")]
    pub archive_dir: String,
    #[serde(default)]
    pub staging: StagingMapping,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            data_dir: default_data_dir(),
            archive_dir: default_archive_dir(),
            staging: StagingMapping::default(),
        }
    }
}

impl WarehouseConfig {
    /// Load from a JSON file (the runner's `--config`).
    pub fn load(path: &Path) -> EtlResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Physical names of the transient current-snapshot tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingMapping {
    #[serde(default = "default_stg_terminals")]
    pub terminals: String,
    #[serde(default = "default_stg_passports")]
    pub passport_blacklist: String,
    #[serde(default = "default_stg_transactions")]
    pub transactions: String,
}

impl Default for StagingMapping {
    fn default() -> Self {
        Self {
            terminals: default_stg_terminals(),
            passport_blacklist: default_stg_passports(),
            transactions: default_stg_transactions(),
        }
    }
}

fn default_db_path() -> String {
    "cardwatch.db".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_archive_dir() -> String {
    "./archive".to_string()
}

fn default_stg_terminals() -> String {
    "stg_terminals".to_string()
}

fn default_stg_passports() -> String {
    "stg_passport_blacklist".to_string()
}

fn default_stg_transactions() -> String {
    "stg_transactions".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: WarehouseConfig =
            serde_json::from_str(r#"{ "db_path": "warehouse.db" }"#).unwrap();
        assert_eq!(cfg.db_path, "warehouse.db");
        assert_eq!(cfg.staging.terminals, "stg_terminals");
        assert_eq!(cfg.archive_dir, "./archive");
    }
}
