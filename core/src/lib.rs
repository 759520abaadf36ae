//! cardwatch-core — card-payments warehouse ETL with rule-based fraud
//! detection.
//!
//! Daily batch flow: stage the day's extracts, reconcile the SCD Type 2
//! dimensions (terminals, passport blacklist), append transaction facts,
//! then evaluate the fraud rules against the reconciled history and write
//! the report. See `batch` for the execution order and `scd` for the
//! merge engine.

pub mod batch;
pub mod config;
pub mod error;
pub mod extract;
pub mod fraud;
pub mod passport;
pub mod scd;
pub mod store;
pub mod terminal;
pub mod transaction;
pub mod types;
