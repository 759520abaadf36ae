//! Slowly-changing-dimension (Type 2) reconciliation.
//!
//! One engine serves every versioned dimension: a dimension describes its
//! natural key, attribute equality, and column layout through
//! [`ScdDimension`], `partition` computes the day's delta against the
//! active history, and the store applies that delta as a single atomic
//! unit. History rows are never physically deleted — removals insert a
//! tombstone version (`deleted_flg = 1`) carrying the last-known
//! attributes.

use rusqlite::{Row, ToSql};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// A versioned dimension record. Implementations supply the column
/// metadata the store needs to build its SQL, plus the comparisons the
/// reconciler needs to classify records.
pub trait ScdDimension: Clone {
    /// History table holding the versioned rows.
    const HIST_TABLE: &'static str;
    /// Natural-key column.
    const KEY_COLUMN: &'static str;
    /// Non-key attribute columns, in binding order.
    const ATTR_COLUMNS: &'static [&'static str];

    fn natural_key(&self) -> &str;

    /// Full attribute-vector equality. `Option` fields give the required
    /// nullable-aware comparison for free: two NULLs are equal, a value
    /// never equals NULL.
    fn attrs_eq(&self, other: &Self) -> bool;

    /// Key plus attribute values, in column order, for INSERT binding.
    fn bind_values(&self) -> Vec<&dyn ToSql>;

    /// Inverse of `bind_values`: key plus attributes from a SELECT row.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>
    where
        Self: Sized;
}

/// The three pairwise-disjoint record sets produced by comparing a
/// snapshot against the active history.
#[derive(Debug)]
pub struct ScdDelta<R> {
    pub added: Vec<R>,
    pub removed: Vec<R>,
    pub changed: Vec<R>,
}

impl<R> ScdDelta<R> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Counts of history rows written by one reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScdOutcome {
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
}

impl ScdOutcome {
    pub fn total_writes(&self) -> usize {
        self.added + self.removed + self.changed
    }
}

/// One full version row as stored, for history inspection.
#[derive(Debug, Clone)]
pub struct VersionedRow<R> {
    pub record: R,
    pub effective_from: String,
    pub effective_to: String,
    pub deleted_flg: i64,
}

/// Partition `snapshot` against the `active` history set.
///
/// - added:   snapshot keys absent from the active set
/// - removed: active keys absent from the snapshot
/// - changed: keys in both whose attribute vectors differ
///
/// Unchanged keys appear in none of the three. A snapshot carrying the
/// same key twice keeps the first occurrence and logs the rest; snapshots
/// are sets by contract.
pub fn partition<R: ScdDimension>(snapshot: &[R], active: &[R]) -> ScdDelta<R> {
    let active_by_key: HashMap<&str, &R> =
        active.iter().map(|r| (r.natural_key(), r)).collect();

    let mut delta = ScdDelta {
        added: Vec::new(),
        removed: Vec::new(),
        changed: Vec::new(),
    };

    let mut seen: HashSet<&str> = HashSet::new();
    for rec in snapshot {
        if !seen.insert(rec.natural_key()) {
            log::warn!(
                "{}: duplicate key '{}' in snapshot, keeping first occurrence",
                R::HIST_TABLE,
                rec.natural_key()
            );
            continue;
        }
        match active_by_key.get(rec.natural_key()) {
            None => delta.added.push(rec.clone()),
            Some(current) if !rec.attrs_eq(current) => delta.changed.push(rec.clone()),
            Some(_) => {} // unchanged: no write
        }
    }

    for rec in active {
        if !seen.contains(rec.natural_key()) {
            delta.removed.push(rec.clone());
        }
    }

    delta
}
