//! Reference-conflict detection
//!
//! The store refuses to delete a node that pool members still use and says so
//! in prose:
//!
//! `01070110:3: Node address '/Common/web1' is referenced by a member of pool '/Common/web'.`
//!
//! This is the only place that reads that message.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Error;

/// Captures the partition (first path segment) and the pool name (last path
/// segment, restricted to letters, digits, `-`, `_` and `.`).
static REFERENCED_BY_POOL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"referenced by a member of pool '/([^'/]+)/(?:[^'/]+/)*([A-Za-z0-9_.\-]+)")
        .expect("reference conflict pattern is valid")
});

/// The pool blocking a node deletion
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReferenceConflict {
    pub partition: String,
    pub pool: String,
}

impl ReferenceConflict {
    /// Only store-reported failures can carry a reference conflict
    pub fn from_error(error: &Error) -> Option<Self> {
        match error {
            Error::Store { message, .. } => blocking_pool(message),
            _ => None,
        }
    }
}

/// Extract the blocking pool from a delete-node failure message
pub fn blocking_pool(message: &str) -> Option<ReferenceConflict> {
    let captures = REFERENCED_BY_POOL.captures(message)?;
    let partition = captures.get(1)?.as_str();
    let pool = captures.get(2)?.as_str();
    if pool.is_empty() {
        return None;
    }
    Some(ReferenceConflict {
        partition: partition.to_string(),
        pool: pool.to_string(),
    })
}
