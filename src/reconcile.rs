//! Set reconciliation
//!
//! Computes the additions and removals needed to turn an observed set into a
//! desired one. Pure and generic: it knows nothing about what the elements are.

use std::collections::BTreeSet;

/// Changes needed to converge an observed set on a desired set.
/// `to_add` and `to_remove` are always disjoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetDiff<T: Ord> {
    /// `desired - observed`
    pub to_add: BTreeSet<T>,
    /// `observed - desired`
    pub to_remove: BTreeSet<T>,
}

impl<T: Ord> SetDiff<T> {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

pub fn diff<T: Ord + Clone>(desired: &BTreeSet<T>, observed: &BTreeSet<T>) -> SetDiff<T> {
    SetDiff {
        to_add: desired.difference(observed).cloned().collect(),
        to_remove: observed.difference(desired).cloned().collect(),
    }
}
