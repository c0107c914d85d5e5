//! Node lifecycle and dependency-aware deletion
//!
//! The store refuses to delete a node while pool members reference it. When
//! that happens the deletion controller reads the blocking pool from the
//! error, removes that node's memberships from it and tries again:
//!
//! ```text
//! delete ──ok──────────────────────────────▶ done
//!   │
//!   ├─ other error ─────────────────────────▶ fail (error unchanged)
//!   │
//!   └─ referenced by pool P ─▶ remove <node>:* members of P ─▶ delete
//! ```
//!
//! Each pass through the lower branch is a remediation round. A round that
//! clears a pool not seen before resets the stall count; a round that follows
//! one which removed nothing, or that reports a pool already cleared, adds to
//! it. After `max_remediation_rounds` stalled rounds the controller gives up
//! with [`Error::DeletionExhausted`] instead of looping on a store that keeps
//! reporting the same reference. A node used by many pools is still deleted,
//! one pool per round.

use std::collections::BTreeSet;

use tracing::{debug, info, instrument, warn};

use super::conflict::ReferenceConflict;
use super::{remove_member, timed};
use crate::config::ReconcilerConfig;
use crate::error::{Error, Result};
use crate::resource::{references_node, NodeSpec, NodeState};
use crate::store::{Node, StateStore};

const CONTROLLER: &str = "node";

/// What a successful node deletion had to do first
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Remediation rounds run before the delete went through
    pub rounds: u32,
    /// Memberships removed across all rounds
    pub memberships_removed: usize,
}

/// Create a node and read it back. The node's identity is its name, or its
/// address when no name is given.
#[instrument(skip_all, fields(node = %spec.effective_name()))]
pub async fn create_node<S: StateStore + ?Sized>(
    store: &S,
    config: &ReconcilerConfig,
    spec: &NodeSpec,
) -> Result<NodeState> {
    timed(CONTROLLER, create(store, config, spec)).await
}

async fn create<S: StateStore + ?Sized>(
    store: &S,
    config: &ReconcilerConfig,
    spec: &NodeSpec,
) -> Result<NodeState> {
    spec.validate()?;
    let name = spec.effective_name();
    let partition = config.resolve_partition(spec.partition.as_deref());

    info!("Creating node {}/{}::{}", partition, name, spec.address);
    store.create_node(name, &partition, &spec.address).await?;

    read(store, config, name, Some(&partition))
        .await?
        .ok_or_else(|| {
            Error::store(
                404,
                format!("node /{partition}/{name} disappeared right after creation"),
            )
        })
}

/// Read a node; `None` when it does not exist
#[instrument(skip_all, fields(node = %id))]
pub async fn read_node<S: StateStore + ?Sized>(
    store: &S,
    config: &ReconcilerConfig,
    id: &str,
    partition: Option<&str>,
) -> Result<Option<NodeState>> {
    read(store, config, id, partition).await
}

async fn read<S: StateStore + ?Sized>(
    store: &S,
    config: &ReconcilerConfig,
    id: &str,
    partition: Option<&str>,
) -> Result<Option<NodeState>> {
    let requested = config.resolve_partition(partition);
    debug!("Fetching node {}/{}", requested, id);

    Ok(store.get_node(id, &requested).await?.map(|node| NodeState {
        id: id.to_string(),
        name: if node.name.is_empty() {
            id.to_string()
        } else {
            node.name
        },
        partition: config.resolve_partition(Some(&node.partition)),
        address: node.address,
    }))
}

pub async fn node_exists<S: StateStore + ?Sized>(
    store: &S,
    config: &ReconcilerConfig,
    id: &str,
    partition: Option<&str>,
) -> Result<bool> {
    let partition = config.resolve_partition(partition);
    debug!("Checking node {}/{} exists", partition, id);
    Ok(store.get_node(id, &partition).await?.is_some())
}

/// Push the full node value to the store
#[instrument(skip_all, fields(node = %id))]
pub async fn update_node<S: StateStore + ?Sized>(
    store: &S,
    config: &ReconcilerConfig,
    id: &str,
    spec: &NodeSpec,
) -> Result<()> {
    spec.validate()?;
    let partition = config.resolve_partition(spec.partition.as_deref());
    let node = Node {
        name: id.to_string(),
        partition: partition.clone(),
        address: spec.address.clone(),
    };
    timed(CONTROLLER, store.modify_node(id, &partition, &node)).await
}

/// Delete a node, first clearing any pool memberships that block it
#[instrument(skip_all, fields(node = %id))]
pub async fn delete_node<S: StateStore + ?Sized>(
    store: &S,
    config: &ReconcilerConfig,
    id: &str,
    partition: Option<&str>,
) -> Result<DeleteOutcome> {
    let partition = config.resolve_partition(partition);
    timed(CONTROLLER, delete(store, config, id, &partition)).await
}

async fn delete<S: StateStore + ?Sized>(
    store: &S,
    config: &ReconcilerConfig,
    id: &str,
    partition: &str,
) -> Result<DeleteOutcome> {
    info!("Deleting node {}/{}", partition, id);
    let mut outcome = DeleteOutcome::default();
    // consecutive rounds without progress
    let mut stalled: u32 = 0;
    let mut cleared: BTreeSet<ReferenceConflict> = BTreeSet::new();
    let mut last_removed: Option<usize> = None;

    loop {
        let err = match store.delete_node(id, partition).await {
            Ok(()) => {
                if outcome.rounds > 0 {
                    info!(
                        "Deleted node {}/{} after removing {} membership(s) in {} round(s)",
                        partition, id, outcome.memberships_removed, outcome.rounds
                    );
                }
                return Ok(outcome);
            }
            Err(e) => e,
        };

        let Some(conflict) = ReferenceConflict::from_error(&err) else {
            return Err(err);
        };

        // a pool reported again after its memberships were cleared means the
        // removal did not take effect
        match last_removed {
            Some(0) => stalled += 1,
            Some(_) if cleared.contains(&conflict) => stalled += 1,
            Some(_) => stalled = 0,
            None => {}
        }

        if stalled >= config.max_remediation_rounds {
            warn!(
                "Node {}/{} still referenced by pool {} after {} round(s) without progress, giving up",
                partition, id, conflict.pool, stalled
            );
            return Err(Error::DeletionExhausted {
                node: id.to_string(),
                pool: conflict.pool,
                attempts: outcome.rounds,
                last_error: err.to_string(),
            });
        }

        outcome.rounds += 1;
        info!(
            "Node {}/{} is referenced by pool {}/{}, removing its memberships (round {})",
            partition, id, conflict.partition, conflict.pool, outcome.rounds
        );

        #[cfg(feature = "metrics")]
        super::metrics::inc_node_delete_remediation(partition);

        let removed = remove_node_memberships(store, id, &conflict).await?;
        if removed == 0 {
            warn!(
                "No memberships of node {} removed from pool {}/{}, retrying delete anyway",
                id, conflict.partition, conflict.pool
            );
        }
        outcome.memberships_removed += removed;
        last_removed = Some(removed);
        if removed > 0 {
            cleared.insert(conflict);
        }
    }
}

/// Remove every member of the blocking pool that references `node` and
/// return how many were actually removed. Any failure aborts the whole
/// deletion.
async fn remove_node_memberships<S: StateStore + ?Sized>(
    store: &S,
    node: &str,
    conflict: &ReferenceConflict,
) -> Result<usize> {
    let members = store
        .pool_members(&conflict.pool, &conflict.partition)
        .await?;

    let mut removed = 0;
    for member in members.iter().filter(|m| references_node(m, node)) {
        debug!(
            "Removing member {} from pool {}/{}",
            member, conflict.partition, conflict.pool
        );
        if remove_member(store, &conflict.pool, &conflict.partition, member).await? {
            removed += 1;
        }
    }
    Ok(removed)
}
