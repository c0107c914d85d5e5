//! Pool convergence
//!
//! The store's create call only takes a name and partition, so a pool is
//! created bare and then converged. Convergence always overwrites every
//! attribute (the store has no conditional update), then diffs membership and
//! issues one call per change: all removals first, then all additions.
//! A failing call stops convergence without undoing earlier calls; the next
//! pass re-reads the store and finishes the job.

use std::collections::BTreeSet;

use tracing::{debug, error, info, instrument, warn};

use super::{remove_member, timed};
use crate::config::ReconcilerConfig;
use crate::error::{Error, Result};
use crate::reconcile::diff;
use crate::resource::{PoolSpec, PoolState};
use crate::store::{Pool, StateStore, MONITOR_SEPARATOR};

const CONTROLLER: &str = "pool";

/// Split a monitor rule (`"/Common/http and /Common/tcp"`) into monitor names
pub fn split_monitors(rule: &str) -> BTreeSet<String> {
    rule.trim()
        .split(MONITOR_SEPARATOR)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

/// Converge attributes and membership of an existing pool on `spec`
#[instrument(skip_all, fields(pool = %id))]
pub async fn converge_pool<S: StateStore + ?Sized>(
    store: &S,
    config: &ReconcilerConfig,
    id: &str,
    spec: &PoolSpec,
) -> Result<()> {
    timed(CONTROLLER, converge(store, config, id, spec)).await
}

async fn converge<S: StateStore + ?Sized>(
    store: &S,
    config: &ReconcilerConfig,
    id: &str,
    spec: &PoolSpec,
) -> Result<()> {
    spec.validate()?;
    let partition = config.resolve_partition(spec.partition.as_deref());

    let monitors: Vec<&str> = spec.monitors.iter().map(String::as_str).collect();
    let attributes = Pool {
        name: id.to_string(),
        partition: partition.clone(),
        allow_nat: spec.allow_nat,
        allow_snat: spec.allow_snat,
        load_balancing_mode: spec.load_balancing_mode.clone(),
        monitor: monitors.join(MONITOR_SEPARATOR),
    };
    debug!("Updating attributes of pool {}/{}", partition, id);
    store.modify_pool(id, &partition, &attributes).await?;

    let observed: BTreeSet<String> = store
        .pool_members(id, &partition)
        .await?
        .into_iter()
        .collect();
    let changes = diff(&spec.member_names(), &observed);
    if changes.is_empty() {
        debug!("Pool {}/{} membership already converged", partition, id);
        return Ok(());
    }

    info!(
        "Converging pool {}/{}: removing {} member(s), adding {} member(s)",
        partition,
        id,
        changes.to_remove.len(),
        changes.to_add.len()
    );

    for member in &changes.to_remove {
        debug!("Removing member {} from pool {}/{}", member, partition, id);
        remove_member(store, id, &partition, member).await?;
    }
    for member in &changes.to_add {
        debug!("Adding member {} to pool {}/{}", member, partition, id);
        store.add_pool_member(id, &partition, member).await?;

        #[cfg(feature = "metrics")]
        super::metrics::inc_membership_change(&partition, id, "add");
    }

    Ok(())
}

/// Read a pool and its membership; `None` when the pool does not exist
#[instrument(skip_all, fields(pool = %id))]
pub async fn read_pool<S: StateStore + ?Sized>(
    store: &S,
    config: &ReconcilerConfig,
    id: &str,
    partition: Option<&str>,
) -> Result<Option<PoolState>> {
    read(store, config, id, partition).await
}

async fn read<S: StateStore + ?Sized>(
    store: &S,
    config: &ReconcilerConfig,
    id: &str,
    partition: Option<&str>,
) -> Result<Option<PoolState>> {
    let requested = config.resolve_partition(partition);
    debug!("Reading pool {}/{}", requested, id);

    let Some(pool) = store.get_pool(id, &requested).await? else {
        return Ok(None);
    };
    let nodes = store.pool_members(id, &requested).await?;

    Ok(Some(PoolState {
        id: id.to_string(),
        name: if pool.name.is_empty() {
            id.to_string()
        } else {
            pool.name
        },
        // the store omits partition on some responses
        partition: config.resolve_partition(Some(&pool.partition)),
        allow_nat: pool.allow_nat,
        allow_snat: pool.allow_snat,
        load_balancing_mode: pool.load_balancing_mode,
        monitors: split_monitors(&pool.monitor),
        nodes: nodes.into_iter().collect(),
    }))
}

/// Create a pool and converge it. If convergence fails the new pool is
/// deleted again and the convergence error is returned.
#[instrument(skip_all, fields(pool = %spec.name))]
pub async fn create_pool<S: StateStore + ?Sized>(
    store: &S,
    config: &ReconcilerConfig,
    spec: &PoolSpec,
) -> Result<PoolState> {
    timed(CONTROLLER, create(store, config, spec)).await
}

async fn create<S: StateStore + ?Sized>(
    store: &S,
    config: &ReconcilerConfig,
    spec: &PoolSpec,
) -> Result<PoolState> {
    spec.validate()?;
    let partition = config.resolve_partition(spec.partition.as_deref());

    info!("Creating pool {}/{}", partition, spec.name);
    store.create_pool(&spec.name, &partition).await?;
    let id = spec.name.as_str();

    if let Err(e) = converge(store, config, id, spec).await {
        warn!(
            "Pool {}/{} could not be configured, deleting it: {}",
            partition, id, e
        );
        if let Err(cleanup) = store.delete_pool(id, &partition).await {
            error!(
                "Failed to delete unconfigured pool {}/{}: {}",
                partition, id, cleanup
            );
        }
        return Err(e);
    }

    read(store, config, id, Some(&partition))
        .await?
        .ok_or_else(|| {
            Error::store(
                404,
                format!("pool /{partition}/{id} disappeared right after creation"),
            )
        })
}

pub async fn pool_exists<S: StateStore + ?Sized>(
    store: &S,
    config: &ReconcilerConfig,
    id: &str,
    partition: Option<&str>,
) -> Result<bool> {
    let partition = config.resolve_partition(partition);
    debug!("Checking pool {}/{} exists", partition, id);
    Ok(store.get_pool(id, &partition).await?.is_some())
}

#[instrument(skip_all, fields(pool = %id))]
pub async fn delete_pool<S: StateStore + ?Sized>(
    store: &S,
    config: &ReconcilerConfig,
    id: &str,
    partition: Option<&str>,
) -> Result<()> {
    let partition = config.resolve_partition(partition);
    info!("Deleting pool {}/{}", partition, id);
    timed(CONTROLLER, store.delete_pool(id, &partition)).await
}
