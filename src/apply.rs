//! Manifest-level flows
//!
//! Drives the controllers over a whole [`Manifest`]. Nodes are created before
//! pools so pool members resolve; on teardown pools go first, and any node
//! still referenced by a pool outside the manifest is handled by the
//! deletion controller.

use serde::Serialize;
use tracing::{info, instrument};

use crate::config::ReconcilerConfig;
use crate::controller;
use crate::error::Result;
use crate::resource::Manifest;
use crate::store::StateStore;

/// What an apply run changed
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub nodes_created: Vec<String>,
    /// Nodes that already existed; their attributes are never changed
    pub nodes_unchanged: Vec<String>,
    pub pools_created: Vec<String>,
    pub pools_converged: Vec<String>,
}

/// What a destroy run removed
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DestroyReport {
    pub pools_deleted: Vec<String>,
    pub nodes_deleted: Vec<String>,
    /// Memberships the deletion controller had to clear first
    pub memberships_removed: usize,
    /// Resources that were already absent
    pub skipped: Vec<String>,
}

#[instrument(skip_all)]
pub async fn apply_manifest<S: StateStore + ?Sized>(
    store: &S,
    config: &ReconcilerConfig,
    manifest: &Manifest,
) -> Result<ApplyReport> {
    manifest.validate(config)?;
    let mut report = ApplyReport::default();

    for node in &manifest.nodes {
        let name = node.effective_name();
        let partition = node.partition.as_deref();
        if controller::node_exists(store, config, name, partition).await? {
            report.nodes_unchanged.push(name.to_string());
            continue;
        }
        let state = controller::create_node(store, config, node).await?;
        report.nodes_created.push(state.id);
    }

    for pool in &manifest.pools {
        let partition = pool.partition.as_deref();
        if controller::pool_exists(store, config, &pool.name, partition).await? {
            controller::converge_pool(store, config, &pool.name, pool).await?;
            report.pools_converged.push(pool.name.clone());
        } else {
            let state = controller::create_pool(store, config, pool).await?;
            report.pools_created.push(state.id);
        }
    }

    info!(
        "Applied manifest: {} node(s) created, {} pool(s) created, {} pool(s) converged",
        report.nodes_created.len(),
        report.pools_created.len(),
        report.pools_converged.len()
    );
    Ok(report)
}

#[instrument(skip_all)]
pub async fn destroy_manifest<S: StateStore + ?Sized>(
    store: &S,
    config: &ReconcilerConfig,
    manifest: &Manifest,
) -> Result<DestroyReport> {
    manifest.validate(config)?;
    let mut report = DestroyReport::default();

    for pool in &manifest.pools {
        let partition = pool.partition.as_deref();
        if !controller::pool_exists(store, config, &pool.name, partition).await? {
            report.skipped.push(pool.name.clone());
            continue;
        }
        controller::delete_pool(store, config, &pool.name, partition).await?;
        report.pools_deleted.push(pool.name.clone());
    }

    for node in &manifest.nodes {
        let name = node.effective_name();
        let partition = node.partition.as_deref();
        if !controller::node_exists(store, config, name, partition).await? {
            report.skipped.push(name.to_string());
            continue;
        }
        let outcome = controller::delete_node(store, config, name, partition).await?;
        report.memberships_removed += outcome.memberships_removed;
        report.nodes_deleted.push(name.to_string());
    }

    info!(
        "Destroyed manifest: {} pool(s), {} node(s) deleted, {} skipped",
        report.pools_deleted.len(),
        report.nodes_deleted.len(),
        report.skipped.len()
    );
    Ok(report)
}
