//! Controllers for load-balancer resources
//!
//! - [`pool`]: creates pools and converges their attributes and membership
//! - [`node`]: creates nodes and deletes them, clearing blocking pool
//!   memberships first when the store reports a reference conflict
//!
//! Every operation issues one store call at a time and reads current remote
//! state; nothing is cached between calls.

mod conflict;
#[cfg(feature = "metrics")]
pub mod metrics;
mod node;
mod pool;
#[cfg(test)]
mod pool_test;

use std::future::Future;

use tracing::debug;

use crate::error::Result;
use crate::store::StateStore;

pub use conflict::{blocking_pool, ReferenceConflict};
pub use node::{create_node, delete_node, node_exists, read_node, update_node, DeleteOutcome};
pub use pool::{
    converge_pool, create_pool, delete_pool, pool_exists, read_pool, split_monitors,
};

/// Run one controller operation, recording its duration and outcome
async fn timed<T>(controller: &str, operation: impl Future<Output = Result<T>>) -> Result<T> {
    #[cfg(feature = "metrics")]
    let start = std::time::Instant::now();

    let result = operation.await;

    #[cfg(feature = "metrics")]
    {
        metrics::observe_reconcile_duration_seconds(controller, start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            metrics::inc_reconcile_error(controller, e);
        }
    }
    #[cfg(not(feature = "metrics"))]
    let _ = controller;

    result
}

/// Remove one membership. A membership that is already gone is not an
/// error; the returned flag is false in that case.
async fn remove_member<S: StateStore + ?Sized>(
    store: &S,
    pool: &str,
    partition: &str,
    member: &str,
) -> Result<bool> {
    match store.delete_pool_member(pool, partition, member).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {
            debug!(
                "Member {} already absent from pool {}/{}",
                member, partition, pool
            );
            return Ok(false);
        }
        Err(e) => return Err(e),
    }

    #[cfg(feature = "metrics")]
    metrics::inc_membership_change(partition, pool, "remove");

    Ok(true)
}
