//! Load-balancer management API abstraction
//!
//! The controllers only talk to the remote store through [`StateStore`]:
//! - [`icontrol::IControlClient`]: REST client for the appliance
//! - [`memory::InMemoryStore`]: in-process store with the same referential rules

pub mod icontrol;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use icontrol::IControlClient;
pub use memory::InMemoryStore;

/// Separator the store uses to join monitors into a single rule
pub const MONITOR_SEPARATOR: &str = " and ";

/// A node as the store reports it
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    #[serde(default)]
    pub partition: String,
    pub address: String,
}

/// Pool attributes as the store reports them
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Pool {
    pub name: String,
    pub partition: String,
    pub allow_nat: bool,
    pub allow_snat: bool,
    pub load_balancing_mode: String,
    /// Monitor rule, monitors joined with [`MONITOR_SEPARATOR`]
    pub monitor: String,
}

/// Remote operations the reconciler needs. Each call is one round-trip; no
/// implementation may cache results between calls.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn create_node(&self, name: &str, partition: &str, address: &str) -> Result<()>;

    /// `Ok(None)` when the node does not exist
    async fn get_node(&self, name: &str, partition: &str) -> Result<Option<Node>>;

    async fn modify_node(&self, name: &str, partition: &str, node: &Node) -> Result<()>;

    /// Fails with a reference-conflict message while pool members still use the node
    async fn delete_node(&self, name: &str, partition: &str) -> Result<()>;

    /// Creates a bare pool; attributes are applied later through [`StateStore::modify_pool`]
    async fn create_pool(&self, name: &str, partition: &str) -> Result<()>;

    /// `Ok(None)` when the pool does not exist
    async fn get_pool(&self, name: &str, partition: &str) -> Result<Option<Pool>>;

    /// Full overwrite of the pool attributes
    async fn modify_pool(&self, name: &str, partition: &str, pool: &Pool) -> Result<()>;

    async fn delete_pool(&self, name: &str, partition: &str) -> Result<()>;

    /// Member references (`node:port`) of a pool
    async fn pool_members(&self, pool: &str, partition: &str) -> Result<Vec<String>>;

    async fn add_pool_member(&self, pool: &str, partition: &str, member: &str) -> Result<()>;

    async fn delete_pool_member(&self, pool: &str, partition: &str, member: &str) -> Result<()>;
}
