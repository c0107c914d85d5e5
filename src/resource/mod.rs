//! Declared resources
//!
//! Desired-state types supplied by the caller (typically from a manifest) and
//! the observed-state types the controllers return after reading the store.

pub mod manifest;
pub mod member;
mod node;
mod pool;

pub use manifest::Manifest;
pub use member::{references_node, MemberRef};
pub use node::{NodeSpec, NodeState};
pub use pool::{PoolSpec, PoolState, DEFAULT_LOAD_BALANCING_MODE};
