//! ltm-reconciler: declarative management of load-balancer nodes and pools
//!
//! This crate converges pools on their declared attributes and membership and
//! deletes nodes safely, clearing the pool memberships that block a deletion
//! before retrying it.

pub mod apply;
pub mod config;
pub mod controller;
pub mod error;
pub mod reconcile;
pub mod resource;
pub mod store;
pub mod telemetry;

pub use crate::error::{Error, Result};
