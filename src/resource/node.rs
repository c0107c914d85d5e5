//! Declared and observed node state

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Desired node. Nodes are replace-only: name, address and partition are
/// fixed once the node exists.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct NodeSpec {
    /// Defaults to the address when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub address: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
}

impl NodeSpec {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            address: address.into(),
            partition: None,
        }
    }

    /// The identity this node gets on creation
    pub fn effective_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.address,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(Error::ValidationError(format!(
                "node '{}': address must not be empty",
                self.name.as_deref().unwrap_or_default()
            )));
        }
        // an address-derived name may be IPv6; only explicit names are checked
        if let Some(name) = self.name.as_deref().filter(|n| n.contains(':')) {
            return Err(Error::ValidationError(format!(
                "node '{name}': name must not contain ':'"
            )));
        }
        Ok(())
    }
}

/// Node as last observed on the store
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct NodeState {
    /// Identity assigned at creation
    pub id: String,
    pub name: String,
    pub partition: String,
    pub address: String,
}
