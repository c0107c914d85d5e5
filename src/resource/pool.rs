//! Declared and observed pool state

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::member::MemberRef;
use crate::error::{Error, Result};

pub const DEFAULT_LOAD_BALANCING_MODE: &str = "round-robin";

/// Desired pool configuration
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PoolSpec {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,

    /// Members in `node_name:port` form, e.g. `node01:443`
    #[serde(default)]
    pub nodes: BTreeSet<MemberRef>,

    /// Monitors; all of them must pass for a member to be up
    #[serde(default)]
    pub monitors: BTreeSet<String>,

    #[serde(default = "default_true")]
    pub allow_nat: bool,

    #[serde(default = "default_true")]
    pub allow_snat: bool,

    #[serde(default = "default_load_balancing_mode")]
    pub load_balancing_mode: String,
}

fn default_true() -> bool {
    true
}

fn default_load_balancing_mode() -> String {
    DEFAULT_LOAD_BALANCING_MODE.to_string()
}

impl PoolSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition: None,
            nodes: BTreeSet::new(),
            monitors: BTreeSet::new(),
            allow_nat: true,
            allow_snat: true,
            load_balancing_mode: default_load_balancing_mode(),
        }
    }

    pub fn with_members<'a>(mut self, members: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        for member in members {
            self.nodes.insert(MemberRef::parse(member)?);
        }
        Ok(self)
    }

    pub fn with_monitors<'a>(mut self, monitors: impl IntoIterator<Item = &'a str>) -> Self {
        self.monitors
            .extend(monitors.into_iter().map(str::to_string));
        self
    }

    /// Desired member references as plain strings
    pub fn member_names(&self) -> BTreeSet<String> {
        self.nodes.iter().map(|m| m.as_str().to_string()).collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::ValidationError(
                "pool name must not be empty".to_string(),
            ));
        }
        if self.load_balancing_mode.trim().is_empty() {
            return Err(Error::ValidationError(format!(
                "pool '{}': load_balancing_mode must not be empty",
                self.name
            )));
        }
        if let Some(monitor) = self.monitors.iter().find(|m| m.trim().is_empty()) {
            return Err(Error::ValidationError(format!(
                "pool '{}': invalid monitor '{monitor}'",
                self.name
            )));
        }
        Ok(())
    }
}

/// Pool as last observed on the store
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct PoolState {
    /// Identity assigned at creation
    pub id: String,
    pub name: String,
    pub partition: String,
    pub allow_nat: bool,
    pub allow_snat: bool,
    pub load_balancing_mode: String,
    pub monitors: BTreeSet<String>,
    pub nodes: BTreeSet<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_yaml() {
        let spec: PoolSpec = serde_yaml::from_str("name: web").unwrap();
        assert!(spec.allow_nat);
        assert!(spec.allow_snat);
        assert_eq!(spec.load_balancing_mode, "round-robin");
        assert!(spec.nodes.is_empty());
        assert!(spec.monitors.is_empty());
        assert!(spec.partition.is_none());
    }

    #[test]
    fn test_invalid_member_fails_to_parse() {
        let result: std::result::Result<PoolSpec, _> =
            serde_yaml::from_str("name: web\nnodes: [\"web1\"]");
        assert!(result.is_err());
    }

    #[test]
    fn test_member_names() {
        let spec = PoolSpec::new("web")
            .with_members(["b:80", "a:80"])
            .unwrap();
        let names: Vec<_> = spec.member_names().into_iter().collect();
        assert_eq!(names, vec!["a:80".to_string(), "b:80".to_string()]);
    }

    #[test]
    fn test_validate() {
        assert!(PoolSpec::new("web").validate().is_ok());
        assert!(PoolSpec::new(" ").validate().is_err());
        assert!(PoolSpec::new("web").with_monitors([""]).validate().is_err());
    }
}
