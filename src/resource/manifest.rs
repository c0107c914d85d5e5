//! Declared state for a whole partition set, loaded from YAML
//!
//! ```yaml
//! nodes:
//!   - name: web1
//!     address: 10.0.0.1
//! pools:
//!   - name: web
//!     nodes: ["web1:80"]
//!     monitors: ["/Common/http"]
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{NodeSpec, PoolSpec};
use crate::config::ReconcilerConfig;
use crate::error::{Error, Result};

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Manifest {
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub pools: Vec<PoolSpec>,
}

impl Manifest {
    pub fn from_yaml(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read manifest {}: {e}", path.display()))
        })?;
        Self::from_yaml(&raw)
    }

    /// Validate every resource and reject duplicate identities within a
    /// partition. Members that point at nodes not declared here are only
    /// warned about, since they may already exist on the store.
    pub fn validate(&self, config: &ReconcilerConfig) -> Result<()> {
        let mut node_ids = BTreeSet::new();
        for node in &self.nodes {
            node.validate()?;
            let id = (
                config.resolve_partition(node.partition.as_deref()),
                node.effective_name().to_string(),
            );
            if !node_ids.insert(id) {
                return Err(Error::ValidationError(format!(
                    "node '{}' is declared more than once",
                    node.effective_name()
                )));
            }
        }

        let mut pool_ids = BTreeSet::new();
        for pool in &self.pools {
            pool.validate()?;
            let partition = config.resolve_partition(pool.partition.as_deref());
            if !pool_ids.insert((partition.clone(), pool.name.clone())) {
                return Err(Error::ValidationError(format!(
                    "pool '{}' is declared more than once",
                    pool.name
                )));
            }
            for member in &pool.nodes {
                let id = (partition.clone(), member.node_name().to_string());
                if !node_ids.contains(&id) {
                    warn!(
                        "Pool {}/{} member {} references node {} which is not declared in the manifest",
                        partition,
                        pool.name,
                        member,
                        member.node_name()
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
nodes:
  - name: web1
    address: 10.0.0.1
  - address: 10.0.0.2
pools:
  - name: web
    nodes: ["web1:80", "10.0.0.2:80"]
    monitors: ["/Common/http", "/Common/tcp"]
    allow_snat: false
"#;

    #[test]
    fn test_parse_sample() {
        let manifest = Manifest::from_yaml(SAMPLE).unwrap();
        assert_eq!(manifest.nodes.len(), 2);
        assert_eq!(manifest.nodes[1].effective_name(), "10.0.0.2");
        assert_eq!(manifest.pools[0].nodes.len(), 2);
        assert!(!manifest.pools[0].allow_snat);
        assert!(manifest.validate(&ReconcilerConfig::default()).is_ok());
    }

    #[test]
    fn test_duplicate_node_is_rejected() {
        let manifest = Manifest::from_yaml(
            "nodes:\n  - {name: a, address: 10.0.0.1}\n  - {name: a, address: 10.0.0.2}\n",
        )
        .unwrap();
        assert!(matches!(
            manifest.validate(&ReconcilerConfig::default()),
            Err(Error::ValidationError(_))
        ));
    }

    #[test]
    fn test_same_name_in_other_partition_is_allowed() {
        let manifest = Manifest::from_yaml(
            "nodes:\n  - {name: a, address: 10.0.0.1}\n  - {name: a, address: 10.0.0.1, partition: Tenant1}\n",
        )
        .unwrap();
        assert!(manifest.validate(&ReconcilerConfig::default()).is_ok());
    }

    #[test]
    fn test_malformed_yaml_is_manifest_error() {
        assert!(matches!(
            Manifest::from_yaml("pools: {"),
            Err(Error::ManifestError(_))
        ));
    }
}
