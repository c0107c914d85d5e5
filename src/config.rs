//! Reconciler configuration
//!
//! Loaded from a TOML file, then overlaid with CLI flags / environment
//! variables by the binary. Every field has a default so an empty file (or no
//! file at all) is a valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Partition used when a caller omits one or the store returns an empty value
pub const DEFAULT_PARTITION: &str = "Common";

/// Default cap on remediation rounds when deleting a referenced node
pub const DEFAULT_MAX_REMEDIATION_ROUNDS: u32 = 10;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct ReconcilerConfig {
    /// Partition substituted for empty/missing partition values
    pub default_partition: String,

    /// Maximum number of remediation rounds the node deletion controller runs
    /// before giving up on a node that is still referenced
    pub max_remediation_rounds: u32,

    pub store: StoreConfig,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            default_partition: DEFAULT_PARTITION.to_string(),
            max_remediation_rounds: DEFAULT_MAX_REMEDIATION_ROUNDS,
            store: StoreConfig::default(),
        }
    }
}

/// Connection settings for the management API
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct StoreConfig {
    /// Base URL, e.g. `https://10.0.0.1`
    pub url: String,
    pub username: String,
    pub password: String,

    /// Per-request timeout in seconds (default: 30)
    pub timeout_secs: u64,

    /// Skip TLS certificate verification (appliances often ship self-signed certs)
    pub accept_invalid_certs: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "https://localhost".to_string(),
            username: "admin".to_string(),
            password: String::new(),
            timeout_secs: 30,
            accept_invalid_certs: false,
        }
    }
}

impl ReconcilerConfig {
    /// Read and parse a TOML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_partition.trim().is_empty() {
            return Err(Error::ConfigError(
                "default_partition must not be empty".to_string(),
            ));
        }
        if self.max_remediation_rounds == 0 {
            return Err(Error::ConfigError(
                "max_remediation_rounds must be at least 1".to_string(),
            ));
        }
        if self.store.url.trim().is_empty() {
            return Err(Error::ConfigError("store.url must not be empty".to_string()));
        }
        Ok(())
    }

    /// Normalize a partition: missing or blank values become the default partition.
    pub fn resolve_partition(&self, partition: Option<&str>) -> String {
        match partition.map(str::trim) {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => self.default_partition.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = ReconcilerConfig::default();
        assert_eq!(cfg.default_partition, "Common");
        assert_eq!(cfg.max_remediation_rounds, 10);
        assert_eq!(cfg.store.timeout_secs, 30);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let cfg = ReconcilerConfig::from_toml("").unwrap();
        assert_eq!(cfg, ReconcilerConfig::default());
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let cfg = ReconcilerConfig::from_toml(
            r#"
default_partition = "Tenant1"

[store]
url = "https://lb.example.com"
accept_invalid_certs = true
"#,
        )
        .unwrap();
        assert_eq!(cfg.default_partition, "Tenant1");
        assert_eq!(cfg.max_remediation_rounds, 10);
        assert_eq!(cfg.store.url, "https://lb.example.com");
        assert_eq!(cfg.store.username, "admin");
        assert!(cfg.store.accept_invalid_certs);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_remediation_rounds = 3").unwrap();
        let cfg = ReconcilerConfig::from_file(file.path()).unwrap();
        assert_eq!(cfg.max_remediation_rounds, 3);
    }

    #[test]
    fn test_from_missing_file_is_config_error() {
        let err = ReconcilerConfig::from_file("/nonexistent/ltm.toml").unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = ReconcilerConfig::from_toml("max_remediation_rounds = \"many\"").unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_validate_rejects_zero_cap_and_blank_partition() {
        let mut cfg = ReconcilerConfig::default();
        cfg.max_remediation_rounds = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = ReconcilerConfig::default();
        cfg.default_partition = "  ".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_resolve_partition() {
        let cfg = ReconcilerConfig::default();
        assert_eq!(cfg.resolve_partition(None), "Common");
        assert_eq!(cfg.resolve_partition(Some("")), "Common");
        assert_eq!(cfg.resolve_partition(Some("  ")), "Common");
        assert_eq!(cfg.resolve_partition(Some("Tenant1")), "Tenant1");
    }
}
