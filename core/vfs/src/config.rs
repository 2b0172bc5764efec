//! Filesystem configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use gitmount_common::{Error, Result};

/// Marker file that desktop file managers probe in every directory.
pub const DEFAULT_HIDDEN_MARKER: &str = ".hidden";

/// Tunables for a mounted repository.
///
/// Stored as JSON; every field is optional in the file and falls back to
/// its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    /// Maximum number of cached ref link targets.
    pub link_cache_capacity: u64,
    /// How long a cached link target may be served before re-resolving.
    pub link_cache_ttl_secs: u64,
    /// Interval between explicit expiry sweeps of the link cache.
    pub sweep_interval_secs: u64,
    /// Attribute/entry TTL handed to the kernel.
    pub attr_ttl_secs: u64,
    /// Entry name that always resolves to "not found".
    pub hidden_marker: String,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            link_cache_capacity: 1024,
            link_cache_ttl_secs: 60,
            sweep_interval_secs: 30,
            attr_ttl_secs: 1,
            hidden_marker: DEFAULT_HIDDEN_MARKER.to_string(),
        }
    }
}

impl FsConfig {
    /// Check that every limit is usable.
    ///
    /// # Errors
    /// - Zero cache capacity, TTL or sweep interval
    /// - Empty or multi-segment hidden marker
    pub fn validate(&self) -> Result<()> {
        if self.link_cache_capacity == 0 {
            return Err(Error::InvalidInput(
                "link_cache_capacity must be greater than zero".to_string(),
            ));
        }
        if self.link_cache_ttl_secs == 0 {
            return Err(Error::InvalidInput(
                "link_cache_ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(Error::InvalidInput(
                "sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.hidden_marker.is_empty() || self.hidden_marker.contains('/') {
            return Err(Error::InvalidInput(format!(
                "hidden_marker '{}' must be a single non-empty name",
                self.hidden_marker
            )));
        }
        Ok(())
    }

    pub fn link_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.link_cache_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn attr_ttl(&self) -> Duration {
        Duration::from_secs(self.attr_ttl_secs)
    }

    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize and validate configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| Error::Io(e).context(path.display()))?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = FsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.hidden_marker, ".hidden");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = FsConfig::from_json(r#"{ "link_cache_ttl_secs": 5 }"#).unwrap();
        assert_eq!(config.link_cache_ttl(), Duration::from_secs(5));
        assert_eq!(config.link_cache_capacity, 1024);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(FsConfig::from_json(r#"{ "link_cache_capacity": 0 }"#).is_err());
    }

    #[test]
    fn test_marker_with_separator_rejected() {
        let config = FsConfig {
            hidden_marker: "a/b".to_string(),
            ..FsConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = FsConfig {
            sweep_interval_secs: 7,
            ..FsConfig::default()
        };
        let restored = FsConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gitmount.json");
        std::fs::write(&path, r#"{ "attr_ttl_secs": 3 }"#).unwrap();

        let config = FsConfig::load(&path).unwrap();
        assert_eq!(config.attr_ttl(), Duration::from_secs(3));
    }
}
