//! # dagfs-config
//!
//! Configuration management for dagfs.
//!
//! Loads configuration from:
//! 1. `~/.dagfs/config.toml` (global)
//! 2. `.dagfs/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)
//!
//! The directory engine never reads configuration on its own; callers load a
//! [`Config`] and pass the relevant values down explicitly.

pub mod logging;
pub mod testing;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use dagfs_cas::{CidVersion, Codec, HashAlg};

pub use logging::{init_logging, LogLevel};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML render error: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub mutation: MutationConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::global_config_path().as_deref(), Some(Path::new(".dagfs/config.toml")))
    }

    /// Load config from explicit global and project paths, then apply env overrides.
    ///
    /// Missing files are skipped.
    pub fn load_from(global: Option<&Path>, project: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(global_path) = global {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                let contents = std::fs::read_to_string(global_path)?;
                config = toml::from_str(&contents)?;
            }
        }

        if let Some(project_path) = project {
            if project_path.exists() {
                debug!("Loading project config from {:?}", project_path);
                let contents = std::fs::read_to_string(project_path)?;
                let overlay: toml::Table = toml::from_str(&contents)?;
                config.merge(overlay)?;
            }
        }

        config.apply_env_overrides(|key| std::env::var(key).ok())?;

        Ok(config)
    }

    /// Global config path: ~/.dagfs/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".dagfs/config.toml"))
    }

    /// Merge a project-level table over this config.
    ///
    /// Only keys present in the overlay replace existing values.
    fn merge(&mut self, overlay: toml::Table) -> Result<(), ConfigError> {
        let mut base = toml::Value::try_from(&*self)?;
        if let toml::Value::Table(sections) = &mut base {
            for (section, value) in overlay {
                match (sections.get_mut(&section), value) {
                    (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                        existing.extend(incoming);
                    }
                    (_, value) => {
                        sections.insert(section, value);
                    }
                }
            }
        }
        *self = base.try_into()?;
        Ok(())
    }

    /// Apply environment variable overrides.
    ///
    /// `lookup` is injected so tests never touch the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("DAGFS_STORE") {
            self.storage.root = PathBuf::from(path);
        }
        if let Some(threshold) = lookup("DAGFS_SHARD_SPLIT_THRESHOLD") {
            self.mutation.shard_split_threshold =
                threshold.parse().map_err(|_| invalid("DAGFS_SHARD_SPLIT_THRESHOLD", &threshold))?;
        }
        if let Some(version) = lookup("DAGFS_CID_VERSION") {
            let parsed: u8 = version.parse().map_err(|_| invalid("DAGFS_CID_VERSION", &version))?;
            self.mutation.cid_version =
                CidVersion::try_from(parsed).map_err(|_| invalid("DAGFS_CID_VERSION", &version))?;
        }
        if let Some(alg) = lookup("DAGFS_HASH_ALG") {
            self.mutation.hash_alg = alg.parse().map_err(|_| invalid("DAGFS_HASH_ALG", &alg))?;
        }
        if let Some(level) = lookup("DAGFS_LOG") {
            self.logging.level = level.parse().map_err(|_| invalid("DAGFS_LOG", &level))?;
        }
        Ok(())
    }

    /// Generate default config TOML string
    pub fn default_toml() -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&Config::default())?)
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Block store root directory
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".dagfs")
                .join("blocks"),
        }
    }
}

/// Defaults applied to directory mutations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    /// Block codec for new nodes
    pub format: Codec,
    /// Hash function for new CIDs
    pub hash_alg: HashAlg,
    /// CID version for new nodes
    pub cid_version: CidVersion,
    /// Link count above which a flat directory becomes sharded
    pub shard_split_threshold: usize,
    /// Persist new nodes (false = compute CIDs only)
    pub flush: bool,
    /// Bits of name hash consumed per shard level (fanout = 2^bits)
    pub hamt_bits: u8,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            format: Codec::DagPb,
            hash_alg: HashAlg::Sha2_256,
            cid_version: CidVersion::V0,
            shard_split_threshold: 1000,
            flush: true,
            hamt_bits: 8,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.mutation.shard_split_threshold, 1000);
        assert_eq!(config.mutation.format, Codec::DagPb);
        assert_eq!(config.mutation.cid_version, CidVersion::V0);
        assert!(config.mutation.flush);
        assert!(config.storage.root.is_absolute());
        assert!(config.storage.root.ends_with(".dagfs/blocks"));
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml().unwrap();
        assert!(toml_str.contains("[storage]"));
        assert!(toml_str.contains("[mutation]"));
        assert!(toml_str.contains("shard_split_threshold = 1000"));
        assert!(toml_str.contains("\"dag-pb\""));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DAGFS_STORE", "/srv/blocks"),
            ("DAGFS_SHARD_SPLIT_THRESHOLD", "10"),
            ("DAGFS_CID_VERSION", "1"),
            ("DAGFS_HASH_ALG", "blake3"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.storage.root, PathBuf::from("/srv/blocks"));
        assert_eq!(config.mutation.shard_split_threshold, 10);
        assert_eq!(config.mutation.cid_version, CidVersion::V1);
        assert_eq!(config.mutation.hash_alg, HashAlg::Blake3);
    }

    #[test]
    fn test_bad_env_value_is_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_env_overrides(|k| (k == "DAGFS_CID_VERSION").then(|| "7".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
