//! Configuration
//!
//! Loaded from a YAML file; every field has a default so a partial file (or
//! none at all) is valid. Command-line flags are applied on top by the binary.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Connection settings for the catalog system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Repository that resources and archival objects are listed from
    pub repository: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8089".to_string(),
            username: "admin".to_string(),
            password: "admin".to_string(),
            repository: 2,
        }
    }
}

/// Connection settings for the arrangement service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrangementConfig {
    pub base_url: String,
    pub token: Option<String>,
}

impl Default for ArrangementConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            token: None,
        }
    }
}

/// Where enriched records and deletions are sent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownstreamConfig {
    pub base_url: String,
}

impl Default for DownstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8010".to_string(),
        }
    }
}

/// Tuning for a single harvest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestSettings {
    /// Enrichment tasks allowed in flight at once
    pub concurrency: usize,
    /// Records fetched per bulk request
    pub fetch_batch_size: usize,
    /// Records per listing page
    pub page_size: u32,
    pub max_ancestor_depth: usize,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            concurrency: 10,
            fetch_batch_size: 25,
            page_size: 50,
            max_ancestor_depth: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GleanerConfig {
    pub catalog: CatalogConfig,
    pub arrangement: ArrangementConfig,
    pub downstream: DownstreamConfig,
    pub harvest: HarvestSettings,
    /// Run ledger database; defaults to the platform data directory
    pub ledger_path: Option<PathBuf>,
    pub request_timeout_secs: u64,
}

impl Default for GleanerConfig {
    fn default() -> Self {
        Self {
            catalog: CatalogConfig::default(),
            arrangement: ArrangementConfig::default(),
            downstream: DownstreamConfig::default(),
            harvest: HarvestSettings::default(),
            ledger_path: None,
            request_timeout_secs: 30,
        }
    }
}

/// Platform default location of the run ledger
pub fn default_ledger_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("gleaner").join("runs.db")
}

impl GleanerConfig {
    /// Read and validate a YAML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&text).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        Ok(config)
    }

    /// Parse and validate YAML text
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.harvest.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".to_string()));
        }
        if self.harvest.fetch_batch_size == 0 {
            return Err(ConfigError::Invalid("fetch_batch_size must be at least 1".to_string()));
        }
        if self.harvest.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be at least 1".to_string()));
        }
        if self.harvest.max_ancestor_depth == 0 {
            return Err(ConfigError::Invalid("max_ancestor_depth must be at least 1".to_string()));
        }
        for (name, url) in [
            ("catalog.base_url", &self.catalog.base_url),
            ("arrangement.base_url", &self.arrangement.base_url),
            ("downstream.base_url", &self.downstream.base_url),
        ] {
            if url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} must not be empty", name)));
            }
        }
        Ok(())
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.ledger_path.clone().unwrap_or_else(default_ledger_path)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = GleanerConfig::from_yaml("{}").unwrap();
        assert_eq!(config, GleanerConfig::default());
        assert_eq!(config.harvest.concurrency, 10);
        assert_eq!(config.harvest.fetch_batch_size, 25);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = GleanerConfig::from_yaml(
            r#"
catalog:
  base_url: https://aspace.example.org/api
  password: secret
harvest:
  concurrency: 4
ledger_path: /var/lib/gleaner/runs.db
"#,
        )
        .unwrap();

        assert_eq!(config.catalog.base_url, "https://aspace.example.org/api");
        assert_eq!(config.catalog.username, "admin");
        assert_eq!(config.catalog.repository, 2);
        assert_eq!(config.harvest.concurrency, 4);
        assert_eq!(config.harvest.page_size, 50);
        assert_eq!(config.ledger_path(), PathBuf::from("/var/lib/gleaner/runs.db"));
    }

    #[test]
    fn zero_concurrency_is_invalid() {
        let err = GleanerConfig::from_yaml("harvest:\n  concurrency: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn empty_base_url_is_invalid() {
        let err = GleanerConfig::from_yaml("downstream:\n  base_url: ''\n").unwrap_err();
        assert!(err.to_string().contains("downstream.base_url"));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = GleanerConfig::load(dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gleaner.yaml");
        std::fs::write(&path, "request_timeout_secs: 5\n").unwrap();
        let config = GleanerConfig::load(&path).unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn default_ledger_path_is_under_gleaner() {
        assert!(default_ledger_path().ends_with("gleaner/runs.db"));
    }
}
