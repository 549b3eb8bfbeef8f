//! Configuration structures for the import pipeline.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for the kassa pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KassaConfig {
    /// Watched directories and data files.
    pub paths: PathsConfig,

    /// Import batch configuration.
    pub import: ImportConfig,

    /// Categorizer configuration.
    pub categorizer: CategorizerConfig,
}

/// File system layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory with online order invoices.
    pub invoice_dir: PathBuf,

    /// Directory with in-store receipts (kassabonnen).
    pub receipt_dir: PathBuf,

    /// SQLite database file.
    pub database: PathBuf,

    /// Category rule table (JSON). The embedded default is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            invoice_dir: PathBuf::from("data/invoices"),
            receipt_dir: PathBuf::from("data/bonnen"),
            database: PathBuf::from("data/kassa.db"),
            rules: None,
        }
    }
}

/// Import batch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Number of files processed concurrently.
    pub workers: usize,

    /// Deadline for reading and parsing the whole batch, in seconds (0 = none).
    pub batch_timeout_secs: u64,

    /// Allowed difference between `quantity × unit price` and the line total.
    pub tolerance: Decimal,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            batch_timeout_secs: 300,
            tolerance: Decimal::new(1, 2),
        }
    }
}

/// Categorizer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CategorizerConfig {
    /// Keep a list of product keys no rule matched.
    pub record_unknown: bool,
}

impl Default for CategorizerConfig {
    fn default() -> Self {
        Self {
            record_unknown: true,
        }
    }
}

impl KassaConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> crate::Result<()> {
        if self.import.workers == 0 {
            return Err(crate::KassaError::Config(
                "import.workers must be at least 1".to_string(),
            ));
        }
        if self.import.tolerance.is_sign_negative() {
            return Err(crate::KassaError::Config(
                "import.tolerance must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: KassaConfig =
            serde_json::from_str(r#"{ "import": { "workers": 2 } }"#).unwrap();

        assert_eq!(config.import.workers, 2);
        assert_eq!(config.import.tolerance, Decimal::new(1, 2));
        assert_eq!(config.paths.receipt_dir, PathBuf::from("data/bonnen"));
        assert!(config.categorizer.record_unknown);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = KassaConfig::default();
        config.import.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = KassaConfig::default();
        config.paths.rules = Some(PathBuf::from("rules.json"));
        config.save(&path).unwrap();

        let loaded = KassaConfig::from_file(&path).unwrap();
        assert_eq!(loaded.paths.rules, Some(PathBuf::from("rules.json")));
        assert_eq!(loaded.import.batch_timeout_secs, 300);
    }
}
