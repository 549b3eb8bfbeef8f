//! Subcommands and the helpers they share.

pub mod config;
pub mod delete;
pub mod import;
pub mod parse;
pub mod records;
pub mod rules;
pub mod unknown;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::debug;

use kassa_core::models::config::KassaConfig;
use kassa_core::{Categorizer, RuleTable, Store};

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Plain text table
    Text,
}

/// `~/.config/kassa/config.json` (or the platform equivalent).
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kassa")
        .join("config.json")
}

/// Load the configuration from `--config`, the default location, or defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<KassaConfig> {
    let config = match config_path {
        Some(path) => KassaConfig::from_file(Path::new(path))
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => {
            let path = default_config_path();
            if path.exists() {
                KassaConfig::from_file(&path)
                    .with_context(|| format!("Failed to load config from {}", path.display()))?
            } else {
                debug!("No config file at {}, using defaults", path.display());
                KassaConfig::default()
            }
        }
    };
    config.validate()?;
    Ok(config)
}

pub fn open_store(config: &KassaConfig) -> anyhow::Result<Arc<Store>> {
    let path = &config.paths.database;
    let store = Store::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    Ok(Arc::new(store))
}

/// `paths.rules`, or `rules.json` next to the default config file.
pub fn rules_path(config: &KassaConfig) -> PathBuf {
    config
        .paths
        .rules
        .clone()
        .unwrap_or_else(|| default_config_path().with_file_name("rules.json"))
}

/// The rule table from [`rules_path`], or the embedded default.
pub fn load_categorizer(config: &KassaConfig) -> anyhow::Result<Arc<Categorizer>> {
    let path = rules_path(config);
    let categorizer = if path.exists() {
        Categorizer::from_file(&path)
            .with_context(|| format!("Failed to load rules from {}", path.display()))?
    } else {
        debug!("No rule file at {}, using embedded rules", path.display());
        Categorizer::new(RuleTable::default_table())
    };
    Ok(Arc::new(
        categorizer.with_unknown_tracking(config.categorizer.record_unknown),
    ))
}

/// Write to a file, or stdout when no path is given.
pub fn emit(output: Option<&Path>, content: &str) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        None => print!("{}", content),
    }
    Ok(())
}

/// Resolve a full or abbreviated content hash against the stored documents.
pub fn find_document(store: &Store, prefix: &str) -> anyhow::Result<kassa_core::ContentHash> {
    let prefix = prefix.trim().to_lowercase();
    if prefix.len() < 6 {
        anyhow::bail!("Hash prefix '{}' is too short (at least 6 characters)", prefix);
    }

    let matches: Vec<_> = store
        .documents()?
        .into_iter()
        .filter(|d| d.hash.as_str().starts_with(&prefix))
        .collect();

    match matches.as_slice() {
        [document] => Ok(document.hash.clone()),
        [] => anyhow::bail!("No document with hash {}", prefix),
        _ => anyhow::bail!("Hash prefix {} matches {} documents", prefix, matches.len()),
    }
}
