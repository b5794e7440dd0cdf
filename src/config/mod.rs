// src/config/mod.rs
//! Configuration management module
//!
//! Settings come from defaults, then an optional TOML file, then
//! environment variables, in that order.

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::aggregate::TierPolicy;
use crate::ledger::DEFAULT_KEY_PREFIX;
use crate::storage::is_valid_key;

/// File read when no `--config` path is given.
pub const DEFAULT_CONFIG_FILE: &str = "vent.toml";

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub enrichment: EnrichmentConfig,
    pub heatmap: HeatmapConfig,
    pub logging: LoggingConfig,
}

/// Where day ledgers and recordings live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one JSON file per day
    pub data_dir: PathBuf,
    /// Directory new recordings are written to
    pub audio_dir: PathBuf,
    /// Prefix of each day's storage key
    pub key_prefix: String,
}

/// Remote transcription and analysis service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapConfig {
    pub tier_policy: TierPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

fn default_data_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vent")
}

impl Default for StorageConfig {
    fn default() -> Self {
        let root = default_data_root();
        Self {
            data_dir: root.join("ledger"),
            audio_dir: root.join("audio"),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout_secs: 120,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl EnrichmentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::load_from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Config::default(),
        };

        config.load_from_env()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Override values from environment variables
    pub fn load_from_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from `lookup`, keyed by environment variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("VENT_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("VENT_AUDIO_DIR") {
            self.storage.audio_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup("VENT_ENRICHMENT_URL") {
            self.enrichment.base_url = url;
        }
        if let Some(policy) = lookup("VENT_TIER_POLICY") {
            self.heatmap.tier_policy = policy
                .parse()
                .map_err(anyhow::Error::msg)
                .context("Invalid VENT_TIER_POLICY")?;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.storage.key_prefix.is_empty() {
            return Err(anyhow::anyhow!("Storage key prefix cannot be empty"));
        }
        if !is_valid_key(&self.storage.key_prefix) {
            return Err(anyhow::anyhow!(
                "Storage key prefix cannot start with '.' or contain '..' or path separators: {}",
                self.storage.key_prefix
            ));
        }

        if self.enrichment.base_url.is_empty() {
            return Err(anyhow::anyhow!("Enrichment base URL cannot be empty"));
        }
        if !self.enrichment.base_url.starts_with("http://")
            && !self.enrichment.base_url.starts_with("https://")
        {
            return Err(anyhow::anyhow!(
                "Enrichment base URL must be http(s): {}",
                self.enrichment.base_url
            ));
        }
        if self.enrichment.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Enrichment timeout cannot be 0"));
        }

        self.log_filter()?;

        Ok(())
    }

    /// Level filter for `env_logger`.
    pub fn log_filter(&self) -> Result<LevelFilter> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" => Ok(LevelFilter::Trace),
            "debug" => Ok(LevelFilter::Debug),
            "info" => Ok(LevelFilter::Info),
            "warn" => Ok(LevelFilter::Warn),
            "error" => Ok(LevelFilter::Error),
            "off" => Ok(LevelFilter::Off),
            _ => Err(anyhow::anyhow!("Invalid log level: {}", self.logging.level)),
        }
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = self.to_toml_string()?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.storage.key_prefix, "notes-");
        assert_eq!(config.heatmap.tier_policy, TierPolicy::Fixed);
        assert!(config.storage.data_dir.ends_with("vent/ledger"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vent.toml");
        std::fs::write(
            &path,
            "[enrichment]\nbase_url = \"https://vent.example\"\n\n[heatmap]\ntier_policy = \"relative\"\n",
        )
        .unwrap();

        let config = Config::load_from_file(&path).unwrap();

        assert_eq!(config.enrichment.base_url, "https://vent.example");
        assert_eq!(config.enrichment.timeout_secs, 120);
        assert_eq!(config.heatmap.tier_policy, TierPolicy::Relative);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn environment_overrides_file_values() {
        let vars = env(&[
            ("VENT_DATA_DIR", "/tmp/vent-data"),
            ("VENT_ENRICHMENT_URL", "http://10.0.0.2:3000"),
            ("VENT_TIER_POLICY", "relative"),
            ("LOG_LEVEL", "debug"),
        ]);
        let mut config = Config::default();

        config.apply_overrides(|name| vars.get(name).cloned()).unwrap();

        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/vent-data"));
        assert_eq!(config.enrichment.base_url, "http://10.0.0.2:3000");
        assert_eq!(config.heatmap.tier_policy, TierPolicy::Relative);
        assert_eq!(config.log_filter().unwrap(), LevelFilter::Debug);
    }

    #[test]
    fn bad_overrides_are_rejected() {
        let vars = env(&[("VENT_TIER_POLICY", "loud")]);
        let mut config = Config::default();
        assert!(config.apply_overrides(|name| vars.get(name).cloned()).is_err());

        let mut config = Config::default();
        config.logging.level = "chatty".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.enrichment.base_url = "localhost:3000".into();
        assert!(config.validate().is_err());

        for prefix in ["a/b", ".hidden-", "notes..", "a\\b"] {
            let mut config = Config::default();
            config.storage.key_prefix = prefix.into();
            assert!(config.validate().is_err(), "accepted {prefix:?}");
        }
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.toml");
        let mut config = Config::default();
        config.enrichment.timeout_secs = 30;

        config.save_to_file(&path).unwrap();

        assert_eq!(Config::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
