//! # Configuration Management Module
//!
//! Typed TOML configuration for the milestone engine and the operator CLI.
//!
//! The configuration is organized into logical sections:
//!
//! - [`EngineConfig`] - engine behavior toggles
//! - [`StorageConfig`] - data persistence settings
//! - [`LoggingConfig`] - logging level and optional file sink
//! - `[groups]` - link groups: group name to array of resource keys
//! - `[milestones.<resource>]` - per-resource milestone level definitions
//!
//! Milestone and group sections are kept as raw TOML values here and decoded
//! per entry by the registry loader, so one malformed resource or group is
//! skipped with a logged issue instead of failing the whole file.
//!
//! ## Configuration File Format
//!
//! ```toml
//! [storage]
//! data_dir = "./data"
//!
//! [groups]
//! logs = ["oak_log", "birch_log"]
//!
//! [milestones.iron_ore]
//! display = "Iron Ore"
//!
//! [[milestones.iron_ore.levels]]
//! level = 1
//! threshold = 100
//! on_claim = "give {player} reward_iron_1"
//! ```

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Link groups, decoded per entry at registry build time.
    #[serde(default)]
    pub groups: HashMap<String, toml::Value>,
    /// Milestone definitions, decoded per entry at registry build time.
    #[serde(default)]
    pub milestones: HashMap<String, toml::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Log an info line for every crossed level. On-cross reward actions are
    /// controlled per level in the milestone definitions, not here.
    #[serde(default = "default_announce_crossings")]
    pub announce_crossings: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            announce_crossings: default_announce_crossings(),
        }
    }
}

fn default_announce_crossings() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Parse a configuration document. Section-level problems are fatal;
    /// per-entry milestone/group problems are deferred to the registry
    /// loader, which skips and reports them.
    pub fn parse(content: &str) -> Result<Config> {
        let config: Config = toml::from_str(content).map_err(|e| anyhow!("invalid config: {e}"))?;
        if config.storage.data_dir.trim().is_empty() {
            return Err(anyhow!("storage.data_dir must not be empty"));
        }
        Ok(config)
    }

    /// Load configuration from a file path.
    pub async fn load(path: &str) -> Result<Config> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file: {path}"))?;
        Self::parse(&content)
    }

    /// Write a starter configuration file. Refuses to overwrite.
    pub async fn create_default(path: &str) -> Result<()> {
        if fs::metadata(path).await.is_ok() {
            return Err(anyhow!("config file already exists: {path}"));
        }
        fs::write(path, DEFAULT_CONFIG)
            .await
            .with_context(|| format!("failed to write config file: {path}"))?;
        Ok(())
    }
}

/// Starter configuration written by `lodestone init`.
pub const DEFAULT_CONFIG: &str = r#"# Lodestone milestone engine configuration

[engine]
announce_crossings = true

[storage]
data_dir = "./data"

[logging]
level = "info"
# file = "lodestone.log"

# Link groups share one progress pool across their member resources.
# A resource may belong to at most one group.
[groups]
logs = ["oak_log", "birch_log"]

[milestones.iron_ore]
display = "Iron Ore"

[[milestones.iron_ore.levels]]
level = 1
threshold = 100
on_cross = "broadcast {player} has mined {threshold} iron ore!"
on_claim = "give {player} reward_iron_1"

[[milestones.iron_ore.levels]]
level = 2
threshold = 500
on_claim = "give {player} reward_iron_2"

[milestones.oak_log]
display = "Logs"

[[milestones.oak_log.levels]]
level = 1
threshold = 50
on_claim = "give {player} reward_logs_1"

[milestones.birch_log]
display = "Logs"

[[milestones.birch_log.levels]]
level = 1
threshold = 50
on_claim = "give {player} reward_logs_1"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_parses() {
        let config = Config::parse(DEFAULT_CONFIG).unwrap();
        assert!(config.engine.announce_crossings);
        assert_eq!(config.storage.data_dir, "./data");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.groups.len(), 1);
        assert_eq!(config.milestones.len(), 3);
    }

    #[test]
    fn missing_storage_section_is_fatal() {
        assert!(Config::parse("[engine]\nannounce_crossings = false\n").is_err());
        assert!(Config::parse("[storage]\ndata_dir = \"  \"\n").is_err());
    }

    #[test]
    fn sections_default_when_absent() {
        let config = Config::parse("[storage]\ndata_dir = \"./data\"\n").unwrap();
        assert!(config.engine.announce_crossings);
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file.is_none());
        assert!(config.groups.is_empty());
        assert!(config.milestones.is_empty());
    }
}
