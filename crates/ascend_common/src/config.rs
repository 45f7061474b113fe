//! Ascend configuration.
//!
//! Configuration lives in /etc/ascend/config.toml. Every field has a serde
//! default so a partial (or absent) file still yields a working daemon.
//!
//! Award modes are declared here, one per activity kind: the instant and
//! batch code paths can never both pay out a window because a kind is in
//! exactly one mode per deployment.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use ascend_shared::activity::ActivityKind;
use ascend_shared::scoring::ScoringConfig;
use ascend_shared::settlement::AwardMode;

/// System configuration directory
pub const SYSTEM_CONFIG_DIR: &str = "/etc/ascend";
const CONFIG_FILE: &str = "config.toml";

/// Ascend data directory (database, logs)
pub const DATA_DIR: &str = "/var/lib/ascend";

const DB_FILE: &str = "ascend.db";

/// One declared award mode per activity kind.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AwardModes {
    pub mood: AwardMode,
    pub health: AwardMode,
    pub coding: AwardMode,
}

impl AwardModes {
    pub fn for_kind(&self, kind: ActivityKind) -> AwardMode {
        match kind {
            ActivityKind::Mood => self.mood,
            ActivityKind::Health => self.health,
            ActivityKind::Coding => self.coding,
        }
    }
}

/// Batch sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
    pub enabled: bool,
    /// How often the sweep wakes up to settle completed windows.
    pub interval_minutes: u64,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: 30,
        }
    }
}

/// Advisory scorer (local Ollama) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorSettings {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    /// Per-call budget. The settlement transaction never waits on the
    /// advisor; this bounds the consult that happens before it.
    pub timeout_secs: u64,
}

impl Default for AdvisorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "llama3.2:3b".to_string(),
            timeout_secs: 20,
        }
    }
}

/// Full daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub modes: AwardModes,
    pub sweep: SweepSettings,
    pub advisor: AdvisorSettings,
    pub scoring: ScoringConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DATA_DIR),
            modes: AwardModes::default(),
            sweep: SweepSettings::default(),
            advisor: AdvisorSettings::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

impl Config {
    pub fn config_path() -> PathBuf {
        PathBuf::from(SYSTEM_CONFIG_DIR).join(CONFIG_FILE)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE)
    }

    /// Load from the system config file.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Load the system config, falling back to defaults on any problem.
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                warn!("Using default configuration: {e:#}");
                Self::default()
            }
        }
    }

    /// Write the config back to the system config file.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.sweep.enabled);
        assert_eq!(config.sweep.interval_minutes, 30);
        assert_eq!(config.modes.for_kind(ActivityKind::Mood), AwardMode::Daily);
        assert_eq!(config.db_path(), PathBuf::from("/var/lib/ascend/ascend.db"));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [modes]
            health = "instant"

            [sweep]
            interval_minutes = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.modes.health, AwardMode::Instant);
        assert_eq!(config.modes.coding, AwardMode::Daily);
        assert_eq!(config.sweep.interval_minutes, 5);
        assert!(config.sweep.enabled);
        assert!(config.advisor.enabled);
    }

    #[test]
    fn test_round_trip() {
        let mut config = Config::default();
        config.advisor.enabled = false;
        config.scoring.mood.instant_cap = 25;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&toml_str).unwrap();
        assert!(!back.advisor.enabled);
        assert_eq!(back.scoring.mood.instant_cap, 25);
    }
}
