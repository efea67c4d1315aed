//! Configuration loading and management.
//!
//! Engram reads configuration from `~/.engram/config.toml` (if present) with
//! environment variable overrides (`ENGRAM_DB`, `ENGRAM_TIER`,
//! `ENGRAM_PROVIDER`, `ENGRAM_PROVIDER_ENDPOINT`, `ENGRAM_LOG_LEVEL`). All
//! fields have sensible defaults — no configuration file is required.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Top-level configuration, deserialized from `config.toml`.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct EngramConfig {
    /// Logging settings.
    pub server: ServerConfig,
    /// Database path.
    pub storage: StorageConfig,
    /// Embedding tier, provider, and batching strategy.
    pub embedding: EmbeddingConfig,
    /// Recall scoring, thresholds, and reinforcement deltas.
    pub engine: EngineTuning,
    /// Decay worker cadence and pruning.
    pub decay: DecayConfig,
}

/// Logging settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// Tracing log level (e.g. `"info"`, `"debug"`, `"trace"`).
    pub log_level: String,
}

/// Database path.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file (supports `~` expansion).
    pub db_path: String,
}

/// Embedding strategy.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Performance tier: `"hybrid"`, `"fast"`, `"smart"`, or `"deep"`.
    pub tier: String,
    /// Provider backend: `"openai"`, `"gemini"`, `"aws"`, `"ollama"`,
    /// `"local"`, or `"synthetic"`.
    pub provider: String,
    /// HTTP base URL for the provider (required for `ollama` and `local`,
    /// optional elsewhere).
    pub provider_endpoint: Option<String>,
    /// Provider model identifier; each provider has a sensible default.
    pub model: Option<String>,
    /// Batching strategy: `"simple"` (one call per input) or `"advanced"`
    /// (one call per sector).
    pub embed_mode: String,
    /// Bound on every external provider call, in seconds.
    pub timeout_secs: u64,
    /// Dimension of the stored mean vector used for waypoint matching.
    pub mean_dim: usize,
}

/// Recall and reinforcement tuning.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineTuning {
    /// Default floor for the composite recall score.
    pub min_score: f64,
    /// Default result count for `query`.
    pub default_limit: usize,
    /// Minimum cosine between mean vectors for waypoint creation.
    pub waypoint_threshold: f64,
    /// Salience bump applied on recall or explicit reinforcement.
    pub salience_reinforce_delta: f64,
    /// Weight bump applied to waypoints traversed during recall.
    pub waypoint_reinforce_delta: f64,
}

/// Decay worker settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DecayConfig {
    /// Minutes between decay cycles.
    pub decay_interval_minutes: u64,
    /// Waypoints below this weight are pruned.
    pub waypoint_prune_weight: f64,
    /// Days between waypoint pruning passes.
    pub waypoint_prune_days: u64,
    /// Number of shards a decay cycle is split into.
    pub shards: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_engram_dir()
            .join("memory.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            tier: "fast".into(),
            provider: "synthetic".into(),
            provider_endpoint: None,
            model: None,
            embed_mode: "simple".into(),
            timeout_secs: 30,
            mean_dim: 256,
        }
    }
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            min_score: 0.3,
            default_limit: 10,
            waypoint_threshold: 0.75,
            salience_reinforce_delta: 0.1,
            waypoint_reinforce_delta: 0.05,
        }
    }
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            decay_interval_minutes: 120,
            waypoint_prune_weight: 0.05,
            waypoint_prune_days: 7,
            shards: 4,
        }
    }
}

/// Returns `~/.engram/`
pub fn default_engram_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".engram")
}

/// Returns the default config file path: `~/.engram/config.toml`
pub fn default_config_path() -> PathBuf {
    default_engram_dir().join("config.toml")
}

impl EngramConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            EngramConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_with(|key| std::env::var(key));
    }

    /// Apply overrides using a custom env lookup function.
    fn apply_env_overrides_with(
        &mut self,
        env: impl Fn(&str) -> Result<String, std::env::VarError>,
    ) {
        if let Ok(val) = env("ENGRAM_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = env("ENGRAM_TIER") {
            self.embedding.tier = val;
        }
        if let Ok(val) = env("ENGRAM_PROVIDER") {
            self.embedding.provider = val;
        }
        if let Ok(val) = env("ENGRAM_PROVIDER_ENDPOINT") {
            self.embedding.provider_endpoint = Some(val);
        }
        if let Ok(val) = env("ENGRAM_LOG_LEVEL") {
            self.server.log_level = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}
