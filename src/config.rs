use crate::fs_ops::RetryPolicy;
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Root of the per-book cover/thumbnail cache (`<dir>/<book id>`).
    #[serde(default)]
    pub image_cache_dir: Option<PathBuf>,
    /// Root of the per-book metadata backups (`<dir>/<book id>`).
    #[serde(default)]
    pub metadata_backup_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_db_path() -> String {
    "shelfkeeper.db".to_string()
}

fn default_drain_timeout_ms() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    100
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            ignore_patterns: Vec::new(),
            drain_timeout_ms: default_drain_timeout_ms(),
            retry: RetryConfig::default(),
            image_cache_dir: None,
            metadata_backup_dir: None,
        }
    }
}

impl AppConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts.max(1),
            delay: Duration::from_millis(self.retry.delay_ms),
        }
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Reads `Config.toml` (optional) and `SHELFKEEPER__*` environment overrides.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(Environment::with_prefix("SHELFKEEPER").separator("__"))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}
