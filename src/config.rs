use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalyticsConfig {
    /// Default trend bucket width in minutes.
    #[serde(default = "default_granularity_minutes")]
    pub granularity_minutes: i64,
    /// Default cap for entity/category roll-ups (0 = unbounded).
    #[serde(default = "default_rollup_limit")]
    pub rollup_limit: usize,
}

fn default_granularity_minutes() -> i64 {
    60
}
fn default_rollup_limit() -> usize {
    0
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            granularity_minutes: default_granularity_minutes(),
            rollup_limit: default_rollup_limit(),
        }
    }
}

impl Config {
    /// Config rooted at a database path, with analytics defaults. Used by
    /// tests and by callers embedding the engine without a config file.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            analytics: AnalyticsConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read config file {}: {e}", path.display())))?;

    let config: Config =
        toml::from_str(&content).map_err(|e| Error::Config(format!("failed to parse config file: {e}")))?;

    if config.analytics.granularity_minutes < 1 {
        return Err(Error::Config(
            "analytics.granularity_minutes must be >= 1".to_string(),
        ));
    }

    Ok(config)
}
