//! Configuration loading
//!
//! # Hierarchy
//!
//! 1. Built-in defaults
//! 2. Global config: `~/.config/dbsem/config.toml`
//! 3. Project config: `.dbsem/config.toml`
//! 4. Environment variables: `DBSEM_*`
//!
//! Files are partial: only keys present in a file override the layer below.
//! Unknown keys are rejected so typos do not silently fall back to defaults.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{lock::MAX_TIMEOUT_SECS, Error, Result};

/// Default logical database name.
pub const DEFAULT_DATABASE: &str = "default";
/// Default lock table name.
pub const DEFAULT_TABLE: &str = "semaphore_locks";
/// Default lease duration.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
/// Default wait between contended acquisition attempts.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 15;

const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576; // 1 MB

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub lock: LockConfig,
}

/// Where the lock table lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Logical database name handed to the store-handle supplier
    pub database: String,
    /// `SQLite` connection URL
    pub url: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: DEFAULT_DATABASE.to_string(),
            url: "sqlite:dbsem.db".to_string(),
            max_connections: 5,
            busy_timeout_ms: 5_000,
        }
    }
}

/// Lock table and timing defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub table: String,
    pub timeout_secs: u64,
    pub retry_delay_secs: u64,
    pub keepalive_secs: Option<u64>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            keepalive_secs: None,
        }
    }
}

impl LockConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    #[must_use]
    pub fn keepalive(&self) -> Option<Duration> {
        self.keepalive_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    pub store: Option<PartialStoreConfig>,
    pub lock: Option<PartialLockConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialStoreConfig {
    pub database: Option<String>,
    pub url: Option<String>,
    pub max_connections: Option<u32>,
    pub busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialLockConfig {
    pub table: Option<String>,
    pub timeout_secs: Option<u64>,
    pub retry_delay_secs: Option<u64>,
    pub keepalive_secs: Option<u64>,
}

impl Config {
    /// Overlay the keys present in `partial`.
    pub fn merge_partial(&mut self, partial: PartialConfig) {
        if let Some(store) = partial.store {
            if let Some(database) = store.database {
                self.store.database = database;
            }
            if let Some(url) = store.url {
                self.store.url = url;
            }
            if let Some(max) = store.max_connections {
                self.store.max_connections = max;
            }
            if let Some(ms) = store.busy_timeout_ms {
                self.store.busy_timeout_ms = ms;
            }
        }
        if let Some(lock) = partial.lock {
            if let Some(table) = lock.table {
                self.lock.table = table;
            }
            if let Some(secs) = lock.timeout_secs {
                self.lock.timeout_secs = secs;
            }
            if let Some(secs) = lock.retry_delay_secs {
                self.lock.retry_delay_secs = secs;
            }
            if lock.keepalive_secs.is_some() {
                self.lock.keepalive_secs = lock.keepalive_secs;
            }
        }
    }

    fn apply_env_vars(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var("DBSEM_DATABASE") {
            self.store.database = value;
        }
        if let Ok(value) = std::env::var("DBSEM_DATABASE_URL") {
            self.store.url = value;
        }
        if let Ok(value) = std::env::var("DBSEM_TABLE") {
            self.lock.table = value;
        }
        if let Ok(value) = std::env::var("DBSEM_TIMEOUT_SECS") {
            self.lock.timeout_secs = parse_env("DBSEM_TIMEOUT_SECS", &value)?;
        }
        if let Ok(value) = std::env::var("DBSEM_RETRY_DELAY_SECS") {
            self.lock.retry_delay_secs = parse_env("DBSEM_RETRY_DELAY_SECS", &value)?;
        }
        if let Ok(value) = std::env::var("DBSEM_KEEPALIVE_SECS") {
            self.lock.keepalive_secs = Some(parse_env("DBSEM_KEEPALIVE_SECS", &value)?);
        }
        Ok(())
    }

    /// Reject values no lock service can run with.
    pub fn validate(&self) -> Result<()> {
        if self.store.database.trim().is_empty() {
            return Err(Error::InvalidConfig("store.database cannot be empty".into()));
        }
        if self.store.url.trim().is_empty() {
            return Err(Error::InvalidConfig("store.url cannot be empty".into()));
        }
        if self.store.max_connections == 0 {
            return Err(Error::InvalidConfig(
                "store.max_connections must be at least 1".into(),
            ));
        }
        validate_table_name(&self.lock.table).map_err(|_| {
            Error::InvalidConfig(format!(
                "lock.table '{}' is not a valid identifier",
                self.lock.table
            ))
        })?;
        if self.lock.timeout_secs == 0 {
            return Err(Error::InvalidConfig("lock.timeout_secs must be positive".into()));
        }
        if self.lock.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(Error::InvalidConfig(format!(
                "lock.timeout_secs must be at most {MAX_TIMEOUT_SECS}"
            )));
        }
        if self.lock.retry_delay_secs == 0 {
            return Err(Error::InvalidConfig("lock.retry_delay_secs must be positive".into()));
        }
        match self.lock.keepalive_secs {
            Some(0) => Err(Error::InvalidConfig("lock.keepalive_secs must be positive".into())),
            Some(secs) if secs >= self.lock.timeout_secs => Err(Error::InvalidConfig(format!(
                "lock.keepalive_secs ({secs}) must be shorter than lock.timeout_secs ({})",
                self.lock.timeout_secs
            ))),
            _ => Ok(()),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::InvalidConfig(format!("Invalid {key} value '{value}': {e}")))
}

/// Table names are spliced into SQL text, so only plain identifiers pass.
pub fn validate_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && table.len() <= 64 {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "table name '{table}' must match [A-Za-z_][A-Za-z0-9_]{{0,63}}"
        )))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PUBLIC API
// ═══════════════════════════════════════════════════════════════════════════

/// Load configuration from all sources with hierarchy
pub async fn load_config() -> Result<Config> {
    let global = global_config_path();
    let project = project_config_path();
    load_config_from(global.as_deref(), project.as_deref()).await
}

/// Load configuration from explicit file locations, then the environment.
pub async fn load_config_from(global: Option<&Path>, project: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    for path in [global, project].into_iter().flatten() {
        match load_partial_toml_file(path).await {
            Ok(partial) => config.merge_partial(partial),
            Err(Error::Io(_)) => {
                tracing::debug!(path = %path.display(), "config file not present, skipping");
            }
            Err(e) => return Err(e),
        }
    }

    config.apply_env_vars()?;
    config.validate()?;
    Ok(config)
}

/// Load a TOML file into a `PartialConfig`.
pub async fn load_partial_toml_file(path: &Path) -> Result<PartialConfig> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| {
        Error::Io(format!(
            "Failed to read config file metadata {}: {e}",
            path.display()
        ))
    })?;

    if metadata.len() > MAX_CONFIG_FILE_SIZE {
        return Err(Error::InvalidConfig(format!(
            "Config file {} exceeds maximum size of {MAX_CONFIG_FILE_SIZE} bytes",
            path.display()
        )));
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Io(format!("Failed to read config file {}: {e}", path.display())))?;

    toml::from_str(&content)
        .map_err(|e| Error::Parse(format!("Failed to parse config file {}: {e}", path.display())))
}

fn project_config_path() -> Option<PathBuf> {
    std::env::current_dir()
        .ok()
        .map(|dir| dir.join(".dbsem/config.toml"))
}

fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "dbsem")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
