//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// TOML-backed file configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Remote store RPC endpoint.
    pub endpoint: Option<String>,
    /// RPC package prefix of the store's services.
    pub rpc_package: Option<String>,
    /// Database pool max connections (1..=20).
    pub db_max_connections: Option<u32>,
    /// Database busy timeout in milliseconds.
    pub db_busy_timeout_ms: Option<u32>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// HTTP read timeout in seconds.
    pub read_timeout_secs: Option<u64>,
    /// Reads of a pending block before giving up (1..=1000).
    pub pending_retry_attempts: Option<u32>,
    /// Seconds between reads of a pending block (0..=600).
    pub pending_retry_delay_secs: Option<u64>,
}

impl FileConfig {
    /// Validates config values against runtime constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(endpoint) = &self.endpoint
            && endpoint.trim().is_empty()
        {
            bail!("Invalid config value for `endpoint`: must not be empty");
        }
        validate_range("db_max_connections", self.db_max_connections, 1..=20)?;
        validate_range("db_busy_timeout_ms", self.db_busy_timeout_ms, 0..=120_000)?;
        validate_range("connect_timeout_secs", self.connect_timeout_secs, 1..=3600)?;
        validate_range("read_timeout_secs", self.read_timeout_secs, 1..=3600)?;
        validate_range("pending_retry_attempts", self.pending_retry_attempts, 1..=1000)?;
        validate_range("pending_retry_delay_secs", self.pending_retry_delay_secs, 0..=600)?;
        Ok(())
    }
}

fn validate_range<T>(field: &str, value: Option<T>, range: std::ops::RangeInclusive<T>) -> Result<()>
where
    T: PartialOrd + std::fmt::Display,
{
    let Some(value) = value else {
        return Ok(());
    };
    if !range.contains(&value) {
        bail!(
            "Invalid config value for `{field}`: {value}. Expected range: {}..={}",
            range.start(),
            range.end()
        );
    }
    Ok(())
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config, default when no file exists.
    pub config: FileConfig,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/blockdrive/config.toml`
/// 2. `$HOME/.config/blockdrive/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("blockdrive")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("blockdrive")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from the default path if present.
pub fn load_default_file_config() -> Result<LoadedConfig> {
    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path) if path.exists() => load_file_config(path)?,
        _ => FileConfig::default(),
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let config: FileConfig = toml::from_str(raw)?;
    config.validate()?;
    Ok(config)
}

/// Default directory for the record database and preferences.
///
/// `$XDG_DATA_HOME/blockdrive` (or the platform equivalent), falling back to
/// `./.blockdrive`.
#[must_use]
pub fn default_state_dir() -> PathBuf {
    dirs::data_dir().map_or_else(|| PathBuf::from(".blockdrive"), |dir| dir.join("blockdrive"))
}
