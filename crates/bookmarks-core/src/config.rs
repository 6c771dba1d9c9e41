//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/bookmarks/config.toml)
//! 3. Environment variables (BOOKMARKS_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix
const ENV_PREFIX: &str = "BOOKMARKS";

/// Default public origin used for login callback redirects
pub const DEFAULT_SITE_ORIGIN: &str = "http://localhost:3000";

/// Default realtime heartbeat interval in seconds
pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory for data storage (SQLite db, session file, logs)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Origin that login callback redirects are built against
    #[serde(default = "default_site_origin")]
    pub site_origin: String,

    /// Realtime websocket URL (optional)
    #[serde(default)]
    pub realtime_url: Option<String>,

    /// API key sent to the realtime server
    #[serde(default)]
    pub api_key: Option<String>,

    /// Whether to use the realtime server for live updates
    #[serde(default)]
    pub realtime_enabled: bool,

    /// Seconds between realtime heartbeats
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    /// Log file path (defaults to {data_dir}/debug.log)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            site_origin: default_site_origin(),
            realtime_url: None,
            api_key: None,
            realtime_enabled: false,
            heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (BOOKMARKS_DATA_DIR, BOOKMARKS_REALTIME_URL, ...)
    /// 2. Config file (~/.config/bookmarks/config.toml or BOOKMARKS_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring a path given on the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_SITE_ORIGIN", ENV_PREFIX)) {
            if !val.is_empty() {
                self.site_origin = val;
            }
        }

        // Empty string clears
        if let Ok(val) = std::env::var(format!("{}_REALTIME_URL", ENV_PREFIX)) {
            self.realtime_url = if val.is_empty() { None } else { Some(val) };
        }

        if let Ok(val) = std::env::var(format!("{}_API_KEY", ENV_PREFIX)) {
            self.api_key = if val.is_empty() { None } else { Some(val) };
        }

        if let Ok(val) = std::env::var(format!("{}_REALTIME_ENABLED", ENV_PREFIX)) {
            self.realtime_enabled = parse_bool(&val);
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    /// Set a single value by key, as used by `config set`
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let optional = |v: &str| {
            if v.is_empty() {
                None
            } else {
                Some(v.to_string())
            }
        };

        match key {
            "data_dir" => self.data_dir = PathBuf::from(value),
            "site_origin" => self.site_origin = value.trim_end_matches('/').to_string(),
            "realtime_url" => self.realtime_url = optional(value),
            "api_key" => self.api_key = optional(value),
            "realtime_enabled" => self.realtime_enabled = parse_bool(value),
            "heartbeat_secs" => {
                self.heartbeat_secs = value
                    .parse()
                    .with_context(|| format!("Invalid heartbeat_secs: {}", value))?;
            }
            "log_file" => self.log_file = optional(value).map(PathBuf::from),
            _ => anyhow::bail!(
                "Unknown config key: {}. Valid keys: {}",
                key,
                Self::KEYS.join(", ")
            ),
        }
        Ok(())
    }

    /// Keys accepted by [`Config::set_value`]
    pub const KEYS: &'static [&'static str] = &[
        "data_dir",
        "site_origin",
        "realtime_url",
        "api_key",
        "realtime_enabled",
        "heartbeat_secs",
        "log_file",
    ];

    /// Get the config file path
    ///
    /// Can be overridden with BOOKMARKS_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bookmarks")
            .join("config.toml")
    }

    /// Get the path to the SQLite database
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("bookmarks.db")
    }

    /// Get the path to the signed-in session file
    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join("session.json")
    }

    /// Get the log file path
    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("debug.log"))
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    /// Realtime URL, if realtime is enabled and configured
    pub fn active_realtime_url(&self) -> Option<&str> {
        if self.realtime_enabled {
            self.realtime_url.as_deref()
        } else {
            None
        }
    }
}

fn parse_bool(val: &str) -> bool {
    val.eq_ignore_ascii_case("true") || val == "1"
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bookmarks")
}

fn default_site_origin() -> String {
    DEFAULT_SITE_ORIGIN.to_string()
}

fn default_heartbeat_secs() -> u64 {
    DEFAULT_HEARTBEAT_SECS
}
