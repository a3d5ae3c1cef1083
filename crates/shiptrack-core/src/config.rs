//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! the API base URL, where tokens are persisted, renewal timing, the
//! front-end paths the session navigates to, and the last email used to
//! log in.
//!
//! Configuration is stored at `~/.config/shiptrack/config.json`, and a few
//! fields can be overridden from the environment.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Application name used for config/data directory paths
const APP_NAME: &str = "shiptrack";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000";

/// Access tokens live ~5 minutes; renewing every 4 keeps one valid.
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 4 * 60;

/// Consecutive transient renewal failures tolerated before the session ends.
const DEFAULT_MAX_REFRESH_FAILURES: u32 = 3;

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const ENV_API_URL: &str = "SHIPTRACK_API_URL";
pub const ENV_TOKEN_STORE: &str = "SHIPTRACK_TOKEN_STORE";
pub const ENV_REFRESH_INTERVAL: &str = "SHIPTRACK_REFRESH_INTERVAL_SECS";

/// Where the token pair is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStoreKind {
    /// `session.json` in the data directory
    #[default]
    File,
    /// The OS keychain
    Keyring,
    /// Process memory only; nothing survives a restart
    Memory,
}

impl FromStr for TokenStoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "keyring" => Ok(Self::Keyring),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow::anyhow!("Unknown token store kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub token_store: TokenStoreKind,
    pub refresh_interval_secs: u64,
    pub max_refresh_failures: u32,
    pub request_timeout_secs: u64,
    pub login_path: String,
    pub signup_path: String,
    pub landing_path: String,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            token_store: TokenStoreKind::default(),
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            max_refresh_failures: DEFAULT_MAX_REFRESH_FAILURES,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            login_path: "/login".to_string(),
            signup_path: "/signup".to_string(),
            landing_path: "/shipments".to_string(),
            last_email: None,
        }
    }
}

impl Config {
    /// Load the config file (defaults if absent) and apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// `load`). Unparseable values are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }

        if let Some(raw) = lookup(ENV_TOKEN_STORE) {
            match raw.parse() {
                Ok(kind) => self.token_store = kind,
                Err(e) => warn!(error = %e, "Ignoring {}", ENV_TOKEN_STORE),
            }
        }

        if let Some(raw) = lookup(ENV_REFRESH_INTERVAL) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.refresh_interval_secs = secs,
                _ => warn!(value = %raw, "Ignoring {}", ENV_REFRESH_INTERVAL),
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for persisted tokens and logs
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Paths the HTTP client must not redirect away from on a 401
    pub fn public_paths(&self) -> Vec<String> {
        vec![self.login_path.clone(), self.signup_path.clone()]
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            refresh_interval: Duration::from_secs(self.refresh_interval_secs.max(1)),
            max_refresh_failures: self.max_refresh_failures.max(1),
            login_path: self.login_path.clone(),
            landing_path: self.landing_path.clone(),
        }
    }
}

/// The part of `Config` the session manager runs on.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub refresh_interval: Duration,
    pub max_refresh_failures: u32,
    pub login_path: String,
    pub landing_path: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Config::default().session()
    }
}
