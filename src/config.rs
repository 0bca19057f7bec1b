//! Configuration loading and validation.
//!
//! Peyk reads a single operator-owned `peyk.toml`. Every section has
//! working defaults so a minimal file only needs the values that differ
//! per deployment (typically the AI endpoint and the database path).
//! Secrets never live here: bot tokens come from the credential store.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Webhook server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Per-platform API base URLs.
    #[serde(default)]
    pub platforms: PlatformsConfig,

    /// AI backend settings.
    #[serde(default)]
    pub ai: AiConfig,

    /// Binding/credential/audit database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Optional file logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Webhook server bind settings.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// TCP port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

/// API base URLs for both platforms.
#[derive(Debug, Deserialize)]
pub struct PlatformsConfig {
    /// Bale settings.
    #[serde(default)]
    pub bale: PlatformEndpoint,

    /// Eitaa settings.
    #[serde(default = "eitaa_endpoint")]
    pub eitaa: PlatformEndpoint,
}

impl Default for PlatformsConfig {
    fn default() -> Self {
        Self {
            bale: PlatformEndpoint::default(),
            eitaa: eitaa_endpoint(),
        }
    }
}

/// One platform's API base URL.
#[derive(Debug, Deserialize)]
pub struct PlatformEndpoint {
    /// Base URL without a trailing slash.
    pub api_base: String,
}

impl Default for PlatformEndpoint {
    fn default() -> Self {
        Self {
            api_base: crate::platforms::bale::DEFAULT_BALE_API_BASE.to_owned(),
        }
    }
}

fn eitaa_endpoint() -> PlatformEndpoint {
    PlatformEndpoint {
        api_base: crate::platforms::eitaa::DEFAULT_EITAA_API_BASE.to_owned(),
    }
}

/// AI backend settings.
#[derive(Debug, Deserialize)]
pub struct AiConfig {
    /// Backend base URL (the dispatcher appends `/v1/chat`).
    #[serde(default = "default_ai_endpoint")]
    pub endpoint: String,

    /// Per-chunk timeout in seconds.
    ///
    /// Sized to stay under the chat platforms' own webhook-side patience
    /// with a safety margin.
    #[serde(default = "default_ai_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_ai_endpoint(),
            request_timeout_secs: default_ai_timeout_secs(),
        }
    }
}

/// SQLite database settings.
#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the database file owned by the dashboard subsystem.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// File logging settings.
#[derive(Debug, Deserialize, Default)]
pub struct LoggingConfig {
    /// Directory for daily-rotated JSON logs; console-only when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

// Default value functions for serde

fn default_bind() -> String {
    "0.0.0.0".to_owned()
}
fn default_port() -> u16 {
    8090
}
fn default_ai_endpoint() -> String {
    "http://127.0.0.1:8000".to_owned()
}
fn default_ai_timeout_secs() -> u64 {
    50
}
fn default_db_path() -> PathBuf {
    PathBuf::from("peyk.db")
}

/// Load and validate the config from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if a URL
/// field is invalid.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config at {}: {e}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config at {}: {e}", path.display()))?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> anyhow::Result<()> {
    for (name, value) in [
        ("platforms.bale.api_base", &config.platforms.bale.api_base),
        ("platforms.eitaa.api_base", &config.platforms.eitaa.api_base),
        ("ai.endpoint", &config.ai.endpoint),
    ] {
        if value.trim().is_empty() {
            anyhow::bail!("config field {name} must not be empty");
        }
        url::Url::parse(value)
            .map_err(|e| anyhow::anyhow!("config field {name} is not a valid URL: {e}"))?;
    }
    if config.ai.request_timeout_secs == 0 {
        anyhow::bail!("config field ai.request_timeout_secs must be positive");
    }
    Ok(())
}

/// Resolve the default config directory (`~/.peyk/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".peyk"))
}
