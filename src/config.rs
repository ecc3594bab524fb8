//! Application configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables. A `.env` file in the working directory is loaded
//! into the process environment before the environment layer is read.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application name used for config/data directory paths.
const APP_NAME: &str = "lingobook";

/// Config file name inside the per-user config directory.
const CONFIG_FILE: &str = "config.toml";

/// Headroom added on top of the worst-case translate retry run.
const TRANSLATE_TIMEOUT_MARGIN_SECS: u64 = 5;

/// Google Cloud Translation v2 endpoint.
pub const DEFAULT_TRANSLATE_ENDPOINT: &str =
    "https://translation.googleapis.com/language/translate/v2";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub session: SessionConfig,
    pub translate: TranslateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Inbound request timeout.
    pub request_timeout_secs: u64,
    /// Maximum accepted request body size.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            request_timeout_secs: 30,
            max_body_bytes: 65_536,
        }
    }
}

/// Which document store backs `users` and `notes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Firestore,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "firestore" => Ok(Self::Firestore),
            other => anyhow::bail!("Unknown store backend '{other}' (expected sqlite or firestore)"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// SQLite database file. Defaults to the per-user data directory.
    pub sqlite_path: Option<PathBuf>,
    /// Service credential file for Firestore (`project_id`, optional `access_token`).
    pub credentials_path: PathBuf,
    pub database_id: String,
    /// `host:port` of a Firestore emulator. When set, requests go there unauthenticated.
    pub emulator_host: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            sqlite_path: None,
            credentials_path: PathBuf::from("key.json"),
            database_id: "(default)".into(),
            emulator_host: None,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// HMAC key for cookie signatures. A development key is used when unset.
    pub secret: Option<String>,
    pub cookie_name: String,
    /// Sessions unused for this long are dropped.
    pub idle_ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: None,
            cookie_name: "lingobook_sid".into(),
            idle_ttl_secs: 24 * 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslateConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub max_attempts: u32,
    pub timeout_secs: u64,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_TRANSLATE_ENDPOINT.into(),
            max_attempts: 3,
            timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from `path` (or the default location if it exists),
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match Self::default_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => Self::default(),
            },
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", APP_NAME)
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(key) = non_empty("GOOGLE_API_KEY") {
            self.translate.api_key = Some(key);
        }
        if let Some(host) = non_empty("LINGOBOOK_HOST") {
            self.server.host = host;
        }
        if let Some(port) = non_empty("LINGOBOOK_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid LINGOBOOK_PORT value '{port}'"))?;
        }
        if let Some(secret) = non_empty("LINGOBOOK_SESSION_SECRET") {
            self.session.secret = Some(secret);
        }
        if let Some(backend) = non_empty("LINGOBOOK_STORE") {
            self.store.backend = backend.parse()?;
        }
        if let Some(host) = non_empty("FIRESTORE_EMULATOR_HOST") {
            self.store.emulator_host = Some(host);
        }
        Ok(())
    }

    /// SQLite file location, falling back to the per-user data directory.
    pub fn sqlite_path(&self) -> PathBuf {
        if let Some(ref path) = self.store.sqlite_path {
            return path.clone();
        }
        directories::ProjectDirs::from("", "", APP_NAME)
            .map(|dirs| dirs.data_dir().join("lingobook.db"))
            .unwrap_or_else(|| PathBuf::from("lingobook.db"))
    }

    /// Inbound request timeout actually applied by the server.
    ///
    /// Never shorter than every translate attempt timing out back to back,
    /// so a hung translation API still ends in the fallback page.
    pub fn request_timeout(&self) -> Duration {
        let translate_budget = self
            .translate
            .timeout_secs
            .max(1)
            .saturating_mul(u64::from(self.translate.max_attempts.max(1)))
            .saturating_add(TRANSLATE_TIMEOUT_MARGIN_SECS);
        Duration::from_secs(self.server.request_timeout_secs.max(translate_budget))
    }

    /// Copy of this config with secrets replaced, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.session.secret.is_some() {
            copy.session.secret = Some("***".into());
        }
        if copy.translate.api_key.is_some() {
            copy.translate.api_key = Some("***".into());
        }
        copy
    }
}
