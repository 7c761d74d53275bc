//! Application settings and configuration types.
//!
//! Settings are read from `settings.json` in the platform config directory
//! (or an explicit `--config` path), then overridden from the environment.
//! Every section has defaults, so a partial file is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::providers::email::{GmailCredentials, GmailOptions, DEFAULT_API_BASE, DEFAULT_TOKEN_URL};
use crate::storage::KeychainAccess;

/// Environment variable overriding [`StorageSettings::database_path`].
pub const ENV_DATABASE_PATH: &str = "GMAIL_ACTIONS_DATABASE_PATH";
/// Environment variable overriding [`RulesSettings::path`].
pub const ENV_RULES_PATH: &str = "GMAIL_ACTIONS_RULES_PATH";
pub const ENV_CLIENT_ID: &str = "GMAIL_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "GMAIL_CLIENT_SECRET";
pub const ENV_REFRESH_TOKEN: &str = "GMAIL_REFRESH_TOKEN";

const SETTINGS_FILE: &str = "settings.json";

/// Errors that can occur while loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("missing Gmail credential {0}; set it in settings, the environment or with `credentials`")]
    MissingCredential(&'static str),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("io", "gmail-actions", "gmail-actions")
}

/// Top-level application settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Local store location.
    pub storage: StorageSettings,
    /// Rules file location.
    pub rules: RulesSettings,
    /// Ingestion limits.
    pub fetch: FetchSettings,
    /// Gmail API access.
    pub gmail: GmailSettings,
}

impl Settings {
    /// Default settings file location, if the platform has a config directory.
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(SETTINGS_FILE))
    }

    /// Loads settings and applies environment overrides.
    ///
    /// An explicit path must exist. Without one the default location is
    /// used if present, else built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut settings = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    debug!("No settings file found, using defaults");
                    Self::default()
                }
            },
        };

        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Reads settings from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let settings = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        debug!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    /// Applies overrides from `lookup`; blank values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = get(ENV_DATABASE_PATH) {
            self.storage.database_path = PathBuf::from(path);
        }
        if let Some(path) = get(ENV_RULES_PATH) {
            self.rules.path = PathBuf::from(path);
        }
        if let Some(value) = get(ENV_CLIENT_ID) {
            self.gmail.client_id = Some(value);
        }
        if let Some(value) = get(ENV_CLIENT_SECRET) {
            self.gmail.client_secret = Some(value);
        }
        if let Some(value) = get(ENV_REFRESH_TOKEN) {
            self.gmail.refresh_token = Some(value);
        }
    }
}

/// Local store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// SQLite database file.
    pub database_path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        let database_path = project_dirs()
            .map(|dirs| dirs.data_dir().join("emails.db"))
            .unwrap_or_else(|| PathBuf::from("emails.db"));
        Self { database_path }
    }
}

/// Rules file configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesSettings {
    /// JSON rules file.
    pub path: PathBuf,
}

impl Default for RulesSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("rules.json"),
        }
    }
}

/// Ingestion configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Most inbox messages fetched per run.
    pub max_emails: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self { max_emails: 100 }
    }
}

/// Gmail API configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GmailSettings {
    pub api_base: String,
    pub token_url: String,
    /// Timeout for every remote call.
    pub timeout_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl Default for GmailSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            timeout_seconds: 30,
            client_id: None,
            client_secret: None,
            refresh_token: None,
        }
    }
}

impl GmailSettings {
    /// Client options derived from these settings.
    pub fn options(&self) -> GmailOptions {
        GmailOptions {
            api_base: self.api_base.trim_end_matches('/').to_string(),
            token_url: self.token_url.clone(),
            timeout: Duration::from_secs(self.timeout_seconds.max(1)),
        }
    }

    /// Credentials from settings, falling back to the keychain for any
    /// field not set.
    pub async fn resolve_credentials(&self, keychain: &KeychainAccess) -> Result<GmailCredentials> {
        let client_id = resolve(&self.client_id, keychain, KeychainAccess::GMAIL_CLIENT_ID).await;
        let client_secret =
            resolve(&self.client_secret, keychain, KeychainAccess::GMAIL_CLIENT_SECRET).await;
        let refresh_token =
            resolve(&self.refresh_token, keychain, KeychainAccess::GMAIL_REFRESH_TOKEN).await;

        Ok(GmailCredentials {
            client_id: client_id.ok_or(ConfigError::MissingCredential("client_id"))?,
            client_secret: client_secret.ok_or(ConfigError::MissingCredential("client_secret"))?,
            refresh_token: refresh_token.ok_or(ConfigError::MissingCredential("refresh_token"))?,
        })
    }
}

async fn resolve(
    configured: &Option<String>,
    keychain: &KeychainAccess,
    key: &str,
) -> Option<String> {
    if let Some(value) = configured.as_ref().filter(|v| !v.trim().is_empty()) {
        return Some(value.clone());
    }

    match keychain.retrieve(key).await {
        Ok(value) => value.filter(|v| !v.trim().is_empty()),
        Err(e) => {
            warn!(key, error = %e, "Keychain lookup failed");
            None
        }
    }
}
