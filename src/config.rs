//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Keyring service name under which the sink API key is stored.
const KEYRING_SERVICE: &str = "tasting-sync";

/// Environment variable consulted when the keychain has no API key.
pub const API_KEY_ENV: &str = "TASTING_SYNC_API_KEY";

/// Timing bounds for the load coordinator.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LoadingConfig {
    /// How long a started load stays shareable with new callers.
    #[serde(default = "default_freshness_window_ms")]
    pub freshness_window_ms: u64,
    /// Upper bound on a single load before every waiter gets a timeout.
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,
}

impl LoadingConfig {
    /// Freshness window as a [`Duration`].
    #[must_use]
    pub fn freshness_window(&self) -> Duration {
        Duration::from_millis(self.freshness_window_ms)
    }

    /// Load timeout as a [`Duration`].
    #[must_use]
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }
}

impl Default for LoadingConfig {
    fn default() -> Self {
        Self {
            freshness_window_ms: default_freshness_window_ms(),
            load_timeout_ms: default_load_timeout_ms(),
        }
    }
}

fn default_freshness_window_ms() -> u64 {
    5_000
}

fn default_load_timeout_ms() -> u64 {
    30_000
}

/// Durable submission queue settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct QueueConfig {
    /// Storage key holding the persisted JSON array.
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
    /// Period of the background drain task used by `watch`.
    #[serde(default = "default_drain_interval_seconds")]
    pub drain_interval_seconds: u64,
}

impl QueueConfig {
    /// Drain interval as a [`Duration`].
    #[must_use]
    pub fn drain_interval(&self) -> Duration {
        Duration::from_secs(self.drain_interval_seconds)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            storage_key: default_storage_key(),
            drain_interval_seconds: default_drain_interval_seconds(),
        }
    }
}

fn default_storage_key() -> String {
    "@feedback_queue".into()
}

fn default_drain_interval_seconds() -> u64 {
    300
}

/// Location of the durable key-value store.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StorageConfig {
    /// `SQLite` database file. Relative paths resolve against the config file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data").join("tasting-sync.db")
}

/// Remote feedback sink settings.
///
/// The API key is loaded at runtime via OS keychain or environment
/// variable, never from the TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SinkConfig {
    /// Base URL of the hosted backend.
    pub endpoint: String,
    /// Table receiving feedback rows.
    #[serde(default = "default_table")]
    pub table: String,
    /// Per-request timeout enforced by the HTTP client.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// API key (populated at runtime).
    #[serde(skip)]
    pub api_key: String,
}

fn default_table() -> String {
    "feedback_items".into()
}

fn default_request_timeout_seconds() -> u64 {
    15
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Load coordinator timing.
    #[serde(default)]
    pub loading: LoadingConfig,
    /// Submission queue settings.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Durable storage location.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Remote sink; absent means submissions can only be queued.
    #[serde(default)]
    pub sink: Option<SinkConfig>,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// A relative `storage.db_path` is resolved against the directory
    /// containing the config file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        let mut config = Self::from_toml_str(&raw)?;

        if config.storage.db_path.is_relative() {
            if let Some(dir) = path.parent() {
                config.storage.db_path = dir.join(&config.storage.db_path);
            }
        }

        Ok(config)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the sink API key from OS keychain with env-var fallback.
    ///
    /// Does nothing when no sink is configured.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither keychain nor env var provide
    /// the key.
    pub async fn load_credentials(&mut self) -> Result<()> {
        if let Some(sink) = self.sink.as_mut() {
            sink.api_key = load_credential("sink_api_key", API_KEY_ENV).await?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.loading.freshness_window_ms == 0 {
            return Err(AppError::Config(
                "loading.freshness_window_ms must be greater than zero".into(),
            ));
        }

        if self.loading.load_timeout_ms == 0 {
            return Err(AppError::Config(
                "loading.load_timeout_ms must be greater than zero".into(),
            ));
        }

        if self.queue.storage_key.trim().is_empty() {
            return Err(AppError::Config("queue.storage_key must not be empty".into()));
        }

        if self.queue.drain_interval_seconds == 0 {
            return Err(AppError::Config(
                "queue.drain_interval_seconds must be greater than zero".into(),
            ));
        }

        if let Some(ref sink) = self.sink {
            if sink.endpoint.trim().is_empty() {
                return Err(AppError::Config("sink.endpoint must not be empty".into()));
            }
            if sink.table.trim().is_empty() {
                return Err(AppError::Config("sink.table must not be empty".into()));
            }
        }

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    match env::var(env_key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))),
    }
}
