//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     MANDI_UPLOAD_URL=https://api.example.in/upload_market_prices       │
//! │     MANDI_SYNC_ENABLED=false                                           │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/prices/sync.toml (Linux)                                 │
//! │     ~/Library/Application Support/com.mandi.prices/sync.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     local development endpoint, 3 retries 5 s apart                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [remote]
//! upload_url = "http://127.0.0.1:8000/upload_market_prices"
//! read_url = "http://127.0.0.1:8000/market_prices"
//! enabled = true
//! request_timeout_secs = 15
//!
//! [sync]
//! max_retries = 3
//! retry_delay_secs = 5
//! retry_multiplier = 1.0
//! periodic_interval_secs = 300
//! startup_delay_secs = 2
//!
//! [database]
//! path = "/data/mandi.db"
//! max_connections = 5
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Remote Endpoint Settings
// =============================================================================

/// Where and how records are uploaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// POST target for unsynced batches.
    #[serde(default = "default_upload_url")]
    pub upload_url: String,

    /// GET source for the market price feed.
    #[serde(default = "default_read_url")]
    pub read_url: String,

    /// When false, pushes are skipped locally and reported as successful.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Hard deadline for each HTTP request (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_upload_url() -> String {
    "http://127.0.0.1:8000/upload_market_prices".to_string()
}

fn default_read_url() -> String {
    "http://127.0.0.1:8000/market_prices".to_string()
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    15
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            upload_url: default_upload_url(),
            read_url: default_read_url(),
            enabled: true,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl RemoteSettings {
    /// Request deadline as a Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Retry and trigger timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Automatic retries after a failed push (total attempts = 1 + this).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry (seconds).
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Growth factor between retries. 1.0 keeps the delay fixed.
    #[serde(default = "default_retry_multiplier")]
    pub retry_multiplier: f64,

    /// Periodic trigger interval while the app is in the foreground (seconds).
    #[serde(default = "default_periodic_interval")]
    pub periodic_interval_secs: u64,

    /// Delay between startup and the first sync (seconds).
    #[serde(default = "default_startup_delay")]
    pub startup_delay_secs: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    5
}
fn default_retry_multiplier() -> f64 {
    1.0
}
fn default_periodic_interval() -> u64 {
    300
}
fn default_startup_delay() -> u64 {
    2
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
            retry_multiplier: default_retry_multiplier(),
            periodic_interval_secs: default_periodic_interval(),
            startup_delay_secs: default_startup_delay(),
        }
    }
}

impl SyncSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn periodic_interval(&self) -> Duration {
        Duration::from_secs(self.periodic_interval_secs)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }
}

// =============================================================================
// Database Settings
// =============================================================================

/// Local store location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Database file. Falls back to the platform data directory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Maximum pool connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Remote endpoint settings.
    #[serde(default)]
    pub remote: RemoteSettings,

    /// Retry and trigger timing.
    #[serde(default)]
    pub sync: SyncSettings,

    /// Local store settings.
    #[serde(default)]
    pub database: DatabaseSettings,
}

impl SyncConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        validate_http_url("upload_url", &self.remote.upload_url)?;
        validate_http_url("read_url", &self.remote.read_url)?;

        if self.remote.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        if !self.sync.retry_multiplier.is_finite() || self.sync.retry_multiplier < 1.0 {
            return Err(SyncError::InvalidConfig(format!(
                "retry_multiplier must be at least 1.0, got {}",
                self.sync.retry_multiplier
            )));
        }

        if self.sync.periodic_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "periodic_interval_secs must be greater than 0".into(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(SyncError::InvalidConfig(
                "max_connections must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies `MANDI_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup.
    ///
    /// Unparseable numbers and booleans are ignored with a warning.
    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("MANDI_UPLOAD_URL") {
            debug!(url = %url, "Overriding upload URL from environment");
            self.remote.upload_url = url;
        }

        if let Some(url) = lookup("MANDI_READ_URL") {
            debug!(url = %url, "Overriding read URL from environment");
            self.remote.read_url = url;
        }

        if let Some(value) = lookup("MANDI_SYNC_ENABLED") {
            match parse_bool(&value) {
                Some(enabled) => self.remote.enabled = enabled,
                None => warn!(value = %value, "Ignoring MANDI_SYNC_ENABLED"),
            }
        }

        override_number(&lookup, "MANDI_REQUEST_TIMEOUT_SECS", &mut self.remote.request_timeout_secs);
        override_number(&lookup, "MANDI_MAX_RETRIES", &mut self.sync.max_retries);
        override_number(&lookup, "MANDI_RETRY_DELAY_SECS", &mut self.sync.retry_delay_secs);
        override_number(
            &lookup,
            "MANDI_PERIODIC_INTERVAL_SECS",
            &mut self.sync.periodic_interval_secs,
        );

        if let Some(path) = lookup("MANDI_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "mandi", "prices")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }
}

fn validate_http_url(field: &str, raw: &str) -> SyncResult<()> {
    let url = Url::parse(raw).map_err(|e| SyncError::InvalidUrl(format!("{field}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(SyncError::InvalidUrl(format!(
            "{field} must use http or https, got: {other}"
        ))),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn override_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    if let Some(value) = lookup(key) {
        match value.trim().parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(key, value = %value, "Ignoring unparseable override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(
            config.remote.upload_url,
            "http://127.0.0.1:8000/upload_market_prices"
        );
        assert!(config.remote.enabled);
        assert_eq!(config.remote.request_timeout(), Duration::from_secs(15));
        assert_eq!(config.sync.max_retries, 3);
        assert_eq!(config.sync.retry_delay(), Duration::from_secs(5));
        assert_eq!(config.sync.periodic_interval(), Duration::from_secs(300));
        assert_eq!(config.sync.startup_delay(), Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: SyncConfig = toml::from_str(
            r#"
            [remote]
            upload_url = "https://prices.example.in/upload"

            [sync]
            max_retries = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.remote.upload_url, "https://prices.example.in/upload");
        assert_eq!(config.remote.read_url, "http://127.0.0.1:8000/market_prices");
        assert_eq!(config.sync.max_retries, 5);
        assert_eq!(config.sync.retry_delay_secs, 5);
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = SyncConfig::default();
        config.database.path = Some(PathBuf::from("/data/mandi.db"));
        config.sync.retry_multiplier = 2.0;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[remote]"));
        assert!(toml_str.contains("[sync]"));

        let parsed: SyncConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_save_then_load() {
        let dir = std::env::temp_dir().join(format!("mandi-config-{}", std::process::id()));
        let path = dir.join("sync.toml");

        let mut config = SyncConfig::default();
        config.sync.max_retries = 7;
        config.save(Some(path.clone())).unwrap();

        let loaded: SyncConfig =
            toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.sync.max_retries, 7);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();

        config.remote.upload_url = "ftp://example.in/upload".to_string();
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        config.remote.upload_url = "not a url".to_string();
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        config = SyncConfig::default();
        config.sync.retry_multiplier = 0.5;
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));

        config = SyncConfig::default();
        config.remote.request_timeout_secs = 0;
        assert!(config.validate().unwrap_err().is_config_error());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("MANDI_UPLOAD_URL", "https://prices.example.in/upload"),
            ("MANDI_SYNC_ENABLED", "false"),
            ("MANDI_MAX_RETRIES", "6"),
            ("MANDI_RETRY_DELAY_SECS", "soon"),
            ("MANDI_DB_PATH", "/tmp/override.db"),
        ]);

        let mut config = SyncConfig::default();
        config.apply_overrides_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.remote.upload_url, "https://prices.example.in/upload");
        assert!(!config.remote.enabled);
        assert_eq!(config.sync.max_retries, 6);
        assert_eq!(config.sync.retry_delay_secs, 5);
        assert_eq!(config.database.path, Some(PathBuf::from("/tmp/override.db")));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool(" Yes "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
