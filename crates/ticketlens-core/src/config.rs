//! Configuration management for TicketLens

use crate::error::{Error, Result};
use crate::models::Status;
use crate::normalize::{
    DEFAULT_HEADER_LOOKAHEAD_LINES, DEFAULT_MIN_MARKUP_QUOTE_OFFSET, DEFAULT_MIN_REMOVED_CHARS,
    DEFAULT_MIN_RETAINED_CHARS,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Ticketing API connection settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Search settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Message body normalization settings
    #[serde(default)]
    pub normalize: NormalizeConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (logs live under `<data_dir>/logs`)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Timezone reported next to UTC by `get_server_time` (e.g., "Europe/Berlin")
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    std::env::var("TZ")
        .ok()
        .filter(|tz| tz.parse::<chrono_tz::Tz>().is_ok())
        .unwrap_or_else(|| "UTC".to_string())
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
            timezone: default_timezone(),
        }
    }
}

/// Ticketing API connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// OAuth2 client-credentials token endpoint
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// OAuth2 client ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// OAuth2 client secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Pre-issued access token (skips the client-credentials exchange)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Per-request timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts for rate-limited or upstream failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay, doubled per attempt
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,

    /// Backoff ceiling
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,

    /// Global rate limit (requests per second)
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_second: u32,

    /// How long successful GET responses are reused (0 disables caching)
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_url: default_token_url(),
            client_id: None,
            client_secret: None,
            access_token: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            initial_retry_delay_ms: default_initial_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            rate_limit_per_second: default_rate_limit(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// Search settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Result limit when the caller does not pass one
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Largest limit a caller may request
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,

    /// Safety cap on pages fetched for one status branch
    #[serde(default = "default_max_pages_per_branch")]
    pub max_pages_per_branch: u32,

    /// Statuses searched when the caller does not pass any
    #[serde(default = "default_statuses")]
    pub default_statuses: Vec<Status>,

    /// Embed thread bodies in search results
    #[serde(default)]
    pub include_threads: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            max_pages_per_branch: default_max_pages_per_branch(),
            default_statuses: default_statuses(),
            include_threads: false,
        }
    }
}

/// Message body normalization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeConfig {
    /// Hard cap on normalized body length in characters (None = unlimited)
    #[serde(default = "default_max_body_chars")]
    pub max_body_chars: Option<usize>,

    /// Remove quoted replies and forwarded history
    #[serde(default = "default_true")]
    pub strip_quoted_content: bool,

    /// Markup before a quote container must be at least this long to cut there
    #[serde(default = "default_min_markup_quote_offset")]
    pub min_markup_quote_offset: usize,

    /// Text kept before a plain-text quote boundary must be at least this long
    #[serde(default = "default_min_retained_chars")]
    pub min_retained_chars: usize,

    /// Text removed after a plain-text quote boundary must be at least this long
    #[serde(default = "default_min_removed_chars")]
    pub min_removed_chars: usize,

    /// Lines after a From-style header searched for a matching Date-style header
    #[serde(default = "default_header_lookahead_lines")]
    pub header_lookahead_lines: usize,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            max_body_chars: default_max_body_chars(),
            strip_quoted_content: true,
            min_markup_quote_offset: default_min_markup_quote_offset(),
            min_retained_chars: default_min_retained_chars(),
            min_removed_chars: default_min_removed_chars(),
            header_lookahead_lines: default_header_lookahead_lines(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    get_data_dir()
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "https://api.helpscout.net/v2".to_string()
}

fn default_token_url() -> String {
    "https://api.helpscout.net/v2/oauth2/token".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_retry_delay_ms() -> u64 {
    500
}

fn default_max_retry_delay_ms() -> u64 {
    8_000
}

fn default_rate_limit() -> u32 {
    5
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_limit() -> usize {
    50
}

fn default_max_limit() -> usize {
    100
}

fn default_max_pages_per_branch() -> u32 {
    10
}

fn default_statuses() -> Vec<Status> {
    vec![Status::Active, Status::Pending, Status::Closed]
}

fn default_max_body_chars() -> Option<usize> {
    Some(40_000) // ~20K tokens once wrapped in JSON
}

fn default_min_markup_quote_offset() -> usize {
    DEFAULT_MIN_MARKUP_QUOTE_OFFSET
}

fn default_min_retained_chars() -> usize {
    DEFAULT_MIN_RETAINED_CHARS
}

fn default_min_removed_chars() -> usize {
    DEFAULT_MIN_REMOVED_CHARS
}

fn default_header_lookahead_lines() -> usize {
    DEFAULT_HEADER_LOOKAHEAD_LINES
}

/// Get the data directory (XDG: ~/.local/share/ticketlens)
fn get_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".local")
        .join("share")
        .join(crate::APP_NAME)
}

/// Get the config directory (XDG: ~/.config/ticketlens)
fn get_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join(crate::APP_NAME)
}

/// First set variable among `names`
fn env_any(names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| std::env::var(name).ok())
        .filter(|value| !value.trim().is_empty())
}

impl Config {
    /// Default config file location
    pub fn default_path() -> PathBuf {
        get_config_dir().join("config.toml")
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from a specific path, then apply environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&contents)?;
            info!("Loaded configuration from {:?}", path);
            config
        } else {
            info!("No config file found at {:?}, using defaults", path);
            Config::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Credentials from the environment win over the file
    pub fn apply_env_overrides(&mut self) {
        if let Some(id) = env_any(&["TICKETLENS_CLIENT_ID", "HELPSCOUT_CLIENT_ID"]) {
            self.api.client_id = Some(id);
        }
        if let Some(secret) = env_any(&["TICKETLENS_CLIENT_SECRET", "HELPSCOUT_CLIENT_SECRET"]) {
            self.api.client_secret = Some(secret);
        }
        if let Some(token) = env_any(&["TICKETLENS_ACCESS_TOKEN", "HELPSCOUT_ACCESS_TOKEN"]) {
            self.api.access_token = Some(token);
        }
        if let Some(url) = env_any(&["TICKETLENS_BASE_URL"]) {
            self.api.base_url = url;
        }
    }

    /// Reject settings that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.search.default_limit == 0 || self.search.max_limit == 0 {
            return Err(Error::Config("search limits must be positive".to_string()));
        }
        if self.search.default_limit > self.search.max_limit {
            return Err(Error::Config(format!(
                "search.default_limit ({}) exceeds search.max_limit ({})",
                self.search.default_limit, self.search.max_limit
            )));
        }
        if self.search.default_statuses.is_empty() {
            return Err(Error::Config(
                "search.default_statuses must name at least one status".to_string(),
            ));
        }
        if self.api.max_retries == 0 {
            return Err(Error::Config("api.max_retries must be at least 1".to_string()));
        }
        if self.general.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(Error::Config(format!(
                "general.timezone '{}' is not an IANA timezone name",
                self.general.timezone
            )));
        }
        Ok(())
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get the log directory
    pub fn log_dir(&self) -> PathBuf {
        self.general.data_dir.join("logs")
    }

    /// Whether any credential source is configured
    pub fn has_credentials(&self) -> bool {
        self.api.access_token.is_some()
            || (self.api.client_id.is_some() && self.api.client_secret.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.search.default_limit, 50);
        assert_eq!(
            config.search.default_statuses,
            vec![Status::Active, Status::Pending, Status::Closed]
        );
        assert_eq!(config.normalize.min_markup_quote_offset, 50);
        assert_eq!(config.normalize.min_retained_chars, 10);
        assert_eq!(config.normalize.min_removed_chars, 100);
        assert_eq!(config.normalize.header_lookahead_lines, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[api]
max_retries = 5

[search]
default_statuses = ["active", "closed"]
max_limit = 200

[normalize]
max_body_chars = 1000
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.api.max_retries, 5);
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(
            config.search.default_statuses,
            vec![Status::Active, Status::Closed]
        );
        assert_eq!(config.search.max_limit, 200);
        assert_eq!(config.normalize.max_body_chars, Some(1000));
        assert!(config.normalize.strip_quoted_content);
    }

    #[test]
    fn test_validate_rejects_inverted_limits() {
        let mut config = Config::default();
        config.search.default_limit = 500;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_unknown_timezone() {
        let mut config = Config::default();
        config.general.timezone = "Mars/Olympus_Mons".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.general.timezone = "America/Los_Angeles".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.search.include_threads = true;
        config.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert!(reloaded.search.include_threads);
    }
}
