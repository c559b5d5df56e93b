use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

use crate::error::ConfigError;

/// Environment variable consulted when no weather API key is configured.
pub const WEATHER_API_KEY_ENV: &str = "SKYBOARD_WEATHER_API_KEY";

/// Environment variable consulted when no UV API key is configured.
pub const UV_API_KEY_ENV: &str = "SKYBOARD_UV_API_KEY";

/// Longest accepted freshness window (one day).
pub const MAX_FRESHNESS_WINDOW_SECS: u64 = 86_400;

/// Longest accepted background refresh interval (one day).
pub const MAX_REFRESH_INTERVAL_SECS: u64 = 86_400;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Unit system requested from the weather provider.
///
/// Snapshots are never converted after the fact; changing units means
/// refetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
}

impl Units {
    /// Query-string value understood by the provider.
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
        }
    }

    /// Parse a persisted preference value. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "metric" => Some(Units::Metric),
            "imperial" => Some(Units::Imperial),
            _ => None,
        }
    }
}

impl std::fmt::Display for Units {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Weather provider settings
    #[serde(default)]
    pub weather: WeatherConfig,

    /// UV index provider settings
    #[serde(default)]
    pub uv: UvConfig,

    /// Local preference storage
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Base URL of the OpenWeatherMap-compatible API
    #[serde(default = "default_weather_api_base")]
    pub api_base: String,

    /// API key (can also be supplied through SKYBOARD_WEATHER_API_KEY)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// How long fetched data stays fresh, in seconds
    #[serde(default = "default_window_secs")]
    pub freshness_window_secs: u64,

    /// Background refresh period, in seconds
    #[serde(default = "default_window_secs")]
    pub refresh_interval_secs: u64,

    /// Maximum number of city search results
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// Units used until the user picks a preference
    #[serde(default)]
    pub default_units: Units,
}

fn default_weather_api_base() -> String {
    "https://api.openweathermap.org/data/2.5".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_window_secs() -> u64 {
    60
}

fn default_search_limit() -> usize {
    5
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_base: default_weather_api_base(),
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
            freshness_window_secs: default_window_secs(),
            refresh_interval_secs: default_window_secs(),
            search_limit: default_search_limit(),
            default_units: Units::default(),
        }
    }
}

impl WeatherConfig {
    /// Configured key, falling back to the environment.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(WEATHER_API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UvConfig {
    #[serde(default = "default_uv_api_base")]
    pub api_base: String,

    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_uv_api_base() -> String {
    "https://api.openuv.io/api/v1".to_string()
}

impl Default for UvConfig {
    fn default() -> Self {
        Self {
            api_base: default_uv_api_base(),
            api_key: None,
        }
    }
}

impl UvConfig {
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(UV_API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for persisted preferences (defaults to `<config_dir>/state`)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("skyboard");

        Self {
            config_dir,
            weather: WeatherConfig::default(),
            uv: UvConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
            .with_context(|| format!("Failed to parse {:?}", config_path))?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.weather.api_base, "weather.api_base", &mut result);
        self.validate_url(&self.uv.api_base, "uv.api_base", &mut result);

        if self.weather.freshness_window_secs == 0 {
            result.add_error(
                "weather.freshness_window_secs",
                "Freshness window must be greater than 0",
            );
        } else if self.weather.freshness_window_secs > MAX_FRESHNESS_WINDOW_SECS {
            result.add_error(
                "weather.freshness_window_secs",
                format!("Freshness window cannot exceed {} seconds", MAX_FRESHNESS_WINDOW_SECS),
            );
        }

        if self.weather.request_timeout_secs == 0 {
            result.add_error(
                "weather.request_timeout_secs",
                "Request timeout must be greater than 0",
            );
        }

        if self.weather.search_limit == 0 {
            result.add_error("weather.search_limit", "Search limit must be greater than 0");
        }

        if self.weather.refresh_interval_secs > MAX_REFRESH_INTERVAL_SECS {
            result.add_error(
                "weather.refresh_interval_secs",
                format!("Refresh interval cannot exceed {} seconds", MAX_REFRESH_INTERVAL_SECS),
            );
        } else if self.weather.refresh_interval_secs == 0 {
            result.add_warning(
                "weather.refresh_interval_secs",
                "Background refresh disabled (0 seconds)",
            );
        } else if self.weather.refresh_interval_secs < self.weather.freshness_window_secs {
            result.add_warning(
                "weather.refresh_interval_secs",
                "Refresh interval is shorter than the freshness window; some ticks will do nothing",
            );
        }

        if self.weather.resolved_api_key().is_none() {
            result.add_warning(
                "weather.api_key",
                "Weather API key not configured - requests will be rejected by the provider",
            );
        }

        if self.uv.resolved_api_key().is_none() {
            result.add_warning("uv.api_key", "UV API key not configured - UV index unavailable");
        }

        result
    }

    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }

                if let Some(port) = url.port() {
                    if port == 0 {
                        result.add_error(field_name, "Port cannot be 0");
                    }
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Directory holding persisted preferences.
    pub fn storage_dir(&self) -> PathBuf {
        self.storage
            .dir
            .clone()
            .unwrap_or_else(|| self.config_dir.join("state"))
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("skyboard");

        Ok(config_dir.join("config.toml"))
    }
}
