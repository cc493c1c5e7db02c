use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment override for the geocoder credential.
pub const GEOCODER_KEY_ENV: &str = "SKYCAST_GEOCODER_API_KEY";
/// Environment override for the weather credential.
pub const WEATHER_KEY_ENV: &str = "SKYCAST_WEATHER_API_KEY";

const PLACEHOLDER_PREFIX: &str = "YOUR_";

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

    /// All errors joined for a single log or error line
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding `config.toml`
    #[serde(skip)]
    pub config_dir: PathBuf,

    /// Upstream provider selection and credentials
    pub providers: ProviderConfig,

    /// Outbound HTTP timeouts
    #[serde(default)]
    pub http: HttpConfig,

    /// Cache lifetimes
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Which geocoding API resolves addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GeocoderKind {
    #[default]
    Google,
    Census,
}

/// Unit system requested from the weather provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
    Standard,
}

impl UnitSystem {
    /// Value sent as the provider's `units` query parameter.
    pub fn as_param(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "metric",
            UnitSystem::Imperial => "imperial",
            UnitSystem::Standard => "standard",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub geocoder: GeocoderKind,

    /// Google Geocoding API key (unused by the Census geocoder)
    pub geocoder_api_key: String,

    /// OpenWeatherMap `appid`
    pub weather_api_key: String,

    #[serde(default)]
    pub units: UnitSystem,
}

impl ProviderConfig {
    fn key_configured(key: &str) -> bool {
        !key.trim().is_empty() && !key.starts_with(PLACEHOLDER_PREFIX)
    }

    pub fn geocoder_configured(&self) -> bool {
        self.geocoder == GeocoderKind::Census || Self::key_configured(&self.geocoder_api_key)
    }

    pub fn weather_configured(&self) -> bool {
        Self::key_configured(&self.weather_api_key)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            geocoder: GeocoderKind::Google,
            geocoder_api_key: "YOUR_GOOGLE_API_KEY".to_string(),
            weather_api_key: "YOUR_OPENWEATHERMAP_APPID".to_string(),
            units: UnitSystem::Metric,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Connection establishment timeout
    #[serde(default = "default_open_timeout")]
    pub open_timeout_secs: u64,

    /// Whole-request timeout
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
}

fn default_open_timeout() -> u64 {
    2
}

fn default_read_timeout() -> u64 {
    5
}

impl HttpConfig {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            open_timeout_secs: default_open_timeout(),
            read_timeout_secs: default_read_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Address → location entries (default: 24 hours)
    #[serde(default = "default_geocode_ttl")]
    pub geocode_ttl_secs: u64,

    /// Postal code → forecast entries (default: 30 minutes)
    #[serde(default = "default_forecast_ttl")]
    pub forecast_ttl_secs: u64,
}

fn default_geocode_ttl() -> u64 {
    24 * 60 * 60
}

fn default_forecast_ttl() -> u64 {
    30 * 60
}

impl CacheConfig {
    pub fn geocode_ttl(&self) -> Duration {
        Duration::from_secs(self.geocode_ttl_secs)
    }

    pub fn forecast_ttl(&self) -> Duration {
        Duration::from_secs(self.forecast_ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            geocode_ttl_secs: default_geocode_ttl(),
            forecast_ttl_secs: default_forecast_ttl(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("skycast");

        Self {
            config_dir,
            providers: ProviderConfig::default(),
            http: HttpConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the user config directory, creating a default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("skycast");
        Self::load_from(&config_dir)
    }

    /// Load configuration from `config_dir/config.toml`
    ///
    /// Environment keys are applied after any write, so they never reach disk.
    pub fn load_from(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join("config.toml");

        if !config_path.exists() {
            let mut config = Self {
                config_dir: config_dir.to_path_buf(),
                ..Self::default()
            };
            config.save()?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let mut config: Config =
            toml::from_str(&contents).context("Failed to parse config file")?;
        config.config_dir = config_dir.to_path_buf();
        config.apply_env_overrides();

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(GEOCODER_KEY_ENV) {
            self.providers.geocoder_api_key = key;
        }
        if let Ok(key) = std::env::var(WEATHER_KEY_ENV) {
            self.providers.weather_api_key = key;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if !self.providers.geocoder_configured() {
            result.add_error(
                "providers.geocoder_api_key",
                format!("Geocoder API key not configured (set {})", GEOCODER_KEY_ENV),
            );
        }

        if !self.providers.weather_configured() {
            result.add_error(
                "providers.weather_api_key",
                format!("Weather API key not configured (set {})", WEATHER_KEY_ENV),
            );
        }

        if self.http.open_timeout_secs == 0 {
            result.add_error("http.open_timeout_secs", "Open timeout must be greater than 0");
        }

        if self.http.read_timeout_secs == 0 {
            result.add_error("http.read_timeout_secs", "Read timeout must be greater than 0");
        } else if self.http.read_timeout_secs < self.http.open_timeout_secs {
            result.add_warning(
                "http.read_timeout_secs",
                "Read timeout is shorter than the open timeout",
            );
        }

        if self.cache.geocode_ttl_secs == 0 {
            result.add_warning("cache.geocode_ttl_secs", "Geocode caching disabled (0 seconds)");
        }

        if self.cache.forecast_ttl_secs == 0 {
            result.add_warning(
                "cache.forecast_ttl_secs",
                "Forecast caching disabled (0 seconds)",
            );
        }

        result
    }

    /// Save configuration to `config_dir/config.toml`
    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir)
            .context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(self.config_dir.join("config.toml"), contents)
            .context("Failed to write config file")?;

        Ok(())
    }
}
