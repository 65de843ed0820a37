//! Configuration system for FitFlow licensing.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `config.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `FITFLOW_SERVER_HOST` / `FITFLOW_SERVER_PORT` - Bind address
//! - `FITFLOW_DASHBOARD_URL` - Public dashboard URL shown to desktop clients
//! - `FITFLOW_DATABASE_URL` - SQLite connection URL
//! - `FITFLOW_LOGGING_ENABLED` / `FITFLOW_LOG_LEVEL` - Logging switches
//! - `FITFLOW_LICENSE_KEY_PREFIX` - License key prefix (two characters)
//! - `FITFLOW_LICENSE_TRIAL_DAYS` - Per-device trial length
//! - `FITFLOW_LICENSE_SIGNING_SECRET` - HMAC secret for signed license payloads
//! - `FITFLOW_RATE_LIMIT_ACTIVATION_PER_HOUR` / `FITFLOW_RATE_LIMIT_VALIDATION_PER_HOUR`
//! - `FITFLOW_SESSION_SECRET` - Secret for dashboard session tokens
//! - `FITFLOW_RATES_URL` / `FITFLOW_GEO_URL` - Upstream currency services

use config::Config;
use serde::Deserialize;
use std::env;
use std::sync::OnceLock;

use crate::errors::{LicenseError, LicenseResult};

/// Global configuration singleton.
static CONFIG: OnceLock<FitflowConfig> = OnceLock::new();

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FitflowConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub license: LicenseConfig,
    pub rate_limit: RateLimitConfig,
    pub auth: AuthConfig,
    pub currency: CurrencyConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Dashboard URL returned to clients that must take action on the web
    pub dashboard_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            dashboard_url: "https://fitflow.com".to_string(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection URL
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://fitflow.db?mode=rwc".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
        }
    }
}

/// License key and activation configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Two-character prefix of the first key segment
    pub key_prefix: String,
    /// Length of the per-device trial in days
    pub trial_days: i64,
    /// HMAC secret for signed license payloads (use `env:VAR_NAME` to read from environment)
    pub signing_secret: String,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            key_prefix: "FF".to_string(),
            trial_days: 30,
            signing_secret: String::new(),
        }
    }
}

/// In-process rate limits for the public license endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Activation attempts allowed per IP per hour
    pub activation_per_hour: u32,
    /// Validation checks allowed per IP per hour
    pub validation_per_hour: u32,
    /// How often stale limiter entries are swept
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            activation_per_hour: 5,
            validation_per_hour: 10,
            sweep_interval_secs: 600,
        }
    }
}

/// Dashboard session token configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Session token secret (use `env:VAR_NAME` to read from environment)
    pub session_secret: String,
    pub session_issuer: String,
    pub session_audience: String,
    /// Session lifetime in seconds (default: 7 days)
    pub session_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_secret: String::new(),
            session_issuer: "fitflow".to_string(),
            session_audience: "fitflow-dashboard".to_string(),
            session_ttl_secs: 7 * 24 * 3600,
        }
    }
}

/// Upstream currency services.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CurrencyConfig {
    /// USD-based exchange-rate endpoint
    pub rates_url: String,
    /// IP geolocation base URL (`{geo_url}/{ip}/json/`)
    pub geo_url: String,
    /// Exchange-rate cache lifetime
    pub cache_ttl_hours: i64,
    pub user_agent: String,
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self {
            rates_url: "https://api.exchangerate-api.com/v4/latest/USD".to_string(),
            geo_url: "https://ipapi.co".to_string(),
            cache_ttl_hours: 24,
            user_agent: "FitFlow-Licensing/1.0".to_string(),
        }
    }
}

fn cfg_err(e: config::ConfigError) -> LicenseError {
    LicenseError::ConfigError(e.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

impl FitflowConfig {
    /// Load configuration from file and environment.
    fn load() -> LicenseResult<Self> {
        let defaults = FitflowConfig::default();

        let builder = Config::builder()
            .set_default("server.host", defaults.server.host)
            .map_err(cfg_err)?
            .set_default("server.port", i64::from(defaults.server.port))
            .map_err(cfg_err)?
            .set_default("server.dashboard_url", defaults.server.dashboard_url)
            .map_err(cfg_err)?
            .set_default("database.url", defaults.database.url)
            .map_err(cfg_err)?
            .set_default("logging.enabled", defaults.logging.enabled)
            .map_err(cfg_err)?
            .set_default("logging.level", defaults.logging.level)
            .map_err(cfg_err)?
            .set_default("license.key_prefix", defaults.license.key_prefix)
            .map_err(cfg_err)?
            .set_default("license.trial_days", defaults.license.trial_days)
            .map_err(cfg_err)?
            .set_default("license.signing_secret", defaults.license.signing_secret)
            .map_err(cfg_err)?
            .set_default(
                "rate_limit.activation_per_hour",
                i64::from(defaults.rate_limit.activation_per_hour),
            )
            .map_err(cfg_err)?
            .set_default(
                "rate_limit.validation_per_hour",
                i64::from(defaults.rate_limit.validation_per_hour),
            )
            .map_err(cfg_err)?
            .set_default(
                "rate_limit.sweep_interval_secs",
                defaults.rate_limit.sweep_interval_secs as i64,
            )
            .map_err(cfg_err)?
            .set_default("auth.session_secret", defaults.auth.session_secret)
            .map_err(cfg_err)?
            .set_default("auth.session_issuer", defaults.auth.session_issuer)
            .map_err(cfg_err)?
            .set_default("auth.session_audience", defaults.auth.session_audience)
            .map_err(cfg_err)?
            .set_default("auth.session_ttl_secs", defaults.auth.session_ttl_secs as i64)
            .map_err(cfg_err)?
            .set_default("currency.rates_url", defaults.currency.rates_url)
            .map_err(cfg_err)?
            .set_default("currency.geo_url", defaults.currency.geo_url)
            .map_err(cfg_err)?
            .set_default("currency.cache_ttl_hours", defaults.currency.cache_ttl_hours)
            .map_err(cfg_err)?
            .set_default("currency.user_agent", defaults.currency.user_agent)
            .map_err(cfg_err)?
            // Load from config.toml (optional)
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables
            .set_override_option("server.host", env::var("FITFLOW_SERVER_HOST").ok())
            .map_err(cfg_err)?
            .set_override_option("server.port", env_parsed::<i64>("FITFLOW_SERVER_PORT"))
            .map_err(cfg_err)?
            .set_override_option(
                "server.dashboard_url",
                env::var("FITFLOW_DASHBOARD_URL").ok(),
            )
            .map_err(cfg_err)?
            .set_override_option("database.url", env::var("FITFLOW_DATABASE_URL").ok())
            .map_err(cfg_err)?
            .set_override_option(
                "logging.enabled",
                env_parsed::<bool>("FITFLOW_LOGGING_ENABLED"),
            )
            .map_err(cfg_err)?
            .set_override_option("logging.level", env::var("FITFLOW_LOG_LEVEL").ok())
            .map_err(cfg_err)?
            .set_override_option(
                "license.key_prefix",
                env::var("FITFLOW_LICENSE_KEY_PREFIX").ok(),
            )
            .map_err(cfg_err)?
            .set_override_option(
                "license.trial_days",
                env_parsed::<i64>("FITFLOW_LICENSE_TRIAL_DAYS"),
            )
            .map_err(cfg_err)?
            .set_override_option(
                "license.signing_secret",
                env::var("FITFLOW_LICENSE_SIGNING_SECRET").ok(),
            )
            .map_err(cfg_err)?
            .set_override_option(
                "rate_limit.activation_per_hour",
                env_parsed::<i64>("FITFLOW_RATE_LIMIT_ACTIVATION_PER_HOUR"),
            )
            .map_err(cfg_err)?
            .set_override_option(
                "rate_limit.validation_per_hour",
                env_parsed::<i64>("FITFLOW_RATE_LIMIT_VALIDATION_PER_HOUR"),
            )
            .map_err(cfg_err)?
            .set_override_option("auth.session_secret", env::var("FITFLOW_SESSION_SECRET").ok())
            .map_err(cfg_err)?
            .set_override_option("currency.rates_url", env::var("FITFLOW_RATES_URL").ok())
            .map_err(cfg_err)?
            .set_override_option("currency.geo_url", env::var("FITFLOW_GEO_URL").ok())
            .map_err(cfg_err)?;

        let settings = builder
            .build()
            .map_err(|e| LicenseError::ConfigError(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| LicenseError::ConfigError(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.server.port == 0 {
            return Err(LicenseError::ConfigError(
                "server.port must be greater than 0".to_string(),
            ));
        }

        if self.license.key_prefix.len() != 2
            || !self
                .license
                .key_prefix
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        {
            return Err(LicenseError::ConfigError(format!(
                "license.key_prefix must be two uppercase alphanumeric characters, got '{}'",
                self.license.key_prefix
            )));
        }
        if self.license.trial_days <= 0 {
            return Err(LicenseError::ConfigError(
                "license.trial_days must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit.activation_per_hour == 0 || self.rate_limit.validation_per_hour == 0 {
            return Err(LicenseError::ConfigError(
                "rate_limit quotas must be greater than 0".to_string(),
            ));
        }
        if self.rate_limit.sweep_interval_secs == 0 {
            return Err(LicenseError::ConfigError(
                "rate_limit.sweep_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.currency.cache_ttl_hours <= 0 {
            return Err(LicenseError::ConfigError(
                "currency.cache_ttl_hours must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        Ok(())
    }
}

/// Resolve a secret value, supporting the `env:VAR_NAME` indirection.
pub fn resolve_secret(value: &str, field: &str) -> LicenseResult<String> {
    let secret = match value.strip_prefix("env:") {
        Some(var) => env::var(var).map_err(|_| {
            LicenseError::ConfigError(format!(
                "environment variable '{var}' not found for {field}"
            ))
        })?,
        None => value.to_string(),
    };

    if secret.is_empty() {
        return Err(LicenseError::ConfigError(format!("{field} is required")));
    }
    Ok(secret)
}

/// Get the global configuration.
///
/// This loads the configuration on first access and caches it.
/// Returns an error if configuration loading or validation fails.
pub fn get_config() -> LicenseResult<&'static FitflowConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = FitflowConfig::load()?;
    config.validate()?;

    // Another thread may have won the race; either value is equivalent.
    let _ = CONFIG.set(config);

    CONFIG
        .get()
        .ok_or_else(|| LicenseError::ConfigError("configuration was not initialized".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = FitflowConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.license.trial_days, 30);
        assert_eq!(config.rate_limit.activation_per_hour, 5);
        assert_eq!(config.rate_limit.validation_per_hour, 10);
        assert_eq!(config.currency.cache_ttl_hours, 24);
    }

    #[test]
    fn rejects_bad_prefix() {
        let mut config = FitflowConfig::default();
        config.license.key_prefix = "FFF".to_string();
        assert!(config.validate().is_err());

        config.license.key_prefix = "ff".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_quotas_and_bad_level() {
        let mut config = FitflowConfig::default();
        config.rate_limit.activation_per_hour = 0;
        assert!(config.validate().is_err());

        let mut config = FitflowConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn resolve_secret_plain_and_empty() {
        assert_eq!(resolve_secret("s3cret", "x").unwrap(), "s3cret");
        assert!(matches!(
            resolve_secret("", "license.signing_secret"),
            Err(LicenseError::ConfigError(_))
        ));
        assert!(resolve_secret("env:FITFLOW_TEST_SURELY_UNSET_VAR", "x").is_err());
    }
}
