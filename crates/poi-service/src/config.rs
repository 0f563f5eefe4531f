//! POI Service configuration.
//!
//! Configuration is loaded from environment variables.

use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default server bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default maximum age of a cached key in seconds (5 minutes).
pub const DEFAULT_JWK_CACHE_MAX_AGE_SECONDS: u64 = 300;

/// Default interval between cache flushes in seconds.
pub const DEFAULT_JWK_CACHE_FLUSH_INTERVAL_SECONDS: u64 = 60;

/// Default JWKS fetch timeout in seconds.
pub const DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS: u64 = 10;

/// Upper bound for the JWKS fetch timeout in seconds.
pub const MAX_JWKS_FETCH_TIMEOUT_SECONDS: u64 = 60;

/// POI Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// The only issuer whose tokens are accepted. Exact string match,
    /// including the trailing slash.
    pub trusted_issuer_url: String,

    /// Cached keys older than this are evicted by the flush task.
    pub jwk_cache_max_age_seconds: u64,

    /// How often the flush task runs.
    pub jwk_cache_flush_interval_seconds: u64,

    /// Hard timeout for one JWKS fetch.
    pub jwks_fetch_timeout_seconds: u64,

    /// Seconds to keep serving after a shutdown signal (0 disables).
    pub drain_seconds: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid trusted issuer URL: {0}")]
    InvalidTrustedIssuer(String),

    #[error("Invalid cache configuration: {0}")]
    InvalidCacheSetting(String),

    #[error("Invalid JWKS fetch timeout: {0}")]
    InvalidFetchTimeout(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        // BIND_ADDRESS wins over the port-only SERVICE_PORT
        let bind_address = match (vars.get("BIND_ADDRESS"), vars.get("SERVICE_PORT")) {
            (Some(addr), _) => addr.clone(),
            (None, Some(port)) => {
                let port: u16 = port.parse().map_err(|e| {
                    ConfigError::InvalidValue(
                        "SERVICE_PORT".to_string(),
                        format!("must be a valid port, got '{port}': {e}"),
                    )
                })?;
                format!("0.0.0.0:{port}")
            }
            (None, None) => DEFAULT_BIND_ADDRESS.to_string(),
        };

        let trusted_issuer_url = vars
            .get("TRUSTED_ISSUER_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("TRUSTED_ISSUER_URL".to_string()))?
            .clone();
        validate_issuer_url(&trusted_issuer_url)?;

        let jwk_cache_max_age_seconds = parse_positive_seconds(
            vars,
            "JWK_CACHE_MAX_AGE_SECONDS",
            DEFAULT_JWK_CACHE_MAX_AGE_SECONDS,
        )
        .map_err(ConfigError::InvalidCacheSetting)?;

        let jwk_cache_flush_interval_seconds = parse_positive_seconds(
            vars,
            "JWK_CACHE_FLUSH_INTERVAL_SECONDS",
            DEFAULT_JWK_CACHE_FLUSH_INTERVAL_SECONDS,
        )
        .map_err(ConfigError::InvalidCacheSetting)?;

        let jwks_fetch_timeout_seconds = parse_positive_seconds(
            vars,
            "JWKS_FETCH_TIMEOUT_SECONDS",
            DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS,
        )
        .map_err(ConfigError::InvalidFetchTimeout)?;

        if jwks_fetch_timeout_seconds > MAX_JWKS_FETCH_TIMEOUT_SECONDS {
            return Err(ConfigError::InvalidFetchTimeout(format!(
                "JWKS_FETCH_TIMEOUT_SECONDS must not exceed {MAX_JWKS_FETCH_TIMEOUT_SECONDS} seconds, got {jwks_fetch_timeout_seconds}"
            )));
        }

        let drain_seconds = match vars.get("DRAIN_SECONDS") {
            Some(value) => value.parse().map_err(|e| {
                ConfigError::InvalidValue(
                    "DRAIN_SECONDS".to_string(),
                    format!("must be a non-negative integer, got '{value}': {e}"),
                )
            })?,
            None => 0,
        };

        Ok(Config {
            bind_address,
            trusted_issuer_url,
            jwk_cache_max_age_seconds,
            jwk_cache_flush_interval_seconds,
            jwks_fetch_timeout_seconds,
            drain_seconds,
        })
    }

    pub fn jwk_cache_max_age(&self) -> Duration {
        Duration::from_secs(self.jwk_cache_max_age_seconds)
    }

    pub fn jwk_cache_flush_interval(&self) -> Duration {
        Duration::from_secs(self.jwk_cache_flush_interval_seconds)
    }

    pub fn jwks_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.jwks_fetch_timeout_seconds)
    }
}

fn validate_issuer_url(url: &str) -> Result<(), ConfigError> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::InvalidTrustedIssuer(format!(
            "TRUSTED_ISSUER_URL must use http or https, got '{url}'"
        )));
    }

    // The JWKS location is the issuer with ".well-known/jwks.json" appended
    if !url.ends_with('/') {
        return Err(ConfigError::InvalidTrustedIssuer(format!(
            "TRUSTED_ISSUER_URL must end with '/', got '{url}'"
        )));
    }

    Ok(())
}

fn parse_positive_seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, String> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: u64 = value_str
        .parse()
        .map_err(|e| format!("{name} must be a valid positive integer, got '{value_str}': {e}"))?;

    if value == 0 {
        return Err(format!("{name} must be greater than 0"));
    }

    Ok(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([(
            "TRUSTED_ISSUER_URL".to_string(),
            "https://idp.example/".to_string(),
        )])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.trusted_issuer_url, "https://idp.example/");
        assert_eq!(
            config.jwk_cache_max_age_seconds,
            DEFAULT_JWK_CACHE_MAX_AGE_SECONDS
        );
        assert_eq!(
            config.jwk_cache_flush_interval_seconds,
            DEFAULT_JWK_CACHE_FLUSH_INTERVAL_SECONDS
        );
        assert_eq!(
            config.jwks_fetch_timeout_seconds,
            DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS
        );
        assert_eq!(config.drain_seconds, 0);
        assert_eq!(config.jwk_cache_max_age(), Duration::from_secs(300));
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert("BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string());
        vars.insert("JWK_CACHE_MAX_AGE_SECONDS".to_string(), "900".to_string());
        vars.insert(
            "JWK_CACHE_FLUSH_INTERVAL_SECONDS".to_string(),
            "30".to_string(),
        );
        vars.insert("JWKS_FETCH_TIMEOUT_SECONDS".to_string(), "3".to_string());
        vars.insert("DRAIN_SECONDS".to_string(), "15".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.jwk_cache_max_age_seconds, 900);
        assert_eq!(config.jwk_cache_flush_interval(), Duration::from_secs(30));
        assert_eq!(config.jwks_fetch_timeout(), Duration::from_secs(3));
        assert_eq!(config.drain_seconds, 15);
    }

    #[test]
    fn test_service_port_sets_bind_address() {
        let mut vars = base_vars();
        vars.insert("SERVICE_PORT".to_string(), "9090".to_string());

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:9090");
    }

    #[test]
    fn test_bind_address_wins_over_service_port() {
        let mut vars = base_vars();
        vars.insert("SERVICE_PORT".to_string(), "9090".to_string());
        vars.insert("BIND_ADDRESS".to_string(), "127.0.0.1:7000".to_string());

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:7000");
    }

    #[test]
    fn test_invalid_service_port() {
        let mut vars = base_vars();
        vars.insert("SERVICE_PORT".to_string(), "http".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(name, _)) if name == "SERVICE_PORT"));
    }

    #[test]
    fn test_missing_trusted_issuer() {
        let result = Config::from_vars(&HashMap::new());
        assert!(
            matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "TRUSTED_ISSUER_URL")
        );
    }

    #[test]
    fn test_trusted_issuer_requires_http_scheme() {
        let vars = HashMap::from([(
            "TRUSTED_ISSUER_URL".to_string(),
            "ftp://idp.example/".to_string(),
        )]);

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidTrustedIssuer(_))));
    }

    #[test]
    fn test_trusted_issuer_requires_trailing_slash() {
        let vars = HashMap::from([(
            "TRUSTED_ISSUER_URL".to_string(),
            "https://idp.example".to_string(),
        )]);

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidTrustedIssuer(msg)) if msg.contains("end with '/'")));
    }

    #[test]
    fn test_cache_max_age_rejects_zero() {
        let mut vars = base_vars();
        vars.insert("JWK_CACHE_MAX_AGE_SECONDS".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidCacheSetting(msg)) if msg.contains("greater than 0")));
    }

    #[test]
    fn test_flush_interval_rejects_non_numeric() {
        let mut vars = base_vars();
        vars.insert(
            "JWK_CACHE_FLUSH_INTERVAL_SECONDS".to_string(),
            "often".to_string(),
        );

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidCacheSetting(msg)) if msg.contains("valid positive integer")));
    }

    #[test]
    fn test_fetch_timeout_bounds() {
        let mut vars = base_vars();
        vars.insert("JWKS_FETCH_TIMEOUT_SECONDS".to_string(), "0".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidFetchTimeout(_))
        ));

        vars.insert("JWKS_FETCH_TIMEOUT_SECONDS".to_string(), "61".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidFetchTimeout(msg)) if msg.contains("must not exceed 60")
        ));

        vars.insert("JWKS_FETCH_TIMEOUT_SECONDS".to_string(), "60".to_string());
        assert_eq!(Config::from_vars(&vars).unwrap().jwks_fetch_timeout_seconds, 60);
    }

    #[test]
    fn test_drain_seconds_rejects_negative() {
        let mut vars = base_vars();
        vars.insert("DRAIN_SECONDS".to_string(), "-1".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(name, _)) if name == "DRAIN_SECONDS"));
    }
}
