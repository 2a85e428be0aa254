//! Centralized configuration for api-server.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than at request time.

use axum::http::HeaderValue;
use domain::registry::RegistryConfig;
use std::env;
use std::fmt;

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Server configuration loaded from environment variables.
///
/// All fields are validated at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3001)
    pub port: u16,
    /// CORS allow origin
    pub cors_allow_origin: HeaderValue,
    /// Log format
    pub log_format: LogFormat,
    /// Base for generated short URLs (e.g. `https://sho.rt`). When unset,
    /// short URLs are built as `https://{Host}/{code}` from the request's
    /// Host header, so set this in any deployment reachable by untrusted
    /// clients or served over plain http.
    pub shortlink_domain: Option<String>,
    /// Short code generation settings
    pub registry: RegistryConfig,
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// Fails fast on invalid configuration.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup (the environment in
    /// production, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Port
        let port = match lookup("PORT") {
            Some(s) => s.parse().map_err(|_| ConfigError {
                field: "PORT",
                message: format!("'{}' is not a valid port", s),
            })?,
            None => 3001,
        };

        // CORS allow origin
        let cors_origin_str = lookup("CORS_ALLOW_ORIGIN").unwrap_or_else(|| "*".into());
        let cors_allow_origin = if cors_origin_str == "*" {
            HeaderValue::from_static("*")
        } else {
            HeaderValue::from_str(&cors_origin_str).map_err(|e| ConfigError {
                field: "CORS_ALLOW_ORIGIN",
                message: format!("Invalid header value '{}': {}", cors_origin_str, e),
            })?
        };

        // Log format
        let log_format =
            LogFormat::from_str(&lookup("LOG_FORMAT").unwrap_or_else(|| "pretty".into()));

        // Shortlink domain
        let shortlink_domain = lookup("SHORTLINK_DOMAIN").filter(|s| !s.is_empty());

        // Code generation
        let defaults = RegistryConfig::default();
        let registry = RegistryConfig {
            code_length: parse_usize(&lookup, "CODE_LENGTH", defaults.code_length)?,
            max_code_length: parse_usize(&lookup, "CODE_MAX_LENGTH", defaults.max_code_length)?,
            attempts_per_length: parse_usize(
                &lookup,
                "CODE_ATTEMPTS",
                defaults.attempts_per_length,
            )?,
        };
        registry.validate().map_err(|message| ConfigError {
            field: "CODE_LENGTH",
            message,
        })?;

        Ok(Self {
            port,
            cors_allow_origin,
            log_format,
            shortlink_domain,
            registry,
        })
    }
}

fn parse_usize<F>(lookup: &F, field: &'static str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(field) {
        Some(s) => s.trim().parse().map_err(|_| ConfigError {
            field,
            message: format!("'{}' is not a non-negative integer", s),
        }),
        None => Ok(default),
    }
}
