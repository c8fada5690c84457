//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Shared HS256 secret of the auth provider that mints session tokens
    pub jwt_secret: String,

    /// Allowed client origins for CORS (comma-separated)
    pub client_origin: String,

    /// Matches without activity for this long are reaped. Zero disables idle reaping.
    pub idle_match_timeout: Duration,
    /// How long a finished match stays around before it is archived
    pub finished_match_ttl: Duration,
    /// How often the reaper sweeps the registry
    pub reaper_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),

            jwt_secret: lookup("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?,

            client_origin: lookup("CLIENT_ORIGIN").unwrap_or_default(),

            idle_match_timeout: secs(&lookup, "IDLE_MATCH_TIMEOUT_SECS", 0)?,
            finished_match_ttl: secs(&lookup, "FINISHED_MATCH_TTL_SECS", 300)?,
            reaper_interval: secs(&lookup, "REAPER_INTERVAL_SECS", 30)?,
        })
    }
}

fn secs<F>(lookup: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidNumber(key)),
        None => Ok(Duration::from_secs(default)),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Environment variable {0} must be a whole number of seconds")]
    InvalidNumber(&'static str),
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config::from_lookup(|key| match key {
        "JWT_SECRET" => Some("test-secret".to_string()),
        "SERVER_ADDR" => Some("127.0.0.1:0".to_string()),
        _ => None,
    })
    .expect("test config is valid")
}
