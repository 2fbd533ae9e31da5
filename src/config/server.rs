use std::time::Duration;

use crate::config::helpers::{parse_list_env, parse_optional_env, parse_secs_env, parse_string_env};
use crate::error::ConfigError;

const DEFAULT_ALLOWED_ORIGINS: &str =
    "http://localhost:5173,http://localhost:3000,http://localhost:8080";

/// HTTP listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by the CORS layer.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: crate::config::helpers::split_list(DEFAULT_ALLOWED_ORIGINS),
        }
    }
}

impl ServerConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        Ok(Self {
            host: parse_string_env("BIND_ADDRESS", "0.0.0.0")?,
            port: parse_optional_env("PORT", 8080)?,
            allowed_origins: parse_list_env("ALLOWED_ORIGINS", DEFAULT_ALLOWED_ORIGINS)?,
        })
    }

    pub fn socket_addr(&self) -> Result<std::net::SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::InvalidValue {
                key: "BIND_ADDRESS".to_string(),
                message: format!("{}:{} is not a socket address: {}", self.host, self.port, e),
            })
    }
}

/// Login session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often expired sessions are swept from memory.
    pub sweep_interval: Duration,
    /// Lifetime used when the identity provider does not report one.
    pub default_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(600),
            default_ttl: Duration::from_secs(3600),
        }
    }
}

impl SessionConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        Ok(Self {
            sweep_interval: parse_secs_env("SESSION_SWEEP_INTERVAL_SECS", 600)?,
            default_ttl: parse_secs_env("SESSION_DEFAULT_TTL_SECS", 3600)?,
        })
    }
}
