//! Configuration for the web console service.
//!
//! Everything comes from environment variables. A `.env` file in the working
//! directory (or the one passed with `--env-file`) is loaded first via
//! dotenvy, which never overwrites variables that are already set.

mod cluster;
mod console;
pub(crate) mod helpers;
mod oidc;
mod server;

use std::path::Path;

use crate::error::ConfigError;

pub use self::cluster::{ClusterConfig, IN_CLUSTER_SERVER};
pub use self::console::{ConsoleConfig, DEFAULT_BASE_URL, DEFAULT_CONSOLE_IMAGE};
pub use self::oidc::OidcConfig;
pub use self::server::{ServerConfig, SessionConfig};

/// Main configuration for the service.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub oidc: OidcConfig,
    pub cluster: ClusterConfig,
    pub console: ConsoleConfig,
}

impl Config {
    /// Load configuration from `./.env` and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::build()
    }

    /// Load configuration from an explicit env file, then the environment.
    ///
    /// Unlike [`Config::from_env`], a missing or unreadable file is an error.
    pub fn from_env_file(path: &Path) -> Result<Self, ConfigError> {
        dotenvy::from_path(path).map_err(|e| ConfigError::InvalidValue {
            key: "--env-file".to_string(),
            message: format!("failed to load {}: {}", path.display(), e),
        })?;
        Self::build()
    }

    fn build() -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig::resolve()?,
            session: SessionConfig::resolve()?,
            oidc: OidcConfig::resolve()?,
            cluster: ClusterConfig::resolve()?,
            console: ConsoleConfig::resolve()?,
        })
    }
}
