use std::time::Duration;

use crate::config::helpers::{parse_optional_env, parse_secs_env, parse_string_env};
use crate::error::ConfigError;

pub const DEFAULT_CONSOLE_IMAGE: &str = "projectgreenist/web-terminal:0.2.3";
pub const DEFAULT_BASE_URL: &str = "https://console.basphere.dev";

/// Web console workload configuration.
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Container image running the terminal server.
    pub image: String,
    /// Port the terminal server listens on inside the pod.
    pub container_port: u16,
    /// Port exposed by the per-console Service.
    pub service_port: u16,
    /// Age after which in-memory console records are dropped.
    pub ttl: Duration,
    /// Public URL prefix; the console URL is `{base_url}/{resource_id}`.
    pub base_url: String,
    pub storage_class: String,
    pub storage_size: String,
    /// How long provisioning waits for the deployment to become ready.
    pub ready_timeout: Duration,
    pub ready_poll_interval: Duration,
    /// Interval between garbage collection sweeps.
    pub gc_interval: Duration,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_CONSOLE_IMAGE.to_string(),
            container_port: 8080,
            service_port: 80,
            ttl: Duration::from_secs(3600),
            base_url: DEFAULT_BASE_URL.to_string(),
            storage_class: "local-path".to_string(),
            storage_size: "100Mi".to_string(),
            ready_timeout: Duration::from_secs(60),
            ready_poll_interval: Duration::from_secs(2),
            gc_interval: Duration::from_secs(300),
        }
    }
}

impl ConsoleConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let base_url = parse_string_env("WEB_CONSOLE_BASE_URL", DEFAULT_BASE_URL)?;
        url::Url::parse(&base_url).map_err(|e| ConfigError::InvalidValue {
            key: "WEB_CONSOLE_BASE_URL".to_string(),
            message: format!("'{}' is not a URL: {}", base_url, e),
        })?;

        Ok(Self {
            image: parse_string_env("CONSOLE_IMAGE", DEFAULT_CONSOLE_IMAGE)?,
            container_port: parse_optional_env("CONSOLE_CONTAINER_PORT", 8080)?,
            service_port: parse_optional_env("CONSOLE_SERVICE_PORT", 80)?,
            ttl: parse_secs_env("CONSOLE_TTL_SECONDS", 3600)?,
            base_url,
            storage_class: parse_string_env("CONSOLE_STORAGE_CLASS", "local-path")?,
            storage_size: parse_string_env("CONSOLE_STORAGE_SIZE", "100Mi")?,
            ready_timeout: parse_secs_env("CONSOLE_READY_TIMEOUT_SECS", 60)?,
            ready_poll_interval: Duration::from_secs(2),
            gc_interval: parse_secs_env("CONSOLE_GC_INTERVAL_SECS", 300)?,
        })
    }

    /// Public URL for a provisioned console.
    pub fn console_url(&self, resource_id: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), resource_id)
    }
}
