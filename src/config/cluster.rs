use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::SecretString;

use crate::config::helpers::{optional_env, parse_bool_env};
use crate::error::ConfigError;

/// Server address written into console kubeconfigs when no target is set.
pub const IN_CLUSTER_SERVER: &str = "https://kubernetes.default.svc";

/// Connection settings for the cluster consoles are placed on.
///
/// When `target_server` is unset, consoles land on the control cluster
/// (the one this process runs in or reaches through the local kubeconfig).
#[derive(Clone, Default)]
pub struct ClusterConfig {
    pub target_server: Option<String>,
    /// Base64-encoded PEM bundle for the target API server.
    pub target_ca_data: Option<String>,
    /// Skip TLS verification when no CA data is available.
    pub target_insecure: bool,
    /// Bearer token the orchestrator itself uses against the target cluster.
    pub target_token: Option<SecretString>,
}

impl std::fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("target_server", &self.target_server)
            .field("target_ca_data", &self.target_ca_data.as_ref().map(|d| d.len()))
            .field("target_insecure", &self.target_insecure)
            .field(
                "target_token",
                &self.target_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl ClusterConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let target_ca_data = optional_env("TARGET_CLUSTER_CA_CERT_DATA")?;
        if let Some(ref data) = target_ca_data {
            STANDARD
                .decode(data)
                .map_err(|e| ConfigError::InvalidValue {
                    key: "TARGET_CLUSTER_CA_CERT_DATA".to_string(),
                    message: format!("not valid base64: {}", e),
                })?;
        }

        let config = Self {
            target_server: optional_env("TARGET_CLUSTER_SERVER")?,
            target_ca_data,
            target_insecure: parse_bool_env("TARGET_CLUSTER_INSECURE", false)?,
            target_token: optional_env("TARGET_CLUSTER_TOKEN")?.map(SecretString::from),
        };

        if config.target_server.is_none() && config.target_ca_data.is_some() {
            tracing::warn!(
                "TARGET_CLUSTER_CA_CERT_DATA is set without TARGET_CLUSTER_SERVER; it only applies to console kubeconfigs"
            );
        }

        Ok(config)
    }

    /// API server address consoles should talk to.
    pub fn console_server(&self) -> &str {
        self.target_server.as_deref().unwrap_or(IN_CLUSTER_SERVER)
    }

    /// Whether clients of the target cluster skip TLS verification.
    ///
    /// CA data always wins over the insecure flag. The in-cluster fallback
    /// has no CA to hand to consoles, so it is always insecure.
    pub fn console_insecure(&self) -> bool {
        self.target_ca_data.is_none() && (self.target_insecure || self.target_server.is_none())
    }
}
