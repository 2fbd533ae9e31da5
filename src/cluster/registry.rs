//! Control and target cluster connections.
//!
//! The control cluster is wherever this process runs (in-cluster service
//! account or local kubeconfig). The target cluster is where consoles are
//! placed. Without a usable target configuration, consoles go to the control
//! cluster.

use std::sync::Arc;

use kube::Client;
use kube::config::{KubeConfigOptions, Kubeconfig};

use crate::cluster::kubeconfig::KubeconfigSpec;
use crate::cluster::{ClusterApi, KubeCluster};
use crate::config::ClusterConfig;
use crate::error::ConfigError;

#[derive(Clone)]
pub struct ClusterRegistry {
    control: Arc<dyn ClusterApi>,
    target: Arc<dyn ClusterApi>,
    target_is_control: bool,
}

impl ClusterRegistry {
    /// Wire up explicit clusters (mainly for tests).
    pub fn new(control: Arc<dyn ClusterApi>, target: Option<Arc<dyn ClusterApi>>) -> Self {
        match target {
            Some(target) => Self {
                control,
                target,
                target_is_control: false,
            },
            None => Self {
                target: Arc::clone(&control),
                control,
                target_is_control: true,
            },
        }
    }

    /// Connect to the control cluster and, if configured, the target cluster.
    pub async fn connect(config: &ClusterConfig) -> Result<Self, ConfigError> {
        let control = Client::try_default().await.map_err(|e| {
            ConfigError::ClusterClient(format!("control cluster unavailable: {}", e))
        })?;
        let control: Arc<dyn ClusterApi> = Arc::new(KubeCluster::new(control));

        let target = match connect_target(config).await {
            Ok(Some(client)) => {
                tracing::info!(
                    server = %config.console_server(),
                    "Connected to target cluster"
                );
                Some(Arc::new(KubeCluster::new(client)) as Arc<dyn ClusterApi>)
            }
            Ok(None) => {
                tracing::info!("No target cluster configured, placing consoles on the control cluster");
                None
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Failed to initialize target cluster client, falling back to the control cluster"
                );
                None
            }
        };

        Ok(Self::new(control, target))
    }

    pub fn control(&self) -> Arc<dyn ClusterApi> {
        Arc::clone(&self.control)
    }

    /// Cluster consoles are provisioned on.
    pub fn target(&self) -> Arc<dyn ClusterApi> {
        Arc::clone(&self.target)
    }

    pub fn target_is_control(&self) -> bool {
        self.target_is_control
    }
}

/// Build a client for the target cluster, or `None` when it is not configured.
async fn connect_target(config: &ClusterConfig) -> Result<Option<Client>, ConfigError> {
    let Some(server) = config.target_server.as_deref() else {
        return Ok(None);
    };
    let Some(token) = config.target_token.as_ref() else {
        return Err(ConfigError::MissingRequired {
            key: "TARGET_CLUSTER_TOKEN".to_string(),
            hint: "required when TARGET_CLUSTER_SERVER is set".to_string(),
        });
    };

    let yaml = KubeconfigSpec {
        server,
        ca_data: config.target_ca_data.as_deref(),
        insecure: config.console_insecure(),
        namespace: "default",
        token,
    }
    .render()
    .map_err(|e| ConfigError::ClusterClient(format!("failed to render kubeconfig: {}", e)))?;

    let kubeconfig = Kubeconfig::from_yaml(&yaml)
        .map_err(|e| ConfigError::ClusterClient(format!("invalid target kubeconfig: {}", e)))?;
    let client_config =
        kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| ConfigError::ClusterClient(format!("invalid target config: {}", e)))?;
    let client = Client::try_from(client_config)
        .map_err(|e| ConfigError::ClusterClient(format!("failed to build target client: {}", e)))?;

    Ok(Some(client))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCluster;

    #[test]
    fn target_defaults_to_control() {
        let control: Arc<dyn ClusterApi> = Arc::new(FakeCluster::new());
        let registry = ClusterRegistry::new(Arc::clone(&control), None);
        assert!(registry.target_is_control());
        assert!(Arc::ptr_eq(&registry.target(), &control));
    }

    #[test]
    fn explicit_target_is_kept() {
        let control: Arc<dyn ClusterApi> = Arc::new(FakeCluster::new());
        let target: Arc<dyn ClusterApi> = Arc::new(FakeCluster::new());
        let registry = ClusterRegistry::new(Arc::clone(&control), Some(Arc::clone(&target)));
        assert!(!registry.target_is_control());
        assert!(Arc::ptr_eq(&registry.target(), &target));
        assert!(Arc::ptr_eq(&registry.control(), &control));
    }

    #[tokio::test]
    async fn unconfigured_target_is_none() {
        assert!(
            connect_target(&ClusterConfig::default())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn target_without_token_is_an_error() {
        let config = ClusterConfig {
            target_server: Some("https://10.0.0.1:6443".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            connect_target(&config).await,
            Err(ConfigError::MissingRequired { .. })
        ));
    }
}
