//! Console lifecycle: provisioning with rollback, and teardown.

use std::sync::Arc;

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use crate::cluster::kubeconfig::KubeconfigSpec;
use crate::cluster::{ClusterApi, ConsoleObject};
use crate::config::{ClusterConfig, ConsoleConfig};
use crate::console::manifest::{self, BundleNames};
use crate::console::store::{ConsoleResource, ResourceStore};
use crate::error::OrchestratorError;

/// Outcome of tearing down one console bundle.
///
/// Teardown never fails as a whole; individual deletions that went wrong
/// are listed in `failed` and have already been logged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub resource_id: String,
    pub deleted: Vec<ConsoleObject>,
    /// Objects that were already gone.
    pub missing: Vec<ConsoleObject>,
    pub failed: Vec<(ConsoleObject, String)>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Creates and destroys console bundles on the target cluster.
pub struct ConsoleOrchestrator {
    cluster: Arc<dyn ClusterApi>,
    config: ConsoleConfig,
    cluster_config: ClusterConfig,
    store: ResourceStore,
}

impl ConsoleOrchestrator {
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        config: ConsoleConfig,
        cluster_config: ClusterConfig,
        store: ResourceStore,
    ) -> Self {
        Self {
            cluster,
            config,
            cluster_config,
            store,
        }
    }

    pub fn store(&self) -> &ResourceStore {
        &self.store
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    /// Provision a console for `user_id` in `namespace`.
    ///
    /// `cluster_token` is the exchanged token written into the console's
    /// kubeconfig. On failure every object created by this call has been
    /// removed again; the shared history claim is left in place.
    pub async fn provision(
        &self,
        user_id: &str,
        cluster_token: &SecretString,
        refresh_token: Option<&SecretString>,
        namespace: &str,
    ) -> Result<ConsoleResource, OrchestratorError> {
        let suffix = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let resource_id = format!("{}-{}", suffix, created_at.timestamp());
        let names = BundleNames::new(user_id, &suffix);

        tracing::info!(
            user_id = %user_id,
            namespace = %namespace,
            resource_id = %resource_id,
            "Provisioning web console"
        );

        self.ensure_storage_claim(user_id, namespace, &names).await?;
        self.create_bundle(user_id, cluster_token, refresh_token, namespace, &names)
            .await?;

        if let Err(e) = self.wait_until_ready(namespace, &names.deployment).await {
            tracing::warn!(
                resource_id = %resource_id,
                error = %e,
                "Console not ready yet, returning it anyway"
            );
        }

        let resource = ConsoleResource {
            console_url: self.config.console_url(&resource_id),
            id: resource_id,
            user_id: user_id.to_string(),
            namespace: namespace.to_string(),
            suffix,
            pvc_name: names.storage_claim,
            secret_name: names.secret,
            deployment_name: names.deployment,
            service_name: names.service,
            created_at,
        };
        self.store.insert(resource.clone()).await;

        tracing::info!(
            user_id = %user_id,
            resource_id = %resource.id,
            url = %resource.console_url,
            "Web console provisioned"
        );
        Ok(resource)
    }

    /// Get-or-create the user's history claim.
    async fn ensure_storage_claim(
        &self,
        user_id: &str,
        namespace: &str,
        names: &BundleNames,
    ) -> Result<(), OrchestratorError> {
        let stage_error = |source| OrchestratorError::StorageClaim {
            user_id: user_id.to_string(),
            source,
        };

        if self
            .cluster
            .get_storage_claim(namespace, &names.storage_claim)
            .await
            .map_err(stage_error)?
            .is_some()
        {
            return Ok(());
        }

        let claim = manifest::storage_claim(names, &self.config);
        match self.cluster.create_storage_claim(namespace, &claim).await {
            Ok(()) => {
                tracing::info!(claim = %names.storage_claim, namespace = %namespace, "Created history volume claim");
                Ok(())
            }
            // Another launch for the same user got there first.
            Err(e) if e.is_already_exists() => Ok(()),
            Err(e) => Err(stage_error(e)),
        }
    }

    /// Create Secret, Deployment and Service, undoing earlier steps when a
    /// later one fails.
    async fn create_bundle(
        &self,
        user_id: &str,
        cluster_token: &SecretString,
        refresh_token: Option<&SecretString>,
        namespace: &str,
        names: &BundleNames,
    ) -> Result<(), OrchestratorError> {
        let kubeconfig = KubeconfigSpec {
            server: self.cluster_config.console_server(),
            ca_data: self.cluster_config.target_ca_data.as_deref(),
            insecure: self.cluster_config.console_insecure(),
            namespace,
            token: cluster_token,
        }
        .render()
        .map_err(|e| OrchestratorError::Kubeconfig {
            reason: e.to_string(),
        })?;
        tracing::debug!(bytes = kubeconfig.len(), "Rendered console kubeconfig");

        let secret = manifest::credential_secret(
            names,
            kubeconfig,
            refresh_token.map(|t| t.expose_secret()),
        );
        self.cluster
            .create_secret(namespace, &secret)
            .await
            .map_err(|source| OrchestratorError::Credential {
                user_id: user_id.to_string(),
                source,
            })?;

        let deployment = manifest::deployment(names, &self.config);
        if let Err(source) = self.cluster.create_deployment(namespace, &deployment).await {
            self.rollback(namespace, &[(ConsoleObject::Secret, &names.secret)])
                .await;
            return Err(OrchestratorError::Workload {
                user_id: user_id.to_string(),
                source,
            });
        }

        let service = manifest::service(names, &self.config);
        if let Err(source) = self.cluster.create_service(namespace, &service).await {
            self.rollback(
                namespace,
                &[
                    (ConsoleObject::Deployment, &names.deployment),
                    (ConsoleObject::Secret, &names.secret),
                ],
            )
            .await;
            return Err(OrchestratorError::Endpoint {
                user_id: user_id.to_string(),
                source,
            });
        }

        Ok(())
    }

    /// Best-effort removal of objects created earlier in a failed provision.
    async fn rollback(&self, namespace: &str, objects: &[(ConsoleObject, &String)]) {
        for (kind, name) in objects {
            match self.cluster.delete(*kind, namespace, name).await {
                Ok(()) => {
                    tracing::debug!(kind = %kind, name = %name, "Rolled back console object");
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    tracing::warn!(
                        kind = %kind,
                        name = %name,
                        error = %e,
                        "Failed to roll back console object (may require manual cleanup)"
                    );
                }
            }
        }
    }

    /// Poll the deployment until every replica is ready.
    async fn wait_until_ready(&self, namespace: &str, name: &str) -> Result<(), OrchestratorError> {
        let poll = async {
            loop {
                match self.cluster.get_deployment(namespace, name).await {
                    Ok(Some(deployment)) if manifest::is_ready(&deployment) => return,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(deployment = %name, error = %e, "Readiness poll failed");
                    }
                }
                tokio::time::sleep(self.config.ready_poll_interval).await;
            }
        };

        tokio::time::timeout(self.config.ready_timeout, poll)
            .await
            .map_err(|_| OrchestratorError::ReadinessTimeout {
                name: name.to_string(),
                timeout: self.config.ready_timeout,
            })
    }

    /// Delete a console's Service, Deployment and Secret, in that order.
    ///
    /// Objects that are already gone count as deleted. The history claim is
    /// never touched. The record is dropped from the store either way.
    pub async fn teardown(&self, resource: &ConsoleResource) -> TeardownReport {
        let mut report = TeardownReport {
            resource_id: resource.id.clone(),
            ..Default::default()
        };

        for (kind, name) in [
            (ConsoleObject::Service, &resource.service_name),
            (ConsoleObject::Deployment, &resource.deployment_name),
            (ConsoleObject::Secret, &resource.secret_name),
        ] {
            match self.cluster.delete(kind, &resource.namespace, name).await {
                Ok(()) => report.deleted.push(kind),
                Err(e) if e.is_not_found() => report.missing.push(kind),
                Err(e) => {
                    tracing::warn!(
                        resource_id = %resource.id,
                        kind = %kind,
                        name = %name,
                        error = %e,
                        "Failed to delete console object"
                    );
                    report.failed.push((kind, e.to_string()));
                }
            }
        }

        self.store.remove(&resource.id).await;

        tracing::info!(
            resource_id = %resource.id,
            user_id = %resource.user_id,
            clean = report.is_clean(),
            "Tore down web console"
        );
        report
    }

    /// Tear down every console the store knows for `user_id`.
    pub async fn teardown_user(&self, user_id: &str) -> Vec<TeardownReport> {
        let mut reports = Vec::new();
        for resource in self.store.list_for_user(user_id).await {
            reports.push(self.teardown(&resource).await);
        }
        reports
    }
}
