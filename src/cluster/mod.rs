//! Kubernetes access.
//!
//! Everything the orchestrator and garbage collector need from a cluster
//! goes through [`ClusterApi`], so tests can swap in an in-memory cluster.
//! Missing objects surface as `Ok(None)` from getters and as
//! [`ClusterError::NotFound`] from deletes; creating an object that already
//! exists is [`ClusterError::AlreadyExists`].

pub mod kube_client;
pub mod kubeconfig;
pub mod registry;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Secret, Service};

use crate::error::ClusterError;

pub use kube_client::KubeCluster;
pub use registry::ClusterRegistry;

/// Per-console objects that can be listed by label and deleted.
///
/// Storage claims are absent: they are shared by all of a
/// user's consoles and outlive every one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsoleObject {
    Secret,
    Deployment,
    Service,
}

impl ConsoleObject {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Secret => "Secret",
            Self::Deployment => "Deployment",
            Self::Service => "Service",
        }
    }
}

impl std::fmt::Display for ConsoleObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn get_storage_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PersistentVolumeClaim>, ClusterError>;

    async fn create_storage_claim(
        &self,
        namespace: &str,
        claim: &PersistentVolumeClaim,
    ) -> Result<(), ClusterError>;

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<(), ClusterError>;

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<(), ClusterError>;

    async fn create_service(&self, namespace: &str, service: &Service)
    -> Result<(), ClusterError>;

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, ClusterError>;

    /// List deployments matching `selector`, in one namespace or in all of
    /// them when `namespace` is `None`.
    async fn list_deployments(
        &self,
        namespace: Option<&str>,
        selector: &str,
    ) -> Result<Vec<Deployment>, ClusterError>;

    /// Names of objects of `kind` in `namespace` matching `selector`.
    async fn list_names(
        &self,
        kind: ConsoleObject,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<String>, ClusterError>;

    /// Delete an object with foreground propagation.
    async fn delete(
        &self,
        kind: ConsoleObject,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClusterError>;
}
