//! [`ClusterApi`] backed by a live API server through `kube`.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Secret, Service};
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::cluster::{ClusterApi, ConsoleObject};
use crate::error::ClusterError;

/// Cluster access through a `kube::Client`.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn create<K>(&self, namespace: &str, object: &K) -> Result<(), ClusterError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + k8s_openapi::Resource
            + Clone
            + Debug
            + Serialize
            + DeserializeOwned,
    {
        let name = object.meta().name.clone().unwrap_or_default();
        self.namespaced::<K>(namespace)
            .create(&PostParams::default(), object)
            .await
            .map(|_| ())
            .map_err(|e| map_kube_error(<K as k8s_openapi::Resource>::KIND, &name, e))
    }

    async fn get<K>(&self, namespace: &str, name: &str) -> Result<Option<K>, ClusterError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + k8s_openapi::Resource
            + Clone
            + Debug
            + DeserializeOwned,
    {
        self.namespaced::<K>(namespace)
            .get_opt(name)
            .await
            .map_err(|e| map_kube_error(<K as k8s_openapi::Resource>::KIND, name, e))
    }

    async fn names<K>(&self, namespace: &str, selector: &str) -> Result<Vec<String>, ClusterError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + k8s_openapi::Resource
            + Clone
            + Debug
            + DeserializeOwned,
    {
        let list = self
            .namespaced::<K>(namespace)
            .list(&ListParams::default().labels(selector))
            .await
            .map_err(|e| map_kube_error(<K as k8s_openapi::Resource>::KIND, selector, e))?;
        Ok(list
            .items
            .into_iter()
            .filter_map(|o| o.meta().name.clone())
            .collect())
    }

    async fn remove<K>(&self, namespace: &str, name: &str) -> Result<(), ClusterError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + k8s_openapi::Resource
            + Clone
            + Debug
            + DeserializeOwned,
    {
        self.namespaced::<K>(namespace)
            .delete(name, &DeleteParams::foreground())
            .await
            .map(|_| ())
            .map_err(|e| map_kube_error(<K as k8s_openapi::Resource>::KIND, name, e))
    }
}

/// Translate `kube` errors into the cluster error taxonomy.
fn map_kube_error(kind: &'static str, name: &str, error: kube::Error) -> ClusterError {
    match error {
        kube::Error::Api(ae) if ae.code == 404 => ClusterError::NotFound {
            kind,
            name: name.to_string(),
        },
        kube::Error::Api(ae) if ae.code == 409 => ClusterError::AlreadyExists {
            kind,
            name: name.to_string(),
        },
        kube::Error::Api(ae) => ClusterError::Api {
            code: ae.code,
            message: ae.message,
        },
        other => ClusterError::Transport(other.to_string()),
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn get_storage_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PersistentVolumeClaim>, ClusterError> {
        self.get(namespace, name).await
    }

    async fn create_storage_claim(
        &self,
        namespace: &str,
        claim: &PersistentVolumeClaim,
    ) -> Result<(), ClusterError> {
        self.create(namespace, claim).await
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<(), ClusterError> {
        self.create(namespace, secret).await
    }

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<(), ClusterError> {
        self.create(namespace, deployment).await
    }

    async fn create_service(
        &self,
        namespace: &str,
        service: &Service,
    ) -> Result<(), ClusterError> {
        self.create(namespace, service).await
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, ClusterError> {
        self.get(namespace, name).await
    }

    async fn list_deployments(
        &self,
        namespace: Option<&str>,
        selector: &str,
    ) -> Result<Vec<Deployment>, ClusterError> {
        let api: Api<Deployment> = match namespace {
            Some(ns) => self.namespaced(ns),
            None => Api::all(self.client.clone()),
        };
        let list = api
            .list(&ListParams::default().labels(selector))
            .await
            .map_err(|e| map_kube_error("Deployment", selector, e))?;
        Ok(list.items)
    }

    async fn list_names(
        &self,
        kind: ConsoleObject,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<String>, ClusterError> {
        match kind {
            ConsoleObject::Secret => self.names::<Secret>(namespace, selector).await,
            ConsoleObject::Deployment => self.names::<Deployment>(namespace, selector).await,
            ConsoleObject::Service => self.names::<Service>(namespace, selector).await,
        }
    }

    async fn delete(
        &self,
        kind: ConsoleObject,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClusterError> {
        match kind {
            ConsoleObject::Secret => self.remove::<Secret>(namespace, name).await,
            ConsoleObject::Deployment => self.remove::<Deployment>(namespace, name).await,
            ConsoleObject::Service => self.remove::<Service>(namespace, name).await,
        }
    }
}
