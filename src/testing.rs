//! In-memory stand-ins for the cluster and identity provider.
//!
//! Used by unit tests and by the integration tests under `tests/`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Secret, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use secrecy::SecretString;
use tokio::sync::Mutex;

use crate::auth::{ExchangedToken, IdentityClaims, IdentityVerifier, TokenExchanger};
use crate::cluster::{ClusterApi, ConsoleObject};
use crate::error::{ClusterError, ExchangeError, IdentityError};

/// Cluster operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeOp {
    GetStorageClaim,
    CreateStorageClaim,
    CreateSecret,
    CreateDeployment,
    CreateService,
    GetDeployment,
    ListDeployments,
    List(ConsoleObject),
    Delete(ConsoleObject),
}

type Key = (String, String);

#[derive(Default)]
struct FakeState {
    claims: BTreeMap<Key, PersistentVolumeClaim>,
    secrets: BTreeMap<Key, Secret>,
    deployments: BTreeMap<Key, Deployment>,
    services: BTreeMap<Key, Service>,
    failures: HashSet<FakeOp>,
    calls: Vec<String>,
}

/// In-memory [`ClusterApi`] with fault injection and a call log.
pub struct FakeCluster {
    state: Mutex<FakeState>,
    ready_on_create: bool,
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCluster {
    /// A cluster where new deployments report ready immediately.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            ready_on_create: true,
        }
    }

    /// A cluster where new deployments never become ready on their own.
    pub fn never_ready() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            ready_on_create: false,
        }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Make every subsequent `op` fail with a 500 from the API server.
    pub async fn fail(&self, op: FakeOp) {
        self.state.lock().await.failures.insert(op);
    }

    pub async fn heal(&self, op: FakeOp) {
        self.state.lock().await.failures.remove(&op);
    }

    /// Every call made so far, formatted as `"<verb> <Kind> <ns>/<name>"`.
    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    pub async fn names(&self, kind: ConsoleObject, namespace: &str) -> Vec<String> {
        let state = self.state.lock().await;
        let keys: Vec<&Key> = match kind {
            ConsoleObject::Secret => state.secrets.keys().collect(),
            ConsoleObject::Deployment => state.deployments.keys().collect(),
            ConsoleObject::Service => state.services.keys().collect(),
        };
        keys.into_iter()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub async fn storage_claim_names(&self, namespace: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .claims
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub async fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.state
            .lock()
            .await
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub async fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        self.state
            .lock()
            .await
            .deployments
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Overwrite a deployment's observed status.
    pub async fn set_ready_replicas(&self, namespace: &str, name: &str, ready: i32) {
        let mut state = self.state.lock().await;
        if let Some(deployment) = state
            .deployments
            .get_mut(&(namespace.to_string(), name.to_string()))
        {
            let desired = deployment
                .spec
                .as_ref()
                .and_then(|s| s.replicas)
                .unwrap_or(1);
            deployment.status = Some(DeploymentStatus {
                replicas: Some(desired),
                ready_replicas: (ready > 0).then_some(ready),
                ..Default::default()
            });
        }
    }

    async fn check(&self, op: FakeOp, call: String) -> Result<(), ClusterError> {
        let mut state = self.state.lock().await;
        state.calls.push(call);
        if state.failures.contains(&op) {
            return Err(ClusterError::Api {
                code: 500,
                message: format!("injected failure for {:?}", op),
            });
        }
        Ok(())
    }
}

fn key_of(namespace: &str, meta: &ObjectMeta) -> Key {
    (
        namespace.to_string(),
        meta.name.clone().unwrap_or_default(),
    )
}

/// Equality-only label selector matching (`a=b,c=d`).
fn matches_selector(meta: &ObjectMeta, selector: &str) -> bool {
    let labels = meta.labels.clone().unwrap_or_default();
    selector
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k.trim()).map(String::as_str) == Some(v.trim()),
            None => labels.contains_key(term),
        })
}

fn insert_new<T: Clone>(
    map: &mut BTreeMap<Key, T>,
    key: Key,
    kind: &'static str,
    object: &T,
) -> Result<(), ClusterError> {
    if map.contains_key(&key) {
        return Err(ClusterError::AlreadyExists { kind, name: key.1 });
    }
    map.insert(key, object.clone());
    Ok(())
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get_storage_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PersistentVolumeClaim>, ClusterError> {
        self.check(
            FakeOp::GetStorageClaim,
            format!("get PersistentVolumeClaim {namespace}/{name}"),
        )
        .await?;
        Ok(self
            .state
            .lock()
            .await
            .claims
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_storage_claim(
        &self,
        namespace: &str,
        claim: &PersistentVolumeClaim,
    ) -> Result<(), ClusterError> {
        let key = key_of(namespace, &claim.metadata);
        self.check(
            FakeOp::CreateStorageClaim,
            format!("create PersistentVolumeClaim {}/{}", key.0, key.1),
        )
        .await?;
        let mut state = self.state.lock().await;
        insert_new(&mut state.claims, key, "PersistentVolumeClaim", claim)
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<(), ClusterError> {
        let key = key_of(namespace, &secret.metadata);
        self.check(
            FakeOp::CreateSecret,
            format!("create Secret {}/{}", key.0, key.1),
        )
        .await?;
        let mut state = self.state.lock().await;
        insert_new(&mut state.secrets, key, "Secret", secret)
    }

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<(), ClusterError> {
        let key = key_of(namespace, &deployment.metadata);
        self.check(
            FakeOp::CreateDeployment,
            format!("create Deployment {}/{}", key.0, key.1),
        )
        .await?;

        let mut stored = deployment.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        stored.metadata.creation_timestamp = Some(Time(Utc::now()));
        let desired = stored.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
        stored.status = Some(DeploymentStatus {
            replicas: Some(desired),
            ready_replicas: self.ready_on_create.then_some(desired),
            ..Default::default()
        });

        let mut state = self.state.lock().await;
        insert_new(&mut state.deployments, key, "Deployment", &stored)
    }

    async fn create_service(
        &self,
        namespace: &str,
        service: &Service,
    ) -> Result<(), ClusterError> {
        let key = key_of(namespace, &service.metadata);
        self.check(
            FakeOp::CreateService,
            format!("create Service {}/{}", key.0, key.1),
        )
        .await?;
        let mut state = self.state.lock().await;
        insert_new(&mut state.services, key, "Service", service)
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, ClusterError> {
        self.check(
            FakeOp::GetDeployment,
            format!("get Deployment {namespace}/{name}"),
        )
        .await?;
        Ok(self.deployment(namespace, name).await)
    }

    async fn list_deployments(
        &self,
        namespace: Option<&str>,
        selector: &str,
    ) -> Result<Vec<Deployment>, ClusterError> {
        self.check(
            FakeOp::ListDeployments,
            format!("list Deployment {}/{selector}", namespace.unwrap_or("*")),
        )
        .await?;
        let state = self.state.lock().await;
        Ok(state
            .deployments
            .iter()
            .filter(|((ns, _), _)| namespace.is_none_or(|want| want == ns))
            .filter(|(_, d)| matches_selector(&d.metadata, selector))
            .map(|(_, d)| d.clone())
            .collect())
    }

    async fn list_names(
        &self,
        kind: ConsoleObject,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<String>, ClusterError> {
        self.check(
            FakeOp::List(kind),
            format!("list {kind} {namespace}/{selector}"),
        )
        .await?;
        let state = self.state.lock().await;
        let metas: Vec<(&Key, &ObjectMeta)> = match kind {
            ConsoleObject::Secret => state.secrets.iter().map(|(k, o)| (k, &o.metadata)).collect(),
            ConsoleObject::Deployment => state
                .deployments
                .iter()
                .map(|(k, o)| (k, &o.metadata))
                .collect(),
            ConsoleObject::Service => state
                .services
                .iter()
                .map(|(k, o)| (k, &o.metadata))
                .collect(),
        };
        Ok(metas
            .into_iter()
            .filter(|((ns, _), meta)| ns == namespace && matches_selector(meta, selector))
            .map(|((_, name), _)| name.clone())
            .collect())
    }

    async fn delete(
        &self,
        kind: ConsoleObject,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClusterError> {
        self.check(
            FakeOp::Delete(kind),
            format!("delete {kind} {namespace}/{name}"),
        )
        .await?;
        let key = (namespace.to_string(), name.to_string());
        let mut state = self.state.lock().await;
        let removed = match kind {
            ConsoleObject::Secret => state.secrets.remove(&key).is_some(),
            ConsoleObject::Deployment => state.deployments.remove(&key).is_some(),
            ConsoleObject::Service => state.services.remove(&key).is_some(),
        };
        if removed {
            Ok(())
        } else {
            Err(ClusterError::NotFound {
                kind: kind.as_str(),
                name: name.to_string(),
            })
        }
    }
}

/// [`IdentityVerifier`] that knows a fixed set of tokens.
#[derive(Default)]
pub struct StaticIdentity {
    users: HashMap<String, IdentityClaims>,
    unavailable: bool,
}

impl StaticIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as belonging to `username` with the given groups.
    pub fn with_user(mut self, token: &str, username: &str, groups: &[&str]) -> Self {
        self.users.insert(
            token.to_string(),
            IdentityClaims {
                sub: format!("sub-{}", username),
                preferred_username: Some(username.to_string()),
                name: None,
                email: Some(format!("{}@example.com", username)),
                groups: groups.iter().map(|g| g.to_string()).collect(),
            },
        );
        self
    }

    /// Fail every verification as if the identity provider were down.
    pub fn unavailable() -> Self {
        Self {
            users: HashMap::new(),
            unavailable: true,
        }
    }
}

#[async_trait]
impl IdentityVerifier for StaticIdentity {
    async fn verify(&self, access_token: &str) -> Result<IdentityClaims, IdentityError> {
        if self.unavailable {
            return Err(IdentityError::Upstream("identity provider down".to_string()));
        }
        self.users
            .get(access_token)
            .cloned()
            .ok_or(IdentityError::Unauthorized)
    }
}

/// [`TokenExchanger`] that returns `exchanged-<subject>`.
#[derive(Default)]
pub struct StaticExchanger {
    fail_with_status: Option<u16>,
}

impl StaticExchanger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(status: u16) -> Self {
        Self {
            fail_with_status: Some(status),
        }
    }
}

#[async_trait]
impl TokenExchanger for StaticExchanger {
    async fn exchange(&self, subject_token: &str) -> Result<ExchangedToken, ExchangeError> {
        if subject_token.is_empty() {
            return Err(ExchangeError::InvalidSubject);
        }
        if let Some(status) = self.fail_with_status {
            return Err(ExchangeError::Upstream {
                status,
                body: r#"{"error":"invalid_request"}"#.to_string(),
            });
        }
        Ok(ExchangedToken {
            access_token: SecretString::from(format!("exchanged-{}", subject_token)),
            token_type: Some("Bearer".to_string()),
            expires_in: Some(300),
            refresh_token: Some(SecretString::from(format!("refresh-{}", subject_token))),
            refresh_expires_in: Some(1800),
            issued_token_type: Some(crate::auth::exchange::ACCESS_TOKEN_TYPE.to_string()),
            scope: None,
        })
    }
}
