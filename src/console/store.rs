//! In-memory index of provisioned consoles.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

/// A provisioned console bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleResource {
    /// `<uuid>-<unix seconds>`; opaque to clients.
    pub id: String,
    pub user_id: String,
    pub namespace: String,
    /// Value of the `session` label shared by the bundle's objects.
    pub suffix: String,
    pub pvc_name: String,
    pub secret_name: String,
    pub deployment_name: String,
    pub service_name: String,
    pub console_url: String,
    pub created_at: DateTime<Utc>,
}

/// Shared handle to the console index.
#[derive(Clone, Default)]
pub struct ResourceStore {
    resources: Arc<RwLock<HashMap<String, ConsoleResource>>>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, resource: ConsoleResource) {
        self.resources
            .write()
            .await
            .insert(resource.id.clone(), resource);
    }

    pub async fn get(&self, id: &str) -> Option<ConsoleResource> {
        self.resources.read().await.get(id).cloned()
    }

    /// A user's consoles, oldest first.
    pub async fn list_for_user(&self, user_id: &str) -> Vec<ConsoleResource> {
        let mut list: Vec<ConsoleResource> = self
            .resources
            .read()
            .await
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        list
    }

    pub async fn remove(&self, id: &str) -> Option<ConsoleResource> {
        self.resources.write().await.remove(id)
    }

    /// Remove every record whose bundle carries `suffix`.
    pub async fn remove_by_suffix(&self, suffix: &str) -> Vec<ConsoleResource> {
        self.remove_where(|r| r.suffix == suffix).await
    }

    /// Remove every record created before `cutoff`.
    pub async fn remove_older_than(&self, cutoff: DateTime<Utc>) -> Vec<ConsoleResource> {
        self.remove_where(|r| r.created_at < cutoff).await
    }

    async fn remove_where<F>(&self, predicate: F) -> Vec<ConsoleResource>
    where
        F: Fn(&ConsoleResource) -> bool,
    {
        let mut resources = self.resources.write().await;
        let ids: Vec<String> = resources
            .values()
            .filter(|r| predicate(r))
            .map(|r| r.id.clone())
            .collect();
        ids.iter().filter_map(|id| resources.remove(id)).collect()
    }

    pub async fn len(&self) -> usize {
        self.resources.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.resources.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn resource(id: &str, user: &str, suffix: &str, age_secs: i64) -> ConsoleResource {
        ConsoleResource {
            id: id.to_string(),
            user_id: user.to_string(),
            namespace: "default".to_string(),
            suffix: suffix.to_string(),
            pvc_name: format!("history-{user}"),
            secret_name: format!("kubeconfig-secret-{user}-{suffix}"),
            deployment_name: format!("console-{user}-{suffix}"),
            service_name: format!("console-svc-{user}-{suffix}"),
            console_url: format!("https://console.example.com/{id}"),
            created_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[tokio::test]
    async fn list_for_user_is_sorted_and_filtered() {
        let store = ResourceStore::new();
        store.insert(resource("b", "alice", "s2", 10)).await;
        store.insert(resource("a", "alice", "s1", 100)).await;
        store.insert(resource("c", "bob", "s3", 50)).await;

        let ids: Vec<String> = store
            .list_for_user("alice")
            .await
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn remove_older_than_keeps_fresh_records() {
        let store = ResourceStore::new();
        store.insert(resource("old", "alice", "s1", 7200)).await;
        store.insert(resource("new", "alice", "s2", 60)).await;

        let removed = store
            .remove_older_than(Utc::now() - Duration::hours(1))
            .await;
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, "old");
        assert!(store.get("new").await.is_some());
    }

    #[tokio::test]
    async fn remove_by_suffix() {
        let store = ResourceStore::new();
        store.insert(resource("a", "alice", "s1", 0)).await;
        store.insert(resource("b", "alice", "s2", 0)).await;

        assert_eq!(store.remove_by_suffix("s1").await.len(), 1);
        assert!(store.remove_by_suffix("s1").await.is_empty());
        assert_eq!(store.len().await, 1);
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(resource("a", "alice", "s1", 0)).unwrap();
        assert_eq!(json["userId"], "alice");
        assert_eq!(json["deploymentName"], "console-alice-s1");
        assert!(json.get("createdAt").is_some());
    }
}
