//! Periodic reclamation of stuck consoles and stale records.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use k8s_openapi::api::apps::v1::Deployment;

use crate::cluster::{ClusterApi, ConsoleObject};
use crate::console::manifest::{self, APP_SELECTOR, SESSION_LABEL};
use crate::console::store::ResourceStore;
use crate::tasks::PeriodicTask;

#[derive(Debug, Clone, Copy)]
pub struct GcConfig {
    /// Records older than this are dropped from memory.
    pub ttl: Duration,
    /// Deployments younger than this are never considered stuck.
    pub grace: Duration,
}

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub stuck_bundles: usize,
    pub objects_deleted: usize,
    pub records_expired: usize,
}

#[derive(Clone)]
pub struct GarbageCollector {
    cluster: Arc<dyn ClusterApi>,
    store: ResourceStore,
    config: GcConfig,
}

impl GarbageCollector {
    pub fn new(cluster: Arc<dyn ClusterApi>, store: ResourceStore, config: GcConfig) -> Self {
        Self {
            cluster,
            store,
            config,
        }
    }

    /// Run one pass over the cluster and the record store.
    ///
    /// Errors are logged and skipped; a sweep always completes.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        match self.cluster.list_deployments(None, APP_SELECTOR).await {
            Ok(deployments) => {
                for deployment in deployments.iter().filter(|d| self.is_reclaimable(d)) {
                    report.stuck_bundles += 1;
                    report.objects_deleted += self.reclaim(deployment).await;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list console deployments");
            }
        }

        let cutoff = chrono::Duration::from_std(self.config.ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_sub_signed(ttl));
        let expired = match cutoff {
            Some(cutoff) => self.store.remove_older_than(cutoff).await,
            None => Vec::new(),
        };
        report.records_expired = expired.len();
        for record in &expired {
            tracing::debug!(resource_id = %record.id, user_id = %record.user_id, "Dropped expired console record");
        }

        if report != SweepReport::default() {
            tracing::info!(
                stuck_bundles = report.stuck_bundles,
                objects_deleted = report.objects_deleted,
                records_expired = report.records_expired,
                "Garbage collection sweep finished"
            );
        }
        report
    }

    fn is_reclaimable(&self, deployment: &Deployment) -> bool {
        if !manifest::is_stuck(deployment) {
            return false;
        }
        // Unknown age counts as old.
        let Some(created) = deployment.metadata.creation_timestamp.as_ref() else {
            return true;
        };
        let age = Utc::now().signed_duration_since(created.0);
        age.to_std().is_ok_and(|age| age >= self.config.grace)
    }

    /// Delete every object of a stuck bundle. Returns how many were removed.
    async fn reclaim(&self, deployment: &Deployment) -> usize {
        let meta = &deployment.metadata;
        let namespace = meta.namespace.as_deref().unwrap_or("default");
        let name = meta.name.as_deref().unwrap_or_default();
        let suffix = meta
            .labels
            .as_ref()
            .and_then(|l| l.get(SESSION_LABEL))
            .cloned();

        tracing::info!(
            namespace = %namespace,
            deployment = %name,
            session = ?suffix,
            "Reclaiming stuck web console"
        );

        let Some(suffix) = suffix else {
            return usize::from(self.delete(ConsoleObject::Deployment, namespace, name).await);
        };

        let selector = manifest::session_selector(&suffix);
        let mut deleted = 0;
        for kind in [
            ConsoleObject::Service,
            ConsoleObject::Secret,
            ConsoleObject::Deployment,
        ] {
            let names = match self.cluster.list_names(kind, namespace, &selector).await {
                Ok(names) => names,
                Err(e) => {
                    tracing::warn!(kind = %kind, namespace = %namespace, error = %e, "Failed to list objects for stuck console");
                    continue;
                }
            };
            for object in names {
                if self.delete(kind, namespace, &object).await {
                    deleted += 1;
                }
            }
        }

        self.store.remove_by_suffix(&suffix).await;
        deleted
    }

    async fn delete(&self, kind: ConsoleObject, namespace: &str, name: &str) -> bool {
        match self.cluster.delete(kind, namespace, name).await {
            Ok(()) => true,
            Err(e) if e.is_not_found() => false,
            Err(e) => {
                tracing::warn!(kind = %kind, namespace = %namespace, name = %name, error = %e, "Failed to delete stuck console object");
                false
            }
        }
    }

    /// Run [`sweep`](Self::sweep) every `interval` until the task is shut down.
    pub fn spawn(self, interval: Duration) -> PeriodicTask {
        let gc = Arc::new(self);
        PeriodicTask::spawn("console-gc", interval, move || {
            let gc = Arc::clone(&gc);
            async move {
                gc.sweep().await;
            }
        })
    }
}
