//! Object names, labels and manifests for a console bundle.
//!
//! A bundle is one Secret, one Deployment and one Service sharing a unique
//! suffix, plus the user's long-lived history claim:
//!
//! ```text
//! history-<user>                        PersistentVolumeClaim (shared)
//! kubeconfig-secret-<user>-<suffix>     Secret
//! console-<user>-<suffix>               Deployment
//! console-svc-<user>-<suffix>           Service
//! ```

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PersistentVolumeClaimVolumeSource, PodSecurityContext, PodSpec, PodTemplateSpec, Probe,
    ResourceRequirements, Secret, SecretVolumeSource, SecurityContext, Service, ServicePort,
    ServiceSpec, TCPSocketAction, Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use sha2::{Digest, Sha256};

use crate::config::ConsoleConfig;

pub const APP_LABEL: &str = "app";
pub const APP_NAME: &str = "web-console";
pub const USER_LABEL: &str = "user";
pub const SESSION_LABEL: &str = "session";
pub const TYPE_LABEL: &str = "type";

/// Selector matching every console deployment.
pub const APP_SELECTOR: &str = "app=web-console";

pub const CONTAINER_NAME: &str = "web-console";
pub const KUBECONFIG_KEY: &str = "config";
pub const REFRESH_TOKEN_KEY: &str = "refresh-token";
pub const KUBECONFIG_MOUNT_PATH: &str = "/home/user/.kube/config";
pub const HISTORY_MOUNT_PATH: &str = "/home/user/.bash_history";
pub const HISTORY_SUB_PATH: &str = "bash_history";

/// Numeric identity the console runs as.
const CONSOLE_UID: i64 = 1000;

/// Length limit for DNS-1123 labels; applied to every name and label value.
const DNS_LABEL_MAX: usize = 63;

/// Room left for the user fragment inside `history-<user>`.
const USER_FRAGMENT_MAX: usize = DNS_LABEL_MAX - "history-".len();
/// Hex digits of the user-ID digest appended to lossy fragments.
const USER_HASH_LEN: usize = 12;

/// Reduce a user ID to something usable inside object names and label values.
///
/// Lowercases, replaces anything outside `[a-z0-9-]` with `-`, collapses
/// repeats and trims dashes from both ends. When that changes the ID in any
/// way, a short digest of the raw ID is appended so distinct users never
/// share a fragment. Never returns an empty string.
pub fn sanitize_user(user_id: &str) -> String {
    let mut out = String::with_capacity(user_id.len());
    for c in user_id.chars().flat_map(char::to_lowercase) {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() {
            c
        } else {
            '-'
        };
        if c == '-' && (out.is_empty() || out.ends_with('-')) {
            continue;
        }
        out.push(c);
    }
    let cleaned = out.trim_end_matches('-');

    // IDs that already end like a digest are hashed too, so a raw ID can
    // never equal another user's hashed fragment.
    if cleaned == user_id && cleaned.len() <= USER_FRAGMENT_MAX && !ends_with_digest(cleaned) {
        return cleaned.to_string();
    }

    let hash = user_hash(user_id);
    let head = truncate_fragment(cleaned, USER_FRAGMENT_MAX - USER_HASH_LEN - 1);
    if head.is_empty() {
        format!("user-{}", hash)
    } else {
        format!("{}-{}", head, hash)
    }
}

fn ends_with_digest(fragment: &str) -> bool {
    fragment.rsplit_once('-').is_some_and(|(_, tail)| {
        tail.len() == USER_HASH_LEN && tail.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    })
}

fn user_hash(user_id: &str) -> String {
    let digest = Sha256::digest(user_id.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(USER_HASH_LEN);
    hex
}

fn truncate_fragment(fragment: &str, max: usize) -> String {
    let cut: String = fragment.chars().take(max).collect();
    cut.trim_end_matches('-').to_string()
}

/// `<prefix><user>-<suffix>`, shortening the user part to fit `max`.
fn bundle_name(prefix: &str, user: &str, suffix: &str, max: usize) -> String {
    let budget = max.saturating_sub(prefix.len() + 1 + suffix.len());
    let mut user = truncate_fragment(user, budget);
    if user.is_empty() {
        user = "u".to_string();
    }
    format!("{}{}-{}", prefix, user, suffix)
}

/// Every name and label value belonging to one console bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleNames {
    /// Sanitized user ID, also used as the `user` label value.
    pub user: String,
    pub suffix: String,
    pub storage_claim: String,
    pub secret: String,
    pub deployment: String,
    pub service: String,
}

impl BundleNames {
    pub fn new(user_id: &str, suffix: &str) -> Self {
        let user = sanitize_user(user_id);
        Self {
            storage_claim: history_claim_name(user_id),
            secret: bundle_name("kubeconfig-secret-", &user, suffix, DNS_LABEL_MAX),
            deployment: bundle_name("console-", &user, suffix, DNS_LABEL_MAX),
            service: bundle_name("console-svc-", &user, suffix, DNS_LABEL_MAX),
            suffix: suffix.to_string(),
            user,
        }
    }

    /// Labels carried by the Secret, Deployment, pods and Service.
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (APP_LABEL.to_string(), APP_NAME.to_string()),
            (USER_LABEL.to_string(), self.user.clone()),
            (SESSION_LABEL.to_string(), self.suffix.clone()),
        ])
    }

    fn meta(&self, name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(self.labels()),
            ..Default::default()
        }
    }
}

/// Name of the per-user history claim.
pub fn history_claim_name(user_id: &str) -> String {
    format!("history-{}", sanitize_user(user_id))
}

/// Label selector for every object of one bundle.
pub fn session_selector(suffix: &str) -> String {
    format!("{}={}", SESSION_LABEL, suffix)
}

pub fn storage_claim(names: &BundleNames, config: &ConsoleConfig) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(names.storage_claim.clone()),
            labels: Some(BTreeMap::from([
                (APP_LABEL.to_string(), APP_NAME.to_string()),
                (USER_LABEL.to_string(), names.user.clone()),
                (TYPE_LABEL.to_string(), "history".to_string()),
            ])),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: Some(config.storage_class.clone()),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(config.storage_size.clone()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Secret carrying the console's kubeconfig (and refresh token, if any).
pub fn credential_secret(
    names: &BundleNames,
    kubeconfig: String,
    refresh_token: Option<&str>,
) -> Secret {
    let mut data = BTreeMap::from([(KUBECONFIG_KEY.to_string(), kubeconfig)]);
    if let Some(token) = refresh_token.filter(|t| !t.is_empty()) {
        data.insert(REFRESH_TOKEN_KEY.to_string(), token.to_string());
    }
    Secret {
        metadata: names.meta(&names.secret),
        type_: Some("Opaque".to_string()),
        string_data: Some(data),
        ..Default::default()
    }
}

fn quantities(cpu: &str, memory: &str) -> BTreeMap<String, Quantity> {
    BTreeMap::from([
        ("cpu".to_string(), Quantity(cpu.to_string())),
        ("memory".to_string(), Quantity(memory.to_string())),
    ])
}

pub fn deployment(names: &BundleNames, config: &ConsoleConfig) -> Deployment {
    let port = i32::from(config.container_port);

    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(config.image.clone()),
        command: Some(vec!["ttyd".to_string()]),
        args: Some(vec![
            "--port".to_string(),
            config.container_port.to_string(),
            "--writable".to_string(),
            "--max-clients".to_string(),
            "1".to_string(),
            "bash".to_string(),
        ]),
        ports: Some(vec![ContainerPort {
            name: Some("http".to_string()),
            container_port: port,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        env: Some(vec![EnvVar {
            name: "KUBECONFIG".to_string(),
            value: Some(KUBECONFIG_MOUNT_PATH.to_string()),
            ..Default::default()
        }]),
        resources: Some(ResourceRequirements {
            requests: Some(quantities("100m", "128Mi")),
            limits: Some(quantities("250m", "256Mi")),
            ..Default::default()
        }),
        volume_mounts: Some(vec![
            VolumeMount {
                name: "kubeconfig".to_string(),
                mount_path: KUBECONFIG_MOUNT_PATH.to_string(),
                sub_path: Some(KUBECONFIG_KEY.to_string()),
                read_only: Some(true),
                ..Default::default()
            },
            VolumeMount {
                name: "history".to_string(),
                mount_path: HISTORY_MOUNT_PATH.to_string(),
                sub_path: Some(HISTORY_SUB_PATH.to_string()),
                ..Default::default()
            },
        ]),
        readiness_probe: Some(Probe {
            tcp_socket: Some(TCPSocketAction {
                port: IntOrString::Int(port),
                ..Default::default()
            }),
            initial_delay_seconds: Some(1),
            period_seconds: Some(2),
            ..Default::default()
        }),
        security_context: Some(SecurityContext {
            allow_privilege_escalation: Some(false),
            ..Default::default()
        }),
        ..Default::default()
    };

    let pod = PodSpec {
        security_context: Some(PodSecurityContext {
            run_as_user: Some(CONSOLE_UID),
            run_as_group: Some(CONSOLE_UID),
            fs_group: Some(CONSOLE_UID),
            run_as_non_root: Some(true),
            ..Default::default()
        }),
        containers: vec![container],
        volumes: Some(vec![
            Volume {
                name: "kubeconfig".to_string(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(names.secret.clone()),
                    default_mode: Some(0o440),
                    ..Default::default()
                }),
                ..Default::default()
            },
            Volume {
                name: "history".to_string(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: names.storage_claim.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            },
        ]),
        restart_policy: Some("Always".to_string()),
        ..Default::default()
    };

    Deployment {
        metadata: names.meta(&names.deployment),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(names.labels()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(names.labels()),
                    ..Default::default()
                }),
                spec: Some(pod),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn service(names: &BundleNames, config: &ConsoleConfig) -> Service {
    Service {
        metadata: names.meta(&names.service),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(names.labels()),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port: i32::from(config.service_port),
                target_port: Some(IntOrString::Int(i32::from(config.container_port))),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn replica_counts(deployment: &Deployment) -> (i32, i32, i32) {
    let status = deployment.status.as_ref();
    let observed = status.and_then(|s| s.replicas).unwrap_or(0);
    let ready = status.and_then(|s| s.ready_replicas).unwrap_or(0);
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(observed);
    (desired, observed, ready)
}

/// Every observed replica is ready, and there is at least one.
pub fn is_ready(deployment: &Deployment) -> bool {
    let (_, observed, ready) = replica_counts(deployment);
    ready > 0 && ready == observed
}

/// Replicas are wanted but none are ready.
pub fn is_stuck(deployment: &Deployment) -> bool {
    let (desired, _, ready) = replica_counts(deployment);
    desired > 0 && ready == 0
}
