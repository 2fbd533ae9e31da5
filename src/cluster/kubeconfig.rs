//! Rendering of single-context kubeconfig documents.
//!
//! The same document shape is used for the orchestrator's own connection to
//! the target cluster and for the credentials mounted into each console.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

pub const CLUSTER_NAME: &str = "kubernetes";
pub const CONTEXT_NAME: &str = "default-context";
pub const USER_NAME: &str = "user";

/// Inputs for a token-authenticated kubeconfig.
#[derive(Clone)]
pub struct KubeconfigSpec<'a> {
    pub server: &'a str,
    /// Base64-encoded PEM bundle, copied verbatim.
    pub ca_data: Option<&'a str>,
    pub insecure: bool,
    pub namespace: &'a str,
    pub token: &'a SecretString,
}

#[derive(Serialize)]
struct Document<'a> {
    #[serde(rename = "apiVersion")]
    api_version: &'static str,
    kind: &'static str,
    clusters: Vec<NamedCluster<'a>>,
    contexts: Vec<NamedContext<'a>>,
    users: Vec<NamedUser<'a>>,
    #[serde(rename = "current-context")]
    current_context: &'static str,
}

#[derive(Serialize)]
struct NamedCluster<'a> {
    name: &'static str,
    cluster: ClusterEntry<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct ClusterEntry<'a> {
    server: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    certificate_authority_data: Option<&'a str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    insecure_skip_tls_verify: bool,
}

#[derive(Serialize)]
struct NamedContext<'a> {
    name: &'static str,
    context: ContextEntry<'a>,
}

#[derive(Serialize)]
struct ContextEntry<'a> {
    cluster: &'static str,
    user: &'static str,
    namespace: &'a str,
}

#[derive(Serialize)]
struct NamedUser<'a> {
    name: &'static str,
    user: UserEntry<'a>,
}

#[derive(Serialize)]
struct UserEntry<'a> {
    token: &'a str,
}

impl KubeconfigSpec<'_> {
    /// Render the kubeconfig as YAML. The output contains the bearer token.
    pub fn render(&self) -> Result<String, serde_yaml::Error> {
        let ca_data = self.ca_data.filter(|d| !d.is_empty());
        let doc = Document {
            api_version: "v1",
            kind: "Config",
            clusters: vec![NamedCluster {
                name: CLUSTER_NAME,
                cluster: ClusterEntry {
                    server: self.server,
                    certificate_authority_data: ca_data,
                    insecure_skip_tls_verify: ca_data.is_none() && self.insecure,
                },
            }],
            contexts: vec![NamedContext {
                name: CONTEXT_NAME,
                context: ContextEntry {
                    cluster: CLUSTER_NAME,
                    user: USER_NAME,
                    namespace: self.namespace,
                },
            }],
            users: vec![NamedUser {
                name: USER_NAME,
                user: UserEntry {
                    token: self.token.expose_secret(),
                },
            }],
            current_context: CONTEXT_NAME,
        };
        serde_yaml::to_string(&doc)
    }
}
