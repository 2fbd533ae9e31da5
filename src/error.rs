//! Error types for the web console service.
//!
//! Each subsystem owns a `thiserror` enum. The crate-level [`Error`] wraps
//! them and classifies every failure into an [`ErrorKind`] that callers
//! (mainly the HTTP layer) use to decide what a client gets to see.

use std::time::Duration;

/// Upstream bodies longer than this are cut short when displayed.
const DISPLAY_BODY_LIMIT: usize = 512;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Token exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),
}

/// Coarse error taxonomy shared by every subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Authentication,
    Upstream,
    ResourceConflict,
    NotFound,
    Timeout,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::Exchange(e) => e.kind(),
            Self::Identity(e) => e.kind(),
            Self::Session(_) => ErrorKind::Authentication,
            Self::Cluster(e) => e.kind(),
            Self::Orchestrator(e) => e.kind(),
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {key}: {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to initialize cluster client: {0}")]
    ClusterClient(String),
}

/// Failures of the OAuth2 token-exchange grant.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("Token exchange is not configured: {0}")]
    Configuration(String),

    #[error("Subject token is empty")]
    InvalidSubject,

    #[error("Token exchange request failed: {0}")]
    Network(String),

    /// `body` holds the full response; only its display is shortened.
    #[error("Token endpoint returned HTTP {status}: {}", truncate_for_display(.body, DISPLAY_BODY_LIMIT))]
    Upstream { status: u16, body: String },

    #[error("Token endpoint returned an unreadable body: {0}")]
    Decode(String),
}

impl ExchangeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::InvalidSubject => ErrorKind::Authentication,
            Self::Network(_) | Self::Upstream { .. } | Self::Decode(_) => ErrorKind::Upstream,
        }
    }
}

/// Failures validating an inbound access token against the identity provider.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Access token rejected by identity provider")]
    Unauthorized,

    #[error("Identity provider request failed: {0}")]
    Upstream(String),

    #[error("Identity claims could not be decoded: {0}")]
    InvalidClaims(String),
}

impl IdentityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized | Self::InvalidClaims(_) => ErrorKind::Authentication,
            Self::Upstream(_) => ErrorKind::Upstream,
        }
    }
}

/// Session lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found")]
    NotFound,

    #[error("Session expired")]
    Expired,
}

/// Errors from the cluster API seam.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("Cluster API rejected request ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Cluster API request failed: {0}")]
    Transport(String),
}

impl ClusterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::ResourceConflict,
            Self::Api { .. } | Self::Transport(_) => ErrorKind::Upstream,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

/// Console provisioning and lifecycle errors.
///
/// Provisioning variants name the stage that failed; any objects created
/// before that stage have already been rolled back when one is returned.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Failed to ensure history volume claim for {user_id}: {source}")]
    StorageClaim {
        user_id: String,
        #[source]
        source: ClusterError,
    },

    #[error("Failed to create credential secret for {user_id}: {source}")]
    Credential {
        user_id: String,
        #[source]
        source: ClusterError,
    },

    #[error("Failed to create console deployment for {user_id}: {source}")]
    Workload {
        user_id: String,
        #[source]
        source: ClusterError,
    },

    #[error("Failed to create console service for {user_id}: {source}")]
    Endpoint {
        user_id: String,
        #[source]
        source: ClusterError,
    },

    #[error("Failed to render kubeconfig: {reason}")]
    Kubeconfig { reason: String },

    #[error("Console deployment {name} not ready after {timeout:?}")]
    ReadinessTimeout { name: String, timeout: Duration },

    #[error("Console resource {resource_id} not found")]
    ResourceNotFound { resource_id: String },
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::StorageClaim { source, .. }
            | Self::Credential { source, .. }
            | Self::Workload { source, .. }
            | Self::Endpoint { source, .. } => match source.kind() {
                ErrorKind::ResourceConflict => ErrorKind::ResourceConflict,
                _ => ErrorKind::Upstream,
            },
            Self::Kubeconfig { .. } => ErrorKind::Internal,
            Self::ReadinessTimeout { .. } => ErrorKind::Timeout,
            Self::ResourceNotFound { .. } => ErrorKind::NotFound,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

fn truncate_for_display(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
