//! Client-facing error responses.
//!
//! Every failure leaves the API as
//!
//! ```json
//! {"error":{"type":"…","code":"…","message":"…"},"timestamp":"…","request_id":"…"}
//! ```
//!
//! with the same request ID in the `X-Request-ID` header. Internal causes
//! are logged under that ID and never copied into the body.

use axum::Json;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{
    Error, ExchangeError, IdentityError, OrchestratorError, SessionError,
};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error_type: &'static str,
    code: &'static str,
    message: String,
    details: Option<String>,
    request_id: Uuid,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
    timestamp: DateTime<Utc>,
    request_id: String,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    #[serde(rename = "type")]
    error_type: &'a str,
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
}

impl ApiError {
    fn new(
        status: StatusCode,
        error_type: &'static str,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            error_type,
            code,
            message: message.into(),
            details: None,
            request_id: Uuid::new_v4(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "AUTHENTICATION_ERROR",
            "AUTH001",
            message,
        )
    }

    pub fn session_expired() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "AUTHENTICATION_ERROR",
            "AUTH002",
            "Session has expired",
        )
    }

    pub fn session_not_found() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "AUTHENTICATION_ERROR",
            "AUTH004",
            "Session not found",
        )
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            "AUTHORIZATION_ERROR",
            "AUTHZ001",
            message,
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND_ERROR", "RES002", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            "VAL001",
            message,
        )
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "CONFLICT_ERROR", "CON001", message)
    }

    pub fn provisioning_failed() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "K8S002",
            "Failed to create web console",
        )
    }

    pub fn upstream() -> Self {
        Self::new(
            StatusCode::BAD_GATEWAY,
            "INTERNAL_ERROR",
            "SRV002",
            "Identity provider request failed",
        )
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "SRV001",
            "Internal server error",
        )
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Log the underlying cause under this response's request ID.
    fn logged(self, cause: &Error) -> Self {
        if self.status.is_server_error() {
            tracing::error!(request_id = %self.request_id, code = self.code, error = %cause, "Request failed");
        } else {
            tracing::debug!(request_id = %self.request_id, code = self.code, error = %cause, "Request rejected");
        }
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = self.request_id.to_string();
        let body = ErrorBody {
            error: ErrorDetail {
                error_type: self.error_type,
                code: self.code,
                message: &self.message,
                details: self.details.as_deref(),
            },
            timestamp: Utc::now(),
            request_id: request_id.clone(),
        };

        let mut response = (self.status, Json(body)).into_response();
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let api = match &e {
            Error::Session(SessionError::NotFound) => Self::session_not_found(),
            Error::Session(SessionError::Expired) => Self::session_expired(),
            Error::Identity(IdentityError::Upstream(_)) => Self::upstream(),
            Error::Identity(_) => Self::unauthorized("Invalid or expired access token"),
            Error::Exchange(ExchangeError::InvalidSubject) => {
                Self::unauthorized("Access token is required")
            }
            Error::Exchange(ExchangeError::Configuration(_)) => Self::internal(),
            Error::Exchange(_) => Self::upstream(),
            Error::Orchestrator(OrchestratorError::ResourceNotFound { .. }) => {
                Self::not_found("Console not found")
            }
            Error::Orchestrator(o) if o.kind() == crate::error::ErrorKind::ResourceConflict => {
                Self::conflict("A console with the same name already exists")
            }
            Error::Orchestrator(_) | Error::Cluster(_) => Self::provisioning_failed(),
            Error::Config(_) => Self::internal(),
        };
        api.logged(&e)
    }
}

macro_rules! via_crate_error {
    ($($source:ty),* $(,)?) => {
        $(
            impl From<$source> for ApiError {
                fn from(e: $source) -> Self {
                    Error::from(e).into()
                }
            }
        )*
    };
}

via_crate_error!(SessionError, IdentityError, ExchangeError, OrchestratorError);

#[cfg(test)]
mod tests {
    use crate::error::ClusterError;

    use super::*;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn body_and_header_share_request_id() {
        let err = ApiError::forbidden("not yours");
        let id = err.request_id().to_string();
        let resp = err.into_response();

        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(resp.headers()[REQUEST_ID_HEADER], id.as_str());

        let json = body_json(resp).await;
        assert_eq!(json["error"]["type"], "AUTHORIZATION_ERROR");
        assert_eq!(json["error"]["code"], "AUTHZ001");
        assert_eq!(json["error"]["message"], "not yours");
        assert!(json["error"].get("details").is_none());
        assert_eq!(json["request_id"], id);
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn cluster_failures_are_generic() {
        let err: ApiError = OrchestratorError::Workload {
            user_id: "alice".to_string(),
            source: ClusterError::Api {
                code: 500,
                message: "deployments.apps \"console-alice-x\" is forbidden".to_string(),
            },
        }
        .into();
        assert_eq!(err.code(), "K8S002");

        let json = body_json(err.into_response()).await;
        let text = json.to_string();
        assert!(!text.contains("console-alice-x"));
        assert!(!text.contains("alice"));
    }

    #[test]
    fn error_table() {
        let cases: Vec<(ApiError, StatusCode, &str)> = vec![
            (SessionError::NotFound.into(), StatusCode::UNAUTHORIZED, "AUTH004"),
            (SessionError::Expired.into(), StatusCode::UNAUTHORIZED, "AUTH002"),
            (IdentityError::Unauthorized.into(), StatusCode::UNAUTHORIZED, "AUTH001"),
            (
                IdentityError::Upstream("down".into()).into(),
                StatusCode::BAD_GATEWAY,
                "SRV002",
            ),
            (ExchangeError::InvalidSubject.into(), StatusCode::UNAUTHORIZED, "AUTH001"),
            (
                ExchangeError::Upstream {
                    status: 400,
                    body: "invalid_grant".into(),
                }
                .into(),
                StatusCode::BAD_GATEWAY,
                "SRV002",
            ),
            (
                ExchangeError::Configuration("no secret".into()).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
                "SRV001",
            ),
            (
                OrchestratorError::Credential {
                    user_id: "alice".into(),
                    source: ClusterError::AlreadyExists {
                        kind: "Secret",
                        name: "s".into(),
                    },
                }
                .into(),
                StatusCode::CONFLICT,
                "CON001",
            ),
            (
                OrchestratorError::ResourceNotFound {
                    resource_id: "x".into(),
                }
                .into(),
                StatusCode::NOT_FOUND,
                "RES002",
            ),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status(), status, "{code}");
            assert_eq!(err.code(), code);
        }
    }
}
