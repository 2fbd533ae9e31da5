//! Route handlers.

use std::time::Duration;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::api::auth::{AuthenticatedUser, SESSION_HEADER, header_str, verify_access_token};
use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::auth::{SessionTokens, resolve_default_namespace};
use crate::console::ConsoleResource;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
}

pub(crate) async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now(),
    })
}

// -- Sessions --

#[derive(Deserialize)]
pub(crate) struct CreateSessionRequest {
    access_token: String,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Seconds until the session expires.
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Serialize)]
pub(crate) struct CreateSessionResponse {
    session_id: String,
    user_id: String,
    expires_at: DateTime<Utc>,
}

/// Exchange identity provider tokens for a session ID.
pub(crate) async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {
    if req.access_token.trim().is_empty() {
        return Err(ApiError::validation("access_token is required"));
    }

    let id_token = req
        .id_token
        .filter(|t| !t.is_empty())
        .map(SecretString::from);
    let claims = verify_access_token(&state, &req.access_token).await?;
    let user_id = claims.user_id().to_string();

    let ttl = req
        .expires_in
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(state.session_ttl);
    let expires_at = chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    let tokens = SessionTokens {
        access_token: SecretString::from(req.access_token),
        id_token,
        refresh_token: req
            .refresh_token
            .filter(|t| !t.is_empty())
            .map(SecretString::from),
    };
    let session_id = state.sessions.create(&user_id, tokens, expires_at).await;

    tracing::info!(user_id = %user_id, "Session created");
    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id,
            user_id,
            expires_at,
        }),
    ))
}

#[derive(Serialize)]
pub(crate) struct SessionInfo {
    user_id: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

pub(crate) async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SessionInfo>, ApiError> {
    let session_id = header_str(&headers, SESSION_HEADER)
        .ok_or_else(|| ApiError::unauthorized("Missing session"))?;
    let session = state.sessions.get(session_id).await?;
    Ok(Json(SessionInfo {
        user_id: session.user_id,
        created_at: session.created_at,
        expires_at: session.expires_at,
    }))
}

#[derive(Deserialize)]
pub(crate) struct LogoutParams {
    #[serde(default)]
    all: bool,
}

#[derive(Serialize)]
pub(crate) struct LogoutResponse {
    sessions_removed: usize,
    consoles_removed: usize,
}

/// Log out. With `?all=true`, end every session of the user and tear down
/// all of their consoles.
pub(crate) async fn delete_session(
    State(state): State<AppState>,
    Query(params): Query<LogoutParams>,
    headers: HeaderMap,
) -> Result<Json<LogoutResponse>, ApiError> {
    let session_id = header_str(&headers, SESSION_HEADER)
        .ok_or_else(|| ApiError::unauthorized("Missing session"))?;
    let session = state.sessions.get(session_id).await?;

    if !params.all {
        state.sessions.delete(session_id).await;
        tracing::info!(user_id = %session.user_id, "Session ended");
        return Ok(Json(LogoutResponse {
            sessions_removed: 1,
            consoles_removed: 0,
        }));
    }

    let sessions = state.sessions.delete_all_for_user(&session.user_id).await;
    let reports = state.orchestrator.teardown_user(&session.user_id).await;
    tracing::info!(
        user_id = %session.user_id,
        sessions = sessions.len(),
        consoles = reports.len(),
        "Full logout"
    );
    Ok(Json(LogoutResponse {
        sessions_removed: sessions.len(),
        consoles_removed: reports.len(),
    }))
}

// -- Consoles --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LaunchResponse {
    url: String,
    resource_id: String,
}

/// Provision a console for the caller in the namespace their groups map to.
pub(crate) async fn launch_console(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<LaunchResponse>, ApiError> {
    let exchanged = state
        .exchanger
        .exchange(user.access_token.expose_secret())
        .await?;
    let namespace = resolve_default_namespace(&user.claims.groups);

    tracing::info!(
        user_id = %user.user_id(),
        namespace = %namespace,
        groups = user.claims.groups.len(),
        "Launching web console"
    );

    let refresh_token = exchanged
        .refresh_token
        .as_ref()
        .or_else(|| user.refresh_token());
    let resource = state
        .orchestrator
        .provision(
            user.user_id(),
            &exchanged.access_token,
            refresh_token,
            &namespace,
        )
        .await?;

    Ok(Json(LaunchResponse {
        url: resource.console_url,
        resource_id: resource.id,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListResponse {
    consoles: Vec<ConsoleResource>,
    count: usize,
    user_id: String,
}

pub(crate) async fn list_consoles(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Json<ListResponse> {
    let consoles = state.resources().list_for_user(user.user_id()).await;
    Json(ListResponse {
        count: consoles.len(),
        consoles,
        user_id: user.user_id().to_string(),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeleteResponse {
    resource_id: String,
    deleted_at: DateTime<Utc>,
}

pub(crate) async fn delete_console(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
    user: AuthenticatedUser,
) -> Result<Json<DeleteResponse>, ApiError> {
    let resource = state
        .resources()
        .get(&resource_id)
        .await
        .ok_or_else(|| ApiError::not_found("Console not found"))?;

    if resource.user_id != user.user_id() {
        tracing::warn!(
            resource_id = %resource_id,
            owner = %resource.user_id,
            caller = %user.user_id(),
            "Refused to delete another user's console"
        );
        return Err(ApiError::forbidden("You do not own this console"));
    }

    state.orchestrator.teardown(&resource).await;
    Ok(Json(DeleteResponse {
        resource_id,
        deleted_at: Utc::now(),
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeleteAllResponse {
    user_id: String,
    deleted: Vec<String>,
    count: usize,
}

pub(crate) async fn delete_all_consoles(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Json<DeleteAllResponse> {
    let deleted: Vec<String> = state
        .orchestrator
        .teardown_user(user.user_id())
        .await
        .into_iter()
        .map(|r| r.resource_id)
        .collect();
    Json(DeleteAllResponse {
        user_id: user.user_id().to_string(),
        count: deleted.len(),
        deleted,
    })
}
