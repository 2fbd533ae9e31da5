//! Caller authentication for API handlers.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use secrecy::{ExposeSecret, SecretString};

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::auth::{IdentityClaims, Session};

pub const SESSION_HEADER: &str = "x-session-id";

/// Verified caller of an API route.
///
/// Taken from `Authorization: Bearer <token>` when present, otherwise from
/// the session named by `X-Session-Id`. Either way the access token is
/// checked against the identity provider before a handler runs.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub claims: IdentityClaims,
    pub access_token: SecretString,
    pub session: Option<Session>,
}

impl AuthenticatedUser {
    pub fn user_id(&self) -> &str {
        self.claims.user_id()
    }

    /// Refresh token captured at login, if the caller came in via a session.
    pub fn refresh_token(&self) -> Option<&SecretString> {
        self.session.as_ref().and_then(|s| s.refresh_token.as_ref())
    }
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(token) = bearer_token(&parts.headers) {
            let claims = verify_access_token(state, token).await?;
            return Ok(Self {
                claims,
                access_token: SecretString::from(token.to_string()),
                session: None,
            });
        }

        let session_id = header_str(&parts.headers, SESSION_HEADER)
            .ok_or_else(|| ApiError::unauthorized("Missing bearer token or session"))?;
        let session = state.sessions.get(session_id).await?;

        let claims = verify_access_token(state, session.access_token.expose_secret()).await?;
        if claims.user_id() != session.user_id {
            tracing::warn!(
                session_user = %session.user_id,
                token_user = %claims.user_id(),
                "Session token belongs to a different user"
            );
            return Err(ApiError::unauthorized("Session does not match its token"));
        }

        Ok(Self {
            claims,
            access_token: session.access_token.clone(),
            session: Some(session),
        })
    }
}

/// Verify an access token against the identity provider.
///
/// Groups come from userinfo. When userinfo carries none, they are read from
/// the payload of the access token itself, which the provider has just
/// accepted. Client-supplied ID tokens are never consulted.
pub(crate) async fn verify_access_token(
    state: &AppState,
    access_token: &str,
) -> Result<IdentityClaims, ApiError> {
    let claims = state.verifier.verify(access_token).await?;
    if !claims.groups.is_empty() {
        return Ok(claims);
    }
    Ok(match IdentityClaims::from_accepted_jwt(access_token) {
        Ok(token_claims) => claims.with_fallback_groups(&token_claims),
        Err(e) => {
            tracing::debug!(error = %e, "Access token carries no readable claims");
            claims
        }
    })
}

pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}
