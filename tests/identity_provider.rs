//! Token exchange and userinfo clients against a stub identity provider.
//!
//! The stub is a real axum server on 127.0.0.1, so requests go through
//! reqwest exactly as they would in production.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;

use webconsole::auth::exchange::{ACCESS_TOKEN_TYPE, TOKEN_EXCHANGE_GRANT};
use webconsole::auth::{IdentityVerifier, TokenExchangeClient, TokenExchanger, UserInfoClient};
use webconsole::auth::resolve_default_namespace;
use webconsole::config::OidcConfig;
use webconsole::error::{ExchangeError, IdentityError};

const CLIENT_ID: &str = "webconsole";
const CLIENT_SECRET: &str = "s3cret";
const AUDIENCE: &str = "kubernetes";

// ---------------------------------------------------------------------------
// Stub identity provider
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Recorded {
    form: Option<HashMap<String, String>>,
    authorization: Option<String>,
    accept: Option<String>,
}

type StubState = Arc<Mutex<Recorded>>;

async fn token_endpoint(
    State(state): State<StubState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    {
        let mut recorded = state.lock().await;
        recorded.authorization = header("authorization");
        recorded.accept = header("accept");
        recorded.form = Some(form.clone());
    }

    match form.get("subject_token").map(String::as_str) {
        Some("rejected") => (
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"subject token is expired"}"#,
        )
            .into_response(),
        Some("verbose") => (
            StatusCode::BAD_REQUEST,
            format!(r#"{{"error":"{}"}}"#, "e".repeat(2000)),
        )
            .into_response(),
        Some("garbage") => (StatusCode::OK, "<html>login</html>").into_response(),
        Some("no-access-token") => {
            Json(serde_json::json!({"token_type": "Bearer"})).into_response()
        }
        Some(subject) => Json(serde_json::json!({
            "access_token": format!("cluster-{}", subject),
            "token_type": "Bearer",
            "expires_in": 300,
            "refresh_token": "refresh-1",
            "refresh_expires_in": 1800,
            "issued_token_type": ACCESS_TOKEN_TYPE,
        }))
        .into_response(),
        None => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn userinfo_endpoint(headers: HeaderMap) -> Response {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match token {
        Some("alice-access") => Json(serde_json::json!({
            "sub": "8d0c5a5e",
            "preferred_username": "alice",
            "email": "alice@example.com",
            "groups": "/teamA/finance_dev, /teamA/finance_view",
        }))
        .into_response(),
        Some("broken") => (StatusCode::SERVICE_UNAVAILABLE, "maintenance").into_response(),
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn start_stub_idp() -> (SocketAddr, StubState) {
    let state = StubState::default();
    let app = Router::new()
        .route("/realms/main/protocol/openid-connect/token", post(token_endpoint))
        .route(
            "/realms/main/protocol/openid-connect/userinfo",
            get(userinfo_endpoint),
        )
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

fn oidc_config(addr: SocketAddr) -> OidcConfig {
    OidcConfig {
        issuer_url: Some(format!("http://{}/realms/main", addr)),
        client_id: Some(CLIENT_ID.to_string()),
        client_secret: Some(SecretString::from(CLIENT_SECRET.to_string())),
        audience: Some(AUDIENCE.to_string()),
        http_timeout: Duration::from_secs(5),
        ..OidcConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Token exchange
// ---------------------------------------------------------------------------

#[tokio::test]
async fn exchange_sends_grant_with_basic_auth() {
    let (addr, recorded) = start_stub_idp().await;
    let client = TokenExchangeClient::new(&oidc_config(addr)).unwrap();

    let token = client.exchange("user-token").await.unwrap();
    assert_eq!(token.access_token.expose_secret(), "cluster-user-token");
    assert_eq!(token.expires_in, Some(300));
    assert_eq!(
        token.refresh_token.as_ref().map(|t| t.expose_secret().to_string()),
        Some("refresh-1".to_string())
    );

    let recorded = recorded.lock().await;
    let form = recorded.form.as_ref().unwrap();
    assert_eq!(form["grant_type"], TOKEN_EXCHANGE_GRANT);
    assert_eq!(form["subject_token"], "user-token");
    assert_eq!(form["subject_token_type"], ACCESS_TOKEN_TYPE);
    assert_eq!(form["requested_token_type"], ACCESS_TOKEN_TYPE);
    assert_eq!(form["audience"], AUDIENCE);
    assert!(!form.contains_key("client_secret"));

    let expected = format!(
        "Basic {}",
        STANDARD.encode(format!("{}:{}", CLIENT_ID, CLIENT_SECRET))
    );
    assert_eq!(recorded.authorization.as_deref(), Some(expected.as_str()));
    assert_eq!(recorded.accept.as_deref(), Some("application/json"));
}

#[tokio::test]
async fn exchange_rejection_keeps_status_and_body() {
    let (addr, _) = start_stub_idp().await;
    let client = TokenExchangeClient::new(&oidc_config(addr)).unwrap();

    match client.exchange("rejected").await {
        Err(ExchangeError::Upstream { status, body }) => {
            assert_eq!(status, 400);
            assert!(body.contains("invalid_grant"));
        }
        other => panic!("expected Upstream, got {:?}", other.map(|t| t.token_type)),
    }
}

#[tokio::test]
async fn exchange_rejection_keeps_long_body_whole() {
    let (addr, _) = start_stub_idp().await;
    let client = TokenExchangeClient::new(&oidc_config(addr)).unwrap();

    match client.exchange("verbose").await {
        Err(err @ ExchangeError::Upstream { .. }) => {
            assert!(err.to_string().len() < 600);
            let ExchangeError::Upstream { body, .. } = err else {
                unreachable!()
            };
            assert_eq!(body.len(), 2000 + r#"{"error":""}"#.len());
        }
        other => panic!("expected Upstream, got {:?}", other.map(|t| t.token_type)),
    }
}

#[tokio::test]
async fn exchange_non_token_body_is_decode_error() {
    let (addr, _) = start_stub_idp().await;
    let client = TokenExchangeClient::new(&oidc_config(addr)).unwrap();

    assert!(matches!(
        client.exchange("garbage").await,
        Err(ExchangeError::Decode(_))
    ));
    assert!(matches!(
        client.exchange("no-access-token").await,
        Err(ExchangeError::Decode(_))
    ));
}

#[tokio::test]
async fn exchange_empty_subject_is_rejected_locally() {
    let (addr, recorded) = start_stub_idp().await;
    let client = TokenExchangeClient::new(&oidc_config(addr)).unwrap();

    assert!(matches!(
        client.exchange("").await,
        Err(ExchangeError::InvalidSubject)
    ));
    assert!(recorded.lock().await.form.is_none());
}

#[tokio::test]
async fn exchange_unreachable_endpoint_is_network_error() {
    // Bind and drop to get a port nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = TokenExchangeClient::new(&oidc_config(addr)).unwrap();
    assert!(matches!(
        client.exchange("user-token").await,
        Err(ExchangeError::Network(_))
    ));
}

#[test]
fn exchange_client_requires_credentials() {
    let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();

    let mut config = oidc_config(addr);
    config.client_secret = None;
    assert!(matches!(
        TokenExchangeClient::new(&config),
        Err(ExchangeError::Configuration(_))
    ));

    let mut config = oidc_config(addr);
    config.audience = Some(String::new());
    assert!(matches!(
        TokenExchangeClient::new(&config),
        Err(ExchangeError::Configuration(_))
    ));
}

// ---------------------------------------------------------------------------
// Userinfo
// ---------------------------------------------------------------------------

#[tokio::test]
async fn userinfo_yields_claims_and_namespace() {
    let (addr, _) = start_stub_idp().await;
    let verifier = UserInfoClient::new(&oidc_config(addr)).unwrap();

    let claims = verifier.verify("alice-access").await.unwrap();
    assert_eq!(claims.user_id(), "alice");
    assert_eq!(
        claims.groups,
        vec!["/teamA/finance_dev", "/teamA/finance_view"]
    );
    assert_eq!(resolve_default_namespace(&claims.groups), "teamA");
}

#[tokio::test]
async fn userinfo_distinguishes_rejection_from_outage() {
    let (addr, _) = start_stub_idp().await;
    let verifier = UserInfoClient::new(&oidc_config(addr)).unwrap();

    assert!(matches!(
        verifier.verify("someone-else").await,
        Err(IdentityError::Unauthorized)
    ));
    assert!(matches!(
        verifier.verify("broken").await,
        Err(IdentityError::Upstream(_))
    ));
}
