//! End-to-end API flows over fake identity and cluster backends.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tower::ServiceExt;

use webconsole::api::auth::SESSION_HEADER;
use webconsole::api::error::REQUEST_ID_HEADER;
use webconsole::api::{AppState, ConsoleApi};
use webconsole::auth::SessionStore;
use webconsole::cluster::ConsoleObject;
use webconsole::config::{ClusterConfig, ConsoleConfig};
use webconsole::console::{ConsoleOrchestrator, ResourceStore};
use webconsole::testing::{FakeCluster, StaticExchanger, StaticIdentity};

/// Unsigned compact JWT carrying `claims`.
fn jwt(claims: serde_json::Value) -> String {
    format!(
        "{}.{}.c2lnbmF0dXJl",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(claims.to_string()),
    )
}

fn dave_token() -> String {
    jwt(serde_json::json!({
        "sub": "sub-dave",
        "preferred_username": "dave",
        "groups": ["/teamD/ops_dev"],
    }))
}

struct Harness {
    state: AppState,
    cluster: Arc<FakeCluster>,
}

impl Harness {
    fn new() -> Self {
        let cluster = FakeCluster::new().shared();
        let identity = StaticIdentity::new()
            .with_user("alice-token", "alice", &["/teamA/finance_dev", "/teamA/finance_view"])
            .with_user("bob-token", "bob", &["/teamA/x_dev", "/teamB/y_dev"])
            .with_user(
                "admin-token",
                "root",
                &["/dataops/serviceroles/platform/platform_adm", "/teamC/z_adm"],
            )
            // Userinfo without groups.
            .with_user("carol-token", "carol", &[])
            .with_user(&dave_token(), "dave", &[]);
        let console = ConsoleConfig {
            base_url: "https://console.example.com/".to_string(),
            ready_timeout: Duration::from_millis(20),
            ready_poll_interval: Duration::from_millis(5),
            ..ConsoleConfig::default()
        };
        let state = AppState {
            verifier: Arc::new(identity),
            exchanger: Arc::new(StaticExchanger::new()),
            sessions: SessionStore::new(),
            orchestrator: Arc::new(ConsoleOrchestrator::new(
                cluster.clone(),
                console,
                ClusterConfig::default(),
                ResourceStore::new(),
            )),
            session_ttl: Duration::from_secs(3600),
        };
        Self { state, cluster }
    }

    fn router(&self) -> Router {
        ConsoleApi::router(self.state.clone())
    }

    async fn send(&self, req: Request<Body>) -> Response {
        self.router().oneshot(req).await.unwrap()
    }

    async fn launch(&self, token: &str) -> serde_json::Value {
        let req = Request::builder()
            .method("POST")
            .uri("/api/console/launch")
            .header("Authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let resp = self.send(req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        body_json(resp).await
    }

    async fn login(&self, token: &str) -> String {
        self.login_with(serde_json::json!({
            "access_token": token,
            "refresh_token": "login-refresh",
        }))
        .await
    }

    async fn login_with(&self, body: serde_json::Value) -> String {
        let req = Request::builder()
            .method("POST")
            .uri("/api/auth/session")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = self.send(req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        body_json(resp).await["session_id"]
            .as_str()
            .unwrap()
            .to_string()
    }
}

async fn body_json(resp: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn delete_request(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn launch_list_delete_round_trip() {
    let h = Harness::new();

    let launched = h.launch("alice-token").await;
    let id = launched["resourceId"].as_str().unwrap().to_string();
    assert_eq!(
        launched["url"],
        format!("https://console.example.com/{}", id)
    );

    let req = Request::builder()
        .uri("/api/console/list")
        .header("Authorization", "Bearer alice-token")
        .body(Body::empty())
        .unwrap();
    let list = body_json(h.send(req).await).await;
    assert_eq!(list["count"], 1);
    assert_eq!(list["userId"], "alice");
    assert_eq!(list["consoles"][0]["id"], id.as_str());
    assert_eq!(list["consoles"][0]["namespace"], "teamA");

    let resp = h
        .send(delete_request(&format!("/api/console/{}", id), "alice-token"))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let deleted = body_json(resp).await;
    assert_eq!(deleted["resourceId"], id.as_str());
    assert!(deleted["deletedAt"].is_string());

    assert!(h.state.resources().is_empty().await);
    assert!(h.cluster.names(ConsoleObject::Deployment, "teamA").await.is_empty());
    assert_eq!(
        h.cluster.storage_claim_names("teamA").await,
        vec!["history-alice"]
    );
}

#[tokio::test]
async fn namespace_follows_groups() {
    let h = Harness::new();

    h.launch("bob-token").await;
    h.launch("admin-token").await;

    let bob = h.state.resources().list_for_user("bob").await;
    assert_eq!(bob[0].namespace, "default");
    let root = h.state.resources().list_for_user("root").await;
    assert_eq!(root[0].namespace, "default");
}

#[tokio::test]
async fn login_id_token_cannot_pick_namespace() {
    let h = Harness::new();
    let forged = jwt(serde_json::json!({
        "sub": "sub-carol",
        "preferred_username": "carol",
        "groups": ["/teamZ/payroll_adm"],
    }));
    let session = h
        .login_with(serde_json::json!({
            "access_token": "carol-token",
            "id_token": forged,
        }))
        .await;

    let req = Request::builder()
        .method("POST")
        .uri("/api/console/launch")
        .header(SESSION_HEADER, &session)
        .body(Body::empty())
        .unwrap();
    let resp = h.send(req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let consoles = h.state.resources().list_for_user("carol").await;
    assert_eq!(consoles[0].namespace, "default");
    assert!(h.cluster.names(ConsoleObject::Deployment, "teamZ").await.is_empty());
}

#[tokio::test]
async fn groups_fall_back_to_accepted_access_token() {
    let h = Harness::new();

    h.launch(&dave_token()).await;

    let consoles = h.state.resources().list_for_user("dave").await;
    assert_eq!(consoles[0].namespace, "teamD");
}

#[tokio::test]
async fn deleting_someone_elses_console_is_forbidden() {
    let h = Harness::new();
    let id = h.launch("alice-token").await["resourceId"]
        .as_str()
        .unwrap()
        .to_string();

    let resp = h
        .send(delete_request(&format!("/api/console/{}", id), "bob-token"))
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(resp).await["error"]["code"], "AUTHZ001");
    assert!(h.state.resources().get(&id).await.is_some());
}

#[tokio::test]
async fn deleting_unknown_console_is_not_found() {
    let h = Harness::new();

    let resp = h
        .send(delete_request("/api/console/does-not-exist", "alice-token"))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["error"]["code"], "RES002");
}

#[tokio::test]
async fn missing_credentials_get_request_id() {
    let h = Harness::new();

    let req = Request::builder()
        .method("POST")
        .uri("/api/console/launch")
        .body(Body::empty())
        .unwrap();
    let resp = h.send(req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let header = resp.headers()[REQUEST_ID_HEADER]
        .to_str()
        .unwrap()
        .to_string();
    let json = body_json(resp).await;
    assert_eq!(json["request_id"], header.as_str());
    assert_eq!(json["error"]["type"], "AUTHENTICATION_ERROR");
    assert!(h.state.resources().is_empty().await);
}

#[tokio::test]
async fn provisioning_failure_is_generic_500() {
    let h = Harness::new();
    h.cluster
        .fail(webconsole::testing::FakeOp::CreateService)
        .await;

    let req = Request::builder()
        .method("POST")
        .uri("/api/console/launch")
        .header("Authorization", "Bearer alice-token")
        .body(Body::empty())
        .unwrap();
    let resp = h.send(req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(resp).await;
    assert_eq!(json["error"]["code"], "K8S002");
    assert!(!json.to_string().contains("console-svc-"));
}

#[tokio::test]
async fn session_launch_stores_refresh_token() {
    let h = Harness::new();
    let session = h.login("alice-token").await;

    let req = Request::builder()
        .method("GET")
        .uri("/api/console/launch")
        .header(SESSION_HEADER, &session)
        .body(Body::empty())
        .unwrap();
    let resp = h.send(req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let id = body_json(resp).await["resourceId"]
        .as_str()
        .unwrap()
        .to_string();

    let resource = h.state.resources().get(&id).await.unwrap();
    let secret = h
        .cluster
        .secret("teamA", &resource.secret_name)
        .await
        .unwrap();
    let data = secret.string_data.unwrap();
    assert!(data["config"].contains("exchanged-alice-token"));
    assert_eq!(data["refresh-token"], "refresh-alice-token");
}

#[tokio::test]
async fn session_info_and_logout() {
    let h = Harness::new();
    let session = h.login("alice-token").await;

    let req = Request::builder()
        .uri("/api/auth/session")
        .header(SESSION_HEADER, &session)
        .body(Body::empty())
        .unwrap();
    let resp = h.send(req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["user_id"], "alice");

    let req = Request::builder()
        .method("DELETE")
        .uri("/api/auth/session")
        .header(SESSION_HEADER, &session)
        .body(Body::empty())
        .unwrap();
    let resp = h.send(req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["sessions_removed"], 1);

    let req = Request::builder()
        .uri("/api/auth/session")
        .header(SESSION_HEADER, &session)
        .body(Body::empty())
        .unwrap();
    let resp = h.send(req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["error"]["code"], "AUTH004");
}

#[tokio::test]
async fn full_logout_tears_down_consoles() {
    let h = Harness::new();
    let first = h.login("alice-token").await;
    let _second = h.login("alice-token").await;
    h.launch("alice-token").await;
    h.launch("alice-token").await;
    h.launch("bob-token").await;

    let req = Request::builder()
        .method("DELETE")
        .uri("/api/auth/session?all=true")
        .header(SESSION_HEADER, &first)
        .body(Body::empty())
        .unwrap();
    let resp = h.send(req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["sessions_removed"], 2);
    assert_eq!(json["consoles_removed"], 2);

    assert!(h.state.sessions.is_empty().await);
    assert!(h.state.resources().list_for_user("alice").await.is_empty());
    assert_eq!(h.state.resources().list_for_user("bob").await.len(), 1);
}

#[tokio::test]
async fn delete_all_consoles_only_touches_caller() {
    let h = Harness::new();
    h.launch("alice-token").await;
    h.launch("alice-token").await;
    h.launch("bob-token").await;

    let resp = h.send(delete_request("/api/console", "alice-token")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["count"], 2);
    assert_eq!(json["userId"], "alice");
    assert_eq!(h.state.resources().len().await, 1);
}
