//! Public HTTP API.
//!
//! Console routes accept either a bearer access token or a session ID and
//! resolve the caller through [`auth::AuthenticatedUser`] before a handler
//! runs. `/health` is open.

pub mod auth;
pub mod error;
mod handlers;
pub mod state;

use std::future::Future;

use axum::Router;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::routing::{delete, get, post};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use state::AppState;

use crate::config::ServerConfig;
use crate::error::ConfigError;

/// The web console HTTP server.
pub struct ConsoleApi;

impl ConsoleApi {
    /// Build the axum router (without CORS).
    pub fn router(state: AppState) -> Router {
        Router::new()
            .route(
                "/api/auth/session",
                post(handlers::create_session)
                    .get(handlers::get_session)
                    .delete(handlers::delete_session),
            )
            .route(
                "/api/console/launch",
                post(handlers::launch_console).get(handlers::launch_console),
            )
            .route("/api/console/list", get(handlers::list_consoles))
            .route("/api/console/{resource_id}", delete(handlers::delete_console))
            .route("/api/console", delete(handlers::delete_all_consoles))
            .route("/health", get(handlers::health_check))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Serve the API until `shutdown` resolves.
    pub async fn serve<F>(
        state: AppState,
        config: &ServerConfig,
        shutdown: F,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = config.socket_addr()?;
        let router = Self::router(state).layer(cors_layer(&config.allowed_origins)?);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Web console API listening on {}", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

/// CORS restricted to the configured front-end origins.
pub fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer, ConfigError> {
    let origins = allowed_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|e| ConfigError::InvalidValue {
                key: "ALLOWED_ORIGINS".to_string(),
                message: format!("'{}' is not a valid origin: {}", origin, e),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static(auth::SESSION_HEADER),
        ])
        .expose_headers([HeaderName::from_static(error::REQUEST_ID_HEADER)])
        .allow_credentials(true))
}
