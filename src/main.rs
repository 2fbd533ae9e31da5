//! Web console service - main entry point.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use webconsole::{
    api::{AppState, ConsoleApi},
    auth::{SessionStore, TokenExchangeClient, UserInfoClient},
    cluster::ClusterRegistry,
    config::Config,
    console::{ConsoleOrchestrator, GarbageCollector, GcConfig, ResourceStore},
};

#[derive(Parser, Debug)]
#[command(name = "webconsole")]
#[command(about = "Provisions per-user web consoles on Kubernetes")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Load environment variables from this file instead of ./.env
    #[arg(long)]
    env_file: Option<std::path::PathBuf>,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("webconsole=info,tower_http=info"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Configuration first so LOG_FORMAT / RUST_LOG from .env take effect.
    let config = match args.env_file.as_deref() {
        Some(path) => Config::from_env_file(path),
        None => Config::from_env(),
    };
    init_tracing();
    let mut config = config?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    tracing::info!("Starting web console service...");
    config.oidc.validate()?;

    let clusters = ClusterRegistry::connect(&config.cluster).await?;
    tracing::info!(
        server = %config.cluster.console_server(),
        target_is_control = clusters.target_is_control(),
        "Cluster clients initialized"
    );

    let exchanger = Arc::new(TokenExchangeClient::new(&config.oidc)?);
    tracing::info!(audience = %exchanger.audience(), "Token exchange client initialized");
    let verifier = Arc::new(UserInfoClient::new(&config.oidc)?);

    let resources = ResourceStore::new();
    let orchestrator = Arc::new(ConsoleOrchestrator::new(
        clusters.target(),
        config.console.clone(),
        config.cluster.clone(),
        resources.clone(),
    ));

    let sessions = SessionStore::new();
    let session_sweeper = sessions.spawn_sweeper(config.session.sweep_interval);

    let gc = GarbageCollector::new(
        clusters.target(),
        resources,
        GcConfig {
            ttl: config.console.ttl,
            grace: config.console.ready_timeout,
        },
    )
    .spawn(config.console.gc_interval);

    let state = AppState {
        verifier,
        exchanger,
        sessions,
        orchestrator,
        session_ttl: config.session.default_ttl,
    };

    let served = ConsoleApi::serve(state, &config.server, shutdown_signal()).await;

    gc.shutdown().await;
    session_sweeper.shutdown().await;

    if let Err(e) = served {
        anyhow::bail!("HTTP server failed: {}", e);
    }
    tracing::info!("Web console service stopped");
    Ok(())
}
