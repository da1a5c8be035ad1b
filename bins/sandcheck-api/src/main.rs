mod handlers;
mod metrics;
mod routes;

use anyhow::Context;
use sandcheck_common::config::EngineConfig;
use sandcheck_engine::Engine;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

// extra challenge definitions picked up when SANDCHECK_CHALLENGES is unset
const DEFAULT_CHALLENGES_PATH: &str = "config/challenges.json";

pub struct AppState {
    pub engine: Engine,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Sandcheck API booting...");

    let mut config = EngineConfig::from_env().context("Invalid SANDCHECK_* configuration")?;
    if config.challenges_path.is_none() {
        let default_path = PathBuf::from(DEFAULT_CHALLENGES_PATH);
        if default_path.exists() {
            config.challenges_path = Some(default_path);
        }
    }
    if let Some(path) = &config.challenges_path {
        info!("Loading extra challenges from {}", path.display());
    }

    let engine = Engine::new(config).context("Failed to load challenge definitions")?;
    info!("Registered {} challenges", engine.registry().len());

    let state = Arc::new(AppState { engine });
    let app = routes::router(state);

    let addr = std::env::var("SANDCHECK_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);
    info!("Ready to verify submissions");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if signal::ctrl_c().await.is_ok() {
                warn!("Received shutdown signal, finishing in-flight verifications...");
            }
        })
        .await
        .context("Server error")?;

    info!("Sandcheck API stopped");
    Ok(())
}
