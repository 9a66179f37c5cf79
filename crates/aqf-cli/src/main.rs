use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use aqf_cli::ApiSettings;
use aqf_config::AppConfig;
use aqf_pipeline::Pipeline;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    // Observability
    aqf_obs::init("aqf-api");

    // Config
    let cfg = AppConfig::load().context("Failed to load configuration")?;
    let pipeline = Pipeline::from_config(&cfg).context("Failed to build pipeline")?;

    // Build app and state
    let (app, state) = aqf_cli::build_app(Arc::new(pipeline), ApiSettings::from_config(&cfg))?;

    // Start HTTP server
    let addr: SocketAddr = cfg
        .api
        .bind
        .parse()
        .with_context(|| format!("Invalid HTTP bind address {}", cfg.api.bind))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    // Mark ready just before serving
    aqf_cli::set_ready(&state, true);

    tracing::info!(%addr, "HTTP server listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
