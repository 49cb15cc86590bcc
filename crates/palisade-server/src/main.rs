//! Palisade REST server entry point.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use palisade_engine::fixtures::demo_service;
use palisade_server::{create_router, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,palisade=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Palisade Server v{}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/palisade.toml".to_string());
    let config = if std::path::Path::new(&config_path).exists() {
        info!("Loading configuration from {}", config_path);
        ServerConfig::from_file(&config_path)?
    } else {
        info!("Using default configuration");
        ServerConfig::default()
    };

    // Live provider credentials are wired by the hosting layer; the
    // standalone binary serves the fixture-backed service.
    let service = Arc::new(demo_service());
    let router = create_router(service, config.permissive_cors);

    let listener = tokio::net::TcpListener::bind(config.addr()).await?;
    info!("Listening on http://{}", config.addr());

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install CTRL+C handler");
            info!("Shutting down");
        })
        .await?;

    Ok(())
}
