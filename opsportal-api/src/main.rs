//! # OpsPortal API Server
//!
//! HTTP API for the internal operations portal: team tasks, project
//! features and QA, finance clients and hourly rates, and integration
//! checks, backed by a Firestore document store.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p opsportal-api
//! ```

use opsportal_api::{
    app::{build_router, shutdown_signal, AppState},
    config::Config,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "opsportal_api=debug,opsportal_shared=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "OpsPortal API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_env()?;
    let bind_address = config.bind_address();
    tracing::info!(
        store = ?config.store.backend,
        auth = ?config.auth.mode,
        "Configuration loaded"
    );

    let state = AppState::from_config(config).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
