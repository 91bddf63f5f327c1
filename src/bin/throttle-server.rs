//! Demo server: a single route behind the throttle layer.
//!
//! Configuration comes from the environment (see `ThrottleConfig`); logging
//! is controlled with `RUST_LOG` (default `info`).

use axum::{routing::get, Router};
use http_throttle::{RedisStore, ThrottleConfig, ThrottleLayer};
use std::net::SocketAddr;
use std::process::ExitCode;
use tokio::net::TcpListener;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ThrottleConfig::from_env()?;

    let store = RedisStore::connect(&config.store_url()).await?;
    tracing::info!(store = %config.store_url(), "connected to counting store");

    let throttle = ThrottleLayer::builder(store)
        .with_policy(config.policy().clone())
        .with_header_name(config.header_name())
        .build()?;
    let metrics = throttle.metrics().clone();

    // Outermost first: panics are caught around the whole stack
    let app = Router::new()
        .route("/", get(|| async { "Hello, world!" }))
        .layer(throttle)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new());

    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Starting throttle server on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    let snapshot = metrics.snapshot();
    tracing::info!(
        allowed = snapshot.requests_allowed,
        denied = snapshot.requests_denied,
        blocks = snapshot.blocks_triggered,
        malformed = snapshot.malformed_counters,
        store_errors = snapshot.store_errors,
        "shutting down"
    );

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
