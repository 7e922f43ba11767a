//! Backtask functions server
//!
//! HTTP server hosting the `enqueue` and `processtask` functions.
//!
//! # Configuration
//!
//! Environment variables:
//! - PROJECT_ID - GCP project owning the queue (default: credentials' project)
//! - SERVICE_ACCOUNT_EMAIL - Account Cloud Tasks mints OIDC tokens for
//! - PORT - HTTP port (default: 8080)
//! - FUNCTION_TARGET - Function also served at `/` (optional)

use backtask_functions::{
    config::ServerConfig, enqueuer::LazyEnqueuer, handler::AppState, processor::LoggingProcessor,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // JSON logs for Cloud Logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backtask_functions=info,backtask_gcp=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting backtask functions server");

    let server_config = match ServerConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "Failed to load server configuration");
            std::process::exit(1);
        }
    };

    info!(
        port = server_config.port,
        function_target = ?server_config.function_target,
        "Configuration loaded"
    );

    // Credentials are resolved lazily; a failure here only degrades /enqueue
    let enqueuer = Arc::new(LazyEnqueuer::application_default());
    if let Err(e) = enqueuer.get().await {
        warn!(error = %e, "Enqueuer unavailable at startup, will retry on request");
    }

    let state = AppState {
        enqueuer,
        processor: Arc::new(LoggingProcessor),
    };

    let app = backtask_functions::router(state, server_config.function_target)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(60)))
        .layer(RequestBodyLimitLayer::new(1024 * 1024));

    let addr = format!("0.0.0.0:{}", server_config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, address = %addr, "Failed to bind server");
            std::process::exit(1);
        }
    };

    info!(address = %addr, "Server listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }

    info!("Server shut down gracefully");
}

/// Graceful shutdown signal handler
///
/// Waits for SIGTERM (Cloud Run shutdown signal) or Ctrl-C
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl-C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
