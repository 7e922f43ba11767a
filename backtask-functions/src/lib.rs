//! Backtask functions host
//!
//! Serves the two backtask functions over HTTP: `enqueue`, which adds one
//! task to the `processtask` queue, and `processtask`, which Cloud Tasks
//! calls when it delivers that task.

pub mod config;
pub mod enqueuer;
pub mod handler;
pub mod processor;
pub mod types;

use axum::{
    routing::{any, get, post},
    Router,
};
use config::FunctionTarget;
use handler::{
    enqueue_handler, health_handler, metrics_handler, processtask_handler, ready_handler, AppState,
};

/// Build the router
///
/// Both functions are always reachable under their own names. When a
/// `target` is given it is also served at `/`, which is where a deployed
/// function's URI points.
pub fn router(state: AppState, target: Option<FunctionTarget>) -> Router {
    let mut router = Router::new()
        .route("/enqueue", any(enqueue_handler))
        .route("/processtask", post(processtask_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler));

    router = match target {
        Some(FunctionTarget::Enqueue) => router.route("/", any(enqueue_handler)),
        Some(FunctionTarget::ProcessTask) => router.route("/", post(processtask_handler)),
        None => router,
    };

    router.with_state(state)
}
