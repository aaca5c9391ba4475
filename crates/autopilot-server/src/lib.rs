pub mod error;
pub mod routes;
pub mod state;

use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use autopilot_core::executor::ExecutorRegistry;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(root: PathBuf) -> autopilot_core::Result<Router> {
    build_router_with(root, Arc::new(ExecutorRegistry::with_builtins()))
}

/// Like [`build_router`], with a caller-supplied executor registry so
/// deployments (and tests) can plug in platform connectors.
pub fn build_router_with(
    root: PathBuf,
    registry: Arc<ExecutorRegistry>,
) -> autopilot_core::Result<Router> {
    let app_state = state::AppState::with_registry(root, registry)?;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Ok(Router::new()
        // Events (SSE)
        .route("/api/events", get(routes::events::sse_events))
        // Automations
        .route(
            "/api/automations",
            get(routes::automations::list_automations),
        )
        .route(
            "/api/automations/{slug}",
            get(routes::automations::get_automation),
        )
        .route(
            "/api/automations/{slug}/test",
            post(routes::automations::test_automation),
        )
        .route(
            "/api/automations/{slug}/run",
            post(routes::automations::run_automation),
        )
        .route(
            "/api/automations/{slug}/runs",
            get(routes::automations::list_automation_runs),
        )
        // Commands
        .route(
            "/api/commands/interpret",
            post(routes::commands::interpret_command),
        )
        .route(
            "/api/commands/preview",
            post(routes::commands::preview_command),
        )
        .route("/api/commands", post(routes::commands::execute_command))
        .route(
            "/api/commands/history",
            get(routes::commands::command_history),
        )
        // Runs
        .route("/api/runs", get(routes::runs::list_runs))
        .route("/api/runs/{id}", get(routes::runs::get_run))
        .layer(cors)
        .with_state(app_state))
}

/// Start the API server.
pub async fn serve(root: PathBuf, port: u16) -> anyhow::Result<()> {
    let app = build_router(root)?;
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let actual_port = listener.local_addr()?.port();
    tracing::info!("autopilot API listening on http://localhost:{actual_port}");
    axum::serve(listener, app).await?;
    Ok(())
}
