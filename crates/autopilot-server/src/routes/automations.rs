use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use tracing::info;

use autopilot_core::automation;

use crate::error::AppError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Read endpoints
// ---------------------------------------------------------------------------

/// GET /api/automations — all automation manifests, including statistics.
pub async fn list_automations(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let root = app.root.clone();
    let automations = tokio::task::spawn_blocking(move || automation::list(&root))
        .await
        .map_err(anyhow::Error::from)??;
    Ok(Json(serde_json::json!(automations)))
}

/// GET /api/automations/{slug} — one manifest.
pub async fn get_automation(
    Path(slug): Path<String>,
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let root = app.root.clone();
    let loaded = tokio::task::spawn_blocking(move || automation::load(&root, &slug))
        .await
        .map_err(anyhow::Error::from)??;
    Ok(Json(serde_json::json!(loaded)))
}

// ---------------------------------------------------------------------------
// Run endpoints
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub trigger_data: serde_json::Value,
}

/// POST /api/automations/{slug}/test — sandbox run: identical state machine,
/// non-committing executor variant, synchronous full log, no statistics.
pub async fn test_automation(
    Path(slug): Path<String>,
    State(app): State<AppState>,
    Json(request): Json<RunRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let root = app.root.clone();
    let slug_clone = slug.clone();
    let loaded = tokio::task::spawn_blocking(move || automation::load(&root, &slug_clone))
        .await
        .map_err(anyhow::Error::from)??;

    info!(slug = %slug, "sandbox run requested");
    let log = app
        .orchestrator
        .run_test(&loaded, request.trigger_data)
        .await?;
    Ok(Json(serde_json::json!(log)))
}

/// POST /api/automations/{slug}/run — live run; returns the finalized log
/// and writes updated statistics back to the manifest.
pub async fn run_automation(
    Path(slug): Path<String>,
    State(app): State<AppState>,
    Json(request): Json<RunRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let root = app.root.clone();
    let slug_clone = slug.clone();
    let loaded = tokio::task::spawn_blocking(move || automation::load(&root, &slug_clone))
        .await
        .map_err(anyhow::Error::from)??;

    info!(slug = %slug, "live run requested");
    let log = app
        .orchestrator
        .run_automation(&loaded, request.trigger_data, false)
        .await?;

    if let Some(stats) = app.orchestrator.stats().stats_for(loaded.id) {
        let root = app.root.clone();
        let slug_clone = slug.clone();
        tokio::task::spawn_blocking(move || {
            automation::update_stats(&root, &slug_clone, &stats)
        })
        .await
        .map_err(anyhow::Error::from)??;
    }

    Ok(Json(serde_json::json!(log)))
}

/// GET /api/automations/{slug}/runs — this automation's logs, newest first.
pub async fn list_automation_runs(
    Path(slug): Path<String>,
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let root = app.root.clone();
    let slug_clone = slug.clone();
    let loaded = tokio::task::spawn_blocking(move || automation::load(&root, &slug_clone))
        .await
        .map_err(anyhow::Error::from)??;

    let Some(db) = app.orchestrator.db() else {
        return Ok(Json(serde_json::json!([])));
    };
    let runs = db.list_for_automation(loaded.id)?;
    Ok(Json(serde_json::json!(runs)))
}
