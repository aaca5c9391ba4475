use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ListParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// GET /api/runs — recent execution logs, newest first.
pub async fn list_runs(
    State(app): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Some(db) = app.orchestrator.db() else {
        return Ok(Json(serde_json::json!([])));
    };
    let runs = db.list_recent(params.limit)?;
    Ok(Json(serde_json::json!(runs)))
}

/// GET /api/runs/{id} — one log with its full trace.
pub async fn get_run(
    Path(id): Path<String>,
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let run_id: Uuid = id
        .parse()
        .map_err(|_| AppError::bad_request(format!("invalid run id '{id}'")))?;
    let Some(db) = app.orchestrator.db() else {
        return Err(AppError(
            autopilot_core::PipelineError::RunNotFound(id).into(),
        ));
    };
    let log = db.get(run_id)?;
    Ok(Json(serde_json::json!(log)))
}
