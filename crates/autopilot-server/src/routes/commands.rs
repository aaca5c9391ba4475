use axum::{extract::State, Json};
use serde::Deserialize;
use tracing::info;

use autopilot_core::impact;
use autopilot_core::interpreter::{IntentError, IntentInterpreter};
use autopilot_core::orchestrator::ExecuteOptions;
use autopilot_core::plan::ActionPlan;
use autopilot_core::preview;

use crate::error::AppError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CommandRequest {
    /// The command text as the user typed it; kept for history.
    #[serde(default)]
    pub text: Option<String>,
    pub plan: ActionPlan,
    #[serde(default)]
    pub trigger_data: serde_json::Value,
}

#[derive(Deserialize)]
pub struct InterpretBody {
    pub text: String,
    #[serde(default)]
    pub available_platforms: Vec<String>,
}

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

/// POST /api/commands/interpret — turn command text into a plan via the
/// external interpretation service. 503 when no service is configured;
/// 422 when the service rejects the command (no log is created either way).
pub async fn interpret_command(
    State(app): State<AppState>,
    Json(body): Json<InterpretBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Some(interpreter) = &app.interpreter else {
        return Err(AppError::unavailable(
            "no interpretation service configured (set AUTOPILOT_INTENT_URL)",
        ));
    };
    match interpreter
        .interpret(&body.text, &body.available_platforms)
        .await
    {
        Ok(plan) => Ok(Json(serde_json::json!({ "plan": plan }))),
        Err(IntentError::Rejected(msg)) => Err(AppError::unprocessable(msg)),
        Err(e) => Err(AppError(e.into())),
    }
}

/// POST /api/commands/preview — impact estimate plus a sandbox dry run,
/// shaped for the confirm-before-commit screen. Nothing is committed.
pub async fn preview_command(
    State(app): State<AppState>,
    Json(body): Json<CommandRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    body.plan.validate()?;
    let estimate = impact::estimate(&body.plan, &app.registry).await;
    let dry_run = app
        .orchestrator
        .execute(
            &body.plan,
            body.trigger_data,
            ExecuteOptions {
                test_mode: true,
                policy: app.config.command_retry.clone(),
                ..ExecuteOptions::default()
            },
        )
        .await?;
    let summary = preview::render(&estimate, &dry_run);
    Ok(Json(serde_json::json!(summary)))
}

/// POST /api/commands — execute an ad-hoc plan and return the finalized log.
pub async fn execute_command(
    State(app): State<AppState>,
    Json(body): Json<CommandRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if let Some(text) = &body.text {
        app.history.lock().await.push(text.clone());
    }
    info!(actions = body.plan.len(), "command execution requested");
    let log = app
        .orchestrator
        .execute(
            &body.plan,
            body.trigger_data,
            ExecuteOptions {
                policy: app.config.command_retry.clone(),
                ..ExecuteOptions::default()
            },
        )
        .await?;
    Ok(Json(serde_json::json!(log)))
}

/// GET /api/commands/history — recent command texts, newest first.
pub async fn command_history(State(app): State<AppState>) -> Json<serde_json::Value> {
    let history = app.history.lock().await;
    let entries: Vec<_> = history.recent().cloned().collect();
    Json(serde_json::json!(entries))
}
