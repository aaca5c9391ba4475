//! Wire types for the `POST /interpret` endpoint.

use autopilot_core::plan::ActionPlan;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpretRequest {
    pub command_text: String,
    pub available_platforms: Vec<String>,
}

/// Success body: the structured plan. The service reports refusals with a
/// 422 and an `error` body instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpretResponse {
    pub plan: ActionPlan,
}

/// Error body shared by 4xx/5xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: String,
}
