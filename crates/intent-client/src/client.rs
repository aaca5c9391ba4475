use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use autopilot_core::interpreter::{IntentError, IntentInterpreter};
use autopilot_core::plan::ActionPlan;

use crate::types::{ErrorBody, InterpretRequest, InterpretResponse};

// ─── IntentClient ─────────────────────────────────────────────────────────

/// Client for the interpretation service's `POST /interpret` endpoint.
pub struct IntentClient {
    base_url: String,
    http: reqwest::Client,
}

impl IntentClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/interpret", self.base_url)
    }
}

// ─── IntentInterpreter impl ───────────────────────────────────────────────

#[async_trait]
impl IntentInterpreter for IntentClient {
    /// Interpret a command into a plan.
    ///
    /// Status mapping:
    /// - 2xx  → parsed [`ActionPlan`]
    /// - 422  → [`IntentError::Rejected`] (the service understood and refused)
    /// - any other status → [`IntentError::Service`]
    /// - connection/deserialization trouble → [`IntentError::Transport`] /
    ///   [`IntentError::Service`]
    async fn interpret(
        &self,
        command_text: &str,
        available_platforms: &[String],
    ) -> Result<ActionPlan, IntentError> {
        let request = InterpretRequest {
            command_text: command_text.to_string(),
            available_platforms: available_platforms.to_vec(),
        };
        debug!(endpoint = %self.endpoint(), "interpreting command");

        let response = self
            .http
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .map_err(|e| IntentError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body: InterpretResponse = response
                .json()
                .await
                .map_err(|e| IntentError::Service(format!("malformed plan payload: {e}")))?;
            return Ok(body.plan);
        }

        let error = response
            .json::<ErrorBody>()
            .await
            .map(|b| b.error)
            .unwrap_or_else(|_| status.to_string());

        if status == StatusCode::UNPROCESSABLE_ENTITY {
            Err(IntentError::Rejected(error))
        } else {
            Err(IntentError::Service(format!("{status}: {error}")))
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
