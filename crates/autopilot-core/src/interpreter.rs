//! Intent interpretation seam.
//!
//! Turning a natural-language command into a plan is an external service's
//! job. The pipeline consumes the result once, before orchestration; an
//! interpretation failure is a plan rejection and no execution log is ever
//! created for it.

use async_trait::async_trait;
use thiserror::Error;

use crate::plan::ActionPlan;

#[derive(Debug, Error)]
pub enum IntentError {
    /// The service understood the command and refused it.
    #[error("command rejected: {0}")]
    Rejected(String),

    /// The service answered with something unusable.
    #[error("interpretation service error: {0}")]
    Service(String),

    /// The service could not be reached.
    #[error("interpretation transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait IntentInterpreter: Send + Sync {
    async fn interpret(
        &self,
        command_text: &str,
        available_platforms: &[String],
    ) -> Result<ActionPlan, IntentError>;
}
