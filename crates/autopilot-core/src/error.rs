use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("not initialized: run 'autopilot init'")]
    NotInitialized,

    #[error("automation not found: {0}")]
    AutomationNotFound(String),

    #[error("automation already exists: {0}")]
    AutomationExists(String),

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("invalid slug '{0}': must be lowercase alphanumeric with hyphens")]
    InvalidSlug(String),

    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("invalid retry policy: {0}")]
    InvalidPolicy(String),

    #[error("no executor registered for action kind '{0}'")]
    NoExecutor(String),

    #[error("run {0} is already finalized")]
    AlreadyFinalized(Uuid),

    #[error("statistics already recorded for run {0}")]
    AlreadyRecorded(Uuid),

    #[error("run store error: {0}")]
    RunDb(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
