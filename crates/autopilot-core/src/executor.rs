//! Action executor capability.
//!
//! The orchestrator never talks to a platform SDK directly. Each action kind
//! is backed by an `ActionExecutor`: a read-only `preview` used by impact
//! estimation and an `execute` entry point that honors `test_mode` by
//! routing to a non-committing variant. Concrete platform connectors live
//! outside this crate and are registered at startup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::plan::ActionKind;

// ---------------------------------------------------------------------------
// ExecErrorKind / ExecError
// ---------------------------------------------------------------------------

/// Classifies executor failures for the retry policy.
///
/// The retryable/non-retryable boundary travels on the error value, produced
/// by the executor that observed the failure — never hard-coded branching in
/// the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecErrorKind {
    /// The action call exceeded its deadline.
    Timeout,
    /// The platform rejected the call with a rate limit.
    RateLimited,
    /// Transient network failure reaching the platform.
    Network,
    /// The platform answered with a transient server-side error.
    Api,
    /// The parameters failed validation.
    Validation,
    /// Authentication or permission failure.
    Permission,
    /// The parameter payload could not be understood at all.
    MalformedParams,
    /// The executor does not support the requested operation.
    Unsupported,
}

impl ExecErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ExecErrorKind::Timeout
                | ExecErrorKind::RateLimited
                | ExecErrorKind::Network
                | ExecErrorKind::Api
        )
    }
}

/// A failed action invocation. `message` is the human-readable summary that
/// lands in `ActionResult.error`; `detail` carries stack/debug text shown
/// only in expanded views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecError {
    pub kind: ExecErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ExecError {
    pub fn new(kind: ExecErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn timeout(limit: Duration) -> Self {
        Self::new(
            ExecErrorKind::Timeout,
            format!("action timed out after {}s", limit.as_secs()),
        )
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ExecErrorKind::Validation, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ExecErrorKind::Unsupported, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ExecError {}

// ---------------------------------------------------------------------------
// Preview / ActionExecutor
// ---------------------------------------------------------------------------

/// Answer to the read-only "count matching items" call used during impact
/// estimation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Preview {
    /// How many items the action would touch, when the executor can tell
    /// without side effects.
    pub count_estimate: Option<u64>,
    /// Whether the executor can undo the action after the fact.
    pub reversible: bool,
}

/// Capability implemented per action kind by external connectors.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Side-effect-free estimate of the action's blast radius. Executors
    /// that cannot answer without committing anything keep the default.
    async fn preview(&self, _params: &serde_json::Value) -> Result<Preview, ExecError> {
        Err(ExecError::unsupported("preview not supported"))
    }

    /// Perform the action. With `test_mode` the executor must route to its
    /// sandboxed variant and commit nothing.
    async fn execute(
        &self,
        params: &serde_json::Value,
        test_mode: bool,
    ) -> Result<serde_json::Value, ExecError>;
}

// ---------------------------------------------------------------------------
// ExecutorRegistry
// ---------------------------------------------------------------------------

/// Dispatch table from action kind to executor.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<ActionKind, Arc<dyn ActionExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in executors that need no external
    /// platform connection (`wait`, `generate_report`).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(ActionKind::Wait, Arc::new(builtin::WaitExecutor::default()));
        registry.register(
            ActionKind::GenerateReport,
            Arc::new(builtin::ReportExecutor),
        );
        registry
    }

    pub fn register(&mut self, kind: ActionKind, executor: Arc<dyn ActionExecutor>) {
        self.executors.insert(kind, executor);
    }

    pub fn get(&self, kind: ActionKind) -> Option<Arc<dyn ActionExecutor>> {
        self.executors.get(&kind).cloned()
    }

    pub fn contains(&self, kind: ActionKind) -> bool {
        self.executors.contains_key(&kind)
    }
}

// ---------------------------------------------------------------------------
// Built-in executors
// ---------------------------------------------------------------------------

pub mod builtin {
    use super::*;

    /// Executor for `wait` actions: sleeps for `seconds` (clamped), no side
    /// effects. Test mode skips the sleep so sandbox runs stay fast.
    pub struct WaitExecutor {
        max_wait: Duration,
    }

    impl Default for WaitExecutor {
        fn default() -> Self {
            Self {
                max_wait: Duration::from_secs(300),
            }
        }
    }

    #[async_trait]
    impl ActionExecutor for WaitExecutor {
        async fn preview(&self, _params: &serde_json::Value) -> Result<Preview, ExecError> {
            Ok(Preview {
                count_estimate: Some(0),
                reversible: true,
            })
        }

        async fn execute(
            &self,
            params: &serde_json::Value,
            test_mode: bool,
        ) -> Result<serde_json::Value, ExecError> {
            let seconds = params
                .get("seconds")
                .and_then(serde_json::Value::as_u64)
                .ok_or_else(|| ExecError::validation("wait requires a 'seconds' parameter"))?;
            let wait = Duration::from_secs(seconds).min(self.max_wait);
            if !test_mode {
                tokio::time::sleep(wait).await;
            }
            Ok(serde_json::json!({ "waited_seconds": wait.as_secs() }))
        }
    }

    /// Executor for `generate_report` actions: shapes its input parameters
    /// into a report payload. Purely local, identical in test mode.
    pub struct ReportExecutor;

    #[async_trait]
    impl ActionExecutor for ReportExecutor {
        async fn preview(&self, _params: &serde_json::Value) -> Result<Preview, ExecError> {
            Ok(Preview {
                count_estimate: Some(1),
                reversible: true,
            })
        }

        async fn execute(
            &self,
            params: &serde_json::Value,
            _test_mode: bool,
        ) -> Result<serde_json::Value, ExecError> {
            let title = params
                .get("title")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("report");
            Ok(serde_json::json!({
                "report": {
                    "title": title,
                    "sections": params.get("sections").cloned().unwrap_or_default(),
                }
            }))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
