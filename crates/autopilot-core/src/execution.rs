//! Execution records: per-action results and the per-invocation log.
//!
//! An `ExecutionLog` is created in `running` state before any action fires,
//! so a crash mid-run still leaves an inspectable partial record. It is
//! finalized exactly once; the run store rejects a second finalization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::trace::ExecutionTrace;

// ---------------------------------------------------------------------------
// ActionStatus / ActionResult
// ---------------------------------------------------------------------------

/// Lifecycle of one action within a run.
///
/// Transitions: `Pending → Running → Completed | Failed`. Terminal once
/// completed, or failed with the retry budget exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub action_id: Uuid,
    pub status: ActionStatus,
    /// Total invocations: 1 initial + retries actually taken.
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ActionResult {
    pub fn completed(action_id: Uuid, attempt_count: u32, output: serde_json::Value) -> Self {
        Self {
            action_id,
            status: ActionStatus::Completed,
            attempt_count,
            output: Some(output),
            error: None,
            duration_ms: 0,
        }
    }

    pub fn failed(action_id: Uuid, attempt_count: u32, error: impl Into<String>) -> Self {
        Self {
            action_id,
            status: ActionStatus::Failed,
            attempt_count,
            output: None,
            error: Some(error.into()),
            duration_ms: 0,
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

// ---------------------------------------------------------------------------
// RunStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    PartialSuccess,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    /// Terminal status from a completed pass over the plan: `success` when
    /// every action completed (an empty plan counts), `partial_success`
    /// when completions and failures are mixed, `failed` when nothing
    /// completed.
    pub fn from_results(results: &[ActionResult]) -> Self {
        let completed = results
            .iter()
            .filter(|r| r.status == ActionStatus::Completed)
            .count();
        let failed = results
            .iter()
            .filter(|r| r.status == ActionStatus::Failed)
            .count();
        match (completed, failed) {
            (_, 0) => RunStatus::Success,
            (0, _) => RunStatus::Failed,
            _ => RunStatus::PartialSuccess,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::PartialSuccess => "partial_success",
            RunStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ExecutionLog
// ---------------------------------------------------------------------------

/// One record per invocation of a command or automation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub id: Uuid,
    /// Parent automation, or `None` for ad-hoc commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automation_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub status: RunStatus,
    pub trigger_data: serde_json::Value,
    pub actions_executed: Vec<ActionResult>,
    #[serde(default)]
    pub trace: ExecutionTrace,
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub test_mode: bool,
}

impl ExecutionLog {
    /// A fresh log in `running` state, created before any action fires.
    pub fn begin(
        automation_id: Option<Uuid>,
        trigger_data: serde_json::Value,
        test_mode: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            automation_id,
            timestamp: Utc::now(),
            status: RunStatus::Running,
            trigger_data,
            actions_executed: Vec::new(),
            trace: ExecutionTrace::default(),
            execution_time_ms: 0,
            error_message: None,
            test_mode,
        }
    }

    /// True when any action needed more than one invocation.
    pub fn had_retries(&self) -> bool {
        self.actions_executed.iter().any(|r| r.attempt_count > 1)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
