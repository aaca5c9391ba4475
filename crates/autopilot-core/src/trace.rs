//! Execution trace: the step-by-step record of one invocation.
//!
//! One recorder per execution. Steps are appended in the plan's declared
//! order — never completion order — and an appended step is never mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// StepStatus / TraceStep
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
    Error,
    Running,
    Warning,
}

/// One entry in an execution trace. `error` holds the human-readable
/// message; `error_stack` holds debug detail shown only in expanded views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub index: usize,
    pub name: String,
    pub status: StepStatus,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_stack: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl TraceStep {
    /// A step in its initial shape; the recorder assigns the index.
    pub fn new(name: impl Into<String>, status: StepStatus) -> Self {
        Self {
            index: 0,
            name: name.into(),
            status,
            duration_ms: 0,
            timestamp: Utc::now(),
            input: None,
            output: None,
            error: None,
            error_stack: None,
            warnings: Vec::new(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_input(mut self, input: serde_json::Value) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_output(mut self, output: serde_json::Value) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_error_stack(mut self, stack: impl Into<String>) -> Self {
        self.error_stack = Some(stack.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

// ---------------------------------------------------------------------------
// ExecutionTrace / TraceRecorder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionTrace {
    pub steps: Vec<TraceStep>,
}

impl ExecutionTrace {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Append-only recorder; one instance per execution.
#[derive(Debug, Default)]
pub struct TraceRecorder {
    steps: Vec<TraceStep>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step, assigning the next index. Previously appended steps
    /// are not reachable for mutation.
    pub fn record(&mut self, mut step: TraceStep) -> usize {
        step.index = self.steps.len();
        let index = step.index;
        self.steps.push(step);
        index
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn finish(self) -> ExecutionTrace {
        ExecutionTrace { steps: self.steps }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
