//! Execution orchestrator.
//!
//! Drives a plan's actions in declared order against registered executors,
//! applying the retry policy per action, recording a trace, and producing
//! one finalized `ExecutionLog` per invocation. Observers subscribe to a
//! broadcast channel and get pushed events instead of polling.

pub mod db;
mod engine;

pub use db::RunDb;
pub use engine::{ExecuteOptions, Orchestrator};

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::execution::RunStatus;
use crate::trace::StepStatus;

// ---------------------------------------------------------------------------
// CancelHandle
// ---------------------------------------------------------------------------

/// Cooperative cancellation for an in-flight invocation. Observed at action
/// boundaries only — never mid-call — so a cancelled run still finalizes
/// with the work completed so far.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// ExecutionEvent
// ---------------------------------------------------------------------------

/// Push notifications emitted while a run progresses. Replaces any polling
/// cadence: one event at start, one per trace step, one per retry wait,
/// one at finalization.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    RunStarted {
        run_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        automation_id: Option<Uuid>,
        test_mode: bool,
    },
    StepFinished {
        run_id: Uuid,
        index: usize,
        name: String,
        status: StepStatus,
    },
    ActionRetrying {
        run_id: Uuid,
        action_id: Uuid,
        attempt: u32,
        delay_ms: u64,
    },
    RunFinished {
        run_id: Uuid,
        status: RunStatus,
    },
}
