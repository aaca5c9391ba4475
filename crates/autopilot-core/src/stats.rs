//! Per-automation run statistics.
//!
//! Counters roll up finalized execution logs with a streaming mean for the
//! average run time, so no run history is ever re-read. The aggregator is
//! the only writer and remembers which logs it has seen: recording the same
//! log twice is an error, and test-mode runs never touch the counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::execution::{ExecutionLog, RunStatus};

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(default)]
    pub total_runs: u64,
    #[serde(default)]
    pub successful_runs: u64,
    #[serde(default)]
    pub failed_runs: u64,
    /// Runs in which at least one action needed more than one attempt.
    #[serde(default)]
    pub retried_runs: u64,
    #[serde(default)]
    pub average_execution_time_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            total_runs: 0,
            successful_runs: 0,
            failed_runs: 0,
            retried_runs: 0,
            average_execution_time_ms: 0.0,
            last_run: None,
        }
    }
}

impl Statistics {
    /// Fold one finalized log into the counters.
    fn record(&mut self, log: &ExecutionLog) {
        self.total_runs += 1;
        if log.status == RunStatus::Success {
            self.successful_runs += 1;
        }
        if log.status == RunStatus::Failed {
            self.failed_runs += 1;
        }
        if log.had_retries() {
            self.retried_runs += 1;
        }
        // Incremental mean: avg += (x - avg) / n
        let delta = log.execution_time_ms as f64 - self.average_execution_time_ms;
        self.average_execution_time_ms += delta / self.total_runs as f64;
        self.last_run = Some(log.timestamp);
    }
}

// ---------------------------------------------------------------------------
// StatsAggregator
// ---------------------------------------------------------------------------

#[derive(Default)]
struct AutomationStats {
    stats: Statistics,
    recorded: HashSet<Uuid>,
}

/// Single writer for all per-automation statistics. Interior mutex keeps
/// concurrent finalizations of different runs from interleaving updates.
#[derive(Default)]
pub struct StatsAggregator {
    inner: Mutex<HashMap<Uuid, AutomationStats>>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load persisted statistics for an automation at startup. The recorded
    /// set starts empty; durable dedup across restarts belongs to the store.
    pub fn seed(&self, automation_id: Uuid, stats: Statistics) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entry(automation_id).or_default().stats = stats;
    }

    /// Roll one finalized log into the automation's counters. Called
    /// exactly once per log by the orchestrator's finalization; a second
    /// call for the same log is rejected. Test-mode logs are ignored.
    pub fn record_completion(&self, automation_id: Uuid, log: &ExecutionLog) -> Result<Statistics> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let entry = inner.entry(automation_id).or_default();
        if log.test_mode {
            return Ok(entry.stats.clone());
        }
        if !entry.recorded.insert(log.id) {
            return Err(PipelineError::AlreadyRecorded(log.id));
        }
        entry.stats.record(log);
        Ok(entry.stats.clone())
    }

    pub fn stats_for(&self, automation_id: Uuid) -> Option<Statistics> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.get(&automation_id).map(|e| e.stats.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
