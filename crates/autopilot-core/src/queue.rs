//! Sequential command queue.
//!
//! Queued commands run strictly one at a time with a fixed pause between
//! them. Each produces its own execution log; a failed command never
//! cancels the ones behind it.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::execution::ExecutionLog;
use crate::orchestrator::{ExecuteOptions, Orchestrator};
use crate::plan::ActionPlan;
use crate::policy::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedCommand {
    pub id: Uuid,
    pub text: String,
    pub plan: ActionPlan,
    #[serde(default)]
    pub trigger_data: serde_json::Value,
}

impl QueuedCommand {
    pub fn new(text: impl Into<String>, plan: ActionPlan) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            plan,
            trigger_data: serde_json::Value::Null,
        }
    }
}

pub struct CommandQueue {
    inter_command_delay: Duration,
    policy: RetryPolicy,
}

impl CommandQueue {
    pub fn new(inter_command_delay: Duration, policy: RetryPolicy) -> Self {
        Self {
            inter_command_delay,
            policy,
        }
    }

    /// Drain the queue against the orchestrator, one command at a time.
    /// Returns one log per command, in queue order.
    pub async fn run(
        &self,
        orchestrator: &Orchestrator,
        commands: Vec<QueuedCommand>,
        test_mode: bool,
    ) -> Vec<ExecutionLog> {
        let mut logs = Vec::with_capacity(commands.len());
        let total = commands.len();
        for (i, command) in commands.into_iter().enumerate() {
            tracing::info!(command = %command.text, "queue: running command {} of {total}", i + 1);
            let opts = ExecuteOptions {
                test_mode,
                policy: self.policy.clone(),
                ..ExecuteOptions::default()
            };
            match orchestrator
                .execute(&command.plan, command.trigger_data, opts)
                .await
            {
                Ok(log) => logs.push(log),
                Err(e) => {
                    // A setup failure on one command must not stop the rest.
                    tracing::error!(command = %command.text, "queue: command errored: {e}");
                }
            }
            if i + 1 < total {
                tokio::time::sleep(self.inter_command_delay).await;
            }
        }
        logs
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
