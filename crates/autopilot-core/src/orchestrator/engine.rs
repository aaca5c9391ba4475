use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::automation::Automation;
use crate::error::{PipelineError, Result};
use crate::execution::{ActionResult, ActionStatus, ExecutionLog, RunStatus};
use crate::executor::{ExecError, ExecutorRegistry};
use crate::notify::{Alert, LogNotifier, Notifier};
use crate::plan::{ActionKind, ActionPlan, ActionSpec};
use crate::policy::RetryPolicy;
use crate::stats::StatsAggregator;
use crate::trace::{StepStatus, TraceRecorder, TraceStep};

use super::db::RunDb;
use super::{CancelHandle, ExecutionEvent};

// ---------------------------------------------------------------------------
// ExecuteOptions
// ---------------------------------------------------------------------------

/// Per-invocation knobs for [`Orchestrator::execute`].
#[derive(Clone, Default)]
pub struct ExecuteOptions {
    pub test_mode: bool,
    /// Parent automation, or `None` for ad-hoc commands.
    pub automation_id: Option<Uuid>,
    /// Retry policy governing every action in this invocation.
    pub policy: RetryPolicy,
    pub cancel: Option<CancelHandle>,
}

impl ExecuteOptions {
    pub fn for_automation(automation: &Automation, test_mode: bool) -> Self {
        Self {
            test_mode,
            automation_id: Some(automation.id),
            policy: automation.retry_policy.clone(),
            cancel: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    registry: Arc<ExecutorRegistry>,
    notifier: Arc<dyn Notifier>,
    stats: Arc<StatsAggregator>,
    db: Option<Arc<RunDb>>,
    event_tx: broadcast::Sender<ExecutionEvent>,
    action_timeout: Duration,
    finalize_attempts: u32,
}

impl Orchestrator {
    pub fn new(registry: Arc<ExecutorRegistry>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            registry,
            notifier: Arc::new(LogNotifier),
            stats: Arc::new(StatsAggregator::new()),
            db: None,
            event_tx,
            action_timeout: Duration::from_secs(30),
            finalize_attempts: 3,
        }
    }

    pub fn with_db(mut self, db: Arc<RunDb>) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_stats(mut self, stats: Arc<StatsAggregator>) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    pub fn with_finalize_attempts(mut self, attempts: u32) -> Self {
        self.finalize_attempts = attempts.max(1);
        self
    }

    pub fn stats(&self) -> &Arc<StatsAggregator> {
        &self.stats
    }

    pub fn db(&self) -> Option<&Arc<RunDb>> {
        self.db.as_ref()
    }

    /// Subscribe to run/step/retry push events.
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.event_tx.subscribe()
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Run a stored automation with its own retry policy.
    pub async fn run_automation(
        &self,
        automation: &Automation,
        trigger_data: serde_json::Value,
        test_mode: bool,
    ) -> Result<ExecutionLog> {
        self.execute(
            &automation.plan,
            trigger_data,
            ExecuteOptions::for_automation(automation, test_mode),
        )
        .await
    }

    /// Sandbox entry point: identical state machine, sandboxed executor
    /// variant, synchronous full log, no statistics.
    pub async fn run_test(
        &self,
        automation: &Automation,
        trigger_data: serde_json::Value,
    ) -> Result<ExecutionLog> {
        self.run_automation(automation, trigger_data, true).await
    }

    /// Execute a plan to a finalized `ExecutionLog`.
    ///
    /// The log is created (and persisted) in `running` state before the
    /// first action fires; exactly one finalization transitions it out.
    /// Individual action failures never surface as `Err` — they land in
    /// the log as `partial_success`/`failed`.
    pub async fn execute(
        &self,
        plan: &ActionPlan,
        trigger_data: serde_json::Value,
        opts: ExecuteOptions,
    ) -> Result<ExecutionLog> {
        if let Err(e) = plan.validate() {
            return self.reject(plan, trigger_data, opts, e);
        }

        let mut log = ExecutionLog::begin(opts.automation_id, trigger_data.clone(), opts.test_mode);
        if let Some(db) = &self.db {
            db.insert(&log)?;
        }
        let _ = self.event_tx.send(ExecutionEvent::RunStarted {
            run_id: log.id,
            automation_id: log.automation_id,
            test_mode: log.test_mode,
        });

        let started = Instant::now();
        let mut recorder = TraceRecorder::new();
        let mut results: Vec<ActionResult> = Vec::new();
        let mut outputs = serde_json::Map::new();
        let mut failed_ids: HashSet<Uuid> = HashSet::new();
        let mut skip_through: Option<u32> = None;
        let mut fallback_ran = false;
        let mut cancelled = false;

        for action in &plan.actions {
            // Cancellation takes effect here, at the action boundary.
            if opts.cancel.as_ref().is_some_and(CancelHandle::is_cancelled) {
                cancelled = true;
                break;
            }

            // An action designated as the policy's fallback only ever runs
            // on the fallback path, not in its sequence slot.
            if opts.policy.fallback_action_id == Some(action.id) {
                self.record_step(
                    &mut recorder,
                    log.id,
                    TraceStep::new(action.display_name(), StepStatus::Warning)
                        .with_warning("reserved as fallback; not run in sequence"),
                );
                continue;
            }

            if skip_through.is_some_and(|through| action.order <= through) {
                self.record_step(
                    &mut recorder,
                    log.id,
                    TraceStep::new(action.display_name(), StepStatus::Warning)
                        .with_warning("skipped by conditional branch")
                        .with_metadata(json!({ "skipped": true })),
                );
                continue;
            }

            if action.kind == ActionKind::ConditionalBranch {
                let Some(branch) = &action.branch else {
                    // validate() guarantees presence; an absent spec is inert.
                    continue;
                };
                let scope = json!({
                    "trigger": trigger_data,
                    "outputs": serde_json::Value::Object(outputs.clone()),
                });
                let matched = branch.predicate.evaluate(&scope);
                if !matched {
                    skip_through = Some(branch.skip_through);
                }
                results.push(ActionResult::completed(
                    action.id,
                    1,
                    json!({ "matched": matched }),
                ));
                self.record_step(
                    &mut recorder,
                    log.id,
                    TraceStep::new(action.display_name(), StepStatus::Success)
                        .with_output(json!({ "matched": matched })),
                );
                continue;
            }

            // An action whose upstream dependency failed is marked failed
            // without being invoked.
            if let Some(dep) = action.depends_on.iter().find(|d| failed_ids.contains(d)) {
                let message = format!("blocked by upstream failure of action {dep}");
                results.push(ActionResult::failed(action.id, 0, message.clone()));
                failed_ids.insert(action.id);
                self.record_step(
                    &mut recorder,
                    log.id,
                    TraceStep::new(action.display_name(), StepStatus::Failed)
                        .with_error(message)
                        .with_metadata(json!({ "blocked_by": dep.to_string() })),
                );
                continue;
            }

            let (result, step) = self
                .run_action(action, opts.test_mode, &opts.policy, log.id)
                .await;
            let action_failed = result.status == ActionStatus::Failed;
            if let Some(output) = &result.output {
                outputs.insert(action.id.to_string(), output.clone());
            }
            if action_failed {
                failed_ids.insert(action.id);
            }
            let attempt_count = result.attempt_count;
            let error_text = result.error.clone();
            results.push(result);
            self.record_step(&mut recorder, log.id, step);

            if action_failed {
                if let Some(fallback_id) = opts.policy.fallback_action_id {
                    if !fallback_ran {
                        if let Some(fallback) = plan.action(fallback_id) {
                            fallback_ran = true;
                            let (fb_result, fb_step) = self
                                .run_fallback(fallback, action.id, opts.test_mode)
                                .await;
                            results.push(fb_result);
                            self.record_step(&mut recorder, log.id, fb_step);
                        }
                    }
                }
                if opts.policy.alert_on_final_failure {
                    self.notifier.alert(Alert {
                        run_id: log.id,
                        automation_id: log.automation_id,
                        action_id: action.id,
                        message: format!(
                            "action '{}' failed after {} attempt(s): {}",
                            action.display_name(),
                            attempt_count,
                            error_text.unwrap_or_default()
                        ),
                    });
                }
            }
        }

        let status = if cancelled {
            log.error_message = Some("cancelled before completion".into());
            if results.iter().any(|r| r.status == ActionStatus::Completed) {
                RunStatus::PartialSuccess
            } else {
                RunStatus::Failed
            }
        } else {
            RunStatus::from_results(&results)
        };

        log.status = status;
        log.actions_executed = results;
        log.trace = recorder.finish();
        log.execution_time_ms = started.elapsed().as_millis() as u64;

        if !log.test_mode {
            if let Some(automation_id) = log.automation_id {
                if let Err(e) = self.stats.record_completion(automation_id, &log) {
                    error!(run_id = %log.id, "statistics update failed: {e}");
                }
            }
        }

        self.persist_finalized(&log).await;
        let _ = self.event_tx.send(ExecutionEvent::RunFinished {
            run_id: log.id,
            status: log.status,
        });
        Ok(log)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Plan rejection: a failed record with no executed actions. The log
    /// is written directly in its terminal shape.
    fn reject(
        &self,
        _plan: &ActionPlan,
        trigger_data: serde_json::Value,
        opts: ExecuteOptions,
        cause: PipelineError,
    ) -> Result<ExecutionLog> {
        warn!("plan rejected: {cause}");
        let mut log = ExecutionLog::begin(opts.automation_id, trigger_data, opts.test_mode);
        log.status = RunStatus::Failed;
        log.error_message = Some(cause.to_string());
        if let Some(db) = &self.db {
            db.insert(&log)?;
        }
        let _ = self.event_tx.send(ExecutionEvent::RunFinished {
            run_id: log.id,
            status: log.status,
        });
        Ok(log)
    }

    fn record_step(&self, recorder: &mut TraceRecorder, run_id: Uuid, step: TraceStep) {
        let status = step.status;
        let name = step.name.clone();
        let index = recorder.record(step);
        let _ = self.event_tx.send(ExecutionEvent::StepFinished {
            run_id,
            index,
            name,
            status,
        });
    }

    /// Drive one action to a terminal result, consulting the retry policy
    /// between attempts. Backoff waits suspend this invocation only.
    async fn run_action(
        &self,
        action: &ActionSpec,
        test_mode: bool,
        policy: &RetryPolicy,
        run_id: Uuid,
    ) -> (ActionResult, TraceStep) {
        let started = Instant::now();
        let Some(executor) = self.registry.get(action.kind) else {
            let err = ExecError::unsupported(format!(
                "no executor registered for '{}'",
                action.kind
            ));
            return self.failure(action, 0, &err, started);
        };

        let mut attempt: u32 = 1;
        loop {
            let outcome = match tokio::time::timeout(
                self.action_timeout,
                executor.execute(&action.parameters, test_mode),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ExecError::timeout(self.action_timeout)),
            };

            match outcome {
                Ok(output) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    let result = ActionResult::completed(action.id, attempt, output.clone())
                        .with_duration_ms(duration_ms);
                    let step = TraceStep::new(action.display_name(), StepStatus::Success)
                        .with_input(action.parameters.clone())
                        .with_output(output)
                        .with_duration_ms(duration_ms)
                        .with_metadata(json!({ "attempts": attempt }));
                    return (result, step);
                }
                Err(err) => {
                    if policy.should_retry(attempt, &err) {
                        let delay = policy.next_delay(attempt);
                        debug!(
                            action = %action.display_name(),
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "retrying after failure: {err}"
                        );
                        let _ = self.event_tx.send(ExecutionEvent::ActionRetrying {
                            run_id,
                            action_id: action.id,
                            attempt,
                            delay_ms: delay.as_millis() as u64,
                        });
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    } else {
                        return self.failure(action, attempt, &err, started);
                    }
                }
            }
        }
    }

    fn failure(
        &self,
        action: &ActionSpec,
        attempts: u32,
        err: &ExecError,
        started: Instant,
    ) -> (ActionResult, TraceStep) {
        let duration_ms = started.elapsed().as_millis() as u64;
        let result = ActionResult::failed(action.id, attempts, err.message.clone())
            .with_duration_ms(duration_ms);
        let mut step = TraceStep::new(action.display_name(), StepStatus::Failed)
            .with_input(action.parameters.clone())
            .with_error(err.message.clone())
            .with_duration_ms(duration_ms)
            .with_metadata(json!({ "attempts": attempts, "error_kind": err.kind }));
        if let Some(detail) = &err.detail {
            step = step.with_error_stack(detail.clone());
        }
        (result, step)
    }

    /// One invocation of the designated fallback action — never retried,
    /// even on failure.
    async fn run_fallback(
        &self,
        fallback: &ActionSpec,
        failed_action: Uuid,
        test_mode: bool,
    ) -> (ActionResult, TraceStep) {
        let started = Instant::now();
        let outcome = match self.registry.get(fallback.kind) {
            Some(executor) => {
                match tokio::time::timeout(
                    self.action_timeout,
                    executor.execute(&fallback.parameters, test_mode),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ExecError::timeout(self.action_timeout)),
                }
            }
            None => Err(ExecError::unsupported(format!(
                "no executor registered for '{}'",
                fallback.kind
            ))),
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        let metadata = json!({ "fallback_for": failed_action.to_string() });

        match outcome {
            Ok(output) => (
                ActionResult::completed(fallback.id, 1, output.clone())
                    .with_duration_ms(duration_ms),
                TraceStep::new(fallback.display_name(), StepStatus::Success)
                    .with_output(output)
                    .with_duration_ms(duration_ms)
                    .with_metadata(metadata),
            ),
            Err(err) => (
                ActionResult::failed(fallback.id, 1, err.message.clone())
                    .with_duration_ms(duration_ms),
                TraceStep::new(fallback.display_name(), StepStatus::Failed)
                    .with_error(err.message.clone())
                    .with_duration_ms(duration_ms)
                    .with_metadata(metadata),
            ),
        }
    }

    /// Persist the terminal log. A store failure is retried at this step
    /// only — actions are never re-invoked because storage hiccupped.
    async fn persist_finalized(&self, log: &ExecutionLog) {
        let Some(db) = &self.db else { return };
        for attempt in 1..=self.finalize_attempts {
            match db.finalize(log) {
                Ok(()) => return,
                Err(PipelineError::AlreadyFinalized(id)) => {
                    error!(run_id = %id, "finalization attempted twice");
                    return;
                }
                Err(e) if attempt < self.finalize_attempts => {
                    warn!(run_id = %log.id, attempt, "finalization failed, retrying: {e}");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                Err(e) => {
                    error!(run_id = %log.id, "finalization failed permanently: {e}");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::TriggerKind;
    use crate::executor::{ActionExecutor, ExecErrorKind, Preview};
    use crate::plan::{BranchPredicate, BranchSpec};
    use crate::policy::BackoffStrategy;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Executor scripted with a fixed queue of outcomes. Counts live and
    /// sandboxed invocations separately so tests can assert that test mode
    /// never touches the mutating entry point.
    struct ScriptedExecutor {
        outcomes: Mutex<VecDeque<std::result::Result<serde_json::Value, ExecError>>>,
        live_calls: AtomicUsize,
        test_calls: AtomicUsize,
    }

    impl ScriptedExecutor {
        fn ok() -> Self {
            Self::with(vec![])
        }

        fn with(outcomes: Vec<std::result::Result<serde_json::Value, ExecError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                live_calls: AtomicUsize::new(0),
                test_calls: AtomicUsize::new(0),
            }
        }

        fn live_calls(&self) -> usize {
            self.live_calls.load(Ordering::SeqCst)
        }

        fn test_calls(&self) -> usize {
            self.test_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ActionExecutor for ScriptedExecutor {
        async fn preview(&self, _params: &serde_json::Value) -> std::result::Result<Preview, ExecError> {
            Ok(Preview {
                count_estimate: Some(1),
                reversible: true,
            })
        }

        async fn execute(
            &self,
            _params: &serde_json::Value,
            test_mode: bool,
        ) -> std::result::Result<serde_json::Value, ExecError> {
            if test_mode {
                self.test_calls.fetch_add(1, Ordering::SeqCst);
            } else {
                self.live_calls.fetch_add(1, Ordering::SeqCst);
            }
            let mut outcomes = self.outcomes.lock().unwrap();
            outcomes
                .pop_front()
                .unwrap_or_else(|| Ok(json!({ "ok": true })))
        }
    }

    fn transient(msg: &str) -> ExecError {
        ExecError::new(ExecErrorKind::Network, msg)
    }

    fn permanent(msg: &str) -> ExecError {
        ExecError::new(ExecErrorKind::Validation, msg)
    }

    fn immediate_policy() -> RetryPolicy {
        RetryPolicy {
            strategy: BackoffStrategy::Immediate,
            base_delay_seconds: 1,
            ..RetryPolicy::default()
        }
    }

    fn orchestrator_with(
        kind: ActionKind,
        executor: Arc<ScriptedExecutor>,
    ) -> Orchestrator {
        let mut registry = ExecutorRegistry::new();
        registry.register(kind, executor);
        Orchestrator::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn empty_plan_executes_as_noop_success() {
        let orchestrator = Orchestrator::new(Arc::new(ExecutorRegistry::new()));
        let log = orchestrator
            .execute(&ActionPlan::default(), json!({}), ExecuteOptions::default())
            .await
            .unwrap();
        assert_eq!(log.status, RunStatus::Success);
        assert!(log.actions_executed.is_empty());
        assert!(log.trace.is_empty());
    }

    #[tokio::test]
    async fn invalid_plan_is_rejected_with_failed_empty_log() {
        let orchestrator = Orchestrator::new(Arc::new(ExecutorRegistry::new()));
        let plan = ActionPlan::new(vec![
            ActionSpec::new(ActionKind::Wait, 2),
            ActionSpec::new(ActionKind::Wait, 1),
        ]);
        let log = orchestrator
            .execute(&plan, json!({}), ExecuteOptions::default())
            .await
            .unwrap();
        assert_eq!(log.status, RunStatus::Failed);
        assert!(log.actions_executed.is_empty());
        assert!(log.error_message.unwrap().contains("strictly increasing"));
    }

    #[tokio::test]
    async fn single_action_success_has_one_attempt() {
        let exec = Arc::new(ScriptedExecutor::ok());
        let orchestrator = orchestrator_with(ActionKind::SyncPlatform, exec.clone());
        let plan = ActionPlan::new(vec![ActionSpec::new(ActionKind::SyncPlatform, 1)]);

        let log = orchestrator
            .execute(&plan, json!({}), ExecuteOptions::default())
            .await
            .unwrap();
        assert_eq!(log.status, RunStatus::Success);
        assert_eq!(log.actions_executed[0].attempt_count, 1);
        assert_eq!(exec.live_calls(), 1);
        assert!(!log.had_retries());
    }

    #[tokio::test]
    async fn transient_failure_retries_until_success() {
        let exec = Arc::new(ScriptedExecutor::with(vec![
            Err(transient("rate blip")),
            Err(transient("rate blip")),
            Ok(json!({ "synced": 3 })),
        ]));
        let orchestrator = orchestrator_with(ActionKind::SyncPlatform, exec.clone());
        let plan = ActionPlan::new(vec![ActionSpec::new(ActionKind::SyncPlatform, 1)]);

        let log = orchestrator
            .execute(
                &plan,
                json!({}),
                ExecuteOptions {
                    policy: immediate_policy(),
                    ..ExecuteOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(log.status, RunStatus::Success);
        assert_eq!(log.actions_executed[0].attempt_count, 3);
        assert_eq!(exec.live_calls(), 3);
        assert!(log.had_retries());
    }

    #[tokio::test]
    async fn retry_budget_allows_max_retries_plus_one_invocations() {
        let exec = Arc::new(ScriptedExecutor::with(
            (0..10).map(|_| Err(transient("down"))).collect(),
        ));
        let orchestrator = orchestrator_with(ActionKind::Webhook, exec.clone());
        let plan = ActionPlan::new(vec![ActionSpec::new(ActionKind::Webhook, 1)]);

        let policy = RetryPolicy {
            max_retries: 3,
            ..immediate_policy()
        };
        let log = orchestrator
            .execute(
                &plan,
                json!({}),
                ExecuteOptions {
                    policy,
                    ..ExecuteOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(log.status, RunStatus::Failed);
        // 1 initial + 3 retries
        assert_eq!(exec.live_calls(), 4);
        assert_eq!(log.actions_executed[0].attempt_count, 4);
    }

    #[tokio::test]
    async fn non_retryable_failure_escalates_without_consuming_budget() {
        let exec = Arc::new(ScriptedExecutor::with(vec![Err(permanent("bad sku"))]));
        let orchestrator = orchestrator_with(ActionKind::UpdatePrice, exec.clone());
        let plan = ActionPlan::new(vec![ActionSpec::new(ActionKind::UpdatePrice, 1)]);

        let log = orchestrator
            .execute(
                &plan,
                json!({}),
                ExecuteOptions {
                    policy: immediate_policy(),
                    ..ExecuteOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(log.status, RunStatus::Failed);
        assert_eq!(exec.live_calls(), 1);
        assert_eq!(log.actions_executed[0].attempt_count, 1);
    }

    #[tokio::test]
    async fn upstream_failure_blocks_dependent_without_invoking_it() {
        // Three actions; the second fails permanently, the third depends on
        // it and must be failed without execution.
        let first = ActionSpec::new(ActionKind::SyncPlatform, 1);
        let second = ActionSpec::new(ActionKind::UpdatePrice, 2);
        let mut third = ActionSpec::new(ActionKind::GenerateReport, 3);
        third.depends_on = vec![second.id];
        let second_id = second.id;

        let sync_exec = Arc::new(ScriptedExecutor::ok());
        let price_exec = Arc::new(ScriptedExecutor::with(vec![Err(permanent("bad sku"))]));
        let report_exec = Arc::new(ScriptedExecutor::ok());

        let mut registry = ExecutorRegistry::new();
        registry.register(ActionKind::SyncPlatform, sync_exec.clone());
        registry.register(ActionKind::UpdatePrice, price_exec);
        registry.register(ActionKind::GenerateReport, report_exec.clone());
        let orchestrator = Orchestrator::new(Arc::new(registry));

        let plan = ActionPlan::new(vec![first, second, third]);
        let log = orchestrator
            .execute(
                &plan,
                json!({}),
                ExecuteOptions {
                    policy: immediate_policy(),
                    ..ExecuteOptions::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(log.status, RunStatus::PartialSuccess);
        assert_eq!(log.actions_executed.len(), 3);
        assert_eq!(log.actions_executed[0].status, ActionStatus::Completed);
        assert_eq!(log.actions_executed[1].status, ActionStatus::Failed);
        assert_eq!(log.actions_executed[2].status, ActionStatus::Failed);
        let blocked_error = log.actions_executed[2].error.clone().unwrap();
        assert!(blocked_error.contains("blocked by upstream failure"));
        assert!(blocked_error.contains(&second_id.to_string()));
        // The dependent was never invoked.
        assert_eq!(report_exec.live_calls(), 0);
        // No retry occurred anywhere.
        assert!(!log.had_retries());
        // The blocked step still appears in the trace.
        assert_eq!(log.trace.len(), 3);
        assert_eq!(log.trace.steps[2].status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn fallback_runs_exactly_once_and_is_never_retried() {
        let primary = ActionSpec::new(ActionKind::Webhook, 1);
        let fallback = ActionSpec::new(ActionKind::SendEmail, 2);
        let fallback_id = fallback.id;

        let webhook_exec = Arc::new(ScriptedExecutor::with(vec![Err(permanent("gone"))]));
        // The fallback itself fails — it must still run only once.
        let email_exec = Arc::new(ScriptedExecutor::with(vec![Err(transient("smtp flap"))]));

        let mut registry = ExecutorRegistry::new();
        registry.register(ActionKind::Webhook, webhook_exec);
        registry.register(ActionKind::SendEmail, email_exec.clone());
        let orchestrator = Orchestrator::new(Arc::new(registry));

        let policy = RetryPolicy {
            fallback_action_id: Some(fallback_id),
            ..immediate_policy()
        };
        let plan = ActionPlan::new(vec![primary, fallback]);
        let log = orchestrator
            .execute(
                &plan,
                json!({}),
                ExecuteOptions {
                    policy,
                    ..ExecuteOptions::default()
                },
            )
            .await
            .unwrap();

        // Exactly one invocation of the fallback, despite its transient error.
        assert_eq!(email_exec.live_calls(), 1);
        let fb_result = log
            .actions_executed
            .iter()
            .find(|r| r.action_id == fallback_id)
            .unwrap();
        assert_eq!(fb_result.status, ActionStatus::Failed);
        assert_eq!(fb_result.attempt_count, 1);
        // The fallback's sequence slot was skipped, not executed.
        assert!(log
            .trace
            .steps
            .iter()
            .any(|s| s.warnings.iter().any(|w| w.contains("reserved as fallback"))));
    }

    #[tokio::test]
    async fn test_mode_never_calls_mutating_entry_point_nor_updates_stats() {
        let exec = Arc::new(ScriptedExecutor::ok());
        let mut registry = ExecutorRegistry::new();
        registry.register(ActionKind::UpdateInventory, exec.clone());
        let orchestrator = Orchestrator::new(Arc::new(registry));

        let mut automation = Automation::new(
            "restock",
            "Restock",
            TriggerKind::Event {
                event: "inventory.low".into(),
            },
        );
        automation.plan = ActionPlan::new(vec![ActionSpec::new(ActionKind::UpdateInventory, 1)]);

        let log = orchestrator
            .run_test(&automation, json!({ "sku": "W-1" }))
            .await
            .unwrap();

        assert!(log.test_mode);
        assert_eq!(log.status, RunStatus::Success);
        // Same shapes as a live run.
        assert_eq!(log.actions_executed.len(), 1);
        assert_eq!(log.trace.len(), 1);
        // Sandboxed variant only.
        assert_eq!(exec.live_calls(), 0);
        assert_eq!(exec.test_calls(), 1);
        // Statistics untouched.
        let stats = orchestrator.stats().stats_for(automation.id);
        assert!(stats.is_none() || stats.unwrap().total_runs == 0);
    }

    #[tokio::test]
    async fn live_automation_run_updates_stats_once() {
        let exec = Arc::new(ScriptedExecutor::ok());
        let mut registry = ExecutorRegistry::new();
        registry.register(ActionKind::SyncPlatform, exec);
        let orchestrator = Orchestrator::new(Arc::new(registry));

        let mut automation = Automation::new(
            "sync",
            "Sync",
            TriggerKind::Schedule {
                cron: "0 * * * *".into(),
            },
        );
        automation.plan = ActionPlan::new(vec![ActionSpec::new(ActionKind::SyncPlatform, 1)]);

        let log = orchestrator
            .run_automation(&automation, json!({}), false)
            .await
            .unwrap();
        assert_eq!(log.status, RunStatus::Success);

        let stats = orchestrator.stats().stats_for(automation.id).unwrap();
        assert_eq!(stats.total_runs, 1);
        assert_eq!(stats.successful_runs, 1);
    }

    #[tokio::test]
    async fn conditional_branch_skips_declared_range() {
        let mut branch = ActionSpec::new(ActionKind::ConditionalBranch, 1);
        branch.branch = Some(BranchSpec {
            predicate: BranchPredicate::Truthy {
                key: "trigger.vip".into(),
            },
            skip_through: 2,
        });
        let skipped = ActionSpec::new(ActionKind::SendEmail, 2);
        let skipped_id = skipped.id;
        let after = ActionSpec::new(ActionKind::GenerateReport, 3);
        let after_id = after.id;

        let email_exec = Arc::new(ScriptedExecutor::ok());
        let report_exec = Arc::new(ScriptedExecutor::ok());
        let mut registry = ExecutorRegistry::new();
        registry.register(ActionKind::SendEmail, email_exec.clone());
        registry.register(ActionKind::GenerateReport, report_exec.clone());
        let orchestrator = Orchestrator::new(Arc::new(registry));

        let plan = ActionPlan::new(vec![branch, skipped, after]);
        let log = orchestrator
            .execute(&plan, json!({ "vip": false }), ExecuteOptions::default())
            .await
            .unwrap();

        // The email inside the skip range never ran; the report after it did.
        assert_eq!(email_exec.live_calls(), 0);
        assert_eq!(report_exec.live_calls(), 1);
        assert_eq!(log.status, RunStatus::Success);
        // Skipped action appears in the trace but not in the results.
        assert_eq!(log.trace.len(), 3);
        assert!(log.trace.steps[1]
            .warnings
            .iter()
            .any(|w| w.contains("skipped")));
        assert!(log
            .actions_executed
            .iter()
            .all(|r| r.action_id != skipped_id));
        assert!(log.actions_executed.iter().any(|r| r.action_id == after_id));
    }

    #[tokio::test]
    async fn branch_match_executes_range_normally() {
        let mut branch = ActionSpec::new(ActionKind::ConditionalBranch, 1);
        branch.branch = Some(BranchSpec {
            predicate: BranchPredicate::Truthy {
                key: "trigger.vip".into(),
            },
            skip_through: 2,
        });
        let inside = ActionSpec::new(ActionKind::SendEmail, 2);

        let email_exec = Arc::new(ScriptedExecutor::ok());
        let mut registry = ExecutorRegistry::new();
        registry.register(ActionKind::SendEmail, email_exec.clone());
        let orchestrator = Orchestrator::new(Arc::new(registry));

        let plan = ActionPlan::new(vec![branch, inside]);
        let log = orchestrator
            .execute(&plan, json!({ "vip": true }), ExecuteOptions::default())
            .await
            .unwrap();
        assert_eq!(email_exec.live_calls(), 1);
        assert_eq!(log.status, RunStatus::Success);
    }

    #[tokio::test]
    async fn cancellation_takes_effect_at_action_boundary() {
        let exec = Arc::new(ScriptedExecutor::ok());
        let orchestrator = orchestrator_with(ActionKind::SyncPlatform, exec.clone());

        let cancel = CancelHandle::new();
        cancel.cancel();
        let plan = ActionPlan::new(vec![
            ActionSpec::new(ActionKind::SyncPlatform, 1),
            ActionSpec::new(ActionKind::SyncPlatform, 2),
        ]);
        let log = orchestrator
            .execute(
                &plan,
                json!({}),
                ExecuteOptions {
                    cancel: Some(cancel),
                    ..ExecuteOptions::default()
                },
            )
            .await
            .unwrap();

        // Cancelled before the first boundary: nothing ran, nothing silently
        // discarded.
        assert_eq!(exec.live_calls(), 0);
        assert_eq!(log.status, RunStatus::Failed);
        assert!(log.error_message.unwrap().contains("cancelled"));
    }

    #[tokio::test]
    async fn no_executor_is_a_non_retryable_action_failure() {
        let orchestrator = Orchestrator::new(Arc::new(ExecutorRegistry::new()));
        let plan = ActionPlan::new(vec![ActionSpec::new(ActionKind::SendEmail, 1)]);
        let log = orchestrator
            .execute(
                &plan,
                json!({}),
                ExecuteOptions {
                    policy: immediate_policy(),
                    ..ExecuteOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(log.status, RunStatus::Failed);
        assert!(log.actions_executed[0]
            .error
            .clone()
            .unwrap()
            .contains("no executor registered"));
    }

    #[tokio::test]
    async fn alert_fires_on_final_failure_when_enabled() {
        use crate::notify::Notifier;

        struct Counting(Arc<AtomicUsize>);
        impl Notifier for Counting {
            fn alert(&self, _alert: Alert) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let count = Arc::new(AtomicUsize::new(0));
        let exec = Arc::new(ScriptedExecutor::with(vec![Err(permanent("nope"))]));
        let mut registry = ExecutorRegistry::new();
        registry.register(ActionKind::Webhook, exec);
        let orchestrator = Orchestrator::new(Arc::new(registry))
            .with_notifier(Arc::new(Counting(count.clone())));

        let plan = ActionPlan::new(vec![ActionSpec::new(ActionKind::Webhook, 1)]);
        orchestrator
            .execute(
                &plan,
                json!({}),
                ExecuteOptions {
                    policy: immediate_policy(),
                    ..ExecuteOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_a_retryable_failure() {
        struct Slow;
        #[async_trait]
        impl ActionExecutor for Slow {
            async fn execute(
                &self,
                _params: &serde_json::Value,
                _test_mode: bool,
            ) -> std::result::Result<serde_json::Value, ExecError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(json!({}))
            }
        }

        let mut registry = ExecutorRegistry::new();
        registry.register(ActionKind::SyncPlatform, Arc::new(Slow));
        let orchestrator = Orchestrator::new(Arc::new(registry))
            .with_action_timeout(Duration::from_secs(1));

        let policy = RetryPolicy {
            max_retries: 2,
            ..immediate_policy()
        };
        let plan = ActionPlan::new(vec![ActionSpec::new(ActionKind::SyncPlatform, 1)]);
        let log = orchestrator
            .execute(
                &plan,
                json!({}),
                ExecuteOptions {
                    policy,
                    ..ExecuteOptions::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(log.status, RunStatus::Failed);
        // Initial attempt + 2 retries, every one timing out.
        assert_eq!(log.actions_executed[0].attempt_count, 3);
        assert!(log.actions_executed[0]
            .error
            .clone()
            .unwrap()
            .contains("timed out"));
    }

    #[tokio::test]
    async fn events_are_pushed_in_run_order() {
        let exec = Arc::new(ScriptedExecutor::ok());
        let orchestrator = orchestrator_with(ActionKind::SyncPlatform, exec);
        let mut rx = orchestrator.subscribe();

        let plan = ActionPlan::new(vec![ActionSpec::new(ActionKind::SyncPlatform, 1)]);
        let log = orchestrator
            .execute(&plan, json!({}), ExecuteOptions::default())
            .await
            .unwrap();

        let first = rx.try_recv().unwrap();
        assert!(matches!(first, ExecutionEvent::RunStarted { run_id, .. } if run_id == log.id));
        let second = rx.try_recv().unwrap();
        assert!(matches!(second, ExecutionEvent::StepFinished { index: 0, .. }));
        let third = rx.try_recv().unwrap();
        assert!(
            matches!(third, ExecutionEvent::RunFinished { status, .. } if status == RunStatus::Success)
        );
    }

    #[tokio::test]
    async fn logs_persist_through_run_db() {
        use tempfile::TempDir;

        let dir = TempDir::new().unwrap();
        let db = Arc::new(RunDb::open(&dir.path().join("runs.redb")).unwrap());
        let exec = Arc::new(ScriptedExecutor::ok());
        let mut registry = ExecutorRegistry::new();
        registry.register(ActionKind::SyncPlatform, exec);
        let orchestrator = Orchestrator::new(Arc::new(registry)).with_db(db.clone());

        let plan = ActionPlan::new(vec![ActionSpec::new(ActionKind::SyncPlatform, 1)]);
        let log = orchestrator
            .execute(&plan, json!({}), ExecuteOptions::default())
            .await
            .unwrap();

        let stored = db.get(log.id).unwrap();
        assert_eq!(stored.status, RunStatus::Success);
        assert_eq!(stored.trace.len(), 1);
    }
}
