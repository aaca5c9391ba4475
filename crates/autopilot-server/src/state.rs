use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use autopilot_core::automation;
use autopilot_core::config::Config;
use autopilot_core::executor::ExecutorRegistry;
use autopilot_core::history::CommandHistory;
use autopilot_core::orchestrator::{Orchestrator, RunDb};
use autopilot_core::Result;
use intent_client::IntentClient;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub root: PathBuf,
    pub config: Config,
    pub registry: Arc<ExecutorRegistry>,
    pub orchestrator: Arc<Orchestrator>,
    pub history: Arc<Mutex<CommandHistory>>,
    /// Present when `AUTOPILOT_INTENT_URL` points at an interpretation
    /// service; the command-interpret route returns 503 otherwise.
    pub interpreter: Option<Arc<IntentClient>>,
}

impl AppState {
    pub fn new(root: PathBuf) -> Result<Self> {
        Self::with_registry(root, Arc::new(ExecutorRegistry::with_builtins()))
    }

    /// Build the state with a caller-supplied executor registry (the path
    /// real deployments take to plug in platform connectors).
    pub fn with_registry(root: PathBuf, registry: Arc<ExecutorRegistry>) -> Result<Self> {
        let config = Config::load_or_default(&root);
        let db = Arc::new(RunDb::open(&autopilot_core::paths::runs_db_path(&root))?);

        let orchestrator = Orchestrator::new(registry.clone())
            .with_db(db)
            .with_action_timeout(config.execution.action_timeout())
            .with_finalize_attempts(config.execution.finalize_attempts);

        // Warm the aggregator with persisted counters so streaming means
        // continue where the last process left off.
        for automation in automation::list(&root)? {
            orchestrator.stats().seed(automation.id, automation.stats);
        }

        let interpreter = std::env::var("AUTOPILOT_INTENT_URL")
            .ok()
            .filter(|url| !url.is_empty())
            .map(|url| Arc::new(IntentClient::new(url)));

        Ok(Self {
            root,
            history: Arc::new(Mutex::new(CommandHistory::new(config.history.capacity))),
            config,
            registry,
            orchestrator: Arc::new(orchestrator),
            interpreter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn new_state_opens_run_store() {
        let dir = TempDir::new().unwrap();
        let state = AppState::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(state.root, dir.path());
        assert!(state.orchestrator.db().is_some());
    }
}
