//! Stored automations: a trigger, an action chain, and a retry policy.
//!
//! Automations live as YAML manifests under `.autopilot/automations/<slug>/`
//! and own their execution logs; per-automation statistics are written back
//! to the manifest once per finalized run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::io;
use crate::paths;
use crate::plan::ActionPlan;
use crate::policy::RetryPolicy;
use crate::stats::Statistics;

// ---------------------------------------------------------------------------
// TriggerKind
// ---------------------------------------------------------------------------

/// What fires an automation. Firing itself (cron evaluation, event buses,
/// webhook ingress) happens outside the pipeline; the kind is recorded so
/// operators can see why a run exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerKind {
    Schedule { cron: String },
    Event { event: String },
    Webhook,
}

// ---------------------------------------------------------------------------
// Automation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Automation {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub trigger: TriggerKind,
    pub plan: ActionPlan,
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub stats: Statistics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

impl Automation {
    pub fn new(slug: impl Into<String>, name: impl Into<String>, trigger: TriggerKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            slug: slug.into(),
            name: name.into(),
            description: None,
            trigger,
            plan: ActionPlan::default(),
            retry_policy: RetryPolicy::default(),
            enabled: true,
            stats: Statistics::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Structural validation: slug shape, plan invariants, policy ranges,
    /// and the fallback reference resolving into the plan.
    pub fn validate(&self) -> Result<()> {
        paths::validate_slug(&self.slug)?;
        self.plan.validate()?;
        self.retry_policy.validate()?;
        if let Some(fallback) = self.retry_policy.fallback_action_id {
            if self.plan.action(fallback).is_none() {
                return Err(PipelineError::InvalidPolicy(format!(
                    "fallback_action_id {fallback} does not match any action in the plan"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Manifest store
// ---------------------------------------------------------------------------

pub fn exists(root: &Path, slug: &str) -> bool {
    paths::automation_manifest(root, slug).exists()
}

pub fn load(root: &Path, slug: &str) -> Result<Automation> {
    let path = paths::automation_manifest(root, slug);
    if !path.exists() {
        return Err(PipelineError::AutomationNotFound(slug.to_string()));
    }
    let data = std::fs::read_to_string(&path)?;
    let automation: Automation = serde_yaml::from_str(&data)?;
    Ok(automation)
}

pub fn save(root: &Path, automation: &Automation) -> Result<()> {
    automation.validate()?;
    let path = paths::automation_manifest(root, &automation.slug);
    let data = serde_yaml::to_string(automation)?;
    io::atomic_write(&path, data.as_bytes())
}

/// Create a new automation; refuses to overwrite an existing slug.
pub fn create(root: &Path, automation: &Automation) -> Result<()> {
    if exists(root, &automation.slug) {
        return Err(PipelineError::AutomationExists(automation.slug.clone()));
    }
    save(root, automation)
}

pub fn delete(root: &Path, slug: &str) -> Result<()> {
    let dir = paths::automation_dir(root, slug);
    if !dir.exists() {
        return Err(PipelineError::AutomationNotFound(slug.to_string()));
    }
    std::fs::remove_dir_all(dir)?;
    Ok(())
}

/// All automations, sorted by slug.
pub fn list(root: &Path) -> Result<Vec<Automation>> {
    let dir = paths::automations_dir(root);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut automations = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let slug = entry.file_name().to_string_lossy().to_string();
        match load(root, &slug) {
            Ok(a) => automations.push(a),
            Err(e) => {
                tracing::warn!(slug = %slug, "skipping unreadable automation manifest: {e}");
            }
        }
    }
    automations.sort_by(|a, b| a.slug.cmp(&b.slug));
    Ok(automations)
}

/// Persist updated statistics after a finalized run.
pub fn update_stats(root: &Path, slug: &str, stats: &Statistics) -> Result<()> {
    let mut automation = load(root, slug)?;
    automation.stats = stats.clone();
    automation.updated_at = Utc::now();
    save(root, &automation)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ActionKind, ActionSpec};
    use tempfile::TempDir;

    fn sample(slug: &str) -> Automation {
        let mut automation = Automation::new(
            slug,
            "Restock alert",
            TriggerKind::Event {
                event: "inventory.low".into(),
            },
        );
        automation.plan = ActionPlan::new(vec![
            ActionSpec::new(ActionKind::UpdateInventory, 1),
            ActionSpec::new(ActionKind::SendEmail, 2),
        ]);
        automation
    }

    #[test]
    fn create_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let automation = sample("restock-alert");
        create(dir.path(), &automation).unwrap();

        let loaded = load(dir.path(), "restock-alert").unwrap();
        assert_eq!(loaded.id, automation.id);
        assert_eq!(loaded.plan.len(), 2);
        assert_eq!(loaded.retry_policy, RetryPolicy::default());
        assert!(loaded.enabled);
    }

    #[test]
    fn create_refuses_duplicate_slug() {
        let dir = TempDir::new().unwrap();
        create(dir.path(), &sample("restock-alert")).unwrap();
        let err = create(dir.path(), &sample("restock-alert")).unwrap_err();
        assert!(matches!(err, PipelineError::AutomationExists(_)));
    }

    #[test]
    fn load_missing_slug_fails() {
        let dir = TempDir::new().unwrap();
        let err = load(dir.path(), "ghost").unwrap_err();
        assert!(matches!(err, PipelineError::AutomationNotFound(_)));
    }

    #[test]
    fn list_sorts_by_slug() {
        let dir = TempDir::new().unwrap();
        create(dir.path(), &sample("zeta")).unwrap();
        create(dir.path(), &sample("alpha")).unwrap();

        let all = list(dir.path()).unwrap();
        let slugs: Vec<&str> = all.iter().map(|a| a.slug.as_str()).collect();
        assert_eq!(slugs, vec!["alpha", "zeta"]);
    }

    #[test]
    fn list_empty_root_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(list(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn delete_removes_manifest() {
        let dir = TempDir::new().unwrap();
        create(dir.path(), &sample("restock-alert")).unwrap();
        delete(dir.path(), "restock-alert").unwrap();
        assert!(!exists(dir.path(), "restock-alert"));
    }

    #[test]
    fn validate_rejects_dangling_fallback() {
        let mut automation = sample("restock-alert");
        automation.retry_policy.fallback_action_id = Some(Uuid::new_v4());
        let err = automation.validate().unwrap_err();
        assert!(err.to_string().contains("fallback_action_id"));

        let fallback = automation.plan.actions[0].id;
        automation.retry_policy.fallback_action_id = Some(fallback);
        automation.validate().unwrap();
    }

    #[test]
    fn validate_rejects_bad_slug() {
        let automation = sample("Bad Slug");
        assert!(automation.validate().is_err());
    }

    #[test]
    fn update_stats_persists_counters() {
        let dir = TempDir::new().unwrap();
        create(dir.path(), &sample("restock-alert")).unwrap();

        let stats = Statistics {
            total_runs: 4,
            successful_runs: 3,
            failed_runs: 1,
            retried_runs: 2,
            average_execution_time_ms: 512.5,
            last_run: Some(Utc::now()),
        };
        update_stats(dir.path(), "restock-alert", &stats).unwrap();

        let loaded = load(dir.path(), "restock-alert").unwrap();
        assert_eq!(loaded.stats.total_runs, 4);
        assert!((loaded.stats.average_execution_time_ms - 512.5).abs() < f64::EPSILON);
    }
}
